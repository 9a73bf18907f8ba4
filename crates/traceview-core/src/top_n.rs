/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Hot-line selection for the quick-glance table.

use std::cmp::Ordering;

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::wave::CodeLine;

pub const TOP_N: usize = 10;

/// `(line_number, hit_count, 0, runtime)`; the constant slot keeps the row
/// shaped like an instruction tuple for the front-end.
#[derive(Debug, Clone, PartialEq)]
pub struct TopNEntry {
    pub line_number: Value,
    pub hit_count: Value,
    pub runtime: Value,
}

impl From<&CodeLine> for TopNEntry {
    fn from(line: &CodeLine) -> Self {
        Self {
            line_number: line.line_number(),
            hit_count: line.hit_count(),
            runtime: line.runtime(),
        }
    }
}

impl Serialize for TopNEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.line_number)?;
        tuple.serialize_element(&self.hit_count)?;
        tuple.serialize_element(&0)?;
        tuple.serialize_element(&self.runtime)?;
        tuple.end()
    }
}

/// The [`TOP_N`] rows with the greatest runtime weight, heaviest first.
/// Rows with equal weight keep their listing order.
pub fn top_n(code: &[CodeLine]) -> Vec<TopNEntry> {
    let mut ranked: Vec<&CodeLine> = code.iter().collect();
    // `sort_by` is stable, so ties stay in listing order.
    ranked.sort_by(|a, b| {
        b.runtime_weight()
            .partial_cmp(&a.runtime_weight())
            .unwrap_or(Ordering::Equal)
    });
    ranked.into_iter().take(TOP_N).map(TopNEntry::from).collect()
}
