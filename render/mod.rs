/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Diagram rendering boundary.
//!
//! A [`DiagramRenderer`] turns occupancy and counter data into an options
//! document describing the available toggles plus a set of encoded images.
//! It runs once on the render worker thread while waves are stitched, and
//! again on demand whenever the front-end asks for a toggle combination that
//! has not been rendered yet.

pub mod timeline;
pub mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use timeline::TimelineRenderer;
pub use worker::{RenderJob, RenderMerge, spawn_render_worker};

/// Inputs for diagram rendering. The render worker receives its own copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawInfo {
    /// Per-engine occupancy samples (active waves per sample interval).
    pub timelines: Vec<Vec<f64>>,
    /// Per-engine performance counter samples.
    pub events: Vec<Vec<CounterSample>>,
    /// Display names of the counters, in sample value order.
    pub counter_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSample {
    pub time: u64,
    pub values: Vec<f64>,
}

impl CounterSample {
    /// `[time, value0, value1, ...]`
    pub fn to_tuple(&self) -> Vec<Value> {
        std::iter::once(Value::from(self.time))
            .chain(self.values.iter().map(|value| Value::from(*value)))
            .collect()
    }
}

/// Overall chart layout, selected by the first query flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineVariant {
    /// One occupancy curve per shader engine.
    #[default]
    PerEngine,
    /// A single curve summing every engine.
    Aggregate,
}

/// Decoded `?<flags>` query of an image request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSelection {
    pub variant: TimelineVariant,
    /// One toggle per counter overlay; missing entries are off.
    pub overlays: Vec<bool>,
}

impl RenderSelection {
    /// Decode a string of `0`/`1` flags. The first flag picks the variant and
    /// the rest toggle overlays. Empty strings and any other character are
    /// rejected.
    pub fn from_flags(flags: &str) -> Option<Self> {
        let mut bits = flags.chars().map(|flag| match flag {
            '0' => Some(false),
            '1' => Some(true),
            _ => None,
        });
        let variant = match bits.next()?? {
            false => TimelineVariant::PerEngine,
            true => TimelineVariant::Aggregate,
        };
        let overlays = bits.collect::<Option<Vec<bool>>>()?;
        Some(Self { variant, overlays })
    }

    pub fn overlay_enabled(&self, counter: usize) -> bool {
        self.overlays.get(counter).copied().unwrap_or(false)
    }
}

/// Renderer output: the options document and images keyed by file name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOutput {
    pub options_json: Vec<u8>,
    pub images: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Encode(String),
    Options(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "image encoding failed: {e}"),
            Self::Options(e) => write!(f, "options encoding failed: {e}"),
        }
    }
}

impl std::error::Error for RenderError {}

pub trait DiagramRenderer: Send + Sync {
    fn render(
        &self,
        draw: &DrawInfo,
        selection: &RenderSelection,
    ) -> Result<RenderOutput, RenderError>;
}

impl<F> DiagramRenderer for F
where
    F: Fn(&DrawInfo, &RenderSelection) -> Result<RenderOutput, RenderError> + Send + Sync,
{
    fn render(
        &self,
        draw: &DrawInfo,
        selection: &RenderSelection,
    ) -> Result<RenderOutput, RenderError> {
        self(draw, selection)
    }
}

pub type SharedRenderer = Arc<dyn DiagramRenderer>;
