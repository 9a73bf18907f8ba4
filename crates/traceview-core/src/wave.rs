/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Decoded wave records and the positional tuples they carry.
//!
//! The front-end indexes instruction and code-listing rows by position, so the
//! tuples stay positional on the wire. Only the fields the stitcher and the
//! hot-line selector read get typed accessors; everything else passes through
//! untouched.

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Position of the per-instruction duration unit inside an event tuple.
pub const DURATION_UNIT_FIELD: usize = 0;
/// Position of the per-instruction hit count inside an event tuple.
pub const HIT_COUNT_FIELD: usize = 2;

/// Position of the source line number inside a code-listing row.
pub const CODE_LINE_NUMBER_FIELD: usize = 4;
/// Position of the hit count inside a code-listing row.
pub const CODE_HIT_COUNT_FIELD: usize = 6;

/// One raw instruction event of a wave, kept as the decoder emitted it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTuple(pub Vec<Value>);

impl EventTuple {
    pub fn new(fields: Vec<Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &[Value] {
        &self.0
    }

    pub fn number_at(&self, index: usize) -> Option<f64> {
        self.0.get(index).and_then(Value::as_f64)
    }

    pub fn duration_unit(&self) -> Option<f64> {
        self.number_at(DURATION_UNIT_FIELD)
    }

    pub fn hit_count(&self) -> Option<f64> {
        self.number_at(HIT_COUNT_FIELD)
    }
}

/// One shader-engine wave as handed over by the trace decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    /// Ordered instruction events.
    pub stitched: Vec<EventTuple>,
    #[serde(default)]
    pub loop_count: Value,
    /// Memory unroll factor, exposed to the UI as `waitcnt`.
    #[serde(default)]
    pub mem_unroll: Value,
    /// Flight-count (occupancy) sample for this wave.
    #[serde(default)]
    pub count: Value,
    /// Highest source line this wave reached.
    #[serde(default)]
    pub max_line: usize,
    /// Number of instructions the decoder expected to stitch.
    pub num_insts: usize,
}

impl WaveRecord {
    pub fn is_empty(&self) -> bool {
        self.stitched.is_empty()
    }

    /// A wave is usable only when it is non-empty and fully stitched.
    pub fn is_complete(&self) -> bool {
        !self.stitched.is_empty() && self.stitched.len() == self.num_insts
    }
}

/// An event tuple extended with its position on the wave's timeline.
///
/// Serializes as the event tuple followed by `start_time` and
/// `duration_weight`.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedInstruction {
    pub event: EventTuple,
    pub start_time: f64,
    pub duration_weight: f64,
}

impl Serialize for StitchedInstruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.event.fields();
        let mut seq = serializer.serialize_seq(Some(fields.len() + 2))?;
        for field in fields {
            seq.serialize_element(field)?;
        }
        seq.serialize_element(&self.start_time)?;
        seq.serialize_element(&self.duration_weight)?;
        seq.end()
    }
}

/// One row of the source listing with per-line hit and runtime data.
///
/// The runtime weight is always the last field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeLine(pub Vec<Value>);

impl CodeLine {
    pub fn new(fields: Vec<Value>) -> Self {
        Self(fields)
    }

    pub fn line_number(&self) -> Value {
        self.0.get(CODE_LINE_NUMBER_FIELD).cloned().unwrap_or(Value::Null)
    }

    pub fn hit_count(&self) -> Value {
        self.0.get(CODE_HIT_COUNT_FIELD).cloned().unwrap_or(Value::Null)
    }

    pub fn runtime(&self) -> Value {
        self.0.last().cloned().unwrap_or(Value::Null)
    }

    /// Sort key for the runtime weight. Rows without a numeric runtime sort last.
    pub fn runtime_weight(&self) -> f64 {
        self.0
            .last()
            .and_then(Value::as_f64)
            .unwrap_or(f64::NEG_INFINITY)
    }
}
