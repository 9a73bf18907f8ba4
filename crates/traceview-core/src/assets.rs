/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Asset names and the JSON documents the front-end reads.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::top_n::TopNEntry;
use crate::wave::{CodeLine, StitchedInstruction};

pub const OCCUPANCY_KEY: &str = "occupancy.json";
pub const CODE_KEY: &str = "code.json";
pub const FILENAMES_KEY: &str = "filenames.json";
pub const LIVE_KEY: &str = "live.json";
pub const GRAPH_OPTIONS_KEY: &str = "graph_options.json";
pub const TIMELINE_IMAGE: &str = "timeline.png";

/// Code-listing rows shipped past the highest line any wave reached.
pub const CODE_CONTEXT_LINES: usize = 16;

pub fn wave_key(se: u32, wave_id: usize) -> String {
    format!("se{se}_tr{wave_id}.json")
}

pub fn engine_summary_key(se: u32) -> String {
    format!("se{se}_info.json")
}

pub fn perfcounter_key(se: usize) -> String {
    format!("se{se}_perfcounter.json")
}

pub fn is_json_key(key: &str) -> bool {
    key.contains(".json")
}

#[derive(Debug, Clone, Serialize)]
pub struct WaveEntry {
    pub id: usize,
    pub instructions: Vec<StitchedInstruction>,
    pub waitcnt: Value,
}

/// `se<N>_tr<wave>.json`
#[derive(Debug, Clone, Serialize)]
pub struct WaveAsset {
    pub name: String,
    pub wave: WaveEntry,
    pub duration: f64,
    pub loop_count: Value,
    pub num_stitched: usize,
    pub num_insts: usize,
    pub websocket_port: u16,
    pub generation_time: String,
}

/// `se<N>_info.json`
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummaryAsset {
    pub name: String,
    pub websocket_port: u16,
    pub generation_time: String,
}

/// `code.json`
#[derive(Debug, Clone, Serialize)]
pub struct CodeAsset<'a> {
    pub code: &'a [CodeLine],
    pub top_n: Vec<TopNEntry>,
}

/// `filenames.json`
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilenamesAsset {
    pub wave_filenames: BTreeMap<u32, Vec<String>>,
    pub se_filenames: Vec<String>,
    pub global_begin_time: u64,
    pub gfxv: String,
}

/// `live.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiveAsset {
    pub live: u8,
}

impl LiveAsset {
    pub fn serving() -> Self {
        Self { live: 1 }
    }

    pub fn dumped() -> Self {
        Self { live: 0 }
    }
}

/// `occupancy.json`: `{"0": occupancy[0], "1": occupancy[1], ...}`
pub fn occupancy_asset(occupancy: &[Value]) -> serde_json::Map<String, Value> {
    occupancy
        .iter()
        .enumerate()
        .map(|(index, value)| (index.to_string(), value.clone()))
        .collect()
}

/// `se<N>_perfcounter.json`
#[derive(Debug, Clone, Serialize)]
pub struct PerfCounterAsset {
    pub data: Vec<Vec<Value>>,
}

/// Listing slice shipped in `code.json`: up to [`CODE_CONTEXT_LINES`] rows past
/// the highest line reached.
pub fn code_window(code: &[CodeLine], max_line: usize) -> &[CodeLine] {
    let end = max_line.saturating_add(CODE_CONTEXT_LINES).min(code.len());
    &code[..end]
}
