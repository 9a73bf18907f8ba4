/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Decoded trace bundle.
//!
//! The trace decoder hands everything over as one JSON document: the decoded
//! waves of each shader engine, the `.att` file names they came from, the
//! annotated code listing, the occupancy table and the draw inputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use traceview_core::{CodeLine, WaveRecord};

use crate::render::DrawInfo;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TraceBundle {
    /// GPU architecture string, passed through to `filenames.json`.
    pub gfxv: String,
    /// One `..._se<N>.att` name per entry of `engines`.
    pub att_filenames: Vec<String>,
    pub engines: Vec<Vec<WaveRecord>>,
    pub code: Vec<CodeLine>,
    pub occupancy: Vec<Value>,
    pub draw: DrawInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    Read { path: PathBuf, message: String },
    Parse(String),
}

impl BundleError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "could not read {}: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid trace bundle: {message}"),
        }
    }
}

impl std::error::Error for BundleError {}

impl TraceBundle {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, BundleError> {
        serde_json::from_slice(bytes).map_err(|e| BundleError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let bytes = fs::read(path).map_err(|e| BundleError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let bundle = Self::from_json_slice(&bytes)?;
        log::info!(
            "bundle: {} engines, {} code lines from {}",
            bundle.engines.len(),
            bundle.code.len(),
            path.display()
        );
        Ok(bundle)
    }
}
