/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dump mode: write the whole asset store, plus the static front-end, into a
//! directory that can be opened without a running server.

use std::fs;
use std::path::{Path, PathBuf};

use traceview_core::assets::{LIVE_KEY, LiveAsset};
use traceview_core::{AssetStore, AssetStoreExt};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub written: usize,
    pub copied_static: usize,
    /// Keys that could not be used as file names.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpError {
    CreateDir { path: PathBuf, message: String },
    Write { path: PathBuf, message: String },
    Encode(String),
}

impl std::fmt::Display for DumpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateDir { path, message } => {
                write!(f, "could not create {}: {message}", path.display())
            }
            Self::Write { path, message } => {
                write!(f, "could not write {}: {message}", path.display())
            }
            Self::Encode(message) => write!(f, "could not encode asset: {message}"),
        }
    }
}

impl std::error::Error for DumpError {}

/// A key is written only if it is a plain file name.
fn is_plain_file_name(key: &str) -> bool {
    !key.is_empty() && key != "." && key != ".." && !key.contains(['/', '\\', '\0'])
}

/// Copy the top-level files of `static_dir` into `out_dir`. Failures are
/// logged and skipped.
fn copy_static_files(static_dir: &Path, out_dir: &Path) -> usize {
    if let (Ok(from), Ok(to)) = (static_dir.canonicalize(), out_dir.canonicalize()) {
        if from == to {
            log::debug!("dump: static files already in {}", out_dir.display());
            return 0;
        }
    }
    let entries = match fs::read_dir(static_dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("dump: no static files from {} ({e})", static_dir.display());
            return 0;
        }
    };

    let mut copied = 0;
    for entry in entries.flatten() {
        let source = entry.path();
        if !source.is_file() {
            continue;
        }
        let target = out_dir.join(entry.file_name());
        match fs::copy(&source, &target) {
            Ok(_) => copied += 1,
            Err(e) => log::warn!("dump: could not copy {} ({e})", source.display()),
        }
    }
    copied
}

/// Mark the store as not live and write every entry to `out_dir/<key>`.
pub fn dump_assets(
    store: &dyn AssetStore,
    static_dir: &Path,
    out_dir: &Path,
) -> Result<DumpSummary, DumpError> {
    fs::create_dir_all(out_dir).map_err(|e| DumpError::CreateDir {
        path: out_dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut summary = DumpSummary {
        copied_static: copy_static_files(static_dir, out_dir),
        ..DumpSummary::default()
    };

    store
        .put_json(LIVE_KEY, &LiveAsset::dumped())
        .map_err(|e| DumpError::Encode(e.to_string()))?;

    for key in store.keys() {
        if !is_plain_file_name(&key) {
            log::warn!("dump: skipping asset with unusable name {key:?}");
            summary.skipped.push(key);
            continue;
        }
        let Some(bytes) = store.get(&key) else {
            continue;
        };
        let path = out_dir.join(&key);
        fs::write(&path, &bytes).map_err(|e| DumpError::Write {
            path,
            message: e.to_string(),
        })?;
        summary.written += 1;
    }

    log::info!(
        "dump: wrote {} assets and {} static files to {}",
        summary.written,
        summary.copied_static,
        out_dir.display()
    );
    Ok(summary)
}
