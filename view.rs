/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Build driver.
//!
//! [`build_assets`] fills the asset store from a decoded trace bundle while
//! the render worker draws the diagrams in parallel. [`view_trace`] then
//! returns the flight counts, dumps the store to disk, or serves it.

use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use traceview_core::assets::{
    CODE_KEY, CodeAsset, FILENAMES_KEY, FilenamesAsset, LIVE_KEY, LiveAsset, OCCUPANCY_KEY,
    code_window, occupancy_asset,
};
use traceview_core::{
    AssetStore, AssetStoreExt, Diagnostic, Diagnostics, MemoryAssetStore, SharedAssetStore,
    StitchContext, clock, stitch_engine, top_n,
};

use crate::bundle::TraceBundle;
use crate::config::{PortConfig, ServeAddrs};
use crate::dump::{DumpError, DumpSummary, dump_assets};
use crate::render::{DrawInfo, SharedRenderer, spawn_render_worker};
use crate::server::{BoundServers, HttpState, ImageSynthesizer, ServeError, serve_until_interrupted};

/// Shader engine index from a trace file name such as `run_se3.att`.
pub fn parse_engine_index(filename: &str) -> Option<u32> {
    let name = Path::new(filename).file_name()?.to_str()?;
    let (_, suffix) = name.split_once("_se")?;
    let suffix = suffix.split("_se").next()?;
    let digits = suffix.split(".att").next()?;
    digits.parse().ok()
}

/// Everything a build produced besides the store contents.
#[derive(Debug)]
pub struct BuildOutput {
    /// Per-wave flight counts of each engine that kept at least one wave.
    pub flight_counts: Vec<Vec<Value>>,
    pub filenames: FilenamesAsset,
    pub max_line: usize,
    pub diagnostics: Diagnostics,
    /// Draw inputs kept for on-demand rendering.
    pub draw: Arc<DrawInfo>,
}

pub fn build_assets(
    bundle: TraceBundle,
    store: &dyn AssetStore,
    renderer: SharedRenderer,
    websocket_port: u16,
) -> BuildOutput {
    let TraceBundle {
        gfxv,
        att_filenames,
        engines,
        code,
        occupancy,
        draw,
    } = bundle;
    let mut diagnostics = Diagnostics::new();

    put_json_logged(store, OCCUPANCY_KEY, &occupancy_asset(&occupancy));

    // Read the local offset before the worker thread exists.
    let generation_time = clock::ctime_now();
    let draw = Arc::new(draw);
    let job = spawn_render_worker(renderer, DrawInfo::clone(&draw));

    if att_filenames.len() != engines.len() {
        log::warn!(
            "view: {} trace file names for {} engines; extra entries are ignored",
            att_filenames.len(),
            engines.len()
        );
    }

    let context = StitchContext {
        websocket_port,
        generation_time,
    };
    let mut filenames = FilenamesAsset {
        gfxv,
        ..FilenamesAsset::default()
    };
    let mut flight_counts = Vec::new();
    let mut max_line = 0;

    for (name, waves) in att_filenames.iter().zip(engines) {
        let Some(se) = parse_engine_index(name) else {
            diagnostics.push(Diagnostic::UnparsableTraceName { name: name.clone() });
            continue;
        };
        let report = stitch_engine(waves, se, &context, store);
        diagnostics.extend(report.diagnostics);
        let Some(summary_key) = report.summary_key else {
            continue;
        };
        max_line = max_line.max(report.max_line);
        filenames.se_filenames.push(summary_key);
        filenames.wave_filenames.insert(se, report.wave_keys);
        flight_counts.push(report.flight_counts);
    }

    let window = code_window(&code, max_line);
    put_json_logged(
        store,
        CODE_KEY,
        &CodeAsset {
            code: window,
            top_n: top_n(window),
        },
    );
    put_json_logged(store, FILENAMES_KEY, &filenames);

    let merge = job.join(store);
    diagnostics.extend(merge.diagnostics);

    BuildOutput {
        flight_counts,
        filenames,
        max_line,
        diagnostics,
        draw,
    }
}

fn put_json_logged<T: serde::Serialize + ?Sized>(store: &dyn AssetStore, key: &str, value: &T) {
    if let Err(e) = store.put_json(key, value) {
        log::warn!("view: could not encode {key}: {e}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewMode {
    Serve,
    Dump { out_dir: PathBuf },
    LocationsOnly,
}

pub struct ViewRequest {
    pub mode: ViewMode,
    pub ports: PortConfig,
    pub host: IpAddr,
    pub ui_dir: PathBuf,
    pub renderer: SharedRenderer,
}

#[derive(Debug)]
pub enum ViewOutcome {
    Locations(Vec<Vec<Value>>),
    Dumped(DumpSummary),
    Served,
}

#[derive(Debug)]
pub enum ViewError {
    Dump(DumpError),
    Serve(ServeError),
    Runtime(io::Error),
}

impl std::fmt::Display for ViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dump(e) => write!(f, "dump failed: {e}"),
            Self::Serve(e) => write!(f, "{e}"),
            Self::Runtime(e) => write!(f, "could not start runtime: {e}"),
        }
    }
}

impl std::error::Error for ViewError {}

impl From<DumpError> for ViewError {
    fn from(e: DumpError) -> Self {
        Self::Dump(e)
    }
}

impl From<ServeError> for ViewError {
    fn from(e: ServeError) -> Self {
        Self::Serve(e)
    }
}

/// Mark `store` as live and wrap it for the HTTP server.
pub fn prepare_serving(
    store: SharedAssetStore,
    renderer: SharedRenderer,
    draw: Arc<DrawInfo>,
    ui_dir: PathBuf,
) -> HttpState {
    put_json_logged(store.as_ref(), LIVE_KEY, &LiveAsset::serving());
    HttpState::new(store, ImageSynthesizer::new(renderer, draw), ui_dir)
}

/// Build the assets for `bundle`, then act on `request.mode`. Serve mode
/// blocks until interrupted.
pub fn view_trace(bundle: TraceBundle, request: ViewRequest) -> Result<ViewOutcome, ViewError> {
    let store = MemoryAssetStore::shared();
    let build = build_assets(
        bundle,
        store.as_ref(),
        Arc::clone(&request.renderer),
        request.ports.websocket(),
    );
    log::info!(
        "view: built {} assets ({} diagnostics)",
        store.keys().len(),
        build.diagnostics.len()
    );

    match request.mode {
        ViewMode::LocationsOnly => Ok(ViewOutcome::Locations(build.flight_counts)),
        ViewMode::Dump { out_dir } => {
            let summary = dump_assets(store.as_ref(), &request.ui_dir, &out_dir)?;
            Ok(ViewOutcome::Dumped(summary))
        }
        ViewMode::Serve => {
            let state = prepare_serving(store, request.renderer, build.draw, request.ui_dir);
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(ViewError::Runtime)?;
            let ports = request.ports;
            let addrs = ServeAddrs::new(request.host, ports);
            runtime.block_on(async move {
                let servers = BoundServers::bind(addrs)?;
                log::info!("serving at ports: {},{}", ports.http(), ports.websocket());
                serve_until_interrupted(servers, state).await
            })?;
            Ok(ViewOutcome::Served)
        }
    }
}
