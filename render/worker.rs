/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Render worker orchestration.
//!
//! The initial diagram render runs on its own thread while the caller stitches
//! waves. The worker owns a copy of the draw inputs and reports back over a
//! single-slot channel; [`RenderJob::join`] is the one synchronization point,
//! after which every produced entry is merged into the asset store.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, bounded};

use traceview_core::assets::{GRAPH_OPTIONS_KEY, PerfCounterAsset, perfcounter_key};
use traceview_core::{AssetStore, Diagnostic, Diagnostics, merge_entries};

use super::{DrawInfo, RenderError, RenderSelection, SharedRenderer};

const WORKER_THREAD_NAME: &str = "render-worker";

/// What the worker sends back: everything it produced, plus the render error
/// if the diagram itself failed.
#[derive(Debug, Default)]
pub struct WorkerReport {
    pub entries: Vec<(String, Vec<u8>)>,
    pub error: Option<RenderError>,
}

/// Outcome of joining the worker.
#[derive(Debug, Default)]
pub struct RenderMerge {
    pub merged: usize,
    pub diagnostics: Diagnostics,
}

/// Handle to the in-flight initial render.
pub struct RenderJob {
    handle: Option<JoinHandle<()>>,
    results: Receiver<WorkerReport>,
    expected: Vec<String>,
}

/// Keys the initial render must produce.
pub fn expected_keys(draw: &DrawInfo) -> Vec<String> {
    std::iter::once(GRAPH_OPTIONS_KEY.to_string())
        .chain((0..draw.events.len()).map(perfcounter_key))
        .collect()
}

/// Start the initial render of `draw` on a dedicated thread.
pub fn spawn_render_worker(renderer: SharedRenderer, draw: DrawInfo) -> RenderJob {
    let expected = expected_keys(&draw);
    let (tx, results) = bounded(1);
    let handle = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || {
            let report = render_initial_assets(renderer.as_ref(), &draw);
            if tx.send(report).is_err() {
                log::debug!("render_worker: result dropped, job already gone");
            }
        });
    let handle = match handle {
        Ok(handle) => {
            log::debug!("render_worker: spawned");
            Some(handle)
        }
        Err(e) => {
            log::warn!("render_worker: could not spawn ({e})");
            None
        }
    };
    RenderJob {
        handle,
        results,
        expected,
    }
}

/// Initial render: options document, default-selection images and one
/// counter document per engine.
pub fn render_initial_assets(
    renderer: &dyn super::DiagramRenderer,
    draw: &DrawInfo,
) -> WorkerReport {
    let mut report = WorkerReport::default();

    match renderer.render(draw, &RenderSelection::default()) {
        Ok(output) => {
            report
                .entries
                .push((GRAPH_OPTIONS_KEY.to_string(), output.options_json));
            report.entries.extend(output.images);
        }
        Err(e) => report.error = Some(e),
    }

    for (engine, samples) in draw.events.iter().enumerate() {
        let asset = PerfCounterAsset {
            data: samples.iter().map(|sample| sample.to_tuple()).collect(),
        };
        match serde_json::to_vec(&asset) {
            Ok(encoded) => report.entries.push((perfcounter_key(engine), encoded)),
            Err(e) => log::warn!("render_worker: could not encode counters for SE{engine}: {e}"),
        }
    }

    report
}

impl RenderJob {
    pub fn expected_keys(&self) -> &[String] {
        &self.expected
    }

    /// Block until the worker exits, then merge its output into `store`.
    /// Entries already in the store survive unless the worker produced the
    /// same key. Expected keys still absent afterwards are reported.
    pub fn join(mut self, store: &dyn AssetStore) -> RenderMerge {
        let mut merge = RenderMerge::default();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                merge.diagnostics.push(Diagnostic::RenderWorkerFailed {
                    reason: "render worker panicked".to_string(),
                });
            }
        }

        match self.results.try_recv() {
            Ok(report) => {
                if let Some(error) = report.error {
                    merge.diagnostics.push(Diagnostic::RenderWorkerFailed {
                        reason: error.to_string(),
                    });
                }
                merge.merged = merge_entries(store, report.entries);
            }
            Err(_) if merge.diagnostics.is_empty() => {
                merge.diagnostics.push(Diagnostic::RenderWorkerFailed {
                    reason: "render worker exited without results".to_string(),
                });
            }
            Err(_) => {}
        }

        for key in &self.expected {
            if !store.has(key) {
                merge
                    .diagnostics
                    .push(Diagnostic::MissingRenderAsset { key: key.clone() });
            }
        }

        log::info!(
            "render_worker: merged {} assets ({} diagnostics)",
            merge.merged,
            merge.diagnostics.len()
        );
        merge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use traceview_core::{AssetStoreExt, MemoryAssetStore};

    use crate::render::{CounterSample, RenderOutput};

    fn draw_with_counters(engines: usize) -> DrawInfo {
        DrawInfo {
            timelines: vec![vec![1.0]; engines],
            events: (0..engines)
                .map(|engine| {
                    vec![CounterSample {
                        time: engine as u64,
                        values: vec![1.0],
                    }]
                })
                .collect(),
            counter_names: vec!["GRBM_COUNT".to_string()],
        }
    }

    fn fixed_renderer() -> SharedRenderer {
        Arc::new(|_: &DrawInfo, _: &RenderSelection| -> Result<RenderOutput, RenderError> {
            let mut images = BTreeMap::new();
            images.insert("timeline.png".to_string(), b"png".to_vec());
            Ok(RenderOutput {
                options_json: br#"{"variants":[]}"#.to_vec(),
                images,
            })
        })
    }

    #[test]
    fn join_merges_everything_the_worker_produced() {
        let store = MemoryAssetStore::new();
        store.put_bytes("se0_tr0.json", b"stitched".to_vec());

        let job = spawn_render_worker(fixed_renderer(), draw_with_counters(2));
        let merge = job.join(&store);

        assert_eq!(merge.merged, 4);
        assert!(merge.diagnostics.is_empty());
        assert_eq!(
            store.keys(),
            vec![
                "graph_options.json",
                "se0_perfcounter.json",
                "se0_tr0.json",
                "se1_perfcounter.json",
                "timeline.png",
            ]
        );
        let counters: serde_json::Value =
            serde_json::from_slice(&store.get("se1_perfcounter.json").expect("stored"))
                .expect("decode");
        assert_eq!(counters, serde_json::json!({"data": [[1, 1.0]]}));
    }

    #[test]
    fn render_failure_still_merges_counters_and_reports_missing_options() {
        let store = MemoryAssetStore::new();
        let failing: SharedRenderer =
            Arc::new(|_: &DrawInfo, _: &RenderSelection| -> Result<RenderOutput, RenderError> {
                Err(RenderError::Encode("no backend".to_string()))
            });

        let merge = spawn_render_worker(failing, draw_with_counters(1)).join(&store);

        assert_eq!(merge.merged, 1);
        assert!(store.has("se0_perfcounter.json"));
        assert_eq!(merge.diagnostics.missing_render_assets(), vec!["graph_options.json"]);
        assert_eq!(
            merge
                .diagnostics
                .count_channel(traceview_core::diagnostics::CHANNEL_RENDER_WORKER_FAILED),
            1
        );
    }

    #[test]
    fn panicking_worker_is_reported_not_propagated() {
        let store = MemoryAssetStore::new();
        let panicking: SharedRenderer =
            Arc::new(|_: &DrawInfo, _: &RenderSelection| -> Result<RenderOutput, RenderError> {
                panic!("renderer crashed")
            });

        let merge = spawn_render_worker(panicking, DrawInfo::default()).join(&store);

        assert_eq!(merge.merged, 0);
        assert!(store.is_empty());
        assert_eq!(merge.diagnostics.missing_render_assets(), vec!["graph_options.json"]);
        assert_eq!(merge.diagnostics.len(), 2);
    }

    #[test]
    fn worker_renders_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let renderer: SharedRenderer = Arc::new(
            move |_: &DrawInfo, _: &RenderSelection| -> Result<RenderOutput, RenderError> {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(RenderOutput::default())
            },
        );

        let job = spawn_render_worker(renderer, DrawInfo::default());
        assert_eq!(job.expected_keys(), ["graph_options.json".to_string()]);
        job.join(&MemoryAssetStore::new());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
