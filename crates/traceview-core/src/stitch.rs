/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Wave stitching.
//!
//! Turns one shader engine's decoded waves into time-ordered instruction
//! sequences. Each instruction's weight is `hit_count / duration_unit`; its
//! start time is the running sum of the weights before it. Incomplete waves
//! are dropped and reported through [`Diagnostics`], never raised.

use serde_json::Value;

use crate::assets::{EngineSummaryAsset, WaveAsset, WaveEntry, engine_summary_key, wave_key};
use crate::diagnostics::{Diagnostic, Diagnostics, DropReason};
use crate::store::{AssetStore, AssetStoreExt};
use crate::wave::{EventTuple, StitchedInstruction, WaveRecord};

/// Values stamped into every asset of one build.
#[derive(Debug, Clone)]
pub struct StitchContext {
    pub websocket_port: u16,
    pub generation_time: String,
}

/// Result of stitching one shader engine.
#[derive(Debug, Clone, Default)]
pub struct StitchReport {
    /// Flight-count sample of every retained wave, in wave order.
    pub flight_counts: Vec<Value>,
    pub wave_keys: Vec<String>,
    /// `se<N>_info.json`, present iff at least one wave was retained.
    pub summary_key: Option<String>,
    /// Highest source line reached by any retained wave.
    pub max_line: usize,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StitchedWave {
    pub instructions: Vec<StitchedInstruction>,
    /// Total stitched duration, i.e. the end time of the last instruction.
    pub duration: f64,
    /// Indices of instructions whose duration unit was zero.
    pub zero_duration_units: Vec<usize>,
}

/// Stitch one wave's events. A zero duration unit gives the instruction a
/// weight of zero; a negative duration unit or hit count rejects the wave.
pub fn stitch_events(events: Vec<EventTuple>) -> Result<StitchedWave, DropReason> {
    if events.is_empty() {
        return Err(DropReason::Empty);
    }

    let mut weights = Vec::with_capacity(events.len());
    let mut zero_duration_units = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let (Some(unit), Some(hits)) = (event.duration_unit(), event.hit_count()) else {
            return Err(DropReason::NonNumericField { instruction: index });
        };
        if unit < 0.0 || hits < 0.0 {
            return Err(DropReason::NegativeField { instruction: index });
        }
        if unit == 0.0 {
            zero_duration_units.push(index);
            weights.push(0.0);
        } else {
            weights.push(hits / unit);
        }
    }

    let mut current_time = 0.0;
    let instructions = events
        .into_iter()
        .zip(weights)
        .map(|(event, duration_weight)| {
            let start_time = current_time;
            current_time += duration_weight;
            StitchedInstruction {
                event,
                start_time,
                duration_weight,
            }
        })
        .collect();

    Ok(StitchedWave {
        instructions,
        duration: current_time,
        zero_duration_units,
    })
}

/// Stitch every wave of shader engine `se`, writing one asset per retained
/// wave plus the engine summary into `store`.
pub fn stitch_engine(
    waves: Vec<WaveRecord>,
    se: u32,
    context: &StitchContext,
    store: &dyn AssetStore,
) -> StitchReport {
    log::info!("stitch: SE{se} has {} traces", waves.len());
    let mut report = StitchReport::default();

    for (wave_id, wave) in waves.into_iter().enumerate() {
        if !wave.is_complete() {
            let reason = if wave.is_empty() {
                DropReason::Empty
            } else {
                DropReason::LengthMismatch {
                    stitched: wave.stitched.len(),
                    expected: wave.num_insts,
                }
            };
            report.diagnostics.push(Diagnostic::WaveDropped {
                se,
                wave: wave_id,
                reason,
            });
            continue;
        }

        let WaveRecord {
            stitched,
            loop_count,
            mem_unroll,
            count,
            max_line,
            num_insts,
        } = wave;

        let stitched = match stitch_events(stitched) {
            Ok(stitched) => stitched,
            Err(reason) => {
                report.diagnostics.push(Diagnostic::WaveDropped {
                    se,
                    wave: wave_id,
                    reason,
                });
                continue;
            }
        };
        for instruction in &stitched.zero_duration_units {
            report.diagnostics.push(Diagnostic::ZeroDurationUnit {
                se,
                wave: wave_id,
                instruction: *instruction,
            });
        }

        report.max_line = report.max_line.max(max_line);
        report.flight_counts.push(count);

        let key = wave_key(se, wave_id);
        let asset = WaveAsset {
            name: format!("SE{se}-{wave_id}"),
            num_stitched: stitched.instructions.len(),
            wave: WaveEntry {
                id: wave_id,
                instructions: stitched.instructions,
                waitcnt: mem_unroll,
            },
            duration: stitched.duration,
            loop_count,
            num_insts,
            websocket_port: context.websocket_port,
            generation_time: context.generation_time.clone(),
        };
        match store.put_json(&key, &asset) {
            Ok(()) => report.wave_keys.push(key),
            Err(e) => log::warn!("stitch: could not encode {key}: {e}"),
        }
    }

    if !report.wave_keys.is_empty() {
        let key = engine_summary_key(se);
        let summary = EngineSummaryAsset {
            name: format!("SE{se}"),
            websocket_port: context.websocket_port,
            generation_time: context.generation_time.clone(),
        };
        match store.put_json(&key, &summary) {
            Ok(()) => report.summary_key = Some(key),
            Err(e) => log::warn!("stitch: could not encode {key}: {e}"),
        }
    }

    log::debug!(
        "stitch: SE{se} kept {} waves, dropped {}",
        report.wave_keys.len(),
        report.diagnostics.dropped_waves()
    );
    report
}
