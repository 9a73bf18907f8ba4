/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Non-fatal diagnostics.
//!
//! Data shaping never fails the run: a bad wave or a silent render worker
//! turns into fewer assets. Each such event is logged and recorded here so
//! callers and tests can count what was lost instead of inferring it from
//! missing files.

use std::fmt;

pub const CHANNEL_STITCH_WAVE_DROPPED: &str = "stitch.wave.dropped";
pub const CHANNEL_STITCH_ZERO_DURATION_UNIT: &str = "stitch.instruction.zero_duration_unit";
pub const CHANNEL_VIEW_UNPARSABLE_TRACE_NAME: &str = "view.trace_name.unparsable";
pub const CHANNEL_RENDER_WORKER_FAILED: &str = "render.worker.failed";
pub const CHANNEL_RENDER_ASSET_MISSING: &str = "render.asset.missing";

/// Why a wave was left out of the stitched output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Empty,
    LengthMismatch { stitched: usize, expected: usize },
    NonNumericField { instruction: usize },
    NegativeField { instruction: usize },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no stitched instructions"),
            Self::LengthMismatch { stitched, expected } => {
                write!(f, "stitched {stitched} of {expected} instructions")
            }
            Self::NonNumericField { instruction } => {
                write!(f, "instruction {instruction} has a non-numeric duration or hit count")
            }
            Self::NegativeField { instruction } => {
                write!(f, "instruction {instruction} has a negative duration or hit count")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    WaveDropped {
        se: u32,
        wave: usize,
        reason: DropReason,
    },
    /// The instruction kept a weight of zero instead of dividing by zero.
    ZeroDurationUnit {
        se: u32,
        wave: usize,
        instruction: usize,
    },
    UnparsableTraceName {
        name: String,
    },
    RenderWorkerFailed {
        reason: String,
    },
    MissingRenderAsset {
        key: String,
    },
}

impl Diagnostic {
    pub fn channel_id(&self) -> &'static str {
        match self {
            Self::WaveDropped { .. } => CHANNEL_STITCH_WAVE_DROPPED,
            Self::ZeroDurationUnit { .. } => CHANNEL_STITCH_ZERO_DURATION_UNIT,
            Self::UnparsableTraceName { .. } => CHANNEL_VIEW_UNPARSABLE_TRACE_NAME,
            Self::RenderWorkerFailed { .. } => CHANNEL_RENDER_WORKER_FAILED,
            Self::MissingRenderAsset { .. } => CHANNEL_RENDER_ASSET_MISSING,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaveDropped { se, wave, reason } => {
                write!(f, "SE{se} wave {wave} dropped: {reason}")
            }
            Self::ZeroDurationUnit {
                se,
                wave,
                instruction,
            } => write!(
                f,
                "SE{se} wave {wave} instruction {instruction} has a zero duration unit"
            ),
            Self::UnparsableTraceName { name } => {
                write!(f, "trace file name '{name}' has no _se<N>.att suffix")
            }
            Self::RenderWorkerFailed { reason } => write!(f, "render worker failed: {reason}"),
            Self::MissingRenderAsset { key } => {
                write!(f, "render worker did not produce '{key}'")
            }
        }
    }
}

/// Ordered list of diagnostics collected during one build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    events: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::ZeroDurationUnit { .. } => {
                log::debug!("{}: {diagnostic}", diagnostic.channel_id());
            }
            _ => log::warn!("{}: {diagnostic}", diagnostic.channel_id()),
        }
        self.events.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.events.extend(other.events);
    }

    pub fn events(&self) -> &[Diagnostic] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped_waves(&self) -> usize {
        self.count_channel(CHANNEL_STITCH_WAVE_DROPPED)
    }

    pub fn missing_render_assets(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Diagnostic::MissingRenderAsset { key } => Some(key.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn count_channel(&self, channel_id: &str) -> usize {
        self.events
            .iter()
            .filter(|event| event.channel_id() == channel_id)
            .count()
    }
}
