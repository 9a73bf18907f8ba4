/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Portable kernel for traceview.
//!
//! Owns everything that does not touch a socket or a thread: the decoded wave
//! model, wave stitching, the hot-line selector, asset naming and the asset
//! store every producer and server shares.

pub mod assets;
pub mod clock;
pub mod diagnostics;
pub mod stitch;
pub mod store;
pub mod top_n;
pub mod wave;

pub use diagnostics::{Diagnostic, Diagnostics, DropReason};
pub use stitch::{StitchContext, StitchReport, stitch_engine};
pub use store::{
    AssetBytes, AssetStore, AssetStoreExt, MemoryAssetStore, SharedAssetStore, merge_entries,
};
pub use top_n::{TOP_N, TopNEntry, top_n};
pub use wave::{CodeLine, EventTuple, StitchedInstruction, WaveRecord};
