/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Interactive backend for GPU instruction trace visualization.
//!
//! A decoded trace bundle is stitched into per-wave timeline assets while a
//! render worker draws the occupancy diagrams. The resulting asset store is
//! then written to disk or served over HTTP, next to a WebSocket endpoint that
//! returns highlighted source excerpts.

pub mod bundle;
pub mod cli;
pub mod config;
pub mod dump;
pub mod render;
pub mod server;
pub mod view;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global subscriber. `TRACEVIEW_LOG` wins over `filter`; `log`
/// records are forwarded to the subscriber. Calling this twice is harmless.
pub fn init_tracing(filter: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(config::ENV_LOG)
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        log::debug!("tracing subscriber already installed");
    }
}
