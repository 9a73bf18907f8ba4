/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use bpaf::Bpaf;

use crate::bundle::{BundleError, TraceBundle};
use crate::config::{ConfigError, ViewerConfig};
use crate::render::TimelineRenderer;
use crate::view::{ViewError, ViewMode, ViewOutcome, ViewRequest, view_trace};

/// Serve or dump a decoded GPU instruction trace.
#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
pub struct Options {
    /// HTTP and WebSocket ports, both above 5000
    #[bpaf(long, short('p'), argument("HTTP,WS"))]
    pub ports: Option<String>,
    /// Write every asset to the output directory instead of serving
    #[bpaf(long, short('d'), switch)]
    pub dump: bool,
    /// Print the per-engine flight counts and exit
    #[bpaf(long, switch)]
    pub locations_only: bool,
    /// TOML settings file
    #[bpaf(long, argument("PATH"))]
    pub config: Option<PathBuf>,
    /// Directory holding index.html, styles.css and logo.svg
    #[bpaf(long, argument("DIR"))]
    pub ui_dir: Option<PathBuf>,
    /// Output directory for --dump
    #[bpaf(long, argument("DIR"))]
    pub out_dir: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `traceview=debug`
    #[bpaf(long, argument("FILTER"))]
    pub log_filter: Option<String>,
    /// Decoded trace bundle (JSON)
    #[bpaf(positional("BUNDLE"))]
    pub bundle: PathBuf,
}

#[derive(Debug)]
pub enum CliError {
    Config(ConfigError),
    Bundle(BundleError),
    View(ViewError),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(e) => e.exit_code(),
            Self::Bundle(e) => e.exit_code(),
            Self::View(_) => 1,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "{e}"),
            Self::Bundle(e) => write!(f, "{e}"),
            Self::View(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<BundleError> for CliError {
    fn from(e: BundleError) -> Self {
        Self::Bundle(e)
    }
}

impl From<ViewError> for CliError {
    fn from(e: ViewError) -> Self {
        Self::View(e)
    }
}

pub fn main() {
    let opts = options().run();
    crate::init_tracing(opts.log_filter.as_deref());
    log::debug!("traceview {}", crate::VERSION);

    if let Err(e) = run(opts) {
        log::error!("{e}");
        eprintln!("traceview: {e}");
        process::exit(e.exit_code());
    }
}

/// Resolve configuration, validate ports, then build and act on the bundle.
/// Ports are checked before the bundle is read.
pub fn run(opts: Options) -> Result<(), CliError> {
    let request = resolve_request(&opts)?;
    let bundle = TraceBundle::load(&opts.bundle)?;

    match view_trace(bundle, request)? {
        ViewOutcome::Locations(counts) => match serde_json::to_string(&counts) {
            Ok(json) => println!("{json}"),
            Err(e) => log::warn!("cli: could not encode flight counts: {e}"),
        },
        ViewOutcome::Dumped(summary) => {
            if !summary.skipped.is_empty() {
                log::warn!("cli: {} assets skipped", summary.skipped.len());
            }
        }
        ViewOutcome::Served => {}
    }
    Ok(())
}

pub fn resolve_request(opts: &Options) -> Result<ViewRequest, ConfigError> {
    let config = match &opts.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    }
    .with_env_overrides();

    let ports = config.ports(opts.ports.as_deref())?;
    let mode = if opts.locations_only {
        ViewMode::LocationsOnly
    } else if opts.dump {
        ViewMode::Dump {
            out_dir: opts.out_dir.clone().unwrap_or_else(|| config.dump_dir.clone()),
        }
    } else {
        ViewMode::Serve
    };
    let ui_dir = opts.ui_dir.clone().unwrap_or_else(|| config.ui_dir.clone());
    let host = match mode {
        ViewMode::Serve => config.host_addr(),
        _ => config.host.unwrap_or(std::net::Ipv4Addr::LOCALHOST.into()),
    };

    Ok(ViewRequest {
        mode,
        ports,
        host,
        ui_dir,
        renderer: Arc::new(TimelineRenderer::default()),
    })
}
