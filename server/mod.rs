/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The two long-lived server units.
//!
//! The HTTP asset server and the WebSocket source server run side by side
//! under one [`CancellationToken`] and one [`JoinSet`]. When either unit
//! exits, the other is cancelled, so both stop together.

pub mod http;
pub mod websocket;

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ServeAddrs;

pub use self::http::{HttpState, ImageSynthesizer};

const LISTEN_BACKLOG: u32 = 1024;
const HTTP_UNIT: &str = "http";
const WEBSOCKET_UNIT: &str = "websocket";

#[derive(Debug)]
pub enum ServeError {
    Bind { addr: SocketAddr, source: io::Error },
    Unit { name: &'static str, source: io::Error },
    Panicked(String),
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "could not bind {addr}: {source}"),
            Self::Unit { name, source } => write!(f, "{name} server failed: {source}"),
            Self::Panicked(message) => write!(f, "server unit panicked: {message}"),
        }
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } | Self::Unit { source, .. } => Some(source),
            Self::Panicked(_) => None,
        }
    }
}

/// Bind a listener with `SO_REUSEADDR` set. Must be called inside a runtime.
pub fn bind_reusable(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Both listeners, bound and ready to serve.
pub struct BoundServers {
    http: TcpListener,
    websocket: TcpListener,
}

impl BoundServers {
    pub fn bind(addrs: ServeAddrs) -> Result<Self, ServeError> {
        let bind = |addr| bind_reusable(addr).map_err(|source| ServeError::Bind { addr, source });
        Ok(Self {
            http: bind(addrs.http)?,
            websocket: bind(addrs.websocket)?,
        })
    }

    /// Actual `(http, websocket)` addresses; differs from the request when
    /// port 0 was asked for.
    pub fn local_addrs(&self) -> io::Result<(SocketAddr, SocketAddr)> {
        Ok((self.http.local_addr()?, self.websocket.local_addr()?))
    }

    /// Serve until `cancel` fires or either unit exits. Returns the first
    /// unit failure, if any.
    pub async fn run(self, state: HttpState, cancel: CancellationToken) -> Result<(), ServeError> {
        let Self { http, websocket } = self;
        let mut units = JoinSet::new();

        let http_cancel = cancel.clone();
        units.spawn(async move {
            let result = http::serve_http(http, state, http_cancel).await;
            (HTTP_UNIT, result)
        });
        let websocket_cancel = cancel.clone();
        units.spawn(async move {
            let result = websocket::serve_websocket(websocket, websocket_cancel).await;
            (WEBSOCKET_UNIT, result)
        });
        log::debug!("server: {} units spawned", units.len());

        let mut first_error = None;
        while let Some(joined) = units.join_next().await {
            cancel.cancel();
            let error = match joined {
                Ok((name, Ok(()))) => {
                    log::debug!("server: {name} unit stopped");
                    continue;
                }
                Ok((name, Err(source))) => ServeError::Unit { name, source },
                Err(e) => ServeError::Panicked(e.to_string()),
            };
            log::warn!("server: {error}");
            first_error.get_or_insert(error);
        }
        log::debug!("server: all units joined");

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Serve until Ctrl-C.
pub async fn serve_until_interrupted(
    servers: BoundServers,
    state: HttpState,
) -> Result<(), ServeError> {
    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => {}
            interrupted = tokio::signal::ctrl_c() => match interrupted {
                Ok(()) => {
                    log::info!("Exiting.");
                    watcher.cancel();
                }
                Err(e) => log::warn!("server: could not listen for Ctrl-C ({e})"),
            },
        }
    });
    servers.run(state, cancel).await
}
