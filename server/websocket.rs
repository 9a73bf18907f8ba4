/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Source excerpt server.
//!
//! Each text message `<path>:<line>:<unused>` is answered with the whole file
//! rendered as an HTML list, the requested line marked for highlighting.

use std::fmt::Write as _;
use std::io;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const NBSP: char = '\u{a0}';
const TAB_WIDTH: usize = 4;
const LINE_NUMBER_WIDTH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest<'a> {
    pub path: &'a str,
    /// Any integer; a line outside the file highlights nothing.
    pub line: i64,
}

impl<'a> SourceRequest<'a> {
    /// Split from the right so the path itself may contain `:`.
    pub fn parse(message: &'a str) -> Option<Self> {
        let mut fields = message.rsplitn(3, ':');
        let _unused = fields.next()?;
        let line = fields.next()?.trim().parse().ok()?;
        let path = fields.next()?;
        Some(Self { path, line })
    }
}

/// Spaces become non-breaking spaces; tabs become four of them.
pub fn fix_space(line: &str) -> String {
    let mut fixed = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            ' ' => fixed.push(NBSP),
            '\t' => fixed.extend(std::iter::repeat_n(NBSP, TAB_WIDTH)),
            '&' => fixed.push_str("&amp;"),
            '<' => fixed.push_str("&lt;"),
            '>' => fixed.push_str("&gt;"),
            _ => fixed.push(ch),
        }
    }
    fixed
}

/// Split on `\n`, `\r\n` and a lone `\r`, without the terminators.
fn source_lines(source: &str) -> impl Iterator<Item = &str> {
    source
        .split_terminator('\n')
        .flat_map(|line| line.strip_suffix('\r').unwrap_or(line).split('\r'))
}

/// Render `source` as `<li>` items numbered from 1; only `highlight` gets the
/// marker class.
pub fn highlight_source(source: &str, highlight: i64) -> String {
    let mut html = String::new();
    for (number, text) in (1..).zip(source_lines(source)) {
        let marker = if number == highlight { "highlight" } else { "" };
        let _ = write!(
            html,
            "<li class=\"line_{number}{marker}\">{number:<LINE_NUMBER_WIDTH$}{}</li>",
            fix_space(text)
        );
    }
    html
}

/// Reply for one request message.
pub async fn source_excerpt(message: &str) -> String {
    let Some(request) = SourceRequest::parse(message) else {
        log::warn!("websocket: malformed request {message:?}");
        return format!("invalid request: {message}");
    };
    match tokio::fs::read(request.path).await {
        Ok(bytes) => highlight_source(&String::from_utf8_lossy(&bytes), request.line),
        Err(e) => {
            log::debug!("websocket: could not open {} ({e})", request.path);
            format!("{} not found!", request.path)
        }
    }
}

pub async fn serve_websocket(listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
    log::info!("websocket: serving sources on ws://{}", listener.local_addr()?);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("websocket: cancelled");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, cancel.clone()));
                }
                Err(e) => log::warn!("websocket: accept failed ({e})"),
            },
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            log::debug!("websocket: handshake with {peer} failed ({e})");
            return;
        }
    };
    let (mut outgoing, mut incoming) = socket.split();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = incoming.next() => message,
        };
        let reply = match message {
            Some(Ok(Message::Text(text))) => source_excerpt(text.as_str()).await,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                log::debug!("websocket: {peer} read failed ({e})");
                break;
            }
        };
        if let Err(e) = outgoing.send(Message::text(reply)).await {
            log::debug!("websocket: {peer} write failed ({e})");
            break;
        }
    }
    let _ = outgoing.close().await;
}
