/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use traceview_core::MemoryAssetStore;

use traceview::VERSION;
use traceview::bundle::TraceBundle;
use traceview::config::{PortConfig, ServeAddrs};
use traceview::render::{DrawInfo, TimelineRenderer};
use traceview::server::BoundServers;
use traceview::view::{ViewMode, ViewOutcome, ViewRequest, prepare_serving, view_trace};

fn event(unit: u64, hits: u64) -> Value {
    json!([unit, 0, hits, "s_waitcnt", 2])
}

fn bundle() -> TraceBundle {
    let bundle = json!({
        "gfxv": "gfx1100",
        "att_filenames": ["capture_se0.att", "capture_se1.att"],
        "engines": [
            [
                {"stitched": [], "num_insts": 0},
                {"stitched": [event(1, 1)], "num_insts": 3},
            ],
            [
                {
                    "stitched": [event(2, 4), event(1, 1)],
                    "count": [[0, 1]],
                    "max_line": 2,
                    "num_insts": 2,
                },
            ],
        ],
        "code": [
            ["s_waitcnt", 0, 0, 0, 1, 0, 4, 8],
            ["s_endpgm", 0, 0, 0, 2, 0, 1, 1],
        ],
        "occupancy": [[0, 1]],
    });
    TraceBundle::from_json_slice(bundle.to_string().as_bytes()).expect("bundle")
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).expect("read")).expect("json")
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn dump_keeps_only_the_engine_with_a_valid_wave() {
    let ui = TempDir::new().unwrap();
    std::fs::write(ui.path().join("index.html"), "<html></html>").unwrap();
    let out = TempDir::new().unwrap();
    let out_dir = out.path().join("ui");

    let request = ViewRequest {
        mode: ViewMode::Dump {
            out_dir: out_dir.clone(),
        },
        ports: PortConfig::default(),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ui_dir: ui.path().to_path_buf(),
        renderer: Arc::new(TimelineRenderer::new(64, 32)),
    };

    let outcome = view_trace(bundle(), request).expect("dump");
    assert!(matches!(outcome, ViewOutcome::Dumped(_)));

    let mut names: Vec<String> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "code.json",
            "filenames.json",
            "graph_options.json",
            "index.html",
            "live.json",
            "occupancy.json",
            "se1_info.json",
            "se1_tr0.json",
            "timeline.png",
        ]
    );

    assert_eq!(read_json(&out_dir.join("live.json")), json!({"live": 0}));
    let wave = read_json(&out_dir.join("se1_tr0.json"));
    assert_eq!(wave["name"], json!("SE1-0"));
    assert_eq!(wave["duration"], json!(3.0));
    assert_eq!(wave["websocket_port"], json!(PortConfig::default().websocket()));
    assert_eq!(
        read_json(&out_dir.join("filenames.json"))["se_filenames"],
        json!(["se1_info.json"])
    );
}

/// Two distinct ports that were free a moment ago.
fn free_ports() -> (u16, u16) {
    let first = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let second = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = |listener: &std::net::TcpListener| listener.local_addr().expect("addr").port();
    (port(&first), port(&second))
}

#[tokio::test]
async fn validated_ports_are_the_ports_bound() {
    let (http, websocket) = free_ports();
    let ports = PortConfig::parse(&format!("{http},{websocket}"))
        .expect("ephemeral ports are above 5000");

    let servers =
        BoundServers::bind(ServeAddrs::new(IpAddr::V4(Ipv4Addr::LOCALHOST), ports)).expect("bind");
    let (bound_http, bound_websocket) = servers.local_addrs().expect("addrs");

    assert_eq!(bound_http, SocketAddr::from(([127, 0, 0, 1], ports.http())));
    assert_eq!(bound_websocket, SocketAddr::from(([127, 0, 0, 1], ports.websocket())));
}

#[tokio::test]
async fn served_store_reports_live_over_tcp() {
    let store = MemoryAssetStore::shared();
    let servers = BoundServers::bind(ServeAddrs {
        http: SocketAddr::from(([127, 0, 0, 1], 0)),
        websocket: SocketAddr::from(([127, 0, 0, 1], 0)),
    })
    .expect("bind");
    let (http, _) = servers.local_addrs().expect("addrs");
    let state = prepare_serving(
        Arc::clone(&store),
        Arc::new(TimelineRenderer::new(64, 32)),
        Arc::new(DrawInfo::default()),
        std::env::temp_dir(),
    );
    let cancel = CancellationToken::new();
    let running = tokio::spawn(servers.run(state, cancel.clone()));

    let response = raw_get(http, "/live.json").await;

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(
        response
            .to_ascii_lowercase()
            .contains("cache-control: no-cache, no-store, must-revalidate")
    );
    assert!(response.ends_with(r#"{"live":1}"#));

    cancel.cancel();
    running.await.unwrap().expect("clean shutdown");
}

async fn raw_get(addr: SocketAddr, path: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(
            format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .as_bytes(),
        )
        .await
        .expect("write");
    let mut response = String::new();
    stream.read_to_string(&mut response).await.expect("read");
    response
}
