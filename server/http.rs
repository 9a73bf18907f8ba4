/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Cacheless HTTP asset server.
//!
//! Every request is resolved against the asset store by its last path
//! segment, query included. A `*.png?<flags>` segment that is not stored yet
//! is rendered on demand before the lookup. A small whitelist of front-end
//! files is read from the UI directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, LAST_MODIFIED, PRAGMA};
use http::{HeaderValue, Method, StatusCode, Uri};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use traceview_core::assets::GRAPH_OPTIONS_KEY;
use traceview_core::{AssetStore, AssetStoreExt, SharedAssetStore, clock};

use crate::render::{DrawInfo, RenderError, RenderSelection, SharedRenderer};

const IMAGE_QUERY_MARKER: &str = ".png?";
const STATIC_FILES: [&str; 4] = ["/", "/styles.css", "/index.html", "/logo.svg"];
const INDEX_FILE: &str = "index.html";

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";
const OCTET_STREAM: &str = "application/octet-stream";
const IMAGE_PNG: &str = "image/png";
const APPLICATION_JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisError {
    NotAnImageQuery(String),
    InvalidFlags(String),
    Render(RenderError),
    /// The renderer did not produce the requested image name.
    MissingImage(String),
    RenderTaskFailed(String),
}

impl std::fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnImageQuery(key) => write!(f, "{key} is not an image query"),
            Self::InvalidFlags(flags) => write!(f, "invalid image flags '{flags}'"),
            Self::Render(e) => write!(f, "render failed: {e}"),
            Self::MissingImage(name) => write!(f, "renderer produced no {name}"),
            Self::RenderTaskFailed(e) => write!(f, "render task failed: {e}"),
        }
    }
}

impl std::error::Error for SynthesisError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthesis {
    AlreadyPresent,
    Rendered,
}

/// Renders image variants on demand. One render runs at a time, and a key
/// that appears in the store while waiting is not rendered again.
pub struct ImageSynthesizer {
    renderer: SharedRenderer,
    draw: Arc<DrawInfo>,
    gate: Mutex<()>,
}

impl ImageSynthesizer {
    pub fn new(renderer: SharedRenderer, draw: Arc<DrawInfo>) -> Self {
        Self {
            renderer,
            draw,
            gate: Mutex::new(()),
        }
    }

    /// Render `key` (`<name>.png?<flags>`) and store the image under the
    /// literal key, replacing `graph_options.json`.
    pub async fn synthesize(
        &self,
        store: &dyn AssetStore,
        key: &str,
    ) -> Result<Synthesis, SynthesisError> {
        let (stem, flags) = key
            .split_once(IMAGE_QUERY_MARKER)
            .ok_or_else(|| SynthesisError::NotAnImageQuery(key.to_string()))?;
        let selection = RenderSelection::from_flags(flags)
            .ok_or_else(|| SynthesisError::InvalidFlags(flags.to_string()))?;
        let image_name = format!("{stem}.png");

        let _guard = self.gate.lock().await;
        if store.has(key) {
            return Ok(Synthesis::AlreadyPresent);
        }

        let renderer = Arc::clone(&self.renderer);
        let draw = Arc::clone(&self.draw);
        let mut output = tokio::task::spawn_blocking(move || renderer.render(&draw, &selection))
            .await
            .map_err(|e| SynthesisError::RenderTaskFailed(e.to_string()))?
            .map_err(SynthesisError::Render)?;
        let image = output
            .images
            .remove(&image_name)
            .ok_or(SynthesisError::MissingImage(image_name))?;

        store.put_bytes(GRAPH_OPTIONS_KEY, output.options_json);
        store.put_bytes(key, image);
        log::debug!("http: synthesized {key}");
        Ok(Synthesis::Rendered)
    }
}

#[derive(Clone)]
pub struct HttpState {
    store: SharedAssetStore,
    synthesizer: Arc<ImageSynthesizer>,
    ui_dir: Arc<PathBuf>,
}

impl HttpState {
    pub fn new(store: SharedAssetStore, synthesizer: ImageSynthesizer, ui_dir: PathBuf) -> Self {
        Self {
            store,
            synthesizer: Arc::new(synthesizer),
            ui_dir: Arc::new(ui_dir),
        }
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .fallback(serve_request)
        .layer(middleware::map_response(disable_caching))
        .with_state(state)
}

pub async fn serve_http(
    listener: TcpListener,
    state: HttpState,
    cancel: CancellationToken,
) -> io::Result<()> {
    log::info!("http: serving assets on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

/// Last path segment, query included.
fn asset_key(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}

fn content_type_for(target: &str) -> &'static str {
    if target.contains(".b") {
        OCTET_STREAM
    } else if target.contains("timeline.png") {
        IMAGE_PNG
    } else {
        APPLICATION_JSON
    }
}

async fn serve_request(State(state): State<HttpState>, method: Method, uri: Uri) -> Response {
    let target = uri.path_and_query().map_or("/", |target| target.as_str());
    if method != Method::GET {
        log::warn!("http: unsupported method {method} {target}");
        return (StatusCode::NOT_IMPLEMENTED, "Unsupported method").into_response();
    }
    let key = asset_key(target);

    if target.contains(IMAGE_QUERY_MARKER) && !state.store.has(key) {
        if let Err(e) = state.synthesizer.synthesize(state.store.as_ref(), key).await {
            log::warn!("http: could not synthesize {key}: {e}");
        }
    }

    if target.contains(".json") || target.contains(".png") {
        return match state.store.get(key) {
            Some(bytes) => ok_response(
                bytes.to_vec(),
                content_type_for(target),
                clock::http_date_now(),
            ),
            None => {
                log::warn!("http: invalid asset request {target}; have {:?}", state.store.keys());
                not_found()
            }
        };
    }

    if STATIC_FILES.contains(&target) {
        return serve_static(&state.ui_dir, target).await;
    }

    log::warn!("http: invalid request {target}");
    not_found()
}

async fn serve_static(ui_dir: &Path, target: &str) -> Response {
    let name = match target.trim_start_matches('/') {
        "" => INDEX_FILE,
        name => name,
    };
    let path = ui_dir.join(name);
    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("http: could not read {}: {e}", path.display());
            return not_found();
        }
    };
    let modified = tokio::fs::metadata(&path)
        .await
        .and_then(|metadata| metadata.modified())
        .map(OffsetDateTime::from)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    ok_response(contents, mime.essence_str(), clock::http_date(modified))
}

fn ok_response(body: Vec<u8>, content_type: &str, last_modified: String) -> Response {
    let length = body.len();
    let mut response = Body::from(body).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(LAST_MODIFIED, value);
    }
    response
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

async fn disable_caching(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::to_bytes;
    use http::Request;
    use rstest::rstest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use traceview_core::MemoryAssetStore;

    use crate::render::RenderOutput;

    fn counting_renderer(calls: Arc<AtomicUsize>) -> SharedRenderer {
        Arc::new(
            move |_: &DrawInfo, selection: &RenderSelection| -> Result<RenderOutput, RenderError> {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut images = BTreeMap::new();
                images.insert("timeline.png".to_string(), format!("{selection:?}").into_bytes());
                Ok(RenderOutput {
                    options_json: br#"{"rendered":true}"#.to_vec(),
                    images,
                })
            },
        )
    }

    fn state_with(store: SharedAssetStore, calls: Arc<AtomicUsize>, ui_dir: PathBuf) -> HttpState {
        HttpState::new(
            store,
            ImageSynthesizer::new(counting_renderer(calls), Arc::new(DrawInfo::default())),
            ui_dir,
        )
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, http::HeaderMap, Vec<u8>) {
        send(app, Method::GET, uri).await
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
    ) -> (StatusCode, http::HeaderMap, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    fn assert_no_cache(headers: &http::HeaderMap) {
        assert_eq!(headers[CACHE_CONTROL], NO_CACHE);
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");
    }

    #[tokio::test]
    async fn known_key_is_served_without_caching() {
        let store = MemoryAssetStore::shared();
        store.put_bytes("se0_tr0.json", br#"{"name":"SE0-0"}"#.to_vec());
        let app = router(state_with(store, Arc::default(), std::env::temp_dir()));

        let (status, headers, body) = get(&app, "/se0_tr0.json").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, br#"{"name":"SE0-0"}"#);
        assert_eq!(headers[CONTENT_TYPE], APPLICATION_JSON);
        assert_eq!(headers[CONTENT_LENGTH], "16");
        assert!(headers[LAST_MODIFIED].to_str().unwrap().ends_with(" GMT"));
        assert_no_cache(&headers);
    }

    #[rstest]
    #[case("/missing.json")]
    #[case("/nested/missing.png")]
    #[case("/unknown.txt")]
    #[case("/index.htm")]
    #[tokio::test]
    async fn unknown_paths_are_not_found(#[case] uri: &str) {
        let app = router(state_with(
            MemoryAssetStore::shared(),
            Arc::default(),
            std::env::temp_dir(),
        ));

        let (status, headers, _) = get(&app, uri).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_no_cache(&headers);
    }

    #[rstest]
    #[case(Method::POST, "/code.json")]
    #[case(Method::PUT, "/code.json")]
    #[case(Method::DELETE, "/code.json")]
    #[case(Method::POST, "/timeline.png?11")]
    #[case(Method::HEAD, "/")]
    #[tokio::test]
    async fn only_get_is_served(#[case] method: Method, #[case] uri: &str) {
        let store = MemoryAssetStore::shared();
        store.put_bytes("code.json", b"{}".to_vec());
        let calls = Arc::new(AtomicUsize::new(0));
        let app = router(state_with(Arc::clone(&store), Arc::clone(&calls), std::env::temp_dir()));

        let (status, headers, _) = send(&app, method, uri).await;

        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_no_cache(&headers);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!store.has("timeline.png?11"));
    }

    #[tokio::test]
    async fn image_query_is_synthesized_once() {
        let store = MemoryAssetStore::shared();
        let calls = Arc::new(AtomicUsize::new(0));
        let app = router(state_with(Arc::clone(&store), Arc::clone(&calls), std::env::temp_dir()));

        let (first_status, headers, first) = get(&app, "/timeline.png?101").await;
        let (second_status, _, second) = get(&app, "/timeline.png?101").await;

        assert_eq!(first_status, StatusCode::OK);
        assert_eq!(second_status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], IMAGE_PNG);
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.has("timeline.png?101"));
        assert_eq!(
            store.get(GRAPH_OPTIONS_KEY).as_deref(),
            Some(br#"{"rendered":true}"#.as_slice())
        );
    }

    #[tokio::test]
    async fn stored_image_query_is_not_rerendered() {
        let store = MemoryAssetStore::shared();
        store.put_bytes("timeline.png?0", b"baked".to_vec());
        let calls = Arc::new(AtomicUsize::new(0));
        let app = router(state_with(store, Arc::clone(&calls), std::env::temp_dir()));

        let (status, _, body) = get(&app, "/timeline.png?0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"baked");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[rstest]
    #[case("/timeline.png?")]
    #[case("/timeline.png?1x0")]
    #[tokio::test]
    async fn invalid_flags_skip_synthesis(#[case] uri: &str) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = router(state_with(
            MemoryAssetStore::shared(),
            Arc::clone(&calls),
            std::env::temp_dir(),
        ));

        let (status, _, _) = get(&app, uri).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_render() {
        let store = MemoryAssetStore::shared();
        let calls = Arc::new(AtomicUsize::new(0));
        let synthesizer = Arc::new(ImageSynthesizer::new(
            counting_renderer(Arc::clone(&calls)),
            Arc::new(DrawInfo::default()),
        ));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let synthesizer = Arc::clone(&synthesizer);
                tokio::spawn(async move {
                    synthesizer
                        .synthesize(store.as_ref(), "timeline.png?11")
                        .await
                })
            })
            .collect();
        let mut outcomes = Vec::new();
        for task in tasks {
            outcomes.push(task.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == Synthesis::Rendered).count(), 1);
    }

    #[tokio::test]
    async fn synthesis_reports_missing_image_name() {
        let synthesizer = ImageSynthesizer::new(
            counting_renderer(Arc::default()),
            Arc::new(DrawInfo::default()),
        );
        let store = MemoryAssetStore::new();

        let result = synthesizer.synthesize(&store, "waves.png?1").await;

        assert_eq!(result, Err(SynthesisError::MissingImage("waves.png".to_string())));
        assert!(store.is_empty());
    }

    #[rstest]
    #[case("/data.b.json", OCTET_STREAM)]
    #[case("/timeline.png?01", IMAGE_PNG)]
    #[case("/occupancy.json", APPLICATION_JSON)]
    #[case("/other.png", APPLICATION_JSON)]
    fn content_type_follows_path(#[case] target: &str, #[case] expected: &str) {
        assert_eq!(content_type_for(target), expected);
    }

    #[tokio::test]
    async fn whitelisted_static_files_come_from_ui_dir() {
        let ui = TempDir::new().unwrap();
        std::fs::write(ui.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(ui.path().join("styles.css"), "body {}").unwrap();
        std::fs::write(ui.path().join("secret.txt"), "nope").unwrap();
        let app = router(state_with(
            MemoryAssetStore::shared(),
            Arc::default(),
            ui.path().to_path_buf(),
        ));

        let (status, headers, body) = get(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], "text/html");
        assert_eq!(body, b"<html></html>");
        assert_no_cache(&headers);

        let (status, headers, _) = get(&app, "/styles.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[CONTENT_TYPE], "text/css");

        let (status, _, _) = get(&app, "/logo.svg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(&app, "/secret.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
