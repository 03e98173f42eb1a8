#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use thumber::{
    config::Config,
    storage::FileStore,
    web::{AppState, create_router},
};

pub const BOUNDARY: &str = "thumber-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _uploads: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.uploads_path = uploads.path().join("uploads");
    customize(&mut config);

    let store = FileStore::new(&config.storage.uploads_path, config.storage.permissions);
    store.ensure_root().await.unwrap();

    let state = AppState::from_config(config, Arc::new(store)).unwrap();
    TestApp {
        router: create_router(state.clone()),
        state,
        _uploads: uploads,
    }
}

pub fn client(last_octet: u8) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, last_octet], 40_000))
}

pub async fn send(app: &TestApp, mut request: Request<Body>, from: SocketAddr) -> Response {
    request.extensions_mut().insert(ConnectInfo(from));
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str, from: SocketAddr) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request, from).await
}

pub async fn upload(app: &TestApp, contents: &[u8], from: SocketAddr) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body("file", contents)))
        .unwrap();
    send(app, request, from).await
}

pub fn multipart_body(field: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("response should redirect")
        .to_str()
        .unwrap()
        .to_string()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90, 255])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// Upload `contents` and return the new identifier
pub async fn upload_id(app: &TestApp, contents: &[u8], from: SocketAddr) -> String {
    let response = upload(app, contents, from).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = location(&response);
    location
        .rsplit('/')
        .next()
        .expect("redirect ends in the identifier")
        .to_string()
}
