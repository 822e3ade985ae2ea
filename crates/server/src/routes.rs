use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use tillroll_ocr::{OcrBackend, ReceiptPipeline, ScanResult};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Span};
use uuid::Uuid;

use crate::error::ApiError;

pub type SharedPipeline = Arc<ReceiptPipeline<Arc<dyn OcrBackend>>>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: SharedPipeline,
}

impl AppState {
    pub fn new(recognizer: Arc<dyn OcrBackend>) -> Self {
        Self { pipeline: Arc::new(ReceiptPipeline::new(recognizer)) }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /upload` with a multipart `file` field.
#[tracing::instrument(name = "upload", skip_all, fields(request_id = %Uuid::new_v4()))]
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScanResult>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        upload = Some((filename, data));
        break;
    }
    let (filename, data) = upload.ok_or(ApiError::MissingFile)?;
    info!(filename = %filename, bytes = data.len(), "receipt uploaded");

    // Preprocessing and recognition are CPU-bound.
    let pipeline = Arc::clone(&state.pipeline);
    let span = Span::current();
    let result = tokio::task::spawn_blocking(move || {
        span.in_scope(|| pipeline.process_bytes(&filename, &data))
    })
    .await??;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use tillroll_ocr::{MockRecognizer, NormalizedImage, OcrError};
    use tower::ServiceExt;

    const BOUNDARY: &str = "tillroll-test-boundary";

    struct FailingRecognizer;

    impl OcrBackend for FailingRecognizer {
        fn recognize(&self, _image: &NormalizedImage) -> Result<Vec<String>, OcrError> {
            Err(OcrError::Engine("engine offline".into()))
        }
    }

    fn app_with(recognizer: Arc<dyn OcrBackend>) -> Router {
        router(AppState::new(recognizer), 1024 * 1024)
    }

    fn receipt_png() -> Vec<u8> {
        let img = RgbImage::from_fn(40, 20, |x, y| {
            if y % 6 < 2 && x % 5 < 3 {
                Rgb([20, 20, 20])
            } else {
                Rgb([235, 235, 225])
            }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, body.len())
            .header(header::ORIGIN, "http://example.com")
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn upload_returns_scan_result() {
        let app = app_with(Arc::new(MockRecognizer::new(["12/05/2023", "TOTAL 15.00"])));
        let req = upload_request(multipart_body("file", "receipt.png", &receipt_png()));

        let (status, json) = send(app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["filename"], "receipt.png");
        assert_eq!(json["raw_text"], "12/05/2023\nTOTAL 15.00");
        assert_eq!(json["date"], "12/05/2023");
        assert_eq!(json["total"], "15.00");
        assert!(json["processed_image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn absent_fields_are_null() {
        let app = app_with(Arc::new(MockRecognizer::new(["THANK YOU"])));
        let req = upload_request(multipart_body("file", "r.png", &receipt_png()));
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["date"].is_null());
        assert!(json["total"].is_null());
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let app = app_with(Arc::new(MockRecognizer::new(["x"])));
        let req = upload_request(multipart_body("photo", "r.png", &receipt_png()));
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("'file'"));
    }

    #[tokio::test]
    async fn undecodable_upload_is_bad_request() {
        let app = app_with(Arc::new(MockRecognizer::new(["x"])));
        let req = upload_request(multipart_body("file", "notes.txt", b"plain text"));
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn engine_failure_is_server_error() {
        let app = app_with(Arc::new(FailingRecognizer));
        let req = upload_request(multipart_body("file", "r.png", &receipt_png()));
        let (status, json) = send(app, req).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["detail"].as_str().unwrap().contains("engine offline"));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = router(AppState::new(Arc::new(MockRecognizer::new(["x"]))), 64);
        let req = upload_request(multipart_body("file", "r.png", &receipt_png()));
        let (status, _) = send(app, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let app = app_with(Arc::new(MockRecognizer::new(["x"])));
        let req = upload_request(multipart_body("file", "r.png", &receipt_png()));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}
