use axum::{
    body::to_bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::{Result, ServiceError};
use crate::server::AppState;
use crate::shim::{ApiRequest, RequestBody};

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// The shim only routes on path and query; the authority is a placeholder so
// any bind address (IPv6 included) yields a valid URL.
const LOCAL_BASE: &str = "http://localhost";

pub async fn dispatch(State(app_state): State<Arc<AppState>>, request: Request) -> Response {
    match to_api_request(request).await {
        Ok(api_request) => app_state.shim.handle(&api_request).await.into_response(),
        Err(e) => {
            tracing::warn!("Unreadable request: {}", e);
            e.into_response()
        }
    }
}

async fn to_api_request(request: Request) -> Result<ApiRequest> {
    let method = request.method().clone();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let url = format!("{LOCAL_BASE}{path_and_query}");

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let body = if is_multipart {
        read_file_field(request).await?
    } else {
        let bytes = to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| ServiceError::BadRequest(format!("unreadable body: {e}")))?;
        if bytes.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Json(bytes)
        }
    };

    ApiRequest::new(method, &url, body)
}

// Only the `file` field matters; other fields are skipped.
async fn read_file_field(request: Request) -> Result<RequestBody> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ServiceError::BadRequest(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(e.body_text()))?;
        return Ok(RequestBody::File { file_name, content });
    }
    Ok(RequestBody::Empty)
}

#[cfg(test)]
mod tests {
    use crate::config::{Settings, StorageBackend};
    use crate::server::{AppState, build_shim, handlers};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> axum::Router {
        app_with(Settings::default())
    }

    fn app_with(mut config: Settings) -> axum::Router {
        config.storage.backend = StorageBackend::Memory;
        let shim = build_shim(&config).unwrap();
        let routes = handlers::routes(&shim);
        routes.with_state(Arc::new(AppState { config, shim }))
    }

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(request).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn settings_served_at_root_and_api_prefix() {
        let app = app();
        for uri in ["/settings", "/api/settings"] {
            let (status, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["tariffs"].as_array().unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn support_conversation_over_http() {
        let app = app();
        let (status, body) = send(
            &app,
            post_json("/api/questions", json!({ "user_id": 1, "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));

        let (_, list) = send(&app, get("/api/questions?user_id=1")).await;
        assert_eq!(list[0]["message"], json!("hi"));
        assert!(list[0]["answer"].is_null());

        let (_, body) = send(
            &app,
            post_json("/api/questions/answer", json!({ "user_id": 1, "answer": "ok" })),
        )
        .await;
        assert_eq!(body, json!({ "status": "ok" }));

        let (_, list) = send(&app, get("/api/questions?user_id=1&admin=true")).await;
        assert_eq!(list[0]["answer"], json!("ok"));
    }

    #[tokio::test]
    async fn multipart_upload_returns_file_url() {
        let app = app();
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"note.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri("/questions/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let url = body["file_url"].as_str().unwrap();
        assert!(url.starts_with("/uploads/file_"));
        assert!(url.ends_with("_note.txt"));
    }

    #[tokio::test]
    async fn ipv6_bind_address_serves_requests() {
        let mut config = Settings::default();
        config.server.host = "::".to_string();
        let app = app_with(config);

        let (status, body) = send(&app, get("/api/settings")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tariffs"].as_array().unwrap().len(), 3);

        let (status, body) = send(
            &app,
            post_json("/api/questions", json!({ "user_id": 2, "message": "v6" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
    }

    #[tokio::test]
    async fn errors_are_json() {
        let app = app();
        let (status, body) = send(&app, get("/api/oferta")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());

        let (status, body) = send(&app, get("/questions/answer")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(body["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/payments")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{broken"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
