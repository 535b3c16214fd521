//! Request-routing shim.
//!
//! Callers issue ordinary HTTP-shaped requests. Requests whose URL carries
//! one of the configured intercept markers are answered by the
//! [`MockService`] through the [`RouteTable`]; everything else goes to the
//! network. An intercepted request with no route follows
//! [`UnknownRoutePolicy`]: `passthrough` sends it to the network as well,
//! `reject` answers `404 {error}`.

pub mod routes;

pub use routes::{Resolution, Route, RouteEntry, RouteTable};

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ShimConfig, UnknownRoutePolicy};
use crate::error::{Result, ServiceError};
use crate::http_client::{client_with_timeout, direct_client_with_timeout, should_bypass_proxy};
use crate::service::{AnswerRequest, InvoiceRequest, MockService, QuestionFilter};
use crate::store::UserId;

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Bytes),
    /// Multipart upload reduced to its `file` field.
    File { file_name: String, content: Bytes },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, url: &str, body: RequestBody) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| ServiceError::BadRequest(format!("invalid url {url:?}: {e}")))?;
        Ok(Self { method, url, body })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url, RequestBody::Empty)
    }

    pub fn post_json<T: Serialize>(url: &str, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)?;
        Self::new(Method::POST, url, RequestBody::Json(Bytes::from(bytes)))
    }

    pub fn upload(url: &str, file_name: &str, content: impl Into<Bytes>) -> Result<Self> {
        Self::new(
            Method::POST,
            url,
            RequestBody::File {
                file_name: file_name.to_string(),
                content: content.into(),
            },
        )
    }

    fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            RequestBody::Json(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| ServiceError::BadRequest(format!("invalid JSON body: {e}"))),
            RequestBody::Empty => Err(ServiceError::BadRequest("JSON body is required".into())),
            RequestBody::File { .. } => {
                Err(ServiceError::BadRequest("expected a JSON body".into()))
            }
        }
    }
}

/// Synthetic (or passed-through) HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self> {
        Ok(Self {
            status,
            content_type: "application/json".to_string(),
            body: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    pub fn ok<T: Serialize>(value: &T) -> Result<Self> {
        Self::json(StatusCode::OK, value)
    }

    pub fn from_error(err: &ServiceError) -> Self {
        Self {
            status: err.status_code(),
            content_type: "application/json".to_string(),
            body: Bytes::from(err.body().to_string()),
        }
    }

    pub fn json_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

pub struct Shim {
    service: Arc<MockService>,
    routes: RouteTable,
    policy: UnknownRoutePolicy,
    intercept: Vec<String>,
    client: reqwest::Client,
    // Used for loopback targets when a proxy is configured.
    direct: reqwest::Client,
}

impl Shim {
    pub fn new(service: Arc<MockService>, routes: RouteTable, config: &ShimConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.passthrough_timeout_secs);
        let client = client_with_timeout(timeout)?;
        let direct = direct_client_with_timeout(timeout)?;
        tracing::info!(
            "Shim intercepting {:?}, unknown routes: {:?}",
            config.intercept,
            config.unknown_route
        );
        Ok(Self {
            service,
            routes,
            policy: config.unknown_route,
            intercept: config.intercept.clone(),
            client,
            direct,
        })
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn service(&self) -> &Arc<MockService> {
        &self.service
    }

    pub fn intercepts(&self, url: &Url) -> bool {
        let s = url.as_str();
        self.intercept.iter().any(|marker| s.contains(marker.as_str()))
    }

    /// Entry point for presentation code: never fails, every error becomes a
    /// JSON error response.
    pub async fn fetch(&self, request: ApiRequest) -> ApiResponse {
        if !self.intercepts(&request.url) {
            return self.forward(&request).await;
        }

        match self.routes.resolve(&request.method, request.url.path()) {
            Resolution::Matched(route) => self.respond(route, &request).await,
            Resolution::MethodNotAllowed => ApiResponse::from_error(&self.method_not_allowed(&request)),
            Resolution::Unknown => match self.policy {
                UnknownRoutePolicy::Passthrough => self.forward(&request).await,
                UnknownRoutePolicy::Reject => ApiResponse::from_error(&self.unknown(&request)),
            },
        }
    }

    /// Local dispatch only; unknown routes are always rejected.
    pub async fn handle(&self, request: &ApiRequest) -> ApiResponse {
        match self.routes.resolve(&request.method, request.url.path()) {
            Resolution::Matched(route) => self.respond(route, request).await,
            Resolution::MethodNotAllowed => ApiResponse::from_error(&self.method_not_allowed(request)),
            Resolution::Unknown => ApiResponse::from_error(&self.unknown(request)),
        }
    }

    async fn respond(&self, route: Route, request: &ApiRequest) -> ApiResponse {
        tracing::debug!(method = %request.method, path = %request.url.path(), ?route, "API request");
        match self.dispatch(route, request).await {
            Ok(response) => {
                tracing::debug!(status = %response.status, ?route, "API response");
                response
            }
            Err(e) => {
                if e.status_code().is_server_error() {
                    tracing::error!(?route, "API error: {}", e);
                } else {
                    tracing::warn!(?route, "API request rejected: {}", e);
                }
                ApiResponse::from_error(&e)
            }
        }
    }

    async fn dispatch(&self, route: Route, request: &ApiRequest) -> Result<ApiResponse> {
        let svc = &self.service;
        match route {
            Route::ListSubscriptions => ApiResponse::ok(&svc.list_subscriptions().await?),
            Route::AddSubscription => {
                ApiResponse::ok(&svc.add_subscription(request.json_body()?).await?)
            }
            Route::ListPayments => ApiResponse::ok(&svc.list_payments().await?),
            Route::AddPayment => ApiResponse::ok(&svc.add_payment(request.json_body()?).await?),
            Route::ListQuestions => {
                let filter = QuestionFilter {
                    user_id: request
                        .query("user_id")
                        .filter(|v| !v.trim().is_empty())
                        .map(UserId::Text),
                    include_admin: request.query("admin").as_deref() == Some("true"),
                };
                ApiResponse::ok(&svc.list_questions(&filter).await?)
            }
            Route::AddQuestion => ApiResponse::ok(&svc.add_question(request.json_body()?).await?),
            Route::AnswerQuestion => {
                let body: AnswerRequest = request.json_body()?;
                ApiResponse::ok(&svc.answer_question(&body.user_id, &body.answer).await?)
            }
            Route::UploadFile => match &request.body {
                RequestBody::File { file_name, .. } => {
                    ApiResponse::ok(&svc.upload_file(file_name).await?)
                }
                _ => Err(ServiceError::BadRequest(
                    "multipart field `file` is required".into(),
                )),
            },
            Route::CreateInvoice => {
                let body: InvoiceRequest = request.json_body()?;
                ApiResponse::ok(&svc.create_invoice(body).await?)
            }
            Route::GetSettings => ApiResponse::ok(&svc.get_settings().await?),
            Route::GetUser => {
                let user_id = request
                    .query("user_id")
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| ServiceError::BadRequest("user_id is required".into()))?;
                ApiResponse::ok(&svc.get_user(&UserId::Text(user_id)).await?)
            }
            Route::SaveUser => ApiResponse::ok(&svc.save_user(request.json_body()?).await?),
        }
    }

    async fn forward(&self, request: &ApiRequest) -> ApiResponse {
        tracing::debug!(method = %request.method, url = %request.url, "Passing request through");
        match self.passthrough(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(url = %request.url, "Passthrough failed: {}", e);
                ApiResponse::from_error(&e)
            }
        }
    }

    async fn passthrough(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let client = if should_bypass_proxy(request.url.as_str()) {
            &self.direct
        } else {
            &self.client
        };
        let mut builder = client.request(request.method.clone(), request.url.clone());
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            RequestBody::File { file_name, content } => {
                let part = reqwest::multipart::Part::bytes(content.to_vec())
                    .file_name(file_name.clone());
                builder.multipart(reqwest::multipart::Form::new().part("file", part))
            }
        };

        let resp = builder.send().await?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = resp.bytes().await?;
        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }

    fn unknown(&self, request: &ApiRequest) -> ServiceError {
        ServiceError::UnknownEndpoint {
            method: request.method.to_string(),
            path: request.url.path().to_string(),
        }
    }

    fn method_not_allowed(&self, request: &ApiRequest) -> ServiceError {
        ServiceError::MethodNotAllowed {
            method: request.method.to_string(),
            path: request.url.path().to_string(),
        }
    }
}
