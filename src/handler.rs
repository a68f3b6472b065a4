use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use utoipa::OpenApi;

use std::{any::Any, sync::Arc};

use crate::{
    dto::{
        AttachmentRequest, Endpoints, HealthResponse, MailRequest, MailResult, NotFoundResponse,
        ServiceInfo,
    },
    service::EmailService,
};

#[derive(OpenApi)]
#[openapi(
    paths(send_email, health_check, root),
    components(schemas(
        MailRequest,
        AttachmentRequest,
        MailResult,
        HealthResponse,
        ServiceInfo,
        Endpoints
    )),
    tags(
        (name = "mail", description = "Mail relay API")
    )
)]
pub struct ApiDoc;

/// Send request read from a JSON or form-encoded body. Any other content type
/// yields an empty request, which then fails validation.
pub struct MailPayload(pub MailRequest);

impl FromRequest<Arc<EmailService>> for MailPayload {
    type Rejection = Response;

    async fn from_request(req: Request, state: &Arc<EmailService>) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let parsed = if content_type.starts_with("application/x-www-form-urlencoded") {
            Form::<MailRequest>::from_request(req, state)
                .await
                .map(|Form(request)| request)
                .map_err(|e| e.body_text())
        } else if content_type.starts_with("application/json") || content_type.contains("+json") {
            Json::<MailRequest>::from_request(req, state)
                .await
                .map(|Json(request)| request)
                .map_err(|e| e.body_text())
        } else {
            Ok(MailRequest::default())
        };

        parsed.map(Self).map_err(|details| {
            tracing::error!("Failed to parse send request body: {details}");
            server_error(
                "invalid request body",
                details,
                state.config().is_development(),
            )
        })
    }
}

#[utoipa::path(
    post,
    path = "/api/send-email",
    request_body(
        content = MailRequest,
        description = "JSON or form-encoded (flat fields only) mail-send request"
    ),
    responses(
        (status = 200, description = "Message accepted by the SMTP server", body = MailResult),
        (status = 400, description = "Missing required field", body = MailResult),
        (status = 500, description = "Unparsable body, configuration or SMTP failure", body = MailResult)
    ),
    tag = "mail"
)]
#[debug_handler]
pub async fn send_email(
    State(service): State<Arc<EmailService>>,
    MailPayload(request): MailPayload,
) -> Response {
    let (status, result) = service.handle(request).await;
    (status, Json(result)).into_response()
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "mail"
)]
#[debug_handler]
pub async fn health_check() -> Response {
    (StatusCode::OK, Json(EmailService::health())).into_response()
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service metadata", body = ServiceInfo)
    ),
    tag = "mail"
)]
#[debug_handler]
pub async fn root() -> Response {
    (StatusCode::OK, Json(EmailService::info())).into_response()
}

pub async fn not_found(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            success: false,
            message: "route not found".to_string(),
            path: uri.path().to_string(),
        }),
    )
        .into_response()
}

fn server_error(message: &str, details: String, expose_details: bool) -> Response {
    let error = if expose_details {
        details
    } else {
        "internal server error".to_string()
    };

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MailResult::failed(message, error)),
    )
        .into_response()
}

/// Turns a handler panic into a JSON 500. The panic message is only exposed
/// in development.
pub fn panic_response(
    expose_details: bool,
) -> impl Fn(Box<dyn Any + Send + 'static>) -> Response + Clone {
    move |err| {
        let details = err
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| err.downcast_ref::<&str>().map(ToString::to_string))
            .unwrap_or_else(|| "unknown panic".to_string());

        tracing::error!("Request handler panicked: {details}");

        server_error("internal server error", details, expose_details)
    }
}
