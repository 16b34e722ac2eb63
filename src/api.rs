//! HTTP surface for Rusty Scribe.
//!
//! This module exposes an Axum router over [`ScribeApi`]:
//!
//! - `POST /files` – Multipart upload (`file` parts). Accepted files are queued and processed in
//!   the background; `?wait=true` returns once processing finished.
//! - `GET /files`, `GET /files/:id`, `DELETE /files/:id`, `DELETE /files` – Workspace management.
//! - `GET /files/:id/preview` – The stored bytes with their declared content type.
//! - `POST /files/:id/process` – Process a `queued` file or retry an `error` one. Successful files
//!   answer `409`.
//! - `POST /files/:id/crop` – Re-extract an image from a cropped copy, from any state but
//!   `processing`.
//! - `GET /files/:id/export/:format` – Download `txt`, `md`, `csv`, `pdf` or `docx`.
//! - `POST /summarize`, `POST /translate`, `POST /keywords` – Assist operations on raw text.
//! - `GET /session`, `GET /plans`, `POST /checkout`, `POST /contact` – Plan and usage.
//! - `POST /auth/signup`, `POST /auth/login` – Email authentication.
//! - `GET /metrics`, `GET /commands` – Counters and a machine-readable command catalog.
//!
//! Identity comes from `Authorization: Bearer <id token>`; requests without one run anonymously.

use crate::assist::AssistError;
use crate::backend::{AuthSession, BackendError};
use crate::billing::{BillingError, CheckoutOutcome, ContactRequest, ContactTicket, PaymentGateway};
use crate::export::{ExportError, ExportFormat};
use crate::metrics::MetricsSnapshot;
use crate::plans::{self, Limit, PlanId, PlanOffer};
use crate::processing::{ProcessedFile, ProcessingError, Upload, UploadReport};
use crate::service::{ScribeApi, ServiceError};
use crate::session::SessionSnapshot;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const UPLOAD_FIELD: &str = "file";

/// Build the HTTP router.
///
/// `max_upload_bytes` bounds request bodies; per-plan file limits are enforced separately.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: ScribeApi + 'static,
{
    Router::new()
        .route(
            "/files",
            get(list_files::<S>)
                .post(upload_files::<S>)
                .delete(clear_files::<S>),
        )
        .route("/files/:id", get(get_file::<S>).delete(remove_file::<S>))
        .route("/files/:id/preview", get(preview_file::<S>))
        .route("/files/:id/process", post(process_file::<S>))
        .route("/files/:id/crop", post(crop_file::<S>))
        .route("/files/:id/export/:format", get(export_file::<S>))
        .route("/summarize", post(summarize::<S>))
        .route("/translate", post(translate::<S>))
        .route("/keywords", post(keywords::<S>))
        .route("/session", get(get_session::<S>))
        .route("/plans", get(get_plans))
        .route("/checkout", post(checkout::<S>))
        .route("/contact", post(contact::<S>))
        .route("/auth/signup", post(sign_up::<S>))
        .route("/auth/login", post(sign_in::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn session<S>(service: &S, headers: &HeaderMap) -> Result<SessionSnapshot, AppError>
where
    S: ScribeApi,
{
    Ok(service.resolve_session(bearer_token(headers)).await?)
}

/// Query string for `POST /files`.
#[derive(Deserialize)]
struct UploadQuery {
    /// Await processing before responding.
    #[serde(default)]
    wait: bool,
}

/// Accept one or more `file` parts and start processing.
async fn upload_files<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadReport>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ServiceError::Validation(error.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream().to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|error| ServiceError::Validation(error.body_text()))?;
        uploads.push(Upload {
            name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }
    if uploads.is_empty() {
        return Err(ServiceError::Validation("At least one `file` part is required".into()).into());
    }

    let report = service.upload(&session, uploads, query.wait).await;
    tracing::info!(
        files = report.files.len(),
        accepted = report.files.iter().filter(|file| file.is_accepted()).count(),
        wait = query.wait,
        "Upload request completed"
    );
    Ok(Json(report))
}

/// Response body for `GET /files`.
#[derive(Serialize)]
struct FilesResponse {
    files: Vec<ProcessedFile>,
}

async fn list_files<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
) -> Result<Json<FilesResponse>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(FilesResponse {
        files: service.files(&session),
    }))
}

async fn get_file<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ProcessedFile>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(service.file(&session, id)?))
}

async fn remove_file<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    service.remove_file(&session, id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Response body for `DELETE /files`.
#[derive(Serialize)]
struct ClearResponse {
    removed: usize,
}

async fn clear_files<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
) -> Result<Json<ClearResponse>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(ClearResponse {
        removed: service.clear_files(&session),
    }))
}

/// Serve the stored upload under its declared content type.
async fn preview_file<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    let file = service.file(&session, id)?;
    let content_type = HeaderValue::from_str(&file.file.mime_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok((
        [(header::CONTENT_TYPE, content_type)],
        file.file.bytes.to_vec(),
    )
        .into_response())
}

async fn process_file<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ProcessedFile>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(service.process_file(&session, id).await?))
}

/// Request body for `POST /files/:id/crop`.
#[derive(Deserialize)]
struct CropRequest {
    /// Cropped image as a `data:` URI.
    data_uri: String,
}

async fn crop_file<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<CropRequest>,
) -> Result<Json<ProcessedFile>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(service.crop_file(&session, id, &request.data_uri).await?))
}

/// Render an export as an attachment.
async fn export_file<S>(
    State(service): State<Arc<S>>,
    Path((id, format)): Path<(Uuid, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError>
where
    S: ScribeApi,
{
    let format: ExportFormat = format.parse().map_err(ServiceError::Export)?;
    let session = session(service.as_ref(), &headers).await?;
    let artifact = service.export_file(&session, id, format)?;
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace('"', "")
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response())
}

/// Request body for `POST /summarize` and `POST /keywords`.
#[derive(Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Serialize)]
struct SummaryResponse {
    summary: String,
}

async fn summarize<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(request): Json<TextRequest>,
) -> Result<Json<SummaryResponse>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    let summary = service.summarize(&session, &request.text).await?;
    Ok(Json(SummaryResponse { summary }))
}

/// Request body for `POST /translate`.
#[derive(Deserialize)]
struct TranslateRequest {
    text: String,
    /// Defaults to English.
    #[serde(default)]
    target_language: Option<String>,
}

#[derive(Serialize)]
struct TranslateResponse {
    translated_text: String,
}

async fn translate<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(request): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    let translated_text = service
        .translate(&session, &request.text, request.target_language.as_deref())
        .await?;
    Ok(Json(TranslateResponse { translated_text }))
}

#[derive(Serialize)]
struct KeywordsResponse {
    keywords: Vec<String>,
}

async fn keywords<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(request): Json<TextRequest>,
) -> Result<Json<KeywordsResponse>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    let keywords = service.keywords(&session, &request.text).await?;
    Ok(Json(KeywordsResponse { keywords }))
}

/// Response body for `GET /session`.
#[derive(Serialize)]
struct SessionResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    plan: PlanId,
    period: String,
    usage: u64,
    quota: Limit,
    remaining: Option<u64>,
    limit_reached: bool,
}

impl From<SessionSnapshot> for SessionResponse {
    fn from(session: SessionSnapshot) -> Self {
        Self {
            authenticated: session.is_authenticated(),
            uid: session.uid().map(str::to_string),
            email: session
                .identity
                .as_ref()
                .and_then(|identity| identity.email.clone()),
            plan: session.plan,
            usage: session.usage,
            quota: session.quota(),
            remaining: session.remaining(),
            limit_reached: session.limit_reached(),
            period: session.period,
        }
    }
}

async fn get_session<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(session.into()))
}

#[derive(Serialize)]
struct PlansResponse {
    plans: Vec<PlanOffer>,
}

async fn get_plans() -> Json<PlansResponse> {
    Json(PlansResponse {
        plans: plans::catalog(),
    })
}

/// Request body for `POST /checkout`.
#[derive(Deserialize)]
struct CheckoutRequest {
    plan: String,
    /// `stripe` (default), `paypal` or `tap`.
    #[serde(default)]
    gateway: Option<String>,
}

async fn checkout<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>, AppError>
where
    S: ScribeApi,
{
    let plan: PlanId = request
        .plan
        .parse()
        .map_err(|_| ServiceError::Validation(format!("Unknown plan: {}", request.plan)))?;
    let gateway = request
        .gateway
        .as_deref()
        .map(str::parse::<PaymentGateway>)
        .transpose()
        .map_err(ServiceError::Billing)?;
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(service.select_plan(&session, plan, gateway).await?))
}

async fn contact<S>(
    State(service): State<Arc<S>>,
    headers: HeaderMap,
    Json(request): Json<ContactRequest>,
) -> Result<Json<ContactTicket>, AppError>
where
    S: ScribeApi,
{
    let session = session(service.as_ref(), &headers).await?;
    Ok(Json(service.contact(&session, request)?))
}

/// Request body for the auth endpoints.
#[derive(Deserialize)]
struct CredentialsRequest {
    email: String,
    password: String,
}

async fn sign_up<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthSession>), AppError>
where
    S: ScribeApi,
{
    let auth = service.sign_up(&request.email, &request.password).await?;
    Ok((StatusCode::CREATED, Json(auth)))
}

async fn sign_in<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<AuthSession>, AppError>
where
    S: ScribeApi,
{
    Ok(Json(service.sign_in(&request.email, &request.password).await?))
}

/// Return the processing counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: ScribeApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

fn command(
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        method,
        path,
        description,
        request_example: None,
    }
}

/// Enumerate supported HTTP commands for discovery in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            command(
                "upload",
                "POST",
                "/files",
                "Multipart upload with one or more `file` parts. Rejected files are reported with an error; accepted files are processed in the background unless `?wait=true`.",
            ),
            command("list_files", "GET", "/files", "List workspace files, newest first."),
            command("get_file", "GET", "/files/{id}", "Return one file, including its table view when tabular."),
            command("remove_file", "DELETE", "/files/{id}", "Remove a file and release its bytes."),
            command("clear_files", "DELETE", "/files", "Remove every file of the workspace."),
            command("preview_file", "GET", "/files/{id}/preview", "Return the stored upload with its content type."),
            command("process_file", "POST", "/files/{id}/process", "Process or retry a queued or failed file. Already processed files return 409; use crop to redo an image. Counts against the monthly quota."),
            CommandDescriptor {
                request_example: Some(json!({ "data_uri": "data:image/png;base64,iVBORw0KGgo=" })),
                ..command(
                    "crop_file",
                    "POST",
                    "/files/{id}/crop",
                    "Reprocess an image file with a cropped version. Counts against the monthly quota.",
                )
            },
            command(
                "export_file",
                "GET",
                "/files/{id}/export/{format}",
                "Download extracted text as txt, md, csv (tables only), pdf or docx (pro plans and above).",
            ),
            CommandDescriptor {
                request_example: Some(json!({ "text": "Quarterly revenue grew..." })),
                ..command("summarize", "POST", "/summarize", "Summarize text. Blocked once the quota is used up; not billed.")
            },
            CommandDescriptor {
                request_example: Some(json!({ "text": "Bonjour", "target_language": "English" })),
                ..command("translate", "POST", "/translate", "Translate text, English by default. Not billed.")
            },
            CommandDescriptor {
                request_example: Some(json!({ "text": "Invoice for cloud hosting" })),
                ..command("keywords", "POST", "/keywords", "Extract search keywords from text. Not billed.")
            },
            command("session", "GET", "/session", "Return identity, plan, usage and remaining quota."),
            command("plans", "GET", "/plans", "Return the pricing catalog."),
            CommandDescriptor {
                request_example: Some(json!({ "plan": "pro", "gateway": "stripe" })),
                ..command("checkout", "POST", "/checkout", "Switch plans through the mocked checkout.")
            },
            CommandDescriptor {
                request_example: Some(json!({ "subject": "Enterprise", "message": "We need SSO." })),
                ..command("contact", "POST", "/contact", "Contact sales about enterprise or custom plans.")
            },
            CommandDescriptor {
                request_example: Some(json!({ "email": "user@example.com", "password": "secret1" })),
                ..command("sign_up", "POST", "/auth/signup", "Create an email account on the free plan.")
            },
            command("sign_in", "POST", "/auth/login", "Sign in with email and password; returns an ID token."),
            command("metrics", "GET", "/metrics", "Return processing counters."),
        ],
    })
}

struct AppError(ServiceError);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Processing(error) => match error {
                ProcessingError::NotFound(_) => StatusCode::NOT_FOUND,
                ProcessingError::LimitReached(_) => StatusCode::PAYMENT_REQUIRED,
                ProcessingError::Busy(_) | ProcessingError::AlreadyProcessed(_) => {
                    StatusCode::CONFLICT
                }
                ProcessingError::Rejected(_)
                | ProcessingError::NotCroppable
                | ProcessingError::InvalidDataUri(_) => StatusCode::BAD_REQUEST,
            },
            ServiceError::Export(error) => match error {
                ExportError::UnknownFormat(_) | ExportError::NotTabular => StatusCode::BAD_REQUEST,
                ExportError::NotReady => StatusCode::CONFLICT,
                ExportError::PlanRequired { .. } => StatusCode::FORBIDDEN,
                ExportError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServiceError::Assist(error) => match error {
                AssistError::EmptyText | AssistError::EmptyLanguage => StatusCode::BAD_REQUEST,
                AssistError::LimitReached(_) => StatusCode::PAYMENT_REQUIRED,
                AssistError::Remote(_) => StatusCode::BAD_GATEWAY,
            },
            ServiceError::Billing(error) => match error {
                BillingError::SignInRequired => StatusCode::UNAUTHORIZED,
                BillingError::UnknownGateway(_) | BillingError::InvalidContact(_) => {
                    StatusCode::BAD_REQUEST
                }
                BillingError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
                BillingError::Backend(error) => backend_status(error),
            },
            ServiceError::Backend(error) => backend_status(error),
        }
    }
}

fn backend_status(error: &BackendError) -> StatusCode {
    match error {
        BackendError::Unauthorized(_) | BackendError::InvalidCredentials => {
            StatusCode::UNAUTHORIZED
        }
        BackendError::EmailInUse => StatusCode::CONFLICT,
        BackendError::Rejected(_) => StatusCode::BAD_REQUEST,
        BackendError::NotFound(_) => StatusCode::NOT_FOUND,
        BackendError::Contention(_) | BackendError::Unavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        BackendError::RequestFailed(_) | BackendError::InvalidResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self.0, "Request failed");
        } else {
            tracing::debug!(%status, error = %self.0, "Request rejected");
        }
        match self.0 {
            ServiceError::Processing(ProcessingError::LimitReached(notice))
            | ServiceError::Assist(AssistError::LimitReached(notice)) => {
                (status, Json(notice)).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}
