use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use portal_core::{
    AiGateway, BlobStore, InMemoryBlobStore, InMemoryMediaStore, InMemorySessionStore,
    InMemoryUserStore, MediaKind, MediaRecord, MediaRegistry, MediaStore, NewUser, PortalError,
    PostgresStore, Role, SessionStore, Summary, Turn, User, UserStore, rank, reply_with_retry,
    require_patient,
};

use crate::config::Config;
use crate::drive::DriveStore;
use crate::gemini::GeminiGateway;
use crate::models::{
    ChatRequest, ChatResponse, CreateUserRequest, DeleteMediaResponse, MediaUploadResponse,
    PrescriptionRequest, PrescriptionResponse,
};
use crate::prescription;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn map_portal_error(err: PortalError) -> ApiError {
    if err.is_not_found() {
        return not_found_error(&err.to_string());
    }
    match err {
        PortalError::DuplicateEmail(_) => bad_request_error(&err.to_string()),
        other => {
            error!(error = %other, "request failed");
            internal_error("request failed", &other.to_string())
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub media: MediaRegistry,
    pub blobs: Arc<dyn BlobStore>,
    pub gateway: Arc<dyn AiGateway>,
}

pub async fn create_app(config: &Config) -> anyhow::Result<Router> {
    let state = create_app_state(config).await?;
    Ok(build_router(state))
}

async fn create_app_state(config: &Config) -> anyhow::Result<AppState> {
    let (users, sessions, media_store): (
        Arc<dyn UserStore>,
        Arc<dyn SessionStore>,
        Arc<dyn MediaStore>,
    ) = match &config.database_url {
        Some(url) => {
            info!("using PostgreSQL storage");
            let store = Arc::new(PostgresStore::connect(url).await?);
            (store.clone(), store.clone(), store)
        }
        None => {
            info!("using in-memory storage (set DATABASE_URL to use PostgreSQL)");
            let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
            (
                users.clone(),
                Arc::new(InMemorySessionStore::new(users.clone())),
                Arc::new(InMemoryMediaStore::new()),
            )
        }
    };

    let blobs: Arc<dyn BlobStore> = match &config.drive_access_token {
        Some(token) => {
            info!("using Google Drive blob storage");
            Arc::new(DriveStore::new(token, config.drive_folder_id.clone()))
        }
        None => {
            info!("using in-memory blob storage (set DRIVE_ACCESS_TOKEN to use Google Drive)");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    let media = MediaRegistry::new(media_store, blobs.clone(), users.clone());
    let gateway: Arc<dyn AiGateway> = Arc::new(GeminiGateway::new(&config.gemini_api_key));

    Ok(AppState {
        users,
        sessions,
        media,
        blobs,
        gateway,
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/users", post(create_user))
        .route("/patients", get(list_patients))
        .route("/chat", post(chat))
        .route("/patients/{patient_id}/sessions", get(list_sessions))
        .route("/patients/{patient_id}/media", get(list_media))
        .route("/doctor/patients/{patient_id}/summaries", get(ranked_summaries))
        .route("/doctor/prescriptions", post(create_prescription))
        .route("/media", post(upload_media))
        .route("/media/transcriptions", post(upload_transcription))
        .route("/media/{media_id}", delete(delete_media))
        .route("/media/{media_id}/content", get(media_content))
        .layer(from_fn(correlation_id_middleware))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-correlation-id",
        HeaderValue::from_str(&correlation_id).unwrap(),
    );

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Patient Portal API",
        "version": "0.1.0",
        "endpoints": {
            "POST /chat": "Send a chat message (creates the session on first use)",
            "GET /patients/{id}/sessions": "List a patient's chat sessions",
            "GET /doctor/patients/{id}/summaries": "Triage-ranked session summaries",
            "POST /doctor/prescriptions": "Issue a prescription for a session",
            "POST /media": "Upload a medical record",
            "POST /media/transcriptions": "Upload and transcribe a voice note",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    if !request.email.contains('@') {
        return Err(bad_request_error("email is not valid"));
    }
    if request.full_name.trim().is_empty() {
        return Err(bad_request_error("full_name is required"));
    }

    // Self-registration always yields a patient; staff accounts are
    // provisioned out of band.
    let user = state
        .users
        .create(NewUser {
            email: request.email,
            full_name: request.full_name,
            role: Role::Patient,
        })
        .await
        .map_err(map_portal_error)?;

    info!(user_id = %user.id, "registered patient");
    Ok(Json(user))
}

async fn list_patients(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    state
        .users
        .list_patients()
        .await
        .map(Json)
        .map_err(map_portal_error)
}

/// Does the patient's message ask the assistant to wrap up with a structured
/// summary?
fn is_summary_request(message: &str) -> bool {
    let upper = message.to_uppercase();
    upper.contains("SUMMARIZE") || upper.contains("SUMMARY")
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if request.message.trim().is_empty() {
        return Err(bad_request_error("message cannot be empty"));
    }
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    require_patient(state.users.as_ref(), request.patient_id)
        .await
        .map_err(map_portal_error)?;

    let history = state
        .sessions
        .get(&session_id)
        .await
        .map_err(map_portal_error)?
        .map(|session| session.messages)
        .unwrap_or_default();

    // Always produces a reply: transient overload is retried, terminal
    // failures degrade to the canned busy message.
    let reply = reply_with_retry(state.gateway.as_ref(), &history, &request.message).await;

    state
        .sessions
        .append_turn(&session_id, request.patient_id, Turn::patient(request.message.as_str()))
        .await
        .map_err(map_portal_error)?;
    state
        .sessions
        .append_turn(&session_id, request.patient_id, Turn::assistant(reply.as_str()))
        .await
        .map_err(map_portal_error)?;

    if is_summary_request(&request.message) {
        // Parse failures log a warning inside from_reply and leave the
        // session without a summary.
        if let Some(summary) = Summary::from_reply(&reply) {
            state
                .sessions
                .attach_summary(&session_id, summary)
                .await
                .map_err(map_portal_error)?;
            info!(session_id = %session_id, "attached session summary");
        }
    }

    Ok(Json(ChatResponse {
        session_id,
        response: reply,
    }))
}

async fn list_sessions(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Vec<portal_core::ChatSession>> {
    require_patient(state.users.as_ref(), patient_id)
        .await
        .map_err(map_portal_error)?;
    state
        .sessions
        .list_for_patient(patient_id)
        .await
        .map(Json)
        .map_err(map_portal_error)
}

/// Sessions for the doctor dashboard, most urgent first.
async fn ranked_summaries(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Vec<portal_core::ChatSession>> {
    require_patient(state.users.as_ref(), patient_id)
        .await
        .map_err(map_portal_error)?;
    let sessions = state
        .sessions
        .list_for_patient(patient_id)
        .await
        .map_err(map_portal_error)?;
    Ok(Json(rank(sessions)))
}

async fn create_prescription(
    State(state): State<AppState>,
    Json(request): Json<PrescriptionRequest>,
) -> ApiResult<PrescriptionResponse> {
    if request.doctor_notes.trim().is_empty() {
        return Err(bad_request_error("doctor_notes cannot be empty"));
    }

    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .map_err(map_portal_error)?
        .ok_or_else(|| not_found_error("session not found"))?;
    let patient = state
        .users
        .get(session.patient_id)
        .await
        .map_err(map_portal_error)?
        .ok_or_else(|| not_found_error("patient not found"))?;

    let report = prescription::build_report(
        &patient.full_name,
        session.summary.as_ref(),
        &request.doctor_notes,
        request.follow_up_days,
    );

    let external_ref = state
        .blobs
        .upload(&report.file_name, "text/plain", report.body.into_bytes())
        .await
        .map_err(|err| internal_error("failed to store prescription", &err.to_string()))?;

    let record = state
        .media
        .register(
            patient.id,
            &report.file_name,
            MediaKind::Document,
            &external_ref,
            Some(request.doctor_notes),
        )
        .await
        .map_err(map_portal_error)?;

    state
        .sessions
        .append_turn(
            &request.session_id,
            session.patient_id,
            Turn::assistant(report.follow_up_message.as_str()),
        )
        .await
        .map_err(map_portal_error)?;

    info!(session_id = %request.session_id, reference = %report.reference, "issued prescription");
    Ok(Json(PrescriptionResponse {
        message: "Prescription generated and sent to patient".to_string(),
        media_id: record.id,
        reference: report.reference,
    }))
}

struct UploadedFile {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    bad_request_error(&format!("invalid multipart payload: {err}"))
}

async fn parse_upload(mut multipart: Multipart) -> Result<(Uuid, UploadedFile), ApiError> {
    let mut patient_id: Option<Uuid> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "patient_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                let id = Uuid::parse_str(text.trim())
                    .map_err(|_| bad_request_error("patient_id must be a UUID"))?;
                patient_id = Some(id);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                file = Some(UploadedFile {
                    file_name,
                    mime_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let patient_id = patient_id.ok_or_else(|| bad_request_error("patient_id field is required"))?;
    let file = file.ok_or_else(|| bad_request_error("file field is required"))?;
    if file.bytes.is_empty() {
        return Err(bad_request_error("uploaded file is empty"));
    }
    Ok((patient_id, file))
}

/// Maps an upload's declared content type onto a media kind.
fn kind_from_mime(mime_type: &str) -> MediaKind {
    if mime_type.starts_with("audio/") {
        MediaKind::Audio
    } else if mime_type.starts_with("image/") {
        MediaKind::Image
    } else if mime_type == "application/pdf" {
        MediaKind::Pdf
    } else {
        MediaKind::Document
    }
}

async fn upload_media(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<MediaUploadResponse> {
    let (patient_id, file) = parse_upload(multipart).await?;

    let external_ref = state
        .blobs
        .upload(&file.file_name, &file.mime_type, file.bytes)
        .await
        .map_err(|err| internal_error("failed to store file", &err.to_string()))?;

    let record = state
        .media
        .register(
            patient_id,
            &file.file_name,
            kind_from_mime(&file.mime_type),
            &external_ref,
            None,
        )
        .await
        .map_err(map_portal_error)?;

    Ok(Json(MediaUploadResponse {
        media: record,
        warning: None,
    }))
}

async fn upload_transcription(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<MediaUploadResponse> {
    let (patient_id, file) = parse_upload(multipart).await?;

    let external_ref = state
        .blobs
        .upload(&file.file_name, &file.mime_type, file.bytes.clone())
        .await
        .map_err(|err| internal_error("failed to store audio", &err.to_string()))?;

    // The voice note is already stored; a transcription failure degrades to a
    // record without a transcript rather than failing the upload.
    let (transcript, warning) = match state.gateway.transcribe(&file.bytes, &file.mime_type).await {
        Ok(text) => (Some(text), None),
        Err(err) => {
            warn!(error = %err, "transcription failed, keeping voice note without transcript");
            (None, Some(format!("transcription failed: {err}")))
        }
    };

    let display_name = format!("Voice note {}", &Uuid::new_v4().to_string()[..8]);
    let record = state
        .media
        .register(patient_id, &display_name, MediaKind::Audio, &external_ref, transcript)
        .await
        .map_err(map_portal_error)?;

    Ok(Json(MediaUploadResponse {
        media: record,
        warning,
    }))
}

async fn list_media(
    State(state): State<AppState>,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Vec<MediaRecord>> {
    state
        .media
        .list_for_patient(patient_id)
        .await
        .map(Json)
        .map_err(map_portal_error)
}

async fn delete_media(
    State(state): State<AppState>,
    Path(media_id): Path<Uuid>,
) -> ApiResult<DeleteMediaResponse> {
    let outcome = state.media.delete(media_id).await.map_err(map_portal_error)?;
    Ok(Json(DeleteMediaResponse {
        detail: "file deleted".to_string(),
        warning: outcome.warning,
    }))
}

/// Streams the backing blob to the client so external storage is never exposed
/// directly.
async fn media_content(
    State(state): State<AppState>,
    Path(media_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.media.get(media_id).await.map_err(map_portal_error)?;
    let bytes = state
        .blobs
        .download(&record.external_ref)
        .await
        .map_err(|err| internal_error("could not retrieve file from storage", &err.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, record.file_type.content_type())],
        bytes,
    ))
}
