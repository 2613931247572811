//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::submission::{read_form, ImageUpload, Submission, SubmissionError};
use super::types::{
    EndSessionResponse, ErrorResponse, PendingInputRequest, SessionView, SubmitOutcome,
    SubmitResponse,
};
use super::AppState;
use crate::gateway::ImageRef;
use crate::scratch::ScratchImage;
use crate::session::Session;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

const SESSION_COOKIE: &str = "xray_session";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        // Root serves the page
        .route("/", get(serve_spa))
        // Static assets (embedded)
        .route("/assets/*path", get(serve_static))
        // Session view and teardown
        .route("/api/session", get(get_session).delete(end_session))
        .route("/api/session/input", put(update_pending_input))
        // Text question or image upload
        .route("/api/submit", post(submit))
        // Version
        .route("/version", get(get_version))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

// ============================================================
// Page
// ============================================================

async fn serve_spa() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Sessions
// ============================================================

/// Session id from the cookie, minting a new one (and its cookie) on first
/// contact
fn session_id(jar: CookieJar) -> (CookieJar, String) {
    let existing = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    if let Some(id) = existing {
        return (jar, id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), id)
}

async fn get_session(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<SessionView>) {
    let (jar, id) = session_id(jar);
    let handle = state.sessions.open(&id);
    let session = handle.lock().await;
    let view = SessionView::from(&*session);
    (jar, Json(view))
}

async fn update_pending_input(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<PendingInputRequest>,
) -> (CookieJar, Json<SessionView>) {
    let (jar, id) = session_id(jar);
    let handle = state.sessions.open(&id);
    let mut session = handle.lock().await;
    session.set_pending_input(req.text);
    let view = SessionView::from(&*session);
    (jar, Json(view))
}

async fn end_session(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<EndSessionResponse>) {
    let existing = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let ended = match existing {
        Some(id) => state.sessions.end(&id).await,
        None => false,
    };
    tracing::debug!(ended, live_sessions = state.sessions.len(), "Session teardown requested");

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(EndSessionResponse { ended }))
}

// ============================================================
// Submission
// ============================================================

async fn submit(
    State(state): State<AppState>,
    jar: CookieJar,
    multipart: Multipart,
) -> Result<(CookieJar, Json<SubmitResponse>), AppError> {
    let form = read_form(multipart)
        .await
        .map_err(|e| AppError::from_multipart(&e, state.max_upload_bytes))?;
    let (jar, id) = session_id(jar);

    // One submission at a time per session: the lock is held until the
    // gateway call has finished and its result is recorded.
    let handle = state.sessions.open(&id);
    let mut session = handle.lock().await;

    // The text field keeps whatever was typed until a question is answered
    if let Some(query) = &form.query {
        session.set_pending_input(query.clone());
    }

    let outcome = match Submission::classify(form) {
        Ok(Submission::Text(query)) => {
            tracing::info!(session = %id, kind = "text", "Submission accepted");
            answer(&state, &mut session, query).await
        }
        Ok(Submission::Image(image)) => {
            tracing::info!(
                session = %id,
                kind = "image",
                file = %image.file_name,
                bytes = image.bytes.len(),
                "Submission accepted"
            );
            diagnose(&state, &mut session, image).await
        }
        Err(e) => warning(&id, &e),
    };

    let view = SessionView::from(&*session);
    Ok((jar, Json(SubmitResponse { outcome, session: view })))
}

async fn answer(state: &AppState, session: &mut Session, query: String) -> SubmitOutcome {
    let result = state.gateway.answer_text(&query).await;
    let turn = session.append_turn(query, result.into_text()).clone();
    session.clear_pending_input();
    SubmitOutcome::Answer { turn }
}

async fn diagnose(state: &AppState, session: &mut Session, image: ImageUpload) -> SubmitOutcome {
    let ImageUpload {
        file_name,
        bytes,
        format,
    } = image;

    let dir = state.scratch_dir.clone();
    let created = tokio::task::spawn_blocking(move || ScratchImage::create(&dir, &bytes, format))
        .await
        .unwrap_or_else(|e| Err(std::io::Error::other(e)));

    let scratch = match created {
        Ok(scratch) => scratch,
        Err(e) => {
            tracing::error!(
                dir = %state.scratch_dir.display(),
                error = %e,
                "Failed to save uploaded image"
            );
            return SubmitOutcome::Warning {
                message: SubmissionError::Scratch(e).to_string(),
            };
        }
    };

    let path = scratch.path().to_path_buf();
    let result = state.gateway.diagnose_image(ImageRef::Path(path.clone())).await;

    if let Err(e) = scratch.close() {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch file");
    }

    tracing::info!(
        success = result.is_success(),
        chars = result.text().len(),
        "Diagnosis finished"
    );

    let is_error = !result.is_success();
    let text = result.into_text();
    session.append_turn(format!("Image: {file_name}"), text.clone());
    SubmitOutcome::Diagnosis { text, is_error }
}

fn warning(session_id: &str, error: &SubmissionError) -> SubmitOutcome {
    tracing::info!(session = %session_id, reason = error.kind(), "Submission rejected");
    SubmitOutcome::Warning {
        message: error.to_string(),
    }
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("xray-assistant ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    PayloadTooLarge(String),
}

impl AppError {
    /// Map a failed form read. The body limit is the only way a read can be
    /// too large, so that case names it.
    fn from_multipart(e: &MultipartError, limit: usize) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            tracing::info!(limit, "Rejected oversize upload");
            AppError::PayloadTooLarge(format!("Image exceeds the {limit}-byte upload limit"))
        } else {
            tracing::info!(error = %e.body_text(), "Rejected malformed submit form");
            AppError::BadRequest(format!("Malformed submit form: {}", e.body_text()))
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
