//! services/api/src/web/chat.rs
//!
//! Chat endpoints: the rendered history, the streaming question/answer cycle,
//! per-turn feedback and the suggestion box.

use axum::{
    extract::Path,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use consult_chat_core::{Feedback, Persistence};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::web::{protocol::ChatEvent, reject, state::SessionHandle};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct AskRequest {
    pub question: String,
}

/// One displayed chat message.
#[derive(Serialize, ToSchema)]
pub struct TurnView {
    /// Position in the session's turn list; used to address feedback.
    pub index: usize,
    /// `user` or `assistant`.
    pub speaker: String,
    pub content: String,
    pub feedback: Option<String>,
    pub timestamp: String,
}

#[derive(Deserialize, ToSchema)]
pub struct FeedbackRequest {
    /// `like` or `dislike`.
    pub feedback: String,
}

#[derive(Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub index: usize,
    pub feedback: String,
    pub stored: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct SuggestionRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct SuggestionResponse {
    pub stored: bool,
}

fn is_stored(persistence: &Persistence) -> bool {
    matches!(persistence, Persistence::Saved | Persistence::Unchanged)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// The conversation as displayed: suggestions are left out.
#[utoipa::path(
    get,
    path = "/chat",
    responses(
        (status = 200, description = "Displayed turns in order", body = [TurnView])
    )
)]
pub async fn history_handler(Extension(session): Extension<SessionHandle>) -> Json<Vec<TurnView>> {
    let controller = session.lock().await;
    let turns = controller
        .rendered_turns()
        .into_iter()
        .map(|(index, turn)| TurnView {
            index,
            speaker: turn.speaker.as_str().to_string(),
            content: turn.content.clone(),
            feedback: turn.feedback.map(|f| f.as_str().to_string()),
            timestamp: turn.timestamp.to_rfc3339(),
        })
        .collect();
    Json(turns)
}

/// Ask a question. The answer streams back as server-sent events:
/// `fragment` events in order, then one `done` or `error` event.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = AskRequest,
    responses(
        (status = 200, description = "text/event-stream of fragment, done and error events"),
        (status = 400, description = "Empty question"),
        (status = 401, description = "Sign-in required"),
        (status = 422, description = "The prompt needs patient information first")
    )
)]
pub async fn ask_handler(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<AskRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // The guard moves into the task, so nothing can run between the checks and the cycle.
    let mut controller = session.lock_owned().await;
    controller.prepare(&req.question).map_err(reject)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<ChatEvent>();

    tokio::spawn(async move {
        let session_id = controller.id();
        let fragment_tx = tx.clone();

        let result = controller
            .ask(&req.question, move |fragment| {
                // The client may have gone away; the answer is still recorded.
                let _ = fragment_tx.send(ChatEvent::Fragment {
                    text: fragment.to_string(),
                });
            })
            .await;

        let event = match result {
            Ok(answer) => {
                info!(
                    "Answered question in session {} ({} chars)",
                    session_id,
                    answer.text.len()
                );
                ChatEvent::Done {
                    index: answer.receipt.index,
                    stored: is_stored(&answer.receipt.persistence),
                    text: answer.text,
                }
            }
            Err(e) => {
                error!("Chat cycle failed for session {}: {}", session_id, e);
                ChatEvent::Error {
                    message: e.to_string(),
                }
            }
        };
        let _ = tx.send(event);
    });

    let events = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield Event::default().event(event.name()).json_data(&event);
        }
    };

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Like or dislike an assistant reply.
#[utoipa::path(
    post,
    path = "/chat/{index}/feedback",
    request_body = FeedbackRequest,
    params(
        ("index" = usize, Path, description = "Position of the assistant turn")
    ),
    responses(
        (status = 200, description = "Feedback recorded", body = FeedbackResponse),
        (status = 400, description = "Unknown feedback value or not an assistant turn"),
        (status = 404, description = "No turn at that position"),
        (status = 409, description = "Different feedback was already given")
    )
)]
pub async fn feedback_handler(
    Extension(session): Extension<SessionHandle>,
    Path(index): Path<usize>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<FeedbackResponse>, (StatusCode, String)> {
    let feedback = req
        .feedback
        .parse::<Feedback>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let persistence = session
        .lock()
        .await
        .set_feedback(index, feedback)
        .await
        .map_err(reject)?;

    Ok(Json(FeedbackResponse {
        index,
        feedback: feedback.as_str().to_string(),
        stored: is_stored(&persistence),
    }))
}

/// Leave a suggestion. Stored with the chat log but never shown in the chat.
#[utoipa::path(
    post,
    path = "/suggestions",
    request_body = SuggestionRequest,
    responses(
        (status = 201, description = "Suggestion recorded", body = SuggestionResponse),
        (status = 400, description = "Empty suggestion")
    )
)]
pub async fn suggestion_handler(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<SuggestionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let receipt = session
        .lock()
        .await
        .record_suggestion(&req.text)
        .await
        .map_err(reject)?;

    Ok((
        StatusCode::CREATED,
        Json(SuggestionResponse {
            stored: is_stored(&receipt.persistence),
        }),
    ))
}
