/**
 * Write Route Handlers
 *
 * The minimal write surface that drives the relay: every successful write
 * lands in the store, which publishes the change notification the open
 * streams react to. All routes here sit behind `require_membership`.
 *
 * # Routes
 *
 * ## Community Chat
 * - `POST /api/communities/{community_id}/chat/messages` - send as the caller
 * - `DELETE /api/communities/{community_id}/chat/messages/{message_id}`
 *
 * ## Calendar Events
 * - `POST /api/communities/{community_id}/calendar/{event_id}/messages`
 * - `DELETE /api/communities/{community_id}/calendar/{event_id}/messages/{message_id}`
 * - `PATCH /api/communities/{community_id}/calendar/{event_id}/status` - creator only
 *
 * ## Presence
 * - `PUT /api/communities/{community_id}/presence` - caller's own flag
 *
 * # Permissions
 *
 * A message may be deleted by its sender or by the community creator.
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, patch, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::auth::CallerId;
use crate::backend::error::BackendError;
use crate::backend::middleware::{require_membership, AuthorizedCommunity};
use crate::backend::server::state::{AppState, SharedStore};
use crate::backend::store::{Community, ConversationStore, ConversationWriter};
use crate::shared::{Message, ParentKey, SharedError};

/// Longest accepted message body, in characters
pub const MAX_MESSAGE_LEN: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PresenceUpdate {
    pub online: bool,
}

fn validate_content(content: &str) -> Result<&str, SharedError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(SharedError::invalid_field("content", "Message must not be empty"));
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(SharedError::invalid_field(
            "content",
            format!("Message exceeds {} characters", MAX_MESSAGE_LEN),
        ));
    }
    Ok(trimmed)
}

async fn require_event(
    store: &SharedStore,
    community_id: Uuid,
    event_id: Uuid,
) -> Result<(), BackendError> {
    store
        .find_calendar_event(community_id, event_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| BackendError::not_found("Calendar event"))
}

async fn append(
    store: &SharedStore,
    key: ParentKey,
    caller: CallerId,
    request: SendMessageRequest,
) -> Result<(StatusCode, Json<Message>), BackendError> {
    let content = validate_content(&request.content)?;
    let message = store.append_message(&key, caller.0, content).await?;
    tracing::info!("[Server] {} sent message {} to {}", caller.0, message.id, key);
    Ok((StatusCode::CREATED, Json(message)))
}

async fn remove(
    store: &SharedStore,
    key: ParentKey,
    caller: CallerId,
    community: &Community,
    message_id: Uuid,
) -> Result<StatusCode, BackendError> {
    let sender_id = store
        .find_conversation(&key)
        .await?
        .and_then(|doc| {
            doc.messages
                .iter()
                .find(|message| message.id == message_id)
                .map(|message| message.sender_id)
        })
        .ok_or_else(|| BackendError::not_found("Message"))?;

    if sender_id != caller.0 && community.creator_id != caller.0 {
        return Err(BackendError::forbidden(
            "Only the sender or the community creator can delete a message",
        ));
    }

    if !store.delete_message(&key, message_id).await? {
        return Err(BackendError::not_found("Message"));
    }
    tracing::info!("[Server] {} deleted message {} from {}", caller.0, message_id, key);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/communities/{community_id}/chat/messages`
pub async fn send_message(
    State(store): State<SharedStore>,
    caller: CallerId,
    Path(community_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, BackendError> {
    append(&store, ParentKey::community(community_id), caller, request).await
}

/// `DELETE /api/communities/{community_id}/chat/messages/{message_id}`
pub async fn delete_message(
    State(store): State<SharedStore>,
    caller: CallerId,
    Extension(AuthorizedCommunity(community)): Extension<AuthorizedCommunity>,
    Path((community_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, BackendError> {
    remove(
        &store,
        ParentKey::community(community_id),
        caller,
        &community,
        message_id,
    )
    .await
}

/// `POST /api/communities/{community_id}/calendar/{event_id}/messages`
pub async fn send_event_message(
    State(store): State<SharedStore>,
    caller: CallerId,
    Path((community_id, event_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, BackendError> {
    require_event(&store, community_id, event_id).await?;
    append(
        &store,
        ParentKey::calendar_event(community_id, event_id),
        caller,
        request,
    )
    .await
}

/// `DELETE /api/communities/{community_id}/calendar/{event_id}/messages/{message_id}`
pub async fn delete_event_message(
    State(store): State<SharedStore>,
    caller: CallerId,
    Extension(AuthorizedCommunity(community)): Extension<AuthorizedCommunity>,
    Path((community_id, event_id, message_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, BackendError> {
    require_event(&store, community_id, event_id).await?;
    remove(
        &store,
        ParentKey::calendar_event(community_id, event_id),
        caller,
        &community,
        message_id,
    )
    .await
}

/// `PATCH /api/communities/{community_id}/calendar/{event_id}/status`
pub async fn update_event_status(
    State(store): State<SharedStore>,
    caller: CallerId,
    Extension(AuthorizedCommunity(community)): Extension<AuthorizedCommunity>,
    Path((community_id, event_id)): Path<(Uuid, Uuid)>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<StatusUpdate>, BackendError> {
    if community.creator_id != caller.0 {
        return Err(BackendError::forbidden(
            "Only the community creator can change an event's status",
        ));
    }
    let status = update.status.trim();
    if status.is_empty() {
        return Err(SharedError::invalid_field("status", "Status must not be empty").into());
    }

    store.set_event_status(community_id, event_id, status).await?;
    tracing::info!("[Server] Event {} status set to {}", event_id, status);
    Ok(Json(StatusUpdate {
        status: status.to_string(),
    }))
}

/// `PUT /api/communities/{community_id}/presence`
pub async fn set_presence(
    State(store): State<SharedStore>,
    caller: CallerId,
    Path(community_id): Path<Uuid>,
    Json(update): Json<PresenceUpdate>,
) -> Result<StatusCode, BackendError> {
    store.set_presence(community_id, caller.0, update.online).await?;
    tracing::debug!(
        "[Server] {} is now {} in {}",
        caller.0,
        if update.online { "online" } else { "offline" },
        community_id
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Add the write routes, all behind the membership guard
pub fn configure_api_routes(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route(
            "/api/communities/{community_id}/chat/messages",
            post(send_message),
        )
        .route(
            "/api/communities/{community_id}/chat/messages/{message_id}",
            delete(delete_message),
        )
        .route(
            "/api/communities/{community_id}/calendar/{event_id}/messages",
            post(send_event_message),
        )
        .route(
            "/api/communities/{community_id}/calendar/{event_id}/messages/{message_id}",
            delete(delete_event_message),
        )
        .route(
            "/api/communities/{community_id}/calendar/{event_id}/status",
            patch(update_event_status),
        )
        .route("/api/communities/{community_id}/presence", put(set_presence))
        .route_layer(from_fn_with_state(state.clone(), require_membership));

    router.merge(guarded)
}
