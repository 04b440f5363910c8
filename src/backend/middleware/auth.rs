/**
 * Community Membership Guard
 *
 * Route middleware for everything scoped to `/api/communities/{community_id}`
 * that requires the caller to belong to the community. It resolves the
 * caller, runs the member-or-creator check and rejects with 404/403 before
 * the handler (and, for streams, before any SSE byte) runs.
 *
 * The caller id is left in the request extensions so the handler's own
 * `CallerId` extraction is free.
 */
use std::collections::HashMap;

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::backend::auth::CallerId;
use crate::backend::error::BackendError;
use crate::backend::relay::EventRelay;
use crate::backend::store::Community;

/// Community that passed the guard, available to handlers via `Extension`
#[derive(Debug, Clone)]
pub struct AuthorizedCommunity(pub Community);

pub async fn require_membership(
    State(relay): State<EventRelay>,
    caller: CallerId,
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, BackendError> {
    let community_id = params
        .get("community_id")
        .ok_or_else(|| {
            BackendError::handler(StatusCode::INTERNAL_SERVER_ERROR, "Route has no community_id")
        })
        .and_then(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| BackendError::handler(StatusCode::BAD_REQUEST, "Invalid community id"))
        })?;

    let community = relay.authorize_community(community_id, caller.0).await?;

    request.extensions_mut().insert(caller);
    request.extensions_mut().insert(AuthorizedCommunity(community));
    Ok(next.run(request).await)
}
