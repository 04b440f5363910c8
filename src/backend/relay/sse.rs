/**
 * SSE Transport
 *
 * Adapts a `RelaySubscription` to an axum `Sse` response. Each `RelayFrame`
 * becomes one SSE event:
 *
 * ```text
 * id: 7
 * event: newMessage
 * data: {"_id":"...","senderId":"...","content":"hi","createdAt":"..."}
 * ```
 *
 * Keep-alive comments are injected by axum at the configured interval.
 * Dropping the response body drops the subscription, which is how the
 * session learns the client went away.
 */
use std::convert::Infallible;
use std::time::Duration;

use axum::http::header::{HeaderName, CACHE_CONTROL};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::{self, Stream};

use super::service::RelaySubscription;
use crate::shared::RelayFrame;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Convert a frame to an SSE event
///
/// Returns `None` if the payload cannot be serialized.
pub fn frame_to_event(frame: &RelayFrame) -> Option<Event> {
    match frame.event.payload_json() {
        Ok(data) => Some(
            Event::default()
                .id(frame.revision.to_string())
                .event(frame.event.name())
                .data(data),
        ),
        Err(e) => {
            tracing::error!("[Relay] Failed to serialize {} event: {}", frame.event.name(), e);
            None
        }
    }
}

/// Stream of SSE events for one subscription
pub fn event_stream(
    subscription: RelaySubscription,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(subscription, |mut subscription| async move {
        loop {
            let frame = subscription.next_frame().await?;
            if let Some(event) = frame_to_event(&frame) {
                return Some((Ok(event), subscription));
            }
        }
    })
}

/// Full SSE response, headers included
pub fn into_sse_response(subscription: RelaySubscription, keep_alive: Duration) -> Response {
    let key = subscription.key();
    tracing::debug!("[Relay] {} opening SSE response", key);

    let sse = Sse::new(event_stream(subscription)).keep_alive(
        KeepAlive::new()
            .interval(keep_alive)
            .text("keep-alive"),
    );

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        sse,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::RelayEvent;
    use uuid::Uuid;

    #[test]
    fn test_frame_to_event_carries_revision_and_name() {
        let frame = RelayFrame::new(
            3,
            RelayEvent::DeleteMessage {
                id: Uuid::nil(),
            },
        );
        let event = frame_to_event(&frame).unwrap();
        let rendered = format!("{:?}", event);

        assert!(rendered.contains("id: 3"));
        assert!(rendered.contains("event: deleteMessage"));
    }
}
