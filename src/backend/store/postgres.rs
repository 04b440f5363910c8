/**
 * PostgreSQL Store
 *
 * Store backed by a `sqlx::PgPool`. Change notifications come from
 * `LISTEN conversation_changes`: triggers on `conversation_messages` and
 * `calendar_events` bump the conversation revision and `pg_notify` a JSON
 * payload `{ operation, communityId, eventId }` (see `migrations/`).
 *
 * Each `watch` call opens its own `PgListener` connection, which is
 * released when the handle is closed or dropped.
 */
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::{
    CalendarEvent, ChangeListener, ChangeNotification, Community, ConversationDoc,
    ConversationStore, ConversationWriter, Member, MembershipSource, OperationType, StoreError,
    StoreResult,
};
use crate::shared::{Message, ParentKey, SenderProfile};

/// Channel the change triggers notify on
pub const CHANGE_CHANNEL: &str = "conversation_changes";

/// Payload written by the `notify_*` trigger functions
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotifyPayload {
    operation: OperationType,
    community_id: Uuid,
    #[serde(default)]
    event_id: Option<Uuid>,
}

impl NotifyPayload {
    fn into_notification(self) -> ChangeNotification {
        ChangeNotification {
            operation: self.operation,
            key: ParentKey {
                community_id: self.community_id,
                event_id: self.event_id,
            },
        }
    }
}

/// Decode a trigger payload; malformed payloads are logged and skipped
fn decode_notification(payload: &str) -> Option<ChangeNotification> {
    match serde_json::from_str::<NotifyPayload>(payload) {
        Ok(payload) => Some(payload.into_notification()),
        Err(e) => {
            tracing::warn!(
                "[Store] Ignoring malformed {} payload {:?}: {}",
                CHANGE_CHANNEL,
                payload,
                e
            );
            None
        }
    }
}

fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    let sender_id: Uuid = row.try_get("sender_id")?;
    let sender_name: Option<String> = row.try_get("sender_name")?;
    let sender_avatar: Option<String> = row.try_get("sender_avatar")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Message {
        id: row.try_get("id")?,
        sender_id,
        // LEFT JOIN: a sender whose user row is gone stays unresolved
        sender: sender_name.map(|name| SenderProfile {
            id: sender_id,
            name,
            avatar: sender_avatar,
        }),
        content: row.try_get("content")?,
        created_at,
    })
}

fn revision_from(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

/// Store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the schema in `migrations/`
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    /// Insert the conversation row if missing and return its id
    async fn ensure_conversation_id(&self, key: &ParentKey) -> StoreResult<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, community_id, event_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.community_id)
        .bind(key.event_id)
        .execute(&self.pool)
        .await?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            SELECT id FROM conversations
            WHERE community_id = $1 AND event_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(key.community_id)
        .bind(key.event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn find_community(&self, community_id: Uuid) -> StoreResult<Option<Community>> {
        let creator_id: Option<Uuid> =
            sqlx::query_scalar("SELECT creator_id FROM communities WHERE id = $1")
                .bind(community_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(creator_id) = creator_id else {
            return Ok(None);
        };

        let member_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM community_members WHERE community_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Community {
            id: community_id,
            creator_id,
            member_ids,
        }))
    }

    async fn find_calendar_event(
        &self,
        community_id: Uuid,
        event_id: Uuid,
    ) -> StoreResult<Option<CalendarEvent>> {
        let row = sqlx::query(
            "SELECT id, community_id, status FROM calendar_events WHERE id = $1 AND community_id = $2",
        )
        .bind(event_id)
        .bind(community_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> StoreResult<CalendarEvent> {
            Ok(CalendarEvent {
                id: r.try_get("id")?,
                community_id: r.try_get("community_id")?,
                status: r.try_get("status")?,
            })
        })
        .transpose()
    }

    async fn find_conversation(&self, key: &ParentKey) -> StoreResult<Option<ConversationDoc>> {
        // One snapshot for the header row, the messages and the status.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            SELECT id, revision FROM conversations
            WHERE community_id = $1 AND event_id IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(key.community_id)
        .bind(key.event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };
        let conversation_id: Uuid = row.try_get("id")?;
        let revision: i64 = row.try_get("revision")?;

        let rows = sqlx::query(
            r#"
            SELECT m.id, m.sender_id, m.content, m.created_at,
                   u.name AS sender_name, u.avatar AS sender_avatar
            FROM conversation_messages m
            LEFT JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = $1
            ORDER BY m.seq
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&mut *tx)
        .await?;
        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let status = match key.event_id {
            Some(event_id) => {
                sqlx::query_scalar::<_, String>("SELECT status FROM calendar_events WHERE id = $1")
                    .bind(event_id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
            None => None,
        };
        tx.commit().await?;

        Ok(Some(ConversationDoc {
            key: *key,
            messages,
            status,
            revision: revision_from(revision),
        }))
    }

    async fn create_conversation(&self, key: &ParentKey) -> StoreResult<ConversationDoc> {
        self.ensure_conversation_id(key).await?;
        self.find_conversation(key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", key)))
    }

    async fn watch(&self, key: &ParentKey) -> StoreResult<Box<dyn ChangeListener>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        tracing::debug!("[Store] LISTEN {} for {}", CHANGE_CHANNEL, key);
        Ok(Box::new(PgChangeListener {
            key: *key,
            listener: Some(listener),
        }))
    }
}

#[async_trait]
impl MembershipSource for PgStore {
    async fn members(&self, community_id: Uuid) -> StoreResult<Vec<Member>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.avatar, cm.is_online
            FROM community_members cm
            JOIN users u ON u.id = cm.user_id
            WHERE cm.community_id = $1
            ORDER BY cm.joined_at, u.id
            "#,
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<Member> {
                Ok(Member {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    avatar: row.try_get("avatar")?,
                    online: row.try_get("is_online")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ConversationWriter for PgStore {
    async fn append_message(
        &self,
        key: &ParentKey,
        sender_id: Uuid,
        content: &str,
    ) -> StoreResult<Message> {
        let conversation_id = self.ensure_conversation_id(key).await?;
        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO conversation_messages (id, conversation_id, sender_id, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id, sender_id, content, created_at
            )
            SELECT i.id, i.sender_id, i.content, i.created_at,
                   u.name AS sender_name, u.avatar AS sender_avatar
            FROM inserted i
            LEFT JOIN users u ON u.id = i.sender_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message_from_row(&row)?)
    }

    async fn delete_message(&self, key: &ParentKey, message_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM conversation_messages m
            USING conversations c
            WHERE m.id = $1
              AND m.conversation_id = c.id
              AND c.community_id = $2
              AND c.event_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(message_id)
        .bind(key.community_id)
        .bind(key.event_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_presence(&self, community_id: Uuid, user_id: Uuid, online: bool) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE community_members SET is_online = $3 WHERE community_id = $1 AND user_id = $2",
        )
        .bind(community_id)
        .bind(user_id)
        .bind(online)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "membership of {} in {}",
                user_id, community_id
            )));
        }
        Ok(())
    }

    async fn set_event_status(
        &self,
        community_id: Uuid,
        event_id: Uuid,
        status: &str,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE calendar_events SET status = $3 WHERE id = $2 AND community_id = $1",
        )
        .bind(community_id)
        .bind(event_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("calendar event {}", event_id)));
        }
        Ok(())
    }
}

struct PgChangeListener {
    key: ParentKey,
    listener: Option<PgListener>,
}

#[async_trait]
impl ChangeListener for PgChangeListener {
    async fn next(&mut self) -> Option<StoreResult<ChangeNotification>> {
        let listener = self.listener.as_mut()?;
        loop {
            // `Ok(None)`: the connection dropped and was re-established
            // (LISTEN re-issued); anything notified in between is lost.
            let notification = match listener.try_recv().await {
                Ok(Some(notification)) => notification,
                Ok(None) => {
                    tracing::warn!(
                        "[Store] {} connection lost for {}, forcing a re-read",
                        CHANGE_CHANNEL,
                        self.key
                    );
                    return Some(Ok(ChangeNotification::resync(self.key)));
                }
                Err(e) => return Some(Err(StoreError::Database(e))),
            };
            if let Some(change) = decode_notification(notification.payload()) {
                if change.key == self.key {
                    return Some(Ok(change));
                }
            }
        }
    }

    fn close(&mut self) {
        if self.listener.take().is_some() {
            tracing::debug!("[Store] UNLISTEN {} for {}", CHANGE_CHANNEL, self.key);
        }
    }
}
