// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Database Management
//!
//! SQLite persistence for the voice gateway: call sessions, answer-machine
//! items, conversations with their message ledger, widgets, and rate-limit
//! buckets. Call and item rows are mutated only through the state-machine
//! operations here; every read and write is tenant-scoped.
//!
//! The "most recent non-final item" selections are tied to their updates
//! inside a single transaction so concurrent webhook deliveries cannot race
//! a find-then-update pair.

use crate::models::{
    AnswerMachineItem, AnswerMachineStatus, AnswerMachineType, CallSession, CallSessionStatus,
    Conversation, ConversationMessage, WidgetConfig,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Row, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of a persistent rate-limit bucket check
#[derive(Debug, Clone, Copy)]
pub struct BucketState {
    /// Whether this request was admitted
    pub allowed: bool,
    /// Count after the check
    pub count: u32,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
}

/// Database manager for the voice gateway
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:") {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePool::connect(&connection_options).await?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS call_sessions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                provider_call_sid TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'RINGING',
                conversation_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                ended_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_call_sessions_provider_sid ON call_sessions(provider_call_sid)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_call_sessions_tenant ON call_sessions(tenant_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS answer_machine_items (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                call_session_id TEXT,
                conversation_id TEXT NOT NULL,
                item_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'NEW',
                reason TEXT NOT NULL,
                from_number TEXT,
                recording_url TEXT,
                recording_sid TEXT,
                transcript_text TEXT,
                callback_number TEXT,
                callback_notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_items_call_session ON answer_machine_items(call_session_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_items_tenant ON answer_machine_items(tenant_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                contact_number TEXT,
                created_at TEXT NOT NULL,
                last_activity_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (conversation_id) REFERENCES conversations (id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON conversation_messages(conversation_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS widgets (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                public_key TEXT UNIQUE NOT NULL,
                display_name TEXT NOT NULL,
                allowed_domains TEXT NOT NULL DEFAULT '[]',
                greeting TEXT NOT NULL DEFAULT '',
                accent_color TEXT NOT NULL DEFAULT '#6366f1',
                enabled BOOLEAN NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_widgets_public_key ON widgets(public_key)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limit_buckets (
                bucket_key TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                reset_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ================================
    // Call Sessions
    // ================================

    /// Create a new call session
    pub async fn create_call_session(&self, session: &CallSession) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO call_sessions (id, tenant_id, provider_call_sid, status, conversation_id, created_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.tenant_id.to_string())
        .bind(&session.provider_call_sid)
        .bind(session.status.as_str())
        .bind(session.conversation_id.to_string())
        .bind(session.created_at.to_rfc3339())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(session.id)
    }

    /// Get a call session scoped to its tenant
    pub async fn get_call_session(
        &self,
        tenant_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<CallSession>> {
        let row = sqlx::query("SELECT * FROM call_sessions WHERE id = ?1 AND tenant_id = ?2")
            .bind(session_id.to_string())
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_call_session(&row)?)),
            None => Ok(None),
        }
    }

    /// Mark a call session in progress
    ///
    /// No-op once the session is terminal.
    pub async fn start_call_session(&self, tenant_id: Uuid, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_sessions SET status = 'IN_PROGRESS'
            WHERE id = ?1 AND tenant_id = ?2 AND status = 'RINGING'
            "#,
        )
        .bind(session_id.to_string())
        .bind(tenant_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a call session completed, exactly once
    ///
    /// The status guard makes a second completed callback a no-op rather than
    /// an error; returns whether this call performed the transition.
    pub async fn complete_call_session(&self, tenant_id: Uuid, session_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_sessions SET status = 'COMPLETED', ended_at = ?1
            WHERE id = ?2 AND tenant_id = ?3 AND status != 'COMPLETED'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(session_id.to_string())
        .bind(tenant_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ================================
    // Answer-Machine Items
    // ================================

    /// Create a new answer-machine item
    pub async fn create_answer_machine_item(&self, item: &AnswerMachineItem) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO answer_machine_items (
                id, tenant_id, call_session_id, conversation_id, item_type, status,
                reason, from_number, recording_url, recording_sid, transcript_text,
                callback_number, callback_notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.tenant_id.to_string())
        .bind(item.call_session_id.map(|id| id.to_string()))
        .bind(item.conversation_id.to_string())
        .bind(item.item_type.as_str())
        .bind(item.status.as_str())
        .bind(&item.reason)
        .bind(&item.from_number)
        .bind(&item.recording_url)
        .bind(&item.recording_sid)
        .bind(&item.transcript_text)
        .bind(&item.callback_number)
        .bind(&item.callback_notes)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(item.id)
    }

    /// Get an answer-machine item by ID
    pub async fn get_answer_machine_item(&self, item_id: Uuid) -> Result<Option<AnswerMachineItem>> {
        let row = sqlx::query("SELECT * FROM answer_machine_items WHERE id = ?1")
            .bind(item_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_item(&row)?)),
            None => Ok(None),
        }
    }

    /// Attach a recording URL to the most recent open voicemail item of a call
    ///
    /// Selection and update run inside one transaction. A recording may
    /// arrive for a call that was answered by a human and never diverted, so
    /// no matching item is a benign no-op.
    pub async fn attach_recording(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
        recording_url: &str,
        recording_sid: Option<&str>,
    ) -> Result<Option<AnswerMachineItem>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT * FROM answer_machine_items
            WHERE tenant_id = ?1 AND call_session_id = ?2
              AND item_type = 'VOICEMAIL' AND status IN ('NEW', 'IN_PROGRESS')
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(call_session_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            debug!(
                call_session_id = %call_session_id,
                "No open voicemail item for recording callback; skipping"
            );
            return Ok(None);
        };

        let mut item = Self::row_to_item(&row)?;
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE answer_machine_items
            SET recording_url = ?1, recording_sid = ?2, transcript_text = NULL,
                status = 'NEW', updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(recording_url)
        .bind(recording_sid)
        .bind(now.to_rfc3339())
        .bind(item.id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        item.recording_url = Some(recording_url.to_owned());
        item.recording_sid = recording_sid.map(str::to_owned);
        item.transcript_text = None;
        item.status = AnswerMachineStatus::New;
        item.updated_at = now;

        Ok(Some(item))
    }

    /// Attach a transcript to the most recent non-final voicemail item of a call
    ///
    /// Items already carrying a meaningful transcript are final and skipped,
    /// which makes a duplicated transcription callback a no-op. Returns the
    /// updated item when the transcript was applied.
    pub async fn attach_transcript(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
        transcript_text: &str,
    ) -> Result<Option<AnswerMachineItem>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT * FROM answer_machine_items
            WHERE tenant_id = ?1 AND call_session_id = ?2
              AND item_type = 'VOICEMAIL' AND status IN ('NEW', 'IN_PROGRESS')
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(call_session_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            debug!(
                call_session_id = %call_session_id,
                "No open voicemail item for transcription callback; skipping"
            );
            return Ok(None);
        };

        let mut item = Self::row_to_item(&row)?;
        if item.has_meaningful_transcript() {
            info!(item_id = %item.id, "Item already transcribed; skipping duplicate callback");
            return Ok(None);
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE answer_machine_items
            SET transcript_text = ?1, status = 'NEW', updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(transcript_text)
        .bind(now.to_rfc3339())
        .bind(item.id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        item.transcript_text = Some(transcript_text.to_owned());
        item.status = AnswerMachineStatus::New;
        item.updated_at = now;

        Ok(Some(item))
    }

    /// Claim the most recent unresolved voicemail item of a call for the
    /// fetch-and-transcribe pipeline, marking it in progress
    ///
    /// Items with a meaningful transcript are final and never re-claimed.
    pub async fn claim_voicemail_for_processing(
        &self,
        tenant_id: Uuid,
        call_session_id: Uuid,
    ) -> Result<Option<AnswerMachineItem>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT * FROM answer_machine_items
            WHERE tenant_id = ?1 AND call_session_id = ?2
              AND item_type = 'VOICEMAIL' AND status IN ('NEW', 'IN_PROGRESS')
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(tenant_id.to_string())
        .bind(call_session_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut item = Self::row_to_item(&row)?;
        if item.has_meaningful_transcript() {
            info!(item_id = %item.id, "Item already transcribed; not re-claiming");
            return Ok(None);
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE answer_machine_items SET status = 'IN_PROGRESS', updated_at = ?1 WHERE id = ?2",
        )
        .bind(now.to_rfc3339())
        .bind(item.id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        item.status = AnswerMachineStatus::InProgress;
        item.updated_at = now;

        Ok(Some(item))
    }

    /// Record the provider's recording location on a claimed item
    pub async fn set_item_recording(
        &self,
        item_id: Uuid,
        recording_url: &str,
        recording_sid: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE answer_machine_items
            SET recording_url = ?1, recording_sid = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(recording_url)
        .bind(recording_sid)
        .bind(Utc::now().to_rfc3339())
        .bind(item_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store the outcome of a pipeline transcription on a claimed item
    ///
    /// An empty transcript (transcription disabled) leaves the item ready
    /// without text.
    pub async fn store_transcription_result(
        &self,
        item_id: Uuid,
        transcript_text: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE answer_machine_items
            SET transcript_text = ?1, status = 'NEW', updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(transcript_text.filter(|t| !t.is_empty()))
        .bind(Utc::now().to_rfc3339())
        .bind(item_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark an item failed after an unrecoverable transcription error
    pub async fn mark_item_failed(&self, item_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE answer_machine_items SET status = 'FAILED', updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(item_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ================================
    // Conversations & Ledger
    // ================================

    /// Create a conversation
    pub async fn create_conversation(&self, conversation: &Conversation) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, tenant_id, contact_number, created_at, last_activity_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(conversation.id.to_string())
        .bind(conversation.tenant_id.to_string())
        .bind(&conversation.contact_number)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.last_activity_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(conversation.id)
    }

    /// Get a conversation scoped to its tenant
    pub async fn get_conversation(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1 AND tenant_id = ?2")
            .bind(conversation_id.to_string())
            .bind(tenant_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_conversation(&row)?)),
            None => Ok(None),
        }
    }

    /// Append a message to the conversation ledger
    pub async fn append_conversation_message(&self, message: &ConversationMessage) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO conversation_messages (id, conversation_id, tenant_id, direction, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.tenant_id.to_string())
        .bind(&message.direction)
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(message.id)
    }

    /// List ledger messages for a conversation, oldest first
    pub async fn list_conversation_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<ConversationMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM conversation_messages WHERE conversation_id = ?1 ORDER BY created_at ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }

    /// Bump a conversation's last-activity timestamp
    pub async fn touch_conversation(&self, conversation_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE conversations SET last_activity_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ================================
    // Widgets
    // ================================

    /// Create a widget
    pub async fn create_widget(&self, widget: &WidgetConfig) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO widgets (id, tenant_id, public_key, display_name, allowed_domains, greeting, accent_color, enabled, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(widget.id.to_string())
        .bind(widget.tenant_id.to_string())
        .bind(&widget.public_key)
        .bind(&widget.display_name)
        .bind(serde_json::to_string(&widget.allowed_domains)?)
        .bind(&widget.greeting)
        .bind(&widget.accent_color)
        .bind(widget.enabled)
        .bind(widget.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(widget.id)
    }

    /// Look up a widget by its public key
    pub async fn get_widget_by_public_key(&self, public_key: &str) -> Result<Option<WidgetConfig>> {
        let row = sqlx::query("SELECT * FROM widgets WHERE public_key = ?1")
            .bind(public_key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_widget(&row)?)),
            None => Ok(None),
        }
    }

    // ================================
    // Rate Limit Buckets
    // ================================

    /// Check-and-update a sliding-fixed-window bucket
    ///
    /// The read-modify-write runs inside one transaction, and the mutating
    /// statements carry re-validating guards so concurrent checks cannot
    /// over-admit. An elapsed window resets the bucket to count 1 (this
    /// request is the first of the new window); an over-limit bucket is not
    /// incremented further.
    pub async fn check_rate_limit(
        &self,
        bucket_key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<BucketState> {
        let now = Utc::now();
        let new_reset = now + window;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT count, reset_at FROM rate_limit_buckets WHERE bucket_key = ?1")
            .bind(bucket_key)
            .fetch_optional(&mut *tx)
            .await?;

        let state = match row {
            None => {
                // The conflict arm covers losing a creation race to a
                // concurrent check: the guard keeps the winner's window from
                // being over-admitted.
                let result = sqlx::query(
                    r#"
                    INSERT INTO rate_limit_buckets (bucket_key, count, reset_at) VALUES (?1, 1, ?2)
                    ON CONFLICT(bucket_key) DO UPDATE SET count = count + 1
                    WHERE rate_limit_buckets.count < ?3
                    "#,
                )
                .bind(bucket_key)
                .bind(new_reset.to_rfc3339())
                .bind(i64::from(limit))
                .execute(&mut *tx)
                .await?;
                let admitted = result.rows_affected() > 0;

                let row = sqlx::query(
                    "SELECT count, reset_at FROM rate_limit_buckets WHERE bucket_key = ?1",
                )
                .bind(bucket_key)
                .fetch_one(&mut *tx)
                .await?;
                let count: i64 = row.try_get("count")?;
                let reset_at_str: String = row.try_get("reset_at")?;
                let reset_at = DateTime::parse_from_rfc3339(&reset_at_str)?.with_timezone(&Utc);

                BucketState {
                    allowed: admitted,
                    count: u32::try_from(count).unwrap_or(u32::MAX),
                    reset_at,
                }
            }
            Some(row) => {
                let count: i64 = row.try_get("count")?;
                let reset_at_str: String = row.try_get("reset_at")?;
                let reset_at = DateTime::parse_from_rfc3339(&reset_at_str)?.with_timezone(&Utc);

                if now >= reset_at {
                    // Window elapsed: reset to 1, not 0 (this request counts)
                    sqlx::query(
                        "UPDATE rate_limit_buckets SET count = 1, reset_at = ?1 WHERE bucket_key = ?2 AND reset_at <= ?3",
                    )
                    .bind(new_reset.to_rfc3339())
                    .bind(bucket_key)
                    .bind(now.to_rfc3339())
                    .execute(&mut *tx)
                    .await?;

                    BucketState {
                        allowed: true,
                        count: 1,
                        reset_at: new_reset,
                    }
                } else if count < i64::from(limit) {
                    let result = sqlx::query(
                        "UPDATE rate_limit_buckets SET count = count + 1 WHERE bucket_key = ?1 AND reset_at > ?2 AND count < ?3",
                    )
                    .bind(bucket_key)
                    .bind(now.to_rfc3339())
                    .bind(i64::from(limit))
                    .execute(&mut *tx)
                    .await?;

                    // The guard re-validates; zero rows means a concurrent
                    // check filled the window first.
                    let admitted = result.rows_affected() > 0;
                    let count = u32::try_from(count).unwrap_or(u32::MAX);
                    BucketState {
                        allowed: admitted,
                        count: if admitted { count.saturating_add(1) } else { count },
                        reset_at,
                    }
                } else {
                    // Over limit: do not increment further
                    BucketState {
                        allowed: false,
                        count: u32::try_from(count).unwrap_or(u32::MAX),
                        reset_at,
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(state)
    }

    /// Delete buckets whose window has already elapsed
    ///
    /// Garbage collection only; correctness never depends on this running.
    pub async fn sweep_expired_rate_limit_buckets(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_buckets WHERE reset_at <= ?1")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ================================
    // Row Conversion Helpers
    // ================================

    fn parse_uuid_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Uuid> {
        let value: String = row.try_get(column)?;
        Ok(Uuid::parse_str(&value)?)
    }

    fn parse_time_column(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>> {
        let value: String = row.try_get(column)?;
        Ok(DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc))
    }

    /// Convert database row to `CallSession`
    fn row_to_call_session(row: &sqlx::sqlite::SqliteRow) -> Result<CallSession> {
        let status_str: String = row.try_get("status")?;
        let status = CallSessionStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("Unknown call session status: {status_str}"))?;

        let ended_at_str: Option<String> = row.try_get("ended_at")?;
        let ended_at = match ended_at_str {
            Some(value) => Some(DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc)),
            None => None,
        };

        Ok(CallSession {
            id: Self::parse_uuid_column(row, "id")?,
            tenant_id: Self::parse_uuid_column(row, "tenant_id")?,
            provider_call_sid: row.try_get("provider_call_sid")?,
            status,
            conversation_id: Self::parse_uuid_column(row, "conversation_id")?,
            created_at: Self::parse_time_column(row, "created_at")?,
            ended_at,
        })
    }

    /// Convert database row to `AnswerMachineItem`
    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<AnswerMachineItem> {
        let item_type_str: String = row.try_get("item_type")?;
        let item_type = AnswerMachineType::parse(&item_type_str)
            .ok_or_else(|| anyhow!("Unknown item type: {item_type_str}"))?;

        let status_str: String = row.try_get("status")?;
        let status = AnswerMachineStatus::parse(&status_str)
            .ok_or_else(|| anyhow!("Unknown item status: {status_str}"))?;

        let call_session_id_str: Option<String> = row.try_get("call_session_id")?;
        let call_session_id = match call_session_id_str {
            Some(value) => Some(Uuid::parse_str(&value)?),
            None => None,
        };

        Ok(AnswerMachineItem {
            id: Self::parse_uuid_column(row, "id")?,
            tenant_id: Self::parse_uuid_column(row, "tenant_id")?,
            call_session_id,
            conversation_id: Self::parse_uuid_column(row, "conversation_id")?,
            item_type,
            status,
            reason: row.try_get("reason")?,
            from_number: row.try_get("from_number")?,
            recording_url: row.try_get("recording_url")?,
            recording_sid: row.try_get("recording_sid")?,
            transcript_text: row.try_get("transcript_text")?,
            callback_number: row.try_get("callback_number")?,
            callback_notes: row.try_get("callback_notes")?,
            created_at: Self::parse_time_column(row, "created_at")?,
            updated_at: Self::parse_time_column(row, "updated_at")?,
        })
    }

    /// Convert database row to `Conversation`
    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation> {
        Ok(Conversation {
            id: Self::parse_uuid_column(row, "id")?,
            tenant_id: Self::parse_uuid_column(row, "tenant_id")?,
            contact_number: row.try_get("contact_number")?,
            created_at: Self::parse_time_column(row, "created_at")?,
            last_activity_at: Self::parse_time_column(row, "last_activity_at")?,
        })
    }

    /// Convert database row to `ConversationMessage`
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationMessage> {
        Ok(ConversationMessage {
            id: Self::parse_uuid_column(row, "id")?,
            conversation_id: Self::parse_uuid_column(row, "conversation_id")?,
            tenant_id: Self::parse_uuid_column(row, "tenant_id")?,
            direction: row.try_get("direction")?,
            content: row.try_get("content")?,
            created_at: Self::parse_time_column(row, "created_at")?,
        })
    }

    /// Convert database row to `WidgetConfig`
    fn row_to_widget(row: &sqlx::sqlite::SqliteRow) -> Result<WidgetConfig> {
        let allowed_domains_str: String = row.try_get("allowed_domains")?;
        let allowed_domains: Vec<String> = serde_json::from_str(&allowed_domains_str)?;

        Ok(WidgetConfig {
            id: Self::parse_uuid_column(row, "id")?,
            tenant_id: Self::parse_uuid_column(row, "tenant_id")?,
            public_key: row.try_get("public_key")?,
            display_name: row.try_get("display_name")?,
            allowed_domains,
            greeting: row.try_get("greeting")?,
            accent_color: row.try_get("accent_color")?,
            enabled: row.try_get("enabled")?,
            created_at: Self::parse_time_column(row, "created_at")?,
        })
    }
}
