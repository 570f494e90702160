//! Persistent analytics store.
//!
//! The engine treats the store as an append-only, fire-and-forget
//! collaborator: records are opened when sessions and participants appear,
//! bumped as activity happens, and finalized at teardown. Every call is
//! best-effort; failures are logged by the caller and never block or roll
//! back live-session state.
//!
//! Two implementations: [`SqliteStore`] (async SQLite via SQLx, the real
//! thing) and [`NoopStore`] (used when no database is configured and in
//! tests).

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use huddle_proto::{CallerKind, EndReason};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Fields written when a session record is opened.
#[derive(Debug, Clone)]
pub struct NewSessionRecord<'a> {
    pub session_id: &'a str,
    pub instance_id: &'a str,
    pub title: &'a str,
    pub host_identity: &'a str,
    pub host_display_name: &'a str,
    pub started_at: i64,
}

/// Final counters written when a session ends.
#[derive(Debug, Clone, Copy)]
pub struct SessionFinal {
    pub ended_at: i64,
    pub reason: EndReason,
    pub duration_secs: i64,
    pub messages: u64,
    pub reactions: u64,
    pub questions: u64,
    pub hand_raises: u64,
    pub peak_participants: u64,
}

/// Fields written when a participant record is opened.
#[derive(Debug, Clone)]
pub struct NewParticipantRecord<'a> {
    pub session_record: i64,
    pub identity: &'a str,
    pub display_name: &'a str,
    pub kind: CallerKind,
    pub joined_at: i64,
}

/// Final counters written when a participant is removed.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantFinal {
    pub left_at: i64,
    pub duration_secs: i64,
    pub messages: u64,
    pub reactions: u64,
    pub questions: u64,
    pub hand_raises: u64,
}

/// Which per-participant activity counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Message,
    Reaction,
    Question,
    HandRaise,
}

impl Activity {
    fn column(self) -> &'static str {
        match self {
            Activity::Message => "messages",
            Activity::Reaction => "reactions",
            Activity::Question => "questions",
            Activity::HandRaise => "hand_raises",
        }
    }
}

fn kind_label(kind: CallerKind) -> &'static str {
    match kind {
        CallerKind::Staff => "staff",
        CallerKind::Manager => "manager",
        CallerKind::Guest => "guest",
    }
}

/// The persistent-store interface the engine consumes.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Open a session record; returns its handle.
    async fn create_session_record(&self, record: NewSessionRecord<'_>) -> Result<i64, StoreError>;

    /// Write the final aggregate for a session.
    async fn finalize_session_record(&self, id: i64, fin: SessionFinal) -> Result<(), StoreError>;

    /// Open a participant record under a session; returns its handle.
    async fn create_participant_record(
        &self,
        record: NewParticipantRecord<'_>,
    ) -> Result<i64, StoreError>;

    /// Write a participant's final counters, departure time and duration.
    async fn finalize_participant_record(
        &self,
        id: i64,
        fin: ParticipantFinal,
    ) -> Result<(), StoreError>;

    /// Increment one live activity counter on a participant record.
    async fn bump_participant_activity(&self, id: i64, activity: Activity)
    -> Result<(), StoreError>;
}

/// SQLite-backed analytics store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the store, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:huddled-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Analytics store connected");

        sqlx::migrate!("./migrations").run(&pool).await?;

        // WAL mode keeps live-session writes from contending with reads
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl AnalyticsStore for SqliteStore {
    async fn create_session_record(&self, record: NewSessionRecord<'_>) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO session_records
                (session_id, instance_id, title, host_identity, host_display_name, started_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.session_id)
        .bind(record.instance_id)
        .bind(record.title)
        .bind(record.host_identity)
        .bind(record.host_display_name)
        .bind(record.started_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn finalize_session_record(&self, id: i64, fin: SessionFinal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE session_records
            SET ended_at = ?, end_reason = ?, duration_secs = ?,
                messages = ?, reactions = ?, questions = ?, hand_raises = ?,
                peak_participants = ?
            WHERE id = ?
            "#,
        )
        .bind(fin.ended_at)
        .bind(fin.reason.as_str())
        .bind(fin.duration_secs)
        .bind(fin.messages as i64)
        .bind(fin.reactions as i64)
        .bind(fin.questions as i64)
        .bind(fin.hand_raises as i64)
        .bind(fin.peak_participants as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn create_participant_record(
        &self,
        record: NewParticipantRecord<'_>,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO participant_records
                (session_record_id, identity, display_name, kind, joined_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.session_record)
        .bind(record.identity)
        .bind(record.display_name)
        .bind(kind_label(record.kind))
        .bind(record.joined_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn finalize_participant_record(
        &self,
        id: i64,
        fin: ParticipantFinal,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE participant_records
            SET left_at = ?, duration_secs = ?,
                messages = ?, reactions = ?, questions = ?, hand_raises = ?
            WHERE id = ?
            "#,
        )
        .bind(fin.left_at)
        .bind(fin.duration_secs)
        .bind(fin.messages as i64)
        .bind(fin.reactions as i64)
        .bind(fin.questions as i64)
        .bind(fin.hand_raises as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn bump_participant_activity(
        &self,
        id: i64,
        activity: Activity,
    ) -> Result<(), StoreError> {
        // Column name comes from a closed enum, never from input.
        let sql = format!(
            "UPDATE participant_records SET {col} = {col} + 1 WHERE id = ?",
            col = activity.column()
        );
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

/// No-op analytics store used when persistence is disabled.
///
/// All operations succeed but store nothing. Handles are still unique so
/// callers can exercise the full record lifecycle.
pub struct NoopStore {
    next_id: AtomicI64,
}

impl NoopStore {
    pub fn new() -> Self {
        Self { next_id: AtomicI64::new(1) }
    }
}

impl Default for NoopStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalyticsStore for NoopStore {
    async fn create_session_record(&self, _record: NewSessionRecord<'_>) -> Result<i64, StoreError> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn finalize_session_record(&self, _id: i64, _fin: SessionFinal) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_participant_record(
        &self,
        _record: NewParticipantRecord<'_>,
    ) -> Result<i64, StoreError> {
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn finalize_participant_record(
        &self,
        _id: i64,
        _fin: ParticipantFinal,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn bump_participant_activity(
        &self,
        _id: i64,
        _activity: Activity,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_record_lifecycle() {
        let store = SqliteStore::new(":memory:").await.expect("store");

        let sid = store
            .create_session_record(NewSessionRecord {
                session_id: "m1",
                instance_id: "i-1",
                title: "Pre-shift",
                host_identity: "u-1",
                host_display_name: "Alex",
                started_at: 1_000,
            })
            .await
            .expect("create session record");

        let pid = store
            .create_participant_record(NewParticipantRecord {
                session_record: sid,
                identity: "u-2",
                display_name: "Kim",
                kind: CallerKind::Staff,
                joined_at: 1_010,
            })
            .await
            .expect("create participant record");

        store
            .bump_participant_activity(pid, Activity::Message)
            .await
            .expect("bump");

        store
            .finalize_participant_record(
                pid,
                ParticipantFinal {
                    left_at: 1_500,
                    duration_secs: 490,
                    messages: 3,
                    reactions: 1,
                    questions: 0,
                    hand_raises: 1,
                },
            )
            .await
            .expect("finalize participant");

        store
            .finalize_session_record(
                sid,
                SessionFinal {
                    ended_at: 2_000,
                    reason: EndReason::EndedByHost,
                    duration_secs: 1_000,
                    messages: 3,
                    reactions: 1,
                    questions: 0,
                    hand_raises: 1,
                    peak_participants: 2,
                },
            )
            .await
            .expect("finalize session");

        let (reason, messages): (String, i64) = sqlx::query_as(
            "SELECT end_reason, messages FROM session_records WHERE id = ?",
        )
        .bind(sid)
        .fetch_one(store.pool())
        .await
        .expect("read back");

        assert_eq!(reason, "ended by host");
        assert_eq!(messages, 3);
    }

    #[tokio::test]
    async fn file_backed_store_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("analytics.db");
        let store = SqliteStore::new(path.to_str().expect("utf8 path"))
            .await
            .expect("store");

        let id = store
            .create_session_record(NewSessionRecord {
                session_id: "m1",
                instance_id: "i-1",
                title: "t",
                host_identity: "u",
                host_display_name: "U",
                started_at: 0,
            })
            .await
            .expect("create");
        assert!(id > 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn noop_store_hands_out_unique_handles() {
        let store = NoopStore::new();
        let a = store
            .create_session_record(NewSessionRecord {
                session_id: "m1",
                instance_id: "i-1",
                title: "t",
                host_identity: "u",
                host_display_name: "U",
                started_at: 0,
            })
            .await
            .unwrap();
        let b = store
            .create_participant_record(NewParticipantRecord {
                session_record: a,
                identity: "u2",
                display_name: "V",
                kind: CallerKind::Guest,
                joined_at: 0,
            })
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
