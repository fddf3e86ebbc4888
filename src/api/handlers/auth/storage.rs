//! Database helpers for accounts, challenges, voiceprints, and the
//! append-only login attempt log.
//!
//! Every cross-request invariant (failed-attempt counter, lock
//! transition, single-use challenge consumption) lives in a single SQL
//! statement so concurrent requests cannot interleave a read-then-write.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{Instrument, error};
use uuid::Uuid;

use super::audit::FailureReason;
use super::utils::is_unique_violation;

/// Account fields needed by pre-check and the verifier.
pub(super) struct AccountRecord {
    pub(super) id: Uuid,
    pub(super) username: String,
    pub(super) pin_hash: String,
    pub(super) role: String,
    pub(super) active: bool,
    pub(super) locked_until: Option<DateTime<Utc>>,
}

/// Outcome when attempting to create a new account + voiceprints.
#[derive(Debug)]
pub(super) enum EnrollOutcome {
    Created,
    Conflict,
}

/// State of the most recently issued challenge for an account.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ChallengeStatus {
    Live,
    Missing,
    Expired,
    Reused,
}

/// Result of the atomic single-use challenge consumption.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum ConsumeOutcome {
    Consumed,
    /// Another submission consumed the challenge first (or it aged out
    /// between peek and consume).
    Raced,
}

/// Counter state after a recorded failure.
pub(super) struct FailureUpdate {
    pub(super) failed_attempts: i32,
    pub(super) locked_until: Option<DateTime<Utc>>,
}

pub(super) async fn lookup_account(pool: &PgPool, username: &str) -> Result<Option<AccountRecord>> {
    let query = r"
        SELECT id, username, pin_hash, role, active, locked_until
        FROM accounts
        WHERE username = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup account")?;

    Ok(row.map(|row| AccountRecord {
        id: row.get("id"),
        username: row.get("username"),
        pin_hash: row.get("pin_hash"),
        role: row.get("role"),
        active: row.get("active"),
        locked_until: row.get("locked_until"),
    }))
}

/// Zero the counter once a lock window has passed.
///
/// The predicate keeps this a no-op for live locks, so it is safe to call
/// on every pre-check that sees a `locked_until` in the past.
pub(super) async fn clear_expired_lock(pool: &PgPool, account_id: Uuid) -> Result<()> {
    let query = r"
        UPDATE accounts
        SET failed_attempts = 0,
            locked_until = NULL
        WHERE id = $1
          AND locked_until IS NOT NULL
          AND locked_until <= NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear expired lock")?;
    Ok(())
}

/// Create an account and its encrypted enrollment voiceprints in one
/// transaction. IDs are generated by the caller because the voiceprint
/// ciphertext AAD binds them.
pub(super) async fn insert_enrollment(
    pool: &PgPool,
    account_id: Uuid,
    username: &str,
    pin_hash: &str,
    voiceprints: &[(Uuid, Vec<u8>)],
) -> Result<EnrollOutcome> {
    let mut tx = pool.begin().await.context("begin enroll transaction")?;

    let query = r"
        INSERT INTO accounts (id, username, pin_hash)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account_id)
        .bind(username)
        .bind(pin_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await;

    if let Err(err) = result {
        if is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(EnrollOutcome::Conflict);
        }
        return Err(err).context("failed to insert account");
    }

    for (voiceprint_id, embedding) in voiceprints {
        let query = r"
            INSERT INTO voiceprints (id, account_id, embedding)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(voiceprint_id)
            .bind(account_id)
            .bind(embedding)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert voiceprint")?;
    }

    tx.commit().await.context("commit enroll transaction")?;
    Ok(EnrollOutcome::Created)
}

pub(super) async fn load_voiceprints(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Vec<(Uuid, Vec<u8>)>> {
    let query = r"
        SELECT id, embedding
        FROM voiceprints
        WHERE account_id = $1
        ORDER BY created_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(account_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to load voiceprints")?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("embedding")))
        .collect())
}

/// Persist a fresh challenge, retiring any previous live one so at most
/// one challenge per account can ever be answered.
pub(super) async fn issue_challenge(
    pool: &PgPool,
    account_id: Uuid,
    phrase: &str,
    ttl_seconds: i64,
) -> Result<DateTime<Utc>> {
    let mut tx = pool.begin().await.context("begin challenge transaction")?;

    let query = r"
        UPDATE challenges
        SET used = TRUE
        WHERE account_id = $1
          AND NOT used
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to retire previous challenges")?;

    let query = r"
        INSERT INTO challenges (account_id, phrase, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        RETURNING expires_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .bind(phrase)
        .bind(ttl_seconds)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert challenge")?;

    tx.commit().await.context("commit challenge transaction")?;
    Ok(row.get("expires_at"))
}

/// Classify the most recent challenge without consuming it.
pub(super) async fn peek_challenge(pool: &PgPool, account_id: Uuid) -> Result<ChallengeStatus> {
    let query = r"
        SELECT used, expires_at
        FROM challenges
        WHERE account_id = $1
        ORDER BY created_at DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to peek challenge")?;

    let Some(row) = row else {
        return Ok(ChallengeStatus::Missing);
    };

    let used: bool = row.get("used");
    if used {
        return Ok(ChallengeStatus::Reused);
    }
    let expires_at: DateTime<Utc> = row.get("expires_at");
    if expires_at <= Utc::now() {
        return Ok(ChallengeStatus::Expired);
    }
    Ok(ChallengeStatus::Live)
}

/// Consume the live challenge exactly once.
///
/// The outer `NOT used` predicate is re-evaluated against the current row
/// version under the row lock, so when two submissions race, exactly one
/// sees `Consumed` and the other `Raced`.
pub(super) async fn consume_challenge(pool: &PgPool, account_id: Uuid) -> Result<ConsumeOutcome> {
    let query = r"
        UPDATE challenges
        SET used = TRUE
        WHERE id = (
            SELECT id
            FROM challenges
            WHERE account_id = $1
              AND NOT used
              AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
        )
          AND NOT used
          AND expires_at > NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume challenge")?;

    Ok(if row.is_some() {
        ConsumeOutcome::Consumed
    } else {
        ConsumeOutcome::Raced
    })
}

/// Record a counted failure: one atomic counter increment (with the lock
/// transition computed server-side) plus the audit row, in one transaction.
pub(super) async fn record_attempt_failure(
    pool: &PgPool,
    account_id: Uuid,
    username: &str,
    reason: FailureReason,
    client_ip: Option<&str>,
    max_attempts: i32,
    lockout_seconds: i64,
) -> Result<FailureUpdate> {
    let mut tx = pool.begin().await.context("begin failure transaction")?;

    // Single-statement read-modify-write: two racing failures at
    // counter = max - 1 cannot both observe the pre-threshold value.
    let query = r"
        UPDATE accounts
        SET failed_attempts = failed_attempts + 1,
            locked_until = CASE
                WHEN failed_attempts + 1 >= $2
                THEN NOW() + ($3 * INTERVAL '1 second')
                ELSE locked_until
            END
        WHERE id = $1
        RETURNING failed_attempts, locked_until
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(account_id)
        .bind(max_attempts)
        .bind(lockout_seconds)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to increment failed attempts")?;

    insert_attempt(
        &mut tx,
        Some(account_id),
        username,
        false,
        Some(reason),
        client_ip,
    )
    .await?;

    tx.commit().await.context("commit failure transaction")?;

    Ok(FailureUpdate {
        failed_attempts: row.get("failed_attempts"),
        locked_until: row.get("locked_until"),
    })
}

/// Audit-only rejection (unknown username, already-locked or disabled
/// account): no counter movement.
pub(super) async fn record_rejection(
    pool: &PgPool,
    account_id: Option<Uuid>,
    username: &str,
    reason: FailureReason,
    client_ip: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin rejection transaction")?;
    insert_attempt(&mut tx, account_id, username, false, Some(reason), client_ip).await?;
    tx.commit().await.context("commit rejection transaction")?;
    Ok(())
}

/// Successful authentication: reset the counter, clear any lock, stamp
/// the login time, and write the audit row in one transaction.
pub(super) async fn record_success(
    pool: &PgPool,
    account_id: Uuid,
    username: &str,
    client_ip: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin success transaction")?;

    let query = r"
        UPDATE accounts
        SET failed_attempts = 0,
            locked_until = NULL,
            last_login_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to reset failed attempts")?;

    insert_attempt(&mut tx, Some(account_id), username, true, None, client_ip).await?;

    tx.commit().await.context("commit success transaction")?;
    Ok(())
}

async fn insert_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Option<Uuid>,
    username: &str,
    success: bool,
    reason: Option<FailureReason>,
    client_ip: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO login_attempts
            (account_id, username, success, failure_reason, client_ip)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account_id)
        .bind(username)
        .bind(success)
        .bind(reason.map(FailureReason::as_str))
        .bind(client_ip)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert login attempt")?;
    Ok(())
}

/// Audit writes must never break the auth response; callers use this to
/// downgrade a failed write to a logged error.
pub(super) fn log_audit_error(context: &str, err: &anyhow::Error) {
    error!("{context}: {err}");
}

#[cfg(test)]
mod tests {
    use super::{ChallengeStatus, ConsumeOutcome, EnrollOutcome};

    #[test]
    fn enroll_outcome_debug_names() {
        assert_eq!(format!("{:?}", EnrollOutcome::Created), "Created");
        assert_eq!(format!("{:?}", EnrollOutcome::Conflict), "Conflict");
    }

    #[test]
    fn challenge_status_covers_terminal_states() {
        assert_ne!(ChallengeStatus::Live, ChallengeStatus::Expired);
        assert_ne!(ChallengeStatus::Reused, ChallengeStatus::Missing);
    }

    #[test]
    fn consume_outcome_debug_names() {
        assert_eq!(format!("{:?}", ConsumeOutcome::Consumed), "Consumed");
        assert_eq!(format!("{:?}", ConsumeOutcome::Raced), "Raced");
    }
}
