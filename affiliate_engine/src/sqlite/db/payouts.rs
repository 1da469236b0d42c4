use affiliate_common::UsdCents;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{MemberId, NewPayoutRequest, PayoutRequest, PayoutStatus};

pub async fn insert_payout_request(
    request: NewPayoutRequest,
    conn: &mut SqliteConnection,
) -> Result<PayoutRequest, sqlx::Error> {
    let rows: Vec<PayoutRequest> = sqlx::query_as(
        r#"
        INSERT INTO payout_requests (member_id, amount, gateway, destination, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *;
        "#,
    )
    .bind(request.member_id)
    .bind(request.amount)
    .bind(request.gateway)
    .bind(request.destination)
    .bind(PayoutStatus::Pending)
    .bind(request.created_at)
    .bind(request.created_at)
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}

/// The most recent request of any status made strictly after `since`.
pub async fn fetch_latest_since(
    member_id: MemberId,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutRequest>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM payout_requests
        WHERE member_id = $1 AND created_at > $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(member_id)
    .bind(since)
    .fetch_optional(conn)
    .await
}

pub async fn total_sent(member_id: MemberId, conn: &mut SqliteConnection) -> Result<UsdCents, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payout_requests WHERE member_id = $1 AND status = 'sent'",
    )
    .bind(member_id)
    .fetch_one(conn)
    .await?;
    Ok(UsdCents::from(total))
}

pub async fn fetch_payout_request(id: i64, conn: &mut SqliteConnection) -> Result<Option<PayoutRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_requests WHERE id = $1").bind(id).fetch_optional(conn).await
}

/// Moves a `pending` request to `status`. Returns `None` if the request is not pending (or does not exist).
pub async fn resolve_pending(
    id: i64,
    status: PayoutStatus,
    note: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<Option<PayoutRequest>, sqlx::Error> {
    trace!("🗃️ Moving payout request #{id} to {status}");
    let rows: Vec<PayoutRequest> = sqlx::query_as(
        r#"
        UPDATE payout_requests SET status = $1, admin_note = COALESCE($2, admin_note), updated_at = $3
        WHERE id = $4 AND status = 'pending'
        RETURNING *;
        "#,
    )
    .bind(status)
    .bind(note)
    .bind(Utc::now())
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().next())
}

pub async fn fetch_for_member(
    member_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutRequest>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payout_requests WHERE member_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(member_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_sent_for_member(
    member_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutRequest>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM payout_requests WHERE member_id = $1 AND status = 'sent' ORDER BY updated_at DESC, id DESC",
    )
    .bind(member_id)
    .fetch_all(conn)
    .await
}

pub async fn fetch_payout_requests(
    status: Option<PayoutStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PayoutRequest>, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_as("SELECT * FROM payout_requests WHERE status = $1 ORDER BY created_at DESC, id DESC")
                .bind(status)
                .fetch_all(conn)
                .await
        },
        None => sqlx::query_as("SELECT * FROM payout_requests ORDER BY created_at DESC, id DESC").fetch_all(conn).await,
    }
}
