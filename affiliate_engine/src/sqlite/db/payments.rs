use affiliate_common::UsdCents;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Gateway, MemberId, NewPayment, Payment, PaymentEventRecord, PaymentStatus},
    traits::{PaymentGatewayError, PaymentOutcomeCode},
};

pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, PaymentGatewayError> {
    let reference = payment.reference.clone().unwrap_or_default();
    let now = Utc::now();
    let rows: Vec<Payment> = sqlx::query_as(
        r#"
            INSERT INTO payments (member_id, gateway, amount, amount_local, currency, status, reference, created_at,
            updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(payment.member_id)
    .bind(payment.gateway)
    .bind(payment.amount)
    .bind(payment.amount_local)
    .bind(payment.currency)
    .bind(PaymentStatus::Initiated)
    .bind(payment.reference)
    .bind(now)
    .bind(now)
    .fetch_all(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => PaymentGatewayError::PaymentAlreadyExists(reference),
        _ => PaymentGatewayError::from(e),
    })?;
    rows.into_iter().next().ok_or_else(|| sqlx::Error::RowNotFound.into())
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_payment_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE reference = $1").bind(reference).fetch_optional(conn).await
}

pub async fn fetch_payment_by_event_id(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE webhook_event_id = $1").bind(event_id).fetch_optional(conn).await
}

pub async fn fetch_payments_for_member(
    member_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payments WHERE member_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(member_id)
        .fetch_all(conn)
        .await
}

/// The most recently created `initiated` or `pending` payment for the member.
pub async fn fetch_latest_open_payment(
    member_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM payments
        WHERE member_id = $1 AND status IN ('initiated', 'pending')
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(member_id)
    .fetch_optional(conn)
    .await
}

/// Claims `event_id` in the processed event log. Returns `false` if the event was claimed before.
pub async fn claim_event(
    event_id: &str,
    gateway: Gateway,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO payment_events (event_id, gateway, processed_at) VALUES ($1, $2, $3) ON CONFLICT (event_id) DO \
         NOTHING",
    )
    .bind(event_id)
    .bind(gateway)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_event(
    event_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentEventRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_events WHERE event_id = $1").bind(event_id).fetch_optional(conn).await
}

pub async fn record_event_outcome(
    event_id: &str,
    payment_id: i64,
    outcome: PaymentOutcomeCode,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payment_events SET payment_id = $1, outcome = $2 WHERE event_id = $3")
        .bind(payment_id)
        .bind(outcome.as_str())
        .bind(event_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Moves an open payment to `status`, stamping it with the event id that caused the change.
///
/// Terminal payments are never touched: `None` is returned if the payment is not `initiated` or `pending`.
pub async fn transition(
    payment_id: i64,
    status: PaymentStatus,
    event_id: &str,
    amount: Option<UsdCents>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    trace!("🗃️ Moving payment #{payment_id} to {status}");
    let rows: Vec<Payment> = sqlx::query_as(
        r#"
        UPDATE payments SET status = $1, webhook_event_id = $2, amount = COALESCE($3, amount), updated_at = $4
        WHERE id = $5 AND status IN ('initiated', 'pending')
        RETURNING *;
        "#,
    )
    .bind(status)
    .bind(event_id)
    .bind(amount)
    .bind(Utc::now())
    .bind(payment_id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().next())
}
