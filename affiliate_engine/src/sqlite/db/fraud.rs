use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{FraudLog, MemberId};

pub async fn insert_fraud_log(
    member_id: Option<MemberId>,
    action: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    warn!("🚨️ Fraud log: {action} / {reason} (member: {member_id:?})");
    sqlx::query("INSERT INTO fraud_logs (member_id, action, reason, created_at) VALUES ($1, $2, $3, $4)")
        .bind(member_id)
        .bind(action)
        .bind(reason)
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_fraud_logs(conn: &mut SqliteConnection) -> Result<Vec<FraudLog>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fraud_logs ORDER BY created_at DESC, id DESC").fetch_all(conn).await
}
