use std::collections::HashSet;

use affiliate_common::UsdCents;
use chrono::Utc;
use log::*;
use sqlx::SqliteConnection;

use crate::{
    affiliate_api::commission::CommissionSchedule,
    db_types::{Commission, Member, MemberId, NewCommission},
    sqlite::db::members,
    traits::PaymentGatewayError,
};

/// Appends a commission row. If a row already exists for the same correlation id and level, nothing is written and
/// `None` is returned.
pub async fn insert_commission(
    commission: NewCommission,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, sqlx::Error> {
    let rows: Vec<Commission> = sqlx::query_as(
        r#"
        INSERT INTO commissions (earner_id, source_member_id, level, amount, percent, description, correlation_id,
        created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (correlation_id, level) DO NOTHING
        RETURNING *;
        "#,
    )
    .bind(commission.earner_id)
    .bind(commission.source_member_id)
    .bind(commission.level)
    .bind(commission.amount)
    .bind(commission.percent)
    .bind(commission.description)
    .bind(commission.correlation_id)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().next())
}

/// Walks the sponsor chain of `member` and appends one commission row per paying level of `schedule`.
///
/// The walk follows `sponsor_id`, never the binary parent. It stops when the schedule runs out of paying levels, the
/// chain ends, a sponsor record is missing, or a sponsor is seen twice.
///
/// A level that was already written for `member` under `correlation_id` is skipped. If the existing row was paid for a
/// different member, the correlation id is being reused and [`PaymentGatewayError::CorrelationConflict`] is returned.
pub async fn write_waterfall(
    member: &Member,
    schedule: &CommissionSchedule,
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, PaymentGatewayError> {
    let mut written = Vec::new();
    let mut visited = HashSet::from([member.id]);
    let mut next = member.sponsor_id;
    for level in schedule.levels() {
        let Some(earner_id) = next else {
            break;
        };
        if !visited.insert(earner_id) {
            warn!("💸️ Sponsor cycle detected at member #{earner_id} while paying out for #{}", member.id);
            break;
        }
        let Some(earner) = members::fetch_member(earner_id, conn).await? else {
            warn!("💸️ Sponsor #{earner_id} of the chain above #{} does not exist", member.id);
            break;
        };
        let commission = NewCommission {
            earner_id,
            source_member_id: member.id,
            level: i64::from(level.level),
            amount: level.amount,
            percent: level.percent,
            description: Some(format!("Level {} commission from {}", level.level, member.name)),
            correlation_id: correlation_id.to_string(),
        };
        match insert_commission(commission, conn).await? {
            Some(c) => {
                debug!("💸️ Level {} commission of {} to #{earner_id} [{correlation_id}]", c.level, c.amount);
                written.push(c);
            },
            None => {
                let level = i64::from(level.level);
                let existing = fetch_by_correlation_and_level(correlation_id, level, conn).await?;
                match existing {
                    Some(c) if c.source_member_id != member.id => {
                        warn!(
                            "💸️ [{correlation_id}] level {level} was already paid for #{}, not #{}",
                            c.source_member_id, member.id
                        );
                        return Err(PaymentGatewayError::CorrelationConflict {
                            correlation_id: correlation_id.to_string(),
                            level,
                            source_member_id: c.source_member_id,
                        });
                    },
                    _ => trace!("💸️ Level {level} commission for [{correlation_id}] already exists"),
                }
            },
        }
        next = earner.sponsor_id;
    }
    Ok(written)
}

pub async fn fetch_for_earner(
    earner_id: MemberId,
    skip: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM commissions WHERE earner_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
    )
    .bind(earner_id)
    .bind(limit)
    .bind(skip)
    .fetch_all(conn)
    .await
}

pub async fn fetch_all_for_earner(
    earner_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM commissions WHERE earner_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(earner_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_by_correlation_id(
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Commission>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM commissions WHERE correlation_id = $1 ORDER BY level ASC")
        .bind(correlation_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_by_correlation_and_level(
    correlation_id: &str,
    level: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Commission>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM commissions WHERE correlation_id = $1 AND level = $2")
        .bind(correlation_id)
        .bind(level)
        .fetch_optional(conn)
        .await
}

pub async fn total_earned(earner_id: MemberId, conn: &mut SqliteConnection) -> Result<UsdCents, sqlx::Error> {
    let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM commissions WHERE earner_id = $1")
        .bind(earner_id)
        .fetch_one(conn)
        .await?;
    Ok(UsdCents::from(total))
}
