use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{ChildSide, Member, MemberId, MemberRecord, MemberStatus},
    traits::ReferralGraphError,
};

pub async fn fetch_member(id: MemberId, conn: &mut SqliteConnection) -> Result<Option<Member>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM members WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_members(ids: &[MemberId], conn: &mut SqliteConnection) -> Result<Vec<Member>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::new("SELECT * FROM members WHERE id IN (");
    let mut values = qb.separated(", ");
    ids.iter().for_each(|id| {
        values.push_bind(*id);
    });
    qb.push(") ORDER BY id ASC");
    qb.build_query_as::<Member>().fetch_all(conn).await
}

pub async fn fetch_member_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<Member>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM members WHERE email = $1").bind(email).fetch_optional(conn).await
}

pub async fn fetch_member_by_phone(phone: &str, conn: &mut SqliteConnection) -> Result<Option<Member>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM members WHERE phone = $1").bind(phone).fetch_optional(conn).await
}

pub async fn fetch_member_by_referral_code(
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Member>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM members WHERE referral_code = $1").bind(code).fetch_optional(conn).await
}

pub async fn fetch_sponsored(sponsor_id: MemberId, conn: &mut SqliteConnection) -> Result<Vec<Member>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM members WHERE sponsor_id = $1 ORDER BY created_at ASC, id ASC")
        .bind(sponsor_id)
        .fetch_all(conn)
        .await
}

pub async fn insert_member(member: MemberRecord, conn: &mut SqliteConnection) -> Result<Member, ReferralGraphError> {
    let MemberRecord { name, email, phone, country, currency, referral_code, sponsor_id, is_admin } = member;
    let result = sqlx::query_as(
        r#"
        INSERT INTO members (name, email, phone, country, currency, referral_code, sponsor_id, status, is_admin,
        created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *;
        "#,
    )
    .bind(&name)
    .bind(&email)
    .bind(&phone)
    .bind(&country)
    .bind(&currency)
    .bind(&referral_code)
    .bind(sponsor_id)
    .bind(MemberStatus::Pending)
    .bind(is_admin)
    .bind(Utc::now())
    .fetch_all(conn)
    .await
    .and_then(|rows: Vec<Member>| rows.into_iter().next().ok_or(sqlx::Error::RowNotFound));
    match result {
        Ok(member) => Ok(member),
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            let msg = err.message();
            if msg.contains("members.email") {
                Err(ReferralGraphError::EmailExists(email))
            } else if msg.contains("members.phone") {
                Err(ReferralGraphError::PhoneExists(phone.unwrap_or_default()))
            } else {
                Err(ReferralGraphError::ReferralCodeExists(referral_code))
            }
        },
        Err(e) => Err(e.into()),
    }
}

/// Sets the child pointer on `side` of `parent_id`, but only if that slot is still empty. A right child is only
/// accepted once the left slot is filled.
///
/// Returns `true` if the slot was claimed.
pub async fn set_child(
    parent_id: MemberId,
    child_id: MemberId,
    side: ChildSide,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let guard = match side {
        ChildSide::Left => "",
        ChildSide::Right => " AND left_child_id IS NOT NULL",
    };
    let column = side.column();
    let sql = format!("UPDATE members SET {column} = $1 WHERE id = $2 AND {column} IS NULL{guard}");
    let result = sqlx::query(&sql).bind(child_id).bind(parent_id).execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

/// Sets the binary parent of `child_id`, but only if it does not have one yet.
pub async fn set_binary_parent(
    child_id: MemberId,
    parent_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE members SET binary_parent_id = $1 WHERE id = $2 AND binary_parent_id IS NULL")
        .bind(parent_id)
        .bind(child_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Updates the member's status. The activation expiry is only changed when a new value is given.
pub async fn update_status(
    id: MemberId,
    status: MemberStatus,
    activation_expires_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Option<Member>, sqlx::Error> {
    trace!("🗃️ Setting status of member #{id} to {status}");
    let rows: Vec<Member> = sqlx::query_as(
        "UPDATE members SET status = $1, activation_expires_at = COALESCE($2, activation_expires_at) WHERE id = $3 \
         RETURNING *",
    )
    .bind(status)
    .bind(activation_expires_at)
    .bind(id)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().next())
}

pub async fn expire_activations(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Member>, sqlx::Error> {
    let expired: Vec<Member> = sqlx::query_as(
        r#"
        UPDATE members SET status = 'pending'
        WHERE status = 'active' AND activation_expires_at IS NOT NULL AND activation_expires_at <= $1
        RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    debug!("🗃️ {} activations expired", expired.len());
    Ok(expired)
}
