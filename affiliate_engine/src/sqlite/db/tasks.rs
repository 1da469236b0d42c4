use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{MemberId, NewTask, SubmissionStatus, Task, TaskSubmission};

pub async fn insert_task(task: NewTask, conn: &mut SqliteConnection) -> Result<Task, sqlx::Error> {
    let rows: Vec<Task> = sqlx::query_as(
        r#"
        INSERT INTO tasks (title, description, kind, reward, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *;
        "#,
    )
    .bind(task.title)
    .bind(task.description)
    .bind(task.kind)
    .bind(task.reward)
    .bind(task.expires_at)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}

pub async fn fetch_task(id: i64, conn: &mut SqliteConnection) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM tasks WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_open_tasks(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM tasks WHERE expires_at IS NULL OR expires_at > $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(now)
    .fetch_all(conn)
    .await
}

pub async fn insert_submission(
    task_id: i64,
    member_id: MemberId,
    payload: String,
    conn: &mut SqliteConnection,
) -> Result<TaskSubmission, sqlx::Error> {
    let rows: Vec<TaskSubmission> = sqlx::query_as(
        r#"
        INSERT INTO task_submissions (task_id, member_id, payload, status, reward_granted, created_at)
        VALUES ($1, $2, $3, $4, 0, $5)
        RETURNING *;
        "#,
    )
    .bind(task_id)
    .bind(member_id)
    .bind(payload)
    .bind(SubmissionStatus::Submitted)
    .bind(Utc::now())
    .fetch_all(conn)
    .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}

/// Fetches a submission, but only if it belongs to `task_id`.
pub async fn fetch_submission(
    task_id: i64,
    submission_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<TaskSubmission>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM task_submissions WHERE id = $1 AND task_id = $2")
        .bind(submission_id)
        .bind(task_id)
        .fetch_optional(conn)
        .await
}

pub async fn update_submission(
    submission_id: i64,
    status: SubmissionStatus,
    reward_granted: bool,
    conn: &mut SqliteConnection,
) -> Result<TaskSubmission, sqlx::Error> {
    let rows: Vec<TaskSubmission> =
        sqlx::query_as("UPDATE task_submissions SET status = $1, reward_granted = $2 WHERE id = $3 RETURNING *")
            .bind(status)
            .bind(reward_granted)
            .bind(submission_id)
            .fetch_all(conn)
            .await?;
    rows.into_iter().next().ok_or(sqlx::Error::RowNotFound)
}

pub async fn fetch_submissions_for_member(
    member_id: MemberId,
    conn: &mut SqliteConnection,
) -> Result<Vec<TaskSubmission>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM task_submissions WHERE member_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(member_id)
        .fetch_all(conn)
        .await
}
