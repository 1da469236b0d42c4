use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Commission, MemberId, NewTask, Task, TaskSubmission},
    traits::ReferralGraphError,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Task #{0} does not exist")]
    TaskNotFound(i64),
    #[error("Task #{0} has expired")]
    TaskExpired(i64),
    #[error("Submission #{submission_id} does not exist for task #{task_id}")]
    SubmissionNotFound { task_id: i64, submission_id: i64 },
    #[error("Submission #{0} has already been approved")]
    AlreadyApproved(i64),
    #[error("Member #{0} does not exist")]
    MemberNotFound(MemberId),
    #[error("Could not serialize the submission payload. {0}")]
    InvalidPayload(String),
}

impl TaskError {
    pub fn code(&self) -> &'static str {
        match self {
            TaskError::DatabaseError(_) => "DATABASE_ERROR",
            TaskError::TaskNotFound(_) => "TASK_NOT_FOUND",
            TaskError::TaskExpired(_) => "TASK_EXPIRED",
            TaskError::SubmissionNotFound { .. } => "SUBMISSION_NOT_FOUND",
            TaskError::AlreadyApproved(_) => "ALREADY_APPROVED",
            TaskError::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            TaskError::InvalidPayload(_) => "INVALID_DATA",
        }
    }
}

impl From<sqlx::Error> for TaskError {
    fn from(e: sqlx::Error) -> Self {
        TaskError::DatabaseError(e.to_string())
    }
}

impl From<ReferralGraphError> for TaskError {
    fn from(e: ReferralGraphError) -> Self {
        match e {
            ReferralGraphError::MemberNotFound(id) => TaskError::MemberNotFound(id),
            other => TaskError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(e: serde_json::Error) -> Self {
        TaskError::InvalidPayload(e.to_string())
    }
}

#[allow(async_fn_in_trait)]
pub trait TaskManagement: Clone {
    async fn insert_task(&self, task: NewTask) -> Result<Task, TaskError>;

    async fn fetch_task(&self, id: i64) -> Result<Option<Task>, TaskError>;

    /// Tasks that have no expiry, or expire after `now`, newest first.
    async fn fetch_open_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, TaskError>;

    async fn insert_submission(
        &self,
        task_id: i64,
        member_id: MemberId,
        payload: &serde_json::Value,
    ) -> Result<TaskSubmission, TaskError>;

    async fn fetch_submissions_for_member(&self, member_id: MemberId) -> Result<Vec<TaskSubmission>, TaskError>;

    /// Approves the submission and credits the task reward as a level 0 commission, atomically.
    ///
    /// Approving twice is an error ([`TaskError::AlreadyApproved`]), and never credits the reward twice.
    async fn approve_submission(
        &self,
        task_id: i64,
        submission_id: i64,
    ) -> Result<(TaskSubmission, Commission), TaskError>;

    async fn reject_submission(&self, task_id: i64, submission_id: i64) -> Result<TaskSubmission, TaskError>;
}
