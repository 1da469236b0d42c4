use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde_json::{json, Value};

use crate::{
    affiliate_api::notification_api::Notifier,
    db_types::{Commission, MemberId, NewTask, NotificationKind, Recipient, Task, TaskSubmission},
    events::EventProducers,
    traits::{NotificationManagement, ReferralGraph, TaskError, TaskManagement},
};

/// Micro-tasks (videos, surveys, forms) that members complete for a fixed reward.
///
/// An approved submission credits the reward to the member's own ledger as a level 0 commission, so it shows up in
/// their balance and can be paid out like any other earnings.
pub struct TaskApi<B> {
    db: B,
    notifier: Notifier<B>,
}

impl<B> Debug for TaskApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskApi")
    }
}

impl<B> TaskApi<B>
where B: TaskManagement + NotificationManagement + ReferralGraph
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        let notifier = Notifier::new(db.clone(), producers);
        Self { db, notifier }
    }

    /// Posts a new task and announces it on the broadcast channel.
    pub async fn create_task(&self, task: NewTask) -> Result<Task, TaskError> {
        let task = self.db.insert_task(task).await?;
        info!("📋️ Task #{} ({}) posted with a reward of {}", task.id, task.title, task.reward);
        let data = json!({ "task_id": task.id, "reward": task.reward });
        self.notifier.emit(Recipient::Broadcast, NotificationKind::Task, "New task posted", &task.title, data).await;
        Ok(task)
    }

    pub async fn open_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, TaskError> {
        self.db.fetch_open_tasks(now).await
    }

    pub async fn submit_task(
        &self,
        task_id: i64,
        member_id: MemberId,
        payload: Value,
    ) -> Result<TaskSubmission, TaskError> {
        let task = self.db.fetch_task(task_id).await?.ok_or(TaskError::TaskNotFound(task_id))?;
        if task.expires_at.is_some_and(|t| t <= Utc::now()) {
            return Err(TaskError::TaskExpired(task_id));
        }
        let member = self.db.fetch_member(member_id).await?.ok_or(TaskError::MemberNotFound(member_id))?;
        let submission = self.db.insert_submission(task_id, member_id, &payload).await?;
        debug!("📋️ Member #{member_id} submitted task #{task_id} (submission #{})", submission.id);
        let data = json!({ "task_id": task_id, "submission_id": submission.id });
        let body = format!("{} submitted task: {}", member.email, task.title);
        let title = "Task submitted";
        self.notifier.emit(Recipient::Broadcast, NotificationKind::Task, title, &body, data.clone()).await;
        let body = "Thanks! We'll review and notify you soon.";
        let title = "We received your submission";
        self.notifier.emit(Recipient::Member(member_id), NotificationKind::Task, title, body, data).await;
        Ok(submission)
    }

    /// Approves a submission and credits the task reward. A submission can only be approved once.
    pub async fn approve_submission(
        &self,
        task_id: i64,
        submission_id: i64,
    ) -> Result<(TaskSubmission, Commission), TaskError> {
        let (submission, reward) = self.db.approve_submission(task_id, submission_id).await?;
        info!("📋️ Submission #{submission_id} approved. {} credited to #{}", reward.amount, submission.member_id);
        let body = format!("Your task submission was approved. Reward {} granted.", reward.amount);
        let data = json!({ "task_id": task_id, "submission_id": submission_id, "commission_id": reward.id });
        let recipient = Recipient::Member(submission.member_id);
        self.notifier.emit(recipient, NotificationKind::Task, "Task approved", &body, data).await;
        Ok((submission, reward))
    }

    pub async fn reject_submission(
        &self,
        task_id: i64,
        submission_id: i64,
        reason: Option<&str>,
    ) -> Result<TaskSubmission, TaskError> {
        let submission = self.db.reject_submission(task_id, submission_id).await?;
        info!("📋️ Submission #{submission_id} for task #{task_id} rejected");
        let body = format!("Your task submission was rejected. {}", reason.unwrap_or_default());
        let data = json!({ "task_id": task_id, "submission_id": submission_id });
        let recipient = Recipient::Member(submission.member_id);
        self.notifier.emit(recipient, NotificationKind::Task, "Task rejected", body.trim_end(), data).await;
        Ok(submission)
    }

    pub async fn submissions_for_member(&self, member_id: MemberId) -> Result<Vec<TaskSubmission>, TaskError> {
        self.db.fetch_submissions_for_member(member_id).await
    }
}
