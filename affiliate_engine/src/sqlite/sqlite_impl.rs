//! `SqliteDatabase` is a concrete implementation of an affiliate engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Every multi-step write is composed from the low-level functions in [`super::db`] inside a single
//! transaction.
use std::fmt::Debug;

use affiliate_common::{Percent, UsdCents};
use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

use super::db::{
    acquire_write_lock,
    commissions,
    db_url,
    fraud,
    members,
    new_pool,
    notifications,
    payments,
    payouts,
    tasks,
};
use crate::{
    affiliate_api::commission::CommissionSchedule,
    db_types::{
        ChildSide,
        Commission,
        FraudLog,
        Gateway,
        Member,
        MemberId,
        MemberRecord,
        MemberStatus,
        NewCommission,
        NewNotification,
        NewPayment,
        NewPayoutRequest,
        NewTask,
        Notification,
        Payment,
        PaymentEvent,
        PaymentEventRecord,
        PaymentStatus,
        PayoutRequest,
        PayoutStatus,
        Recipient,
        SubmissionStatus,
        Task,
        TaskSubmission,
    },
    traits::{
        ActivationPolicy,
        LedgerEntry,
        LedgerError,
        LedgerManagement,
        LedgerPage,
        NotificationError,
        NotificationManagement,
        PaymentEventOutcome,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        PaymentOutcomeCode,
        PayoutError,
        PayoutRules,
        ReferralGraph,
        ReferralGraphError,
        TaskError,
        TaskManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl ReferralGraph for SqliteDatabase {
    async fn fetch_member(&self, id: MemberId) -> Result<Option<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::fetch_member(id, &mut conn).await?)
    }

    async fn fetch_members(&self, ids: &[MemberId]) -> Result<Vec<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::fetch_members(ids, &mut conn).await?)
    }

    async fn fetch_member_by_email(&self, email: &str) -> Result<Option<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::fetch_member_by_email(email, &mut conn).await?)
    }

    async fn fetch_member_by_phone(&self, phone: &str) -> Result<Option<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::fetch_member_by_phone(phone, &mut conn).await?)
    }

    async fn fetch_member_by_referral_code(&self, code: &str) -> Result<Option<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::fetch_member_by_referral_code(code, &mut conn).await?)
    }

    async fn fetch_sponsored_members(&self, sponsor_id: MemberId) -> Result<Vec<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::fetch_sponsored(sponsor_id, &mut conn).await?)
    }

    async fn insert_member(&self, member: MemberRecord) -> Result<Member, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        let member = members::insert_member(member, &mut conn).await?;
        debug!("🗃️ Member #{} ({}) has been saved in the DB", member.id, member.referral_code);
        Ok(member)
    }

    async fn attach_child(
        &self,
        parent_id: MemberId,
        child_id: MemberId,
        side: ChildSide,
    ) -> Result<bool, ReferralGraphError> {
        if parent_id == child_id {
            return Err(ReferralGraphError::SelfPlacement(child_id));
        }
        let mut tx = self.pool.begin().await?;
        if !members::set_binary_parent(child_id, parent_id, &mut tx).await? {
            tx.rollback().await?;
            return Err(ReferralGraphError::AlreadyPlaced(child_id));
        }
        if !members::set_child(parent_id, child_id, side, &mut tx).await? {
            trace!("🗃️ The {side} slot of #{parent_id} was taken before #{child_id} could claim it");
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        debug!("🗃️ Member #{child_id} attached as the {side} child of #{parent_id}");
        Ok(true)
    }

    async fn set_member_status(
        &self,
        id: MemberId,
        status: MemberStatus,
        activation_expires_at: Option<DateTime<Utc>>,
    ) -> Result<Member, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        members::update_status(id, status, activation_expires_at, &mut conn)
            .await?
            .ok_or(ReferralGraphError::MemberNotFound(id))
    }

    async fn expire_activations(&self, now: DateTime<Utc>) -> Result<Vec<Member>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(members::expire_activations(now, &mut conn).await?)
    }

    async fn log_fraud(
        &self,
        member_id: Option<MemberId>,
        action: &str,
        reason: &str,
    ) -> Result<(), ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fraud::insert_fraud_log(member_id, action, reason, &mut conn).await?)
    }

    async fn fetch_fraud_logs(&self) -> Result<Vec<FraudLog>, ReferralGraphError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fraud::fetch_fraud_logs(&mut conn).await?)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::insert_payment(payment, &mut conn).await?;
        debug!("🗃️ Payment #{} of {} initiated for member #{}", payment.id, payment.amount, payment.member_id);
        Ok(payment)
    }

    async fn fetch_payment(&self, id: i64) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment(id, &mut conn).await?)
    }

    async fn fetch_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payment_by_reference(reference, &mut conn).await?)
    }

    async fn fetch_payments_for_member(&self, member_id: MemberId) -> Result<Vec<Payment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_payments_for_member(member_id, &mut conn).await?)
    }

    async fn fetch_payment_event(&self, event_id: &str) -> Result<Option<PaymentEventRecord>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payments::fetch_event(event_id, &mut conn).await?)
    }

    async fn apply_payment_event(
        &self,
        gateway: Gateway,
        event: &PaymentEvent,
        policy: &ActivationPolicy,
    ) -> Result<PaymentEventOutcome, PaymentGatewayError> {
        let event_id = event.event_id.as_str();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        // The claim is the first write, so that concurrent deliveries of one event serialize on it.
        if !payments::claim_event(event_id, gateway, now, &mut tx).await? {
            let record = payments::fetch_event(event_id, &mut tx).await?;
            tx.rollback().await?;
            return self.replayed_outcome(event_id, record).await;
        }
        if let Some(payment) = payments::fetch_payment_by_event_id(event_id, &mut tx).await? {
            tx.rollback().await?;
            info!("🗃️ Event [{event_id}] was already applied to payment #{}", payment.id);
            let original = PaymentOutcomeCode::for_status(payment.status);
            return Ok(PaymentEventOutcome::replayed(payment, Some(original)));
        }

        let by_reference = match event.reference.as_deref() {
            Some(reference) => payments::fetch_payment_by_reference(reference, &mut tx).await?,
            None => None,
        };
        let payment = match (by_reference, event.member_id) {
            (Some(payment), _) => Some(payment),
            (None, Some(member_id)) => payments::fetch_latest_open_payment(member_id, &mut tx).await?,
            (None, None) => None,
        };
        let Some(payment) = payment else {
            tx.rollback().await?;
            let mut conn = self.pool.acquire().await?;
            fraud::insert_fraud_log(event.member_id, "payment_webhook", "payment_not_found", &mut conn).await?;
            return Err(PaymentGatewayError::PaymentNotFound(event_id.to_string()));
        };
        if payment.status.is_terminal() {
            tx.rollback().await?;
            warn!("🗃️ Event [{event_id}] targets payment #{}, which is already {}", payment.id, payment.status);
            return Err(PaymentGatewayError::PaymentAlreadyFinal { id: payment.id, status: payment.status });
        }

        let status = PaymentStatus::from(event.status);
        let Some(payment) = payments::transition(payment.id, status, event_id, event.amount, &mut tx).await? else {
            tx.rollback().await?;
            return Err(PaymentGatewayError::PaymentAlreadyFinal { id: payment.id, status: payment.status });
        };
        let code = PaymentOutcomeCode::for_status(status);
        payments::record_event_outcome(event_id, payment.id, code, &mut tx).await?;
        debug!("🗃️ Payment #{} is now {status} after event [{event_id}]", payment.id);
        let mut outcome = PaymentEventOutcome::applied(payment, code);

        if status == PaymentStatus::Confirmed {
            let owner_id = outcome.payment.member_id;
            let expires_at = now + policy.activation_window;
            let Some(member) = members::update_status(owner_id, MemberStatus::Active, Some(expires_at), &mut tx).await?
            else {
                // The payment transition is kept. See the design notes on missing owners.
                tx.commit().await?;
                error!("🗃️ Payment #{} was confirmed, but its owner #{owner_id} does not exist", outcome.payment.id);
                return Err(PaymentGatewayError::MemberNotFound(owner_id));
            };
            let correlation_id = event.correlation_id();
            let rows = commissions::write_waterfall(&member, &policy.schedule, correlation_id, &mut tx).await?;
            debug!("🗃️ Member #{owner_id} activated until {expires_at}. {} commission rows written", rows.len());
            outcome.activated = Some(member);
            outcome.commissions = rows;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn distribute_commissions(
        &self,
        member_id: MemberId,
        schedule: &CommissionSchedule,
        correlation_id: &str,
    ) -> Result<Vec<Commission>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        acquire_write_lock(&mut tx).await?;
        let member =
            members::fetch_member(member_id, &mut tx).await?.ok_or(PaymentGatewayError::MemberNotFound(member_id))?;
        let rows = commissions::write_waterfall(&member, schedule, correlation_id, &mut tx).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn fetch_commissions_for_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<Commission>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(commissions::fetch_by_correlation_id(correlation_id, &mut conn).await?)
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn balance(&self, member_id: MemberId) -> Result<UsdCents, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let earned = commissions::total_earned(member_id, &mut conn).await?;
        let sent = payouts::total_sent(member_id, &mut conn).await?;
        Ok(earned - sent)
    }

    async fn fetch_commissions(
        &self,
        member_id: MemberId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Commission>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(commissions::fetch_for_earner(member_id, skip, limit, &mut conn).await?)
    }

    async fn fetch_ledger(
        &self,
        member_id: MemberId,
        skip: usize,
        limit: usize,
        include_payments: bool,
    ) -> Result<LedgerPage, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let mut entries = commissions::fetch_all_for_earner(member_id, &mut conn)
            .await?
            .into_iter()
            .map(LedgerEntry::from)
            .collect::<Vec<_>>();
        entries.extend(payouts::fetch_sent_for_member(member_id, &mut conn).await?.into_iter().map(LedgerEntry::from));
        if include_payments {
            let member_payments = payments::fetch_payments_for_member(member_id, &mut conn).await?;
            entries.extend(member_payments.into_iter().map(LedgerEntry::from));
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = entries.len();
        let entries = entries.into_iter().skip(skip).take(limit).collect();
        Ok(LedgerPage { entries, total })
    }

    async fn insert_payout_request(
        &self,
        request: NewPayoutRequest,
        rules: &PayoutRules,
    ) -> Result<PayoutRequest, PayoutError> {
        let member_id = request.member_id;
        let requested = request.amount;
        if requested < rules.minimum {
            return Err(PayoutError::BelowMinimum { requested, minimum: rules.minimum });
        }
        let mut tx = self.pool.begin().await?;
        acquire_write_lock(&mut tx).await?;
        let earned = commissions::total_earned(member_id, &mut tx).await?;
        let available = earned - payouts::total_sent(member_id, &mut tx).await?;
        if !requested.is_positive() || requested > available {
            return Err(PayoutError::InsufficientBalance { requested, available });
        }
        let since = request.created_at - rules.window;
        if let Some(last) = payouts::fetch_latest_since(member_id, since, &mut tx).await? {
            return Err(PayoutError::RateLimited { last_request: last.created_at });
        }
        let payout = payouts::insert_payout_request(request, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payout request #{} for {} from member #{member_id} saved", payout.id, payout.amount);
        Ok(payout)
    }

    async fn resolve_payout_request(
        &self,
        id: i64,
        status: PayoutStatus,
        note: Option<String>,
    ) -> Result<PayoutRequest, PayoutError> {
        let mut tx = self.pool.begin().await?;
        match payouts::resolve_pending(id, status, note, &mut tx).await? {
            Some(payout) => {
                tx.commit().await?;
                debug!("🗃️ Payout request #{id} is now {status}");
                Ok(payout)
            },
            None => {
                let existing = payouts::fetch_payout_request(id, &mut tx).await?;
                tx.rollback().await?;
                match existing {
                    Some(p) => Err(PayoutError::PayoutNotPending { id, status: p.status }),
                    None => Err(PayoutError::PayoutNotFound(id)),
                }
            },
        }
    }

    async fn fetch_payout_request(&self, id: i64) -> Result<Option<PayoutRequest>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_payout_request(id, &mut conn).await?)
    }

    async fn fetch_payouts_for_member(&self, member_id: MemberId) -> Result<Vec<PayoutRequest>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_for_member(member_id, &mut conn).await?)
    }

    async fn fetch_payouts(&self, status: Option<PayoutStatus>) -> Result<Vec<PayoutRequest>, PayoutError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payouts::fetch_payout_requests(status, &mut conn).await?)
    }
}

impl NotificationManagement for SqliteDatabase {
    async fn insert_notification(&self, notification: NewNotification) -> Result<Notification, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        notifications::insert_notification(notification, &mut conn).await
    }

    async fn fetch_notifications(
        &self,
        recipient: Recipient,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        Ok(notifications::fetch_notifications(recipient, skip, limit, &mut conn).await?)
    }

    async fn unread_count(&self, recipient: Recipient) -> Result<i64, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        Ok(notifications::unread_count(recipient, &mut conn).await?)
    }

    async fn mark_read(&self, member_id: MemberId, notification_id: i64) -> Result<Notification, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_read(member_id, notification_id, &mut conn)
            .await?
            .ok_or(NotificationError::NotificationNotFound(notification_id))
    }

    async fn mark_all_read(&self, member_id: MemberId) -> Result<u64, NotificationError> {
        let mut conn = self.pool.acquire().await?;
        Ok(notifications::mark_all_read(member_id, &mut conn).await?)
    }
}

impl TaskManagement for SqliteDatabase {
    async fn insert_task(&self, task: NewTask) -> Result<Task, TaskError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tasks::insert_task(task, &mut conn).await?)
    }

    async fn fetch_task(&self, id: i64) -> Result<Option<Task>, TaskError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tasks::fetch_task(id, &mut conn).await?)
    }

    async fn fetch_open_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, TaskError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tasks::fetch_open_tasks(now, &mut conn).await?)
    }

    async fn insert_submission(
        &self,
        task_id: i64,
        member_id: MemberId,
        payload: &serde_json::Value,
    ) -> Result<TaskSubmission, TaskError> {
        let payload = serde_json::to_string(payload)?;
        let mut conn = self.pool.acquire().await?;
        Ok(tasks::insert_submission(task_id, member_id, payload, &mut conn).await?)
    }

    async fn fetch_submissions_for_member(&self, member_id: MemberId) -> Result<Vec<TaskSubmission>, TaskError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tasks::fetch_submissions_for_member(member_id, &mut conn).await?)
    }

    async fn approve_submission(
        &self,
        task_id: i64,
        submission_id: i64,
    ) -> Result<(TaskSubmission, Commission), TaskError> {
        let mut tx = self.pool.begin().await?;
        acquire_write_lock(&mut tx).await?;
        let submission = tasks::fetch_submission(task_id, submission_id, &mut tx)
            .await?
            .ok_or(TaskError::SubmissionNotFound { task_id, submission_id })?;
        if submission.status == SubmissionStatus::Approved {
            return Err(TaskError::AlreadyApproved(submission_id));
        }
        let task = tasks::fetch_task(task_id, &mut tx).await?.ok_or(TaskError::TaskNotFound(task_id))?;
        let submission = tasks::update_submission(submission_id, SubmissionStatus::Approved, true, &mut tx).await?;
        let reward = NewCommission {
            earner_id: submission.member_id,
            source_member_id: submission.member_id,
            level: 0,
            amount: task.reward,
            percent: Percent::ZERO,
            description: Some(format!("Task reward: {}", task.title)),
            correlation_id: format!("task-submission-{submission_id}"),
        };
        let commission =
            commissions::insert_commission(reward, &mut tx).await?.ok_or(TaskError::AlreadyApproved(submission_id))?;
        tx.commit().await?;
        debug!("🗃️ Submission #{submission_id} approved. {} credited to #{}", commission.amount, submission.member_id);
        Ok((submission, commission))
    }

    async fn reject_submission(&self, task_id: i64, submission_id: i64) -> Result<TaskSubmission, TaskError> {
        let mut tx = self.pool.begin().await?;
        acquire_write_lock(&mut tx).await?;
        let submission = tasks::fetch_submission(task_id, submission_id, &mut tx)
            .await?
            .ok_or(TaskError::SubmissionNotFound { task_id, submission_id })?;
        if submission.status == SubmissionStatus::Approved {
            return Err(TaskError::AlreadyApproved(submission_id));
        }
        let submission = tasks::update_submission(submission_id, SubmissionStatus::Rejected, false, &mut tx).await?;
        tx.commit().await?;
        Ok(submission)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Creates the database file if it does not exist yet.
    pub async fn create_if_missing(url: &str) -> Result<(), sqlx::Error> {
        if !Sqlite::database_exists(url).await? {
            info!("🗃️ Creating database {url}");
            Sqlite::create_database(url).await?;
        }
        Ok(())
    }

    /// Brings the schema up to date using the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn replayed_outcome(
        &self,
        event_id: &str,
        record: Option<PaymentEventRecord>,
    ) -> Result<PaymentEventOutcome, PaymentGatewayError> {
        let not_found = || PaymentGatewayError::PaymentNotFound(event_id.to_string());
        let record = record.ok_or_else(not_found)?;
        let payment_id = record.payment_id.ok_or_else(not_found)?;
        let payment = self.fetch_payment(payment_id).await?.ok_or_else(not_found)?;
        let original = record.outcome.as_deref().and_then(|s| s.parse::<PaymentOutcomeCode>().ok());
        info!("🗃️ Event [{event_id}] was already processed at {}. Replaying the outcome", record.processed_at);
        Ok(PaymentEventOutcome::replayed(payment, original))
    }
}
