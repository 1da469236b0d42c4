use std::fmt::Debug;

use affiliate_common::UsdCents;
use log::*;
use serde_json::json;

use crate::{
    affiliate_api::notification_api::Notifier,
    db_types::{
        Gateway,
        MemberId,
        MemberStatus,
        NewPayoutRequest,
        NotificationKind,
        PayoutRequest,
        PayoutStatus,
        Recipient,
    },
    events::EventProducers,
    traits::{LedgerManagement, NotificationManagement, PayoutError, PayoutRules, ReferralGraph},
};

/// The payout gate. Members ask for their balance to be paid out; an operator approves (sends) or rejects the
/// request. Only a sent payout reduces the balance.
pub struct PayoutApi<B> {
    db: B,
    rules: PayoutRules,
    notifier: Notifier<B>,
}

impl<B> Debug for PayoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B> PayoutApi<B>
where B: LedgerManagement + NotificationManagement + ReferralGraph
{
    pub fn new(db: B, rules: PayoutRules, producers: EventProducers) -> Self {
        let notifier = Notifier::new(db.clone(), producers);
        Self { db, rules, notifier }
    }

    pub fn rules(&self) -> &PayoutRules {
        &self.rules
    }

    /// Files a new `pending` payout request. Only active members may ask. The minimum, the balance and the rate limit
    /// are checked atomically with the insert.
    pub async fn request_payout<S: Into<String>>(
        &self,
        member_id: MemberId,
        amount: UsdCents,
        gateway: Gateway,
        destination: S,
    ) -> Result<PayoutRequest, PayoutError> {
        let member = self.db.fetch_member(member_id).await?.ok_or(PayoutError::MemberNotFound(member_id))?;
        if member.status != MemberStatus::Active {
            debug!("🏧️ Member #{member_id} is {} and cannot request a payout", member.status);
            return Err(PayoutError::AccountInactive(member_id));
        }
        let request = NewPayoutRequest::new(member_id, amount, gateway, destination);
        let payout = self.db.insert_payout_request(request, &self.rules).await.map_err(|e| {
            debug!("🏧️ Payout request of {amount} from member #{member_id} was refused. {e}");
            e
        })?;
        info!("🏧️ Payout request #{} of {amount} filed by member #{member_id}", payout.id);
        let data = json!({ "payout_id": payout.id, "member_id": member_id, "amount": amount });
        let body = format!("{} ({}) requested a payout of {amount}.", member.name, member.email);
        let title = "Payout requested";
        self.notifier.emit(Recipient::Broadcast, NotificationKind::System, title, &body, data.clone()).await;
        let body = format!("Your payout request of {amount} is under review.");
        let recipient = Recipient::Member(member_id);
        self.notifier.emit(recipient, NotificationKind::System, "We received your payout request", &body, data).await;
        Ok(payout)
    }

    /// Marks a pending request as sent. From this point on, the amount is deducted from the member's balance.
    pub async fn approve_payout(&self, payout_id: i64) -> Result<PayoutRequest, PayoutError> {
        let payout = self.db.resolve_payout_request(payout_id, PayoutStatus::Sent, None).await?;
        info!("🏧️ Payout request #{payout_id} of {} to member #{} has been sent", payout.amount, payout.member_id);
        let body = format!("Your payout of {} has been approved and sent.", payout.amount);
        self.notify_owner(&payout, "Payout approved", &body).await;
        Ok(payout)
    }

    pub async fn reject_payout(&self, payout_id: i64, reason: Option<String>) -> Result<PayoutRequest, PayoutError> {
        let payout = self.db.resolve_payout_request(payout_id, PayoutStatus::Rejected, reason.clone()).await?;
        info!("🏧️ Payout request #{payout_id} from member #{} has been rejected", payout.member_id);
        let body = format!("Your payout was rejected. {}", reason.unwrap_or_default());
        self.notify_owner(&payout, "Payout rejected", body.trim_end()).await;
        Ok(payout)
    }

    pub async fn payout(&self, payout_id: i64) -> Result<PayoutRequest, PayoutError> {
        self.db.fetch_payout_request(payout_id).await?.ok_or(PayoutError::PayoutNotFound(payout_id))
    }

    /// The member's payout requests of every status, newest first.
    pub async fn payouts_for_member(&self, member_id: MemberId) -> Result<Vec<PayoutRequest>, PayoutError> {
        self.db.fetch_payouts_for_member(member_id).await
    }

    /// All payout requests, optionally filtered by status, newest first.
    pub async fn all_payouts(&self, status: Option<PayoutStatus>) -> Result<Vec<PayoutRequest>, PayoutError> {
        self.db.fetch_payouts(status).await
    }

    async fn notify_owner(&self, payout: &PayoutRequest, title: &str, body: &str) {
        let data = json!({ "payout_id": payout.id, "status": payout.status, "amount": payout.amount });
        self.notifier.emit(Recipient::Member(payout.member_id), NotificationKind::System, title, body, data).await;
    }
}
