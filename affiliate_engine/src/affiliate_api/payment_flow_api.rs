use std::fmt::Debug;

use log::*;
use serde_json::json;
use uuid::Uuid;

use crate::{
    affiliate_api::{exchange_rate_api::RateCache, notification_api::Notifier},
    db_types::{
        Commission,
        Gateway,
        MemberId,
        NewPayment,
        NotificationKind,
        Payment,
        PaymentEvent,
        PaymentStatus,
        Recipient,
    },
    events::{EventProducers, MemberActivatedEvent},
    traits::{
        ActivationPolicy,
        NotificationManagement,
        PaymentEventOutcome,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        RateFeed,
    },
};

/// `PaymentFlowApi` is the primary API for the activation payment flow: creating activation payments, and applying
/// the asynchronous gateway events that confirm, fail or reverse them.
///
/// Everything that changes money or membership state happens inside the backend's unit of work
/// ([`PaymentGatewayDatabase::apply_payment_event`]). This API adds the side effects that must only happen after that
/// work has been committed: member notifications and the activation hook.
pub struct PaymentFlowApi<B> {
    db: B,
    policy: ActivationPolicy,
    producers: EventProducers,
    notifier: Notifier<B>,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentGatewayDatabase + NotificationManagement
{
    pub fn new(db: B, policy: ActivationPolicy, producers: EventProducers) -> Self {
        let notifier = Notifier::new(db.clone(), producers.clone());
        Self { db, policy, producers, notifier }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn policy(&self) -> &ActivationPolicy {
        &self.policy
    }

    /// Creates an `initiated` activation payment for the member, for the configured activation fee.
    ///
    /// The payment gets a fresh reference, which the gateway will quote back in its events. The local currency amount
    /// is a display-only projection and is left empty if no exchange rate is available.
    pub async fn initiate_activation<F: RateFeed>(
        &self,
        member_id: MemberId,
        gateway: Gateway,
        rates: &RateCache<F>,
    ) -> Result<Payment, PaymentGatewayError> {
        let member = self.db.fetch_member(member_id).await?.ok_or(PaymentGatewayError::MemberNotFound(member_id))?;
        let fee = self.policy.schedule.activation_fee;
        let reference = Uuid::new_v4().to_string();
        let mut payment = NewPayment::new(member_id, gateway, fee).with_reference(reference);
        payment.currency = member.currency.clone();
        if let Some(local) = rates.usd_to_local(fee, &member.currency).await {
            payment = payment.with_local_amount(local, member.currency.as_str());
        }
        let payment = self.db.insert_payment(payment).await?;
        info!(
            "🔄️💳️ Activation payment #{} of {fee} initiated for member #{member_id} via {gateway} [{}]",
            payment.id,
            payment.reference.as_deref().unwrap_or_default()
        );
        Ok(payment)
    }

    /// Applies a gateway event to its payment.
    ///
    /// Redelivered events return the original payment with
    /// [`crate::traits::PaymentOutcomeCode::WebhookAlreadyProcessed`] and trigger no side effects. Otherwise, once the
    /// backend has committed the change, the payment owner and every commission earner are notified, and a
    /// [`MemberActivatedEvent`] is published if the payment activated its owner.
    pub async fn process_payment_event(
        &self,
        gateway: Gateway,
        event: PaymentEvent,
    ) -> Result<PaymentEventOutcome, PaymentGatewayError> {
        let event_id = event.event_id.clone();
        trace!("🔄️💳️ Processing {gateway} event [{event_id}] ({})", event.status);
        let outcome = self.db.apply_payment_event(gateway, &event, &self.policy).await?;
        if outcome.is_replay() {
            info!("🔄️💳️ Event [{event_id}] has already been processed for payment #{}", outcome.payment.id);
            return Ok(outcome);
        }
        self.notify_payment_owner(gateway, &outcome.payment).await;
        self.notify_earners(&outcome.commissions).await;
        if let Some(member) = &outcome.activated {
            self.call_member_activated_hook(MemberActivatedEvent::new(
                member.clone(),
                outcome.payment.clone(),
                outcome.commissions.clone(),
            ))
            .await;
        }
        debug!(
            "🔄️💳️ Event [{event_id}] processing complete: {}. {} commission rows, {} in total",
            outcome.code,
            outcome.commissions.len(),
            outcome.total_commissions()
        );
        Ok(outcome)
    }

    /// Runs the commission waterfall for `member_id` outside of the payment flow.
    ///
    /// Calling this again with the same `correlation_id` writes nothing new, so it is safe to retry.
    pub async fn distribute_commissions(
        &self,
        member_id: MemberId,
        correlation_id: &str,
    ) -> Result<Vec<Commission>, PaymentGatewayError> {
        let rows = self.db.distribute_commissions(member_id, &self.policy.schedule, correlation_id).await?;
        debug!("🔄️💸️ {} commission rows written for member #{member_id} [{correlation_id}]", rows.len());
        self.notify_earners(&rows).await;
        Ok(rows)
    }

    async fn notify_payment_owner(&self, gateway: Gateway, payment: &Payment) {
        let (title, body) = match payment.status {
            PaymentStatus::Confirmed => {
                ("Payment confirmed", format!("Your {gateway} payment is confirmed. Account activated."))
            },
            PaymentStatus::Failed => ("Payment failed", format!("Your {gateway} payment failed. Please try again.")),
            PaymentStatus::Reversed => ("Payment reversed", format!("Your {gateway} payment was reversed.")),
            PaymentStatus::Initiated | PaymentStatus::Pending => return,
        };
        let data = json!({ "payment_id": payment.id, "status": payment.status, "amount": payment.amount });
        self.notifier.emit(Recipient::Member(payment.member_id), NotificationKind::Payment, title, &body, data).await;
    }

    async fn notify_earners(&self, commissions: &[Commission]) {
        for c in commissions {
            let body = format!("You earned {} from a level {} referral.", c.amount, c.level);
            let data = json!({
                "commission_id": c.id,
                "source_member_id": c.source_member_id,
                "level": c.level,
                "amount": c.amount,
                "correlation_id": c.correlation_id,
            });
            let recipient = Recipient::Member(c.earner_id);
            self.notifier.emit(recipient, NotificationKind::Referral, "Referral commission earned", &body, data).await;
        }
    }

    async fn call_member_activated_hook(&self, event: MemberActivatedEvent) {
        for emitter in &self.producers.member_activated_producer {
            debug!("🔄️💳️ Notifying member activated hook subscribers");
            emitter.publish_event(event.clone()).await;
        }
    }
}
