use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    affiliate_api::{
        notification_api::Notifier,
        placement_api::{Placement, PlacementApi},
    },
    db_types::{Member, MemberId, MemberRecord, MemberStatus, NewMember, NotificationKind, Recipient},
    events::EventProducers,
    helpers::{generate_referral_code, normalize_currency_code},
    traits::{NotificationManagement, ReferralGraph, ReferralGraphError},
};

const REFERRAL_CODE_ATTEMPTS: usize = 5;

/// The result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub member: Member,
    pub sponsor: Option<Member>,
    pub placement: Option<Placement>,
    pub referral_link: String,
}

/// Member lifecycle: registration and placement, suspension, and activation expiry.
pub struct MembershipApi<B> {
    db: B,
    placement: PlacementApi<B>,
    notifier: Notifier<B>,
    frontend_url: String,
}

impl<B> Debug for MembershipApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MembershipApi")
    }
}

impl<B> MembershipApi<B>
where B: ReferralGraph + NotificationManagement
{
    pub fn new<S: Into<String>>(db: B, producers: EventProducers, frontend_url: S) -> Self {
        let placement = PlacementApi::new(db.clone());
        let notifier = Notifier::new(db.clone(), producers);
        let frontend_url = frontend_url.into().trim_end_matches('/').to_string();
        Self { db, placement, notifier, frontend_url }
    }

    pub fn placement(&self) -> &PlacementApi<B> {
        &self.placement
    }

    pub fn referral_link(&self, member: &Member) -> String {
        format!("{}/register?ref={}", self.frontend_url, member.referral_code)
    }

    /// Registers a new member and, if they signed up with a known referral code, places them in their sponsor's
    /// binary subtree.
    ///
    /// Duplicate emails and phone numbers are refused and written to the fraud log. An unknown referral code is not
    /// an error: the member simply registers without a sponsor. New members always start out `pending`.
    pub async fn register_and_place(&self, new_member: NewMember) -> Result<Registration, ReferralGraphError> {
        let NewMember { name, email, phone, country, currency, referral_code } = new_member;
        let email = email.trim().to_lowercase();
        let phone = phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        if let Some(existing) = self.db.fetch_member_by_email(&email).await? {
            self.db.log_fraud(Some(existing.id), "register", "duplicate_email").await?;
            return Err(ReferralGraphError::EmailExists(email));
        }
        if let Some(phone) = &phone {
            if let Some(existing) = self.db.fetch_member_by_phone(phone).await? {
                self.db.log_fraud(Some(existing.id), "register", "duplicate_phone").await?;
                return Err(ReferralGraphError::PhoneExists(phone.clone()));
            }
        }
        let sponsor = match referral_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let sponsor = self.db.fetch_member_by_referral_code(code).await?;
                if sponsor.is_none() {
                    info!("🌳️ Referral code {code} is unknown. {email} will register without a sponsor");
                }
                sponsor
            },
            None => None,
        };
        let currency = normalize_currency_code(currency.as_deref(), country.as_deref());
        let mut record = MemberRecord {
            name: name.trim().to_string(),
            email,
            phone,
            country,
            currency,
            referral_code: String::new(),
            sponsor_id: sponsor.as_ref().map(|s| s.id),
            is_admin: false,
        };
        let member = self.insert_with_fresh_code(&mut record).await?;
        info!("🌳️ Member #{} ({}) registered with referral code {}", member.id, member.email, member.referral_code);

        let (member, placement) = match &sponsor {
            Some(sponsor) => {
                let placement = self.placement.place(member.id, sponsor.id).await?;
                let member = self.db.fetch_member(member.id).await?.unwrap_or(member);
                let body = format!("{} joined using your link.", member.name);
                let data = json!({ "member_id": member.id, "parent_id": placement.parent_id });
                let recipient = Recipient::Member(sponsor.id);
                self.notifier.emit(recipient, NotificationKind::Referral, "New referral joined", &body, data).await;
                (member, Some(placement))
            },
            None => (member, None),
        };
        let body = "Your account was created. Activate to start earning.";
        let data = json!({ "referral_code": member.referral_code });
        self.notifier.emit(Recipient::Member(member.id), NotificationKind::System, "Welcome", body, data).await;
        let referral_link = self.referral_link(&member);
        Ok(Registration { member, sponsor, placement, referral_link })
    }

    async fn insert_with_fresh_code(&self, record: &mut MemberRecord) -> Result<Member, ReferralGraphError> {
        let mut attempt = 1;
        loop {
            record.referral_code = generate_referral_code(&record.name);
            match self.db.insert_member(record.clone()).await {
                Err(ReferralGraphError::ReferralCodeExists(code)) if attempt < REFERRAL_CODE_ATTEMPTS => {
                    debug!("🌳️ Referral code {code} is taken. Trying another one");
                    attempt += 1;
                },
                result => return result,
            }
        }
    }

    /// Suspends or reinstates a member. A reinstated member is `active` again if their activation has not expired
    /// yet, and `pending` otherwise.
    pub async fn set_suspended(&self, member_id: MemberId, suspended: bool) -> Result<Member, ReferralGraphError> {
        let member = self.db.fetch_member(member_id).await?.ok_or(ReferralGraphError::MemberNotFound(member_id))?;
        let status = if suspended {
            MemberStatus::Suspended
        } else {
            match member.activation_expires_at {
                Some(expires_at) if expires_at > Utc::now() => MemberStatus::Active,
                _ => MemberStatus::Pending,
            }
        };
        let member = self.db.set_member_status(member_id, status, None).await?;
        info!("🌳️ Member #{member_id} is now {status}");
        let body = format!("Your account status is now {status}.");
        let data = json!({ "status": status });
        let recipient = Recipient::Member(member_id);
        self.notifier.emit(recipient, NotificationKind::System, "Account status changed", &body, data).await;
        Ok(member)
    }

    /// Moves every member whose activation expired at or before `now` back to `pending`, and tells them about it.
    ///
    /// There is no internal scheduler. Run this periodically from outside, e.g. with the operator CLI.
    pub async fn expire_activations(&self, now: DateTime<Utc>) -> Result<Vec<Member>, ReferralGraphError> {
        let expired = self.db.expire_activations(now).await?;
        for member in &expired {
            let body = "Your account activation has expired. Please renew.";
            let data = json!({ "expired_at": member.activation_expires_at });
            let recipient = Recipient::Member(member.id);
            self.notifier.emit(recipient, NotificationKind::System, "Activation expired", body, data).await;
        }
        if !expired.is_empty() {
            info!("🌳️ {} member activations have expired", expired.len());
        }
        Ok(expired)
    }

    pub async fn member(&self, member_id: MemberId) -> Result<Member, ReferralGraphError> {
        self.db.fetch_member(member_id).await?.ok_or(ReferralGraphError::MemberNotFound(member_id))
    }

    pub async fn member_by_referral_code(&self, code: &str) -> Result<Option<Member>, ReferralGraphError> {
        self.db.fetch_member_by_referral_code(code).await
    }

    /// Members who signed up with this member's referral code.
    pub async fn sponsored_members(&self, member_id: MemberId) -> Result<Vec<Member>, ReferralGraphError> {
        self.db.fetch_sponsored_members(member_id).await
    }
}
