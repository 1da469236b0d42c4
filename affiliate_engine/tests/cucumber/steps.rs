use affiliate_common::UsdCents;
use affiliate_engine::{
    db_types::{ChildSide, Gateway, MemberStatus, NewMember, PaymentEvent, PaymentEventStatus},
    PaymentGatewayDatabase,
    ReferralGraph,
};
use cucumber::{given, then, when};

use crate::cucumber::{AffiliateSystem, AffiliateWorld};

#[given("a fresh affiliate network")]
async fn fresh_network(world: &mut AffiliateWorld) {
    world.system = Some(AffiliateSystem::new().await);
}

#[given(expr = "'{word}' registers without a sponsor")]
async fn register_root(world: &mut AffiliateWorld, name: String) {
    register(world, name, None, None).await;
}

#[given(expr = "'{word}' registers with the referral code of '{word}'")]
async fn register_sponsored(world: &mut AffiliateWorld, name: String, sponsor: String) {
    let code = world.member(&sponsor).referral_code.clone();
    register(world, name, Some(code), None).await;
}

#[given(expr = "'{word}' from {string} registers with the referral code of '{word}'")]
async fn register_from_country(world: &mut AffiliateWorld, name: String, country: String, sponsor: String) {
    let code = world.member(&sponsor).referral_code.clone();
    register(world, name, Some(code), Some(country)).await;
}

#[given(expr = "a sponsor chain {string}")]
async fn sponsor_chain(world: &mut AffiliateWorld, names: String) {
    let mut previous: Option<String> = None;
    for name in names.split(',').map(str::trim) {
        let code = previous.as_ref().map(|p| world.member(p).referral_code.clone());
        register(world, name.to_string(), code, None).await;
        previous = Some(name.to_string());
    }
}

async fn register(world: &mut AffiliateWorld, name: String, code: Option<String>, country: Option<String>) {
    let mut new_member = NewMember::new(name.clone(), format!("{}@example.com", name.to_lowercase()));
    if let Some(code) = code {
        new_member = new_member.with_referral_code(code);
    }
    if let Some(country) = country {
        new_member = new_member.with_country(country);
    }
    let sys = world.system_mut();
    let registration = sys.members.register_and_place(new_member).await.expect("Error registering member");
    sys.registered.insert(name, registration.member);
}

#[when(expr = "'{word}' starts an activation payment")]
async fn start_activation(world: &mut AffiliateWorld, name: String) {
    initiate(world, name).await;
}

#[when(expr = "the gateway reports event [{word}] as {word} for '{word}'")]
async fn gateway_event(world: &mut AffiliateWorld, event_id: String, status: String, name: String) {
    let status = status.parse::<PaymentEventStatus>().expect("Not a valid payment event status");
    deliver(world, event_id, status, name).await;
}

#[when(expr = "'{word}' pays the activation fee with event [{word}]")]
async fn pay_activation(world: &mut AffiliateWorld, name: String, event_id: String) {
    initiate(world, name.clone()).await;
    deliver(world, event_id, PaymentEventStatus::Confirmed, name).await;
}

#[given(expr = "'{word}' has paid the activation fee with event [{word}]")]
async fn paid_activation(world: &mut AffiliateWorld, name: String, event_id: String) {
    initiate(world, name.clone()).await;
    deliver(world, event_id, PaymentEventStatus::Confirmed, name).await;
}

async fn initiate(world: &mut AffiliateWorld, name: String) {
    let id = world.member(&name).id;
    let sys = world.system_mut();
    let payment = sys.payments.initiate_activation(id, Gateway::Pesapal, &sys.rates).await.expect("Error initiating");
    sys.activations.insert(name, payment);
}

async fn deliver(world: &mut AffiliateWorld, event_id: String, status: PaymentEventStatus, name: String) {
    let sys = world.system_mut();
    let reference = sys.activations.get(&name).and_then(|p| p.reference.clone()).expect("No activation payment");
    let event = PaymentEvent::new(event_id, status).with_reference(reference);
    sys.last_error = sys.payments.process_payment_event(Gateway::Pesapal, event).await.err().map(|e| e.code().into());
}

#[when(expr = "'{word}' requests a payout of {word} USD")]
async fn request_payout(world: &mut AffiliateWorld, name: String, amount: String) {
    let amount = amount.parse::<UsdCents>().expect("Not a valid USD amount");
    let id = world.member(&name).id;
    let sys = world.system_mut();
    let result = sys.payouts.request_payout(id, amount, Gateway::Paypal, format!("{name}@paypal")).await;
    sys.last_error = result.err().map(|e| e.code().into());
}

#[when(expr = "the pending payout of '{word}' is approved")]
async fn approve_payout(world: &mut AffiliateWorld, name: String) {
    let id = world.member(&name).id;
    let sys = world.system();
    let payouts = sys.payouts.payouts_for_member(id).await.expect("Error fetching payouts");
    let pending = payouts.first().expect("No payout request");
    sys.payouts.approve_payout(pending.id).await.expect("Error approving payout");
}

#[then(expr = "'{word}' has a balance of {word} USD")]
async fn check_balance(world: &mut AffiliateWorld, name: String, amount: String) {
    let expected = amount.parse::<UsdCents>().expect("Not a valid USD amount");
    let id = world.member(&name).id;
    let balance = world.system().ledger.balance(id).await.expect("Error fetching balance");
    assert_eq!(balance, expected, "Balance of {name} is incorrect");
}

#[then(expr = "'{word}' is {word}")]
async fn check_status(world: &mut AffiliateWorld, name: String, status: String) {
    let expected = status.parse::<MemberStatus>().expect("Not a valid member status");
    let id = world.member(&name).id;
    let member = world.system().db.fetch_member(id).await.expect("Error fetching member").expect("Member is gone");
    assert_eq!(member.status, expected, "Status of {name} is incorrect");
}

#[then(expr = "'{word}' sits on the {word} of '{word}'")]
async fn check_placement(world: &mut AffiliateWorld, child: String, side: String, parent: String) {
    let side = side.parse::<ChildSide>().expect("Not a valid side");
    let child_id = world.member(&child).id;
    let parent_id = world.member(&parent).id;
    let parent = world.system().db.fetch_member(parent_id).await.expect("Error fetching member").expect("No parent");
    let slot = match side {
        ChildSide::Left => parent.left_child_id,
        ChildSide::Right => parent.right_child_id,
    };
    assert_eq!(slot, Some(child_id), "{child} is not on the {side} of {}", parent.name);
}

#[then(expr = "event [{word}] produced {int} commission rows")]
async fn check_commission_rows(world: &mut AffiliateWorld, event_id: String, count: usize) {
    let rows = world.system().db.fetch_commissions_for_correlation_id(&event_id).await.expect("Error fetching rows");
    assert_eq!(rows.len(), count);
}

#[then(expr = "the request fails with {word}")]
async fn check_error(world: &mut AffiliateWorld, code: String) {
    assert_eq!(world.system().last_error.as_deref(), Some(code.as_str()));
}

#[then("the request succeeds")]
async fn check_success(world: &mut AffiliateWorld) {
    assert_eq!(world.system().last_error, None);
}

#[then(expr = "the activation payment of '{word}' is in {word}")]
async fn check_local_currency(world: &mut AffiliateWorld, name: String, currency: String) {
    let payment = world.system().activations.get(&name).expect("No activation payment");
    assert_eq!(payment.currency, currency);
    assert!(payment.amount_local.is_some());
}
