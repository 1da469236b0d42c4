use std::collections::HashSet;

use affiliate_engine::{
    db_types::{ChildSide, MemberStatus, NewMember},
    traits::ReferralGraphError,
    ReferralGraph,
};
use futures_util::future::join_all;
use log::*;

use crate::support::prepare_env::{membership, register, register_chain, setup, tear_down};

mod support;

#[tokio::test]
async fn members_fill_the_sponsor_subtree_breadth_first() {
    let db = setup().await;
    let api = membership(&db);
    let alice = register(&api, "Alice", None).await;
    let code = alice.referral_code.as_str();
    let bob = register(&api, "Bob", Some(code)).await;
    let carol = register(&api, "Carol", Some(code)).await;
    let dave = register(&api, "Dave", Some(code)).await;
    let erin = register(&api, "Erin", Some(code)).await;
    let frank = register(&api, "Frank", Some(code)).await;

    let alice = db.fetch_member(alice.id).await.unwrap().unwrap();
    assert_eq!(alice.left_child_id, Some(bob.id));
    assert_eq!(alice.right_child_id, Some(carol.id));
    assert_eq!(bob.binary_parent_id, Some(alice.id));
    let bob = db.fetch_member(bob.id).await.unwrap().unwrap();
    assert_eq!(bob.left_child_id, Some(dave.id));
    assert_eq!(bob.right_child_id, Some(erin.id));
    let carol = db.fetch_member(carol.id).await.unwrap().unwrap();
    assert_eq!(carol.left_child_id, Some(frank.id));
    assert_eq!(carol.right_child_id, None);
    // Every one of them was sponsored by Alice, wherever they ended up
    for m in [&bob, &carol, &dave, &erin, &frank] {
        assert_eq!(m.sponsor_id, Some(alice.id));
        assert_eq!(m.status, MemberStatus::Pending);
    }
    let sponsored = api.sponsored_members(alice.id).await.unwrap();
    assert_eq!(sponsored.len(), 5);
    tear_down(db).await;
}

#[tokio::test]
async fn placement_is_scoped_to_the_sponsor() {
    let db = setup().await;
    let api = membership(&db);
    let alice = register(&api, "Alice", None).await;
    let bob = register(&api, "Bob", Some(&alice.referral_code)).await;
    let carol = register(&api, "Carol", Some(&alice.referral_code)).await;
    // Only Carol's subtree is searched, so Bob's empty slots stay empty
    let new_member = NewMember::new("Dan", "dan@example.com").with_referral_code(carol.referral_code.clone());
    let reg = api.register_and_place(new_member).await.unwrap();
    let placement = reg.placement.expect("Dan should have been placed");
    assert_eq!(placement.parent_id, carol.id);
    assert_eq!(placement.side, ChildSide::Left);
    assert_eq!(placement.depth, 1);
    assert_eq!(reg.sponsor.map(|s| s.id), Some(carol.id));
    assert_eq!(reg.referral_link, format!("https://example.com/register?ref={}", reg.member.referral_code));
    let bob = db.fetch_member(bob.id).await.unwrap().unwrap();
    assert_eq!(bob.left_child_id, None);
    tear_down(db).await;
}

#[tokio::test]
async fn unknown_referral_code_registers_a_root() {
    let db = setup().await;
    let api = membership(&db);
    let new_member = NewMember::new("Zed", "ZED@Example.com ").with_referral_code("nobody-00000000");
    let reg = api.register_and_place(new_member).await.unwrap();
    assert!(reg.sponsor.is_none());
    assert!(reg.placement.is_none());
    assert_eq!(reg.member.email, "zed@example.com");
    assert_eq!(reg.member.binary_parent_id, None);
    assert_eq!(reg.member.currency, "USD");
    assert_eq!(api.placement().depth_from_root(reg.member.id).await.unwrap(), 0);
    tear_down(db).await;
}

#[tokio::test]
async fn invalid_placements_are_refused() {
    let db = setup().await;
    let api = membership(&db);
    let alice = register(&api, "Alice", None).await;
    let bob = register(&api, "Bob", Some(&alice.referral_code)).await;
    let placement = api.placement();
    let err = placement.place(alice.id, alice.id).await.unwrap_err();
    assert_eq!(err, ReferralGraphError::SelfPlacement(alice.id));
    let err = placement.place(bob.id, alice.id).await.unwrap_err();
    assert_eq!(err, ReferralGraphError::AlreadyPlaced(bob.id));
    assert_eq!(err.code(), "ALREADY_PLACED");
    let err = placement.place(9999, alice.id).await.unwrap_err();
    assert_eq!(err, ReferralGraphError::MemberNotFound(9999));
    // A direct write to a taken slot is a lost race, not an error
    let carol = register(&api, "Carol", None).await;
    assert!(!db.attach_child(alice.id, carol.id, ChildSide::Left).await.unwrap());
    let carol = db.fetch_member(carol.id).await.unwrap().unwrap();
    assert_eq!(carol.binary_parent_id, None);
    tear_down(db).await;
}

#[tokio::test]
async fn tree_read_models() {
    let db = setup().await;
    let api = membership(&db);
    let root = register(&api, "Root", None).await;
    for i in 0..6 {
        register(&api, &format!("Member{i}"), Some(&root.referral_code)).await;
    }
    let placement = api.placement();
    let tree = placement.build_subtree(root.id, 10).await.unwrap().expect("Root exists");
    assert_eq!(tree.size(), 7);
    assert_eq!(tree.id, root.id);
    let shallow = placement.build_subtree(root.id, 1).await.unwrap().unwrap();
    assert_eq!(shallow.size(), 3);
    assert!(placement.build_subtree(12345, 3).await.unwrap().is_none());

    let downline = placement.collect_downline_by_level(root.id, 10).await.unwrap();
    let levels = downline.into_iter().collect::<Vec<_>>();
    assert_eq!(levels, vec![(1, 2), (2, 4), (3, 0)]);

    let leaf = tree.left.as_ref().and_then(|l| l.left.as_ref()).expect("Level 2 has a left-most node");
    assert_eq!(placement.depth_from_root(leaf.id).await.unwrap(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn concurrent_registrations_never_share_a_slot() {
    const RECRUITS: usize = 20;
    let db = setup().await;
    let api = membership(&db);
    let root = register(&api, "Root", None).await;
    let code = root.referral_code.clone();
    info!("🚀️ Registering {RECRUITS} members concurrently");
    let jobs = (0..RECRUITS).map(|i| {
        let db = db.clone();
        let code = code.clone();
        tokio::spawn(async move {
            let api = membership(&db);
            let new_member = NewMember::new(format!("Recruit {i}"), format!("recruit{i}@example.com"));
            api.register_and_place(new_member.with_referral_code(code)).await
        })
    });
    let results = join_all(jobs).await;
    let mut parents = HashSet::new();
    for result in results {
        let reg = result.expect("task panicked").expect("Registration failed");
        let placement = reg.placement.expect("Every recruit is placed");
        assert!(parents.insert((placement.parent_id, placement.side)), "Slot handed out twice");
    }
    let tree = api.placement().build_subtree(root.id, 100).await.unwrap().unwrap();
    assert_eq!(tree.size(), RECRUITS + 1);
    tear_down(db).await;
}

#[tokio::test]
async fn long_chains_have_matching_depths() {
    let db = setup().await;
    let api = membership(&db);
    let chain = register_chain(&api, &["A", "B", "C", "D", "E"]).await;
    for (i, m) in chain.iter().enumerate() {
        assert_eq!(api.placement().depth_from_root(m.id).await.unwrap(), i as u32);
    }
    tear_down(db).await;
}
