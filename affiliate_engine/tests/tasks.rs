use affiliate_common::UsdCents;
use affiliate_engine::{
    db_types::{NewTask, SubmissionStatus, TaskKind},
    events::EventProducers,
    traits::TaskError,
    LedgerApi,
    Notifier,
    SqliteDatabase,
    TaskApi,
};
use chrono::{Duration, Utc};
use serde_json::json;

use crate::support::prepare_env::{membership, register, setup, tear_down};

mod support;

fn tasks(db: &SqliteDatabase) -> TaskApi<SqliteDatabase> {
    TaskApi::new(db.clone(), EventProducers::default())
}

#[tokio::test]
async fn approved_submissions_credit_the_reward_once() {
    let db = setup().await;
    let alice = register(&membership(&db), "Alice", None).await;
    let api = tasks(&db);
    let new_task = NewTask::new("Watch the intro video", TaskKind::Video, UsdCents::from(75)).with_description("2 min");
    let task = api.create_task(new_task).await.unwrap();
    let open = api.open_tasks(Utc::now()).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, task.id);

    let submission = api.submit_task(task.id, alice.id, json!({ "watched": true })).await.unwrap();
    assert_eq!(submission.status, SubmissionStatus::Submitted);
    assert!(!submission.reward_granted);
    let (approved, reward) = api.approve_submission(task.id, submission.id).await.unwrap();
    assert_eq!(approved.status, SubmissionStatus::Approved);
    assert!(approved.reward_granted);
    assert_eq!(reward.amount, UsdCents::from(75));
    assert_eq!(reward.level, 0);
    assert_eq!(reward.earner_id, alice.id);

    let err = api.approve_submission(task.id, submission.id).await.unwrap_err();
    assert_eq!(err, TaskError::AlreadyApproved(submission.id));
    let err = api.reject_submission(task.id, submission.id, Some("Too late")).await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_APPROVED");
    assert_eq!(LedgerApi::new(db.clone()).balance(alice.id).await.unwrap(), UsdCents::from(75));

    let notifier = Notifier::new(db.clone(), EventProducers::default());
    let broadcasts = notifier.broadcasts(0, 10).await.unwrap().into_iter().map(|n| n.title).collect::<Vec<_>>();
    assert!(broadcasts.contains(&"New task posted".to_string()));
    assert!(broadcasts.contains(&"Task submitted".to_string()));
    let mine = notifier.notifications(alice.id, 0, 10).await.unwrap().into_iter().map(|n| n.title).collect::<Vec<_>>();
    assert!(mine.contains(&"We received your submission".to_string()));
    assert!(mine.contains(&"Task approved".to_string()));
    tear_down(db).await;
}

#[tokio::test]
async fn rejected_submissions_earn_nothing() {
    let db = setup().await;
    let bob = register(&membership(&db), "Bob", None).await;
    let api = tasks(&db);
    let task = api.create_task(NewTask::new("Survey", TaskKind::Survey, UsdCents::from(120))).await.unwrap();
    let submission = api.submit_task(task.id, bob.id, json!({ "q1": "yes" })).await.unwrap();
    let rejected = api.reject_submission(task.id, submission.id, None).await.unwrap();
    assert_eq!(rejected.status, SubmissionStatus::Rejected);
    assert!(!rejected.reward_granted);
    assert_eq!(LedgerApi::new(db.clone()).balance(bob.id).await.unwrap(), UsdCents::from(0));
    let mine = api.submissions_for_member(bob.id).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].payload, r#"{"q1":"yes"}"#);
    tear_down(db).await;
}

#[tokio::test]
async fn invalid_submissions() {
    let db = setup().await;
    let carol = register(&membership(&db), "Carol", None).await;
    let api = tasks(&db);
    let an_hour_ago = Utc::now() - Duration::hours(1);
    let expired = NewTask::new("Old form", TaskKind::Form, UsdCents::from(10)).expires_at(an_hour_ago);
    let expired = api.create_task(expired).await.unwrap();
    assert!(api.open_tasks(Utc::now()).await.unwrap().is_empty());
    let err = api.submit_task(expired.id, carol.id, json!({})).await.unwrap_err();
    assert_eq!(err, TaskError::TaskExpired(expired.id));
    let err = api.submit_task(404, carol.id, json!({})).await.unwrap_err();
    assert_eq!(err, TaskError::TaskNotFound(404));

    let live = NewTask::new("New form", TaskKind::Form, UsdCents::from(10)).expires_at(Utc::now() + Duration::days(1));
    let live = api.create_task(live).await.unwrap();
    let err = api.submit_task(live.id, 5150, json!({})).await.unwrap_err();
    assert_eq!(err, TaskError::MemberNotFound(5150));
    let err = api.approve_submission(live.id, 1).await.unwrap_err();
    assert_eq!(err, TaskError::SubmissionNotFound { task_id: live.id, submission_id: 1 });
    tear_down(db).await;
}
