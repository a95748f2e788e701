use std::sync::Arc;
use std::time::Duration;

use crew_daemon::config::ServiceConfig;
use crew_daemon::service::Service;
use crew_lifecycle::{GroupPlan, Operator, OperatorAuthority};
use crew_nullables::NullClock;
use crew_payments::PaymentGateway;
use crew_store_lmdb::{check_integrity, LmdbEnvironment};
use crew_types::{GroupStatus, Timestamp, UserId};

const MAP_SIZE: usize = 16 * 1024 * 1024;

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

fn operator() -> Operator {
    OperatorAuthority::from_tokens(["ops"]).authorize("ops").unwrap()
}

fn service(dir: &std::path::Path, clock: Arc<NullClock>) -> Service<LmdbEnvironment> {
    let store = Arc::new(LmdbEnvironment::open(dir, MAP_SIZE).unwrap());
    Service::build(&ServiceConfig::default(), store, clock).unwrap()
}

#[test]
fn groups_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(1_000));
    let op = operator();

    let group_id = {
        let svc = service(dir.path(), clock.clone());
        for member in ["ann", "bob", "cat"] {
            svc.engine.join_queue(&user(member), Some("nyu")).unwrap();
        }
        let group = svc
            .engine
            .create_group(
                &op,
                &[user("ann"), user("bob"), user("cat")],
                GroupPlan {
                    event_datetime: Some(Timestamp::new(50_000)),
                    venue_name: "Blue Door Cafe".to_string(),
                    venue_address: None,
                    campus: None,
                },
            )
            .unwrap();
        group.id
    };

    let svc = service(dir.path(), clock);
    let detail = svc.engine.group_detail(&op, group_id).unwrap();
    assert_eq!(detail.group.status, GroupStatus::PendingPayment);
    assert_eq!(detail.group.member_ids.len(), 3);
    assert!(svc.engine.list_queue().unwrap().is_empty());

    let report = check_integrity(svc.engine.store()).unwrap();
    assert!(report.is_healthy(), "{:?}", report.errors);
}

#[tokio::test]
async fn sweeper_expires_unpaid_groups_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(NullClock::new(1_000));
    let op = operator();
    let svc = service(dir.path(), clock.clone());

    for member in ["ann", "bob"] {
        svc.engine.join_queue(&user(member), None).unwrap();
    }
    let group = svc
        .engine
        .create_group(
            &op,
            &[user("ann"), user("bob")],
            GroupPlan {
                event_datetime: None,
                venue_name: "Library steps".to_string(),
                venue_address: None,
                campus: Some("nyu".to_string()),
            },
        )
        .unwrap();

    clock.advance(svc.engine.params().payment_window_secs + 1);
    let report = svc.sweeper(Duration::from_secs(60)).tick().await.unwrap();

    assert_eq!(report.expired, vec![group.id]);
    assert!(report.refunds.is_empty());
    assert_eq!(svc.gateway.name(), "null");
    let detail = svc.engine.group_detail(&op, group.id).unwrap();
    assert_eq!(detail.group.status, GroupStatus::Cancelled);
}
