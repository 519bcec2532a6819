//! One user's life through the command service and both scheduled batches,
//! on a real SQLite ledger.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use marathon_db::{Database, RetryPolicy, SqliteStore};
use marathon_engine::notifier::Notifier;
use marathon_engine::{NotificationEvaluator, RotationEngine, Service};
use marathon_types::api::{Command, CommandReply};
use marathon_types::events::Reminder;
use marathon_types::{
    ActivityLedger, FixedClock, LedgerError, Missing, RotationHour, Stats, UserId, UserRegistry,
};

const U1: UserId = UserId(42);

#[derive(Default)]
struct Inbox {
    reminders: Mutex<Vec<Reminder>>,
}

#[async_trait]
impl Notifier for Inbox {
    async fn notify(&self, reminder: &Reminder) -> anyhow::Result<()> {
        self.reminders.lock().unwrap().push(reminder.clone());
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<SqliteStore>,
    clock: Arc<FixedClock>,
    service: Service,
    rotation: RotationEngine,
    notifications: NotificationEvaluator,
    inbox: Arc<Inbox>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("marathon.db")).unwrap();
        let store = Arc::new(SqliteStore::new(Arc::new(db), RetryPolicy::default()));
        let clock = Arc::new(FixedClock::new(at(1, 8)));
        let inbox = Arc::new(Inbox::default());

        Self {
            service: Service::new(
                store.clone(),
                store.clone(),
                clock.clone(),
                RotationHour::MIDNIGHT,
            ),
            rotation: RotationEngine::new(store.clone(), store.clone()),
            notifications: NotificationEvaluator::new(store.clone(), store.clone(), inbox.clone()),
            _dir: dir,
            store,
            clock,
            inbox,
        }
    }

    async fn run(&self, command: Command) -> Result<CommandReply, LedgerError> {
        self.service.execute(command).await
    }

    async fn stats(&self, activity: &str) -> Result<Stats, LedgerError> {
        match self
            .run(Command::GetStats {
                user_id: U1,
                name: activity.into(),
            })
            .await?
        {
            CommandReply::Stats { stats, .. } => Ok(stats),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    async fn counters(&self, activity: &str) -> (u64, u64) {
        let stats = self.stats(activity).await.unwrap();
        (stats.total, stats.current)
    }

    async fn rotated(&self, now: DateTime<Utc>) -> Vec<UserId> {
        self.rotation
            .run_batch(now)
            .await
            .unwrap()
            .outcomes
            .iter()
            .filter(|o| o.is_ok())
            .map(|o| o.user_id)
            .collect()
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

#[tokio::test]
async fn streak_lifecycle() {
    let h = Harness::new();

    // post twice, nothing banked yet
    h.run(Command::Register {
        user_id: U1,
        notification_target: Some("chat-42".into()),
    })
    .await
    .unwrap();
    h.run(Command::CreateActivity {
        user_id: U1,
        name: "run".into(),
    })
    .await
    .unwrap();
    for _ in 0..2 {
        h.run(Command::PostActivity {
            user_id: U1,
            name: "run".into(),
        })
        .await
        .unwrap();
    }
    assert_eq!(h.counters("run").await, (0, 2));

    // midnight rotation banks the streak
    assert_eq!(h.rotated(at(2, 0)).await, vec![U1]);
    assert_eq!(h.counters("run").await, (2, 0));

    // a day without posts breaks it
    assert_eq!(h.rotated(at(3, 0)).await, vec![U1]);
    assert_eq!(h.counters("run").await, (0, 0));

    // move the user to the 05:00 cohort
    h.clock.set(at(3, 1));
    h.run(Command::SetRotationHour {
        user_id: U1,
        hour: 5,
    })
    .await
    .unwrap();
    let five = RotationHour::new(5).unwrap();

    // rotated five hours ago: not yet due
    assert!(h.rotated(at(3, 5)).await.is_empty());
    // wrong bucket
    assert!(h.rotated(at(4, 4)).await.is_empty());
    assert!(
        h.store
            .users_due_for_rotation(RotationHour::MIDNIGHT, at(4, 0))
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        h.store.users_due_for_rotation(five, at(4, 5)).await.unwrap(),
        vec![U1]
    );
    assert_eq!(h.rotated(at(4, 5)).await, vec![U1]);
    assert!(h.rotated(at(4, 5) + Duration::minutes(30)).await.is_empty());

    // stalled and never reminded
    let freeze = Duration::hours(15);
    assert_eq!(
        h.notifications.users_to_notify(at(4, 6), freeze).await.unwrap(),
        vec![U1]
    );
    let report = h.notifications.run_batch(at(4, 6), freeze).await.unwrap();
    assert_eq!(report.succeeded(), 1);
    {
        let reminders = h.inbox.reminders.lock().unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].notification_target.as_deref(), Some("chat-42"));
        assert_eq!(reminders[0].activities, vec!["run"]);
    }
    assert!(
        h.notifications
            .users_to_notify(at(4, 12), freeze)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(h.stats("run").await.unwrap().last_notified_at, Some(at(4, 6)));

    // gone for good
    h.run(Command::Deregister { user_id: U1 }).await.unwrap();
    let err = h.stats("run").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        h.store.list_activities(U1).await.unwrap_err(),
        LedgerError::NotFound(Missing::User(U1))
    );
}

#[tokio::test]
async fn rotate_now_defers_the_scheduled_rotation() {
    let h = Harness::new();
    h.run(Command::Register {
        user_id: U1,
        notification_target: None,
    })
    .await
    .unwrap();
    h.run(Command::CreateActivity {
        user_id: U1,
        name: "read".into(),
    })
    .await
    .unwrap();
    h.run(Command::PostActivity {
        user_id: U1,
        name: "read".into(),
    })
    .await
    .unwrap();

    h.clock.set(at(1, 23));
    assert_eq!(
        h.run(Command::RotateNow { user_id: U1 }).await.unwrap(),
        CommandReply::Rotated
    );
    assert_eq!(h.counters("read").await, (1, 0));

    // rotated an hour ago, so midnight skips the user
    assert!(h.rotated(at(2, 0)).await.is_empty());
    assert_eq!(h.counters("read").await, (1, 0));
}

#[tokio::test]
async fn post_history_lists_newest_first() {
    let h = Harness::new();
    h.run(Command::Register {
        user_id: U1,
        notification_target: None,
    })
    .await
    .unwrap();
    h.run(Command::CreateActivity {
        user_id: U1,
        name: "run".into(),
    })
    .await
    .unwrap();
    for hour in [8, 12, 18] {
        h.clock.set(at(1, hour));
        h.run(Command::PostActivity {
            user_id: U1,
            name: "run".into(),
        })
        .await
        .unwrap();
    }

    let reply = h
        .run(Command::PostHistory {
            user_id: U1,
            name: "run".into(),
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(
        reply,
        CommandReply::History {
            name: "run".into(),
            posted_at: vec![at(1, 18), at(1, 12)],
        }
    );
}
