use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use marathon_types::Clock;
use marathon_types::clock::next_hour;
use marathon_types::events::BatchReport;
use tracing::{info, warn};

use crate::notify::NotificationEvaluator;
use crate::rotation::RotationEngine;

/// Hourly trigger: wakes at every whole UTC hour and runs the rotation batch
/// followed by the notification batch, until `shutdown` resolves.
pub async fn run<S>(
    rotation: Arc<RotationEngine>,
    notifications: Arc<NotificationEvaluator>,
    clock: Arc<dyn Clock>,
    freeze_window: Duration,
    shutdown: S,
) where
    S: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    loop {
        let now = clock.now();
        let target = next_hour(now);
        let wait = (target - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = &mut shutdown => {
                info!("Scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // timers may wake a hair early; never evaluate the previous bucket
        let at = clock.now().max(target);
        tick(&rotation, &notifications, at, freeze_window).await;
    }
}

/// Reports of one hourly run. A batch that could not select its cohort is
/// `None`.
#[derive(Debug, Default)]
pub struct Tick {
    pub rotation: Option<BatchReport>,
    pub notification: Option<BatchReport>,
}

pub async fn tick(
    rotation: &RotationEngine,
    notifications: &NotificationEvaluator,
    at: DateTime<Utc>,
    freeze_window: Duration,
) -> Tick {
    let rotation = match rotation.run_batch(at).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("Rotation batch error: {}", e);
            None
        }
    };

    let notification = match notifications.run_batch(at, freeze_window).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!("Notification batch error: {}", e);
            None
        }
    };

    Tick {
        rotation,
        notification,
    }
}
