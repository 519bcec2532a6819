use std::future::Future;
use std::sync::Arc;

use marathon_types::UserId;
use marathon_types::error::{ErrorBody, ErrorKind};
use marathon_types::events::{Outcome, UserOutcome};
use tokio::sync::Semaphore;
use tracing::{error, warn};

pub const DEFAULT_CONCURRENCY: usize = 16;

/// Run `work` once per user, at most `concurrency` at a time, and collect one
/// outcome per user in input order. A failing or panicking user never stops
/// the others.
pub(crate) async fn for_each_user<F, Fut>(
    label: &'static str,
    ids: Vec<UserId>,
    concurrency: usize,
    work: F,
) -> Vec<UserOutcome>
where
    F: Fn(UserId) -> Fut,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));

    let handles: Vec<_> = ids
        .into_iter()
        .map(|user_id| {
            let permits = permits.clone();
            let fut = work(user_id);
            let handle = tokio::spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await;
                fut.await
            });
            (user_id, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (user_id, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(batch = label, user_id = %user_id, "task failed: {}", e);
                Outcome::Failed {
                    error: ErrorBody {
                        kind: ErrorKind::Internal,
                        message: format!("{} task failed: {}", label, e),
                    },
                }
            }
        };

        if let Outcome::Failed { error } = &outcome {
            warn!(batch = label, user_id = %user_id, kind = ?error.kind, "{}", error.message);
        }
        outcomes.push(UserOutcome { user_id, outcome });
    }
    outcomes
}
