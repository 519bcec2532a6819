use std::sync::Arc;

use marathon_types::api::{Command, CommandReply};
use marathon_types::models::check_notification_target;
use marathon_types::{
    ActivityLedger, ActivityName, Clock, LedgerResult, RotationHour, UserRegistry,
};
use tracing::debug;

/// Executes user commands against the registry and the ledger.
///
/// Input is validated here, before any storage access, so malformed names
/// and hours never reach the backend.
pub struct Service {
    registry: Arc<dyn UserRegistry>,
    ledger: Arc<dyn ActivityLedger>,
    clock: Arc<dyn Clock>,
    default_hour: RotationHour,
}

impl Service {
    pub fn new(
        registry: Arc<dyn UserRegistry>,
        ledger: Arc<dyn ActivityLedger>,
        clock: Arc<dyn Clock>,
        default_hour: RotationHour,
    ) -> Self {
        Self {
            registry,
            ledger,
            clock,
            default_hour,
        }
    }

    pub async fn execute(&self, command: Command) -> LedgerResult<CommandReply> {
        let label = command.label();
        let user_id = command.user_id();
        let now = self.clock.now();

        let reply = match command {
            Command::Register {
                user_id,
                notification_target,
            } => {
                let notification_target = check_notification_target(notification_target)?;
                let registration = self
                    .registry
                    .register(user_id, notification_target, self.default_hour, now)
                    .await?;
                CommandReply::Registered { registration }
            }

            Command::Deregister { user_id } => {
                self.registry.deregister(user_id).await?;
                CommandReply::Deregistered
            }

            Command::CreateActivity { user_id, name } => {
                let name = ActivityName::new(name)?;
                self.ledger.create_activity(user_id, &name, now).await?;
                CommandReply::ActivityCreated { name: name.into() }
            }

            Command::DeleteActivity { user_id, name } => {
                let name = ActivityName::new(name)?;
                self.ledger.delete_activity(user_id, &name, now).await?;
                CommandReply::ActivityDeleted { name: name.into() }
            }

            Command::PostActivity { user_id, name } => {
                let name = ActivityName::new(name)?;
                self.ledger.post_activity(user_id, &name, now).await?;
                CommandReply::Posted { name: name.into() }
            }

            Command::ListActivities { user_id } => {
                let names = self.ledger.list_activities(user_id).await?;
                CommandReply::Activities {
                    names: names.into_iter().map(String::from).collect(),
                }
            }

            Command::GetStats { user_id, name } => {
                let name = ActivityName::new(name)?;
                let stats = self.ledger.stats(user_id, &name).await?;
                CommandReply::Stats {
                    name: name.into(),
                    stats,
                }
            }

            Command::SetRotationHour { user_id, hour } => {
                let hour = RotationHour::new(hour)?;
                self.registry.set_rotation_hour(user_id, hour, now).await?;
                CommandReply::RotationHourSet { hour: hour.get() }
            }

            Command::RotateNow { user_id } => {
                self.ledger.rotate(user_id, now).await?;
                CommandReply::Rotated
            }

            Command::PostHistory {
                user_id,
                name,
                limit,
            } => {
                let name = ActivityName::new(name)?;
                let events = self.ledger.post_history(user_id, &name, limit).await?;
                CommandReply::History {
                    name: name.into(),
                    posted_at: events.into_iter().map(|e| e.posted_at).collect(),
                }
            }
        };

        debug!(command = label, user_id = %user_id, "command executed");
        Ok(reply)
    }
}
