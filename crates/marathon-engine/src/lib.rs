//! Marathon engine: the scheduled rotation and reminder batches plus the
//! command service, written against the storage capability traits from
//! `marathon-types`.
//!
//! - `RotationEngine`: daily streak rollover per hour-bucket cohort
//! - `NotificationEvaluator`: stall reminders outside the freeze window
//! - `Service`: one user command in, one structured reply out
//! - `scheduler`: in-process hourly trigger

mod batch;
pub mod notifier;
pub mod notify;
pub mod rotation;
pub mod scheduler;
pub mod service;

pub use batch::DEFAULT_CONCURRENCY;
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use notify::{DEFAULT_FREEZE_WINDOW_HOURS, NotificationEvaluator};
pub use rotation::RotationEngine;
pub use service::Service;
