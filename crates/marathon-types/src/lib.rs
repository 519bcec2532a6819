pub mod api;
pub mod clock;
pub mod error;
pub mod events;
pub mod models;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorBody, ErrorKind, LedgerError, LedgerResult, Missing};
pub use models::{
    Activity, ActivityName, PostEvent, Registration, RotationHour, Stats, User, UserId,
};
pub use store::{ActivityLedger, UserRegistry};
