pub mod clock;
pub(crate) mod commands;
pub mod controller;
pub mod error;
pub mod events;
pub mod state;

pub use clock::{Clock, IntervalClock, ManualClock, TickSource};
pub use controller::AlertController;
pub use error::{AlertError, AlertResult};
pub use events::AlertEvent;
pub use state::{
    AlertOptions, AlertSession, AlertStatus, DispatchTrigger, EmergencyType, SessionId,
    TickOutcome, COUNTDOWN_SECS,
};
