//! Platform seams: time, task spawning and host environment.

pub mod clock;
pub mod environment;
pub mod runtime;

pub use clock::{Clock, ClockHandle, ManualClock, SystemClock};
pub use environment::PageContext;
