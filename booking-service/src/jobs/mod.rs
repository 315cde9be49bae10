//! Background sweeps and the scheduler that drives them.

mod scheduler;
mod sweeps;

pub use scheduler::IntervalScheduler;
pub use sweeps::{JobRunner, SweepReport, SweepWindows, CART_RECOVERY_AFTER_MINUTES};
