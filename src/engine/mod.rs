//! Choreography engine: the director state machine and its runtime.

pub mod control;
pub mod director;
pub mod queue;
pub mod seen;

pub use control::{DirectorHandle, spawn};
pub use director::{Admission, Director, Timer, TimerKind};
pub use queue::NarrationQueue;
pub use seen::SeenIds;
