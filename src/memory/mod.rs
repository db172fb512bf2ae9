//! Adaptive memory: validated corrections and the raw feedback log.

mod corrections;
mod feedback;

pub use corrections::*;
pub use feedback::*;
