//! Scan state machine: pure transitions, fallback policy and the manager
//! that applies them.

pub mod machine;
pub mod manager;
pub mod policy;

pub use machine::{Effect, Input, ScanSession, Step, step};
pub use manager::{StateTransitionManager, TimerDirective};
pub use policy::{MIN_REMAINING_FOR_FALLBACK, evaluate_fallback, evaluate_quality_fallback};
