// In crates/engine/src/lib.rs

pub mod session;
pub mod strategy;

pub use session::{Session, SessionStats, SessionSummary};
pub use strategy::{SignalReplay, Strategy};
