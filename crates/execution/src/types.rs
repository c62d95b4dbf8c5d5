// In crates/execution/src/types.rs

use events::{FillEvent, OrderEvent};
use serde::Deserialize;

/// Which execution backend a session is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    /// Fill every order immediately at the latest close.
    #[default]
    Simulated,
    /// Log every order and reject it. Nothing is ever filled.
    DryRun,
}

/// The terminal result of handing one order to an execution handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionReport {
    Filled(FillEvent),
    Rejected { order: OrderEvent, reason: String },
}

impl ExecutionReport {
    pub fn is_filled(&self) -> bool {
        matches!(self, ExecutionReport::Filled(_))
    }
}
