// In crates/risk/src/lib.rs

use events::SignalEvent;

pub mod error;
pub mod turtle_manager;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use turtle_manager::TurtleRiskManager;
pub use types::{Decision, NoTradeReason, SignalOutcome, SignalReport, TurtleRiskSettings};

/// The universal interface for a risk management module.
///
/// A `RiskManager` turns a batch of strategy signals into sized orders and
/// pushes them onto the shared event channel. It never mutates the portfolio.
pub trait RiskManager: Send + Sync {
    /// The name of the risk management strategy.
    fn name(&self) -> &'static str;

    /// Evaluates every signal of `event` and pushes the resulting orders.
    ///
    /// # Returns
    ///
    /// * `Ok(SignalReport)`: one outcome per signal. A signal that violates a
    ///   precondition (bad atr, unknown symbol, ...) is recorded as an `Err`
    ///   outcome and the rest of the batch is still processed.
    /// * `Err(Error)`: the portfolio or the channel failed. Nothing from this
    ///   batch has been pushed.
    fn on_signal(&self, event: &SignalEvent) -> Result<SignalReport>;
}
