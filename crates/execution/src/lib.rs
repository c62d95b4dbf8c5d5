// In crates/execution/src/lib.rs

use std::sync::Arc;

use async_trait::async_trait;
use data::DataHandler;
use events::{EventChannel, OrderEvent};

pub mod dry_run;
pub mod error;
pub mod simulated;
pub mod types;

// Re-export public types
pub use dry_run::DryRunExecutionHandler;
pub use error::{Error, Result};
pub use simulated::SimulatedExecutionHandler;
pub use types::{ExecutionKind, ExecutionReport};

/// The universal interface for an execution handler.
///
/// An `ExecutionHandler` takes orders in the order they come off the event
/// channel and turns each one into exactly one terminal report: a fill, which
/// it also pushes onto the channel, or an explicit rejection.
#[async_trait]
pub trait ExecutionHandler: Send {
    /// The name of the handler (e.g., "SimulatedExecutionHandler").
    fn name(&self) -> &'static str;

    /// Executes one order.
    ///
    /// # Returns
    ///
    /// The terminal `ExecutionReport`, or an `Error` if the fill could not be
    /// published.
    async fn on_order(&mut self, event: &OrderEvent) -> Result<ExecutionReport>;
}

/// Builds the handler selected by configuration.
pub fn build_handler(
    kind: ExecutionKind,
    data: Arc<dyn DataHandler>,
    events: Arc<EventChannel>,
) -> Box<dyn ExecutionHandler> {
    tracing::info!(?kind, "Creating execution handler.");
    match kind {
        ExecutionKind::Simulated => Box::new(SimulatedExecutionHandler::new(data, events)),
        ExecutionKind::DryRun => Box::new(DryRunExecutionHandler::new()),
    }
}
