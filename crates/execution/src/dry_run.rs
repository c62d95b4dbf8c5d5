// In crates/execution/src/dry_run.rs

use crate::{ExecutionHandler, ExecutionReport, Result};
use async_trait::async_trait;
use events::OrderEvent;

/// Records the orders a session would send and rejects all of them.
///
/// Useful to audit what the risk manager emits without touching the portfolio.
#[derive(Debug, Default)]
pub struct DryRunExecutionHandler {
    seen: Vec<OrderEvent>,
}

impl DryRunExecutionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every order received so far, in arrival order.
    pub fn orders(&self) -> &[OrderEvent] {
        &self.seen
    }
}

#[async_trait]
impl ExecutionHandler for DryRunExecutionHandler {
    fn name(&self) -> &'static str {
        "DryRunExecutionHandler"
    }

    async fn on_order(&mut self, order: &OrderEvent) -> Result<ExecutionReport> {
        tracing::info!(
            symbol = %order.symbol(),
            direction = %order.direction(),
            quantity = order.quantity(),
            "Dry run: order not sent."
        );
        self.seen.push(order.clone());
        Ok(ExecutionReport::Rejected {
            order: order.clone(),
            reason: "dry run".to_string(),
        })
    }
}
