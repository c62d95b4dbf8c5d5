// In crates/execution/src/simulated.rs

use std::sync::Arc;

use crate::{ExecutionHandler, ExecutionReport, Result};
use async_trait::async_trait;
use core_types::BarField;
use data::DataHandler;
use events::{EventChannel, FillEvent, OrderEvent};
use rust_decimal::Decimal;

/// Fills every order in full at the latest published close.
///
/// No slippage and no commission are modelled.
pub struct SimulatedExecutionHandler {
    data: Arc<dyn DataHandler>,
    events: Arc<EventChannel>,
}

impl SimulatedExecutionHandler {
    pub fn new(data: Arc<dyn DataHandler>, events: Arc<EventChannel>) -> Self {
        Self { data, events }
    }

    fn reject(order: &OrderEvent, reason: String) -> ExecutionReport {
        tracing::warn!(symbol = %order.symbol(), %reason, "Order rejected by simulator.");
        ExecutionReport::Rejected {
            order: order.clone(),
            reason,
        }
    }
}

#[async_trait]
impl ExecutionHandler for SimulatedExecutionHandler {
    fn name(&self) -> &'static str {
        "SimulatedExecutionHandler"
    }

    async fn on_order(&mut self, order: &OrderEvent) -> Result<ExecutionReport> {
        // --- 1. Find the Execution Price ---
        let fill_price = match self.data.get_latest_bar_value(order.symbol(), BarField::Close) {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(price) => return Ok(Self::reject(order, format!("no valid price ({price})"))),
            Err(e) => return Ok(Self::reject(order, e.to_string())),
        };

        // --- 2. Publish the Fill ---
        let fill = FillEvent::for_order(order, fill_price, order.timestamp());
        tracing::info!(
            symbol = %fill.symbol,
            direction = %fill.direction,
            quantity = fill.quantity,
            price = %fill.fill_price,
            "Order filled."
        );
        self.events.push(fill.clone())?;

        Ok(ExecutionReport::Filled(fill))
    }
}
