// In crates/events/src/lib.rs

pub mod channel;
pub mod error;

use chrono::{DateTime, Utc};
use core_types::{Direction, OrderType, Signal, SignalAttr, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

pub use channel::EventChannel;
pub use error::{Error, Result};

/// Published when the data handler advances to a new bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketEvent {
    pub timestamp: DateTime<Utc>,
}

/// All signals generated from one data tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    pub timestamp: DateTime<Utc>,
    pub signals: Vec<Signal>,
}

impl SignalEvent {
    pub fn new(timestamp: DateTime<Utc>, signals: Vec<Signal>) -> Self {
        Self { timestamp, signals }
    }
}

/// An instruction to trade, produced by a risk manager.
///
/// Orders are immutable once built: the fields are private and the only
/// constructor refuses a zero quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderEvent {
    timestamp: DateTime<Utc>,
    symbol: Symbol,
    order_type: OrderType,
    quantity: u64,
    direction: Direction,
    attr: SignalAttr,
}

impl OrderEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        order_type: OrderType,
        quantity: u64,
        direction: Direction,
        attr: SignalAttr,
    ) -> Result<Self> {
        if quantity == 0 {
            return Err(Error::ZeroQuantity { symbol: symbol.0 });
        }
        Ok(Self {
            timestamp,
            symbol,
            order_type,
            quantity,
            direction,
            attr,
        })
    }

    /// Shorthand for a market order.
    pub fn market(
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        quantity: u64,
        direction: Direction,
        attr: SignalAttr,
    ) -> Result<Self> {
        Self::new(timestamp, symbol, OrderType::Market, quantity, direction, attr)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn attr(&self) -> &SignalAttr {
        &self.attr
    }
}

/// The realized outcome of an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillEvent {
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub quantity: u64,
    pub direction: Direction,
    pub fill_price: Decimal,
    /// Always zero for the handlers in this workspace.
    pub commission: Decimal,
    pub attr: SignalAttr,
}

impl FillEvent {
    /// The fill quantity with the sign of its direction.
    pub fn signed_quantity(&self) -> Result<i64> {
        let quantity = i64::try_from(self.quantity).map_err(|_| Error::QuantityOverflow {
            symbol: self.symbol.0.clone(),
            quantity: self.quantity,
        })?;
        Ok(self.direction.sign() * quantity)
    }

    /// A fill for the full quantity of `order` at `fill_price`.
    pub fn for_order(order: &OrderEvent, fill_price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            symbol: order.symbol().clone(),
            quantity: order.quantity(),
            direction: order.direction(),
            fill_price,
            commission: Decimal::ZERO,
            attr: order.attr().clone(),
        }
    }
}

/// Everything that travels on the shared event channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    Market(MarketEvent),
    Signal(SignalEvent),
    Order(OrderEvent),
    Fill(FillEvent),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Market(_) => "market",
            Event::Signal(_) => "signal",
            Event::Order(_) => "order",
            Event::Fill(_) => "fill",
        }
    }
}

impl From<MarketEvent> for Event {
    fn from(event: MarketEvent) -> Self {
        Event::Market(event)
    }
}

impl From<SignalEvent> for Event {
    fn from(event: SignalEvent) -> Self {
        Event::Signal(event)
    }
}

impl From<OrderEvent> for Event {
    fn from(event: OrderEvent) -> Self {
        Event::Order(event)
    }
}

impl From<FillEvent> for Event {
    fn from(event: FillEvent) -> Self {
        Event::Fill(event)
    }
}
