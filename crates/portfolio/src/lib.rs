// In crates/portfolio/src/lib.rs

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use core_types::{BarField, Symbol};
use data::DataHandler;
use events::FillEvent;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EquityPoint, Holding};

/// The handle every pipeline stage shares. Only the fill path takes the write lock.
pub type SharedPortfolio = Arc<RwLock<Portfolio>>;

/// The read-only view of the account a risk manager sizes against.
pub trait PortfolioView {
    /// Current equity: cash plus the marked value of every open position.
    fn total(&self) -> Decimal;

    /// Signed net quantity held in `symbol`.
    fn get_position(&self, symbol: &Symbol) -> Result<i64>;

    /// The fill that opened the current position, if one is open.
    fn get_first_fill_event(&self, symbol: &Symbol) -> Result<Option<&FillEvent>>;

    /// The most recent fill of the current position, if one is open.
    fn get_last_fill_event(&self, symbol: &Symbol) -> Result<Option<&FillEvent>>;

    /// Whether the account has the cash to trade `quantity` of `symbol` at its latest close.
    fn is_affordable(&self, symbol: &Symbol, quantity: u64) -> Result<bool>;
}

/// Positions, cash and fill history for one trading session.
pub struct Portfolio {
    data: Arc<dyn DataHandler>,
    symbol_list: Vec<Symbol>,
    initial_capital: Decimal,
    cash: Decimal,
    commission: Decimal,
    total: Decimal,
    current_positions: BTreeMap<Symbol, i64>,
    /// Last known price per symbol, used to value positions.
    marks: BTreeMap<Symbol, Decimal>,
    /// Fills of the position currently open in each symbol.
    fill_events: BTreeMap<Symbol, Vec<FillEvent>>,
    holdings: Vec<Holding>,
}

impl std::fmt::Debug for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portfolio")
            .field("initial_capital", &self.initial_capital)
            .field("cash", &self.cash)
            .field("total", &self.total)
            .field("positions", &self.current_positions)
            .finish_non_exhaustive()
    }
}

impl Portfolio {
    /// Creates a flat portfolio over `data`'s instruments.
    pub fn new(data: Arc<dyn DataHandler>, initial_capital: Decimal) -> Self {
        let symbol_list = data.symbols();
        let current_positions = symbol_list.iter().map(|s| (s.clone(), 0)).collect();
        let fill_events = symbol_list.iter().map(|s| (s.clone(), Vec::new())).collect();
        Self {
            data,
            symbol_list,
            initial_capital,
            cash: initial_capital,
            commission: Decimal::ZERO,
            total: initial_capital,
            current_positions,
            marks: BTreeMap::new(),
            fill_events,
            holdings: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedPortfolio {
        Arc::new(RwLock::new(self))
    }

    pub fn symbol_list(&self) -> &[Symbol] {
        &self.symbol_list
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn commission(&self) -> Decimal {
        self.commission
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.current_positions.get(symbol).is_some_and(|qty| *qty != 0)
    }

    pub fn get_fill_events(&self, symbol: &Symbol) -> Result<&[FillEvent]> {
        self.fill_events
            .get(symbol)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownSymbol(symbol.0.clone()))
    }

    pub fn get_fill_events_len(&self, symbol: &Symbol) -> usize {
        self.fill_events.get(symbol).map_or(0, Vec::len)
    }

    /// Applies a fill: the only way positions and cash change.
    pub fn on_fill(&mut self, fill: &FillEvent) -> Result<()> {
        let signed = fill.signed_quantity()?;
        let position = self
            .current_positions
            .get_mut(&fill.symbol)
            .ok_or_else(|| Error::UnknownSymbol(fill.symbol.0.clone()))?;
        let before = *position;
        let after = before
            .checked_add(signed)
            .ok_or_else(|| Error::PositionOverflow(fill.symbol.0.clone()))?;
        *position = after;

        let history = self.fill_events.entry(fill.symbol.clone()).or_default();
        if after == 0 {
            history.clear();
        } else {
            // A fill that flips the sign starts a new position.
            if before != 0 && before.signum() != after.signum() {
                history.clear();
            }
            history.push(fill.clone());
        }

        let cost = Decimal::from(signed) * fill.fill_price;
        self.cash -= cost + fill.commission;
        self.commission += fill.commission;
        self.marks.insert(fill.symbol.clone(), fill.fill_price);
        self.total = self.mark_to_market().0;

        tracing::debug!(
            symbol = %fill.symbol,
            direction = %fill.direction,
            quantity = fill.quantity,
            price = %fill.fill_price,
            position = after,
            cash = %self.cash,
            "Fill applied to portfolio."
        );
        Ok(())
    }

    /// Marks every position to the latest published close and records a holding snapshot.
    pub fn update_timeindex(&mut self, timestamp: DateTime<Utc>) -> Result<()> {
        for symbol in &self.symbol_list {
            match self.data.get_latest_bar_value(symbol, BarField::Close) {
                Ok(close) => {
                    self.marks.insert(symbol.clone(), close);
                }
                // Not trading yet: keep whatever mark we have.
                Err(data::Error::NoData(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let (total, market_values) = self.mark_to_market();
        self.total = total;
        self.holdings.push(Holding {
            timestamp,
            cash: self.cash,
            commission: self.commission,
            total,
            positions: self.current_positions.clone(),
            market_values,
        });
        Ok(())
    }

    fn mark_to_market(&self) -> (Decimal, BTreeMap<Symbol, Decimal>) {
        let market_values: BTreeMap<Symbol, Decimal> = self
            .current_positions
            .iter()
            .map(|(symbol, qty)| {
                let mark = self.marks.get(symbol).copied().unwrap_or(Decimal::ZERO);
                (symbol.clone(), Decimal::from(*qty) * mark)
            })
            .collect();
        let total = self.cash + market_values.values().copied().sum::<Decimal>();
        (total, market_values)
    }

    /// Per-bar returns and compounded equity from the holdings history.
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        let mut curve = Vec::with_capacity(self.holdings.len());
        let mut previous = self.initial_capital;
        let mut equity = dec!(1);
        for holding in &self.holdings {
            let returns = if previous.is_zero() {
                Decimal::ZERO
            } else {
                (holding.total - previous) / previous
            };
            equity *= dec!(1) + returns;
            curve.push(EquityPoint {
                timestamp: holding.timestamp,
                total: holding.total,
                returns,
                equity,
            });
            previous = holding.total;
        }
        curve
    }

    /// Largest peak-to-trough fall of the equity curve, as a fraction of the peak.
    pub fn max_drawdown(&self) -> Decimal {
        let mut peak = dec!(1);
        let mut worst = Decimal::ZERO;
        for point in self.equity_curve() {
            peak = peak.max(point.equity);
            if peak > Decimal::ZERO {
                worst = worst.max((peak - point.equity) / peak);
            }
        }
        worst
    }

    /// The longest run of consecutive snapshots spent below the equity high-water mark.
    pub fn drawdown_duration(&self) -> usize {
        let mut peak = dec!(1);
        let mut current = 0;
        let mut longest = 0;
        for point in self.equity_curve() {
            if point.equity >= peak {
                peak = point.equity;
                current = 0;
            } else {
                current += 1;
                longest = longest.max(current);
            }
        }
        longest
    }

    /// Annualized Sharpe ratio of the per-snapshot returns, with a zero risk-free rate.
    ///
    /// `periods_per_year` is the number of snapshots in a year (252 for daily bars).
    /// Returns 0.0 when there are fewer than two returns or they do not vary.
    pub fn sharpe_ratio(&self, periods_per_year: u32) -> f64 {
        let returns: Vec<f64> = self
            .equity_curve()
            .iter()
            .map(|point| point.returns.to_f64().unwrap_or(0.0))
            .collect();
        let n = returns.len();
        if n < 2 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / n as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let std_dev = variance.sqrt();
        if std_dev < 1e-15 {
            return 0.0;
        }
        f64::from(periods_per_year).sqrt() * mean / std_dev
    }
}

impl PortfolioView for Portfolio {
    fn total(&self) -> Decimal {
        self.total
    }

    fn get_position(&self, symbol: &Symbol) -> Result<i64> {
        self.current_positions
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::UnknownSymbol(symbol.0.clone()))
    }

    fn get_first_fill_event(&self, symbol: &Symbol) -> Result<Option<&FillEvent>> {
        Ok(self.get_fill_events(symbol)?.first())
    }

    fn get_last_fill_event(&self, symbol: &Symbol) -> Result<Option<&FillEvent>> {
        Ok(self.get_fill_events(symbol)?.last())
    }

    fn is_affordable(&self, symbol: &Symbol, quantity: u64) -> Result<bool> {
        if !self.current_positions.contains_key(symbol) {
            return Err(Error::UnknownSymbol(symbol.0.clone()));
        }
        let close = self.data.get_latest_bar_value(symbol, BarField::Close)?;
        Ok(Decimal::from(quantity) * close <= self.cash)
    }
}
