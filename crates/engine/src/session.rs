// In crates/engine/src/session.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use app_config::Settings;
use core_types::Symbol;
use data::DataHandler;
use events::{Event, EventChannel, FillEvent, MarketEvent, OrderEvent, SignalEvent};
use execution::{ExecutionHandler, ExecutionReport, build_handler};
use portfolio::{Portfolio, PortfolioView, SharedPortfolio};
use risk::{RiskManager, TurtleRiskManager};
use rust_decimal::Decimal;

use crate::strategy::Strategy;

/// Running counters of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub bars: usize,
    pub signals: usize,
    pub orders: usize,
    pub fills: usize,
    /// Orders the execution handler refused.
    pub execution_rejections: usize,
    pub no_trades: usize,
    /// Signals of a kind the risk manager does not size (Lighten).
    pub unsupported_signals: usize,
    /// Signals that violated a sizing precondition.
    pub rejected_signals: usize,
    /// Signal batches the risk manager could not process at all.
    pub failed_batches: usize,
}

/// The result of a completed session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stats: SessionStats,
    pub initial_capital: Decimal,
    pub final_total: Decimal,
    pub total_return: Decimal,
    pub sharpe_ratio: f64,
    pub max_drawdown: Decimal,
    /// Longest stretch of bars spent below the equity high-water mark.
    pub drawdown_duration: usize,
    pub positions: BTreeMap<Symbol, i64>,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = Decimal::ONE_HUNDRED;
        writeln!(f, "--- Session Summary ---")?;
        writeln!(f, "Initial Capital:       {:.2}", self.initial_capital)?;
        writeln!(f, "Final Equity:          {:.2}", self.final_total)?;
        writeln!(f, "Total Return:          {:.2}%", self.total_return * pct)?;
        writeln!(f, "Sharpe Ratio:          {:.2}", self.sharpe_ratio)?;
        writeln!(f, "Max Drawdown:          {:.2}%", self.max_drawdown * pct)?;
        writeln!(f, "Drawdown Duration:     {}", self.drawdown_duration)?;
        writeln!(f, "-----------------------")?;
        writeln!(f, "Bars:                  {}", self.stats.bars)?;
        writeln!(f, "Signals:               {}", self.stats.signals)?;
        writeln!(f, "Orders:                {}", self.stats.orders)?;
        writeln!(f, "Fills:                 {}", self.stats.fills)?;
        writeln!(f, "Execution Rejections:  {}", self.stats.execution_rejections)?;
        writeln!(f, "No-Trade Decisions:    {}", self.stats.no_trades)?;
        writeln!(f, "Unsupported Signals:   {}", self.stats.unsupported_signals)?;
        writeln!(f, "Rejected Signals:      {}", self.stats.rejected_signals)?;
        writeln!(f, "Failed Batches:        {}", self.stats.failed_batches)?;
        for (symbol, quantity) in self.positions.iter().filter(|(_, q)| **q != 0) {
            writeln!(f, "Open Position:         {symbol} {quantity}")?;
        }
        write!(f, "-----------------------")
    }
}

/// Wires the pipeline stages around one event channel and drives a backtest.
///
/// Every event is dispatched to exactly one stage:
/// market -> strategy, signal -> risk manager, order -> execution handler,
/// fill -> portfolio.
pub struct Session {
    data: Arc<dyn DataHandler>,
    portfolio: SharedPortfolio,
    events: Arc<EventChannel>,
    strategy: Box<dyn Strategy>,
    risk_manager: Box<dyn RiskManager>,
    executor: Box<dyn ExecutionHandler>,
    periods_per_year: u32,
    stats: SessionStats,
}

impl Session {
    pub fn new(
        data: Arc<dyn DataHandler>,
        portfolio: SharedPortfolio,
        events: Arc<EventChannel>,
        strategy: Box<dyn Strategy>,
        risk_manager: Box<dyn RiskManager>,
        executor: Box<dyn ExecutionHandler>,
    ) -> Self {
        Self {
            data,
            portfolio,
            events,
            strategy,
            risk_manager,
            executor,
            periods_per_year: 252,
            stats: SessionStats::default(),
        }
    }

    /// Sets the number of bars per year used to annualize the Sharpe ratio.
    pub fn with_periods_per_year(mut self, periods_per_year: u32) -> Self {
        self.periods_per_year = periods_per_year;
        self
    }

    /// Builds a Turtle session: a fresh portfolio, the Turtle risk manager and
    /// the execution handler selected in `settings`.
    pub fn from_settings(
        settings: &Settings,
        data: Arc<dyn DataHandler>,
        strategy: Box<dyn Strategy>,
    ) -> anyhow::Result<Self> {
        let events = Arc::new(EventChannel::new());
        let portfolio = Portfolio::new(data.clone(), settings.session.initial_capital).into_shared();
        let risk_manager = TurtleRiskManager::new(
            portfolio.clone(),
            data.clone(),
            events.clone(),
            settings.risk.clone(),
        )?;
        let executor = build_handler(settings.execution.kind, data.clone(), events.clone());

        tracing::info!(
            strategy = strategy.name(),
            risk_manager = risk_manager.name(),
            executor = executor.name(),
            capital = %settings.session.initial_capital,
            "Session assembled."
        );
        Ok(Self::new(
            data,
            portfolio,
            events,
            strategy,
            Box::new(risk_manager),
            executor,
        )
        .with_periods_per_year(settings.session.periods_per_year))
    }

    pub fn portfolio(&self) -> &SharedPortfolio {
        &self.portfolio
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Runs until the data handler has nothing left to publish.
    pub async fn run(&mut self) -> anyhow::Result<SessionSummary> {
        tracing::info!("Starting session.");
        while self.data.update_bars(&self.events)? {
            while let Some(event) = self.events.try_pop() {
                self.dispatch(event).await?;
            }
        }
        self.events.close();

        let summary = self.summary()?;
        tracing::info!(
            final_total = %summary.final_total,
            orders = summary.stats.orders,
            fills = summary.stats.fills,
            "Session finished."
        );
        Ok(summary)
    }

    async fn dispatch(&mut self, event: Event) -> anyhow::Result<()> {
        match event {
            Event::Market(market) => self.on_market(&market),
            Event::Signal(signals) => {
                self.on_signal(&signals);
                Ok(())
            }
            Event::Order(order) => self.on_order(&order).await,
            Event::Fill(fill) => self.on_fill(&fill),
        }
    }

    fn on_market(&mut self, event: &MarketEvent) -> anyhow::Result<()> {
        self.stats.bars += 1;
        self.portfolio
            .write()
            .map_err(|_| anyhow!("portfolio lock poisoned"))?
            .update_timeindex(event.timestamp)?;

        if let Some(batch) = self.strategy.on_market(event, self.data.as_ref()) {
            if !batch.signals.is_empty() {
                self.stats.signals += batch.signals.len();
                self.events.push(batch)?;
            }
        }
        Ok(())
    }

    fn on_signal(&mut self, event: &SignalEvent) {
        match self.risk_manager.on_signal(event) {
            Ok(report) => {
                self.stats.orders += report.orders_emitted();
                self.stats.no_trades += report.no_trades();
                self.stats.unsupported_signals += report.unsupported();
                self.stats.rejected_signals += report.rejected();
            }
            // One broken batch must not stop the session.
            Err(e) => {
                self.stats.failed_batches += 1;
                tracing::error!(timestamp = %event.timestamp, error = %e, "Signal batch failed.");
            }
        }
    }

    async fn on_order(&mut self, order: &OrderEvent) -> anyhow::Result<()> {
        match self.executor.on_order(order).await? {
            // Counted when the fill comes back off the channel.
            ExecutionReport::Filled(_) => {}
            ExecutionReport::Rejected { reason, .. } => {
                self.stats.execution_rejections += 1;
                tracing::debug!(symbol = %order.symbol(), %reason, "Order not executed.");
            }
        }
        Ok(())
    }

    fn on_fill(&mut self, fill: &FillEvent) -> anyhow::Result<()> {
        self.stats.fills += 1;
        self.portfolio
            .write()
            .map_err(|_| anyhow!("portfolio lock poisoned"))?
            .on_fill(fill)
            .with_context(|| format!("failed to apply fill for {}", fill.symbol))
    }

    fn summary(&self) -> anyhow::Result<SessionSummary> {
        let portfolio = self
            .portfolio
            .read()
            .map_err(|_| anyhow!("portfolio lock poisoned"))?;
        let initial_capital = portfolio.initial_capital();
        let final_total = portfolio.total();
        let total_return = if initial_capital.is_zero() {
            Decimal::ZERO
        } else {
            (final_total - initial_capital) / initial_capital
        };
        let positions = portfolio
            .symbol_list()
            .iter()
            .map(|symbol| Ok((symbol.clone(), portfolio.get_position(symbol)?)))
            .collect::<portfolio::Result<BTreeMap<_, _>>>()?;

        Ok(SessionSummary {
            stats: self.stats.clone(),
            initial_capital,
            final_total,
            total_return,
            sharpe_ratio: portfolio.sharpe_ratio(self.periods_per_year),
            max_drawdown: portfolio.max_drawdown(),
            drawdown_duration: portfolio.drawdown_duration(),
            positions,
        })
    }
}
