// In crates/risk/src/turtle_manager.rs

use std::sync::{Arc, RwLock};

use core_types::{BarField, Direction, Signal, SignalType};
use data::DataHandler;
use events::{EventChannel, OrderEvent, SignalEvent};
use num_traits::ToPrimitive;
use portfolio::PortfolioView;
use rust_decimal::Decimal;

use crate::types::{Decision, NoTradeReason, SignalOutcome, SignalReport, TurtleRiskSettings};
use crate::{Error, Result, RiskManager};

/// Sizes Turtle-style units from ATR and manages pyramiding and exits.
///
/// * OpenLong / OpenShort: one unit risks `risk_fraction` of total equity per
///   ATR of adverse movement, rounded down to whole lots.
/// * Extend: adds a unit the size of the fill that opened the position, in the
///   same direction.
/// * Close: flattens the whole net position.
/// * Lighten: reported as unsupported.
///
/// Closing orders of a batch are always pushed before opening/extending ones.
pub struct TurtleRiskManager<P> {
    portfolio: Arc<RwLock<P>>,
    data: Arc<dyn DataHandler>,
    events: Arc<EventChannel>,
    settings: TurtleRiskSettings,
}

impl<P: PortfolioView> TurtleRiskManager<P> {
    pub fn new(
        portfolio: Arc<RwLock<P>>,
        data: Arc<dyn DataHandler>,
        events: Arc<EventChannel>,
        settings: TurtleRiskSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            portfolio,
            data,
            events,
            settings,
        })
    }

    pub fn settings(&self) -> &TurtleRiskSettings {
        &self.settings
    }

    /// Decides one signal against a portfolio snapshot whose equity is `total`.
    fn decide(
        &self,
        signal: &Signal,
        batch: &SignalEvent,
        total: Decimal,
        portfolio: &P,
    ) -> Result<Decision> {
        let symbol = &signal.symbol;
        let signal_type = signal.signal_type;
        let market_data = |source| Error::MarketData {
            symbol: symbol.clone(),
            signal_type,
            source,
        };

        let lot_size = self.data.get_lot_size(symbol).map_err(market_data)?;
        let close = self
            .data
            .get_latest_bar_value(symbol, BarField::Close)
            .map_err(market_data)?;
        if close <= Decimal::ZERO {
            return Err(Error::InvalidPrice {
                symbol: symbol.clone(),
                signal_type,
                price: close,
            });
        }

        let order = |quantity: u64, direction: Direction| -> Result<Decision> {
            let order = OrderEvent::market(
                batch.timestamp,
                symbol.clone(),
                quantity,
                direction,
                signal.attr.clone(),
            )?;
            Ok(Decision::Order(order))
        };

        match signal_type {
            SignalType::OpenLong | SignalType::OpenShort => {
                let atr = match signal.attr.atr {
                    Some(atr) if atr > Decimal::ZERO => atr,
                    atr => {
                        return Err(Error::InvalidAtr {
                            symbol: symbol.clone(),
                            signal_type,
                            atr,
                        });
                    }
                };

                let quantity =
                    unit_quantity(total, self.settings.risk_fraction, atr, lot_size, close);
                if quantity == 0 {
                    return Ok(Decision::NoTrade(NoTradeReason::ZeroQuantity));
                }
                if !portfolio.is_affordable(symbol, quantity)? {
                    return Ok(Decision::NoTrade(NoTradeReason::Unaffordable));
                }

                let direction = if signal_type == SignalType::OpenLong {
                    Direction::Buy
                } else {
                    Direction::Sell
                };
                order(quantity, direction)
            }
            SignalType::Extend => {
                // The opening fill is the unit size; later fills may have reduced it.
                let (quantity, direction) = portfolio
                    .get_first_fill_event(symbol)?
                    .map(|fill| (fill.quantity, fill.direction))
                    .ok_or_else(|| Error::NoOpenPosition {
                        symbol: symbol.clone(),
                        signal_type,
                    })?;

                if !portfolio.is_affordable(symbol, quantity)? {
                    return Ok(Decision::NoTrade(NoTradeReason::Unaffordable));
                }
                order(quantity, direction)
            }
            SignalType::Close => {
                let position = portfolio.get_position(symbol)?;
                if position == 0 {
                    return Ok(Decision::NoTrade(NoTradeReason::FlatPosition));
                }

                // Reducing risk is always allowed: no affordability check.
                let held = if position > 0 { Direction::Buy } else { Direction::Sell };
                order(position.unsigned_abs(), held.opposite())
            }
            SignalType::Lighten => Ok(Decision::Unsupported(signal_type)),
        }
    }
}

impl<P> RiskManager for TurtleRiskManager<P>
where
    P: PortfolioView + Send + Sync,
{
    fn name(&self) -> &'static str {
        "TurtleRiskManager"
    }

    fn on_signal(&self, event: &SignalEvent) -> Result<SignalReport> {
        // Held for the whole batch: fills cannot land between two reads.
        let portfolio = self.portfolio.read().map_err(|_| Error::PoisonedPortfolio)?;
        let total = portfolio.total();

        let mut close_orders = Vec::new();
        let mut other_orders = Vec::new();
        let mut outcomes = Vec::with_capacity(event.signals.len());

        for signal in &event.signals {
            let result = match self.decide(signal, event, total, &portfolio) {
                Err(e) if !e.is_precondition() => return Err(e),
                result => result,
            };

            match &result {
                Ok(Decision::Order(order)) => {
                    tracing::info!(
                        symbol = %order.symbol(),
                        signal_type = %signal.signal_type,
                        direction = %order.direction(),
                        quantity = order.quantity(),
                        "Order sized."
                    );
                    if signal.signal_type == SignalType::Close {
                        close_orders.push(order.clone());
                    } else {
                        other_orders.push(order.clone());
                    }
                }
                Ok(Decision::NoTrade(reason)) => {
                    tracing::debug!(
                        symbol = %signal.symbol,
                        signal_type = %signal.signal_type,
                        %reason,
                        "No trade."
                    );
                }
                Ok(Decision::Unsupported(kind)) => {
                    tracing::warn!(
                        symbol = %signal.symbol,
                        signal_type = %kind,
                        "Signal type is not supported, skipping."
                    );
                }
                Err(e) => {
                    tracing::warn!(symbol = %signal.symbol, error = %e, "Signal rejected.");
                }
            }

            outcomes.push(SignalOutcome {
                symbol: signal.symbol.clone(),
                signal_type: signal.signal_type,
                result,
            });
        }
        drop(portfolio);

        // Exits first so they free capital before new units are considered.
        self.events
            .push_all(close_orders.into_iter().chain(other_orders))?;

        Ok(SignalReport {
            timestamp: event.timestamp,
            outcomes,
        })
    }
}

/// The largest lot-aligned quantity whose notional stays within the unit's
/// risk budget: `trunc(total * risk_fraction / atr / (lot_size * price)) * lot_size`.
///
/// Returns 0 when the budget does not cover one lot or any input is degenerate.
pub fn unit_quantity(
    total: Decimal,
    risk_fraction: Decimal,
    atr: Decimal,
    lot_size: u64,
    price: Decimal,
) -> u64 {
    let one_lot = Decimal::from(lot_size) * price;
    if atr <= Decimal::ZERO || one_lot <= Decimal::ZERO {
        return 0;
    }
    let Some(available) = total
        .checked_mul(risk_fraction)
        .and_then(|budget| budget.checked_div(atr))
    else {
        return 0;
    };
    let Some(mut lots) = available
        .checked_div(one_lot)
        .and_then(|lots| lots.trunc().to_u64())
    else {
        return 0;
    };

    // Decimal division rounds at 28 digits; never let that round up past the budget.
    while lots > 0 && Decimal::from(lots) * one_lot > available {
        lots -= 1;
    }
    lots.checked_mul(lot_size).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use core_types::{Bar, SignalAttr, Symbol};
    use data::HistoricDataHandler;
    use events::{Event, FillEvent};
    use portfolio::Portfolio;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn bar(close: Decimal) -> Bar {
        Bar {
            timestamp: ts(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(10_000),
            atr: None,
        }
    }

    /// X: lot 100 @ 50, Y: lot 100 @ 10, Z: lot 50 @ 20.
    fn data() -> Arc<HistoricDataHandler> {
        let mut data = HistoricDataHandler::new();
        data.insert_series(Symbol::new("X"), 100, vec![bar(dec!(50))]).unwrap();
        data.insert_series(Symbol::new("Y"), 100, vec![bar(dec!(10))]).unwrap();
        data.insert_series(Symbol::new("Z"), 50, vec![bar(dec!(20))]).unwrap();
        data.update_bars(&EventChannel::new()).unwrap();
        Arc::new(data)
    }

    struct Fixture {
        portfolio: Arc<RwLock<Portfolio>>,
        channel: Arc<EventChannel>,
        manager: TurtleRiskManager<Portfolio>,
    }

    fn fixture(capital: Decimal) -> Fixture {
        let data = data();
        let portfolio = Portfolio::new(data.clone(), capital).into_shared();
        let channel = Arc::new(EventChannel::new());
        let manager = TurtleRiskManager::new(
            portfolio.clone(),
            data,
            channel.clone(),
            TurtleRiskSettings::default(),
        )
        .unwrap();
        Fixture {
            portfolio,
            channel,
            manager,
        }
    }

    fn fill(symbol: &str, direction: Direction, quantity: u64, price: Decimal) -> FillEvent {
        FillEvent {
            timestamp: ts(),
            symbol: Symbol::new(symbol),
            quantity,
            direction,
            fill_price: price,
            commission: Decimal::ZERO,
            attr: SignalAttr::default(),
        }
    }

    fn signal(symbol: &str, signal_type: SignalType, atr: Option<Decimal>) -> Signal {
        let attr = SignalAttr {
            atr,
            ..SignalAttr::default()
        };
        Signal::new(symbol, signal_type, ts(), attr)
    }

    fn batch(signals: Vec<Signal>) -> SignalEvent {
        SignalEvent::new(ts(), signals)
    }

    fn drain(channel: &EventChannel) -> Vec<OrderEvent> {
        std::iter::from_fn(|| channel.try_pop())
            .map(|event| match event {
                Event::Order(order) => order,
                other => panic!("unexpected event {other:?}"),
            })
            .collect()
    }

    #[test]
    fn open_below_one_lot_emits_nothing() {
        // available = 100000 * 0.01 / 2 = 500, one lot = 100 * 50 = 5000
        let f = fixture(dec!(100_000));
        let report = f
            .manager
            .on_signal(&batch(vec![signal("X", SignalType::OpenLong, Some(dec!(2.0)))]))
            .unwrap();

        assert_eq!(report.orders_emitted(), 0);
        assert_eq!(report.no_trades(), 1);
        assert!(matches!(
            report.outcomes[0].result,
            Ok(Decision::NoTrade(NoTradeReason::ZeroQuantity))
        ));
        assert!(f.channel.is_empty());
    }

    #[test]
    fn open_long_buys_whole_lots_within_budget() {
        // available = 1000000 * 0.01 / 1 = 10000, one lot = 100 * 10 = 1000
        let f = fixture(dec!(1_000_000));
        let mut attr = SignalAttr::with_atr(dec!(1.0)).insert("rule_id", "TurtleStrategy");
        attr.extra.insert("index".into(), 7.into());
        let open = Signal::new("Y", SignalType::OpenLong, ts(), attr.clone());

        f.manager.on_signal(&batch(vec![open])).unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].symbol(), &Symbol::new("Y"));
        assert_eq!(orders[0].direction(), Direction::Buy);
        assert_eq!(orders[0].quantity(), 1000);
        assert_eq!(orders[0].order_type(), core_types::OrderType::Market);
        assert_eq!(orders[0].attr(), &attr);
        assert_eq!(orders[0].timestamp(), ts());
    }

    #[test]
    fn open_short_sells() {
        let f = fixture(dec!(1_000_000));
        f.manager
            .on_signal(&batch(vec![signal("Y", SignalType::OpenShort, Some(dec!(1)))]))
            .unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders[0].direction(), Direction::Sell);
        assert_eq!(orders[0].quantity(), 1000);
    }

    #[test]
    fn unaffordable_open_is_a_no_trade() {
        // atr 0.001 sizes 100000 shares of Y (1,000,000 notional) against 100,000 cash.
        let f = fixture(dec!(100_000));
        let report = f
            .manager
            .on_signal(&batch(vec![signal("Y", SignalType::OpenLong, Some(dec!(0.001)))]))
            .unwrap();

        assert!(matches!(
            report.outcomes[0].result,
            Ok(Decision::NoTrade(NoTradeReason::Unaffordable))
        ));
        assert_eq!(report.rejected(), 0);
        assert!(f.channel.is_empty());
    }

    #[test]
    fn extend_mirrors_the_opening_fill() {
        let f = fixture(dec!(1_000_000));
        f.portfolio
            .write()
            .unwrap()
            .on_fill(&fill("Y", Direction::Sell, 300, dec!(10)))
            .unwrap();

        f.manager
            .on_signal(&batch(vec![signal("Y", SignalType::Extend, Some(dec!(1)))]))
            .unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].direction(), Direction::Sell);
        assert_eq!(orders[0].quantity(), 300);
    }

    #[test]
    fn extend_without_a_position_is_rejected() {
        let f = fixture(dec!(1_000_000));
        let report = f
            .manager
            .on_signal(&batch(vec![signal("Y", SignalType::Extend, None)]))
            .unwrap();

        assert_eq!(report.rejected(), 1);
        assert!(matches!(
            report.outcomes[0].result,
            Err(Error::NoOpenPosition { .. })
        ));
    }

    #[test]
    fn close_flattens_the_net_position() {
        let f = fixture(dec!(1_000_000));
        f.portfolio
            .write()
            .unwrap()
            .on_fill(&fill("X", Direction::Buy, 400, dec!(50)))
            .unwrap();

        f.manager
            .on_signal(&batch(vec![signal("X", SignalType::Close, None)]))
            .unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].direction(), Direction::Sell);
        assert_eq!(orders[0].quantity(), 400);
    }

    fn partly_reduced_long() -> Fixture {
        // Long 400 X, then 100 sold back: 300 left, latest fill is a Sell.
        let f = fixture(dec!(1_000_000));
        {
            let mut portfolio = f.portfolio.write().unwrap();
            portfolio.on_fill(&fill("X", Direction::Buy, 400, dec!(50))).unwrap();
            portfolio.on_fill(&fill("X", Direction::Sell, 100, dec!(50))).unwrap();
        }
        f
    }

    #[test]
    fn close_after_a_partial_reduction_sells_the_rest() {
        let f = partly_reduced_long();

        f.manager
            .on_signal(&batch(vec![signal("X", SignalType::Close, None)]))
            .unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].direction(), Direction::Sell);
        assert_eq!(orders[0].quantity(), 300);
    }

    #[test]
    fn extend_after_a_partial_reduction_adds_to_the_long() {
        let f = partly_reduced_long();

        f.manager
            .on_signal(&batch(vec![signal("X", SignalType::Extend, None)]))
            .unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].direction(), Direction::Buy);
        assert_eq!(orders[0].quantity(), 400);
    }

    #[test]
    fn close_skips_the_affordability_check() {
        // 1,000 cash cannot buy back 400 X @ 50, the close still goes out.
        let f = fixture(dec!(1_000));
        f.portfolio
            .write()
            .unwrap()
            .on_fill(&fill("X", Direction::Sell, 400, dec!(50)))
            .unwrap();
        f.portfolio
            .write()
            .unwrap()
            .on_fill(&fill("Y", Direction::Buy, 2000, dec!(10)))
            .unwrap();

        f.manager
            .on_signal(&batch(vec![signal("X", SignalType::Close, None)]))
            .unwrap();

        let orders = drain(&f.channel);
        assert_eq!(orders[0].direction(), Direction::Buy);
        assert_eq!(orders[0].quantity(), 400);
    }

    #[test]
    fn close_on_a_flat_symbol_is_a_no_trade() {
        let f = fixture(dec!(1_000_000));
        let report = f
            .manager
            .on_signal(&batch(vec![signal("X", SignalType::Close, None)]))
            .unwrap();

        assert!(matches!(
            report.outcomes[0].result,
            Ok(Decision::NoTrade(NoTradeReason::FlatPosition))
        ));
    }

    #[test]
    fn lighten_is_reported_as_unsupported() {
        let f = fixture(dec!(1_000_000));
        let report = f
            .manager
            .on_signal(&batch(vec![signal("X", SignalType::Lighten, Some(dec!(1)))]))
            .unwrap();

        assert_eq!(report.unsupported(), 1);
        assert_eq!(report.rejected(), 0);
        assert_eq!(report.no_trades(), 0);
        assert!(f.channel.is_empty());
    }

    #[test]
    fn closes_are_pushed_before_opens_and_extends() {
        let f = fixture(dec!(1_000_000));
        {
            let mut portfolio = f.portfolio.write().unwrap();
            portfolio.on_fill(&fill("X", Direction::Buy, 400, dec!(50))).unwrap();
            portfolio.on_fill(&fill("Z", Direction::Buy, 100, dec!(20))).unwrap();
        }

        let report = f
            .manager
            .on_signal(&batch(vec![
                signal("Y", SignalType::OpenLong, Some(dec!(1))),
                signal("Z", SignalType::Extend, Some(dec!(1))),
                signal("X", SignalType::Close, None),
            ]))
            .unwrap();

        let pushed: Vec<_> = drain(&f.channel)
            .iter()
            .map(|o| (o.symbol().0.clone(), o.direction()))
            .collect();
        assert_eq!(
            pushed,
            vec![
                ("X".to_string(), Direction::Sell),
                ("Y".to_string(), Direction::Buy),
                ("Z".to_string(), Direction::Buy),
            ]
        );
        // The report keeps signal order.
        let reported: Vec<_> = report.orders().map(|o| o.symbol().0.clone()).collect();
        assert_eq!(reported, vec!["Y", "Z", "X"]);
    }

    #[test]
    fn bad_signals_do_not_stop_the_batch() {
        let f = fixture(dec!(1_000_000));
        let report = f
            .manager
            .on_signal(&batch(vec![
                signal("Y", SignalType::OpenLong, None),
                signal("Y", SignalType::OpenLong, Some(Decimal::ZERO)),
                signal("NOPE", SignalType::OpenShort, Some(dec!(1))),
                signal("Y", SignalType::OpenLong, Some(dec!(1))),
            ]))
            .unwrap();

        assert_eq!(report.rejected(), 3);
        assert_eq!(report.orders_emitted(), 1);
        assert!(matches!(report.outcomes[0].result, Err(Error::InvalidAtr { atr: None, .. })));
        assert!(matches!(report.outcomes[1].result, Err(Error::InvalidAtr { .. })));
        assert!(matches!(report.outcomes[2].result, Err(Error::MarketData { .. })));
        assert_eq!(drain(&f.channel).len(), 1);
    }

    #[test]
    fn identical_inputs_give_identical_orders() {
        let signals = || {
            batch(vec![
                signal("Y", SignalType::OpenLong, Some(dec!(1.3))),
                signal("Z", SignalType::OpenShort, Some(dec!(0.7))),
            ])
        };
        let first = fixture(dec!(2_500_000));
        let second = fixture(dec!(2_500_000));
        first.manager.on_signal(&signals()).unwrap();
        second.manager.on_signal(&signals()).unwrap();

        let a = serde_json::to_string(&drain(&first.channel)).unwrap();
        let b = serde_json::to_string(&drain(&second.channel)).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn invalid_risk_fraction_is_refused() {
        let data = data();
        let portfolio = Portfolio::new(data.clone(), dec!(1)).into_shared();
        let result = TurtleRiskManager::new(
            portfolio,
            data,
            Arc::new(EventChannel::new()),
            TurtleRiskSettings {
                risk_fraction: dec!(1.5),
            },
        );
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }

    /// Answers every query with an error, like a portfolio fed a malformed symbol.
    struct BrokenPortfolio;

    impl PortfolioView for BrokenPortfolio {
        fn total(&self) -> Decimal {
            dec!(1_000_000)
        }

        fn get_position(&self, symbol: &Symbol) -> portfolio::Result<i64> {
            Err(portfolio::Error::UnknownSymbol(symbol.0.clone()))
        }

        fn get_first_fill_event(&self, symbol: &Symbol) -> portfolio::Result<Option<&FillEvent>> {
            Err(portfolio::Error::UnknownSymbol(symbol.0.clone()))
        }

        fn get_last_fill_event(&self, symbol: &Symbol) -> portfolio::Result<Option<&FillEvent>> {
            Err(portfolio::Error::UnknownSymbol(symbol.0.clone()))
        }

        fn is_affordable(&self, symbol: &Symbol, _quantity: u64) -> portfolio::Result<bool> {
            Err(portfolio::Error::UnknownSymbol(symbol.0.clone()))
        }
    }

    #[test]
    fn portfolio_failures_abort_the_batch() {
        let channel = Arc::new(EventChannel::new());
        let manager = TurtleRiskManager::new(
            Arc::new(RwLock::new(BrokenPortfolio)),
            data(),
            channel.clone(),
            TurtleRiskSettings::default(),
        )
        .unwrap();

        let result = manager.on_signal(&batch(vec![
            signal("X", SignalType::Lighten, None),
            signal("Y", SignalType::OpenLong, Some(dec!(1))),
        ]));

        assert!(matches!(result, Err(Error::Portfolio(_))));
        assert!(channel.is_empty());
    }

    #[test]
    fn unit_quantity_worked_examples() {
        assert_eq!(unit_quantity(dec!(100_000), dec!(0.01), dec!(2), 100, dec!(50)), 0);
        assert_eq!(unit_quantity(dec!(1_000_000), dec!(0.01), dec!(1), 100, dec!(10)), 1000);
        assert_eq!(unit_quantity(dec!(-5), dec!(0.01), dec!(1), 100, dec!(10)), 0);
        assert_eq!(unit_quantity(dec!(1_000), dec!(0.01), dec!(1), 1, Decimal::ZERO), 0);
    }

    proptest! {
        #[test]
        fn unit_quantity_is_lot_aligned_and_within_budget(
            total_cents in 0u64..10_000_000_000,
            atr_milli in 1u64..100_000,
            lot_size in 1u64..5_000,
            price_cents in 1u64..1_000_000,
        ) {
            let total = Decimal::new(total_cents as i64, 2);
            let atr = Decimal::new(atr_milli as i64, 3);
            let price = Decimal::new(price_cents as i64, 2);
            let risk_fraction = dec!(0.01);

            let quantity = unit_quantity(total, risk_fraction, atr, lot_size, price);

            prop_assert_eq!(quantity % lot_size, 0);
            let budget = total * risk_fraction / atr;
            prop_assert!(Decimal::from(quantity) * price <= budget);
            // Largest such quantity: one more lot would exceed the budget.
            prop_assert!(Decimal::from(quantity + lot_size) * price > budget);
        }
    }
}
