// In crates/data/src/historic.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use core_types::{Bar, BarField, Symbol};
use events::{EventChannel, MarketEvent};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{DataHandler, Error, Result, parse_timestamp};

/// One row of a bar file: `symbol,timestamp,open,high,low,close,volume,atr`.
#[derive(Debug, Deserialize)]
struct BarRecord {
    symbol: String,
    timestamp: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    atr: Option<Decimal>,
}

/// Replays in-memory bar series for a backtest.
///
/// All series share one timeline (the union of their timestamps). Each call to
/// `update_bars` publishes the next timestamp; a symbol without a bar at that
/// timestamp keeps serving its previous bar.
#[derive(Debug, Default)]
pub struct HistoricDataHandler {
    series: BTreeMap<Symbol, Vec<Bar>>,
    lot_sizes: BTreeMap<Symbol, u64>,
    timeline: Vec<DateTime<Utc>>,
    /// Number of timeline entries published so far.
    published: AtomicUsize,
}

impl HistoricDataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the bars and lot size of one symbol.
    /// Bars are sorted by timestamp; the timeline is rebuilt.
    pub fn insert_series(&mut self, symbol: Symbol, lot_size: u64, mut bars: Vec<Bar>) -> Result<()> {
        if lot_size == 0 {
            return Err(Error::InvalidLotSize {
                symbol: symbol.0,
                lot_size,
            });
        }
        bars.sort_by_key(|bar| bar.timestamp);
        self.lot_sizes.insert(symbol.clone(), lot_size);
        self.series.insert(symbol, bars);
        self.rebuild_timeline();
        Ok(())
    }

    /// Loads a bar file. Every symbol in the file needs an entry in `lot_sizes`,
    /// otherwise it falls back to `default_lot_size`.
    pub fn from_csv(
        path: impl AsRef<Path>,
        lot_sizes: &BTreeMap<String, u64>,
        default_lot_size: u64,
    ) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let handler = Self::from_reader(file, lot_sizes, default_lot_size)?;
        tracing::info!(
            path = %path.as_ref().display(),
            symbols = handler.series.len(),
            bars = handler.timeline.len(),
            "Loaded historical bars."
        );
        Ok(handler)
    }

    pub fn from_reader<R: io::Read>(
        reader: R,
        lot_sizes: &BTreeMap<String, u64>,
        default_lot_size: u64,
    ) -> Result<Self> {
        let mut grouped: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        for record in csv_reader.deserialize::<BarRecord>() {
            let record = record?;
            let bar = Bar {
                timestamp: parse_timestamp(&record.timestamp)?,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
                atr: record.atr,
            };
            grouped.entry(record.symbol).or_default().push(bar);
        }

        let mut handler = Self::new();
        for (symbol, bars) in grouped {
            let lot_size = lot_sizes.get(&symbol).copied().unwrap_or(default_lot_size);
            handler.insert_series(Symbol(symbol), lot_size, bars)?;
        }
        Ok(handler)
    }

    fn rebuild_timeline(&mut self) {
        let stamps: BTreeSet<DateTime<Utc>> = self
            .series
            .values()
            .flat_map(|bars| bars.iter().map(|bar| bar.timestamp))
            .collect();
        self.timeline = stamps.into_iter().collect();
    }

    /// The timestamp of the most recently published bar.
    pub fn current_timestamp(&self) -> Option<DateTime<Utc>> {
        let published = self.published.load(Ordering::Acquire);
        published.checked_sub(1).and_then(|i| self.timeline.get(i).copied())
    }

    fn series(&self, symbol: &Symbol) -> Result<&[Bar]> {
        self.series
            .get(symbol)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownSymbol(symbol.0.clone()))
    }

    /// The published prefix of `symbol`'s series.
    fn visible(&self, symbol: &Symbol) -> Result<&[Bar]> {
        let bars = self.series(symbol)?;
        let Some(now) = self.current_timestamp() else {
            return Ok(&bars[..0]);
        };
        let end = bars.partition_point(|bar| bar.timestamp <= now);
        Ok(&bars[..end])
    }
}

impl DataHandler for HistoricDataHandler {
    fn symbols(&self) -> Vec<Symbol> {
        self.series.keys().cloned().collect()
    }

    fn get_lot_size(&self, symbol: &Symbol) -> Result<u64> {
        self.lot_sizes
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::UnknownSymbol(symbol.0.clone()))
    }

    fn get_latest_bar_value(&self, symbol: &Symbol, field: BarField) -> Result<Decimal> {
        let bar = self
            .visible(symbol)?
            .last()
            .ok_or_else(|| Error::NoData(symbol.0.clone()))?;
        bar.value(field).ok_or_else(|| Error::MissingField {
            symbol: symbol.0.clone(),
            field: format!("{field:?}"),
        })
    }

    fn get_latest_bars(&self, symbol: &Symbol, n: usize) -> Result<Vec<Bar>> {
        let visible = self.visible(symbol)?;
        let start = visible.len().saturating_sub(n);
        Ok(visible[start..].to_vec())
    }

    fn update_bars(&self, events: &EventChannel) -> Result<bool> {
        let published = self.published.load(Ordering::Acquire);
        let Some(&timestamp) = self.timeline.get(published) else {
            return Ok(false);
        };
        self.published.store(published + 1, Ordering::Release);
        tracing::debug!(%timestamp, index = published, "Publishing bar.");
        events.push(MarketEvent { timestamp })?;
        Ok(true)
    }

    fn continue_backtest(&self) -> bool {
        self.published.load(Ordering::Acquire) < self.timeline.len()
    }
}
