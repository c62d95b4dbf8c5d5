// In crates/engine/src/strategy.rs

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use core_types::{Signal, SignalAttr, SignalType};
use data::DataHandler;
use events::{MarketEvent, SignalEvent};
use rust_decimal::Decimal;
use serde::Deserialize;

/// The universal interface for a signal source.
///
/// A strategy looks at the market after every published bar and may answer
/// with one batch of signals for that bar.
pub trait Strategy: Send {
    /// The name of the strategy.
    fn name(&self) -> &'static str;

    fn on_market(&mut self, event: &MarketEvent, data: &dyn DataHandler) -> Option<SignalEvent>;
}

/// One row of a signal file: `timestamp,symbol,signal_type,atr`.
#[derive(Debug, Deserialize)]
struct SignalRecord {
    timestamp: String,
    symbol: String,
    signal_type: String,
    atr: Option<Decimal>,
}

/// Replays signals computed ahead of time, one batch per bar timestamp.
#[derive(Debug, Default)]
pub struct SignalReplay {
    pending: BTreeMap<DateTime<Utc>, Vec<Signal>>,
}

impl SignalReplay {
    pub fn new(signals: impl IntoIterator<Item = Signal>) -> Self {
        let mut pending: BTreeMap<DateTime<Utc>, Vec<Signal>> = BTreeMap::new();
        for signal in signals {
            pending.entry(signal.timestamp).or_default().push(signal);
        }
        Self { pending }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open signal file {}", path.display()))?;
        let replay = Self::from_reader(file)?;
        tracing::info!(path = %path.display(), signals = replay.remaining(), "Loaded signals.");
        Ok(replay)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> anyhow::Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut signals = Vec::new();
        for (line, record) in csv_reader.deserialize::<SignalRecord>().enumerate() {
            let record = record.with_context(|| format!("bad signal record #{}", line + 1))?;
            let signal_type: SignalType = record.signal_type.parse()?;
            let timestamp = data::parse_timestamp(&record.timestamp)?;
            let attr = SignalAttr {
                atr: record.atr,
                ..SignalAttr::default()
            };
            signals.push(Signal::new(record.symbol, signal_type, timestamp, attr));
        }
        Ok(Self::new(signals))
    }

    /// Signals not yet handed out.
    pub fn remaining(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }
}

impl Strategy for SignalReplay {
    fn name(&self) -> &'static str {
        "SignalReplay"
    }

    fn on_market(&mut self, event: &MarketEvent, _data: &dyn DataHandler) -> Option<SignalEvent> {
        // Anything stamped before this bar can no longer be delivered on time.
        let stale: Vec<_> = self.pending.range(..event.timestamp).map(|(ts, _)| *ts).collect();
        for ts in stale {
            if let Some(dropped) = self.pending.remove(&ts) {
                tracing::warn!(timestamp = %ts, count = dropped.len(), "Dropping signals with no matching bar.");
            }
        }

        let signals = self.pending.remove(&event.timestamp)?;
        Some(SignalEvent::new(event.timestamp, signals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use data::HistoricDataHandler;
    use rust_decimal_macros::dec;

    const SIGNALS: &str = "\
timestamp,symbol,signal_type,atr
2024-01-02,AAA,OpenLong,0.8
2024-01-02,BBB,OpenShort,1.2
2024-01-04,AAA,Close,
";

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn batches_signals_by_timestamp() {
        let mut replay = SignalReplay::from_reader(SIGNALS.as_bytes()).unwrap();
        let data = HistoricDataHandler::new();
        assert_eq!(replay.remaining(), 3);

        let first = replay
            .on_market(&MarketEvent { timestamp: day(2) }, &data)
            .unwrap();
        assert_eq!(first.signals.len(), 2);
        assert_eq!(first.signals[0].attr.atr, Some(dec!(0.8)));
        assert_eq!(first.signals[1].signal_type, SignalType::OpenShort);

        assert!(replay.on_market(&MarketEvent { timestamp: day(3) }, &data).is_none());

        let last = replay
            .on_market(&MarketEvent { timestamp: day(4) }, &data)
            .unwrap();
        assert_eq!(last.signals[0].signal_type, SignalType::Close);
        assert_eq!(last.signals[0].attr.atr, None);
        assert_eq!(replay.remaining(), 0);
    }

    #[test]
    fn drops_signals_that_missed_their_bar() {
        let mut replay = SignalReplay::from_reader(SIGNALS.as_bytes()).unwrap();
        let data = HistoricDataHandler::new();

        let batch = replay.on_market(&MarketEvent { timestamp: day(4) }, &data).unwrap();
        assert_eq!(batch.signals.len(), 1);
        assert_eq!(replay.remaining(), 0);
    }

    #[test]
    fn unknown_signal_types_fail_to_load() {
        let result = SignalReplay::from_reader("timestamp,symbol,signal_type,atr\n2024-01-02,AAA,Reverse,1\n".as_bytes());
        assert!(result.is_err());
    }
}
