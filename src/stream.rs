//! Merges per-input timed event streams into a single monotonic replay timeline, via a
//! min-heap keyed by `(time, inputKind, inputKey)`.

use crate::{
    candle::CandleHistorySegment, eval::IncrementalContext, input::Input,
    trade::TradeHistorySegment,
};
use chrono::{DateTime, TimeDelta, Utc};
use std::{
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
};

/// A single `(time, input, value)` event, ready to be applied to an [`IncrementalContext`].
pub struct TimedInputEvent {
    pub time: DateTime<Utc>,
    pub input: Input,
    apply: Box<dyn FnOnce(&mut IncrementalContext) + Send>,
}

impl TimedInputEvent {
    fn new<T: Send + Sync + 'static>(time: DateTime<Utc>, input: Input, value: T) -> Self {
        let bound_input = input.clone();
        Self {
            time,
            input,
            apply: Box::new(move |ctx| ctx.update_input(bound_input, value)),
        }
    }

    /// Binds this event's value into `ctx`.
    pub fn apply(self, ctx: &mut IncrementalContext) {
        (self.apply)(ctx)
    }
}

struct HeapEntry(TimedInputEvent);

impl HeapEntry {
    fn sort_key(&self) -> (DateTime<Utc>, u8, &Input) {
        (self.0.time, self.0.input.kind_rank(), &self.0.input)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Finite, strictly time-monotonic merge of the `TimeInput`, `CandleHistoryInput`, and
/// `TradeHistoryInput` event streams over a simulation interval.
///
/// `SimulatedOpenOrdersInput`, `OrderSnapshotHistoryInput`, and
/// `CompletedOperationRequestsInSession` are not loader-driven - marketplaces and the
/// environment write them directly during a tick - so they never appear here.
pub struct TimedInputUpdateStream {
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl TimedInputUpdateStream {
    pub fn builder(start: DateTime<Utc>, end: DateTime<Utc>) -> TimedInputUpdateStreamBuilder {
        TimedInputUpdateStreamBuilder {
            start,
            end,
            heap: BinaryHeap::new(),
        }
    }

    /// Pops the next event in `(time, inputKind, inputKey)` order, if any remain.
    pub fn pop(&mut self) -> Option<TimedInputEvent> {
        self.heap.pop().map(|Reverse(entry)| entry.0)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

pub struct TimedInputUpdateStreamBuilder {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl TimedInputUpdateStreamBuilder {
    /// Emits a `TimeInput(resolution)` event at every multiple of `resolution` in `[start,
    /// end]`.
    pub fn with_time_input(mut self, resolution: TimeDelta) -> Self {
        let input = Input::TimeInput { resolution };
        let mut time = self.start;
        while time <= self.end {
            self.push(TimedInputEvent::new(time, input.clone(), time));
            time += resolution;
        }
        self
    }

    /// Emits one cumulative `CandleHistoryInput` event per candle in `segment`, at each
    /// candle's close time.
    pub fn with_candle_history(
        mut self,
        market: crate::market::Market,
        candle_length: TimeDelta,
        start: DateTime<Utc>,
        segment: CandleHistorySegment,
    ) -> Self {
        let input = Input::CandleHistoryInput {
            market,
            candle_length,
            start,
        };

        let mut cumulative = CandleHistorySegment::new(segment.start(), segment.length());
        for candle in segment.candles() {
            cumulative.push(*candle);
            let close_time = candle.close_time();
            if close_time < self.start || close_time > self.end {
                continue;
            }
            self.push(TimedInputEvent::new(close_time, input.clone(), cumulative.clone()));
        }
        self
    }

    /// Emits one cumulative `TradeHistoryInput` event per trade in `segment`, at the trade's
    /// own time.
    pub fn with_trade_history(
        mut self,
        market: crate::market::Market,
        start: DateTime<Utc>,
        segment: TradeHistorySegment,
    ) -> Self {
        let input = Input::TradeHistoryInput { market, start };

        let mut cumulative = TradeHistorySegment::new(segment.start());
        for trade in segment.trades() {
            cumulative.push(trade.clone());
            if trade.time < self.start || trade.time > self.end {
                continue;
            }
            self.push(TimedInputEvent::new(trade.time, input.clone(), cumulative.clone()));
        }
        self
    }

    fn push(&mut self, event: TimedInputEvent) {
        self.heap.push(Reverse(HeapEntry(event)));
    }

    pub fn build(self) -> TimedInputUpdateStream {
        TimedInputUpdateStream { heap: self.heap }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ExchangeId, Market};

    #[test]
    fn events_are_strictly_time_ordered_with_stable_tie_break() {
        let start = DateTime::UNIX_EPOCH;
        let end = start + TimeDelta::seconds(10);

        let stream = TimedInputUpdateStream::builder(start, end)
            .with_time_input(TimeDelta::seconds(5))
            .build();

        let mut stream = stream;
        let mut times = Vec::new();
        while let Some(event) = stream.pop() {
            times.push(event.time);
        }

        assert_eq!(
            times,
            vec![
                start,
                start + TimeDelta::seconds(5),
                start + TimeDelta::seconds(10),
            ]
        );
    }

    #[test]
    fn candle_history_events_carry_cumulative_segment() {
        use crate::candle::Candle;
        use rust_decimal_macros::dec;

        let start = DateTime::UNIX_EPOCH;
        let len = TimeDelta::minutes(1);
        let market = Market::new_simple(ExchangeId::Binance, "btc", "usdt");

        let mut segment = CandleHistorySegment::new(start, len);
        segment.push(Candle::new(start, dec!(1), dec!(1), dec!(1), dec!(1), dec!(1), len));
        segment.push(Candle::new(start + len, dec!(2), dec!(2), dec!(2), dec!(2), dec!(1), len));

        let mut stream = TimedInputUpdateStream::builder(start, start + len * 2)
            .with_candle_history(market, len, start, segment)
            .build();

        let first = stream.pop().unwrap();
        assert_eq!(first.time, start + len);

        let mut ctx = IncrementalContext::new();
        let input = first.input.clone();
        first.apply(&mut ctx);
        let bound: CandleHistorySegment = ctx.read_input(&input).unwrap();
        assert_eq!(bound.candles().len(), 1);
    }
}
