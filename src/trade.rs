use crate::{market::Market, order::OrderId, sequence::IncrementalSequence};
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display, From};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Unique identifier for a simulated own-[`Trade`], assigned by a counter the marketplace
/// advances on every fill.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Deserialize, Serialize,
)]
pub struct TradeId(pub SmolStr);

impl TradeId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }
}

/// An own-trade generated by matching a simulated order against a candle.
///
/// Sign convention: positive `quantity` is a buy, negative is a sell.
#[derive(Debug, Clone, PartialEq, Constructor, Deserialize, Serialize)]
pub struct Trade {
    pub id: TradeId,
    pub time: DateTime<Utc>,
    pub market: Market,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fees: Decimal,
    pub order_id: Option<OrderId>,
}

impl Trade {
    pub fn is_buy(&self) -> bool {
        self.quantity.is_sign_positive() && !self.quantity.is_zero()
    }

    pub fn value_quote(&self) -> Decimal {
        self.price * self.quantity.abs()
    }
}

/// Append-only sequence of [`Trade`]s, ordered within the segment by `(time, insertion
/// order)`. Every trade's `time` is `>= start`.
#[derive(Debug, Clone)]
pub struct TradeHistorySegment {
    start: DateTime<Utc>,
    trades: IncrementalSequence<Trade>,
}

impl TradeHistorySegment {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            trades: IncrementalSequence::new(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn trades(&self) -> &[Trade] {
        self.trades.as_slice()
    }

    pub fn sequence(&self) -> &IncrementalSequence<Trade> {
        &self.trades
    }

    /// # Panics
    /// Panics if `trade.time < self.start`.
    pub fn push(&mut self, trade: Trade) {
        assert!(
            trade.time >= self.start,
            "trade time precedes TradeHistorySegment start"
        );
        self.trades = self.trades.appended(trade);
    }

    pub fn with_appended(&self, trade: Trade) -> Self {
        let mut next = self.clone();
        next.push(trade);
        next
    }
}
