use crate::market::Market;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A typed identifier for an externally bound data source.
///
/// `Input` is its own key: the [`IncrementalContext`](crate::eval::context::IncrementalContext)
/// binds values by `Input` identity directly, and the timed update stream orders same-time
/// events by `(input.kind_rank(), input)`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum Input {
    /// Current simulated time, rounded down to `resolution`.
    TimeInput { resolution: TimeDelta },
    /// Append-only candle sequence for `market` at `candle_length`, starting at `start`.
    CandleHistoryInput {
        market: Market,
        candle_length: TimeDelta,
        start: DateTime<Utc>,
    },
    /// Append-only own-trade sequence for `market`, starting at `start`.
    TradeHistoryInput { market: Market, start: DateTime<Utc> },
    /// Set of currently open simulated orders for `market`.
    SimulatedOpenOrdersInput { market: Market },
    /// History of observed-order snapshots for `market`.
    OrderSnapshotHistoryInput { market: Market },
    /// Ordered sequence of operation requests completed so far in this simulation session.
    CompletedOperationRequestsInSession,
}

pub type InputKey = Input;

impl Input {
    /// A stable rank used to break ties between events with equal `time` in the timed update
    /// stream: a deterministic ordering keyed by `(inputKind, inputKey)`. Variant declaration
    /// order doubles as the kind order.
    pub fn kind_rank(&self) -> u8 {
        match self {
            Input::TimeInput { .. } => 0,
            Input::CandleHistoryInput { .. } => 1,
            Input::TradeHistoryInput { .. } => 2,
            Input::SimulatedOpenOrdersInput { .. } => 3,
            Input::OrderSnapshotHistoryInput { .. } => 4,
            Input::CompletedOperationRequestsInSession => 5,
        }
    }
}
