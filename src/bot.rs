//! The black-box collaborator that turns the current context into order operations and chart
//! metrics, generalising the teacher's trait-per-concern strategy style
//! (`AlgoStrategy`/`ClosePositionsStrategy`) into the single evaluation entrypoint this core
//! needs, rather than copying the live-engine-specific traits verbatim.

use crate::{
    error::ContextError,
    eval::IncrementalContext,
    logger::ChartDataSeriesConfig,
    market::Market,
    order::OrderId,
};
use chrono::TimeDelta;
use rust_decimal::Decimal;

/// A request to place or cancel an order, submitted by a [`Bot`] on every tick.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOperation {
    Place {
        market: Market,
        price: Decimal,
        quantity: Decimal,
    },
    Cancel {
        market: Market,
        order_id: OrderId,
        absolute_rest_quantity: Option<Decimal>,
    },
}

/// The result of one [`Bot::eval`] call: the operations to submit this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotEval {
    pub operations: Vec<OrderOperation>,
}

/// Supplied by an external factory; drives order placement by reading the current context.
///
/// `eval` is re-invoked once per tick after the marketplace has applied the tick's input
/// update, per the ordering in `SimulationEnvironment::advance`.
pub trait Bot: Send + Sync {
    fn markets(&self) -> Vec<Market>;

    fn basic_candle_length(&self) -> TimeDelta;

    fn chart_data_series_configs(&self) -> Vec<ChartDataSeriesConfig>;

    fn eval(&self, ctx: &mut IncrementalContext) -> Result<BotEval, ContextError>;
}
