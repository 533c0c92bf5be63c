//! Owns the context, the per-market marketplaces, and the order tracking states; drives the
//! replay loop one tick at a time. Grounded on the teacher's split between shared setup
//! (`BacktestArgsConstant`) and the per-run driving logic (`backtest()`), generalized from a
//! one-shot async function into a steppable `advance()` loop.

use crate::{
    bot::{Bot, OrderOperation},
    candle::CandleHistorySegment,
    error::SimulationError,
    eval::{Eval, IncrementalContext},
    input::Input,
    logger::ChartDataLogger,
    market::Market,
    marketplace::CandleSimulatorMarketplace,
    order::{Order, OrderId},
    sequence::IncrementalSequence,
    stream::TimedInputUpdateStream,
    trade::{Trade, TradeHistorySegment},
    tracking::{BasicOrderTrackingState, OrderTrackingEvent},
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// A marketplace paired with the `Input` it owns for its own-trade history - the only
/// per-market metadata the environment needs beyond the marketplace itself.
struct MarketEntry {
    marketplace: CandleSimulatorMarketplace,
    trade_history_input: Input,
}

/// Drives a deterministic replay of a [`TimedInputUpdateStream`] against a [`Bot`], per tick:
/// apply the input update, let marketplaces match any orders newly in range, re-evaluate the
/// bot, dispatch its order operations, and snapshot the chart data logger - all sharing the
/// tick's timestamp.
pub struct SimulationEnvironment {
    context: IncrementalContext,
    markets: IndexMap<Market, MarketEntry>,
    stream: TimedInputUpdateStream,
    bot: Box<dyn Bot>,
    logger: ChartDataLogger,
    tracking: IndexMap<OrderId, BasicOrderTrackingState>,
    operation_log: IncrementalSequence<OrderOperation>,
}

impl SimulationEnvironment {
    pub fn builder(stream: TimedInputUpdateStream, bot: Box<dyn Bot>) -> SimulationEnvironmentBuilder {
        let configs = bot.chart_data_series_configs();
        SimulationEnvironmentBuilder {
            stream,
            bot,
            configs,
            markets: IndexMap::new(),
        }
    }

    pub fn evaluate<E: Eval>(&mut self, eval: &E) -> Result<E::Output, SimulationError> {
        self.context.evaluate(eval).map_err(SimulationError::Context)
    }

    pub fn tracking_state(&self, order_id: &OrderId) -> Option<&BasicOrderTrackingState> {
        self.tracking.get(order_id)
    }

    pub fn tracking_state_iter(&self) -> impl Iterator<Item = &BasicOrderTrackingState> {
        self.tracking.values()
    }

    pub fn logger(&self) -> &ChartDataLogger {
        &self.logger
    }

    /// Consumes and applies the next timed event. Returns `false` once the stream is
    /// exhausted.
    pub fn advance(&mut self) -> Result<bool, SimulationError> {
        let Some(event) = self.stream.pop() else {
            return Ok(false);
        };
        let time = event.time;
        let input = event.input.clone();
        event.apply(&mut self.context);
        debug!(?input, %time, "applied timed input update");

        if let Input::CandleHistoryInput { market, .. } = &input {
            self.on_candle_history_update(market.clone(), &input)?;
        }

        let bot_eval = self.bot.eval(&mut self.context).map_err(SimulationError::Context)?;
        for operation in bot_eval.operations {
            self.operation_log = self.operation_log.appended(operation.clone());
            self.dispatch_operation(operation, time);
        }
        self.context.update_input(
            Input::CompletedOperationRequestsInSession,
            self.operation_log.clone(),
        );

        Ok(true)
    }

    fn on_candle_history_update(&mut self, market: Market, input: &Input) -> Result<(), SimulationError> {
        let segment: CandleHistorySegment = self
            .context
            .read_input(input)
            .map_err(SimulationError::Context)?;
        let Some(candle) = segment.sequence().last().copied() else {
            return Ok(());
        };

        let events = match self.markets.get_mut(&market) {
            Some(entry) => entry.marketplace.process_candle(&candle),
            None => return Ok(()),
        };
        self.apply_tracking_events(&market, events);

        self.logger
            .on_candle_close(&market, candle.start_time, candle.close_time(), &mut self.context)
            .map_err(SimulationError::Context)?;
        Ok(())
    }

    fn dispatch_operation(&mut self, operation: OrderOperation, time: DateTime<Utc>) {
        match operation {
            OrderOperation::Place { market, price, quantity } => {
                let result = match self.markets.get_mut(&market) {
                    Some(entry) => entry.marketplace.place_order(price, quantity, time),
                    None => {
                        warn!(%market, "bot placed an order on an unconfigured market");
                        return;
                    }
                };
                match result {
                    Ok((order, events)) => {
                        let events = events.into_iter().map(|event| (order.id.clone(), event)).collect();
                        self.apply_tracking_events(&market, events);
                    }
                    Err(err) => warn!(%err, "place_order rejected"),
                }
            }
            OrderOperation::Cancel { market, order_id, absolute_rest_quantity } => {
                let result = match self.markets.get_mut(&market) {
                    Some(entry) => entry.marketplace.cancel_order(&order_id, time, absolute_rest_quantity),
                    None => {
                        warn!(%market, "bot cancelled an order on an unconfigured market");
                        return;
                    }
                };
                match result {
                    Ok(events) => {
                        let events = events.into_iter().map(|event| (order_id.clone(), event)).collect();
                        self.apply_tracking_events(&market, events);
                    }
                    Err(err) => warn!(%err, "cancel_order rejected"),
                }
            }
        }
    }

    /// Folds marketplace-generated events into per-order tracking state, and refreshes the
    /// `SimulatedOpenOrdersInput`/`TradeHistoryInput` bindings the marketplace owns.
    fn apply_tracking_events(&mut self, market: &Market, events: Vec<(OrderId, OrderTrackingEvent)>) {
        for (order_id, event) in events {
            if let OrderTrackingEvent::NewTrade { trade } = &event {
                self.append_trade_history(market, trade.clone());
            }
            self.tracking
                .entry(order_id.clone())
                .or_insert_with(|| BasicOrderTrackingState::new(order_id))
                .apply(event);
        }

        let Some(open_orders) = self
            .markets
            .get(market)
            .map(|entry| entry.marketplace.open_orders().cloned().collect::<Vec<Order>>())
        else {
            return;
        };
        self.context.update_input(
            Input::SimulatedOpenOrdersInput { market: market.clone() },
            open_orders,
        );
    }

    fn append_trade_history(&mut self, market: &Market, trade: Trade) {
        let Some(input) = self
            .markets
            .get(market)
            .map(|entry| entry.trade_history_input.clone())
        else {
            return;
        };
        let mut segment: TradeHistorySegment = self
            .context
            .read_input(&input)
            .unwrap_or_else(|_| TradeHistorySegment::new(trade.time));
        segment.push(trade);
        self.context.update_input(input, segment);
    }
}

pub struct SimulationEnvironmentBuilder {
    stream: TimedInputUpdateStream,
    bot: Box<dyn Bot>,
    configs: Vec<crate::logger::ChartDataSeriesConfig>,
    markets: IndexMap<Market, MarketEntry>,
}

impl SimulationEnvironmentBuilder {
    /// Registers a marketplace for its market, along with the `start` its own-trade history
    /// input is keyed to.
    pub fn with_market(mut self, marketplace: CandleSimulatorMarketplace, trade_history_start: DateTime<Utc>) -> Self {
        let market = marketplace.market().clone();
        let trade_history_input = Input::TradeHistoryInput {
            market: market.clone(),
            start: trade_history_start,
        };
        self.markets.insert(market, MarketEntry { marketplace, trade_history_input });
        self
    }

    pub fn build(self) -> SimulationEnvironment {
        SimulationEnvironment {
            context: IncrementalContext::new(),
            markets: self.markets,
            stream: self.stream,
            logger: ChartDataLogger::new(self.configs),
            bot: self.bot,
            tracking: IndexMap::new(),
            operation_log: IncrementalSequence::new(),
        }
    }
}
