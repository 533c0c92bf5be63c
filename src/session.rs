//! Wires a [`SimulationConfig`], a [`Bot`], and an [`ExchangeConnectorProvider`] into a
//! ready-to-run [`SimulationEnvironment`] - the only place this core performs I/O: the
//! initial per-market candle/trade history fetch, each bounded by the configured loader
//! timeout. Grounded on the teacher's `backtest::run_backtests` entrypoint (`barter/src/
//! backtest/mod.rs`), which resolves its market-data/execution collaborators and fans the
//! resulting setup out with `futures::future::try_join_all` before driving the engine loop.

use crate::{
    bot::Bot,
    config::SimulationConfig,
    environment::SimulationEnvironment,
    error::{LoaderError, SimulationError},
    input::Input,
    loader::{with_loader_timeout, ExchangeConnector, ExchangeConnectorProvider},
    market::{ExchangeId, Market},
    marketplace::CandleSimulatorMarketplace,
    stream::TimedInputUpdateStream,
};
use futures::future::try_join_all;
use itertools::Itertools;
use std::{collections::HashMap, sync::Arc};

/// Resolves every market the bot trades to its [`ExchangeConnector`], loads each market's
/// candle and own-trade history concurrently, then assembles the [`TimedInputUpdateStream`]
/// and per-market [`CandleSimulatorMarketplace`]s a [`SimulationEnvironment`] needs to run.
///
/// Fails fast with [`SimulationError::Loader`] if any exchange has no configured connector or
/// any loader misses its timeout, and with [`SimulationError::Marketplace`] if a market's
/// exchange ends up without a resolved connector (defensive - `connector_by_exchange` is
/// built from the same market list, so this should be unreachable in practice).
pub async fn build_simulation_environment(
    config: &SimulationConfig,
    bot: Box<dyn Bot>,
    connector_provider: &dyn ExchangeConnectorProvider,
) -> Result<SimulationEnvironment, SimulationError> {
    let candle_length = bot.basic_candle_length();
    let markets: Vec<Market> = bot.markets().into_iter().unique().collect();

    let exchanges: Vec<ExchangeId> = markets.iter().map(|m| m.exchange).unique().collect();
    let connectors: Vec<Arc<dyn ExchangeConnector>> = try_join_all(
        exchanges
            .iter()
            .map(|&exchange_id| connector_provider.connector(exchange_id)),
    )
    .await?;
    let connector_by_exchange: HashMap<ExchangeId, Arc<dyn ExchangeConnector>> =
        exchanges.iter().copied().zip(connectors).collect();
    let supported_exchanges: Vec<ExchangeId> = connector_by_exchange.keys().copied().collect();

    let loaded = try_join_all(markets.iter().cloned().map(|market| {
        let connector = connector_by_exchange
            .get(&market.exchange)
            .expect("connector resolved for every exchange in `markets`")
            .clone();
        async move {
            let candles = with_loader_timeout(
                Input::CandleHistoryInput {
                    market: market.clone(),
                    candle_length,
                    start: config.simulation_start,
                },
                config.loader_timeout,
                connector.candle_history_loader().load(
                    &market,
                    candle_length,
                    config.simulation_start,
                    config.simulation_end,
                ),
            )
            .await?;
            let trades = with_loader_timeout(
                Input::TradeHistoryInput {
                    market: market.clone(),
                    start: config.simulation_start,
                },
                config.loader_timeout,
                connector.trade_history_loader().load_history(
                    &market,
                    config.simulation_start,
                    Some(config.simulation_end),
                ),
            )
            .await?;
            Ok::<_, LoaderError>((market, candles, trades))
        }
    }))
    .await?;

    let mut stream_builder =
        TimedInputUpdateStream::builder(config.simulation_start, config.simulation_end)
            .with_time_input(candle_length);
    for (market, candles, _) in &loaded {
        stream_builder = stream_builder.with_candle_history(
            market.clone(),
            candle_length,
            config.simulation_start,
            candles.clone(),
        );
    }
    for (market, _, trades) in &loaded {
        stream_builder =
            stream_builder.with_trade_history(market.clone(), config.simulation_start, trades.clone());
    }

    let mut env_builder = SimulationEnvironment::builder(stream_builder.build(), bot);
    for (market, _, _) in loaded {
        let marketplace = CandleSimulatorMarketplace::builder()
            .market(market)
            .constraints(config.order_constraints)
            .fee_level(config.fee_level)
            .volume_reduction(config.volume_reduction)
            .supported_exchanges(supported_exchanges.iter().copied())
            .build()?;
        env_builder = env_builder.with_market(marketplace, config.simulation_start);
    }

    Ok(env_builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bot::BotEval,
        candle::{Candle, CandleHistorySegment},
        error::{ContextError, LoaderError},
        eval::IncrementalContext,
        loader::{CandleHistoryLoader, TradeHistoryLoader},
        logger::ChartDataSeriesConfig,
        market::{OrderConstraints, Precision},
        trade::TradeHistorySegment,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct StubCandleLoader;

    #[async_trait]
    impl CandleHistoryLoader for StubCandleLoader {
        async fn load(
            &self,
            _market: &Market,
            candle_length: TimeDelta,
            start: DateTime<chrono::Utc>,
            _end: DateTime<chrono::Utc>,
        ) -> Result<CandleHistorySegment, LoaderError> {
            let mut segment = CandleHistorySegment::new(start, candle_length);
            segment.push(Candle::new(
                start,
                dec!(100),
                dec!(101),
                dec!(95),
                dec!(100),
                dec!(1000),
                candle_length,
            ));
            Ok(segment)
        }
    }

    struct StubTradeLoader;

    #[async_trait]
    impl TradeHistoryLoader for StubTradeLoader {
        async fn load_history(
            &self,
            _market: &Market,
            start: DateTime<chrono::Utc>,
            _end: Option<DateTime<chrono::Utc>>,
        ) -> Result<TradeHistorySegment, LoaderError> {
            Ok(TradeHistorySegment::new(start))
        }
    }

    struct StubConnector;

    impl ExchangeConnector for StubConnector {
        fn candle_history_loader(&self) -> Arc<dyn CandleHistoryLoader> {
            Arc::new(StubCandleLoader)
        }

        fn trade_history_loader(&self) -> Arc<dyn TradeHistoryLoader> {
            Arc::new(StubTradeLoader)
        }
    }

    struct StubConnectorProvider;

    #[async_trait]
    impl ExchangeConnectorProvider for StubConnectorProvider {
        async fn connector(&self, exchange_id: ExchangeId) -> Result<Arc<dyn ExchangeConnector>, LoaderError> {
            match exchange_id {
                ExchangeId::Binance => Ok(Arc::new(StubConnector)),
                other => Err(LoaderError::UnsupportedExchange(other)),
            }
        }
    }

    struct SilentBot {
        market: Market,
    }

    impl Bot for SilentBot {
        fn markets(&self) -> Vec<Market> {
            vec![self.market.clone()]
        }

        fn basic_candle_length(&self) -> TimeDelta {
            TimeDelta::minutes(1)
        }

        fn chart_data_series_configs(&self) -> Vec<ChartDataSeriesConfig> {
            vec![]
        }

        fn eval(&self, _ctx: &mut IncrementalContext) -> Result<BotEval, ContextError> {
            Ok(BotEval::default())
        }
    }

    fn config(market: Market) -> SimulationConfig {
        SimulationConfig {
            simulation_start: DateTime::UNIX_EPOCH,
            simulation_end: DateTime::UNIX_EPOCH + TimeDelta::minutes(1),
            market,
            total_value: dec!(10000),
            order_constraints: OrderConstraints::new(
                Precision::DigitsAfterSeparator(2),
                Precision::DigitsAfterSeparator(6),
            ),
            fee_level: dec!(0.001),
            volume_reduction: dec!(1),
            loader_timeout: Duration::from_secs(30),
            cache_directory: None,
        }
    }

    #[tokio::test]
    async fn builds_a_runnable_environment_from_loaded_history() {
        let market = Market::new_simple(ExchangeId::Binance, "btc", "usdt");
        let config = config(market.clone());
        let bot = Box::new(SilentBot { market: market.clone() });

        let mut env = build_simulation_environment(&config, bot, &StubConnectorProvider)
            .await
            .expect("session assembly should succeed");

        // Heartbeat `TimeInput` ticks at `start` and `end`, plus the one candle's close event
        // at `end` (tied with the second `TimeInput` tick, ordered after it by `kind_rank`).
        let mut ticks = 0;
        while env.advance().unwrap() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }

    #[tokio::test]
    async fn unsupported_exchange_fails_fast() {
        let market = Market::new_simple(ExchangeId::Kraken, "btc", "usdt");
        let config = config(market.clone());
        let bot = Box::new(SilentBot { market });

        let result = build_simulation_environment(&config, bot, &StubConnectorProvider).await;
        assert!(matches!(
            result,
            Err(SimulationError::Loader(LoaderError::UnsupportedExchange(ExchangeId::Kraken)))
        ));
    }
}
