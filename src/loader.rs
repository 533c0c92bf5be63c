//! Async collaborator boundary for historical data, mirroring the teacher's
//! `ExecutionClient`/`SimulatedExecution` async-trait pattern at the one place this core
//! actually performs I/O: the initial candle/trade history fetch.

use crate::{
    candle::CandleHistorySegment,
    error::LoaderError,
    market::{ExchangeId, Market},
    trade::TradeHistorySegment,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// Loads a contiguous, aligned run of candles for a market.
#[async_trait]
pub trait CandleHistoryLoader: Send + Sync {
    async fn load(
        &self,
        market: &Market,
        candle_length: TimeDelta,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleHistorySegment, LoaderError>;
}

/// Loads own-trades recorded for a market.
#[async_trait]
pub trait TradeHistoryLoader: Send + Sync {
    async fn load_history(
        &self,
        market: &Market,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<TradeHistorySegment, LoaderError>;
}

/// A venue's pair of loaders, obtained once per simulation via [`ExchangeConnectorProvider`].
pub trait ExchangeConnector: Send + Sync {
    fn candle_history_loader(&self) -> Arc<dyn CandleHistoryLoader>;
    fn trade_history_loader(&self) -> Arc<dyn TradeHistoryLoader>;
}

/// Resolves an [`ExchangeId`] to its [`ExchangeConnector`]. Unknown ids are a fatal,
/// immediate failure at marketplace construction.
#[async_trait]
pub trait ExchangeConnectorProvider: Send + Sync {
    async fn connector(&self, exchange_id: ExchangeId) -> Result<Arc<dyn ExchangeConnector>, LoaderError>;
}

/// Awaits `future`, converting a timeout into [`LoaderError::Timeout`] for `input`.
pub async fn with_loader_timeout<T>(
    input: crate::input::InputKey,
    timeout: std::time::Duration,
    future: impl std::future::Future<Output = Result<T, LoaderError>>,
) -> Result<T, LoaderError> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(LoaderError::Timeout(input)),
    }
}
