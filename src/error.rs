use crate::{eval::EvalKey, input::InputKey, market::ExchangeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error returned by [`SimulationEnvironment::advance`](crate::environment::SimulationEnvironment::advance),
/// the replay driver, and [`session::build_simulation_environment`](crate::session::build_simulation_environment).
/// Fatal: the caller should halt the simulation.
///
/// During the tick loop itself, [`MarketplaceError`] is deliberately not surfaced through this
/// type - `place_order`/`cancel_order` rejections are returned directly to the bot and are
/// never fatal to `advance`. [`Self::Marketplace`] covers the one place a `MarketplaceError` is
/// fatal: a market whose `ExchangeId` has no configured connector fails marketplace
/// construction before the loop ever starts.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum SimulationError {
    #[error("loader: {0}")]
    Loader(#[from] LoaderError),

    #[error("context: {0}")]
    Context(#[from] ContextError),

    #[error("marketplace construction: {0}")]
    Marketplace(#[from] MarketplaceError),
}

/// Errors raised while materialising the per-input timed event streams.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum LoaderError {
    #[error("loader for {0:?} did not produce within the configured timeout")]
    Timeout(InputKey),

    #[error("loader io failure: {0}")]
    Io(String),

    #[error("no ExchangeConnector configured for exchange: {0}")]
    UnsupportedExchange(ExchangeId),
}

/// Errors raised by the [`IncrementalContext`](crate::eval::context::IncrementalContext).
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum ContextError {
    #[error("Input {0:?} has no bound value")]
    InputNotBound(InputKey),

    #[error("Eval {0:?} failed: {1}")]
    EvalFailure(EvalKey, String),
}

/// Raised by [`CandleSimulatorMarketplace`](crate::marketplace::CandleSimulatorMarketplace)
/// order operations. Non-fatal: communicated back to the bot as a rejected operation.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum MarketplaceError {
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(ExchangeId),
}
