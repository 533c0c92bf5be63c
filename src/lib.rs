#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Backtest-Core
//! A deterministic, time-driven back-testing simulation core: an incrementally memoized
//! evaluation context, a timed input update stream merging per-input historical event
//! sequences, and a candle-based marketplace simulator with an order-tracking consistency
//! layer.
//!
//! **It is:**
//! * **Deterministic**: identical input bindings always produce identical evaluation results
//!   and identical final chart artifacts, across replays.
//! * **Incremental**: evaluations and folds over historical sequences are memoized and
//!   invalidated precisely, rather than recomputed on every tick.
//! * **Single-threaded**: one logical actor drives the replay loop; only the initial loader
//!   fetches suspend.
//!
//! Exchange connectors, on-disk candle/trade caches, credential handling, and chart
//! serialization are external collaborators, consumed only through the trait boundaries in
//! [`loader`] and [`bot`]. [`session`] wires a configured [`loader::ExchangeConnectorProvider`]
//! and [`bot::Bot`] into a ready-to-run [`environment::SimulationEnvironment`].

pub mod bot;
pub mod candle;
pub mod config;
pub mod environment;
pub mod error;
pub mod eval;
pub mod input;
pub mod loader;
pub mod logger;
pub mod market;
pub mod marketplace;
pub mod order;
pub mod sequence;
pub mod session;
pub mod stream;
pub mod trade;
pub mod tracking;
