use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Unique identifier for a simulated [`Order`](super::Order), seeded deterministically from
/// `(exchange, base, quote, n)` by a [`CandleSimulatorMarketplace`](crate::marketplace::CandleSimulatorMarketplace).
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Deserialize, Serialize,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }
}
