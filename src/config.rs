//! Simulation configuration, mirroring the teacher's `ExecutionConfig`/system config pattern:
//! a plain serde-deserializable struct, not a builder, since every field is known up front.

use crate::market::{Market, OrderConstraints};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every externally configurable parameter of a simulation run.
///
/// `cache_directory` is accepted but unused by this core - it is owned by the out-of-scope
/// on-disk candle/trade cache layer and kept here only for config-surface fidelity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub simulation_start: DateTime<Utc>,
    pub simulation_end: DateTime<Utc>,
    pub market: Market,
    pub total_value: Decimal,
    pub order_constraints: OrderConstraints,
    pub fee_level: Decimal,
    pub volume_reduction: Decimal,
    #[serde(with = "loader_timeout_secs")]
    pub loader_timeout: Duration,
    pub cache_directory: Option<String>,
}

impl SimulationConfig {
    pub fn default_loader_timeout() -> Duration {
        Duration::from_secs(30)
    }
}

mod loader_timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ExchangeId, Precision};
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_through_json() {
        let config = SimulationConfig {
            simulation_start: DateTime::UNIX_EPOCH,
            simulation_end: DateTime::UNIX_EPOCH + chrono::TimeDelta::days(1),
            market: Market::new_simple(ExchangeId::Binance, "btc", "usdt"),
            total_value: dec!(10000),
            order_constraints: OrderConstraints::new(
                Precision::DigitsAfterSeparator(2),
                Precision::DigitsAfterSeparator(6),
            ),
            fee_level: dec!(0.001),
            volume_reduction: dec!(1),
            loader_timeout: Duration::from_secs(30),
            cache_directory: Some("/tmp/cache".to_string()),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: SimulationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
