use crate::market::Market;
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifies a simulated order. Generated deterministically at placement time.
pub mod id;

pub use id::OrderId;

/// A simulated order tracked by a [`CandleSimulatorMarketplace`](crate::marketplace::CandleSimulatorMarketplace).
///
/// `open_quantity` is derived, never stored: `full_quantity - filled_quantity`. The signs of
/// `full_quantity` and `filled_quantity` always match (positive = buy, negative = sell).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Constructor, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub market: Market,
    pub price: Decimal,
    pub full_quantity: Decimal,
    pub filled_quantity: Decimal,
}

impl Order {
    pub fn open_quantity(&self) -> Decimal {
        self.full_quantity - self.filled_quantity
    }

    pub fn is_buy(&self) -> bool {
        self.full_quantity.is_sign_positive()
    }

    /// Returns `self` with `filled_quantity` reset to zero.
    pub fn reset_quantity(&self) -> Self {
        Self {
            filled_quantity: Decimal::ZERO,
            ..self.clone()
        }
    }

    /// Returns `self` with `|delta|` added to `filled_quantity`, matching the sign of
    /// `full_quantity`.
    pub fn reduce_quantity(&self, delta: Decimal) -> Self {
        let signed_delta = if self.is_buy() { delta.abs() } else { -delta.abs() };
        Self {
            filled_quantity: self.filled_quantity + signed_delta,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::ExchangeId;
    use rust_decimal_macros::dec;

    fn order(full: Decimal, filled: Decimal) -> Order {
        Order::new(
            OrderId::new("1"),
            Market::new_simple(ExchangeId::Binance, "btc", "usdt"),
            dec!(100),
            full,
            filled,
        )
    }

    #[test]
    fn open_quantity_is_derived() {
        let o = order(dec!(1), dec!(0.4));
        assert_eq!(o.open_quantity(), dec!(0.6));
    }

    #[test]
    fn reset_quantity_zeroes_filled() {
        let o = order(dec!(1), dec!(0.4)).reset_quantity();
        assert_eq!(o.filled_quantity, dec!(0));
    }

    #[test]
    fn reduce_quantity_matches_sign_for_sell() {
        let o = order(dec!(-1), dec!(0)).reduce_quantity(dec!(0.3));
        assert_eq!(o.filled_quantity, dec!(-0.3));
    }
}
