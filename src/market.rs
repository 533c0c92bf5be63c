use derive_more::{Constructor, Display, From};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifies a simulated venue. Used to seed deterministic order/trade id counters
/// and to validate configuration at marketplace construction - unknown ids are a fatal,
/// immediate failure.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Display, Deserialize, Serialize,
)]
pub enum ExchangeId {
    #[default]
    Binance,
    Coinbase,
    Kraken,
}

/// An asset identifier, e.g. `btc`, `usdt`. Interned as a [`SmolStr`] since most asset names
/// are short enough to be stack-allocated.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, From, Deserialize, Serialize,
)]
pub struct AssetName(pub SmolStr);

impl AssetName {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Self(SmolStr::new(name.as_ref()))
    }
}

/// A base/quote asset pair traded on an [`ExchangeId`].
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Constructor, Deserialize, Serialize,
)]
pub struct TradingPair {
    pub base: AssetName,
    pub quote: AssetName,
}

/// Uniquely identifies a market: an [`ExchangeId`] combined with the [`TradingPair`] traded
/// there.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Constructor, Deserialize, Serialize,
)]
pub struct Market {
    pub exchange: ExchangeId,
    pub pair: TradingPair,
}

impl Market {
    pub fn new_simple<S: AsRef<str>>(exchange: ExchangeId, base: S, quote: S) -> Self {
        Self {
            exchange,
            pair: TradingPair::new(AssetName::new(base), AssetName::new(quote)),
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}", self.exchange, self.pair.base.0, self.pair.quote.0)
    }
}

/// A precision rule applied when quantizing an order's price or quantity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum Precision {
    /// Round to this many digits after the decimal separator.
    DigitsAfterSeparator(u32),
    /// Round to this many significant digits.
    SignificantDigits(u32),
    /// Round to the nearest multiple of this step.
    MultipleOf(Decimal),
}

impl Precision {
    /// Quantize `value` down towards zero, used for order quantities so a partial-precision
    /// fill never rounds up past the available liquidity.
    pub fn quantize_floor(&self, value: Decimal) -> Decimal {
        match self {
            Precision::DigitsAfterSeparator(digits) => value.trunc_with_scale(*digits),
            Precision::SignificantDigits(sig) => round_to_significant_digits(value, *sig, false),
            Precision::MultipleOf(step) => {
                if step.is_zero() {
                    return value;
                }
                (value / step).trunc() * step
            }
        }
    }

    /// Quantize `value` to the nearest representable value, used for order prices.
    pub fn quantize_round(&self, value: Decimal) -> Decimal {
        match self {
            Precision::DigitsAfterSeparator(digits) => value.round_dp(*digits),
            Precision::SignificantDigits(sig) => round_to_significant_digits(value, *sig, true),
            Precision::MultipleOf(step) => {
                if step.is_zero() {
                    return value;
                }
                (value / step).round() * step
            }
        }
    }
}

fn round_to_significant_digits(value: Decimal, significant: u32, nearest: bool) -> Decimal {
    if value.is_zero() || significant == 0 {
        return Decimal::ZERO;
    }

    let magnitude = value.abs();
    let mut exponent = 0i32;
    let mut scaled = magnitude;

    let ten = Decimal::from(10u32);
    while scaled >= Decimal::from(10u32) {
        scaled /= ten;
        exponent += 1;
    }
    while scaled < Decimal::ONE {
        scaled *= ten;
        exponent -= 1;
    }

    let scale = significant as i32 - 1 - exponent;
    if scale >= 0 {
        let dp = scale as u32;
        if nearest {
            value.round_dp(dp)
        } else {
            value.trunc_with_scale(dp)
        }
    } else {
        let factor = ten.powi((-scale) as i64);
        if nearest {
            (value / factor).round() * factor
        } else {
            (value / factor).trunc() * factor
        }
    }
}

/// Price and quantity precision rules enforced by a [`CandleSimulatorMarketplace`]
/// (`crate::marketplace`) on every placed order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct OrderConstraints {
    pub price_precision: Precision,
    pub quantity_precision: Precision,
}

impl OrderConstraints {
    pub fn new(price_precision: Precision, quantity_precision: Precision) -> Self {
        Self {
            price_precision,
            quantity_precision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantize_floor_digits_after_separator() {
        let p = Precision::DigitsAfterSeparator(2);
        assert_eq!(p.quantize_floor(dec!(1.239)), dec!(1.23));
    }

    #[test]
    fn quantize_round_multiple_of() {
        let p = Precision::MultipleOf(dec!(0.5));
        assert_eq!(p.quantize_round(dec!(1.26)), dec!(1.5));
    }

    #[test]
    fn quantize_floor_zero_quantity() {
        let p = Precision::DigitsAfterSeparator(0);
        assert_eq!(p.quantize_floor(dec!(0.4)), dec!(0));
    }
}
