//! Per-market simulated order book and candle matcher, generalising the teacher's
//! trade-by-trade `Orders::match_bids`/`match_asks` matching to candle-OHLC matching with a
//! shared per-candle volume budget.

use crate::{
    candle::Candle,
    error::MarketplaceError,
    market::{Market, OrderConstraints},
    order::{Order, OrderId},
    trade::{Trade, TradeId},
    tracking::OrderTrackingEvent,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;

/// Matches simulated orders against OHLC candles for a single [`Market`], emitting
/// [`OrderTrackingEvent`]s for every creation, cancellation, and fill.
#[derive(Debug, Clone)]
pub struct CandleSimulatorMarketplace {
    market: Market,
    constraints: OrderConstraints,
    fee_level: Decimal,
    volume_reduction: Decimal,
    open_orders: IndexMap<OrderId, Order>,
    next_order_seq: u64,
    next_trade_seq: u64,
}

impl CandleSimulatorMarketplace {
    pub fn builder() -> MarketplaceBuilder {
        MarketplaceBuilder::default()
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.open_orders.values()
    }

    fn next_order_id(&mut self) -> OrderId {
        let id = OrderId::new(format!(
            "{}-{}-{}-{}",
            self.market.exchange, self.market.pair.base.0, self.market.pair.quote.0, self.next_order_seq
        ));
        self.next_order_seq += 1;
        id
    }

    fn next_trade_id(&mut self) -> TradeId {
        let id = TradeId::new(format!(
            "{}-{}-{}-{}",
            self.market.exchange, self.market.pair.base.0, self.market.pair.quote.0, self.next_trade_seq
        ));
        self.next_trade_seq += 1;
        id
    }

    /// Quantizes `price`/`quantity` to the market's [`OrderConstraints`] and, if the result is
    /// still a valid order, adds it to the open book.
    ///
    /// # Errors
    /// Returns [`MarketplaceError::InvalidOrder`] if the quantized price is non-positive or the
    /// quantized quantity rounds to zero.
    pub fn place_order(
        &mut self,
        price: Decimal,
        signed_quantity: Decimal,
        time: DateTime<Utc>,
    ) -> Result<(Order, Vec<OrderTrackingEvent>), MarketplaceError> {
        let price = self.constraints.price_precision.quantize_round(price);
        if price <= Decimal::ZERO {
            return Err(MarketplaceError::InvalidOrder(
                "price quantizes to non-positive".to_string(),
            ));
        }

        let sign = if signed_quantity.is_sign_positive() {
            Decimal::ONE
        } else {
            -Decimal::ONE
        };
        let quantity = self
            .constraints
            .quantity_precision
            .quantize_floor(signed_quantity.abs())
            * sign;
        if quantity.is_zero() {
            return Err(MarketplaceError::InvalidOrder(
                "quantity quantizes to zero".to_string(),
            ));
        }

        let id = self.next_order_id();
        let order = Order::new(id.clone(), self.market.clone(), price, quantity, Decimal::ZERO);
        self.open_orders.insert(id, order.clone());

        Ok((
            order.clone(),
            vec![
                OrderTrackingEvent::Creation {
                    time,
                    order: order.clone(),
                },
                OrderTrackingEvent::ObservationChange {
                    time,
                    order: Some(order),
                },
            ],
        ))
    }

    /// Removes an order from the open book, if present.
    pub fn cancel_order(
        &mut self,
        order_id: &OrderId,
        time: DateTime<Utc>,
        absolute_rest_quantity: Option<Decimal>,
    ) -> Result<Vec<OrderTrackingEvent>, MarketplaceError> {
        if self.open_orders.shift_remove(order_id).is_none() {
            return Err(MarketplaceError::InvalidOrder(format!(
                "no open order with id {order_id}"
            )));
        }

        Ok(vec![
            OrderTrackingEvent::Cancel {
                time,
                order_id: order_id.clone(),
                absolute_rest_quantity,
            },
            OrderTrackingEvent::ObservationChange { time, order: None },
        ])
    }

    /// Matches every open order against `candle`, consuming a shared `quoteVolume ×
    /// volumeReduction` budget in ascending order-id order. Each event is paired with the
    /// order id it concerns, since a single candle may fill several orders and
    /// `ObservationChange(time, None)` carries no id of its own.
    pub fn process_candle(&mut self, candle: &Candle) -> Vec<(OrderId, OrderTrackingEvent)> {
        let mut budget = candle.quote_volume * self.volume_reduction;
        let close_time = candle.close_time();
        let mut events = Vec::new();

        let mut ids: Vec<OrderId> = self.open_orders.keys().cloned().collect();
        ids.sort();

        for id in ids {
            if budget <= Decimal::ZERO {
                break;
            }
            let Some(order) = self.open_orders.get(&id) else {
                continue;
            };

            let fills = if order.is_buy() {
                candle.low <= order.price
            } else {
                candle.high >= order.price
            };
            if !fills {
                continue;
            }

            let open_quantity = order.open_quantity().abs();
            let max_by_budget = if order.price.is_zero() {
                Decimal::ZERO
            } else {
                budget / order.price
            };
            let fill_quantity = self
                .constraints
                .quantity_precision
                .quantize_floor(open_quantity.min(max_by_budget));
            if fill_quantity.is_zero() {
                continue;
            }

            let quote_cost = fill_quantity * order.price;
            let fee = quote_cost.abs() * self.fee_level;
            budget -= quote_cost;

            let trade = Trade::new(
                self.next_trade_id(),
                close_time,
                self.market.clone(),
                order.price,
                if order.is_buy() { fill_quantity } else { -fill_quantity },
                fee,
                Some(id.clone()),
            );
            events.push((id.clone(), OrderTrackingEvent::NewTrade { trade }));

            let updated = order.reduce_quantity(fill_quantity);
            if updated.open_quantity().is_zero() {
                self.open_orders.shift_remove(&id);
                events.push((
                    id.clone(),
                    OrderTrackingEvent::ObservationChange {
                        time: close_time,
                        order: None,
                    },
                ));
            } else {
                self.open_orders.insert(id, updated);
            }
        }

        events
    }
}

#[derive(Debug, Default)]
pub struct MarketplaceBuilder {
    market: Option<Market>,
    constraints: Option<OrderConstraints>,
    fee_level: Option<Decimal>,
    volume_reduction: Option<Decimal>,
    supported_exchanges: Option<std::collections::HashSet<crate::market::ExchangeId>>,
}

impl MarketplaceBuilder {
    pub fn market(mut self, value: Market) -> Self {
        self.market = Some(value);
        self
    }

    pub fn constraints(mut self, value: OrderConstraints) -> Self {
        self.constraints = Some(value);
        self
    }

    pub fn fee_level(mut self, value: Decimal) -> Self {
        self.fee_level = Some(value);
        self
    }

    pub fn volume_reduction(mut self, value: Decimal) -> Self {
        self.volume_reduction = Some(value);
        self
    }

    /// Restricts which `ExchangeId`s this marketplace may be built for - the exchanges a
    /// simulation session actually has a connector for. Unset by default, which skips the
    /// check (the common case in unit tests, where no connector resolution precedes
    /// construction).
    pub fn supported_exchanges(
        mut self,
        exchanges: impl IntoIterator<Item = crate::market::ExchangeId>,
    ) -> Self {
        self.supported_exchanges = Some(exchanges.into_iter().collect());
        self
    }

    pub fn build(self) -> Result<CandleSimulatorMarketplace, MarketplaceError> {
        let market = self
            .market
            .ok_or_else(|| MarketplaceError::InvalidOrder("market not set".to_string()))?;

        if let Some(supported) = &self.supported_exchanges {
            if !supported.contains(&market.exchange) {
                return Err(MarketplaceError::UnsupportedExchange(market.exchange));
            }
        }

        Ok(CandleSimulatorMarketplace {
            market,
            constraints: self.constraints.ok_or_else(|| {
                MarketplaceError::InvalidOrder("order constraints not set".to_string())
            })?,
            fee_level: self
                .fee_level
                .ok_or_else(|| MarketplaceError::InvalidOrder("fee_level not set".to_string()))?,
            volume_reduction: self.volume_reduction.ok_or_else(|| {
                MarketplaceError::InvalidOrder("volume_reduction not set".to_string())
            })?,
            open_orders: IndexMap::new(),
            next_order_seq: 0,
            next_trade_seq: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{ExchangeId, Precision};
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn marketplace() -> CandleSimulatorMarketplace {
        CandleSimulatorMarketplace::builder()
            .market(Market::new_simple(ExchangeId::Binance, "btc", "usdt"))
            .constraints(OrderConstraints::new(
                Precision::DigitsAfterSeparator(2),
                Precision::DigitsAfterSeparator(6),
            ))
            .fee_level(dec!(0.001))
            .volume_reduction(dec!(1))
            .build()
            .unwrap()
    }

    // S5: marketplace fill on candle.
    #[test]
    fn buy_limit_order_fills_when_candle_low_reaches_price() {
        let mut marketplace = marketplace();
        let (order, _events) = marketplace
            .place_order(dec!(100), dec!(1), DateTime::UNIX_EPOCH)
            .unwrap();

        let candle = Candle::new(
            DateTime::UNIX_EPOCH,
            dec!(100),
            dec!(101),
            dec!(95),
            dec!(100),
            dec!(1000),
            TimeDelta::minutes(1),
        );

        let events = marketplace.process_candle(&candle);

        let trades: Vec<_> = events
            .iter()
            .filter_map(|(_, event)| match event {
                OrderTrackingEvent::NewTrade { trade } => Some(trade),
                _ => None,
            })
            .collect();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, dec!(1));
        assert_eq!(trades[0].price, dec!(100));
        assert_eq!(trades[0].time, candle.close_time());
        assert_eq!(trades[0].fees, dec!(100) * dec!(0.001));

        assert!(marketplace.open_orders().all(|o| o.id != order.id));
    }

    #[test]
    fn place_order_rejects_zero_quantity_after_quantization() {
        let mut marketplace = marketplace();
        let result = marketplace.place_order(dec!(100), dec!(0.0000001), DateTime::UNIX_EPOCH);
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_exchange_without_a_configured_connector() {
        let result = CandleSimulatorMarketplace::builder()
            .market(Market::new_simple(ExchangeId::Kraken, "btc", "usdt"))
            .constraints(OrderConstraints::new(
                Precision::DigitsAfterSeparator(2),
                Precision::DigitsAfterSeparator(6),
            ))
            .fee_level(dec!(0.001))
            .volume_reduction(dec!(1))
            .supported_exchanges([ExchangeId::Binance])
            .build();

        assert!(matches!(result, Err(MarketplaceError::UnsupportedExchange(ExchangeId::Kraken))));
    }
}
