//! Per-order reconciliation of operation events, exchange observations, and own-trades into
//! a single consistency-checked state, generalising the teacher's tagged-variant
//! `OrderState`/`ActiveOrderState` style to a fuller reconciliation state machine.

use crate::order::{Order, OrderId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single event observed for one order id, in the order it was recorded.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum OrderTrackingEvent {
    Creation { time: DateTime<Utc>, order: Order },
    Cancel {
        time: DateTime<Utc>,
        order_id: OrderId,
        absolute_rest_quantity: Option<Decimal>,
    },
    NewTrade { trade: crate::trade::Trade },
    ObservationChange {
        time: DateTime<Utc>,
        order: Option<Order>,
    },
}

impl OrderTrackingEvent {
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Creation { time, .. } => *time,
            Self::Cancel { time, .. } => *time,
            Self::NewTrade { trade } => trade.time,
            Self::ObservationChange { time, .. } => *time,
        }
    }
}

/// A single exchange-observed snapshot of an order, as entered into
/// [`SingleOrderObservationHistory`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Observation {
    pub time: DateTime<Utc>,
    pub order: Option<Order>,
}

/// Non-empty, strictly-time-increasing sequence of [`Observation`]s for one order id.
///
/// The terminal observation's `order` being `Some` means the order is currently open as last
/// observed; `None` means it was last seen gone (cancelled, filled, or never confirmed).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SingleOrderObservationHistory {
    observations: Vec<Observation>,
}

impl SingleOrderObservationHistory {
    pub fn new(first: Observation) -> Self {
        Self {
            observations: vec![first],
        }
    }

    /// # Panics
    /// Panics if `observation.time` does not strictly increase on the current tail.
    pub fn push(&mut self, observation: Observation) {
        assert!(
            self.observations
                .last()
                .is_none_or(|last| observation.time > last.time),
            "observation time must strictly increase"
        );
        self.observations.push(observation);
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn terminal(&self) -> &Observation {
        self.observations
            .last()
            .expect("SingleOrderObservationHistory is always non-empty")
    }

    /// The observations seen with a present (`Some`) order, in time order.
    pub fn present(&self) -> impl Iterator<Item = (&Observation, &Order)> {
        self.observations
            .iter()
            .filter_map(|obs| obs.order.as_ref().map(|order| (obs, order)))
    }

    /// `true` once a present-then-absent transition has occurred, at the index of the first
    /// such absent observation.
    fn first_present_then_absent_index(&self) -> Option<usize> {
        self.observations
            .windows(2)
            .position(|pair| pair[0].order.is_some() && pair[1].order.is_none())
            .map(|i| i + 1)
    }
}

/// A fatal inconsistency among an order id's recorded events - one of the five consistency
/// rules was violated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, thiserror::Error)]
pub enum TrackingError {
    #[error("inconsistent fullQuantity/openQuantity across observations: {0:?} vs {1:?}")]
    InconsistentEvents(Box<Order>, Box<Order>),

    #[error("more than one Creation event recorded: {0:?} and {1:?}")]
    DuplicateCreation(Box<Order>, Box<Order>),

    #[error("more than one Cancel event recorded at {0} and {1}")]
    DuplicateCancel(DateTime<Utc>, DateTime<Utc>),

    #[error("order reappeared after a present-then-absent transition at {0:?}")]
    ReappearingOrderInconsistency(Box<Observation>),

    #[error("order overfilled: lastTrade={0:?} totalFill={1} maxFill={2}")]
    Overfill(Box<crate::trade::Trade>, Decimal, Decimal),
}

/// A non-error explanation for why a [`BasicOrderTrackingState`] has not yet settled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SyncReason {
    UnknownWhyOrderIsGone(DateTime<Utc>),
    ExpectingTrades(DateTime<Utc>, Decimal),
    ExpectingObservationChange(DateTime<Utc>, Option<Box<Order>>),
    UnknownIfMoreTradesBeforeCancel(DateTime<Utc>),
}

/// Aggregates every event recorded for one order id and derives its reconciled state.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BasicOrderTrackingState {
    order_id: OrderId,
    creations: Vec<(DateTime<Utc>, Order)>,
    cancels: Vec<(DateTime<Utc>, Option<Decimal>)>,
    observations: Option<SingleOrderObservationHistory>,
    trades: Vec<crate::trade::Trade>,
}

impl BasicOrderTrackingState {
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            creations: Vec::new(),
            cancels: Vec::new(),
            observations: None,
            trades: Vec::new(),
        }
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// Appends `event`, which must concern this order id.
    ///
    /// A second `Creation` or `Cancel` is recorded rather than overwriting the first, so a
    /// genuinely inconsistent event stream (two `Creation`s, or two `Cancel`s) is preserved for
    /// [`Self::error_state`] to detect.
    pub fn apply(&mut self, event: OrderTrackingEvent) {
        match event {
            OrderTrackingEvent::Creation { time, order } => {
                self.creations.push((time, order));
            }
            OrderTrackingEvent::Cancel {
                time,
                absolute_rest_quantity,
                ..
            } => {
                self.cancels.push((time, absolute_rest_quantity));
            }
            OrderTrackingEvent::NewTrade { trade } => {
                self.trades.push(trade);
            }
            OrderTrackingEvent::ObservationChange { time, order } => {
                let observation = Observation { time, order };
                match &mut self.observations {
                    Some(history) => history.push(observation),
                    None => self.observations = Some(SingleOrderObservationHistory::new(observation)),
                }
            }
        }
    }

    /// First present observation, else the order carried by the first `Creation`.
    pub fn order_with_full_quantity(&self) -> Option<&Order> {
        self.observations
            .as_ref()
            .and_then(|history| history.present().next().map(|(_, order)| order))
            .or_else(|| self.creations.first().map(|(_, order)| order))
    }

    /// Signed sum of every recorded trade quantity.
    pub fn total_trade_quantity(&self) -> Decimal {
        self.trades.iter().map(|t| t.quantity).sum()
    }

    fn last_trade(&self) -> Option<&crate::trade::Trade> {
        self.trades.iter().max_by_key(|t| t.time)
    }

    /// The first violated consistency rule, if any, checked in specification order.
    pub fn error_state(&self) -> Option<TrackingError> {
        self.check_consistent_full_quantity_across_observations()
            .or_else(|| self.check_creation_matches_observations())
            .or_else(|| self.check_cancel_consistent_with_events())
            .or_else(|| self.check_order_does_not_reappear())
            .or_else(|| self.check_not_overfilled())
    }

    fn check_consistent_full_quantity_across_observations(&self) -> Option<TrackingError> {
        let Some(history) = &self.observations else {
            return None;
        };
        let present: Vec<&Order> = history.present().map(|(_, order)| order).collect();
        for window in present.windows(2) {
            let (earlier, later) = (window[0], window[1]);
            if earlier.full_quantity != later.full_quantity
                || earlier.open_quantity().abs() < later.open_quantity().abs()
            {
                return Some(TrackingError::InconsistentEvents(
                    Box::new(earlier.clone()),
                    Box::new(later.clone()),
                ));
            }
        }
        None
    }

    fn check_creation_matches_observations(&self) -> Option<TrackingError> {
        if self.creations.len() > 1 {
            let (_, first) = &self.creations[0];
            let (_, second) = &self.creations[1];
            return Some(TrackingError::DuplicateCreation(
                Box::new(first.clone()),
                Box::new(second.clone()),
            ));
        }

        let (_, created) = self.creations.first()?;
        let (_, observed) = self.observations.as_ref()?.present().next()?;
        if created.full_quantity != observed.full_quantity {
            return Some(TrackingError::InconsistentEvents(
                Box::new(created.clone()),
                Box::new(observed.clone()),
            ));
        }
        None
    }

    fn check_cancel_consistent_with_events(&self) -> Option<TrackingError> {
        if self.cancels.len() > 1 {
            let (first_time, _) = self.cancels[0];
            let (second_time, _) = self.cancels[1];
            return Some(TrackingError::DuplicateCancel(first_time, second_time));
        }

        let (_, Some(rest)) = self.cancels.first()? else {
            return None;
        };
        let prior = self
            .creations
            .iter()
            .map(|(_, order)| order)
            .chain(self.observations.iter().flat_map(|h| h.present().map(|(_, o)| o)));
        for order in prior {
            if order.full_quantity.abs() < rest.abs() {
                return Some(TrackingError::InconsistentEvents(
                    Box::new(order.clone()),
                    Box::new(order.clone()),
                ));
            }
        }
        None
    }

    fn check_order_does_not_reappear(&self) -> Option<TrackingError> {
        let history = self.observations.as_ref()?;
        let absent_index = history.first_present_then_absent_index()?;
        let reappearance = history.observations()[absent_index + 1..]
            .iter()
            .find(|obs| obs.order.is_some())?;
        Some(TrackingError::ReappearingOrderInconsistency(Box::new(
            reappearance.clone(),
        )))
    }

    fn max_fill(&self) -> Option<Decimal> {
        let full = self.order_with_full_quantity()?.full_quantity.abs();
        Some(match self.cancels.first() {
            Some((_, Some(rest))) => full - rest.abs(),
            _ => full,
        })
    }

    fn check_not_overfilled(&self) -> Option<TrackingError> {
        let max_fill = self.max_fill()?;
        let total = self.total_trade_quantity().abs();
        if total > max_fill {
            let last_trade = self.last_trade()?.clone();
            return Some(TrackingError::Overfill(Box::new(last_trade), total, max_fill));
        }
        None
    }

    /// The order as currently reported: present only while observed and not cancelled.
    pub fn reporting_state(&self) -> Option<Order> {
        if self.error_state().is_some() {
            return None;
        }
        let history = self.observations.as_ref()?;
        let (_, last_observed) = history.present().next_back()?;
        if history.terminal().order.is_none() {
            return None;
        }
        if !self.cancels.is_empty() {
            return None;
        }
        let total = self.total_trade_quantity();
        if total.abs() > last_observed.full_quantity.abs() {
            return None;
        }
        Some(last_observed.reset_quantity().reduce_quantity(total))
    }

    /// Set of non-error explanations for why this state has not yet settled.
    pub fn sync_reasons(&self) -> HashSet<SyncReason> {
        let mut reasons = HashSet::new();
        if self.error_state().is_some() {
            return reasons;
        }

        let never_observed = self
            .observations
            .as_ref()
            .is_none_or(|h| h.present().next().is_none());

        if never_observed && !self.trades.is_empty() && self.cancels.is_empty() {
            if let Some(last_trade) = self.last_trade() {
                reasons.insert(SyncReason::UnknownWhyOrderIsGone(last_trade.time));
            }
        }

        if let Some(delta) = self.expecting_trades_delta() {
            let time = self.expecting_trades_time();
            reasons.insert(SyncReason::ExpectingTrades(time, delta));
        }

        let currently_observed_history = self
            .observations
            .as_ref()
            .filter(|h| h.terminal().order.is_some());

        if let Some(history) = currently_observed_history {
            let last_observed = history.present().next_back().map(|(_, order)| order);
            let trade_excess = last_observed.is_some_and(|last_observed| {
                self.total_trade_quantity().abs() > last_observed.filled_quantity.abs()
            });

            if trade_excess {
                if let (Some(last_trade), Some(last_observed)) = (self.last_trade(), last_observed) {
                    reasons.insert(SyncReason::ExpectingObservationChange(
                        last_trade.time,
                        Some(Box::new(last_observed.clone())),
                    ));
                }
            } else if let Some((cancel_time, _)) = self.cancels.first() {
                reasons.insert(SyncReason::ExpectingObservationChange(*cancel_time, None));
            }
        } else if !never_observed && self.cancels.is_empty() {
            let total = self.total_trade_quantity().abs();
            let fully_traded = self
                .order_with_full_quantity()
                .is_some_and(|o| total >= o.full_quantity.abs());
            if !fully_traded {
                if let Some(history) = &self.observations {
                    reasons.insert(SyncReason::UnknownWhyOrderIsGone(history.terminal().time));
                }
            }
        }

        if let Some((cancel_time, None)) = self.cancels.first() {
            reasons.insert(SyncReason::UnknownIfMoreTradesBeforeCancel(*cancel_time));
        }

        reasons
    }

    /// The implied-but-not-yet-materialized trade magnitude: the later of
    /// implied-from-cancel-rest and implied-from-last-observation-filled-quantity, tie-broken
    /// per the specified rule (equal magnitude → earlier time wins for the cancel-implied
    /// source; otherwise greater magnitude wins, then later time).
    fn expecting_trades_delta(&self) -> Option<Decimal> {
        let implied = self.implied_candidates();
        let (_, magnitude) = implied.into_iter().max_by(|(t1, m1), (t2, m2)| {
            m1.abs().cmp(&m2.abs()).then_with(|| {
                if m1.abs() == m2.abs() {
                    t2.cmp(t1)
                } else {
                    t1.cmp(t2)
                }
            })
        })?;

        let observed = self.total_trade_quantity().abs();
        if magnitude.abs() > observed {
            Some(magnitude)
        } else {
            None
        }
    }

    fn expecting_trades_time(&self) -> DateTime<Utc> {
        self.implied_candidates()
            .into_iter()
            .map(|(t, _)| t)
            .max()
            .unwrap_or_else(|| self.last_trade().map(|t| t.time).unwrap_or_default())
    }

    fn implied_candidates(&self) -> Vec<(DateTime<Utc>, Decimal)> {
        let mut candidates = Vec::new();
        if let Some((time, Some(rest))) = self.cancels.first() {
            if let Some(full) = self.order_with_full_quantity() {
                candidates.push((*time, full.full_quantity.abs() - rest.abs()));
            }
        }
        if let Some(history) = &self.observations {
            if let Some((obs, order)) = history.present().next_back() {
                candidates.push((obs.time, order.filled_quantity.abs()));
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        market::{ExchangeId, Market},
        trade::{Trade, TradeId},
    };
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market::new_simple(ExchangeId::Binance, "btc", "usdt")
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH + TimeDelta::seconds(100)
    }

    fn order(id: &str, full: Decimal, filled: Decimal) -> Order {
        Order::new(OrderId::new(id), market(), dec!(20000), full, filled)
    }

    // S1: order with no trades.
    #[test]
    fn no_trades_reports_fully_open() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::Creation {
            time: base_time(),
            order: order("1", dec!(1), dec!(0)),
        });
        state.apply(OrderTrackingEvent::ObservationChange {
            time: base_time() + TimeDelta::seconds(1),
            order: Some(order("1", dec!(1), dec!(0))),
        });

        assert!(state.error_state().is_none());
        assert_eq!(state.reporting_state(), Some(order("1", dec!(1), dec!(0))));
        assert!(state.sync_reasons().is_empty());
    }

    // S2: expecting a trade.
    #[test]
    fn partial_fill_without_trade_yields_expecting_trades() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::Creation {
            time: base_time(),
            order: order("1", dec!(1), dec!(0)),
        });
        state.apply(OrderTrackingEvent::ObservationChange {
            time: base_time() + TimeDelta::seconds(1),
            order: Some(order("1", dec!(1), dec!(0.4))),
        });

        assert!(state.error_state().is_none());
        assert!(state
            .sync_reasons()
            .contains(&SyncReason::ExpectingTrades(base_time() + TimeDelta::seconds(1), dec!(0.4))));
    }

    // S3: overfill.
    #[test]
    fn trade_exceeding_full_quantity_is_overfill() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::Creation {
            time: base_time(),
            order: order("1", dec!(1), dec!(0)),
        });
        state.apply(OrderTrackingEvent::NewTrade {
            trade: Trade::new(
                TradeId::new("t1"),
                base_time() + TimeDelta::seconds(10),
                market(),
                dec!(20000),
                dec!(1.5),
                dec!(0),
                Some(OrderId::new("1")),
            ),
        });

        match state.error_state() {
            Some(TrackingError::Overfill(_, total, max)) => {
                assert_eq!(total, dec!(1.5));
                assert_eq!(max, dec!(1));
            }
            other => panic!("expected Overfill, got {other:?}"),
        }
    }

    // S4: reappearing order.
    #[test]
    fn order_reappearing_after_absence_is_inconsistent() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::ObservationChange {
            time: base_time(),
            order: Some(order("1", dec!(1), dec!(0))),
        });
        state.apply(OrderTrackingEvent::ObservationChange {
            time: base_time() + TimeDelta::seconds(10),
            order: None,
        });
        state.apply(OrderTrackingEvent::ObservationChange {
            time: base_time() + TimeDelta::seconds(20),
            order: Some(order("1", dec!(1), dec!(0))),
        });

        assert!(matches!(
            state.error_state(),
            Some(TrackingError::ReappearingOrderInconsistency(_))
        ));
    }

    // S5: a second Creation is a structural inconsistency, not a silent overwrite.
    #[test]
    fn second_creation_is_inconsistent() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::Creation {
            time: base_time(),
            order: order("1", dec!(1), dec!(0)),
        });
        state.apply(OrderTrackingEvent::Creation {
            time: base_time() + TimeDelta::seconds(1),
            order: order("1", dec!(2), dec!(0)),
        });

        assert!(matches!(
            state.error_state(),
            Some(TrackingError::DuplicateCreation(_, _))
        ));
    }

    // S6: a second Cancel is likewise a structural inconsistency.
    #[test]
    fn second_cancel_is_inconsistent() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::Creation {
            time: base_time(),
            order: order("1", dec!(1), dec!(0)),
        });
        state.apply(OrderTrackingEvent::Cancel {
            time: base_time() + TimeDelta::seconds(1),
            order_id: OrderId::new("1"),
            absolute_rest_quantity: Some(dec!(0.5)),
        });
        state.apply(OrderTrackingEvent::Cancel {
            time: base_time() + TimeDelta::seconds(2),
            order_id: OrderId::new("1"),
            absolute_rest_quantity: Some(dec!(0.4)),
        });

        assert!(matches!(
            state.error_state(),
            Some(TrackingError::DuplicateCancel(_, _))
        ));
    }

    // Under-filled relative to the last observation *and* already cancelled: only the
    // trade-excess reason is reported, per the spec's "else if" priority.
    #[test]
    fn observation_change_reason_is_exclusive_with_cancel_reason() {
        let mut state = BasicOrderTrackingState::new(OrderId::new("1"));
        state.apply(OrderTrackingEvent::Creation {
            time: base_time(),
            order: order("1", dec!(1), dec!(0)),
        });
        state.apply(OrderTrackingEvent::ObservationChange {
            time: base_time() + TimeDelta::seconds(1),
            order: Some(order("1", dec!(1), dec!(0.2))),
        });
        state.apply(OrderTrackingEvent::NewTrade {
            trade: Trade::new(
                TradeId::new("t1"),
                base_time() + TimeDelta::seconds(2),
                market(),
                dec!(20000),
                dec!(0.5),
                dec!(0),
                Some(OrderId::new("1")),
            ),
        });
        state.apply(OrderTrackingEvent::Cancel {
            time: base_time() + TimeDelta::seconds(3),
            order_id: OrderId::new("1"),
            absolute_rest_quantity: Some(dec!(0.5)),
        });

        assert!(state.error_state().is_none());
        let reasons = state.sync_reasons();
        assert!(reasons
            .iter()
            .any(|r| matches!(r, SyncReason::ExpectingObservationChange(_, Some(_)))));
        assert!(!reasons
            .iter()
            .any(|r| matches!(r, SyncReason::ExpectingObservationChange(_, None))));
    }
}
