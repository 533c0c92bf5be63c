//! Sinks per-candle evaluation results to a per-market chart-series artifact, aggregating the
//! bot's basic candle length up to a coarser interval (e.g. 6x or 48x) per configured series.

use crate::{
    eval::{Eval, EvalKey, IncrementalContext},
    error::ContextError,
    market::Market,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::sync::Arc;

/// Object-safe view of an [`Eval`] whose output is a [`Decimal`] - the common shape for chart
/// metrics - so a [`ChartDataSeriesConfig`] can hold a heterogeneous list of named evals.
pub trait DecimalEval: Send + Sync {
    fn key(&self) -> EvalKey;
    fn evaluate(&self, ctx: &mut IncrementalContext) -> Result<Decimal, ContextError>;
}

impl<E> DecimalEval for E
where
    E: Eval<Output = Decimal> + Send + Sync,
{
    fn key(&self) -> EvalKey {
        Eval::key(self)
    }

    fn evaluate(&self, ctx: &mut IncrementalContext) -> Result<Decimal, ContextError> {
        Eval::evaluate(self, ctx)
    }
}

/// A single named chart series: a group of evals sampled at the open and close of every
/// `aggregation_factor`-th basic candle.
pub struct ChartDataSeriesConfig {
    pub name: SmolStr,
    pub aggregation_factor: u32,
    pub candle_start_evals: Vec<(SmolStr, Arc<dyn DecimalEval>)>,
    pub candle_end_evals: Vec<(SmolStr, Arc<dyn DecimalEval>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartDataPoint {
    pub time: DateTime<Utc>,
    pub values: IndexMap<SmolStr, Decimal>,
}

#[derive(Debug, Clone)]
pub struct ChartDataSeries {
    pub name: SmolStr,
    pub points: Vec<ChartDataPoint>,
}

impl ChartDataSeries {
    fn new(name: SmolStr) -> Self {
        Self { name, points: Vec::new() }
    }
}

/// Per-market collection of [`ChartDataSeries`], one per configured [`ChartDataSeriesConfig`].
pub struct ChartDataLogger {
    configs: Vec<ChartDataSeriesConfig>,
    tick_counts: IndexMap<(Market, usize), u32>,
    series: IndexMap<Market, Vec<ChartDataSeries>>,
}

impl ChartDataLogger {
    pub fn new(configs: Vec<ChartDataSeriesConfig>) -> Self {
        Self {
            configs,
            tick_counts: IndexMap::new(),
            series: IndexMap::new(),
        }
    }

    pub fn series(&self) -> &IndexMap<Market, Vec<ChartDataSeries>> {
        &self.series
    }

    /// Called once per basic-candle close for `market`. Samples `candle_start_evals` on the
    /// first basic candle of an aggregated window and `candle_end_evals` on the last.
    pub fn on_candle_close(
        &mut self,
        market: &Market,
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        ctx: &mut IncrementalContext,
    ) -> Result<(), ContextError> {
        if !self.series.contains_key(market) {
            let initial = self
                .configs
                .iter()
                .map(|config| ChartDataSeries::new(config.name.clone()))
                .collect();
            self.series.insert(market.clone(), initial);
        }

        for index in 0..self.configs.len() {
            let count = {
                let count = self.tick_counts.entry((market.clone(), index)).or_insert(0);
                *count += 1;
                *count
            };

            let config = &self.configs[index];
            let is_window_start = count == 1;
            let is_window_end = count == config.aggregation_factor;

            if is_window_start {
                let values = evaluate_named(&config.candle_start_evals, ctx)?;
                self.series.get_mut(market).expect("inserted above").get_mut(index).expect("one series per config").points.push(ChartDataPoint { time: open_time, values });
            }
            if is_window_end {
                let values = evaluate_named(&config.candle_end_evals, ctx)?;
                self.series.get_mut(market).expect("inserted above").get_mut(index).expect("one series per config").points.push(ChartDataPoint { time: close_time, values });
                *self.tick_counts.get_mut(&(market.clone(), index)).expect("just incremented") = 0;
            }
        }

        Ok(())
    }
}

fn evaluate_named(
    evals: &[(SmolStr, Arc<dyn DecimalEval>)],
    ctx: &mut IncrementalContext,
) -> Result<IndexMap<SmolStr, Decimal>, ContextError> {
    evals
        .iter()
        .map(|(name, eval)| eval.evaluate(ctx).map(|value| (name.clone(), value)))
        .collect()
}
