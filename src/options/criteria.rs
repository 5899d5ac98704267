//! Greek range criteria applied to market data snapshots.

use serde::{Deserialize, Serialize};

use crate::market_data::{Greeks, TickerData};
use crate::Error;

/// Optional bounds on model greeks.
///
/// A set bound is only satisfied by a ticker whose greek is present and within range. A ticker
/// without the greek cannot be matched and fails the bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsCriteria {
    #[serde(alias = "min_delta", default, skip_serializing_if = "Option::is_none")]
    pub min_delta: Option<f64>,
    #[serde(alias = "max_delta", default, skip_serializing_if = "Option::is_none")]
    pub max_delta: Option<f64>,
    #[serde(alias = "min_gamma", default, skip_serializing_if = "Option::is_none")]
    pub min_gamma: Option<f64>,
    #[serde(alias = "max_gamma", default, skip_serializing_if = "Option::is_none")]
    pub max_gamma: Option<f64>,
    #[serde(alias = "min_theta", default, skip_serializing_if = "Option::is_none")]
    pub min_theta: Option<f64>,
    #[serde(alias = "max_theta", default, skip_serializing_if = "Option::is_none")]
    pub max_theta: Option<f64>,
    #[serde(alias = "min_vega", default, skip_serializing_if = "Option::is_none")]
    pub min_vega: Option<f64>,
    #[serde(alias = "max_vega", default, skip_serializing_if = "Option::is_none")]
    pub max_vega: Option<f64>,
}

type Bound = (&'static str, Option<f64>, Option<f64>, fn(&Greeks) -> Option<f64>);

impl OptionsCriteria {
    pub fn with_delta(mut self, min: f64, max: f64) -> Self {
        self.min_delta = Some(min);
        self.max_delta = Some(max);
        self
    }

    pub fn with_gamma(mut self, min: f64, max: f64) -> Self {
        self.min_gamma = Some(min);
        self.max_gamma = Some(max);
        self
    }

    pub fn with_theta(mut self, min: f64, max: f64) -> Self {
        self.min_theta = Some(min);
        self.max_theta = Some(max);
        self
    }

    pub fn with_vega(mut self, min: f64, max: f64) -> Self {
        self.min_vega = Some(min);
        self.max_vega = Some(max);
        self
    }

    fn bounds(&self) -> [Bound; 4] {
        [
            ("delta", self.min_delta, self.max_delta, |greeks| greeks.delta),
            ("gamma", self.min_gamma, self.max_gamma, |greeks| greeks.gamma),
            ("theta", self.min_theta, self.max_theta, |greeks| greeks.theta),
            ("vega", self.min_vega, self.max_vega, |greeks| greeks.vega),
        ]
    }

    /// `true` when no bound is set.
    pub fn is_empty(&self) -> bool {
        self.bounds().iter().all(|(_, min, max, _)| min.is_none() && max.is_none())
    }

    /// Rejects bounds that are not numbers or where the minimum exceeds the maximum.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, min, max, _) in self.bounds() {
            for value in [min, max].into_iter().flatten() {
                if value.is_nan() {
                    return Err(Error::InvalidArgument(format!("{name} bound must be a number")));
                }
            }
            if let (Some(min), Some(max)) = (min, max) {
                if min > max {
                    return Err(Error::InvalidArgument(format!("min {name} {min} is greater than max {name} {max}")));
                }
            }
        }
        Ok(())
    }

    /// `true` when `ticker` satisfies every set bound.
    pub fn matches(&self, ticker: &TickerData) -> bool {
        self.bounds().iter().all(|(_, min, max, greek)| {
            if min.is_none() && max.is_none() {
                return true;
            }

            let Some(value) = ticker.greeks.as_ref().and_then(greek) else {
                return false;
            };

            min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
        })
    }
}

/// Keeps the tickers matching `criteria`. Without criteria every ticker is kept.
pub fn filter(tickers: Vec<TickerData>, criteria: Option<&OptionsCriteria>) -> Vec<TickerData> {
    match criteria {
        Some(criteria) => tickers.into_iter().filter(|ticker| criteria.matches(ticker)).collect(),
        None => tickers,
    }
}
