//! Caller filters and their resolution against the gateway's chain parameters.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::Date;

use crate::contracts::{OptionChain, OptionRight};
use crate::session::Gateway;
use crate::Error;

use super::Underlying;

/// Narrows an option chain down to the combinations a caller is interested in.
///
/// Only `expirations` is required. Omitted dimensions fall back to the gateway's chain parameters:
/// the first reported strike set, every reported trading class and both rights.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsFilters {
    /// Expirations as `YYYYMMDD`.
    pub expirations: Vec<String>,
    #[serde(rename = "tradingClass", default, skip_serializing_if = "Option::is_none")]
    pub trading_classes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strikes: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rights: Option<Vec<OptionRight>>,
}

impl OptionsFilters {
    pub fn for_expirations(expirations: &[&str]) -> OptionsFilters {
        OptionsFilters {
            expirations: expirations.iter().map(|expiration| expiration.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_trading_classes(mut self, trading_classes: &[&str]) -> OptionsFilters {
        self.trading_classes = Some(trading_classes.iter().map(|class| class.to_string()).collect());
        self
    }

    pub fn with_strikes(mut self, strikes: &[f64]) -> OptionsFilters {
        self.strikes = Some(strikes.to_vec());
        self
    }

    pub fn with_rights(mut self, rights: &[OptionRight]) -> OptionsFilters {
        self.rights = Some(rights.to_vec());
        self
    }

    /// Rejects filters that cannot produce a meaningful request.
    pub fn validate(&self) -> Result<(), Error> {
        if self.expirations.is_empty() {
            return Err(Error::InvalidArgument("expirations must not be empty".into()));
        }

        let format = format_description!("[year][month][day]");
        for expiration in &self.expirations {
            if expiration.len() != 8 || Date::parse(expiration, format).is_err() {
                return Err(Error::InvalidArgument(format!("expiration {expiration:?} is not a YYYYMMDD date")));
            }
        }

        if let Some(strikes) = &self.strikes {
            if let Some(strike) = strikes.iter().find(|strike| !strike.is_finite() || **strike <= 0.0) {
                return Err(Error::InvalidArgument(format!("invalid strike {strike}")));
            }
        }

        Ok(())
    }
}

/// Every dimension of a chain request, defaults substituted and duplicates removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedFilters {
    pub expirations: Vec<String>,
    pub strikes: Vec<f64>,
    pub rights: Vec<OptionRight>,
    pub trading_classes: Vec<String>,
}

impl ResolvedFilters {
    /// Merges caller filters with the chain parameters reported by the gateway.
    pub fn merge(filters: &OptionsFilters, chains: &[OptionChain]) -> Result<ResolvedFilters, Error> {
        filters.validate()?;

        let Some(first) = chains.first() else {
            return Err(Error::UpstreamQuery("no option chain parameters".into()));
        };

        let strikes = match &filters.strikes {
            Some(strikes) => strikes.clone(),
            None => first.strikes.clone(),
        };

        let trading_classes = match &filters.trading_classes {
            Some(trading_classes) => trading_classes.clone(),
            None => chains.iter().map(|chain| chain.trading_class.clone()).collect(),
        };

        let rights = match &filters.rights {
            Some(rights) => rights.clone(),
            None => OptionRight::ALL.to_vec(),
        };

        Ok(ResolvedFilters {
            expirations: dedupe(&filters.expirations),
            strikes: dedupe(&strikes),
            rights: dedupe(&rights),
            trading_classes: dedupe(&trading_classes),
        })
    }

    /// Number of candidates these filters expand to.
    pub fn combinations(&self) -> usize {
        self.expirations.len() * self.strikes.len() * self.rights.len() * self.trading_classes.len()
    }
}

/// Queries chain parameters for `underlying` and resolves `filters` against them.
///
/// Fails with [Error::UpstreamQuery] when the gateway reports no chain for the underlying.
pub async fn resolve_chain<G: Gateway + ?Sized>(gateway: &G, underlying: &Underlying, filters: &OptionsFilters) -> Result<ResolvedFilters, Error> {
    underlying.validate()?;
    filters.validate()?;

    let chains = gateway
        .query_chain_params(&underlying.symbol, &underlying.security_type, underlying.contract_id)
        .await?;

    if chains.is_empty() {
        warn!(
            "no option chain parameters for {} ({}, {})",
            underlying.symbol, underlying.security_type, underlying.contract_id
        );
        return Err(Error::UpstreamQuery(format!(
            "no option chain parameters for {} with contract id {}",
            underlying.symbol, underlying.contract_id
        )));
    }

    let resolved = ResolvedFilters::merge(filters, &chains)?;
    debug!(
        "resolved {} chains for {}: {} expirations, {} strikes, {} rights, {} trading classes",
        chains.len(),
        underlying.symbol,
        resolved.expirations.len(),
        resolved.strikes.len(),
        resolved.rights.len(),
        resolved.trading_classes.len()
    );

    Ok(resolved)
}

// First occurrence wins.
fn dedupe<T: PartialEq + Clone>(values: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    unique
}
