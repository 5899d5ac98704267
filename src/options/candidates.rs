//! Expansion of resolved filters into candidate option contracts.

use crate::contracts::{Contract, OptionRight};

use super::ResolvedFilters;

/// Candidate chain generation routes every leg through SMART.
pub const CANDIDATE_EXCHANGE: &str = "SMART";

/// An option contract described by its terms, not yet known to exist.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionLeg {
    pub underlying_symbol: String,
    /// Expiration as `YYYYMMDD`.
    pub expiration: String,
    pub strike: f64,
    pub right: OptionRight,
    pub trading_class: String,
    pub exchange: String,
}

impl OptionLeg {
    /// The partially specified contract submitted for qualification.
    pub fn to_contract(&self) -> Contract {
        let mut contract = Contract::option(&self.underlying_symbol, &self.expiration, self.strike, self.right, &self.trading_class);
        contract.exchange = self.exchange.clone();
        contract
    }
}

/// Cartesian product of the four dimensions, ordered right, strike, expiration, trading class.
///
/// Any empty dimension yields no candidates.
pub fn generate(
    expirations: &[String],
    strikes: &[f64],
    rights: &[OptionRight],
    trading_classes: &[String],
    underlying_symbol: &str,
) -> Vec<OptionLeg> {
    let mut legs = Vec::with_capacity(expirations.len() * strikes.len() * rights.len() * trading_classes.len());

    for right in rights {
        for strike in strikes {
            for expiration in expirations {
                for trading_class in trading_classes {
                    legs.push(OptionLeg {
                        underlying_symbol: underlying_symbol.to_string(),
                        expiration: expiration.clone(),
                        strike: *strike,
                        right: *right,
                        trading_class: trading_class.clone(),
                        exchange: CANDIDATE_EXCHANGE.to_string(),
                    });
                }
            }
        }
    }

    legs
}

impl ResolvedFilters {
    /// Candidate legs for `underlying_symbol`.
    pub fn candidates(&self, underlying_symbol: &str) -> Vec<OptionLeg> {
        generate(&self.expirations, &self.strikes, &self.rights, &self.trading_classes, underlying_symbol)
    }
}
