//! Qualification of candidate contracts.
//!
//! A combinatorial chain routinely describes contracts that do not exist, such as a trading class
//! that does not list a given expiration. Those candidates are dropped and counted. Only a failure
//! of the batch itself is an error.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::contracts::Contract;
use crate::session::Gateway;
use crate::Error;

/// Outcome of qualifying a candidate set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedContracts {
    /// Contracts the gateway resolved, in candidate order.
    pub contracts: Vec<Contract>,
    /// Number of candidates submitted.
    pub candidates: usize,
    /// Number of candidates the gateway could not resolve.
    pub dropped: usize,
}

impl QualifiedContracts {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    pub fn contract_ids(&self) -> Vec<i32> {
        self.contracts.iter().map(|contract| contract.contract_id).collect()
    }
}

/// Submits `candidates` to the gateway in one batch and keeps the resolved contracts.
pub async fn qualify<G: Gateway + ?Sized>(gateway: &G, candidates: &[Contract]) -> Result<QualifiedContracts, Error> {
    if candidates.is_empty() {
        return Ok(QualifiedContracts::default());
    }

    let results = gateway.qualify_batch(candidates).await?;

    if results.len() != candidates.len() {
        return Err(Error::Simple(format!(
            "qualification returned {} results for {} candidates",
            results.len(),
            candidates.len()
        )));
    }

    let mut contracts = Vec::with_capacity(candidates.len());
    for (candidate, result) in candidates.iter().zip(results) {
        match result {
            Some(contract) if contract.has_contract_id() => contracts.push(contract),
            Some(_) => debug!("dropping {}: resolved without a contract id", describe(candidate)),
            None => debug!("dropping {}: not resolved", describe(candidate)),
        }
    }

    let dropped = candidates.len() - contracts.len();
    if dropped > 0 {
        info!("{dropped} of {} candidates did not qualify", candidates.len());
    }

    Ok(QualifiedContracts {
        contracts,
        candidates: candidates.len(),
        dropped,
    })
}

fn describe(contract: &Contract) -> String {
    if contract.has_contract_id() {
        return format!("contract {}", contract.contract_id);
    }

    let mut parts = vec![contract.symbol.clone(), contract.security_type.to_string()];
    if !contract.last_trade_date_or_contract_month.is_empty() {
        parts.push(contract.last_trade_date_or_contract_month.clone());
    }
    if contract.strike != 0.0 {
        parts.push(contract.strike.to_string());
    }
    if !contract.right.is_empty() {
        parts.push(contract.right.clone());
    }
    if !contract.trading_class.is_empty() {
        parts.push(contract.trading_class.clone());
    }
    parts.push(format!("@{}", contract.exchange));
    parts.join(" ")
}
