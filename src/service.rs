//! Caller facing operations over a [Gateway].
//!
//! Validation happens before any gateway traffic. Gateway failures surface as errors, while
//! candidates and tickers the gateway cannot resolve only shrink the result.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::contracts::{Contract, OptionRight, SecurityType};
use crate::market_data::TickerData;
use crate::options::{filter, qualify, resolve_chain, OptionsCriteria, OptionsFilters, QualifiedContracts};
use crate::session::Gateway;
use crate::Error;

pub use crate::options::Underlying;

/// Option terms narrowing a [ContractQuery].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOptions {
    #[serde(default)]
    pub last_trade_date_or_contract_month: String,
    #[serde(default)]
    pub strike: f64,
    #[serde(default)]
    pub right: Option<OptionRight>,
    #[serde(default)]
    pub trading_class: String,
}

/// A partially specified contract to resolve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractQuery {
    pub symbol: String,
    #[serde(rename = "secType")]
    pub security_type: SecurityType,
    pub exchange: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ContractOptions>,
}

impl ContractQuery {
    pub fn new(symbol: &str, security_type: SecurityType, exchange: &str) -> ContractQuery {
        ContractQuery {
            symbol: symbol.to_string(),
            security_type,
            exchange: exchange.to_string(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: ContractOptions) -> ContractQuery {
        self.options = Some(options);
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.symbol.trim().is_empty() {
            return Err(Error::InvalidArgument("symbol must not be empty".into()));
        }
        if self.exchange.trim().is_empty() {
            return Err(Error::InvalidArgument("exchange must not be empty".into()));
        }
        Ok(())
    }

    fn to_contract(&self) -> Contract {
        let mut contract = Contract {
            symbol: self.symbol.clone(),
            security_type: self.security_type.clone(),
            exchange: self.exchange.clone(),
            ..Default::default()
        };

        if let Some(options) = &self.options {
            contract.last_trade_date_or_contract_month = options.last_trade_date_or_contract_month.clone();
            contract.strike = options.strike;
            contract.right = options.right.map(|right| right.to_string()).unwrap_or_default();
            contract.trading_class = options.trading_class.clone();
        }

        contract
    }
}

/// Option chain resolution on top of a gateway.
pub struct OptionsService<G: Gateway> {
    gateway: G,
}

impl<G: Gateway> OptionsService<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Resolves a partially specified contract. Empty when the gateway finds no unique match.
    pub async fn resolve_contract_details(&self, query: &ContractQuery) -> Result<Vec<Contract>, Error> {
        query.validate()?;
        self.gateway.ensure_connected().await?;

        let qualified = qualify(&self.gateway, &[query.to_contract()]).await?;
        if qualified.is_empty() {
            info!("no contract matches {} {} on {}", query.symbol, query.security_type, query.exchange);
        }

        Ok(qualified.contracts)
    }

    /// Expands the chain of `underlying` narrowed by `filters` and qualifies every candidate.
    ///
    /// Candidates the gateway cannot resolve are dropped and counted in the result.
    pub async fn resolve_options_chain(&self, underlying: &Underlying, filters: &OptionsFilters) -> Result<QualifiedContracts, Error> {
        underlying.validate()?;
        filters.validate()?;
        self.gateway.ensure_connected().await?;

        let resolved = resolve_chain(&self.gateway, underlying, filters).await?;

        let candidates: Vec<Contract> = resolved.candidates(&underlying.symbol).iter().map(|leg| leg.to_contract()).collect();
        debug!("generated {} candidates for {}", candidates.len(), underlying.symbol);

        let qualified = qualify(&self.gateway, &candidates).await?;
        info!(
            "{} of {} candidates for {} qualified",
            qualified.contracts.len(),
            qualified.candidates,
            underlying.symbol
        );

        Ok(qualified)
    }

    /// Snapshots the qualified chain and keeps the tickers matching `criteria`.
    pub async fn filtered_options_tickers(
        &self,
        underlying: &Underlying,
        filters: &OptionsFilters,
        criteria: Option<&OptionsCriteria>,
    ) -> Result<Vec<TickerData>, Error> {
        if let Some(criteria) = criteria {
            criteria.validate()?;
        }

        let chain = self.resolve_options_chain(underlying, filters).await?;
        if chain.is_empty() {
            info!("no qualified contracts for {}, skipping market data", underlying.symbol);
            return Ok(Vec::new());
        }

        let tickers = self.gateway.snapshot_contracts(&chain.contracts).await?;
        let received = tickers.len();

        let tickers = filter(tickers, criteria);
        debug!("{} of {received} tickers for {} match the criteria", tickers.len(), underlying.symbol);

        Ok(tickers)
    }

    /// Snapshots the given contracts, or every contract seen by the session when `contract_ids` is `None`.
    pub async fn list_tickers(&self, contract_ids: Option<&[i32]>) -> Result<Vec<TickerData>, Error> {
        if matches!(contract_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        self.gateway.ensure_connected().await?;
        self.gateway.request_snapshot(contract_ids).await
    }
}
