//! Contract definitions for instruments resolved against the gateway.
//!
//! A [Contract] describes an instrument. Its `contract_id` is assigned by the gateway and is
//! only authoritative once the contract has been qualified.

use std::fmt::Debug;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::ToField;

pub(crate) mod decoders;
pub(crate) mod encoders;

// Models

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
/// SecurityType enumerates available security types
pub enum SecurityType {
    /// Not specified; lets the gateway match on other fields such as the contract id
    #[default]
    Unspecified,
    /// Stock (or ETF)
    Stock,
    /// Option
    Option,
    /// Future
    Future,
    /// Index
    Index,
    /// Futures option
    FuturesOption,
    /// Forex pair
    ForexPair,
    /// Combo
    Spread,
    /// Bond
    Bond,
    /// Other
    Other(String),
}

impl ToField for SecurityType {
    fn to_field(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for SecurityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityType::Unspecified => Ok(()),
            SecurityType::Stock => write!(f, "STK"),
            SecurityType::Option => write!(f, "OPT"),
            SecurityType::Future => write!(f, "FUT"),
            SecurityType::Index => write!(f, "IND"),
            SecurityType::FuturesOption => write!(f, "FOP"),
            SecurityType::ForexPair => write!(f, "CASH"),
            SecurityType::Spread => write!(f, "BAG"),
            SecurityType::Bond => write!(f, "BOND"),
            SecurityType::Other(name) => write!(f, "{name}"),
        }
    }
}

impl SecurityType {
    pub fn from(name: &str) -> SecurityType {
        match name {
            "" => SecurityType::Unspecified,
            "STK" => SecurityType::Stock,
            "OPT" => SecurityType::Option,
            "FUT" => SecurityType::Future,
            "IND" => SecurityType::Index,
            "FOP" => SecurityType::FuturesOption,
            "CASH" => SecurityType::ForexPair,
            "BAG" => SecurityType::Spread,
            "BOND" => SecurityType::Bond,
            other => {
                warn!("Unknown security type: {other}. Defaulting to Other");
                SecurityType::Other(other.to_string())
            }
        }
    }
}

impl From<String> for SecurityType {
    fn from(name: String) -> Self {
        SecurityType::from(name.to_uppercase().as_str())
    }
}

impl From<SecurityType> for String {
    fn from(security_type: SecurityType) -> Self {
        security_type.to_string()
    }
}

/// Right of an option contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    #[serde(rename = "C", alias = "CALL", alias = "c")]
    Call,
    #[serde(rename = "P", alias = "PUT", alias = "p")]
    Put,
}

impl OptionRight {
    /// Both rights, calls first.
    pub const ALL: [OptionRight; 2] = [OptionRight::Call, OptionRight::Put];
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionRight::Call => write!(f, "C"),
            OptionRight::Put => write!(f, "P"),
        }
    }
}

impl ToField for OptionRight {
    fn to_field(&self) -> String {
        self.to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Contract describes an instrument's definition
pub struct Contract {
    /// The unique IB contract identifier. Zero until the contract is qualified.
    #[serde(rename = "conId")]
    pub contract_id: i32,
    /// The underlying's asset symbol.
    pub symbol: String,
    #[serde(rename = "secType")]
    pub security_type: SecurityType,
    /// Last trading day (YYYYMMDD) or contract month (YYYYMM).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_trade_date_or_contract_month: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub strike: f64,
    /// Either P or C for options, empty otherwise.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub right: String,
    #[serde(default)]
    pub multiplier: String,
    /// The destination exchange.
    pub exchange: String,
    #[serde(default)]
    pub currency: String,
    /// The contract's symbol within its primary exchange. For options, the OCC symbol.
    #[serde(default)]
    pub local_symbol: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub primary_exchange: String,
    /// The trading class name for this contract, e.g. SPXW for weekly SPX options.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trading_class: String,
    #[serde(skip)]
    pub include_expired: bool,
    #[serde(skip)]
    pub security_id_type: String,
    #[serde(skip)]
    pub security_id: String,
    #[serde(skip)]
    pub issuer_id: String,
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

impl Contract {
    /// Creates a partially specified contract identified only by its contract id.
    ///
    /// ```
    /// use ibchain::contracts::Contract;
    ///
    /// let contract = Contract::with_id(416904);
    /// assert_eq!(contract.contract_id, 416904);
    /// assert!(contract.symbol.is_empty());
    /// ```
    pub fn with_id(contract_id: i32) -> Contract {
        Contract {
            contract_id,
            ..Default::default()
        }
    }

    /// Creates an option contract routed through SMART.
    pub fn option(symbol: &str, expiration: &str, strike: f64, right: OptionRight, trading_class: &str) -> Contract {
        Contract {
            symbol: symbol.to_string(),
            security_type: SecurityType::Option,
            last_trade_date_or_contract_month: expiration.to_string(),
            strike,
            right: right.to_string(),
            exchange: "SMART".to_string(),
            trading_class: trading_class.to_string(),
            ..Default::default()
        }
    }

    /// Returns `true` once a contract id has been assigned.
    pub fn has_contract_id(&self) -> bool {
        self.contract_id != 0
    }

    /// Symbol shown to callers: the local symbol when known.
    pub fn display_symbol(&self) -> &str {
        if self.local_symbol.is_empty() {
            &self.symbol
        } else {
            &self.local_symbol
        }
    }
}

/// Details returned by the gateway for a matching contract.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContractDetails {
    /// A fully-defined Contract object.
    pub contract: Contract,
    pub market_name: String,
    pub min_tick: f64,
    /// For derivatives, the contract ID (conID) of the underlying instrument.
    pub under_contract_id: i32,
    pub long_name: String,
}

/// Option chain parameters reported for an underlying on one exchange and trading class.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChain {
    /// The contract ID of the underlying security.
    pub underlying_contract_id: i32,
    /// The option trading class.
    pub trading_class: String,
    /// The option multiplier.
    pub multiplier: String,
    /// Exchange for which the derivative is hosted.
    pub exchange: String,
    /// The expiries for the options of this underlying on this exchange.
    pub expirations: Vec<String>,
    /// The possible strikes for options of this underlying on this exchange.
    pub strikes: Vec<f64>,
}
