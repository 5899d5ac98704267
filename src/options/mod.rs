//! The option chain pipeline.
//!
//! Chain parameters reported by the gateway are merged with caller filters ([filters]), expanded into
//! candidate contracts ([candidates]), qualified against the gateway ([qualifier]) and, once market data
//! is available, narrowed down by greek bounds ([criteria]).

use serde::{Deserialize, Serialize};

use crate::contracts::SecurityType;
use crate::Error;

pub mod candidates;
pub mod criteria;
pub mod filters;
pub mod qualifier;

pub use candidates::{generate, OptionLeg};
pub use criteria::{filter, OptionsCriteria};
pub use filters::{resolve_chain, OptionsFilters, ResolvedFilters};
pub use qualifier::{qualify, QualifiedContracts};

/// The instrument an option chain is written on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Underlying {
    pub symbol: String,
    #[serde(rename = "secType")]
    pub security_type: SecurityType,
    #[serde(rename = "conId")]
    pub contract_id: i32,
}

impl Underlying {
    pub fn new(symbol: &str, security_type: SecurityType, contract_id: i32) -> Underlying {
        Underlying {
            symbol: symbol.to_string(),
            security_type,
            contract_id,
        }
    }

    pub fn index(symbol: &str, contract_id: i32) -> Underlying {
        Underlying::new(symbol, SecurityType::Index, contract_id)
    }

    pub fn stock(symbol: &str, contract_id: i32) -> Underlying {
        Underlying::new(symbol, SecurityType::Stock, contract_id)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.symbol.trim().is_empty() {
            return Err(Error::InvalidArgument("underlying symbol must not be empty".into()));
        }
        Ok(())
    }
}
