//! Snapshot market data for qualified contracts.
//!
//! A snapshot is a one-shot market data request: the gateway sends whatever ticks it has for the
//! contract and terminates the stream with a snapshot end message. Ticks are folded into a
//! [TickerData] record as they arrive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::contracts::{Contract, SecurityType};
use crate::{Error, ToField};

pub(crate) mod decoders;
pub(crate) mod encoders;
mod hours;

pub use hours::is_regular_trading_hours;

/// Market data type requested before snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketDataType {
    /// Live market data
    #[serde(alias = "live")]
    Realtime = 1,
    /// Last recorded data when the market is closed
    Frozen = 2,
    /// Delayed market data (usually 15-20 minutes)
    Delayed = 3,
    /// Delayed frozen market data
    DelayedFrozen = 4,
}

impl ToField for MarketDataType {
    fn to_field(&self) -> String {
        (*self as i32).to_string()
    }
}

impl fmt::Display for MarketDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketDataType::Realtime => "live",
            MarketDataType::Frozen => "frozen",
            MarketDataType::Delayed => "delayed",
            MarketDataType::DelayedFrozen => "delayed_frozen",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MarketDataType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "live" => Ok(MarketDataType::Realtime),
            "frozen" => Ok(MarketDataType::Frozen),
            "delayed" => Ok(MarketDataType::Delayed),
            "delayed_frozen" => Ok(MarketDataType::DelayedFrozen),
            other => Err(Error::InvalidArgument(format!(
                "unknown market data type {other:?}, expected live, frozen, delayed or delayed_frozen"
            ))),
        }
    }
}

/// Tick types folded into [TickerData]. Everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickType {
    Unknown = -1,
    Bid = 1,
    Ask = 2,
    Last = 4,
    Close = 9,
    ModelOption = 13,
    DelayedBid = 66,
    DelayedAsk = 67,
    DelayedLast = 68,
    DelayedClose = 75,
    DelayedModelOption = 83,
}

impl From<i32> for TickType {
    fn from(value: i32) -> Self {
        match value {
            1 => TickType::Bid,
            2 => TickType::Ask,
            4 => TickType::Last,
            9 => TickType::Close,
            13 => TickType::ModelOption,
            66 => TickType::DelayedBid,
            67 => TickType::DelayedAsk,
            68 => TickType::DelayedLast,
            75 => TickType::DelayedClose,
            83 => TickType::DelayedModelOption,
            _ => TickType::Unknown,
        }
    }
}

/// Option sensitivities from the gateway's option model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Greeks {
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    #[serde(rename = "impliedVol", default)]
    pub implied_volatility: Option<f64>,
}

/// Snapshot of prices and greeks for one contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerData {
    pub contract_id: i32,
    pub symbol: String,
    #[serde(rename = "secType")]
    pub security_type: SecurityType,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// `None` when the contract is not an option or the model has not produced values.
    pub greeks: Option<Greeks>,
}

impl TickerData {
    /// Empty ticker for a contract. Fields are filled in as ticks arrive.
    pub fn for_contract(contract: &Contract) -> TickerData {
        TickerData {
            contract_id: contract.contract_id,
            symbol: contract.display_symbol().to_string(),
            security_type: contract.security_type.clone(),
            ..Default::default()
        }
    }

    /// `true` when no price or greek has been received.
    pub fn is_empty(&self) -> bool {
        self.last.is_none() && self.bid.is_none() && self.ask.is_none() && self.greeks.is_none()
    }

    pub(crate) fn apply(&mut self, tick: &Tick) {
        match tick {
            Tick::Price { tick_type, price } => match tick_type {
                TickType::Bid | TickType::DelayedBid => self.bid = *price,
                TickType::Ask | TickType::DelayedAsk => self.ask = *price,
                TickType::Last | TickType::DelayedLast => self.last = *price,
                _ => {}
            },
            Tick::OptionComputation { tick_type, greeks } => {
                if matches!(tick_type, TickType::ModelOption | TickType::DelayedModelOption) {
                    self.greeks = Some(*greeks);
                }
            }
        }
    }
}

/// A decoded tick relevant to [TickerData].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tick {
    /// `price` is `None` when the gateway reports no value.
    Price { tick_type: TickType, price: Option<f64> },
    OptionComputation { tick_type: TickType, greeks: Greeks },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_market_data_type_parsing() {
        let cases = [
            ("live", MarketDataType::Realtime),
            ("LIVE", MarketDataType::Realtime),
            ("frozen", MarketDataType::Frozen),
            ("delayed", MarketDataType::Delayed),
            ("delayed_frozen", MarketDataType::DelayedFrozen),
        ];

        for (value, expected) in cases {
            assert_eq!(value.parse::<MarketDataType>().unwrap(), expected, "{value}");
        }

        for value in ["streaming", "realtime", "4", ""] {
            assert!(matches!(value.parse::<MarketDataType>(), Err(Error::InvalidArgument(_))), "{value}");
        }
        assert_eq!(MarketDataType::Frozen.to_field(), "2");
        assert_eq!(MarketDataType::Realtime.to_string(), "live");
    }

    #[test]
    fn test_apply_ticks() {
        let contract = Contract {
            contract_id: 785934122,
            symbol: "SPX".into(),
            local_symbol: "SPXW  250505P05490000".into(),
            security_type: SecurityType::Option,
            ..Default::default()
        };
        let mut ticker = TickerData::for_contract(&contract);
        assert!(ticker.is_empty());

        let greeks = Greeks {
            delta: Some(-0.05),
            ..Default::default()
        };

        ticker.apply(&Tick::Price {
            tick_type: TickType::Bid,
            price: Some(1.10),
        });
        ticker.apply(&Tick::Price {
            tick_type: TickType::DelayedAsk,
            price: Some(1.20),
        });
        ticker.apply(&Tick::Price {
            tick_type: TickType::Close,
            price: Some(1.00),
        });
        ticker.apply(&Tick::OptionComputation {
            tick_type: TickType::Unknown,
            greeks: Greeks::default(),
        });
        ticker.apply(&Tick::OptionComputation {
            tick_type: TickType::ModelOption,
            greeks,
        });

        assert_eq!(
            ticker,
            TickerData {
                contract_id: 785934122,
                symbol: "SPXW  250505P05490000".into(),
                security_type: SecurityType::Option,
                last: None,
                bid: Some(1.10),
                ask: Some(1.20),
                greeks: Some(greeks),
            }
        );
    }

    #[test]
    fn test_ticker_json_shape() {
        let ticker = TickerData {
            contract_id: 416904,
            symbol: "SPX".into(),
            security_type: SecurityType::Index,
            last: Some(5500.25),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&ticker).unwrap(),
            serde_json::json!({
                "contractId": 416904,
                "symbol": "SPX",
                "secType": "IND",
                "last": 5500.25,
                "bid": null,
                "ask": null,
                "greeks": null,
            })
        );
    }
}
