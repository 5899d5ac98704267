//! Resolves loosely specified option chain requests into qualified, market-data-validated
//! contracts using the Interactive Brokers [TWS API](https://interactivebrokers.github.io/tws-api/introduction.html).
//!
//! A single long-lived [GatewaySession](crate::session::GatewaySession) owns the socket to TWS or IB Gateway.
//! [OptionsService](crate::service::OptionsService) composes it into the caller facing operations:
//!
//! * resolving a partially specified contract,
//! * expanding and qualifying an option chain,
//! * fetching snapshots for a chain and filtering them by greeks,
//! * listing tickers by contract id.
//!
//!```no_run
//! use ibchain::config::GatewayConfig;
//! use ibchain::options::OptionsFilters;
//! use ibchain::service::{OptionsService, Underlying};
//! use ibchain::session::GatewaySession;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = GatewaySession::new(GatewayConfig::from_env()?);
//!     let service = OptionsService::new(session);
//!
//!     let spx = Underlying::index("SPX", 416904);
//!     let filters = OptionsFilters::for_expirations(&["20250505"]);
//!
//!     let chain = service.resolve_options_chain(&spx, &filters).await?;
//!     println!("{} contracts qualified, {} dropped", chain.contracts.len(), chain.dropped);
//!
//!     service.gateway().disconnect().await;
//!     Ok(())
//! }
//!```

/// Gateway connection settings.
pub mod config;

/// A [Contract](crate::contracts::Contract) object represents trading instruments such as stocks, indexes or options.
///
/// Contracts submitted for qualification are matched by the gateway against a single candidate. Ambiguous or unknown
/// descriptions do not resolve.
pub mod contracts;

/// Snapshot market data and greeks.
pub mod market_data;

/// Low level wire messages.
pub mod messages;

/// Option chain filters, candidate generation, qualification and greek criteria.
pub mod options;

/// The caller facing resolution operations.
pub mod service;

/// The gateway session and its connection lifecycle.
pub mod session;

/// The message bus connecting a session to the gateway socket.
pub mod transport;

mod connection;
mod errors;
mod server_versions;

#[cfg(test)]
pub(crate) mod stubs;

pub use errors::Error;

pub(crate) trait ToField {
    fn to_field(&self) -> String;
}

impl ToField for bool {
    fn to_field(&self) -> String {
        if *self {
            String::from("1")
        } else {
            String::from("0")
        }
    }
}

impl ToField for String {
    fn to_field(&self) -> String {
        self.clone()
    }
}

impl ToField for &str {
    fn to_field(&self) -> String {
        <&str>::clone(self).to_string()
    }
}

impl ToField for usize {
    fn to_field(&self) -> String {
        self.to_string()
    }
}

impl ToField for i32 {
    fn to_field(&self) -> String {
        self.to_string()
    }
}

impl ToField for Option<i32> {
    fn to_field(&self) -> String {
        encode_option_field(self)
    }
}

impl ToField for f64 {
    fn to_field(&self) -> String {
        self.to_string()
    }
}

impl ToField for Option<f64> {
    fn to_field(&self) -> String {
        encode_option_field(self)
    }
}

fn encode_option_field<T: ToField>(val: &Option<T>) -> String {
    match val {
        Some(val) => val.to_field(),
        None => String::from(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_field() {
        assert_eq!(true.to_field(), "1");
        assert_eq!(false.to_field(), "0");
        assert_eq!(5490.0.to_field(), "5490");
        assert_eq!(0.05.to_field(), "0.05");
        assert_eq!(Some(12).to_field(), "12");
        assert_eq!(None::<f64>.to_field(), "");
    }
}
