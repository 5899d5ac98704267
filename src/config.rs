use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::debug;
use time::OffsetDateTime;

use crate::market_data::MarketDataType;
use crate::Error;

pub const HOST_VAR: &str = "IB_GATEWAY_HOST";
pub const PORT_VAR: &str = "IB_GATEWAY_PORT";
pub const CLIENT_ID_VAR: &str = "IB_GATEWAY_CLIENT_ID";
pub const CONNECT_TIMEOUT_VAR: &str = "IB_CONNECT_TIMEOUT_SECS";
pub const REQUEST_TIMEOUT_VAR: &str = "IB_REQUEST_TIMEOUT_SECS";
pub const SNAPSHOT_TIMEOUT_VAR: &str = "IB_SNAPSHOT_TIMEOUT_SECS";
pub const MAX_IN_FLIGHT_VAR: &str = "IB_MAX_IN_FLIGHT";
pub const MAX_REQUESTS_PER_SECOND_VAR: &str = "IB_MAX_REQUESTS_PER_SEC";
pub const MAX_TRACKED_TICKERS_VAR: &str = "IB_MAX_TRACKED_TICKERS";
pub const MARKET_DATA_TYPE_VAR: &str = "IB_MARKET_DATA_TYPE";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(11);
const DEFAULT_MAX_IN_FLIGHT: usize = 45;
// The gateway rejects clients above 50 messages per second.
const DEFAULT_MAX_REQUESTS_PER_SECOND: u32 = 45;
const DEFAULT_MAX_TRACKED_TICKERS: usize = 1000;

/// Settings for the gateway session.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Client id presented to the gateway. Must be unique among connected clients.
    pub client_id: i32,
    /// Bounds the handshake and session start.
    pub connect_timeout: Duration,
    /// Bounds the wait for the answer to one request, such as a single contract lookup or a chain
    /// parameter query. Time spent paced before sending is not counted.
    pub request_timeout: Duration,
    /// Bounds each market data snapshot.
    pub snapshot_timeout: Duration,
    /// Maximum number of contract data requests outstanding at once.
    pub max_in_flight: usize,
    /// Rate at which requests are sent to the gateway.
    pub max_requests_per_second: u32,
    /// Contracts remembered for listing every ticker. The least recently snapshotted are forgotten first.
    pub max_tracked_tickers: usize,
    /// Market data type requested before snapshots. `None` selects live during regular NYSE hours and frozen otherwise.
    pub market_data_type: Option<MarketDataType>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: default_client_id(OffsetDateTime::now_utc()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            max_tracked_tickers: DEFAULT_MAX_TRACKED_TICKERS,
            market_data_type: None,
        }
    }
}

impl GatewayConfig {
    /// Builds a config from `IB_*` environment variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(host) = read_var(HOST_VAR) {
            config.host = host;
        }
        if let Some(port) = parse_var(PORT_VAR)? {
            config.port = port;
        }
        if let Some(client_id) = parse_var(CLIENT_ID_VAR)? {
            config.client_id = client_id;
        }
        if let Some(secs) = parse_var(CONNECT_TIMEOUT_VAR)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(REQUEST_TIMEOUT_VAR)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(SNAPSHOT_TIMEOUT_VAR)? {
            config.snapshot_timeout = Duration::from_secs(secs);
        }
        if let Some(max_in_flight) = parse_positive(MAX_IN_FLIGHT_VAR)? {
            config.max_in_flight = max_in_flight;
        }
        if let Some(max_requests_per_second) = parse_positive::<u32>(MAX_REQUESTS_PER_SECOND_VAR)? {
            config.max_requests_per_second = max_requests_per_second;
        }
        if let Some(max_tracked_tickers) = parse_positive(MAX_TRACKED_TICKERS_VAR)? {
            config.max_tracked_tickers = max_tracked_tickers;
        }
        if let Some(market_data_type) = parse_var(MARKET_DATA_TYPE_VAR)? {
            config.market_data_type = Some(market_data_type);
        }

        debug!("gateway config: {config:?}");

        Ok(config)
    }

    /// Socket address of the gateway.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// HHMMSS of the given UTC time.
fn default_client_id(now: OffsetDateTime) -> i32 {
    now.hour() as i32 * 10_000 + now.minute() as i32 * 100 + now.second() as i32
}

fn read_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match read_var(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|err| Error::InvalidArgument(format!("{name}={value:?}: {err}"))),
        None => Ok(None),
    }
}

fn parse_positive<T>(name: &str) -> Result<Option<T>, Error>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    match parse_var::<T>(name)? {
        Some(value) if value == T::default() => Err(Error::InvalidArgument(format!("{name} must be at least 1"))),
        value => Ok(value),
    }
}
