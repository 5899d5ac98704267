//! The long-lived gateway session.
//!
//! A [GatewaySession] owns one logical connection to TWS/IB Gateway and exposes the raw
//! request primitives the option chain pipeline is built on. The connection is opened lazily,
//! shared by concurrent callers and replaced transparently after the socket fails. Every message
//! sent through the session is paced below the gateway's rate limit.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;

use crate::config::GatewayConfig;
use crate::connection::Connection;
use crate::contracts::decoders::{decode_contract_details, decode_option_chain};
use crate::contracts::encoders::{encode_request_contract_data, encode_request_option_chain};
use crate::contracts::{Contract, ContractDetails, OptionChain, SecurityType};
use crate::market_data::decoders::{decode_tick_option_computation, decode_tick_price};
use crate::market_data::encoders::{encode_cancel_market_data, encode_request_market_data_type, encode_request_snapshot};
use crate::market_data::{MarketDataType, TickerData};
use crate::messages::{IncomingMessages, Notice, RequestMessage};
use crate::transport::pacing::RequestPacer;
use crate::transport::{MessageBus, Subscription, TcpMessageBus};
use crate::Error;

// Requests sent back to back before pacing kicks in.
const PACING_BURST: u32 = 5;

/// Request primitives offered by the gateway.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Connects when there is no live connection. A no-op while connected.
    async fn ensure_connected(&self) -> Result<(), Error>;

    /// Option chain parameters for an underlying, one entry per exchange and trading class.
    ///
    /// Empty when the gateway knows no chain for the underlying.
    async fn query_chain_params(&self, symbol: &str, security_type: &SecurityType, contract_id: i32) -> Result<Vec<OptionChain>, Error>;

    /// Resolves partially specified contracts. Results are index-aligned with `candidates`;
    /// `None` marks a candidate the gateway could not resolve to a unique contract.
    async fn qualify_batch(&self, candidates: &[Contract]) -> Result<Vec<Option<Contract>>, Error>;

    /// Market data snapshots for `contract_ids`, or for every contract snapshotted so far when `None`.
    async fn request_snapshot(&self, contract_ids: Option<&[i32]>) -> Result<Vec<TickerData>, Error>;

    /// Market data snapshots for contracts already qualified by [Gateway::qualify_batch].
    async fn snapshot_contracts(&self, contracts: &[Contract]) -> Result<Vec<TickerData>, Error> {
        let contract_ids: Vec<i32> = contracts.iter().map(|contract| contract.contract_id).collect();
        self.request_snapshot(Some(&contract_ids)).await
    }
}

/// Opens a message bus to the gateway.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &GatewayConfig) -> Result<Arc<dyn MessageBus>, Error>;
}

/// Connects over TCP to the configured host and port.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &GatewayConfig) -> Result<Arc<dyn MessageBus>, Error> {
        let address = config.address();
        info!("connecting to gateway at {address} with client id {}", config.client_id);

        let connection = Connection::connect(&address, config.client_id).await?;
        let bus: Arc<dyn MessageBus> = TcpMessageBus::start(connection);

        Ok(bus)
    }
}

/// Single shared session with the gateway.
///
/// ```no_run
/// use ibchain::config::GatewayConfig;
/// use ibchain::session::{Gateway, GatewaySession};
///
/// # async fn run() -> Result<(), ibchain::Error> {
/// let session = GatewaySession::new(GatewayConfig::from_env()?);
/// session.ensure_connected().await?;
///
/// let tickers = session.request_snapshot(Some(&[416904])).await?;
/// println!("{tickers:?}");
///
/// session.disconnect().await;
/// # Ok(())
/// # }
/// ```
pub struct GatewaySession {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    bus: Mutex<Option<Arc<dyn MessageBus>>>,
    pacer: RequestPacer,
    tickers: RwLock<TickerRegistry>,
}

impl GatewaySession {
    /// Creates a session that connects over TCP on first use.
    pub fn new(config: GatewayConfig) -> GatewaySession {
        GatewaySession::with_connector(config, Arc::new(TcpConnector))
    }

    pub fn with_connector(config: GatewayConfig, connector: Arc<dyn Connector>) -> GatewaySession {
        GatewaySession {
            pacer: RequestPacer::new(config.max_requests_per_second, PACING_BURST),
            tickers: RwLock::new(TickerRegistry::new(config.max_tracked_tickers)),
            config,
            connector,
            bus: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Closes the connection and forgets the tracked tickers. Safe to call more than once.
    pub async fn disconnect(&self) {
        let bus = self.bus.lock().await.take();
        if let Some(bus) = bus {
            bus.shutdown().await;
        }
        self.tickers.write().await.clear();
    }

    // Holding the lock across the connect makes concurrent callers share one attempt.
    async fn bus(&self) -> Result<Arc<dyn MessageBus>, Error> {
        let mut current = self.bus.lock().await;

        if let Some(bus) = current.take() {
            if bus.is_connected() {
                *current = Some(bus.clone());
                return Ok(bus);
            }
            warn!("gateway connection lost, reconnecting");
            bus.shutdown().await;
        }

        let connect_timeout = self.config.connect_timeout;
        let bus = with_timeout(connect_timeout, self.connector.connect(&self.config), || {
            format!("connecting to {} after {connect_timeout:?}", self.config.address())
        })
        .await?;

        *current = Some(bus.clone());
        Ok(bus)
    }

    async fn resolve_contract_ids(&self, contract_ids: &[i32]) -> Result<Vec<Contract>, Error> {
        let mut unique: Vec<i32> = Vec::with_capacity(contract_ids.len());
        for contract_id in contract_ids {
            if !unique.contains(contract_id) {
                unique.push(*contract_id);
            }
        }

        let candidates: Vec<Contract> = unique.iter().map(|contract_id| Contract::with_id(*contract_id)).collect();
        let resolved = self.qualify_batch(&candidates).await?;

        let mut contracts = Vec::with_capacity(resolved.len());
        for (contract_id, contract) in unique.iter().zip(resolved) {
            match contract {
                Some(contract) if contract.has_contract_id() => contracts.push(contract),
                _ => warn!("contract id {contract_id} did not resolve, skipping"),
            }
        }

        Ok(contracts)
    }
}

#[async_trait]
impl Gateway for GatewaySession {
    async fn ensure_connected(&self) -> Result<(), Error> {
        self.bus().await.map(|_| ())
    }

    async fn query_chain_params(&self, symbol: &str, security_type: &SecurityType, contract_id: i32) -> Result<Vec<OptionChain>, Error> {
        let bus = self.bus().await?;
        let bus = PacedBus::new(bus.as_ref(), &self.pacer);

        let request_id = bus.next_request_id();
        let request = encode_request_option_chain(request_id, symbol, "", security_type, contract_id)?;
        let mut subscription = bus.send_request(request_id, &request).await?;

        let chains = with_timeout(self.config.request_timeout, collect_option_chains(&mut subscription, symbol), || {
            format!("option chain parameters for {symbol}")
        })
        .await?;

        debug!("received {} option chains for {symbol} ({contract_id})", chains.len());
        Ok(chains)
    }

    async fn qualify_batch(&self, candidates: &[Contract]) -> Result<Vec<Option<Contract>>, Error> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let bus = self.bus().await?;
        let bus = PacedBus::new(bus.as_ref(), &self.pacer);
        debug!("qualifying {} contracts", candidates.len());

        let request_timeout = self.config.request_timeout;
        let lookups: Vec<_> = candidates
            .iter()
            .map(|candidate| qualify_one(bus, candidate, request_timeout))
            .collect();

        stream::iter(lookups).buffered(self.config.max_in_flight).try_collect().await
    }

    async fn request_snapshot(&self, contract_ids: Option<&[i32]>) -> Result<Vec<TickerData>, Error> {
        let contracts = match contract_ids {
            Some(contract_ids) if contract_ids.is_empty() => return Ok(Vec::new()),
            Some(contract_ids) => self.resolve_contract_ids(contract_ids).await?,
            None => self.tickers.read().await.contracts(),
        };

        self.snapshot_contracts(&contracts).await
    }

    async fn snapshot_contracts(&self, contracts: &[Contract]) -> Result<Vec<TickerData>, Error> {
        if contracts.is_empty() {
            info!("no contracts to snapshot");
            return Ok(Vec::new());
        }

        let bus = self.bus().await?;
        let bus = PacedBus::new(bus.as_ref(), &self.pacer);

        let market_data_type = self
            .config
            .market_data_type
            .unwrap_or_else(|| MarketDataType::for_time(OffsetDateTime::now_utc()));
        debug!("requesting {market_data_type} market data for {} contracts", contracts.len());
        bus.send_message(&encode_request_market_data_type(market_data_type)?).await?;

        {
            let mut tickers = self.tickers.write().await;
            for contract in contracts {
                tickers.record(contract);
            }
        }

        let snapshot_timeout = self.config.snapshot_timeout;
        let snapshots: Vec<_> = contracts.iter().map(|contract| snapshot(bus, contract, snapshot_timeout)).collect();

        stream::iter(snapshots).buffered(self.config.max_in_flight).try_collect().await
    }
}

// Contracts snapshotted through the session, least recently snapshotted first.
struct TickerRegistry {
    capacity: usize,
    order: VecDeque<i32>,
    contracts: HashMap<i32, Contract>,
}

impl TickerRegistry {
    fn new(capacity: usize) -> TickerRegistry {
        TickerRegistry {
            capacity,
            order: VecDeque::new(),
            contracts: HashMap::new(),
        }
    }

    fn record(&mut self, contract: &Contract) {
        if self.contracts.insert(contract.contract_id, contract.clone()).is_some() {
            self.order.retain(|contract_id| *contract_id != contract.contract_id);
        }
        self.order.push_back(contract.contract_id);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.contracts.remove(&oldest);
            }
        }
    }

    fn contracts(&self) -> Vec<Contract> {
        self.order.iter().filter_map(|contract_id| self.contracts.get(contract_id).cloned()).collect()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.contracts.clear();
    }
}

// Message bus view whose sends wait for the session's pacer.
#[derive(Clone, Copy)]
struct PacedBus<'a> {
    bus: &'a dyn MessageBus,
    pacer: &'a RequestPacer,
}

impl<'a> PacedBus<'a> {
    fn new(bus: &'a dyn MessageBus, pacer: &'a RequestPacer) -> PacedBus<'a> {
        PacedBus { bus, pacer }
    }

    fn server_version(&self) -> i32 {
        self.bus.server_version()
    }

    fn next_request_id(&self) -> i32 {
        self.bus.next_request_id()
    }

    async fn send_request(&self, request_id: i32, message: &RequestMessage) -> Result<Subscription, Error> {
        self.pacer.acquire().await;
        self.bus.send_request(request_id, message).await
    }

    async fn send_message(&self, message: &RequestMessage) -> Result<(), Error> {
        self.pacer.acquire().await;
        self.bus.send_message(message).await
    }
}

async fn with_timeout<T, F, M>(duration: Duration, future: F, describe: M) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
    M: FnOnce() -> String,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(describe())),
    }
}

async fn collect_option_chains(subscription: &mut Subscription, symbol: &str) -> Result<Vec<OptionChain>, Error> {
    let mut chains = Vec::new();

    while let Some(mut message) = subscription.next().await {
        match message.message_type() {
            IncomingMessages::SecurityDefinitionOptionParameter => chains.push(decode_option_chain(&mut message)?),
            IncomingMessages::SecurityDefinitionOptionParameterEnd => return Ok(chains),
            IncomingMessages::Error => {
                let notice = Notice::from(&message);
                if notice.is_informational() {
                    info!("option chain for {symbol}: {notice}");
                    continue;
                }
                if notice.is_pacing_violation() {
                    return Err(Error::Pacing(format!("option chain for {symbol}: {notice}")));
                }
                return Err(Error::UpstreamQuery(format!("option chain for {symbol}: {notice}")));
            }
            _ => return Err(Error::UnexpectedResponse(message)),
        }
    }

    Err(Error::ConnectionReset)
}

async fn contract_details(bus: PacedBus<'_>, contract: &Contract, request_timeout: Duration) -> Result<Vec<ContractDetails>, Error> {
    let request_id = bus.next_request_id();
    let request = encode_request_contract_data(bus.server_version(), request_id, contract)?;
    let mut subscription = bus.send_request(request_id, &request).await?;

    with_timeout(request_timeout, collect_contract_details(&mut subscription, request_id), || {
        format!("contract data {request_id} for {}", describe(contract))
    })
    .await
}

async fn collect_contract_details(subscription: &mut Subscription, request_id: i32) -> Result<Vec<ContractDetails>, Error> {
    let mut details = Vec::new();

    while let Some(mut message) = subscription.next().await {
        match message.message_type() {
            IncomingMessages::ContractData => details.push(decode_contract_details(&mut message)?),
            IncomingMessages::ContractDataEnd => return Ok(details),
            IncomingMessages::Error => {
                let notice = Notice::from(&message);
                if notice.is_informational() {
                    debug!("contract data {request_id}: {notice}");
                    continue;
                }
                if notice.is_pacing_violation() {
                    return Err(Error::Pacing(format!("contract data {request_id}: {notice}")));
                }
                return Err(Error::Message(notice.code, notice.message));
            }
            _ => return Err(Error::UnexpectedResponse(message)),
        }
    }

    Err(Error::ConnectionReset)
}

// Connection failures and pacing rejections fail the batch; anything else means this candidate is unresolved.
async fn qualify_one(bus: PacedBus<'_>, candidate: &Contract, request_timeout: Duration) -> Result<Option<Contract>, Error> {
    match contract_details(bus, candidate, request_timeout).await {
        Ok(details) => Ok(select_match(candidate, details)),
        Err(err) if err.is_connection_error() || matches!(err, Error::Pacing(_)) => Err(err),
        Err(err) => {
            debug!("could not qualify {}: {err}", describe(candidate));
            Ok(None)
        }
    }
}

fn describe(contract: &Contract) -> String {
    if contract.has_contract_id() {
        format!("contract {}", contract.contract_id)
    } else {
        format!(
            "{} {} {}{}",
            contract.symbol, contract.last_trade_date_or_contract_month, contract.strike, contract.right
        )
    }
}

fn select_match(candidate: &Contract, details: Vec<ContractDetails>) -> Option<Contract> {
    let mut contracts: Vec<Contract> = details.into_iter().map(|details| details.contract).collect();

    match contracts.len() {
        0 => None,
        1 => contracts.pop(),
        // a contract id listed on several exchanges is still one instrument
        _ if candidate.has_contract_id() && contracts.iter().all(|contract| contract.contract_id == candidate.contract_id) => {
            let position = contracts.iter().position(|contract| contract.exchange == "SMART").unwrap_or(0);
            Some(contracts.swap_remove(position))
        }
        matches => {
            debug!("{matches} contracts match {}, ambiguous", describe(candidate));
            None
        }
    }
}

async fn snapshot(bus: PacedBus<'_>, contract: &Contract, snapshot_timeout: Duration) -> Result<TickerData, Error> {
    let request_id = bus.next_request_id();
    let request = encode_request_snapshot(request_id, contract)?;
    let mut subscription = bus.send_request(request_id, &request).await?;

    let mut ticker = TickerData::for_contract(contract);

    match timeout(snapshot_timeout, collect_ticks(&mut subscription, &mut ticker)).await {
        Ok(result) => result?,
        Err(_) => {
            warn!(
                "snapshot for contract {} timed out after {snapshot_timeout:?}, returning partial data",
                contract.contract_id
            );
            if let Err(err) = bus.send_message(&encode_cancel_market_data(request_id)?).await {
                warn!("could not cancel snapshot {request_id}: {err}");
            }
        }
    }

    Ok(ticker)
}

async fn collect_ticks(subscription: &mut Subscription, ticker: &mut TickerData) -> Result<(), Error> {
    while let Some(mut message) = subscription.next().await {
        let tick = match message.message_type() {
            IncomingMessages::TickPrice => decode_tick_price(&mut message),
            IncomingMessages::TickOptionComputation => decode_tick_option_computation(&mut message),
            IncomingMessages::TickSnapshotEnd => return Ok(()),
            IncomingMessages::Error => {
                let notice = Notice::from(&message);
                if notice.is_informational() {
                    debug!("snapshot for contract {}: {notice}", ticker.contract_id);
                    continue;
                }
                if notice.is_pacing_violation() {
                    return Err(Error::Pacing(format!("snapshot for contract {}: {notice}", ticker.contract_id)));
                }
                warn!("snapshot for contract {} ended by gateway: {notice}", ticker.contract_id);
                return Ok(());
            }
            _ => continue,
        };

        match tick {
            Ok(tick) => ticker.apply(&tick),
            Err(err) => warn!("skipping undecodable tick for contract {}: {err}", ticker.contract_id),
        }
    }

    Err(Error::ConnectionReset)
}
