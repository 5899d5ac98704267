use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::GatewayConfig;
use crate::contracts::{Contract, OptionChain, SecurityType};
use crate::market_data::TickerData;
use crate::messages::{RequestMessage, ResponseMessage};
use crate::session::{Connector, Gateway};
use crate::transport::{MessageBus, Subscription};
use crate::Error;

type Responder = dyn Fn(i32, &RequestMessage) -> Vec<String> + Send + Sync;

/// Records requests and answers each one with canned `|` separated responses.
///
/// Subscriptions stay open after their responses until the connection is dropped.
pub(crate) struct MessageBusStub {
    pub request_messages: RwLock<Vec<RequestMessage>>,
    responder: Arc<Responder>,
    server_version: i32,
    next_request_id: AtomicI32,
    connected: AtomicBool,
    shutdowns: AtomicUsize,
    open_channels: Mutex<Vec<mpsc::UnboundedSender<ResponseMessage>>>,
}

impl MessageBusStub {
    pub fn new(responder: Arc<Responder>) -> MessageBusStub {
        MessageBusStub {
            request_messages: RwLock::new(Vec::new()),
            responder,
            server_version: 176,
            next_request_id: AtomicI32::new(9000),
            connected: AtomicBool::new(true),
            shutdowns: AtomicUsize::new(0),
            open_channels: Mutex::new(Vec::new()),
        }
    }

    /// Requests sent so far, `|` separated.
    pub fn request_messages(&self) -> Vec<String> {
        self.request_messages
            .read()
            .unwrap()
            .iter()
            .map(|message| message.encode_simple())
            .collect()
    }

    /// Simulates socket loss: pending subscriptions end and the bus reports disconnected.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.open_channels.lock().unwrap().clear();
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn record(&self, message: &RequestMessage) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.request_messages.write().unwrap().push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl MessageBus for MessageBusStub {
    fn server_version(&self) -> i32 {
        self.server_version
    }

    fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_request(&self, request_id: i32, message: &RequestMessage) -> Result<Subscription, Error> {
        self.record(message)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        for response in (self.responder)(request_id, message) {
            sender.send(ResponseMessage::from_simple(&response)).unwrap();
        }
        self.open_channels.lock().unwrap().push(sender);

        Ok(Subscription::new(request_id, receiver))
    }

    async fn send_message(&self, message: &RequestMessage) -> Result<(), Error> {
        self.record(message)
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
    }
}

/// Hands out [MessageBusStub]s and counts connection attempts.
pub(crate) struct StubConnector {
    responder: Arc<Responder>,
    failure: Option<Error>,
    delay: Option<Duration>,
    connects: AtomicUsize,
    buses: Mutex<Vec<Arc<MessageBusStub>>>,
}

impl StubConnector {
    pub fn responding<F>(responder: F) -> StubConnector
    where
        F: Fn(i32, &RequestMessage) -> Vec<String> + Send + Sync + 'static,
    {
        StubConnector {
            responder: Arc::new(responder),
            failure: None,
            delay: None,
            connects: AtomicUsize::new(0),
            buses: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: Error) -> StubConnector {
        StubConnector {
            failure: Some(error),
            ..StubConnector::responding(|_, _| vec![])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> StubConnector {
        self.delay = Some(delay);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_bus(&self) -> Arc<MessageBusStub> {
        self.buses.lock().unwrap().last().cloned().expect("no bus connected")
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn connect(&self, _config: &GatewayConfig) -> Result<Arc<dyn MessageBus>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let bus = Arc::new(MessageBusStub::new(self.responder.clone()));
        self.buses.lock().unwrap().push(bus.clone());

        Ok(bus as Arc<dyn MessageBus>)
    }
}

type Qualifier = dyn Fn(&Contract) -> Option<Contract> + Send + Sync;

/// Gateway answering from canned data, with call counters.
pub(crate) struct GatewayStub {
    chains: Vec<OptionChain>,
    chain_error: Option<Error>,
    qualifier: Box<Qualifier>,
    qualify_error: Option<Error>,
    tickers: Vec<TickerData>,
    connect_error: Option<Error>,
    connects: AtomicUsize,
    chain_query_args: Mutex<Vec<(String, SecurityType, i32)>>,
    qualify_batches: Mutex<Vec<Vec<Contract>>>,
    snapshot_requests: Mutex<Vec<Option<Vec<i32>>>>,
    snapshotted_contracts: Mutex<Vec<Vec<i32>>>,
}

impl GatewayStub {
    pub fn new() -> GatewayStub {
        GatewayStub {
            chains: Vec::new(),
            chain_error: None,
            qualifier: Box::new(|_| None),
            qualify_error: None,
            tickers: Vec::new(),
            connect_error: None,
            connects: AtomicUsize::new(0),
            chain_query_args: Mutex::new(Vec::new()),
            qualify_batches: Mutex::new(Vec::new()),
            snapshot_requests: Mutex::new(Vec::new()),
            snapshotted_contracts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chains(mut self, chains: Vec<OptionChain>) -> GatewayStub {
        self.chains = chains;
        self
    }

    pub fn with_chain_error(mut self, error: Error) -> GatewayStub {
        self.chain_error = Some(error);
        self
    }

    pub fn with_qualifier<F>(mut self, qualifier: F) -> GatewayStub
    where
        F: Fn(&Contract) -> Option<Contract> + Send + Sync + 'static,
    {
        self.qualifier = Box::new(qualifier);
        self
    }

    pub fn with_qualify_error(mut self, error: Error) -> GatewayStub {
        self.qualify_error = Some(error);
        self
    }

    pub fn with_tickers(mut self, tickers: Vec<TickerData>) -> GatewayStub {
        self.tickers = tickers;
        self
    }

    pub fn with_connect_error(mut self, error: Error) -> GatewayStub {
        self.connect_error = Some(error);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn chain_queries(&self) -> usize {
        self.chain_query_args.lock().unwrap().len()
    }

    pub fn chain_query_args(&self) -> Vec<(String, SecurityType, i32)> {
        self.chain_query_args.lock().unwrap().clone()
    }

    pub fn qualify_calls(&self) -> usize {
        self.qualify_batches.lock().unwrap().len()
    }

    pub fn qualify_batches(&self) -> Vec<Vec<Contract>> {
        self.qualify_batches.lock().unwrap().clone()
    }

    pub fn snapshot_requests(&self) -> Vec<Option<Vec<i32>>> {
        self.snapshot_requests.lock().unwrap().clone()
    }

    /// Contract ids of each batch passed to `snapshot_contracts`.
    pub fn snapshotted_contracts(&self) -> Vec<Vec<i32>> {
        self.snapshotted_contracts.lock().unwrap().clone()
    }

    fn tickers_for(&self, contract_ids: &[i32]) -> Vec<TickerData> {
        self.tickers
            .iter()
            .filter(|ticker| contract_ids.contains(&ticker.contract_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Gateway for GatewayStub {
    async fn ensure_connected(&self) -> Result<(), Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.connect_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn query_chain_params(&self, symbol: &str, security_type: &SecurityType, contract_id: i32) -> Result<Vec<OptionChain>, Error> {
        self.chain_query_args
            .lock()
            .unwrap()
            .push((symbol.to_string(), security_type.clone(), contract_id));

        match &self.chain_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.chains.clone()),
        }
    }

    async fn qualify_batch(&self, candidates: &[Contract]) -> Result<Vec<Option<Contract>>, Error> {
        self.qualify_batches.lock().unwrap().push(candidates.to_vec());

        match &self.qualify_error {
            Some(error) => Err(error.clone()),
            None => Ok(candidates.iter().map(|candidate| (self.qualifier)(candidate)).collect()),
        }
    }

    async fn request_snapshot(&self, contract_ids: Option<&[i32]>) -> Result<Vec<TickerData>, Error> {
        self.snapshot_requests.lock().unwrap().push(contract_ids.map(|ids| ids.to_vec()));

        let tickers = match contract_ids {
            Some(ids) => self.tickers_for(ids),
            None => self.tickers.clone(),
        };

        Ok(tickers)
    }

    async fn snapshot_contracts(&self, contracts: &[Contract]) -> Result<Vec<TickerData>, Error> {
        let contract_ids: Vec<i32> = contracts.iter().map(|contract| contract.contract_id).collect();
        let tickers = self.tickers_for(&contract_ids);
        self.snapshotted_contracts.lock().unwrap().push(contract_ids);

        Ok(tickers)
    }
}
