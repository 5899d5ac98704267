use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use ibchain::config::GatewayConfig;
use ibchain::contracts::{Contract, OptionChain, OptionRight, SecurityType};
use ibchain::market_data::{Greeks, TickerData};
use ibchain::messages::RequestMessage;
use ibchain::options::{OptionsCriteria, OptionsFilters};
use ibchain::service::{OptionsService, Underlying};
use ibchain::session::{Connector, Gateway, GatewaySession};
use ibchain::transport::{MessageBus, Subscription};
use ibchain::Error;

const EXPIRATION: &str = "20250505";

/// Gateway with one SPXW expiration listed, counting every call.
#[derive(Default)]
struct SpxGateway {
    chain_queries: AtomicUsize,
    qualified_batches: Mutex<Vec<usize>>,
    snapshot_requests: Mutex<Vec<Vec<i32>>>,
}

fn put_id(strike: f64) -> i32 {
    785_000_000 + strike as i32
}

fn put_delta(strike: f64) -> f64 {
    (strike - 5500.0) / 200.0
}

#[async_trait]
impl Gateway for SpxGateway {
    async fn ensure_connected(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn query_chain_params(&self, symbol: &str, security_type: &SecurityType, contract_id: i32) -> Result<Vec<OptionChain>, Error> {
        self.chain_queries.fetch_add(1, Ordering::SeqCst);
        assert_eq!((symbol, security_type, contract_id), ("SPX", &SecurityType::Index, 416904));

        Ok(vec![
            OptionChain {
                underlying_contract_id: 416904,
                trading_class: "SPXW".into(),
                multiplier: "100".into(),
                exchange: "SMART".into(),
                expirations: vec![EXPIRATION.into(), "20250506".into()],
                strikes: vec![5480.0, 5485.0, 5488.0, 5490.0, 5495.0],
            },
            OptionChain {
                underlying_contract_id: 416904,
                trading_class: "SPX".into(),
                multiplier: "100".into(),
                exchange: "SMART".into(),
                expirations: vec!["20250516".into()],
                strikes: vec![5400.0, 5500.0],
            },
        ])
    }

    async fn qualify_batch(&self, candidates: &[Contract]) -> Result<Vec<Option<Contract>>, Error> {
        self.qualified_batches.lock().unwrap().push(candidates.len());

        Ok(candidates
            .iter()
            .map(|candidate| {
                let listed = candidate.trading_class == "SPXW"
                    && candidate.last_trade_date_or_contract_month == EXPIRATION
                    && candidate.right == "P"
                    && candidate.strike != 5495.0;
                listed.then(|| Contract {
                    contract_id: put_id(candidate.strike),
                    local_symbol: format!("SPXW  250505P0{}000", candidate.strike),
                    ..candidate.clone()
                })
            })
            .collect())
    }

    async fn request_snapshot(&self, contract_ids: Option<&[i32]>) -> Result<Vec<TickerData>, Error> {
        let contract_ids = contract_ids.expect("pipeline requests explicit contract ids").to_vec();
        self.snapshot_requests.lock().unwrap().push(contract_ids.clone());

        Ok(contract_ids
            .iter()
            .map(|contract_id| {
                let strike = (contract_id - 785_000_000) as f64;
                TickerData {
                    contract_id: *contract_id,
                    symbol: format!("SPXW  250505P0{strike}000"),
                    security_type: SecurityType::Option,
                    bid: Some(1.0),
                    ask: Some(1.1),
                    greeks: Some(Greeks {
                        delta: Some(put_delta(strike)),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            })
            .collect())
    }
}

#[tokio::test]
async fn test_spx_pipeline_filters_by_delta() {
    let service = OptionsService::new(SpxGateway::default());

    let filters: OptionsFilters = serde_json::from_value(serde_json::json!({
        "expirations": [EXPIRATION],
        "tradingClass": ["SPXW"],
        "rights": ["P"],
    }))
    .expect("filters");
    let criteria: OptionsCriteria = serde_json::from_value(serde_json::json!({"minDelta": -0.06, "maxDelta": -0.04})).expect("criteria");

    let tickers = service
        .filtered_options_tickers(&Underlying::index("SPX", 416904), &filters, Some(&criteria))
        .await
        .expect("tickers");

    // deltas: 5480 -0.10, 5485 -0.075, 5488 -0.06, 5490 -0.05
    let ids: Vec<i32> = tickers.iter().map(|ticker| ticker.contract_id).collect();
    assert_eq!(ids, vec![put_id(5488.0), put_id(5490.0)]);
    for ticker in &tickers {
        let delta = ticker.greeks.and_then(|greeks| greeks.delta).expect("delta");
        assert!((-0.06..=-0.04).contains(&delta), "{delta}");
    }

    let gateway = service.gateway();
    assert_eq!(gateway.chain_queries.load(Ordering::SeqCst), 1);
    assert_eq!(*gateway.qualified_batches.lock().unwrap(), vec![5]);
    assert_eq!(
        *gateway.snapshot_requests.lock().unwrap(),
        vec![vec![put_id(5480.0), put_id(5485.0), put_id(5488.0), put_id(5490.0)]]
    );
}

#[tokio::test]
async fn test_spx_chain_reports_dropped_candidates() {
    let service = OptionsService::new(SpxGateway::default());

    let filters = OptionsFilters::for_expirations(&[EXPIRATION]).with_rights(&[OptionRight::Put]);
    let chain = service
        .resolve_options_chain(&Underlying::index("SPX", 416904), &filters)
        .await
        .expect("chain");

    // strikes from the first chain, trading classes from both
    assert_eq!(chain.candidates, 5 * 2);
    assert_eq!(chain.contracts.len(), 4);
    assert_eq!(chain.dropped, 6);

    let json = serde_json::to_value(&chain).expect("json");
    assert_eq!(json["contracts"][0]["conId"], put_id(5480.0));
    assert_eq!(json["contracts"][0]["secType"], "OPT");
    assert_eq!(json["dropped"], 6);
}

/// A connected bus that never answers.
struct SilentBus {
    next_request_id: AtomicI32,
}

#[async_trait]
impl MessageBus for SilentBus {
    fn server_version(&self) -> i32 {
        176
    }

    fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn send_request(&self, request_id: i32, _message: &RequestMessage) -> Result<Subscription, Error> {
        let (_, receiver) = mpsc::unbounded_channel();
        Ok(Subscription::new(request_id, receiver))
    }

    async fn send_message(&self, _message: &RequestMessage) -> Result<(), Error> {
        Ok(())
    }

    async fn shutdown(&self) {}
}

#[derive(Default)]
struct CountingConnector {
    connects: AtomicUsize,
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, _config: &GatewayConfig) -> Result<Arc<dyn MessageBus>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SilentBus {
            next_request_id: AtomicI32::new(9000),
        }))
    }
}

#[tokio::test]
async fn test_ensure_connected_reuses_the_session() {
    let connector = Arc::new(CountingConnector::default());
    let session = GatewaySession::with_connector(GatewayConfig::default(), connector.clone());

    for _ in 0..5 {
        session.ensure_connected().await.expect("connected");
    }

    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

    session.disconnect().await;
    session.ensure_connected().await.expect("reconnected");
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}
