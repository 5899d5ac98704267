use crate::contracts::Contract;
use crate::messages::{OutgoingMessages, RequestMessage};
use crate::Error;

use super::MarketDataType;

pub(crate) fn encode_request_market_data_type(market_data_type: MarketDataType) -> Result<RequestMessage, Error> {
    const VERSION: i32 = 1;

    let mut message = RequestMessage::new();

    message.push_field(&OutgoingMessages::RequestMarketDataType);
    message.push_field(&VERSION);
    message.push_field(&market_data_type);

    Ok(message)
}

// Snapshots need no generic ticks; model option computations are sent by default for options.
pub(crate) fn encode_request_snapshot(request_id: i32, contract: &Contract) -> Result<RequestMessage, Error> {
    const VERSION: i32 = 11;

    let mut message = RequestMessage::new();

    message.push_field(&OutgoingMessages::RequestMarketData);
    message.push_field(&VERSION);
    message.push_field(&request_id);
    message.push_field(&contract.contract_id);
    message.push_field(&contract.symbol);
    message.push_field(&contract.security_type);
    message.push_field(&contract.last_trade_date_or_contract_month);
    message.push_field(&contract.strike);
    message.push_field(&contract.right);
    message.push_field(&contract.multiplier);
    message.push_field(&contract.exchange);
    message.push_field(&contract.primary_exchange);
    message.push_field(&contract.currency);
    message.push_field(&contract.local_symbol);
    message.push_field(&contract.trading_class);
    message.push_field(&false); // delta neutral contract
    message.push_field(&""); // generic ticks
    message.push_field(&true); // snapshot
    message.push_field(&false); // regulatory snapshot
    message.push_field(&""); // market data options

    Ok(message)
}

pub(crate) fn encode_cancel_market_data(request_id: i32) -> Result<RequestMessage, Error> {
    const VERSION: i32 = 1;

    let mut message = RequestMessage::new();

    message.push_field(&OutgoingMessages::CancelMarketData);
    message.push_field(&VERSION);
    message.push_field(&request_id);

    Ok(message)
}
