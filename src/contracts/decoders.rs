use crate::messages::ResponseMessage;
use crate::Error;

use super::{ContractDetails, OptionChain, SecurityType};

// Negotiated servers are at or above SIZE_RULES, so contract data carries no version field.
pub(crate) fn decode_contract_details(message: &mut ResponseMessage) -> Result<ContractDetails, Error> {
    message.skip(); // message type
    message.skip(); // request id

    let mut details = ContractDetails::default();

    details.contract.symbol = message.next_string()?;
    details.contract.security_type = SecurityType::from(message.next_string()?.as_str());
    details.contract.last_trade_date_or_contract_month = last_trade_date(&message.next_string()?);
    details.contract.strike = message.next_double()?;
    details.contract.right = message.next_string()?;
    details.contract.exchange = message.next_string()?;
    details.contract.currency = message.next_string()?;
    details.contract.local_symbol = message.next_string()?;
    details.market_name = message.next_string()?;
    details.contract.trading_class = message.next_string()?;
    details.contract.contract_id = message.next_int()?;
    details.min_tick = message.next_double()?;
    details.contract.multiplier = message.next_string()?;
    message.skip(); // order types
    message.skip(); // valid exchanges
    message.skip(); // price magnifier
    details.under_contract_id = message.next_int()?;
    details.long_name = message.next_string()?;
    details.contract.primary_exchange = message.next_string()?;

    Ok(details)
}

// "20250505 16:00 US/Central" and "20250505-16:00" both carry the date first.
fn last_trade_date(value: &str) -> String {
    value.split(['-', ' ']).next().unwrap_or_default().to_string()
}

pub(crate) fn decode_option_chain(message: &mut ResponseMessage) -> Result<OptionChain, Error> {
    message.skip(); // message type
    message.skip(); // request id

    let mut option_chain = OptionChain {
        exchange: message.next_string()?,
        underlying_contract_id: message.next_int()?,
        trading_class: message.next_string()?,
        multiplier: message.next_string()?,
        ..Default::default()
    };

    let expirations_count = message.next_int()?;
    option_chain.expirations.reserve(expirations_count.max(0) as usize);
    for _ in 0..expirations_count {
        option_chain.expirations.push(message.next_string()?);
    }

    let strikes_count = message.next_int()?;
    option_chain.strikes.reserve(strikes_count.max(0) as usize);
    for _ in 0..strikes_count {
        option_chain.strikes.push(message.next_double()?);
    }

    Ok(option_chain)
}
