use crate::messages::ResponseMessage;
use crate::Error;

use super::{Greeks, Tick, TickType};

pub(crate) fn decode_tick_price(message: &mut ResponseMessage) -> Result<Tick, Error> {
    message.skip(); // message type
    message.skip(); // message version
    message.skip(); // request id

    let tick_type = TickType::from(message.next_int()?);
    let price = next_value(message, -1.0)?;

    Ok(Tick::Price { tick_type, price })
}

// Servers from version 156 on send no version and always include the tick attribute.
pub(crate) fn decode_tick_option_computation(message: &mut ResponseMessage) -> Result<Tick, Error> {
    message.skip(); // message type
    message.skip(); // request id

    let tick_type = TickType::from(message.next_int()?);
    message.skip(); // tick attribute

    let implied_volatility = next_value(message, -1.0)?;
    let delta = next_value(message, -2.0)?;
    message.skip(); // option price
    message.skip(); // present value dividend
    let gamma = next_value(message, -2.0)?;
    let vega = next_value(message, -2.0)?;
    let theta = next_value(message, -2.0)?;

    Ok(Tick::OptionComputation {
        tick_type,
        greeks: Greeks {
            delta,
            gamma,
            theta,
            vega,
            implied_volatility,
        },
    })
}

fn next_value(message: &mut ResponseMessage, none_value: f64) -> Result<Option<f64>, Error> {
    Ok(message.next_optional_double()?.filter(|value| *value != none_value))
}
