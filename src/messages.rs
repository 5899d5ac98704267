//! Message encoding and decoding for the TWS/Gateway socket protocol.
//!
//! Requests are lists of fields joined by NUL and prefixed with their length.
//! Responses are split back into fields and consumed with a cursor.

use std::fmt::Display;
use std::io::Write;
use std::ops::Index;
use std::str::{self, FromStr};

use byteorder::{BigEndian, WriteBytesExt};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Error, ToField};

const INFINITY_STR: &str = "Infinity";
const UNSET_DOUBLE: &str = "1.7976931348623157E308";
const UNSET_INTEGER: &str = "2147483647";

// Index of message text in an error message
pub(crate) const MESSAGE_INDEX: usize = 4;
// Index of message code in an error message
pub(crate) const CODE_INDEX: usize = 3;

/// Messages emitted by TWS/Gateway that this crate understands.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum IncomingMessages {
    /// Unknown or unsupported message id.
    NotValid = -1,
    TickPrice = 1,
    TickSize = 2,
    /// Error or notice (includes request id and code).
    Error = 4,
    NextValidId = 9,
    ContractData = 10,
    ManagedAccounts = 15,
    TickOptionComputation = 21,
    TickGeneric = 45,
    TickString = 46,
    ContractDataEnd = 52,
    TickSnapshotEnd = 57,
    MarketDataType = 58,
    SecurityDefinitionOptionParameter = 75,
    SecurityDefinitionOptionParameterEnd = 76,
    TickReqParams = 81,
}

impl From<i32> for IncomingMessages {
    fn from(value: i32) -> IncomingMessages {
        match value {
            1 => IncomingMessages::TickPrice,
            2 => IncomingMessages::TickSize,
            4 => IncomingMessages::Error,
            9 => IncomingMessages::NextValidId,
            10 => IncomingMessages::ContractData,
            15 => IncomingMessages::ManagedAccounts,
            21 => IncomingMessages::TickOptionComputation,
            45 => IncomingMessages::TickGeneric,
            46 => IncomingMessages::TickString,
            52 => IncomingMessages::ContractDataEnd,
            57 => IncomingMessages::TickSnapshotEnd,
            58 => IncomingMessages::MarketDataType,
            75 => IncomingMessages::SecurityDefinitionOptionParameter,
            76 => IncomingMessages::SecurityDefinitionOptionParameterEnd,
            81 => IncomingMessages::TickReqParams,
            _ => IncomingMessages::NotValid,
        }
    }
}

/// Return the message field index containing the request id, if present.
pub fn request_id_index(kind: IncomingMessages) -> Option<usize> {
    match kind {
        IncomingMessages::ContractData => Some(1),
        IncomingMessages::ContractDataEnd => Some(2),
        IncomingMessages::Error => Some(2),
        IncomingMessages::MarketDataType => Some(2),
        IncomingMessages::SecurityDefinitionOptionParameter => Some(1),
        IncomingMessages::SecurityDefinitionOptionParameterEnd => Some(1),
        IncomingMessages::TickGeneric => Some(2),
        IncomingMessages::TickOptionComputation => Some(1),
        IncomingMessages::TickPrice => Some(2),
        IncomingMessages::TickReqParams => Some(1),
        IncomingMessages::TickSize => Some(2),
        IncomingMessages::TickSnapshotEnd => Some(2),
        IncomingMessages::TickString => Some(2),
        _ => {
            debug!("could not determine request id index for {kind:?} (this message type may not have a request id).");
            None
        }
    }
}

/// Outgoing message opcodes sent to TWS/Gateway.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum OutgoingMessages {
    RequestMarketData = 1,
    CancelMarketData = 2,
    RequestContractData = 9,
    RequestMarketDataType = 59,
    StartApi = 71,
    RequestSecurityDefinitionOptionalParameters = 78,
}

impl ToField for OutgoingMessages {
    fn to_field(&self) -> String {
        (*self as i32).to_string()
    }
}

impl std::fmt::Display for OutgoingMessages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Encode the outbound message length prefix using the IB wire format.
pub fn encode_length(message: &str) -> Vec<u8> {
    let data = message.as_bytes();

    let mut packet: Vec<u8> = Vec::with_capacity(data.len() + 4);

    // writes into a Vec cannot fail
    let _ = packet.write_u32::<BigEndian>(data.len() as u32);
    let _ = packet.write_all(data);
    packet
}

/// Builder for outbound request messages.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub(crate) fields: Vec<String>,
}

impl RequestMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_field<T: ToField>(&mut self, val: &T) -> &RequestMessage {
        let field = val.to_field();
        self.fields.push(field);
        self
    }

    /// Serialize all fields into the NUL-delimited wire format.
    pub fn encode(&self) -> String {
        let mut data = self.fields.join("\0");
        data.push('\0');
        data
    }

    /// Serialize the message as a pipe-delimited string.
    pub fn encode_simple(&self) -> String {
        let mut data = self.fields.join("|");
        data.push('|');
        data
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.fields.len()
    }
}

impl Index<usize> for RequestMessage {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.fields[i]
    }
}

/// Parsed inbound message.
#[derive(Clone, Default, Debug)]
pub struct ResponseMessage {
    /// Cursor index for incremental decoding.
    pub i: usize,
    pub fields: Vec<String>,
}

impl ResponseMessage {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Return the discriminator identifying the message payload.
    pub fn message_type(&self) -> IncomingMessages {
        if self.fields.is_empty() {
            IncomingMessages::NotValid
        } else {
            let message_id = i32::from_str(&self.fields[0]).unwrap_or(-1);
            IncomingMessages::from(message_id)
        }
    }

    /// Try to extract the request id from the message.
    pub fn request_id(&self) -> Option<i32> {
        if let Some(i) = request_id_index(self.message_type()) {
            if let Ok(request_id) = self.peek_int(i) {
                return Some(request_id);
            }
        }
        None
    }

    pub fn peek_int(&self, i: usize) -> Result<i32, Error> {
        if i >= self.fields.len() {
            return Err(Error::Simple("expected int and found end of message".into()));
        }

        let field = &self.fields[i];
        match field.parse() {
            Ok(val) => Ok(val),
            Err(err) => Err(Error::Parse(i, field.into(), err.to_string())),
        }
    }

    pub fn peek_string(&self, i: usize) -> String {
        self.fields.get(i).cloned().unwrap_or_default()
    }

    pub fn next_int(&mut self) -> Result<i32, Error> {
        let field = self.next_field("int")?;

        match field.parse() {
            Ok(val) => Ok(val),
            Err(err) => Err(Error::Parse(self.i, field, err.to_string())),
        }
    }

    /// Consume the next field returning `None` when unset.
    pub fn next_optional_int(&mut self) -> Result<Option<i32>, Error> {
        let field = self.next_field("optional int")?;

        if field.is_empty() || field == UNSET_INTEGER {
            return Ok(None);
        }

        match field.parse::<i32>() {
            Ok(val) => Ok(Some(val)),
            Err(err) => Err(Error::Parse(self.i, field, err.to_string())),
        }
    }

    pub fn next_string(&mut self) -> Result<String, Error> {
        self.next_field("string")
    }

    pub fn next_double(&mut self) -> Result<f64, Error> {
        let field = self.next_field("double")?;

        if field.is_empty() || field == "0" || field == "0.0" {
            return Ok(0.0);
        }

        match field.parse() {
            Ok(val) => Ok(val),
            Err(err) => Err(Error::Parse(self.i, field, err.to_string())),
        }
    }

    /// Consume the next field as an optional floating-point value.
    pub fn next_optional_double(&mut self) -> Result<Option<f64>, Error> {
        let field = self.next_field("optional double")?;

        if field.is_empty() || field == UNSET_DOUBLE {
            return Ok(None);
        }

        if field == INFINITY_STR {
            return Ok(Some(f64::INFINITY));
        }

        match field.parse() {
            Ok(val) => Ok(Some(val)),
            Err(err) => Err(Error::Parse(self.i, field, err.to_string())),
        }
    }

    fn next_field(&mut self, expected: &str) -> Result<String, Error> {
        if self.i >= self.fields.len() {
            return Err(Error::Simple(format!("expected {expected} and found end of message")));
        }

        let field = self.fields[self.i].clone();
        self.i += 1;
        Ok(field)
    }

    /// Build a response message from a NUL-delimited payload.
    pub fn from(fields: &str) -> ResponseMessage {
        ResponseMessage {
            i: 0,
            fields: fields.split_terminator('\x00').map(|x| x.to_string()).collect(),
        }
    }

    /// Build a response message from a pipe-delimited payload.
    pub fn from_simple(fields: &str) -> ResponseMessage {
        ResponseMessage {
            i: 0,
            fields: fields.split_terminator('|').map(|x| x.to_string()).collect(),
        }
    }

    /// Advance the cursor past the next field.
    pub fn skip(&mut self) {
        self.i += 1;
    }

    pub fn encode(&self) -> String {
        let mut data = self.fields.join("\0");
        data.push('\0');
        data
    }

    pub fn encode_simple(&self) -> String {
        let mut data = self.fields.join("|");
        data.push('|');
        data
    }
}

/// An error or informational message from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub code: i32,
    pub message: String,
}

/// Range of codes that are warnings (2100-2169), e.g. market data farm status.
pub const WARNING_CODE_RANGE: std::ops::RangeInclusive<i32> = 2100..=2169;

/// Connectivity status codes.
/// - 1100: Connectivity lost
/// - 1101: Connectivity restored, market data lost (resubscribe needed)
/// - 1102: Connectivity restored, market data maintained
/// - 1300: Socket port reset during active connection
pub const SYSTEM_MESSAGE_CODES: [i32; 4] = [1100, 1101, 1102, 1300];

/// Max rate of messages per second has been exceeded.
pub const PACING_VIOLATION_CODE: i32 = 100;

/// Market data notices that accompany usable (delayed or partial) data.
/// - 10089/10090: requested market data requires additional subscription, partial data returned
/// - 10167: displaying delayed market data
pub const MARKET_DATA_NOTICE_CODES: [i32; 3] = [10089, 10090, 10167];

impl Notice {
    pub fn from(message: &ResponseMessage) -> Notice {
        let code = message.peek_int(CODE_INDEX).unwrap_or(-1);
        let message = message.peek_string(MESSAGE_INDEX);
        Notice { code, message }
    }

    pub fn is_warning(&self) -> bool {
        WARNING_CODE_RANGE.contains(&self.code) || MARKET_DATA_NOTICE_CODES.contains(&self.code)
    }

    /// Returns `true` when the gateway dropped a request for exceeding its message rate.
    pub fn is_pacing_violation(&self) -> bool {
        self.code == PACING_VIOLATION_CODE
    }

    pub fn is_system_message(&self) -> bool {
        SYSTEM_MESSAGE_CODES.contains(&self.code)
    }

    /// Returns `true` if this notice does not terminate the request it is addressed to.
    pub fn is_informational(&self) -> bool {
        self.is_warning() || self.is_system_message()
    }

    pub fn is_error(&self) -> bool {
        !self.is_informational()
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
