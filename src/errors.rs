use std::sync::Arc;
use std::{num::ParseIntError, string::FromUtf8Error};

use crate::messages::{IncomingMessages, Notice, ResponseMessage};

/// Errors raised while resolving option chains against the gateway.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    // Errors from external libraries
    Io(Arc<std::io::Error>),
    ParseInt(ParseIntError),
    FromUtf8(FromUtf8Error),
    ParseTime(time::error::Parse),

    // Connectivity
    ConnectionFailed(String),
    ConnectionReset,
    NotConnected,
    ServerVersion(i32, i32, String),
    Timeout(String),

    // Gateway answered without usable data for the request
    UpstreamQuery(String),
    /// Gateway rejected a request for exceeding its message rate.
    Pacing(String),
    /// Gateway reported an error for a request: code and message.
    Message(i32, String),

    // Rejected before any I/O
    InvalidArgument(String),

    // Protocol
    Parse(usize, String, String),
    UnexpectedResponse(ResponseMessage),
    UnexpectedEndOfStream,
    Simple(String),
}

impl Error {
    /// Returns `true` for failures of the gateway connection itself.
    ///
    /// These are fatal to the current request but leave the session usable once
    /// connectivity is restored.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionFailed(_) | Error::ConnectionReset | Error::NotConnected | Error::ServerVersion(..) | Error::Timeout(_)
        )
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(ref err) => err.fmt(f),
            Error::ParseInt(ref err) => err.fmt(f),
            Error::FromUtf8(ref err) => err.fmt(f),
            Error::ParseTime(ref err) => err.fmt(f),

            Error::ConnectionFailed(message) => write!(f, "connection failed: {message}"),
            Error::ConnectionReset => write!(f, "connection reset"),
            Error::NotConnected => write!(f, "not connected"),
            Error::ServerVersion(wanted, have, message) => write!(f, "server version {wanted} required, got {have}: {message}"),
            Error::Timeout(message) => write!(f, "timed out: {message}"),

            Error::UpstreamQuery(message) => write!(f, "upstream query failed: {message}"),
            Error::Pacing(message) => write!(f, "gateway pacing violation: {message}"),
            Error::Message(code, message) => write!(f, "[{code}] {message}"),

            Error::InvalidArgument(message) => write!(f, "invalid argument: {message}"),

            Error::Parse(i, value, message) => write!(f, "parse error: {i} - {value} - {message}"),
            Error::UnexpectedResponse(message) => write!(f, "unexpected response: {message:?}"),
            Error::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
            Error::Simple(ref err) => write!(f, "error occurred: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Error {
        Error::ParseInt(err)
    }
}

impl From<FromUtf8Error> for Error {
    fn from(err: FromUtf8Error) -> Error {
        Error::FromUtf8(err)
    }
}

impl From<time::error::Parse> for Error {
    fn from(err: time::error::Parse) -> Error {
        Error::ParseTime(err)
    }
}

impl From<ResponseMessage> for Error {
    fn from(message: ResponseMessage) -> Error {
        if message.message_type() == IncomingMessages::Error {
            let notice = Notice::from(&message);
            Error::Message(notice.code, notice.message)
        } else {
            Error::UnexpectedResponse(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_grouped() {
        assert!(Error::ConnectionReset.is_connection_error());
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::ConnectionFailed("refused".into()).is_connection_error());
        assert!(Error::Timeout("contract data".into()).is_connection_error());
        assert!(Error::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")).is_connection_error());

        assert!(!Error::UpstreamQuery("no chain".into()).is_connection_error());
        assert!(!Error::InvalidArgument("expirations".into()).is_connection_error());
        assert!(!Error::Message(200, "No security definition".into()).is_connection_error());
        assert!(!Error::Pacing("max rate exceeded".into()).is_connection_error());
    }

    #[test]
    fn test_error_from_response_message() {
        let message = ResponseMessage::from_simple("4|2|9000|200|No security definition has been found for the request|");
        match Error::from(message) {
            Error::Message(code, text) => {
                assert_eq!(code, 200);
                assert_eq!(text, "No security definition has been found for the request");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let message = ResponseMessage::from_simple("10|9000|SPX|");
        assert!(matches!(Error::from(message), Error::UnexpectedResponse(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Error::Message(354, "Not subscribed".into()).to_string(), "[354] Not subscribed");
        assert_eq!(
            Error::ServerVersion(164, 151, "size rules".into()).to_string(),
            "server version 164 required, got 151: size rules"
        );
        assert_eq!(Error::InvalidArgument("expirations must not be empty".into()).to_string(), "invalid argument: expirations must not be empty");
    }
}
