//! Connection establishment with TWS/Gateway.
//!
//! A [Connection] performs the handshake, starts the API and waits for the session
//! bootstrap messages. The established stream is then handed over to the message bus.

use log::{debug, error, info, warn};
use time::macros::format_description;
use time::OffsetDateTime;
use time_tz::{timezones, OffsetResult, PrimitiveDateTimeExt, Tz};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::errors::Error;
use crate::messages::{encode_length, IncomingMessages, Notice, OutgoingMessages, RequestMessage, ResponseMessage};
use crate::server_versions;
use crate::transport::recorder::MessageRecorder;

// Bootstrap messages read while waiting for the next valid id and managed accounts.
const MAX_BOOTSTRAP_MESSAGES: i32 = 100;

/// Metadata about the connection to TWS
#[derive(Default, Clone, Debug)]
pub(crate) struct ConnectionMetadata {
    pub client_id: i32,
    pub server_version: i32,
    pub next_valid_id: i32,
    /// Comma-separated list of managed accounts
    pub managed_accounts: String,
    pub connection_time: Option<OffsetDateTime>,
}

/// An established session on top of a byte stream.
pub(crate) struct Connection<S> {
    stream: S,
    metadata: ConnectionMetadata,
    recorder: MessageRecorder,
    handler: ConnectionHandler,
}

impl Connection<TcpStream> {
    /// Opens a socket to `address` and establishes a session with `client_id`.
    pub async fn connect(address: &str, client_id: i32) -> Result<Self, Error> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|err| Error::ConnectionFailed(format!("could not connect to {address}: {err}")))?;
        stream.set_nodelay(true)?;

        Connection::establish(stream, client_id, MessageRecorder::from_env()).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub async fn establish(stream: S, client_id: i32, recorder: MessageRecorder) -> Result<Self, Error> {
        let mut connection = Self {
            stream,
            metadata: ConnectionMetadata {
                client_id,
                ..Default::default()
            },
            recorder,
            handler: ConnectionHandler::default(),
        };

        connection.handshake().await?;
        connection.start_api().await?;
        connection.receive_account_info().await?;

        let metadata = &connection.metadata;
        info!(
            "connected to gateway: client id {}, server version {}, connection time {:?}, accounts {}",
            metadata.client_id, metadata.server_version, metadata.connection_time, metadata.managed_accounts
        );
        debug!("next valid id {}", metadata.next_valid_id);

        Ok(connection)
    }

    #[cfg(test)]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    pub fn into_parts(self) -> (S, ConnectionMetadata, MessageRecorder) {
        (self.stream, self.metadata, self.recorder)
    }

    // sends server handshake
    async fn handshake(&mut self) -> Result<(), Error> {
        let handshake = self.handler.format_handshake();
        debug!("-> handshake: {handshake:?}");

        self.stream.write_all(&handshake).await?;
        self.stream.flush().await?;

        let mut ack = match read_message(&mut self.stream).await {
            Ok(ack) => ack,
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(Error::ConnectionFailed(format!(
                    "the server may be rejecting connections from this host: {err}"
                )));
            }
            Err(err) => return Err(err),
        };

        let handshake_data = self.handler.parse_handshake_response(&mut ack)?;
        self.metadata.server_version = handshake_data.server_version;

        let (time, _) = parse_connection_time(&handshake_data.server_time);
        self.metadata.connection_time = time;

        Ok(())
    }

    // asks server to start processing messages
    async fn start_api(&mut self) -> Result<(), Error> {
        let message = self.handler.format_start_api(self.metadata.client_id, self.metadata.server_version);

        self.recorder.record_request(&message);
        write_message(&mut self.stream, &message).await
    }

    // Fetches next valid id and managed accounts.
    async fn receive_account_info(&mut self) -> Result<(), Error> {
        let mut next_valid_id = None;
        let mut managed_accounts = None;

        for _ in 0..MAX_BOOTSTRAP_MESSAGES {
            let mut message = read_message(&mut self.stream).await?;
            self.recorder.record_response(&message);

            match message.message_type() {
                IncomingMessages::NextValidId => {
                    message.skip(); // message type
                    message.skip(); // message version
                    next_valid_id = Some(message.next_int()?);
                }
                IncomingMessages::ManagedAccounts => {
                    message.skip(); // message type
                    message.skip(); // message version
                    managed_accounts = Some(message.next_string()?);
                }
                IncomingMessages::Error => {
                    let notice = Notice::from(&message);
                    if notice.is_error() {
                        error!("gateway rejected session: {notice}");
                        return Err(Error::ConnectionFailed(notice.to_string()));
                    }
                    info!("gateway notice during connect: {notice}");
                }
                kind => {
                    warn!("ignoring message during connection setup: {kind:?}");
                }
            }

            if let (Some(next_valid_id), Some(managed_accounts)) = (next_valid_id, &managed_accounts) {
                self.metadata.next_valid_id = next_valid_id;
                self.metadata.managed_accounts = managed_accounts.clone();
                return Ok(());
            }
        }

        Err(Error::ConnectionFailed(format!(
            "session not ready after {MAX_BOOTSTRAP_MESSAGES} messages"
        )))
    }
}

/// Reads one length prefixed message.
pub(crate) async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ResponseMessage, Error> {
    let mut length_bytes = [0u8; 4];
    reader.read_exact(&mut length_bytes).await?;

    let message_length = u32::from_be_bytes(length_bytes) as usize;

    let mut data = vec![0u8; message_length];
    reader.read_exact(&mut data).await?;

    // Some gateway installations send time zone names in local encodings.
    let raw_string = String::from_utf8_lossy(&data).into_owned();
    debug!("<- {raw_string:?}");

    Ok(ResponseMessage::from(&raw_string))
}

/// Writes one message with its length prefix.
pub(crate) async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &RequestMessage) -> Result<(), Error> {
    let encoded = message.encode();
    debug!("-> {encoded:?}");

    writer.write_all(&encode_length(&encoded)).await?;
    writer.flush().await?;
    Ok(())
}

/// Data exchanged during the connection handshake
#[derive(Debug, Clone)]
struct HandshakeData {
    server_version: i32,
    server_time: String,
}

#[derive(Debug)]
struct ConnectionHandler {
    min_version: i32,
    max_version: i32,
}

impl Default for ConnectionHandler {
    fn default() -> Self {
        Self {
            min_version: server_versions::MIN_SERVER_VERSION,
            max_version: server_versions::MAX_SERVER_VERSION,
        }
    }
}

impl ConnectionHandler {
    fn format_handshake(&self) -> Vec<u8> {
        let version_string = format!("v{}..{}", self.min_version, self.max_version);

        let mut handshake = Vec::from(b"API\0");
        handshake.extend_from_slice(&encode_length(&version_string));
        handshake
    }

    fn parse_handshake_response(&self, response: &mut ResponseMessage) -> Result<HandshakeData, Error> {
        let server_version = response.next_int()?;
        let server_time = response.next_string()?;

        if server_version < self.min_version {
            return Err(Error::ServerVersion(
                self.min_version,
                server_version,
                "upgrade TWS or IB Gateway".to_string(),
            ));
        }

        Ok(HandshakeData { server_version, server_time })
    }

    fn format_start_api(&self, client_id: i32, server_version: i32) -> RequestMessage {
        const VERSION: i32 = 2;

        let mut message = RequestMessage::default();
        message.push_field(&OutgoingMessages::StartApi);
        message.push_field(&VERSION);
        message.push_field(&client_id);

        if server_version > server_versions::OPTIONAL_CAPABILITIES {
            message.push_field(&"");
        }

        message
    }
}

/// Parse connection time from TWS format
/// Format: "20230405 22:20:39 PST"
pub(crate) fn parse_connection_time(connection_time: &str) -> (Option<OffsetDateTime>, Option<&'static Tz>) {
    let parts: Vec<&str> = connection_time.split(' ').collect();

    if parts.len() < 3 {
        error!("Invalid connection time format: {connection_time}");
        return (None, None);
    }

    let zones = timezones::find_by_name(parts[2]);

    if zones.is_empty() {
        warn!("Time zone not found for {}", parts[2]);
        return (None, None);
    }

    let timezone = zones[0];

    let format = format_description!("[year][month][day] [hour]:[minute]:[second]");
    let date_str = format!("{} {}", parts[0], parts[1]);
    let date = time::PrimitiveDateTime::parse(date_str.as_str(), format);

    match date {
        Ok(connected_at) => match connected_at.assume_timezone(timezone) {
            OffsetResult::Some(date) => (Some(date), Some(timezone)),
            _ => {
                warn!("Error setting timezone");
                (None, Some(timezone))
            }
        },
        Err(err) => {
            warn!("Could not parse connection time from {date_str}: {err}");
            (None, Some(timezone))
        }
    }
}
