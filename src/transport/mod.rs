//! Message bus between the gateway session and the socket.
//!
//! A background task owns the read half of the stream and routes every incoming message to the
//! channel registered for its request id. Writers share the write half behind a mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{self, JoinHandle};

use crate::connection::{read_message, write_message, Connection};
use crate::messages::{IncomingMessages, Notice, RequestMessage, ResponseMessage};
use crate::Error;

pub(crate) mod pacing;
pub(crate) mod recorder;

use recorder::MessageRecorder;

/// Starting value for request ids
const INITIAL_REQUEST_ID: i32 = 9000;

/// Request/response plumbing to the gateway.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Server version negotiated during the handshake.
    fn server_version(&self) -> i32;

    /// Allocates a request id unique within this bus.
    fn next_request_id(&self) -> i32;

    /// `false` once the underlying socket has failed or the bus was shut down.
    fn is_connected(&self) -> bool;

    /// Sends `message` and returns a subscription receiving the responses addressed to `request_id`.
    async fn send_request(&self, request_id: i32, message: &RequestMessage) -> Result<Subscription, Error>;

    /// Sends a message that has no responses.
    async fn send_message(&self, message: &RequestMessage) -> Result<(), Error>;

    /// Stops routing and closes the socket. Pending subscriptions end.
    async fn shutdown(&self);
}

/// Responses for one request.
///
/// [Subscription::next] returns `None` once the bus has lost its connection.
#[derive(Debug)]
pub struct Subscription {
    request_id: i32,
    receiver: mpsc::UnboundedReceiver<ResponseMessage>,
}

impl Subscription {
    pub fn new(request_id: i32, receiver: mpsc::UnboundedReceiver<ResponseMessage>) -> Self {
        Self { request_id, receiver }
    }

    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    pub async fn next(&mut self) -> Option<ResponseMessage> {
        self.receiver.recv().await
    }
}

type ChannelSender = mpsc::UnboundedSender<ResponseMessage>;
type RequestChannels = Arc<RwLock<HashMap<i32, ChannelSender>>>;

/// Message bus over an established gateway connection.
pub(crate) struct TcpMessageBus<S> {
    writer: Mutex<WriteHalf<S>>,
    request_channels: RequestChannels,
    connected: Arc<AtomicBool>,
    server_version: i32,
    next_request_id: AtomicI32,
    recorder: MessageRecorder,
    dispatcher: JoinHandle<()>,
}

impl<S> TcpMessageBus<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Takes over the connection and starts routing incoming messages.
    pub fn start(connection: Connection<S>) -> Arc<Self> {
        let (stream, metadata, recorder) = connection.into_parts();
        let (reader, writer) = tokio::io::split(stream);

        let request_channels: RequestChannels = Arc::new(RwLock::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let dispatcher = task::spawn(dispatch(reader, request_channels.clone(), connected.clone(), recorder.clone()));

        Arc::new(Self {
            writer: Mutex::new(writer),
            request_channels,
            connected,
            server_version: metadata.server_version,
            next_request_id: AtomicI32::new(INITIAL_REQUEST_ID),
            recorder,
            dispatcher,
        })
    }

    async fn write(&self, message: &RequestMessage) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        self.recorder.record_request(message);

        let mut writer = self.writer.lock().await;
        if let Err(err) = write_message(&mut *writer, message).await {
            error!("error writing to gateway: {err}");
            self.connected.store(false, Ordering::SeqCst);
            return Err(err);
        }

        Ok(())
    }
}

#[async_trait]
impl<S> MessageBus for TcpMessageBus<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn server_version(&self) -> i32 {
        self.server_version
    }

    fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_request(&self, request_id: i32, message: &RequestMessage) -> Result<Subscription, Error> {
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut channels = self.request_channels.write().await;
            // drop routes whose subscriptions are gone
            channels.retain(|_, sender| !sender.is_closed());
            channels.insert(request_id, sender);
        }

        if let Err(err) = self.write(message).await {
            self.request_channels.write().await.remove(&request_id);
            return Err(err);
        }

        Ok(Subscription::new(request_id, receiver))
    }

    async fn send_message(&self, message: &RequestMessage) -> Result<(), Error> {
        self.write(message).await
    }

    async fn shutdown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.dispatcher.abort();
        self.request_channels.write().await.clear();

        let mut writer = self.writer.lock().await;
        if let Err(err) = tokio::io::AsyncWriteExt::shutdown(&mut *writer).await {
            debug!("error closing gateway socket: {err}");
        }

        info!("gateway connection closed");
    }
}

async fn dispatch<R>(mut reader: R, request_channels: RequestChannels, connected: Arc<AtomicBool>, recorder: MessageRecorder)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(message) => {
                recorder.record_response(&message);
                route(&request_channels, message).await;
            }
            Err(err) => {
                if connected.swap(false, Ordering::SeqCst) {
                    error!("gateway connection lost: {err}");
                }
                // dropping the senders ends every pending subscription
                request_channels.write().await.clear();
                return;
            }
        }
    }
}

async fn route(request_channels: &RequestChannels, message: ResponseMessage) {
    let message_type = message.message_type();

    if message_type == IncomingMessages::Error {
        return route_error(request_channels, message).await;
    }

    match message.request_id() {
        Some(request_id) => {
            let channels = request_channels.read().await;
            match channels.get(&request_id) {
                Some(sender) => {
                    let _ = sender.send(message);
                }
                None => debug!("no subscriber for {message_type:?} addressed to request {request_id}"),
            }
        }
        None => debug!("dropping unrouted message {message_type:?}: {message:?}"),
    }
}

async fn route_error(request_channels: &RequestChannels, message: ResponseMessage) {
    let request_id = message.request_id().unwrap_or(-1);
    let notice = Notice::from(&message);

    if request_id >= 0 {
        let channels = request_channels.read().await;
        if let Some(sender) = channels.get(&request_id) {
            let _ = sender.send(message);
            return;
        }
    }

    if notice.is_system_message() {
        warn!("gateway connectivity: {notice}");
    } else if notice.is_warning() {
        info!("gateway notice: {notice}");
    } else {
        error!("gateway error for request {request_id}: {notice}");
    }
}
