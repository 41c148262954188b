/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/

//! Tokio driver for the session state machine.
//!
//! One task owns the `Session`. Caller commands, transport events and timer
//! expiries all reach it through channels, so transitions happen one at a time
//! in arrival order. Each transport runs in its own task on top of
//! `tokio-tungstenite` and reports back tagged with its generation.

use crate::client::ClientIdentity;
use crate::client::session::{Action, Session};
use crate::connection::{
    ConnectionDetails, ConnectionOptions, ConnectionStatus, DisconnectionReason, StatusHandle,
};
use crate::message::CanonicalMessage;
use crate::subscription::{ChannelSubscriber, Subscriber, SubscriberId};
use crate::utils::WebsocketError;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

enum Command {
    Connect {
        details: ConnectionDetails,
        reply: oneshot::Sender<Result<(), WebsocketError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Register {
        subscriber: Weak<dyn Subscriber>,
        reply: oneshot::Sender<SubscriberId>,
    },
    Unregister {
        id: SubscriberId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum Event {
    Opened {
        generation: u64,
    },
    Frame {
        generation: u64,
        text: String,
    },
    Closing {
        generation: u64,
    },
    Closed {
        generation: u64,
        reason: DisconnectionReason,
    },
    RetryElapsed {
        token: u64,
    },
    ConnectTimeoutElapsed {
        generation: u64,
    },
}

/// Handle to a running realtime session.
///
/// Dropping the handle stops the background task and closes the transport.
#[derive(Debug)]
pub struct WebsocketClient {
    identity: ClientIdentity,
    commands: mpsc::UnboundedSender<Command>,
    status: StatusHandle,
    task: JoinHandle<()>,
}

impl WebsocketClient {
    /// Starts an idle client. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidOptions` if `options` fail validation.
    pub fn new(options: ConnectionOptions) -> Result<Self, WebsocketError> {
        Ok(Self::from_session(Session::new(options)?))
    }

    /// Starts a client around an already configured session.
    pub fn from_session(session: Session) -> Self {
        let identity = session.identity().clone();
        let (status_tx, status_rx) = watch::channel(session.status().clone());
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            session,
            events: events_tx,
            status: status_tx,
            transports: HashMap::new(),
            retry_timers: HashMap::new(),
            connect_timers: HashMap::new(),
        };
        let task = tokio::spawn(driver.run(commands_rx, events_rx));

        Self {
            identity,
            commands: commands_tx,
            status: StatusHandle::new(status_rx),
            task,
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Observer of the connection status.
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn is_online(&self) -> bool {
        self.status.is_online()
    }

    pub fn recently_active(&self, window: Duration) -> bool {
        self.status.recently_active(window)
    }

    /// Connects to `{base_url}/{identity}` and authenticates with `credential`.
    ///
    /// Returns once the request has been accepted; use `status()` to follow the
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns `WebsocketError::InvalidUrl` for an unusable `base_url`, or
    /// `WebsocketError::ClientClosed` if the client has been shut down.
    pub async fn connect(
        &self,
        base_url: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<(), WebsocketError> {
        self.connect_with(ConnectionDetails::new(base_url, credential)?)
            .await
    }

    /// Like `connect`, with already validated details.
    pub async fn connect_with(&self, details: ConnectionDetails) -> Result<(), WebsocketError> {
        self.request(|reply| Command::Connect { details, reply })
            .await?
    }

    /// Closes the transport and cancels any scheduled reconnection.
    pub async fn disconnect(&self) -> Result<(), WebsocketError> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Adds a subscriber at the end of the notification order.
    ///
    /// Only a weak reference is kept: the subscriber stops receiving messages once
    /// the caller drops its last `Arc`.
    pub async fn register<S: Subscriber + 'static>(
        &self,
        subscriber: &Arc<S>,
    ) -> Result<SubscriberId, WebsocketError> {
        let subscriber: Weak<S> = Arc::downgrade(subscriber);
        let subscriber: Weak<dyn Subscriber> = subscriber;
        self.request(|reply| Command::Register { subscriber, reply })
            .await
    }

    pub async fn unregister(&self, id: SubscriberId) -> Result<bool, WebsocketError> {
        self.request(|reply| Command::Unregister { id, reply }).await
    }

    /// Registers a channel subscriber and returns its receiving end.
    pub async fn channel(&self) -> Result<MessageReceiver, WebsocketError> {
        let (subscriber, receiver) = ChannelSubscriber::create_channel();
        let subscriber = Arc::new(subscriber);
        let id = self.register(&subscriber).await?;
        Ok(MessageReceiver {
            id,
            receiver,
            _subscriber: subscriber,
        })
    }

    /// Disconnects and waits for the background task to finish.
    pub async fn shutdown(self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok() {
            let _ = done.await;
        }
        let _ = self.task.await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, WebsocketError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| WebsocketError::ClientClosed)?;
        response.await.map_err(|_| WebsocketError::ClientClosed)
    }
}

/// Canonical messages delivered through a `ChannelSubscriber`.
///
/// Keeps its subscriber registered for as long as it lives.
#[derive(Debug)]
pub struct MessageReceiver {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<CanonicalMessage>,
    _subscriber: Arc<ChannelSubscriber>,
}

impl MessageReceiver {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next message, or `None` once the client has stopped.
    pub async fn recv(&mut self) -> Option<CanonicalMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CanonicalMessage> {
        self.receiver.try_recv().ok()
    }
}

struct Transport {
    outgoing: mpsc::UnboundedSender<Message>,
}

struct Driver {
    session: Session,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<ConnectionStatus>,
    transports: HashMap<u64, Transport>,
    retry_timers: HashMap<u64, JoinHandle<()>>,
    connect_timers: HashMap<u64, JoinHandle<()>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        debug!("Session task started for client {}", self.session.identity());
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        let actions = self.session.disconnect();
                        self.execute(actions);
                        self.publish();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        let actions = self.session.disconnect();
                        self.execute(actions);
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
            self.publish();
        }
        self.stop_timers();
        debug!("Session task stopped for client {}", self.session.identity());
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { details, reply } => {
                let result = self
                    .session
                    .connect(details)
                    .map(|actions| self.execute(actions));
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                let actions = self.session.disconnect();
                self.execute(actions);
                let _ = reply.send(());
            }
            Command::Register { subscriber, reply } => {
                let _ = reply.send(self.session.register_weak(subscriber));
            }
            Command::Unregister { id, reply } => {
                let _ = reply.send(self.session.unregister(id));
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        let actions = match event {
            Event::Opened { generation } => self.session.on_open(generation),
            Event::Frame { generation, text } => self.session.on_message(generation, &text),
            Event::Closing { generation } => self.session.on_closing(generation),
            Event::Closed { generation, reason } => {
                self.transports.remove(&generation);
                self.session.on_close(generation, reason)
            }
            Event::RetryElapsed { token } => {
                self.retry_timers.remove(&token);
                self.session.on_retry_timer(token)
            }
            Event::ConnectTimeoutElapsed { generation } => {
                self.connect_timers.remove(&generation);
                self.session.on_connect_timeout(generation)
            }
        };
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Open { generation, url } => self.open(generation, url),
                Action::Send { generation, frame } => match self.transports.get(&generation) {
                    Some(transport) => {
                        if transport.outgoing.send(Message::text(frame)).is_err() {
                            warn!("Transport {} is gone, frame not sent", generation);
                        }
                    }
                    None => warn!("No transport {} to send on", generation),
                },
                Action::Close { generation } => {
                    // Dropping the sender makes the transport task close the socket.
                    if self.transports.remove(&generation).is_some() {
                        debug!("Closing transport {}", generation);
                    }
                }
                Action::ScheduleRetry { token, delay } => {
                    let handle = self.schedule(delay, Event::RetryElapsed { token });
                    self.retry_timers.insert(token, handle);
                }
                Action::CancelRetry { token } => {
                    if let Some(handle) = self.retry_timers.remove(&token) {
                        handle.abort();
                    }
                }
                Action::ScheduleConnectTimeout { generation, after } => {
                    let handle = self.schedule(after, Event::ConnectTimeoutElapsed { generation });
                    self.connect_timers.insert(generation, handle);
                }
                Action::CancelConnectTimeout { generation } => {
                    if let Some(handle) = self.connect_timers.remove(&generation) {
                        handle.abort();
                    }
                }
            }
        }
    }

    fn open(&mut self, generation: u64, url: Url) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        self.transports.insert(
            generation,
            Transport {
                outgoing: outgoing_tx,
            },
        );
        tokio::spawn(run_transport(
            generation,
            url,
            outgoing_rx,
            self.events.clone(),
        ));
    }

    fn schedule(&self, delay: Duration, event: Event) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event);
        })
    }

    fn publish(&self) {
        let status = self.session.status();
        self.status.send_if_modified(|current| {
            if *current == *status {
                false
            } else {
                *current = status.clone();
                true
            }
        });
    }

    fn stop_timers(&mut self) {
        for (_, handle) in self.retry_timers.drain() {
            handle.abort();
        }
        for (_, handle) in self.connect_timers.drain() {
            handle.abort();
        }
    }
}

async fn run_transport(
    generation: u64,
    url: Url,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<Event>,
) {
    debug!("Transport {} connecting to {}", generation, url);
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let _ = events.send(Event::Closed {
                    generation,
                    reason: DisconnectionReason::NetworkError(e.to_string()),
                });
                return;
            }
        },
        None = outgoing.recv() => {
            debug!("Transport {} abandoned while connecting", generation);
            return;
        }
    };

    info!("Transport {} connected", generation);
    if events.send(Event::Opened { generation }).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();
    let reason = loop {
        tokio::select! {
            outbound = outgoing.recv() => match outbound {
                Some(message) => {
                    if let Err(e) = write.send(message).await {
                        break DisconnectionReason::NetworkError(e.to_string());
                    }
                }
                None => {
                    let _ = events.send(Event::Closing { generation });
                    let _ = write.send(Message::Close(None)).await;
                    let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
                        while let Some(Ok(_)) = read.next().await {}
                    })
                    .await;
                    break DisconnectionReason::UserRequested;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(Event::Frame {
                        generation,
                        text: text.as_str().to_owned(),
                    });
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Transport {} ignoring {} byte binary frame", generation, data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = events.send(Event::Closing { generation });
                    // Sends the close reply tungstenite queued while reading.
                    let _ = write.flush().await;
                    break match frame {
                        Some(frame) => DisconnectionReason::ServerClosed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.as_str().to_owned(),
                        },
                        None => DisconnectionReason::ServerClosed {
                            code: None,
                            reason: String::new(),
                        },
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break DisconnectionReason::NetworkError(e.to_string()),
                None => {
                    break DisconnectionReason::ServerClosed {
                        code: None,
                        reason: "stream ended".to_string(),
                    };
                }
            },
        }
    };

    debug!("Transport {} finished: {}", generation, reason);
    let _ = events.send(Event::Closed { generation, reason });
}
