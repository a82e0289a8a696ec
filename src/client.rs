//! The IRC protocol client plugin.
//!
//! Owns the socket. Inbound lines are framed by [`LineCodec`], parsed into
//! [`Message`]s, and published on `message_in` unless the sender matches a
//! configured ignore mask; malformed lines are dropped and reported, the
//! connection stays up. Outbound messages arrive over `message_out`, are
//! funneled through one writer so frames never interleave, and are rejected
//! if a parameter smuggles a line break.
//!
//! Liveness is watched with two timers: quiet connections get a PING, and a
//! connection with no traffic at all past the abort window is torn down.
//! Every connection failure is recoverable; the client reconnects forever
//! with a fixed delay until stopped.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use stray_proto::{matches_hostmask, LineCodec, Message, Ping, ProtocolError, Reply};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig as TlsConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::bus::{channels, Bus, Payload};
use crate::error::{BotError, ConfigError, PluginError};
use crate::plugin::{Plugin, PluginContext};

const CLIENT: &str = "core.client";

fn default_port() -> u16 {
    6667
}
fn default_user() -> String {
    "straybot".to_owned()
}
fn default_real_name() -> String {
    "straybot".to_owned()
}
fn default_ping_interval() -> u64 {
    90
}
fn default_ping_repeat() -> u64 {
    20
}
fn default_abort_timeout() -> u64 {
    240
}
fn default_reconnect_delay() -> u64 {
    10
}

/// Connection settings, read from `module_config.core.client`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// PEM file with a client certificate chain and PKCS#8 key.
    #[serde(default)]
    pub tls_cert: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub nick: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_real_name")]
    pub real_name: String,
    /// Channels joined once registration completes.
    #[serde(default)]
    pub channels: Vec<String>,
    /// `nick!user@host` wildcard masks dropped before publication.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Repeat interval once a PING has gone unanswered.
    #[serde(default = "default_ping_repeat")]
    pub ping_repeat_secs: u64,
    #[serde(default = "default_abort_timeout")]
    pub abort_timeout_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

struct ClientInner {
    bus: Arc<Bus>,
    config: ClientConfig,
    shutdown: watch::Sender<bool>,
}

type OutQueue = mpsc::UnboundedReceiver<Message>;

impl ClientInner {
    fn report(&self, detail: impl Into<String>) {
        self.bus.publish(
            channels::ON_EXCEPTION,
            CLIENT,
            &Payload::Exception {
                origin: CLIENT.to_owned(),
                detail: detail.into(),
            },
        );
    }

    async fn run(self: Arc<Self>, mut out_rx: OutQueue, mut shutdown_rx: watch::Receiver<bool>) {
        let delay = Duration::from_secs(self.config.reconnect_delay_secs);
        loop {
            if *shutdown_rx.borrow_and_update() {
                break;
            }
            match self.connect_once(&mut out_rx, &mut shutdown_rx).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "connection lost");
                    self.report(e.to_string());
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => break,
            }
        }
        debug!("client task exiting");
    }

    async fn connect_once(
        &self,
        out_rx: &mut OutQueue,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), BotError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.tls,
            "connecting"
        );
        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| BotError::Connection(e.to_string()))?;
        if self.config.tls {
            let connector = self.tls_connector()?;
            let server_name = ServerName::try_from(self.config.host.clone())
                .map_err(|e| BotError::Connection(e.to_string()))?;
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| BotError::Connection(e.to_string()))?;
            self.drive(stream, out_rx, shutdown_rx).await
        } else {
            self.drive(tcp, out_rx, shutdown_rx).await
        }
    }

    fn tls_connector(&self) -> Result<TlsConnector, BotError> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!(error = %error, "error loading native root certs");
        }
        for cert in native.certs {
            if let Err(e) = roots.add(cert) {
                warn!(error = %e, "rejected native root cert");
            }
        }
        let builder = TlsConfig::builder().with_root_certificates(roots);
        let config = match &self.config.tls_cert {
            Some(path) => {
                let (certs, key) = load_client_cert(path)?;
                builder
                    .with_client_auth_cert(certs, key)
                    .map_err(|e| BotError::Connection(e.to_string()))?
            }
            None => builder.with_no_client_auth(),
        };
        Ok(TlsConnector::from(Arc::new(config)))
    }

    /// One connection, identification through teardown.
    async fn drive<S>(
        &self,
        stream: S,
        out_rx: &mut OutQueue,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), BotError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, LineCodec::new());
        self.identify(&mut framed).await?;

        let ping_interval = Duration::from_secs(self.config.ping_interval_secs);
        let ping_repeat = Duration::from_secs(self.config.ping_repeat_secs);
        let abort_timeout = Duration::from_secs(self.config.abort_timeout_secs);
        let ping = tokio::time::sleep(ping_interval);
        let abort = tokio::time::sleep(abort_timeout);
        tokio::pin!(ping, abort);

        loop {
            tokio::select! {
                item = framed.next() => {
                    // Any inbound traffic counts as liveness.
                    let now = tokio::time::Instant::now();
                    ping.as_mut().reset(now + ping_interval);
                    abort.as_mut().reset(now + abort_timeout);
                    match item {
                        None => {
                            return Err(BotError::Connection(
                                "server closed the connection".to_owned(),
                            ));
                        }
                        Some(Err(ProtocolError::Io(e))) => {
                            return Err(BotError::Connection(e.to_string()));
                        }
                        Some(Err(e)) => {
                            // Malformed frame: drop it, stay connected.
                            self.report(e.to_string());
                        }
                        Some(Ok(line)) => match line.parse::<Message>() {
                            Ok(msg) => self.handle_inbound(msg, &mut framed).await?,
                            Err(e) => self.report(e.to_string()),
                        },
                    }
                }
                Some(msg) = out_rx.recv() => {
                    match framed.send(msg.to_string()).await {
                        Ok(()) => {}
                        Err(ProtocolError::EmbeddedLineBreak) => {
                            self.report("dropped outgoing message with embedded line break");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                _ = &mut ping => {
                    debug!("connection quiet, pinging");
                    framed
                        .send(Message::ping(vec![self.config.nick.as_str()]).to_string())
                        .await?;
                    ping.as_mut().reset(tokio::time::Instant::now() + ping_repeat);
                }
                _ = &mut abort => {
                    return Err(BotError::Connection("liveness timeout".to_owned()));
                }
                _ = shutdown_rx.changed() => {
                    let _ = framed
                        .send(Message::quit(Some("shutting down")).to_string())
                        .await;
                    return Ok(());
                }
            }
        }
    }

    async fn identify<S>(&self, framed: &mut Framed<S, LineCodec>) -> Result<(), BotError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(password) = &self.config.password {
            framed.send(Message::pass(password).to_string()).await?;
        }
        framed.send(Message::nick(&self.config.nick).to_string()).await?;
        framed
            .send(Message::user(&self.config.user, &self.config.real_name).to_string())
            .await?;
        Ok(())
    }

    async fn handle_inbound<S>(
        &self,
        msg: Message,
        framed: &mut Framed<S, LineCodec>,
    ) -> Result<(), BotError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Ok(ping) = Ping::try_from(&msg) {
            let params: Vec<&str> = ping.params.iter().map(String::as_str).collect();
            framed.send(Message::pong(params).to_string()).await?;
            return Ok(());
        }
        if matches!(msg.reply(), Some(Reply::EndOfMotd | Reply::ErrNoMotd)) {
            info!(channels = ?self.config.channels, "registered, joining");
            for channel in &self.config.channels {
                framed.send(Message::join(channel).to_string()).await?;
            }
        }
        if let Some(prefix) = msg.prefix.as_deref() {
            if self
                .config
                .ignore
                .iter()
                .any(|pattern| matches_hostmask(pattern, prefix))
            {
                debug!(prefix, "sender ignored");
                return Ok(());
            }
        }
        self.bus
            .publish(channels::MESSAGE_IN, CLIENT, &Payload::Message(msg));
        Ok(())
    }
}

fn load_client_cert(
    path: &str,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), BotError> {
    let open = |p: &str| {
        File::open(p).map_err(|e| BotError::Connection(format!("client cert {p}: {e}")))
    };
    let certs = rustls_pemfile::certs(&mut BufReader::new(open(path)?))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BotError::Connection(format!("client cert {path}: {e}")))?;
    let key = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(open(path)?))
        .next()
        .ok_or_else(|| BotError::Connection(format!("client cert {path}: no private key")))?
        .map_err(|e| BotError::Connection(format!("client cert {path}: {e}")))?;
    Ok((certs, PrivateKeyDer::Pkcs8(key)))
}

/// The plugin wrapper registered under `core.client`.
pub struct IrcClient {
    inner: Arc<ClientInner>,
    out_tx: mpsc::UnboundedSender<Message>,
    out_rx: Mutex<Option<OutQueue>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IrcClient {
    /// Factory registered under `core.client`.
    pub fn create(ctx: &PluginContext) -> Result<Arc<dyn Plugin>, PluginError> {
        let value = ctx.config.get_path("module_config.core.client")?;
        let config: ClientConfig = value
            .try_into()
            .map_err(ConfigError::Parse)
            .map_err(PluginError::Config)?;
        Ok(Self::with_config(Arc::clone(&ctx.bus), config))
    }

    /// Build a client directly from settings.
    pub fn with_config(bus: Arc<Bus>, config: ClientConfig) -> Arc<dyn Plugin> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Arc::new(IrcClient {
            inner: Arc::new(ClientInner {
                bus,
                config,
                shutdown,
            }),
            out_tx,
            out_rx: Mutex::new(Some(out_rx)),
            task: Mutex::new(None),
        })
    }
}

#[async_trait::async_trait]
impl Plugin for IrcClient {
    fn identity(&self) -> &str {
        CLIENT
    }

    async fn start(&self) -> Result<(), PluginError> {
        let out_rx = self.out_rx.lock().take().ok_or_else(|| PluginError::Start {
            name: CLIENT.to_owned(),
            detail: "already started".to_owned(),
        })?;
        let out_tx = self.out_tx.clone();
        self.inner
            .bus
            .subscribe(channels::MESSAGE_OUT, CLIENT, move |_, payload| {
                if let Payload::Message(msg) = payload {
                    let _ = out_tx.send(msg.clone());
                }
            });
        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.inner.shutdown.subscribe();
        let task = tokio::spawn(inner.run(out_rx, shutdown_rx));
        *self.task.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) {
        let _ = self.inner.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.bus.unsubscribe_all(CLIENT);
    }
}
