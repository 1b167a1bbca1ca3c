//! Relay session
//!
//! One session per accepted connection. After the outbound connection is
//! established two pump loops copy bytes, one per direction. Whichever loop
//! stops first signals the other, and exactly one of them performs the
//! terminal accounting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use super::registry::{SessionRegistry, BYTES_TOTAL};
use crate::common::{random_session_id, SESSION_ID_LEN};
use crate::config::MirrorConfig;
use crate::net::{connect, DialerRegistry};
use crate::BUFFER_SIZE;

/// Copy direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to target
    Upstream,
    /// Target to client
    Downstream,
}

impl Direction {
    /// Short label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upstream => "up",
            Self::Downstream => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pump loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Both directions silent longer than the alive timeout
    AliveTimeout,
    /// The reading side reached end of stream
    PeerClosed,
    /// Read failed
    ReadError(String),
    /// Write failed or timed out
    WriteError(String),
    /// The other loop stopped first
    Shutdown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AliveTimeout => f.write_str("alive timeout"),
            Self::PeerClosed => f.write_str("connect close"),
            Self::ReadError(e) => write!(f, "read error: {}", e),
            Self::WriteError(e) => write!(f, "write error: {}", e),
            Self::Shutdown => f.write_str("peer loop exit"),
        }
    }
}

/// State shared by the two pump loops of one connection
pub struct Session {
    id: String,
    config: Arc<MirrorConfig>,
    registry: Arc<SessionRegistry>,
    dialers: Arc<DialerRegistry>,
    epoch: Instant,
    // Milliseconds since `epoch`
    last_upstream: AtomicU64,
    last_downstream: AtomicU64,
    bytes_upstream: AtomicU64,
    bytes_downstream: AtomicU64,
    end: Mutex<Option<ExitReason>>,
    closed: watch::Sender<bool>,
}

impl Session {
    /// Create a session with a fresh random identifier
    pub fn new(
        config: Arc<MirrorConfig>,
        registry: Arc<SessionRegistry>,
        dialers: Arc<DialerRegistry>,
    ) -> Arc<Self> {
        let (closed, _) = watch::channel(false);

        Arc::new(Self {
            id: random_session_id(SESSION_ID_LEN),
            config,
            registry,
            dialers,
            epoch: Instant::now(),
            last_upstream: AtomicU64::new(0),
            last_downstream: AtomicU64::new(0),
            bytes_upstream: AtomicU64::new(0),
            bytes_downstream: AtomicU64::new(0),
            end: Mutex::new(None),
            closed,
        })
    }

    /// Log correlation token
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bytes copied from client to target
    pub fn bytes_upstream(&self) -> u64 {
        self.bytes_upstream.load(Ordering::Relaxed)
    }

    /// Bytes copied from target to client
    pub fn bytes_downstream(&self) -> u64 {
        self.bytes_downstream.load(Ordering::Relaxed)
    }

    /// Reason recorded by the loop that ended the session, if it has ended
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.end.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run the session for `inbound` on its own task
    pub fn start(self: Arc<Self>, inbound: TcpStream) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound))
    }

    /// Count the session, connect the target and relay until either side stops
    pub async fn run(self: Arc<Self>, inbound: TcpStream) {
        let count = self.registry.increment();
        let client = inbound
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let local = inbound
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".to_string());

        info!(
            "[{}] start session client({})->local({}) target {}, session count({})",
            self.id, client, local, self.config.target, count
        );

        let connection = match connect(
            &self.dialers,
            &self.config.target,
            &self.config.proxy,
            self.config.read_timeout(),
            &self.id,
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                let count = self.registry.decrement();
                warn!(
                    "[{}] session exit, connect {} fail: {}, session count({})",
                    self.id, self.config.target, e, count
                );
                return;
            }
        };

        info!(
            "[{}] connected target {} via {}",
            self.id, self.config.target, connection.route
        );

        self.relay(inbound, connection.stream).await;
    }

    /// Pump bytes both ways until either direction stops
    ///
    /// The caller must already have counted the session in the registry;
    /// the loop that ends the session uncounts it.
    pub async fn relay<A, B>(self: Arc<Self>, inbound: A, outbound: B)
    where
        A: AsyncRead + AsyncWrite + Send + 'static,
        B: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (inbound_reader, inbound_writer) = tokio::io::split(inbound);
        let (outbound_reader, outbound_writer) = tokio::io::split(outbound);

        self.touch(Direction::Upstream);
        self.touch(Direction::Downstream);

        let upstream = tokio::spawn(Arc::clone(&self).pump(
            Direction::Upstream,
            inbound_reader,
            outbound_writer,
        ));

        Arc::clone(&self)
            .pump(Direction::Downstream, outbound_reader, inbound_writer)
            .await;

        if let Err(e) = upstream.await {
            warn!("[{}] upstream task failed: {}", self.id, e);
        }
    }

    async fn pump<R, W>(self: Arc<Self>, direction: Direction, mut reader: R, mut writer: W)
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let read_timeout = self.config.read_timeout();
        let write_timeout = self.config.write_timeout();
        let mut closed = self.closed.subscribe();
        let mut buf = vec![0u8; BUFFER_SIZE];

        let reason = loop {
            let read = tokio::select! {
                _ = closed_signal(&mut closed) => break ExitReason::Shutdown,
                read = timeout(read_timeout, reader.read(&mut buf)) => read,
            };

            let n = match read {
                // Read deadline: only fatal once both directions are idle
                Err(_) => {
                    if self.is_alive_timeout() {
                        break ExitReason::AliveTimeout;
                    }
                    continue;
                }
                Ok(Ok(0)) => break ExitReason::PeerClosed,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => break ExitReason::ReadError(e.to_string()),
            };

            self.touch(direction);

            let write = tokio::select! {
                _ = closed_signal(&mut closed) => break ExitReason::Shutdown,
                write = timeout(write_timeout, writer.write_all(&buf[..n])) => write,
            };

            match write {
                Ok(Ok(())) => self.add_bytes(direction, n),
                Ok(Err(e)) => break ExitReason::WriteError(e.to_string()),
                Err(_) => break ExitReason::WriteError(format!("timed out after {:?}", write_timeout)),
            }
        };

        self.stop(direction, &reason);

        // Halves drop on return; the connection closes once both loops exit
        let _ = timeout(write_timeout, writer.shutdown()).await;
    }

    /// Whether both directions have been silent longer than the alive timeout
    fn is_alive_timeout(&self) -> bool {
        let last = self
            .last_upstream
            .load(Ordering::Relaxed)
            .max(self.last_downstream.load(Ordering::Relaxed));
        let idle = Duration::from_millis(self.now_millis().saturating_sub(last));
        idle > self.config.alive_timeout()
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self, direction: Direction) {
        let now = self.now_millis();
        match direction {
            Direction::Upstream => self.last_upstream.store(now, Ordering::Relaxed),
            Direction::Downstream => self.last_downstream.store(now, Ordering::Relaxed),
        }
    }

    fn add_bytes(&self, direction: Direction, n: usize) {
        let n = n as u64;
        match direction {
            Direction::Upstream => self.bytes_upstream.fetch_add(n, Ordering::Relaxed),
            Direction::Downstream => self.bytes_downstream.fetch_add(n, Ordering::Relaxed),
        };
        counter!(BYTES_TOTAL, "direction" => direction.as_str()).increment(n);
    }

    /// End the session from one loop and signal the other
    ///
    /// The reason is recorded before the signal goes out, so the loop woken
    /// by it can never claim the terminal line.
    fn stop(&self, direction: Direction, reason: &ExitReason) -> bool {
        let won = self.finish(direction, reason);
        self.close();
        won
    }

    /// Tell both loops to stop; their halves drop and close the connections
    fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Record the end of the session once
    ///
    /// Returns `true` for the caller that performed the accounting.
    /// `Shutdown` is only observed after another loop has finished, so it
    /// never becomes the terminal reason.
    fn finish(&self, direction: Direction, reason: &ExitReason) -> bool {
        let mut end = self.end.lock().unwrap_or_else(PoisonError::into_inner);

        if end.is_some() || *reason == ExitReason::Shutdown {
            debug!("[{}] {} loop exit: {}", self.id, direction, reason);
            return false;
        }

        *end = Some(reason.clone());
        let count = self.registry.decrement();
        info!(
            "[{}] session exit, {} {}, up {} bytes, down {} bytes, session count({})",
            self.id,
            direction,
            reason,
            self.bytes_upstream(),
            self.bytes_downstream(),
            count
        );
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("target", &self.config.target)
            .field("bytes_upstream", &self.bytes_upstream())
            .field("bytes_downstream", &self.bytes_downstream())
            .finish()
    }
}

async fn closed_signal(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}
