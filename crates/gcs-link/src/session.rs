//! Streaming telemetry channel with endpoint supersession and data-liveness
//! tracking.
//!
//! Every channel is opened under a fresh epoch. Reader tasks tag each frame
//! with the epoch they were opened for, and frames from a superseded epoch are
//! dropped at delivery time, even when they were already queued before the
//! endpoint changed.

use futures_util::StreamExt;
use gcs_proto::{decode, TelemetryMessage};
use reqwest::Url;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Stale,
    Errored,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Message(TelemetryMessage),
    /// Channel may still be open but telemetry stopped arriving.
    Stale,
    TransportError(TransportError),
    Closed,
}

/// What a reader task reports back for its channel.
#[derive(Debug)]
pub enum Frame {
    Opened,
    Text(String),
    Failed(TransportError),
    Closed,
}

/// Write side handed to a reader task; stamps frames with the channel epoch.
#[derive(Debug, Clone)]
pub struct FrameSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, Frame)>,
}

impl FrameSink {
    /// Returns false once the owning session is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.tx.send((self.epoch, frame)).is_ok()
    }
}

/// Opens the transport for one channel and feeds its frames into `sink`.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: Url, sink: FrameSink) -> JoinHandle<()>;
}

/// WebSocket transport (`tokio-tungstenite`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: Url, sink: FrameSink) -> JoinHandle<()> {
        tokio::spawn(read_ws(url, sink))
    }
}

async fn read_ws(url: Url, sink: FrameSink) {
    let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            sink.send(Frame::Failed(TransportError::Connect { url: url.to_string(), reason: e.to_string() }));
            return;
        }
    };
    if !sink.send(Frame::Opened) {
        return;
    }

    while let Some(item) = ws.next().await {
        let text = match item {
            Ok(Message::Text(s)) => s,
            Ok(Message::Binary(b)) => match String::from_utf8(b) {
                Ok(s) => s,
                Err(_) => {
                    debug!("session: ignoring non-utf8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                sink.send(Frame::Failed(TransportError::Stream(e.to_string())));
                return;
            }
        };
        if !sink.send(Frame::Text(text)) {
            return;
        }
    }
    sink.send(Frame::Closed);
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Gap without telemetry after which the feed counts as stale.
    pub stale_after: Duration,
    /// Staleness check period.
    pub tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { stale_after: Duration::from_secs(5), tick: Duration::from_secs(1) }
    }
}

type Subscriber = Box<dyn FnMut(&SessionEvent) + Send>;

pub struct TelemetrySession<C: Connector = WsConnector> {
    connector: C,
    cfg: SessionConfig,
    endpoint: Option<Endpoint>,
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, Frame)>,
    rx: mpsc::UnboundedReceiver<(u64, Frame)>,
    reader: Option<JoinHandle<()>>,
    state: ConnectionState,
    opened_at: Option<Instant>,
    last_telemetry: Option<Instant>,
    ticker: Option<Interval>,
    subscribers: Vec<Subscriber>,
}

enum Wake {
    Frame(u64, Frame),
    Tick(Instant),
}

impl<C: Connector> TelemetrySession<C> {
    pub fn new(connector: C, cfg: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            connector,
            cfg,
            endpoint: None,
            epoch: 0,
            tx,
            rx,
            reader: None,
            state: ConnectionState::Closed,
            opened_at: None,
            last_telemetry: None,
            ticker: None,
            subscribers: Vec::new(),
        }
    }

    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Tears down the current channel and opens a new one against `endpoint`.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.teardown();
        let url = endpoint.stream_url();
        info!("session: connecting to {} (epoch={})", url, self.epoch);
        let sink = FrameSink { epoch: self.epoch, tx: self.tx.clone() };
        self.reader = Some(self.connector.open(url, sink));
        self.endpoint = Some(endpoint);
        self.state = ConnectionState::Connecting;
    }

    pub fn close(&mut self) {
        self.teardown();
        self.state = ConnectionState::Closed;
    }

    fn teardown(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.epoch += 1;
        self.opened_at = None;
        self.last_telemetry = None;
    }

    /// Registers a callback run for every event, in delivery order.
    pub fn subscribe(&mut self, handler: impl FnMut(&SessionEvent) + Send + 'static) {
        self.subscribers.push(Box::new(handler));
    }

    /// Waits for the next event of the current channel.
    ///
    /// Cancel-safe: nothing is consumed unless an event is returned or a frame
    /// is dropped.
    pub async fn recv(&mut self) -> SessionEvent {
        loop {
            let wake = {
                let period = self.cfg.tick.max(Duration::from_millis(1));
                let ticker = self.ticker.get_or_insert_with(|| {
                    let mut t = interval_at(Instant::now() + period, period);
                    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    t
                });
                tokio::select! {
                    Some((epoch, frame)) = self.rx.recv() => Wake::Frame(epoch, frame),
                    now = ticker.tick() => Wake::Tick(now),
                }
            };

            let event = match wake {
                Wake::Frame(epoch, frame) if epoch == self.epoch => self.accept(frame, Instant::now()),
                Wake::Frame(epoch, frame) => {
                    debug!("session: dropping {:?} from superseded epoch {}", frame, epoch);
                    None
                }
                Wake::Tick(now) => self.check_staleness(now),
            };

            if let Some(event) = event {
                for handler in &mut self.subscribers {
                    handler(&event);
                }
                return event;
            }
        }
    }

    /// Applies one frame of the current channel to the connection state.
    pub(crate) fn accept(&mut self, frame: Frame, now: Instant) -> Option<SessionEvent> {
        match frame {
            Frame::Opened => {
                info!("session: channel open");
                self.state = ConnectionState::Open;
                self.opened_at = Some(now);
                Some(SessionEvent::Opened)
            }
            Frame::Text(text) => match decode(&text) {
                Ok(msg) => {
                    if matches!(msg, TelemetryMessage::Telemetry(_)) {
                        self.last_telemetry = Some(now);
                        if matches!(self.state, ConnectionState::Stale | ConnectionState::Connecting) {
                            info!("session: telemetry flowing");
                            self.state = ConnectionState::Open;
                        }
                    }
                    Some(SessionEvent::Message(msg))
                }
                Err(e) => {
                    warn!("session: dropping frame: {}", e);
                    None
                }
            },
            Frame::Failed(e) => {
                warn!("session: {}", e);
                self.state = ConnectionState::Errored;
                Some(SessionEvent::TransportError(e))
            }
            Frame::Closed => {
                info!("session: channel closed by peer");
                self.state = ConnectionState::Closed;
                Some(SessionEvent::Closed)
            }
        }
    }

    /// Reports `Stale` once when no telemetry arrived for longer than the
    /// threshold, counted from channel open if nothing arrived yet.
    pub fn check_staleness(&mut self, now: Instant) -> Option<SessionEvent> {
        if self.state != ConnectionState::Open {
            return None;
        }
        let since = self.last_telemetry.or(self.opened_at)?;
        let gap = now.saturating_duration_since(since);
        if gap > self.cfg.stale_after {
            warn!("session: no telemetry for {:.1}s", gap.as_secs_f32());
            self.state = ConnectionState::Stale;
            return Some(SessionEvent::Stale);
        }
        None
    }
}

impl<C: Connector> Drop for TelemetrySession<C> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps every sink it is handed so tests can inject frames per channel.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingConnector {
        pub(crate) opened: Arc<Mutex<Vec<(Url, FrameSink)>>>,
    }

    impl RecordingConnector {
        pub(crate) fn sink(&self, i: usize) -> FrameSink {
            self.opened.lock().unwrap()[i].1.clone()
        }
    }

    impl Connector for RecordingConnector {
        fn open(&self, url: Url, sink: FrameSink) -> JoinHandle<()> {
            self.opened.lock().unwrap().push((url, sink));
            tokio::spawn(async {})
        }
    }

    pub(crate) fn telemetry_frame(status: &str, lat: f64) -> Frame {
        Frame::Text(format!(
            r#"{{"type":"telemetry","lat":{},"lon":-122.084,"heading":45.0,"status":"{}","gps_satellites":12,"battery_voltage":12.1}}"#,
            lat, status
        ))
    }
}
