//! Periodic operator-position reports for Remote ID compliance.
//!
//! Two tasks run while enabled: one follows the operator's position source and
//! keeps only the latest fix, the other posts that fix on a fixed period. A
//! tick with no fix yet sends nothing. Failures on either side go to tracing
//! only; the operator log belongs to the station and is never shared with
//! these tasks.

use gcs_nav::gnss::{OperatorFix, PositionSource};
use gcs_proto::RemoteIdReport;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::http::{CommandClient, CommandError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const SOURCE_RETRY: Duration = Duration::from_secs(1);
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Where reports go. Implemented by [`CommandClient`] for `POST /remote_id`.
pub trait ReportSink: Send + Sync + 'static {
    fn send_report(&self, report: &RemoteIdReport) -> impl Future<Output = Result<(), CommandError>> + Send;
}

impl ReportSink for CommandClient {
    fn send_report(&self, report: &RemoteIdReport) -> impl Future<Output = Result<(), CommandError>> + Send {
        self.remote_id(report)
    }
}

fn report_for(fix: &OperatorFix) -> RemoteIdReport {
    RemoteIdReport {
        ts_unix_ms: (fix.ts.unix_timestamp_nanos() / 1_000_000) as i64,
        lat: fix.lat,
        lon: fix.lon,
        alt_m: fix.alt_m,
        hdop: fix.hdop,
    }
}

pub struct RemoteIdBroadcaster {
    interval: Duration,
    tasks: Option<(JoinHandle<()>, JoinHandle<()>)>,
}

impl Default for RemoteIdBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl RemoteIdBroadcaster {
    /// `interval` is floored at 1ms.
    pub fn new(interval: Duration) -> Self {
        Self { interval: interval.max(MIN_INTERVAL), tasks: None }
    }

    /// Starts watching `source` and reporting to `sink`. Replaces any running
    /// broadcast.
    pub fn enable(&mut self, source: impl PositionSource, sink: impl ReportSink) {
        self.disable();
        let (tx, rx) = watch::channel(None);
        let watcher = tokio::spawn(watch_position(source, tx));
        let sender = tokio::spawn(send_reports(sink, rx, self.interval));
        info!("remote_id: broadcasting every {:?}", self.interval);
        self.tasks = Some((watcher, sender));
    }

    pub fn disable(&mut self) {
        if let Some((watcher, sender)) = self.tasks.take() {
            watcher.abort();
            sender.abort();
            info!("remote_id: stopped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tasks.is_some()
    }
}

impl Drop for RemoteIdBroadcaster {
    fn drop(&mut self) {
        self.disable();
    }
}

async fn watch_position<S: PositionSource>(mut source: S, tx: watch::Sender<Option<OperatorFix>>) {
    loop {
        match source.next_fix().await {
            Ok(fix) => {
                if tx.send(Some(fix)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("remote_id: position source: {:#}", e);
                tokio::time::sleep(SOURCE_RETRY).await;
            }
        }
    }
}

async fn send_reports<K: ReportSink>(sink: K, rx: watch::Receiver<Option<OperatorFix>>, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let report = match rx.borrow().as_ref() {
            Some(fix) => report_for(fix),
            None => {
                debug!("remote_id: no operator fix yet");
                continue;
            }
        };
        if let Err(e) = sink.send_report(&report).await {
            warn!("remote_id: report failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcs_nav::gnss::GnssSource;
    use gcs_nav::LatLon;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<RemoteIdReport>>>,
        fail: bool,
    }

    impl ReportSink for Recorder {
        fn send_report(&self, report: &RemoteIdReport) -> impl Future<Output = Result<(), CommandError>> + Send {
            self.sent.lock().unwrap().push(report.clone());
            let fail = self.fail;
            async move {
                if fail {
                    Err(CommandError::Body { op: "remote_id", reason: "offline".into() })
                } else {
                    Ok(())
                }
            }
        }
    }

    struct NoFix;

    impl PositionSource for NoFix {
        fn next_fix(&mut self) -> impl Future<Output = anyhow::Result<OperatorFix>> + Send {
            std::future::pending()
        }
    }

    fn operator() -> GnssSource {
        GnssSource::fixed(LatLon::new(47.397, 8.545), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn no_fix_means_no_report() {
        let sink = Recorder::default();
        let mut b = RemoteIdBroadcaster::default();
        b.enable(NoFix, sink.clone());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(sink.sent.lock().unwrap().is_empty());
        assert!(b.is_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn reports_latest_fix_each_period() {
        let sink = Recorder::default();
        let mut b = RemoteIdBroadcaster::default();
        b.enable(operator(), sink.clone());
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let sent = sink.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].lat, 47.397);
        assert_eq!(sent[0].lon, 8.545);
        assert_eq!(sent[0].alt_m, None);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_reports() {
        let sink = Recorder::default();
        let mut b = RemoteIdBroadcaster::default();
        b.enable(operator(), sink.clone());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        b.disable();
        assert!(!b.is_enabled());
        let before = sink.sent.lock().unwrap().len();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.sent.lock().unwrap().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failures_do_not_stop_broadcast() {
        let sink = Recorder { fail: true, ..Default::default() };
        let mut b = RemoteIdBroadcaster::default();
        b.enable(operator(), sink.clone());
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(sink.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_floored() {
        let sink = Recorder::default();
        let mut b = RemoteIdBroadcaster::new(Duration::ZERO);
        b.enable(operator(), sink.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(b.is_enabled());
        assert!(!sink.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn report_timestamp_in_millis() {
        let fix = OperatorFix {
            lat: 1.0,
            lon: 2.0,
            alt_m: Some(420.5),
            hdop: Some(0.9),
            sats: Some(14),
            ts: time::macros::datetime!(2024-05-01 12:00:00.250 UTC),
        };
        let r = report_for(&fix);
        assert_eq!(r.ts_unix_ms, 1_714_564_800_250);
        assert_eq!(r.alt_m, Some(420.5));
        assert_eq!(r.hdop, Some(0.9));
    }
}
