use std::io::Write;
use std::sync::Mutex;

use blanket::blanket;
use crossbeam::channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingApp {
    pub package_id: String,
    pub app_name: String,
}

/// Record of one confirmed third party tracker sighting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnTracker {
    pub tracker_company_id: i32,
    pub company: String,
    pub company_display_name: String,
    pub domain: String,
    pub tracking_app: TrackingApp,
}

/// Receives tracker records. Recording is fire and forget: implementations
/// deal with their own failures.
#[blanket(derive(Ref, Box, Arc))]
pub trait AppTrackerRecorder: Send + Sync {
    fn insert_tracker(&self, tracker: VpnTracker);
}

/// Hands records off to another thread over a channel. Records are dropped
/// (and logged) if the channel is full or the receiver is gone.
#[derive(Clone)]
pub struct ChannelRecorder {
    tx: Sender<VpnTracker>,
}

impl ChannelRecorder {
    pub fn new(tx: Sender<VpnTracker>) -> Self {
        Self { tx }
    }
}

impl AppTrackerRecorder for ChannelRecorder {
    fn insert_tracker(&self, tracker: VpnTracker) {
        match self.tx.try_send(tracker) {
            Ok(_) => {}
            Err(TrySendError::Full(t)) => {
                log::warn!("recorder channel full, dropping tracker {}", t.domain)
            }
            Err(TrySendError::Disconnected(t)) => {
                log::warn!("recorder channel closed, dropping tracker {}", t.domain)
            }
        }
    }
}

/// Writes every record as a single line of JSON
pub struct JsonLinesRecorder<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesRecorder<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_record(&self, tracker: &VpnTracker) -> crate::Result<()> {
        let mut line = serde_json::to_vec(tracker)?;
        line.push(b'\n');
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        out.write_all(&line)?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> AppTrackerRecorder for JsonLinesRecorder<W> {
    fn insert_tracker(&self, tracker: VpnTracker) {
        if let Err(e) = self.write_record(&tracker) {
            log::warn!("failed to record tracker {}: {}", tracker.domain, e);
        }
    }
}
