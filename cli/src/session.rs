use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Context;
use crossbeam::channel::{unbounded, Receiver};

use apptp::recorder::{AppTrackerRecorder, ChannelRecorder, JsonLinesRecorder, VpnTracker};
use apptp::{detector_from_config, DetectorConfig, RealAppTrackerDetector};

/// A detector wired up from the config file, plus wherever its records go
pub struct Session {
    pub detector: RealAppTrackerDetector,
    records: Option<Receiver<VpnTracker>>,
}

impl Session {
    pub fn load(config: &Path, record_file: Option<&Path>) -> anyhow::Result<Self> {
        let cfg = DetectorConfig::from_file(config)
            .with_context(|| format!("loading config {}", config.display()))?;

        let mut records = None;
        let recorder: Box<dyn AppTrackerRecorder> = match record_file {
            Some(path) => {
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening record file {}", path.display()))?;
                Box::new(JsonLinesRecorder::new(f))
            }
            None => {
                let (tx, rx) = unbounded();
                records = Some(rx);
                Box::new(ChannelRecorder::new(tx))
            }
        };

        let detector = detector_from_config(&cfg, recorder).with_context(|| "creating detector")?;
        Ok(Self { detector, records })
    }

    /// Logs anything recorded so far when there's no record file
    pub fn log_records(&self) {
        let Some(rx) = &self.records else {
            return;
        };
        for tracker in rx.try_iter() {
            match serde_json::to_string(&tracker) {
                Ok(s) => log::info!("recorded tracker: {}", s),
                Err(e) => log::warn!("failed to serialize tracker {}: {}", tracker.domain, e),
            }
        }
    }
}
