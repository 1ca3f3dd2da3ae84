use std::io::{stdout, Write};

use clap::{self, Args};

use apptp::AppTrackerDetector;

use crate::session::Session;

#[derive(Args)]
pub struct Evaluate {
    /// The domain the app is connecting to
    #[arg()]
    domain: String,

    /// The uid of the process making the connection
    #[arg()]
    uid: i32,
}

impl Evaluate {
    pub fn run(&self, session: &Session) -> anyhow::Result<()> {
        let mut out = stdout().lock();
        self.evaluate(&session.detector, &mut out)
    }

    fn evaluate<W: Write>(&self, detector: &dyn AppTrackerDetector, out: &mut W) -> anyhow::Result<()> {
        match detector.evaluate(&self.domain, self.uid) {
            Some(sighting) => {
                serde_json::to_writer_pretty(&mut *out, &sighting)?;
                writeln!(out)?;
            }
            None => writeln!(out, "not a tracker")?,
        }
        Ok(())
    }
}
