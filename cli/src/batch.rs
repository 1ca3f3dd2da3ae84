use std::fs::File;
use std::io::{stdin, stdout, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::bail;
use clap::{self, Args};

use apptp::AppTrackerDetector;

use crate::session::Session;

#[derive(Args)]
pub struct Batch {
    /// Read connections from this file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Stop at the first malformed line instead of skipping it
    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    strict: bool,
}

/// Totals for a batch run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub evaluated: usize,
    pub blocked: usize,
    pub skipped: usize,
}

impl Batch {
    pub fn run(&self, session: &Session) -> anyhow::Result<()> {
        let mut out = stdout().lock();
        // Keep the record channel from growing with the input
        let mut drain = || session.log_records();
        let stats = match &self.file {
            Some(path) => {
                let f = File::open(path)?;
                self.evaluate_all(&session.detector, BufReader::new(f), &mut out, &mut drain)?
            }
            None => self.evaluate_all(&session.detector, stdin().lock(), &mut out, &mut drain)?,
        };
        log::info!(
            "evaluated {} connections, {} blocked, {} skipped",
            stats.evaluated,
            stats.blocked,
            stats.skipped
        );
        Ok(())
    }

    /// `after_each` runs after every evaluated connection
    fn evaluate_all<R: BufRead, W: Write>(
        &self,
        detector: &dyn AppTrackerDetector,
        input: R,
        out: &mut W,
        after_each: &mut dyn FnMut(),
    ) -> anyhow::Result<BatchStats> {
        let mut stats = BatchStats::default();
        for (i, line) in input.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (domain, uid) = match parse_request(trimmed) {
                Some(req) => req,
                None if self.strict => bail!("malformed line {}: {}", i + 1, trimmed),
                None => {
                    log::warn!("skipping malformed line {}: {}", i + 1, trimmed);
                    stats.skipped += 1;
                    continue;
                }
            };

            stats.evaluated += 1;
            if let Some(sighting) = detector.evaluate(domain, uid) {
                stats.blocked += 1;
                serde_json::to_writer(&mut *out, &sighting)?;
                writeln!(out)?;
            }
            after_each();
        }
        out.flush()?;
        Ok(stats)
    }
}

/// Parse a `DOMAIN UID` line
fn parse_request(line: &str) -> Option<(&str, i32)> {
    let mut split = line.split_ascii_whitespace();
    let domain = split.next()?;
    let uid = split.next()?.parse::<i32>().ok()?;
    if split.next().is_some() {
        return None;
    }
    Some((domain, uid))
}
