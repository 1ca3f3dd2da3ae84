use anyhow::Context;
use clap::{self, Args};

use apptp::exclusion::ExclusionReason;

use crate::session::Session;

#[derive(Args)]
pub struct Excluded {
    /// The package id to check
    #[arg()]
    package: String,
}

impl Excluded {
    pub fn run(&self, session: &Session) -> anyhow::Result<()> {
        let reason = session
            .detector
            .package_exclusion(&self.package)
            .with_context(|| format!("checking exclusions for {}", self.package))?;
        println!("{}", describe(&self.package, reason));
        Ok(())
    }
}

fn describe(package: &str, reason: Option<ExclusionReason>) -> String {
    match reason {
        Some(reason) => format!("{}: excluded ({})", package, reason),
        None => format!("{}: protected", package),
    }
}
