use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use flexi_logger::{FileSpec, LogSpecification, Logger, LoggerHandle, WriteMode};

mod session;
use session::Session;

mod evaluate;
use evaluate::Evaluate;

mod batch;
use batch::Batch;

mod excluded;
use excluded::Excluded;

#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(name = "apptp")]
#[command(version)]
struct Cli {
    /// `-c`, `--config`: The TOML configuration describing where the
    /// blocklist, packages and exclusion lists live
    #[arg(short = 'c', long, env = "APPTP_CONFIG", help = "Path to the config file")]
    config: PathBuf,

    /// `-s`, `--log-spec`: Log spec for [flexi_logger](https://docs.rs/flexi_logger/latest/flexi_logger/struct.LogSpecification.html),
    /// `RUST_LOG` is used if this isn't set and `warn` if neither is
    #[arg(short = 's', long, help = "Log spec for flexi_logger")]
    log_spec: Option<String>,

    /// `-l`, `--log-file`: Send log output to the given file instead of
    /// `stderr`
    #[arg(short = 'l', long, help = "Send log output to the given file")]
    log_file: Option<PathBuf>,

    /// Append tracker records to this file as JSON lines. When not set the
    /// records are logged at info level.
    #[arg(long)]
    record_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single connection
    #[command()]
    Evaluate(Evaluate),

    /// Evaluate `DOMAIN UID` lines read from stdin or a file
    ///
    /// One JSON sighting is printed for each connection that should be
    /// blocked.
    #[command()]
    Batch(Batch),

    /// Check whether a package is excluded from protection, and why
    #[command()]
    Excluded(Excluded),
}

impl Cli {
    fn configure_loggers(&self) -> anyhow::Result<LoggerHandle> {
        let log_spec = match &self.log_spec {
            Some(s) => {
                LogSpecification::parse(s).with_context(|| format!("parsing log spec {}", s))?
            }
            None => LogSpecification::env_or_parse("warn")
                .with_context(|| "getting log spec from env")?,
        };

        let mut logger = Logger::with(log_spec);

        if let Some(v) = &self.log_file {
            let path = if v.is_absolute() {
                Cow::Borrowed(v)
            } else {
                Cow::Owned(std::env::current_dir()?.join(v))
            };
            logger = logger
                .log_to_file(FileSpec::try_from(path.as_ref()).with_context(|| "creating filespec")?)
                .append()
                .write_mode(WriteMode::BufferAndFlush);
        }

        logger.start().with_context(|| "starting logger")
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_handle = cli.configure_loggers()?;

    let res = Session::load(&cli.config, cli.record_file.as_deref()).and_then(|session| {
        let res = match &cli.command {
            Commands::Evaluate(c) => c.run(&session),
            Commands::Batch(c) => c.run(&session),
            Commands::Excluded(c) => c.run(&session),
        };
        session.log_records();
        res
    });

    log_handle.flush();
    res
}
