//! caxa stub - extracts the payload appended to its own executable and runs
//! the packaged command against it.

mod error;
mod progress;

use anyhow::Context;
use anyhow::Result;
use caxa_core::CacheConfig;
use caxa_core::CommandRunner;
use caxa_core::ExtractionCoordinator;
use caxa_core::SelfImage;
use caxa_core::WireFormat;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::progress::StubProgress;

/// Environment variable holding the log filter, e.g. `CAXA_LOG=debug`.
const LOG_ENV: &str = "CAXA_LOG";

#[cfg(feature = "hash-separator")]
const WIRE_FORMAT: WireFormat = WireFormat::HASH_RUN;
#[cfg(not(feature = "hash-separator"))]
const WIRE_FORMAT: WireFormat = WireFormat::CAXA;

fn main() {
    init_logging();

    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("caxa stub: {}", error::render(&err));
            error::exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let image = SelfImage::current(WIRE_FORMAT).context("failed to read own executable")?;
    let (parsed, archive) = image.payload()?;
    let footer = &parsed.footer;

    let coordinator = ExtractionCoordinator::new(CacheConfig::default());
    let mut progress = StubProgress::new();
    let directory = coordinator
        .resolve(
            &footer.identifier,
            archive,
            footer.uncompression_message.as_deref(),
            &mut progress,
        )
        .with_context(|| format!("failed to prepare application {}", footer.identifier))?;
    debug!("application directory: {}", directory.display());

    let runner = CommandRunner::new(&footer.command, &directory, std::env::args_os().skip(1));
    Ok(runner.run()?)
}

/// Logs go to stderr so they never mix with the packaged command's output.
fn init_logging() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    // Logging is never fatal.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish()
        .try_init();
}
