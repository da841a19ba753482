//! Runtime core of caxa self-extracting executables.
//!
//! A caxa executable is a small stub with a gzip-compressed tar archive and a
//! JSON footer appended to its own binary. At run time `caxa-core` finds the
//! footer and the archive inside the running image, extracts the archive into
//! a per-identifier cache shared by every invocation on the machine, and runs
//! the packaged command against the extracted tree.
//!
//! # Examples
//!
//! ```no_run
//! use caxa_core::CacheConfig;
//! use caxa_core::CommandRunner;
//! use caxa_core::ExtractionCoordinator;
//! use caxa_core::NoopProgress;
//! use caxa_core::SelfImage;
//! use caxa_core::WireFormat;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let image = SelfImage::current(WireFormat::default())?;
//! let (parsed, archive) = image.payload()?;
//!
//! let coordinator = ExtractionCoordinator::new(CacheConfig::default());
//! let directory = coordinator.resolve(&parsed.footer.identifier, archive, None, &mut NoopProgress)?;
//!
//! let runner = CommandRunner::new(&parsed.footer.command, &directory, std::env::args_os().skip(1));
//! std::process::exit(runner.run()?);
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod coordinator;
pub mod copy;
pub mod error;
pub mod extraction;
pub mod footer;
pub mod payload;
pub mod report;
pub mod types;

#[doc(hidden)]
pub mod test_utils;

pub use command::CommandRunner;
pub use config::CacheConfig;
pub use config::WireFormat;
pub use coordinator::ExtractionCoordinator;
pub use coordinator::SlotClaim;
pub use error::Result;
pub use error::StubError;
pub use extraction::TarExtractor;
pub use footer::CommandTemplate;
pub use footer::Footer;
pub use payload::SelfImage;
pub use report::ExtractionReport;
pub use report::NoopProgress;
pub use report::ProgressCallback;

pub use types::EntryType;
pub use types::TarEntry;
