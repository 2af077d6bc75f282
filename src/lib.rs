//! # web-archiver
//!
//! A small host for pluggable web-archiving add-ons.
//!
//! The host loads exactly one add-on per run and hands it a set of shared
//! services before calling its entry point:
//!
//! - a timeout-bounded HTTP GET ([`TimedFetcher`]) backed by reqwest, with
//!   transparent gzip/deflate/brotli decoding
//! - persisted cookies from the add-on's `Cookies.json` ([`CookieStore`])
//! - politeness delays scaled by a global timing multiplier
//!   ([`DelayScheduler`]), with seedable jitter
//! - run-wide cancellation that unblocks pending waits and fetches
//!
//! ## Example
//!
//! ```no_run
//! use web_archiver::Host;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut host = Host::builder()
//!         .with_addons_dir("Addons")
//!         .with_timing_scale(0.5)
//!         .with_timeout_ms(10_000)
//!         .build()?;
//!     let report = host.run("snapshot").await?;
//!     println!("finished in {:?}", report.elapsed);
//!     Ok(())
//! }
//! ```

mod host;

pub mod addons;
pub mod cli;
pub mod events;
pub mod runtime;

pub use crate::host::{
    Host,
    HostBuilder,
    HostConfig,
    HostError,
    HostResult,
    HostState,
    RunReport,
    TransportFactory,
};

pub use crate::addons::{
    Addon,
    AddonContext,
    AddonDescriptor,
    AddonError,
    AddonLoader,
    AddonManifest,
    AddonRegistry,
    LoadError,
    discover_addons,
};

pub use crate::events::{EventDispatcher, EventHandler, LoggingHandler, RunEvent};

pub use crate::runtime::{
    ConfigError,
    CookieRecord,
    CookieStore,
    DelayError,
    DelayRequest,
    DelayScheduler,
    FetchError,
    FetchRequest,
    FetchResponse,
    HttpTransport,
    ReqwestTransport,
    RuntimeConfig,
    TimedFetcher,
    TransportError,
};
