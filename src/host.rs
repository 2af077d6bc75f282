//! Run orchestration.
//!
//! A [`Host`] resolves one add-on by name, loads it through the registry,
//! builds its services (cookies, transport, fetcher, delays) and runs it
//! exactly once. Module failures are returned untouched.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::addons::{
	AddonContext, AddonDescriptor, AddonError, AddonLoader, AddonRegistry, DEFAULT_ADDONS_DIR,
	LoadError, discover_addons,
};
use crate::events::{
	CompletedEvent, CookieWarningEvent, CookiesLoadedEvent, EventDispatcher, EventHandler,
	FailedEvent, LoggingHandler, RunEvent, StateChangedEvent,
};
use crate::runtime::{
	COOKIES_FILE, ConfigError, CookieLoad, CookieStore, CookieWarning, DEFAULT_TIMEOUT_MS,
	DEFAULT_TIMING_SCALE, DelayScheduler, HttpTransport, ReqwestTransport, RuntimeConfig,
	TimedFetcher, TransportError, load_cookies,
};

/// Result alias used across the orchestration layer.
pub type HostResult<T> = Result<T, HostError>;

/// High-level error surfaced by the host.
#[derive(Debug, Error)]
pub enum HostError {
	#[error(transparent)]
	InvalidConfiguration(#[from] ConfigError),
	#[error(transparent)]
	Load(#[from] LoadError),
	#[error("http transport initialisation failed: {0}")]
	Transport(#[from] TransportError),
	#[error(transparent)]
	Addon(#[from] AddonError),
	#[error("run cancelled")]
	Cancelled,
	#[error("this host has already run an add-on")]
	AlreadyRun,
}

impl HostError {
	/// Whether the requested add-on could not be found.
	pub fn is_not_found(&self) -> bool {
		matches!(self, HostError::Load(LoadError::ModuleNotFound { .. }))
	}
}

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
	Idle,
	Resolving,
	Loading,
	Injecting,
	Running,
	Completed,
	Failed,
}

/// Summary returned after a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
	pub addon: String,
	pub elapsed: Duration,
	pub cookies_loaded: usize,
}

/// Builds the transport for a run from its cookie store.
pub type TransportFactory =
	Arc<dyn Fn(Arc<CookieStore>) -> Result<Arc<dyn HttpTransport>, TransportError> + Send + Sync>;

/// Host configuration used by the builder.
#[derive(Debug, Clone)]
pub struct HostConfig {
	pub addons_dir: PathBuf,
	pub timing_scale: f64,
	pub default_timeout_ms: i64,
	pub rng_seed: Option<u64>,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			addons_dir: PathBuf::from(DEFAULT_ADDONS_DIR),
			timing_scale: DEFAULT_TIMING_SCALE,
			default_timeout_ms: DEFAULT_TIMEOUT_MS as i64,
			rng_seed: None,
		}
	}
}

/// Fluent builder for [`Host`].
pub struct HostBuilder {
	config: HostConfig,
	registry: AddonRegistry,
	transport: Option<TransportFactory>,
	handlers: Vec<Arc<dyn EventHandler>>,
	cancel: Option<CancellationToken>,
}

impl HostBuilder {
	pub fn new() -> Self {
		Self {
			config: HostConfig::default(),
			registry: AddonRegistry::with_builtins(),
			transport: None,
			handlers: Vec::new(),
			cancel: None,
		}
	}

	pub fn with_config(mut self, config: HostConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_addons_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.addons_dir = dir.into();
		self
	}

	pub fn with_timing_scale(mut self, scale: f64) -> Self {
		self.config.timing_scale = scale;
		self
	}

	pub fn with_timeout_ms(mut self, timeout_ms: i64) -> Self {
		self.config.default_timeout_ms = timeout_ms;
		self
	}

	/// Makes ranged delays reproducible.
	pub fn with_rng_seed(mut self, seed: u64) -> Self {
		self.config.rng_seed = Some(seed);
		self
	}

	/// Replaces the registry of compiled-in add-ons.
	pub fn with_registry(mut self, registry: AddonRegistry) -> Self {
		self.registry = registry;
		self
	}

	/// Uses `transport` as-is instead of a reqwest client bound to the
	/// run's cookie store.
	pub fn with_transport(self, transport: Arc<dyn HttpTransport>) -> Self {
		self.with_transport_factory(move |_cookies| Ok(transport.clone()))
	}

	pub fn with_transport_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(Arc<CookieStore>) -> Result<Arc<dyn HttpTransport>, TransportError>
			+ Send
			+ Sync
			+ 'static,
	{
		self.transport = Some(Arc::new(factory));
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);
		self
	}

	/// Validates the configuration and builds the host.
	pub fn build(self) -> HostResult<Host> {
		let runtime =
			RuntimeConfig::from_millis(self.config.timing_scale, self.config.default_timeout_ms)?;

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		for handler in self.handlers {
			events.register_handler(handler);
		}

		Ok(Host {
			addons_dir: self.config.addons_dir,
			runtime,
			rng_seed: self.config.rng_seed,
			loader: AddonLoader::new(self.registry),
			transport: self.transport,
			events,
			cancel: self.cancel.unwrap_or_default(),
			state: HostState::Idle,
		})
	}
}

impl Default for HostBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Runs exactly one add-on.
pub struct Host {
	addons_dir: PathBuf,
	runtime: RuntimeConfig,
	rng_seed: Option<u64>,
	loader: AddonLoader,
	transport: Option<TransportFactory>,
	events: EventDispatcher,
	cancel: CancellationToken,
	state: HostState,
}

impl Host {
	/// Host with default configuration and the built-in add-ons.
	pub fn new() -> HostResult<Self> {
		HostBuilder::new().build()
	}

	pub fn builder() -> HostBuilder {
		HostBuilder::new()
	}

	pub fn state(&self) -> HostState {
		self.state
	}

	pub fn runtime_config(&self) -> RuntimeConfig {
		self.runtime
	}

	pub fn addons_dir(&self) -> &Path {
		&self.addons_dir
	}

	/// Token that cancels the run when fired.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	/// Installed add-ons under the discovery root.
	pub fn discover(&self) -> io::Result<Vec<String>> {
		discover_addons(&self.addons_dir)
	}

	/// Loads and runs the add-on `name` to completion.
	pub async fn run(&mut self, name: &str) -> HostResult<RunReport> {
		if self.state != HostState::Idle {
			return Err(HostError::AlreadyRun);
		}
		let started = Instant::now();

		self.transition(name, HostState::Resolving);
		let descriptor = AddonDescriptor::in_root(&self.addons_dir, name);

		self.transition(name, HostState::Loading);
		let mut addon = match self.loader.load(&descriptor) {
			Ok(addon) => addon,
			Err(err) => return Err(self.fail(name, err.into())),
		};

		self.transition(name, HostState::Injecting);
		let ctx = match self.inject(&descriptor) {
			Ok(ctx) => ctx,
			Err(err) => return Err(self.fail(name, err)),
		};
		let cookies_loaded = ctx.cookies().len();

		self.transition(name, HostState::Running);
		let cancel = self.cancel.clone();
		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(HostError::Cancelled),
			result = addon.execute(&ctx) => result.map_err(HostError::Addon),
		};
		drop(ctx);
		drop(addon);

		if let Err(err) = outcome {
			return Err(self.fail(name, err));
		}

		let elapsed = started.elapsed();
		self.transition(name, HostState::Completed);
		self.events.dispatch(RunEvent::Completed(CompletedEvent {
			addon: name.to_string(),
			elapsed,
			timestamp: chrono::Utc::now(),
		}));

		Ok(RunReport {
			addon: name.to_string(),
			elapsed,
			cookies_loaded,
		})
	}

	fn inject(&self, descriptor: &AddonDescriptor) -> HostResult<AddonContext> {
		let name = descriptor.name();
		let CookieLoad { path, records, warning } = load_cookies(&descriptor.directory().join(COOKIES_FILE));
		let cookies = Arc::new(CookieStore::from_records(records));

		match &warning {
			None => self.events.dispatch(RunEvent::CookiesLoaded(CookiesLoadedEvent {
				addon: name.to_string(),
				path,
				count: cookies.len(),
				timestamp: chrono::Utc::now(),
			})),
			Some(warning) => {
				let (missing, message) = match warning {
					CookieWarning::Missing => (
						true,
						format!("no {COOKIES_FILE}; continuing without cookies"),
					),
					CookieWarning::Unreadable(err) => (false, err.to_string()),
				};
				self.events.dispatch(RunEvent::CookieWarning(CookieWarningEvent {
					addon: name.to_string(),
					path,
					missing,
					message,
					timestamp: chrono::Utc::now(),
				}));
			}
		}

		let transport = match &self.transport {
			Some(factory) => factory(cookies.clone())?,
			None => Arc::new(ReqwestTransport::new(cookies.clone())?) as Arc<dyn HttpTransport>,
		};

		let fetcher = TimedFetcher::new(transport, &self.runtime).with_cancellation(self.cancel.clone());
		let delays = match self.rng_seed {
			Some(seed) => DelayScheduler::seeded(self.runtime.timing_scale(), seed)?,
			None => DelayScheduler::new(self.runtime.timing_scale())?,
		}
		.with_cancellation(self.cancel.clone());

		Ok(AddonContext::new(
			name,
			descriptor.directory(),
			self.runtime,
			fetcher,
			delays,
			cookies,
			self.cancel.clone(),
		))
	}

	fn transition(&mut self, addon: &str, to: HostState) {
		let from = std::mem::replace(&mut self.state, to);
		self.events.dispatch(RunEvent::StateChanged(StateChangedEvent {
			addon: addon.to_string(),
			from,
			to,
			timestamp: chrono::Utc::now(),
		}));
	}

	fn fail(&mut self, addon: &str, error: HostError) -> HostError {
		let state = self.state;
		self.events.dispatch(RunEvent::Failed(FailedEvent {
			addon: addon.to_string(),
			state,
			error: error.to_string(),
			timestamp: chrono::Utc::now(),
		}));
		self.transition(addon, HostState::Failed);
		error
	}
}

impl fmt::Debug for Host {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Host")
			.field("addons_dir", &self.addons_dir)
			.field("runtime", &self.runtime)
			.field("state", &self.state)
			.field("registry", self.loader.registry())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn build_rejects_negative_scale_before_loading() {
		let err = Host::builder().with_timing_scale(-1.0).build().err().unwrap();
		assert!(matches!(err, HostError::InvalidConfiguration(_)));
	}

	#[test]
	fn build_rejects_negative_timeout() {
		let err = Host::builder().with_timeout_ms(-5).build().err().unwrap();
		assert!(matches!(err, HostError::InvalidConfiguration(ConfigError::InvalidTimeout(-5))));
	}

	#[test]
	fn new_host_is_idle_with_defaults() {
		let host = Host::new().unwrap();
		assert_eq!(host.state(), HostState::Idle);
		assert_eq!(host.runtime_config(), RuntimeConfig::default());
		assert_eq!(host.addons_dir(), Path::new("Addons"));
	}

	#[tokio::test]
	async fn missing_addon_fails_with_not_found() {
		let root = tempfile::tempdir().unwrap();
		let mut host = Host::builder().with_addons_dir(root.path()).build().unwrap();
		let err = host.run("ghost").await.unwrap_err();
		assert!(err.is_not_found());
		assert_eq!(host.state(), HostState::Failed);
	}

	#[tokio::test]
	async fn second_run_is_rejected() {
		let root = tempfile::tempdir().unwrap();
		let mut host = Host::builder().with_addons_dir(root.path()).build().unwrap();
		let _ = host.run("ghost").await;
		assert!(matches!(host.run("ghost").await, Err(HostError::AlreadyRun)));
	}
}
