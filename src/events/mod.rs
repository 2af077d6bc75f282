//! Run lifecycle events.
//!
//! The host reports state transitions, cookie loading and the final outcome
//! through an [`EventDispatcher`]; handlers decide what to do with them.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::host::HostState;

#[derive(Debug, Clone)]
pub struct StateChangedEvent {
    pub addon: String,
    pub from: HostState,
    pub to: HostState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CookiesLoadedEvent {
    pub addon: String,
    pub path: PathBuf,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Cookie file problem that was downgraded to a warning.
#[derive(Debug, Clone)]
pub struct CookieWarningEvent {
    pub addon: String,
    pub path: PathBuf,
    pub missing: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletedEvent {
    pub addon: String,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FailedEvent {
    pub addon: String,
    pub state: HostState,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
    StateChanged(StateChangedEvent),
    CookiesLoaded(CookiesLoadedEvent),
    CookieWarning(CookieWarningEvent),
    Completed(CompletedEvent),
    Failed(FailedEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RunEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: RunEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &RunEvent) {
        match event {
            RunEvent::StateChanged(change) => {
                log::debug!("{}: {:?} -> {:?}", change.addon, change.from, change.to);
            }
            RunEvent::CookiesLoaded(loaded) => {
                log::info!("{}: loaded {} cookie(s) from {}", loaded.addon, loaded.count, loaded.path.display());
            }
            RunEvent::CookieWarning(warning) if warning.missing => {
                log::info!("{}: {}", warning.addon, warning.message);
            }
            RunEvent::CookieWarning(warning) => {
                log::warn!(
                    "{}: can't resolve {} ({}). The run continues, but authenticated resources may fail to load.",
                    warning.addon,
                    warning.path.display(),
                    warning.message
                );
            }
            RunEvent::Completed(done) => {
                log::info!("{} completed in {:.2}s", done.addon, done.elapsed.as_secs_f64());
            }
            RunEvent::Failed(failed) => {
                log::error!("{} failed while {:?}: {}", failed.addon, failed.state, failed.error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &RunEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.dispatch(RunEvent::CookieWarning(CookieWarningEvent {
            addon: "example".into(),
            path: PathBuf::from("Addons/example/Cookies.json"),
            missing: true,
            message: "no cookie file".into(),
            timestamp: Utc::now(),
        }));
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }
}
