//! Services shared with add-ons during a run: configuration, cookies,
//! timed fetches and politeness delays.

pub mod config;
pub mod cookies;
pub mod fetch;
pub mod reqwest_transport;
pub mod timing;

pub use config::{ConfigError, DEFAULT_TIMEOUT_MS, DEFAULT_TIMING_SCALE, RuntimeConfig};
pub use cookies::{
    COOKIES_FILE, CookieKey, CookieLoad, CookieLoadError, CookieRecord, CookieStore, CookieWarning,
    load_cookies,
};
pub use fetch::{
    FetchError, FetchRequest, FetchResponse, FetchResult, HttpTransport, TimedFetcher, TransportError,
};
pub use reqwest_transport::ReqwestTransport;
pub use timing::{DelayError, DelayRequest, DelayScheduler};
