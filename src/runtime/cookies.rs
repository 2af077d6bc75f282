//! Shared cookie state for a run.
//!
//! Cookies are loaded once from the add-on's `Cookies.json`, deduplicated by
//! `(domain, name, path)`, and handed to the HTTP transport behind an `Arc`.
//! Cookies set by responses land in the transport jar; nothing is written back
//! to disk.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDateTime, Utc};
use http::HeaderValue;
use reqwest::cookie::{CookieStore as _, Jar};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// File name looked up inside each add-on directory.
pub const COOKIES_FILE: &str = "Cookies.json";

/// One persisted cookie.
///
/// Field names are PascalCase so files exported by the legacy archiver keep
/// loading; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CookieRecord {
    pub name: String,
    #[serde(default)]
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

/// Identity used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CookieKey {
    pub domain: String,
    pub name: String,
    pub path: String,
}

impl CookieRecord {
    pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            secure: false,
            http_only: false,
            expires: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn key(&self) -> CookieKey {
        CookieKey {
            domain: self.domain.trim_start_matches('.').to_ascii_lowercase(),
            name: self.name.clone(),
            path: self.path.clone(),
        }
    }

    /// Expiry as UTC, if one is set and meaningful.
    ///
    /// The legacy format writes `0001-01-01T00:00:00` for session cookies;
    /// anything before the Unix epoch is treated the same way.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.expires.as_deref()?.trim();
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.and_utc()))
            .ok()?;
        (parsed.timestamp() > 0).then_some(parsed)
    }

    /// Session cookies never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires| expires <= now)
    }

    fn origin(&self) -> Option<Url> {
        let host = self.domain.trim_start_matches('.');
        if host.is_empty() {
            return None;
        }
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{host}{}", self.path)).ok()
    }

    fn to_set_cookie(&self) -> String {
        let mut header = format!("{}={}; Domain={}; Path={}", self.name, self.value, self.domain, self.path);
        if let Some(expires) = self.expires_at() {
            header.push_str("; Expires=");
            header.push_str(&expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string());
        }
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header
    }
}

/// Mutable cookie set shared between an add-on and its transport.
#[derive(Debug, Default)]
pub struct CookieStore {
    records: RwLock<BTreeMap<CookieKey, CookieRecord>>,
    jar: Jar,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = CookieRecord>,
    {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Adds or replaces the cookie with the same `(domain, name, path)`.
    ///
    /// Returns `false` and keeps nothing when the cookie could never be sent:
    /// no usable domain, or already expired.
    pub fn insert(&self, record: CookieRecord) -> bool {
        let Some(origin) = record.origin() else {
            log::warn!("cookie '{}' has no usable domain; skipping it", record.name);
            return false;
        };
        if record.is_expired_at(Utc::now()) {
            log::warn!("cookie '{}' for {} has expired; skipping it", record.name, record.domain);
            return false;
        }

        self.jar.add_cookie_str(&record.to_set_cookie(), &origin);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.key(), record);
        true
    }

    /// Records loaded or inserted explicitly, ordered by key.
    pub fn records(&self) -> Vec<CookieRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Cookie` header the transport would send to `url`.
    pub fn header_for(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

impl reqwest::cookie::CookieStore for CookieStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.jar.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

#[derive(Debug, Error)]
pub enum CookieLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of loading a cookie file. Loading never fails the run; problems
/// are reported through `warning` with an empty record list.
#[derive(Debug)]
pub struct CookieLoad {
    pub path: PathBuf,
    pub records: Vec<CookieRecord>,
    pub warning: Option<CookieWarning>,
}

#[derive(Debug)]
pub enum CookieWarning {
    Missing,
    Unreadable(CookieLoadError),
}

/// Reads `path`, downgrading every failure to a warning.
pub fn load_cookies(path: &Path) -> CookieLoad {
    let path = path.to_path_buf();
    match read_cookie_file(&path) {
        Ok(records) => CookieLoad {
            path,
            records,
            warning: None,
        },
        Err(CookieLoadError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => CookieLoad {
            path,
            records: Vec::new(),
            warning: Some(CookieWarning::Missing),
        },
        Err(err) => CookieLoad {
            path,
            records: Vec::new(),
            warning: Some(CookieWarning::Unreadable(err)),
        },
    }
}

fn read_cookie_file(path: &Path) -> Result<Vec<CookieRecord>, CookieLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| CookieLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CookieLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_by_domain_name_and_path() {
        let store = CookieStore::from_records([
            CookieRecord::new("example.com", "sid", "old"),
            CookieRecord::new(".example.com", "sid", "new"),
            CookieRecord::new("example.com", "sid", "scoped").with_path("/account"),
        ]);

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.value == "new" && r.path == "/"));
        assert!(records.iter().any(|r| r.value == "scoped"));
    }

    #[test]
    fn inserted_cookies_reach_the_jar() {
        let store = CookieStore::from_records([CookieRecord::new("example.com", "sid", "abc")]);
        let url = Url::parse("http://example.com/page").unwrap();
        let header = store.header_for(&url).expect("cookie header");
        assert_eq!(header.to_str().unwrap(), "sid=abc");
    }

    #[test]
    fn expired_cookie_is_not_counted() {
        let mut expired = CookieRecord::new("example.com", "old", "1");
        expired.expires = Some("2001-01-01T00:00:00Z".into());
        let mut live = CookieRecord::new("example.com", "sid", "abc");
        live.expires = Some("2999-01-01T00:00:00Z".into());

        let store = CookieStore::from_records([expired, live]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].name, "sid");

        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(store.header_for(&url).unwrap().to_str().unwrap(), "sid=abc");
    }

    #[test]
    fn cookie_without_domain_is_skipped() {
        let store = CookieStore::new();
        assert!(!store.insert(CookieRecord::new("", "orphan", "x")));
        assert!(store.is_empty());
    }

    #[test]
    fn session_cookie_never_expires() {
        let mut record = CookieRecord::new("example.com", "s", "v");
        record.expires = Some("0001-01-01T00:00:00".into());
        assert!(!record.is_expired_at(Utc::now()));
        assert!(CookieStore::new().insert(record));
    }

    #[test]
    fn parses_legacy_pascal_case_file() {
        let json = r#"[{
            "Comment": "", "Discard": false, "Domain": ".example.com",
            "Expired": false, "Expires": "0001-01-01T00:00:00", "HttpOnly": true,
            "Name": "session", "Path": "/", "Port": "", "Secure": false,
            "TimeStamp": "2019-03-01T10:00:00+08:00", "Value": "xyz", "Version": 0
        }]"#;
        let records: Vec<CookieRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "session");
        assert!(records[0].http_only);
        assert_eq!(records[0].expires_at(), None);
    }

    #[test]
    fn expiry_parses_rfc3339() {
        let mut record = CookieRecord::new("example.com", "a", "b");
        record.expires = Some("2030-01-02T03:04:05Z".into());
        assert_eq!(record.expires_at().unwrap().to_rfc3339(), "2030-01-02T03:04:05+00:00");
    }

    #[test]
    fn missing_file_yields_empty_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let load = load_cookies(&dir.path().join(COOKIES_FILE));
        assert!(load.records.is_empty());
        assert!(matches!(load.warning, Some(CookieWarning::Missing)));
    }

    #[test]
    fn malformed_file_yields_empty_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COOKIES_FILE);
        fs::write(&path, "{ not json").unwrap();

        let load = load_cookies(&path);
        assert!(load.records.is_empty());
        assert!(matches!(
            load.warning,
            Some(CookieWarning::Unreadable(CookieLoadError::Parse { .. }))
        ));
    }

    #[test]
    fn valid_file_loads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COOKIES_FILE);
        fs::write(&path, r#"[{"Name":"a","Value":"1","Domain":"example.com"}]"#).unwrap();

        let load = load_cookies(&path);
        assert!(load.warning.is_none());
        assert_eq!(CookieStore::from_records(load.records).len(), 1);
    }
}
