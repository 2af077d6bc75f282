//! Add-on resolution and instantiation.
//!
//! A loadable unit is a JSON manifest at `<root>/<name>/<name>.json` listing
//! the add-on types it exports. Exported names are resolved against a static
//! [`AddonRegistry`] of compiled-in factories; exactly one must match.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::contract::{Addon, AddonError};

/// Extension of the manifest file named after its add-on directory.
pub const MANIFEST_EXTENSION: &str = "json";

pub type LoadResult<T> = Result<T, LoadError>;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("add-on '{name}' not found: {reason}")]
    ModuleNotFound { name: String, reason: String },
    #[error("add-on '{name}' is ambiguous: {} exports implement an add-on ({})", .candidates.len(), .candidates.join(", "))]
    AmbiguousModule { name: String, candidates: Vec<String> },
    #[error("failed to load add-on '{name}': {reason}")]
    Failed {
        name: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LoadError {
    fn not_found(name: &str, reason: impl Into<String>) -> Self {
        LoadError::ModuleNotFound {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    fn failed<E>(name: &str, reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        LoadError::Failed {
            name: name.to_string(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Name plus the location of its loadable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonDescriptor {
    name: String,
    locator: PathBuf,
}

impl AddonDescriptor {
    pub fn new(name: impl Into<String>, locator: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
        }
    }

    /// Descriptor for `name` under the discovery root `root`.
    pub fn in_root(root: &Path, name: &str) -> Self {
        Self::new(name, manifest_path(root, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> &Path {
        &self.locator
    }

    /// Directory containing the loadable unit.
    pub fn directory(&self) -> &Path {
        self.locator.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Path of the loadable unit for `name` under `root`.
pub fn manifest_path(root: &Path, name: &str) -> PathBuf {
    root.join(name).join(format!("{name}.{MANIFEST_EXTENSION}"))
}

/// Contents of a loadable unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonManifest {
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AddonManifest {
    pub fn read(path: &Path) -> io::Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// Zero-argument constructor of an add-on.
pub type AddonFactory = Arc<dyn Fn() -> Result<Box<dyn Addon>, AddonError> + Send + Sync>;

/// Compiled-in add-on types, keyed by exported name.
#[derive(Clone, Default)]
pub struct AddonRegistry {
    factories: BTreeMap<String, AddonFactory>,
}

impl AddonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the add-ons shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_all(&mut registry);
        registry
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Box<dyn Addon>, AddonError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Registers a type constructed through `Default`.
    pub fn register_default<A>(&mut self, name: impl Into<String>) -> &mut Self
    where
        A: Addon + Default + 'static,
    {
        self.register(name, || Ok(Box::new(A::default()) as Box<dyn Addon>))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn factory(&self, name: &str) -> Option<&AddonFactory> {
        self.factories.get(name)
    }
}

impl fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

/// Resolves descriptors to add-on instances.
#[derive(Debug, Clone)]
pub struct AddonLoader {
    registry: AddonRegistry,
}

impl AddonLoader {
    pub fn new(registry: AddonRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AddonRegistry {
        &self.registry
    }

    /// Loads the single add-on exported by the descriptor's unit.
    pub fn load(&self, descriptor: &AddonDescriptor) -> LoadResult<Box<dyn Addon>> {
        let name = descriptor.name();
        let manifest = match AddonManifest::read(descriptor.locator()) {
            Ok(manifest) => manifest,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LoadError::not_found(
                    name,
                    format!("no loadable unit at {}", descriptor.locator().display()),
                ));
            }
            Err(err) => {
                return Err(LoadError::failed(
                    name,
                    format!("cannot read {}", descriptor.locator().display()),
                    err,
                ));
            }
        };

        let candidates = self.implementers(&manifest);
        if candidates.len() > 1 {
            return Err(LoadError::AmbiguousModule {
                name: name.to_string(),
                candidates,
            });
        }
        let Some(export) = candidates.into_iter().next() else {
            return Err(LoadError::not_found(
                name,
                "the unit exports no registered add-on type",
            ));
        };

        let factory = self
            .registry
            .factory(&export)
            .ok_or_else(|| LoadError::not_found(name, format!("export '{export}' is not registered")))?;

        log::debug!("instantiating add-on '{name}' from export '{export}'");
        factory().map_err(|err| LoadError::failed(name, format!("constructing '{export}' failed"), err))
    }

    /// Registered exports in manifest order, without duplicates.
    fn implementers(&self, manifest: &AddonManifest) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for export in &manifest.exports {
            if self.registry.contains(export) && !found.contains(export) {
                found.push(export.clone());
            }
        }
        found
    }
}
