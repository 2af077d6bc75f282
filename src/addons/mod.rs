//! Add-on contract, discovery and loading.

pub mod builtin;
pub mod contract;
pub mod discovery;
pub mod loader;

pub use contract::{Addon, AddonContext, AddonError};
pub use discovery::{DEFAULT_ADDONS_DIR, discover_addons};
pub use loader::{
    AddonDescriptor, AddonFactory, AddonLoader, AddonManifest, AddonRegistry, LoadError, LoadResult,
    manifest_path,
};
