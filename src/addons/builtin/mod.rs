//! Add-ons compiled into the binary.

pub mod snapshot;

pub use snapshot::SnapshotAddon;

use super::loader::AddonRegistry;

/// Registers every built-in add-on under its exported name.
pub fn register_all(registry: &mut AddonRegistry) {
    registry.register_default::<SnapshotAddon>("snapshot");
}
