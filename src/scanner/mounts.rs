//! Mounted volume enumeration via the GIO volume monitor.

use std::path::PathBuf;

use gio::prelude::*;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub mount_path: PathBuf,
    pub label: String,
}

/// Lists mounts with a local path. Must be called on the thread owning the
/// default main context.
pub fn list_mounts() -> Vec<MountInfo> {
    let monitor = gio::VolumeMonitor::get();
    let mounts: Vec<MountInfo> = monitor
        .mounts()
        .into_iter()
        .filter_map(|mount| {
            let mount_path = mount.default_location().path()?;
            Some(MountInfo {
                mount_path,
                label: mount.name().to_string(),
            })
        })
        .collect();

    debug!(count = mounts.len(), "Enumerated mounts");
    mounts
}

/// Mount labels for display, e.g. `"usb, sd card"`.
pub fn describe_mounts(mounts: &[MountInfo]) -> String {
    mounts
        .iter()
        .map(|m| m.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
