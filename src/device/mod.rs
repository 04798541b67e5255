//! Device Classifier (spec component B)
//!
//! Parses the system input inventory, merges sibling event nodes that
//! share (vendor, product), and classifies each as keyboard / mouse /
//! gamepad / joystick / other. Devices are immutable once built; this
//! module does no I/O beyond the inventory read and opening device
//! nodes to resolve their `/dev/input/eventN` path.

pub mod classify;
pub mod inventory;

pub use classify::{Device, DeviceKind};

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use crate::constants::paths;

/// Enumerate, merge and classify every device in the system inventory.
pub fn enumerate() -> Result<Vec<Device>> {
    let blocks = inventory::read_system_inventory(paths::PROC_BUS_INPUT_DEVICES)
        .context("failed to enumerate input devices")?;
    let devices = classify::merge_and_classify(blocks);

    for device in &devices {
        info!(
            name = %device.name,
            vendor = device.vendor,
            product = device.product,
            kind = %device.classification.kind,
            confidence = device.classification.confidence,
            reason = %device.classification.reason,
            "classified input device"
        );
    }

    Ok(devices)
}

/// Resolve a classified device's event node to an openable path under `/dev/input`.
pub fn event_node_path(device: &Device) -> Option<PathBuf> {
    device
        .event_node
        .as_ref()
        .map(|node| PathBuf::from(paths::DEV_INPUT).join(node))
}

/// Devices worth opening for a given kind (confidence-ordered, highest first).
pub fn paths_for_kind(devices: &[Device], kind: DeviceKind) -> Vec<PathBuf> {
    let mut matching: Vec<&Device> = devices
        .iter()
        .filter(|d| d.classification.kind == kind)
        .collect();
    matching.sort_by(|a, b| {
        b.classification
            .confidence
            .partial_cmp(&a.classification.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    matching.into_iter().filter_map(event_node_path).collect()
}
