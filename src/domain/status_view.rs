use crate::domain::device_status::DeviceStatus;
use std::collections::HashMap;

/// What the reconciler exposes to its consumers: the merged snapshot and the connection health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusView {
    pub connected: bool,
    pub devices: HashMap<String, DeviceStatus>,
}

impl StatusView {
    pub fn device(&self, phone_id: &str) -> Option<&DeviceStatus> {
        self.devices.get(phone_id)
    }
}
