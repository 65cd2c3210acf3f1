mod device_status;
mod phone_listing;
mod status_summary;
mod status_view;

pub use device_status::{DeviceStatus, StatusPayloadError, StatusUpdate};
pub use phone_listing::PhoneListing;
pub use status_summary::StatusSummary;
pub use status_view::StatusView;
