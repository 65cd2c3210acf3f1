mod client;
mod directory;

pub use client::{DashboardError, new_client};
pub use directory::{DashboardApi, PhoneDirectory};
