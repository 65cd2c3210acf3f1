mod handle;
mod rate_limit;
mod reconciler;
mod subscription_set;

pub use handle::{ReconcilerHandle, ReconcilerStopped, spawn};
pub use reconciler::{Credentials, Reconciler, ReconcilerConfig};
