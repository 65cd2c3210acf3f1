mod protocol;
mod session;
mod transport;

pub use session::SessionConfig;
pub use transport::CentrifugoTransport;
