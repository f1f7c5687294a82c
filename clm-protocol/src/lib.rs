pub mod client;
pub mod direct;
pub mod error;
pub mod proxied;
pub mod sidecar;
pub mod wire;

pub use client::WorkerClient;
pub use direct::DirectClient;
pub use error::{ProtocolError, ProtocolResult};
pub use proxied::ProxiedClient;
pub use wire::WireJob;

#[cfg(test)]
test_r::enable!();
