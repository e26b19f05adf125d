//! ProxyDHCP boot assistance
//!
//! Answers PXE boot discoveries with offers that point the client at boot
//! executables served over HTTP, without taking over address assignment
//! from the network's real DHCP server. Each client gets the first-stage
//! loader once and the second-stage payload on every request after that.

pub mod addr;
pub mod error;
pub mod server;
pub mod tracker;

pub use error::ProxyDhcpError;
pub use server::{ProxyConfig, ProxyDhcpServer, validate_boot_request};
pub use tracker::ChainloadTracker;
