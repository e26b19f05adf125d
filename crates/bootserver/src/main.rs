//! ProxyDHCP boot server
//!
//! Answers PXE boot discoveries alongside the network's existing DHCP
//! server, pointing HTTP-boot firmware at a two-stage EFI chainload.
//! Binds port 67, so it runs as root or with CAP_NET_BIND_SERVICE.

use anyhow::Result;
use proxy_dhcp::{ProxyConfig, ProxyDhcpServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut server = ProxyDhcpServer::new(ProxyConfig::default());
    server.run().await
}
