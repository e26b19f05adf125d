//! ProxyDHCP server
//!
//! The receive loop and offer construction. The server answers PXE boot
//! discoveries from HTTP-boot capable firmware with offers carrying a
//! boot-file URL, serving the first-stage loader to new clients and the
//! second-stage payload to clients that already fetched the loader.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use dhcp4::packet::Packet;
use dhcp4::{DhcpOption, Interface, MessageType, SnooperConn};
use tracing::{debug, error, info};

use crate::addr::interface_ip;
use crate::error::ProxyDhcpError;
use crate::tracker::ChainloadTracker;

/// Vendor class token sent by UEFI firmware that can fetch boot images
/// over HTTP. Anything else is not answered.
const HTTP_CLIENT_VENDOR: &str = "HTTPClient";

/// Configuration for the offer contents
pub struct ProxyConfig {
    /// Boot file served to clients seen for the first time
    pub first_stage_bootfile: String,
    /// Boot file served once the first stage has been delivered
    pub second_stage_bootfile: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            first_stage_bootfile: "booter.efi".to_string(),
            second_stage_bootfile: "kairos.efi".to_string(),
        }
    }
}

/// Check that a packet is a PXE boot discovery worth answering.
///
/// Only the message type and the client system architecture option are
/// inspected here; the vendor class is negotiated during offer
/// construction.
pub fn validate_boot_request(request: &Packet) -> Result<(), ProxyDhcpError> {
    if request.msg_type != MessageType::Discover {
        return Err(ProxyDhcpError::NotDiscover(request.msg_type));
    }

    // Client System Architecture Type, RFC 4578
    if request.option(DhcpOption::ClientSystemArchitecture as u8).is_none() {
        return Err(ProxyDhcpError::NotPxeRequest);
    }

    Ok(())
}

/// ProxyDHCP server answering boot discoveries on port 67
pub struct ProxyDhcpServer {
    config: ProxyConfig,
    tracker: ChainloadTracker,
}

impl ProxyDhcpServer {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config,
            tracker: ChainloadTracker::new(),
        }
    }

    /// Listen for boot discoveries and answer them until the process exits.
    ///
    /// Only the initial port-67 bind can fail. Every per-packet problem is
    /// logged and dropped; the client's own DHCP retry behavior is the
    /// recovery mechanism.
    pub async fn run(&mut self) -> Result<()> {
        let conn = SnooperConn::open().await.context("Failed to create DHCP connection")?;
        info!("Listening for DHCP packets");

        loop {
            match conn.recv().await {
                Ok((request, intf)) => self.handle_packet(&conn, &request, &intf).await,
                Err(e) => error!("Error receiving DHCP packet: {}", e),
            }
        }
    }

    async fn handle_packet(&mut self, conn: &SnooperConn, request: &Packet, intf: &Interface) {
        debug!("Received packet from {} on {}", request.mac_string(), intf);

        if let Err(reason) = validate_boot_request(request) {
            debug!("Ignoring packet from {} ({}): {}", request.mac_string(), intf, reason);
            return;
        }
        info!("Booting {} on {}", request.mac_string(), intf);

        let guid = request.option(DhcpOption::ClientMachineIdentifier as u8).unwrap_or_default();
        info!("Client GUID: {}", hex(guid));

        let server_ip = match interface_ip(intf) {
            Ok(ip) => ip,
            Err(e) => {
                info!(
                    "Want to boot {} on {}, but couldn't get a source address: {}",
                    request.mac_string(),
                    intf,
                    e
                );
                return;
            }
        };

        let offer = match self.create_offer(request, server_ip) {
            Ok(offer) => offer,
            Err(e) => {
                info!("Failed to construct ProxyDHCP offer for {}: {}", request.mac_string(), e);
                return;
            }
        };

        if let Err(e) = conn.send(&offer, intf).await {
            info!("Failed to send ProxyDHCP offer for {}: {}", request.mac_string(), e);
        }
    }

    /// Build the offer for a request and advance the client's chainload
    /// stage.
    ///
    /// The tracker is updated before the offer is handed to the caller, so
    /// the stage moves on even when the send later fails; a failed build
    /// leaves the tracker untouched.
    pub fn create_offer(&mut self, request: &Packet, server_ip: Ipv4Addr) -> Result<Packet, ProxyDhcpError> {
        let guid = request.option(DhcpOption::ClientMachineIdentifier as u8).unwrap_or_default();

        let served_before = self.tracker.has_been_served(guid);
        let offer = self.build_offer(request, server_ip, served_before)?;

        if served_before {
            info!(
                "Client {} was already served the first efi, serving the second one",
                request.mac_string()
            );
        } else {
            info!(
                "Client {} was not served the first efi, serving the first one",
                request.mac_string()
            );
            self.tracker.mark_served(guid);
        }

        Ok(offer)
    }

    /// Construct a ProxyDHCP offer pointing the client at the HTTP boot
    /// file for the given stage.
    pub fn build_offer(
        &self,
        request: &Packet,
        server_ip: Ipv4Addr,
        served_before: bool,
    ) -> Result<Packet, ProxyDhcpError> {
        let vendor_class = request
            .option(DhcpOption::VendorClassIdentifier as u8)
            .map(|value| String::from_utf8_lossy(value).into_owned())
            .unwrap_or_default();
        debug!("Vendor class identifier: {}", vendor_class);

        if !vendor_class.contains(HTTP_CLIENT_VENDOR) {
            return Err(ProxyDhcpError::UnsupportedVendorClass(vendor_class));
        }
        debug!("Handling HTTP client");

        let mut offer = Packet::new(MessageType::Offer);
        offer.xid = request.xid;
        offer.htype = request.htype;
        offer.hlen = request.hlen;
        offer.chaddr = request.chaddr;
        offer.giaddr = request.giaddr;
        offer.broadcast = true;
        offer.siaddr = server_ip;

        offer.set_ip_option(DhcpOption::ServerIdentifier as u8, server_ip);
        offer.set_string_option(DhcpOption::VendorClassIdentifier as u8, HTTP_CLIENT_VENDOR);

        let bootfile = if served_before {
            &self.config.second_stage_bootfile
        } else {
            &self.config.first_stage_bootfile
        };
        offer.set_string_option(
            DhcpOption::BootfileName as u8,
            &format!("http://{}/{}", server_ip, bootfile),
        );

        Ok(offer)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
