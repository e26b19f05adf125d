//! Error types for the ProxyDHCP decision path

use std::io;

use dhcp4::MessageType;
use thiserror::Error;

/// Reasons a received packet goes unanswered.
///
/// None of these are fatal; the dispatch loop logs them and moves on to the
/// next packet.
#[derive(Debug, Error)]
pub enum ProxyDhcpError {
    #[error("packet is {0}, not DHCPDISCOVER")]
    NotDiscover(MessageType),

    #[error("not a PXE boot request (missing option 93)")]
    NotPxeRequest,

    #[error("failed to list interface addresses: {0}")]
    ListAddresses(#[from] io::Error),

    #[error("no usable unicast address configured on interface")]
    NoUsableAddress,

    #[error("unknown vendor class identifier: {0}")]
    UnsupportedVendorClass(String),
}
