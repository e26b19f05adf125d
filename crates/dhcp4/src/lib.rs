//! DHCPv4 wire model
//!
//! Packet parsing and encoding per RFC 2131/2132, plus the raw port-67
//! transport a ProxyDHCP responder needs to snoop discovery broadcasts
//! alongside the network's real DHCP server.

pub mod conn;
pub mod packet;

use std::fmt;

pub use conn::{DHCP_CLIENT_PORT, DHCP_SERVER_PORT, Interface, SnooperConn};
pub use packet::Packet;

/// DHCP message types as defined in RFC 2131
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Discover),
            2 => Ok(MessageType::Offer),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Decline),
            5 => Ok(MessageType::Ack),
            6 => Ok(MessageType::Nak),
            7 => Ok(MessageType::Release),
            8 => Ok(MessageType::Inform),
            _ => Err(anyhow::anyhow!("Unknown DHCP message type: {}", value)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Discover => "DHCPDISCOVER",
            MessageType::Offer => "DHCPOFFER",
            MessageType::Request => "DHCPREQUEST",
            MessageType::Decline => "DHCPDECLINE",
            MessageType::Ack => "DHCPACK",
            MessageType::Nak => "DHCPNAK",
            MessageType::Release => "DHCPRELEASE",
            MessageType::Inform => "DHCPINFORM",
        };
        f.write_str(name)
    }
}

/// DHCP options this service consumes or produces, RFC 2132 and RFC 4578
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpOption {
    MessageType = 53,
    ServerIdentifier = 54,
    VendorClassIdentifier = 60,
    BootfileName = 67,

    // PXE client options, RFC 4578
    ClientSystemArchitecture = 93,
    ClientMachineIdentifier = 97,

    End = 255,
}

/// Hardware address types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareType {
    Ethernet = 1,
}

/// DHCP packet operation codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    BootRequest = 1,
    BootReply = 2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_conversion() {
        assert_eq!(MessageType::try_from(1).unwrap(), MessageType::Discover);
        assert_eq!(MessageType::try_from(2).unwrap(), MessageType::Offer);
        assert_eq!(MessageType::try_from(3).unwrap(), MessageType::Request);
        assert_eq!(MessageType::try_from(5).unwrap(), MessageType::Ack);
        assert_eq!(MessageType::try_from(6).unwrap(), MessageType::Nak);

        assert!(MessageType::try_from(0).is_err());
        assert!(MessageType::try_from(99).is_err());
    }

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::Discover.to_string(), "DHCPDISCOVER");
        assert_eq!(MessageType::Offer.to_string(), "DHCPOFFER");
    }
}
