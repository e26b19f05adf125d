//! DHCP packet handling
//!
//! Parsing and encoding of DHCPv4 packets according to RFC 2131 and
//! RFC 2132. The message type lives in option 53 on the wire but is a typed
//! field here; it is split out during parsing and merged back on encode.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::{DhcpOption, HardwareType, MessageType, OpCode};

const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// DHCP packet structure as defined in RFC 2131
#[derive(Debug, Clone)]
pub struct Packet {
    pub msg_type: MessageType,
    pub htype: HardwareType,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub broadcast: bool,  // bit 15 of the flags field
    pub ciaddr: Ipv4Addr, // client IP address from client
    pub yiaddr: Ipv4Addr, // client IP address from server
    pub siaddr: Ipv4Addr, // server IP address
    pub giaddr: Ipv4Addr, // relay agent IP address
    pub chaddr: [u8; 16], // client hardware address
    pub sname: [u8; 64],  // server host name
    pub file: [u8; 128],  // boot file name
    /// Options other than the message type, keyed by option code.
    /// A code appears at most once; on the wire the first occurrence wins.
    pub options: BTreeMap<u8, Vec<u8>>,
}

impl Packet {
    /// Create an empty packet of the given message type
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            htype: HardwareType::Ethernet,
            hlen: 6,
            hops: 0,
            xid: 0,
            secs: 0,
            broadcast: false,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; 16],
            sname: [0; 64],
            file: [0; 128],
            options: BTreeMap::new(),
        }
    }

    /// Parse a DHCP packet from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, anyhow::Error> {
        if data.len() < 236 {
            return Err(anyhow::anyhow!("DHCP packet too short"));
        }

        match data[0] {
            1 | 2 => {}
            _ => return Err(anyhow::anyhow!("Invalid op code: {}", data[0])),
        }

        let htype = match data[1] {
            1 => HardwareType::Ethernet,
            _ => return Err(anyhow::anyhow!("Unsupported hardware type: {}", data[1])),
        };

        let hlen = data[2];
        let hops = data[3];
        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::from([data[12], data[13], data[14], data[15]]);
        let yiaddr = Ipv4Addr::from([data[16], data[17], data[18], data[19]]);
        let siaddr = Ipv4Addr::from([data[20], data[21], data[22], data[23]]);
        let giaddr = Ipv4Addr::from([data[24], data[25], data[26], data[27]]);

        let mut chaddr = [0; 16];
        chaddr.copy_from_slice(&data[28..44]);

        let mut sname = [0; 64];
        sname.copy_from_slice(&data[44..108]);

        let mut file = [0; 128];
        file.copy_from_slice(&data[108..236]);

        if data.len() < 240 || data[236..240] != MAGIC_COOKIE {
            return Err(anyhow::anyhow!("DHCP packet missing magic cookie"));
        }

        let mut options = BTreeMap::new();
        let mut i = 240;
        while i < data.len() {
            let code = data[i];
            if code == 255 {
                // End option
                break;
            }
            if code == 0 {
                // Pad option
                i += 1;
                continue;
            }

            if i + 1 >= data.len() {
                return Err(anyhow::anyhow!("Truncated DHCP option {}", code));
            }
            let length = data[i + 1] as usize;
            if i + 2 + length > data.len() {
                return Err(anyhow::anyhow!("Truncated DHCP option {}", code));
            }

            options.entry(code).or_insert_with(|| data[i + 2..i + 2 + length].to_vec());
            i += 2 + length;
        }

        let msg_type = match options.remove(&(DhcpOption::MessageType as u8)) {
            Some(value) if !value.is_empty() => MessageType::try_from(value[0])?,
            _ => return Err(anyhow::anyhow!("Packet has no DHCP message type")),
        };

        Ok(Packet {
            msg_type,
            htype,
            hlen,
            hops,
            xid,
            secs,
            broadcast: flags & 0x8000 != 0,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Convert the packet to bytes
    ///
    /// The message type option leads the option section; the remaining
    /// options follow in ascending code order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(300);

        packet.push(self.op() as u8);
        packet.push(self.htype as u8);
        packet.push(self.hlen);
        packet.push(self.hops);
        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        let flags: u16 = if self.broadcast { 0x8000 } else { 0 };
        packet.extend_from_slice(&flags.to_be_bytes());
        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());
        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&MAGIC_COOKIE);

        packet.push(DhcpOption::MessageType as u8);
        packet.push(1);
        packet.push(self.msg_type as u8);

        for (code, value) in &self.options {
            packet.push(*code);
            packet.push(value.len() as u8);
            packet.extend_from_slice(value);
        }

        packet.push(DhcpOption::End as u8);

        // Pad to the BOOTP minimum
        while packet.len() < 300 {
            packet.push(0);
        }

        packet
    }

    fn op(&self) -> OpCode {
        match self.msg_type {
            MessageType::Discover
            | MessageType::Request
            | MessageType::Decline
            | MessageType::Release
            | MessageType::Inform => OpCode::BootRequest,
            MessageType::Offer | MessageType::Ack | MessageType::Nak => OpCode::BootReply,
        }
    }

    /// Get the raw value of an option, if present
    pub fn option(&self, code: u8) -> Option<&[u8]> {
        self.options.get(&code).map(Vec::as_slice)
    }

    /// Set an option, replacing any previous value
    pub fn set_option(&mut self, code: u8, value: &[u8]) {
        self.options.insert(code, value.to_vec());
    }

    /// Set an IP address option
    pub fn set_ip_option(&mut self, code: u8, ip: Ipv4Addr) {
        self.set_option(code, &ip.octets());
    }

    /// Set a string option
    pub fn set_string_option(&mut self, code: u8, value: &str) {
        self.set_option(code, value.as_bytes());
    }

    /// Get the client's MAC address
    pub fn mac_address(&self) -> [u8; 6] {
        let mut mac = [0; 6];
        mac.copy_from_slice(&self.chaddr[..6]);
        mac
    }

    /// Set the client's MAC address
    pub fn set_mac_address(&mut self, mac: [u8; 6]) {
        self.chaddr[..6].copy_from_slice(&mac);
    }

    /// The client's MAC address in colon-separated hex, for log lines
    pub fn mac_string(&self) -> String {
        let mac = self.mac_address();
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_creation() {
        let packet = Packet::new(MessageType::Discover);
        assert_eq!(packet.msg_type, MessageType::Discover);
        assert_eq!(packet.htype, HardwareType::Ethernet);
        assert_eq!(packet.hlen, 6);
        assert!(!packet.broadcast);
        assert!(packet.options.is_empty());
    }

    #[test]
    fn test_mac_address() {
        let mut packet = Packet::new(MessageType::Discover);
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        packet.set_mac_address(mac);
        assert_eq!(packet.mac_address(), mac);
        assert_eq!(packet.mac_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_options() {
        let mut packet = Packet::new(MessageType::Offer);

        let ip = Ipv4Addr::new(192, 168, 1, 1);
        packet.set_ip_option(DhcpOption::ServerIdentifier as u8, ip);
        packet.set_string_option(DhcpOption::VendorClassIdentifier as u8, "HTTPClient");

        assert_eq!(packet.option(DhcpOption::ServerIdentifier as u8).unwrap(), &[192, 168, 1, 1]);
        assert_eq!(packet.option(DhcpOption::VendorClassIdentifier as u8).unwrap(), b"HTTPClient");
        assert_eq!(packet.option(DhcpOption::BootfileName as u8), None);

        // Setting again replaces
        packet.set_string_option(DhcpOption::VendorClassIdentifier as u8, "PXEClient");
        assert_eq!(packet.option(DhcpOption::VendorClassIdentifier as u8).unwrap(), b"PXEClient");
    }

    #[test]
    fn test_packet_serialization() {
        let mut packet = Packet::new(MessageType::Offer);
        packet.xid = 0x12345678;
        packet.secs = 4;
        packet.broadcast = true;
        packet.siaddr = Ipv4Addr::new(192, 168, 1, 10);
        packet.giaddr = Ipv4Addr::new(10, 0, 0, 1);
        packet.set_mac_address([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        packet.set_ip_option(DhcpOption::ServerIdentifier as u8, Ipv4Addr::new(192, 168, 1, 10));
        packet.set_string_option(DhcpOption::BootfileName as u8, "http://192.168.1.10/booter.efi");

        let bytes = packet.to_bytes();
        assert!(bytes.len() >= 300); // Minimum packet size
        assert_eq!(bytes[0], OpCode::BootReply as u8);
        assert_eq!(bytes[10] & 0x80, 0x80); // broadcast bit
        assert_eq!(bytes[236..240], MAGIC_COOKIE);

        let parsed = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.msg_type, MessageType::Offer);
        assert_eq!(parsed.xid, 0x12345678);
        assert_eq!(parsed.secs, 4);
        assert!(parsed.broadcast);
        assert_eq!(parsed.siaddr, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(parsed.giaddr, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(parsed.mac_address(), packet.mac_address());
        assert_eq!(
            parsed.option(DhcpOption::BootfileName as u8).unwrap(),
            b"http://192.168.1.10/booter.efi"
        );

        // Option 53 lives in msg_type, not in the map
        assert_eq!(parsed.option(DhcpOption::MessageType as u8), None);
    }

    #[test]
    fn test_non_broadcast_flags_are_zero() {
        let packet = Packet::new(MessageType::Discover);
        let bytes = packet.to_bytes();
        assert_eq!(bytes[10], 0);
        assert_eq!(bytes[11], 0);

        let parsed = Packet::from_bytes(&bytes).unwrap();
        assert!(!parsed.broadcast);
    }

    #[test]
    fn test_packet_validation() {
        // Too short
        let short_packet = vec![0u8; 100];
        assert!(Packet::from_bytes(&short_packet).is_err());

        // Invalid op code
        let mut invalid_packet = base_packet_bytes();
        invalid_packet[0] = 99;
        assert!(Packet::from_bytes(&invalid_packet).is_err());

        // Unsupported hardware type
        let mut invalid_packet = base_packet_bytes();
        invalid_packet[1] = 99;
        assert!(Packet::from_bytes(&invalid_packet).is_err());

        // Missing magic cookie
        let mut invalid_packet = base_packet_bytes();
        invalid_packet[236] = 0;
        assert!(Packet::from_bytes(&invalid_packet).is_err());

        // Cookie but no message type option
        let mut invalid_packet = base_packet_bytes();
        invalid_packet[240] = 255;
        assert!(Packet::from_bytes(&invalid_packet).is_err());

        // Unknown message type value
        let mut invalid_packet = base_packet_bytes();
        invalid_packet[242] = 99;
        assert!(Packet::from_bytes(&invalid_packet).is_err());

        // Intact packet parses
        assert!(Packet::from_bytes(&base_packet_bytes()).is_ok());
    }

    #[test]
    fn test_truncated_option_rejected() {
        let mut bytes = base_packet_bytes();
        // Option 60 claiming 200 bytes of data that are not there
        bytes.extend_from_slice(&[60, 200, b'H', b'T', b'T', b'P']);
        assert!(Packet::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_first_occurrence_of_duplicate_option_wins() {
        let mut bytes = base_packet_bytes();
        bytes.extend_from_slice(&[60, 4, b'H', b'T', b'T', b'P']);
        bytes.extend_from_slice(&[60, 3, b'P', b'X', b'E']);
        bytes.push(255);

        let parsed = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.option(60).unwrap(), b"HTTP");
    }

    #[test]
    fn test_pad_options_are_skipped() {
        let mut bytes = base_packet_bytes();
        bytes.extend_from_slice(&[0, 0, 0, 60, 4, b'H', b'T', b'T', b'P', 0, 255]);

        let parsed = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.option(60).unwrap(), b"HTTP");
    }

    #[test]
    fn test_options_after_end_are_ignored() {
        let mut bytes = base_packet_bytes();
        bytes.extend_from_slice(&[255, 60, 4, b'H', b'T', b'T', b'P']);

        let parsed = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.option(60), None);
    }

    /// 240 header bytes plus a discover message type option, no end marker
    fn base_packet_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; 240];
        bytes[0] = 1; // BOOTREQUEST
        bytes[1] = 1; // Ethernet
        bytes[2] = 6;
        bytes[236..240].copy_from_slice(&MAGIC_COOKIE);
        bytes.extend_from_slice(&[53, 1, MessageType::Discover as u8]);
        bytes
    }
}
