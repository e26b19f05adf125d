//! Test client that impersonates HTTP-boot firmware
//!
//! Broadcasts a PXE discovery twice and prints the offers, which should
//! carry the first-stage URL on the first round and the second-stage URL
//! on the second. Pass an interface name to bind the socket to it.

use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use dhcp4::packet::Packet;
use dhcp4::{DhcpOption, MessageType};
use nix::net::if_::if_nametoindex;
use socket2::{Domain, Protocol, Socket, Type};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    if let Some(name) = std::env::args().nth(1)
        && let Ok(index) = if_nametoindex(name.as_str())
    {
        println!("Binding to interface {} (index {})", name, index);
        socket.bind_device_by_index_v4(NonZeroU32::new(index))?;
    }
    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_read_timeout(Some(Duration::from_secs(5)))?;

    let address: SocketAddr = "0.0.0.0:68".parse()?;
    socket.bind(&address.into())?;

    let server_addr: SocketAddr = "255.255.255.255:67".parse()?;

    for round in 1u32..=2 {
        let packet = build_discovery(0x1000_0000 + round);
        let packet_data = packet.to_bytes();

        println!("\n--- Discovery {} (xid 0x{:08x}) ---", round, packet.xid);
        socket.send_to(&packet_data, &server_addr.into())?;

        let mut buffer = [MaybeUninit::uninit(); 1500];
        match socket.recv_from(&mut buffer) {
            Ok((len, addr)) => {
                println!("Received {} bytes from {:?}", len, addr);

                let bytes = unsafe { assume_init_ref(&buffer[..len]) };
                match Packet::from_bytes(bytes) {
                    Ok(offer) => {
                        println!("  Message type: {}", offer.msg_type);
                        if offer.xid != packet.xid {
                            println!("  XID mismatch, response is for another client");
                        }
                        if let Some(url) = offer.option(DhcpOption::BootfileName as u8) {
                            println!("  Boot file: {}", String::from_utf8_lossy(url));
                        }
                        if let Some(vendor) = offer.option(DhcpOption::VendorClassIdentifier as u8) {
                            println!("  Vendor class: {}", String::from_utf8_lossy(vendor));
                        }
                    }
                    Err(e) => println!("  Not a DHCP packet: {}", e),
                }
            }
            Err(e) => println!("No offer received: {}", e),
        }
    }

    Ok(())
}

/// A discovery the server recognizes as an HTTP boot request
fn build_discovery(xid: u32) -> Packet {
    let mut packet = Packet::new(MessageType::Discover);
    packet.xid = xid;
    packet.broadcast = true;
    packet.set_mac_address([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);

    // x64 UEFI HTTP boot, RFC 4578 architecture type 16
    packet.set_option(DhcpOption::ClientSystemArchitecture as u8, &[0x00, 0x10]);
    packet.set_string_option(
        DhcpOption::VendorClassIdentifier as u8,
        "HTTPClient:Arch:00016:UNDI:003001",
    );

    // Fixed machine identifier so both rounds hit the same tracker entry
    let mut guid = [0u8; 17];
    guid[1..].copy_from_slice(b"0123456789abcdef");
    packet.set_option(DhcpOption::ClientMachineIdentifier as u8, &guid);

    packet
}

const unsafe fn assume_init_ref<T>(slice: &[MaybeUninit<T>]) -> &[T] {
    // SAFETY: casting `slice` to a `*const [T]` is safe since the caller guarantees that
    // `slice` is initialized, and `MaybeUninit` is guaranteed to have the same layout as `T`.
    // The pointer obtained is valid since it refers to memory owned by `slice` which is a
    // reference and thus guaranteed to be valid for reads.
    unsafe { &*(slice as *const [MaybeUninit<T>] as *const [T]) }
}
