//! Raw DHCP transport
//!
//! ProxyDHCP replies have to leave through the interface the discovery
//! arrived on, and the arrival interface decides which source address the
//! offer advertises. The socket therefore runs with `IP_PKTINFO` enabled
//! and every received datagram is paired with its interface.

use std::io::{self, IoSlice, IoSliceMut};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::os::fd::AsRawFd;

use anyhow::{Context, Result};
use nix::libc;
use nix::net::if_::if_nameindex;
use nix::sys::socket::sockopt::Ipv4PacketInfo;
use nix::sys::socket::{
    ControlMessage, ControlMessageOwned, MsgFlags, SockaddrIn, recvmsg, sendmsg, setsockopt,
};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::unix::AsyncFd;

use crate::packet::Packet;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Network interface a packet arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub index: u32,
    pub name: String,
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// UDP socket on the DHCP server port that snoops broadcast traffic
/// alongside any regular DHCP server on the same host.
///
/// The socket is closed when the connection is dropped.
pub struct SnooperConn {
    socket: AsyncFd<StdUdpSocket>,
}

impl SnooperConn {
    /// Create and configure the socket for port 67.
    ///
    /// Reuse flags let the snooper coexist with a DHCP server bound to the
    /// same port. Fails when port 67 cannot be bound, which usually means
    /// missing privileges.
    pub async fn open() -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .context("Failed to create socket for port 67")?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        socket.set_reuse_port(true)?;
        setsockopt(&socket, Ipv4PacketInfo, &true).context("Failed to enable IP_PKTINFO")?;

        let bind_addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DHCP_SERVER_PORT);
        socket
            .bind(&bind_addr.into())
            .context("Failed to bind to port 67 - ProxyDHCP requires port 67 access")?;

        let std_socket: StdUdpSocket = socket.into();
        Ok(Self {
            socket: AsyncFd::new(std_socket)?,
        })
    }

    /// Receive one DHCP packet together with the interface it arrived on
    pub async fn recv(&self) -> Result<(Packet, Interface)> {
        let mut buf = [0u8; 1500];

        let (len, ifindex) = loop {
            let mut guard = self.socket.readable().await?;
            match guard.try_io(|inner| recv_with_pktinfo(inner.get_ref(), &mut buf)) {
                Ok(result) => break result?,
                Err(_would_block) => continue,
            }
        };

        let packet = Packet::from_bytes(&buf[..len])?;
        let interface = interface_by_index(ifindex)?;
        Ok((packet, interface))
    }

    /// Send a DHCP reply out the given interface
    pub async fn send(&self, packet: &Packet, intf: &Interface) -> Result<()> {
        let payload = packet.to_bytes();
        let (dest, ifindex) = send_destination(packet, intf);

        loop {
            let mut guard = self.socket.writable().await?;
            match guard.try_io(|inner| send_with_pktinfo(inner.get_ref(), &payload, dest, ifindex)) {
                Ok(result) => {
                    result.with_context(|| format!("Failed to send to {}", dest))?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }
}

/// Pick the destination for a reply, and the interface index to pin the
/// datagram to when the kernel cannot route it itself.
fn send_destination(packet: &Packet, intf: &Interface) -> (SocketAddrV4, Option<u32>) {
    if !packet.giaddr.is_unspecified() {
        // Relayed request; the relay agent forwards to the client.
        (SocketAddrV4::new(packet.giaddr, DHCP_SERVER_PORT), None)
    } else if packet.broadcast || packet.ciaddr.is_unspecified() {
        // 255.255.255.255 has no route, so the egress interface must be
        // chosen explicitly.
        (SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT), Some(intf.index))
    } else {
        (SocketAddrV4::new(packet.ciaddr, DHCP_CLIENT_PORT), None)
    }
}

fn recv_with_pktinfo(socket: &StdUdpSocket, buf: &mut [u8]) -> io::Result<(usize, u32)> {
    let mut iov = [IoSliceMut::new(buf)];
    let mut cmsg_buf = nix::cmsg_space!(libc::in_pktinfo);

    let msg = recvmsg::<SockaddrIn>(socket.as_raw_fd(), &mut iov, Some(&mut cmsg_buf), MsgFlags::empty())
        .map_err(io::Error::from)?;

    let mut ifindex = None;
    for cmsg in msg.cmsgs().map_err(io::Error::from)? {
        if let ControlMessageOwned::Ipv4PacketInfo(info) = cmsg {
            ifindex = Some(info.ipi_ifindex as u32);
        }
    }

    match ifindex {
        Some(index) => Ok((msg.bytes, index)),
        None => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "datagram carried no IP_PKTINFO",
        )),
    }
}

fn send_with_pktinfo(
    socket: &StdUdpSocket,
    payload: &[u8],
    dest: SocketAddrV4,
    ifindex: Option<u32>,
) -> io::Result<usize> {
    let iov = [IoSlice::new(payload)];
    let addr = SockaddrIn::from(dest);

    let sent = if let Some(index) = ifindex {
        let info = libc::in_pktinfo {
            ipi_ifindex: index as libc::c_int,
            ipi_spec_dst: libc::in_addr { s_addr: 0 },
            ipi_addr: libc::in_addr { s_addr: 0 },
        };
        let cmsgs = [ControlMessage::Ipv4PacketInfo(&info)];
        sendmsg(socket.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), Some(&addr))
    } else {
        sendmsg(socket.as_raw_fd(), &iov, &[], MsgFlags::empty(), Some(&addr))
    };

    sent.map_err(io::Error::from)
}

fn interface_by_index(index: u32) -> Result<Interface> {
    let interfaces = if_nameindex().context("Failed to list network interfaces")?;
    for ifa in interfaces.iter() {
        if ifa.index() == index {
            return Ok(Interface {
                index,
                name: ifa.name().to_string_lossy().into_owned(),
            });
        }
    }
    Err(anyhow::anyhow!("No interface with index {}", index))
}
