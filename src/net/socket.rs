/// BSD-socket-like layer on top of `smoltcp`'s UDP/TCP/ICMP sockets (spec 4.8).
use super::iface::{self, with_socket_set};
use crate::lib::error::{Errno, Result};
use alloc::vec;
use core::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use heapless::FnvIndexMap;
use smoltcp::socket::{icmp, tcp, udp};
use smoltcp::wire::{IpAddress, IpEndpoint};
use spin::Mutex;

pub type SocketHandle = smoltcp::iface::SocketHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Stream,
    Dgram,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Unbound,
    Bound,
    Listening,
    Connecting,
    Connected,
    Closing,
    Closed,
}

pub struct Socket {
    pub domain: AddressFamily,
    pub sock_type: SocketType,
    pub protocol: Protocol,
    pub state: SocketState,
    pub handle: SocketHandle,
}

const MAX_SOCKETS: usize = 64;
static SOCKETS: Mutex<FnvIndexMap<u32, Socket, MAX_SOCKETS>> = Mutex::new(FnvIndexMap::new());
static NEXT_FD: AtomicU32 = AtomicU32::new(1);
static NEXT_EPHEMERAL_PORT: AtomicU16 = AtomicU16::new(49152);

fn ephemeral_port() -> u16 {
    NEXT_EPHEMERAL_PORT
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |p| Some(if p >= 65000 { 49152 } else { p + 1 }))
        .unwrap_or(49152)
}

const UDP_RX_META: usize = 16;
const UDP_BUF_BYTES: usize = 2048;
const SOCKET_RETRIES: usize = 8;

pub fn udp_create() -> Result<u32> {
    let rx_meta = vec![udp::PacketMetadata::EMPTY; UDP_RX_META];
    let rx_buf = vec![0u8; UDP_BUF_BYTES];
    let tx_meta = vec![udp::PacketMetadata::EMPTY; UDP_RX_META];
    let tx_buf = vec![0u8; UDP_BUF_BYTES];
    let socket = udp::Socket::new(udp::PacketBuffer::new(rx_meta, rx_buf), udp::PacketBuffer::new(tx_meta, tx_buf));
    let handle = with_socket_set(|sockets| sockets.add(socket))?;

    let fd = NEXT_FD.fetch_add(1, Ordering::Relaxed);
    SOCKETS
        .lock()
        .insert(fd, Socket { domain: AddressFamily::Inet, sock_type: SocketType::Dgram, protocol: Protocol::Udp, state: SocketState::Unbound, handle })
        .map_err(|_| Errno::ENOMEM)?;
    Ok(fd)
}

pub fn udp_bind(fd: u32, ip: [u8; 4], port: u16) -> Result<()> {
    let port = if port == 0 { ephemeral_port() } else { port };
    let handle = {
        let mut sockets = SOCKETS.lock();
        let socket = sockets.get_mut(&fd).ok_or(Errno::EBADF)?;
        socket.handle
    };
    let endpoint = IpEndpoint::new(IpAddress::v4(ip[0], ip[1], ip[2], ip[3]), port);
    let ok = with_socket_set(|sockets| sockets.get_mut::<udp::Socket>(handle).bind(endpoint).is_ok())?;
    if !ok {
        return Err(Errno::EINVAL);
    }
    let mut sockets = SOCKETS.lock();
    let socket = sockets.get_mut(&fd).ok_or(Errno::EBADF)?;
    socket.state = SocketState::Bound;
    Ok(())
}

pub fn udp_sendto(fd: u32, buf: &[u8], dst_ip: [u8; 4], dst_port: u16) -> Result<usize> {
    let handle = {
        let sockets = SOCKETS.lock();
        sockets.get(&fd).ok_or(Errno::EBADF)?.handle
    };
    let endpoint = IpEndpoint::new(IpAddress::v4(dst_ip[0], dst_ip[1], dst_ip[2], dst_ip[3]), dst_port);
    for _ in 0..SOCKET_RETRIES {
        let sent = with_socket_set(|sockets| sockets.get_mut::<udp::Socket>(handle).send_slice(buf, endpoint).is_ok())?;
        let _ = iface::network_poll();
        if sent {
            return Ok(buf.len());
        }
    }
    Err(Errno::EAGAIN)
}

pub fn udp_recvfrom(fd: u32, out: &mut [u8]) -> Result<(usize, [u8; 4], u16)> {
    let handle = {
        let sockets = SOCKETS.lock();
        sockets.get(&fd).ok_or(Errno::EBADF)?.handle
    };
    for _ in 0..SOCKET_RETRIES {
        let got = with_socket_set(|sockets| {
            let socket = sockets.get_mut::<udp::Socket>(handle);
            socket.recv().ok().map(|(data, meta)| {
                let n = data.len().min(out.len());
                out[..n].copy_from_slice(&data[..n]);
                (n, meta)
            })
        })?;
        if let Some((n, meta)) = got {
            let ip = match meta.endpoint.addr {
                IpAddress::Ipv4(v4) => v4.0,
                _ => [0; 4],
            };
            return Ok((n, ip, meta.endpoint.port));
        }
        let _ = iface::network_poll();
    }
    Err(Errno::EAGAIN)
}

const TCP_BUF_BYTES: usize = 4096;

pub fn tcp_create() -> Result<u32> {
    let rx_buf = tcp::SocketBuffer::new(vec![0u8; TCP_BUF_BYTES]);
    let tx_buf = tcp::SocketBuffer::new(vec![0u8; TCP_BUF_BYTES]);
    let socket = tcp::Socket::new(rx_buf, tx_buf);
    let handle = with_socket_set(|sockets| sockets.add(socket))?;
    let fd = NEXT_FD.fetch_add(1, Ordering::Relaxed);
    SOCKETS
        .lock()
        .insert(fd, Socket { domain: AddressFamily::Inet, sock_type: SocketType::Stream, protocol: Protocol::Tcp, state: SocketState::Unbound, handle })
        .map_err(|_| Errno::ENOMEM)?;
    Ok(fd)
}

pub fn tcp_connect(fd: u32, dest_ip: [u8; 4], dest_port: u16) -> Result<()> {
    let handle = {
        let sockets = SOCKETS.lock();
        sockets.get(&fd).ok_or(Errno::EBADF)?.handle
    };
    let local_port = ephemeral_port();
    let remote = IpEndpoint::new(IpAddress::v4(dest_ip[0], dest_ip[1], dest_ip[2], dest_ip[3]), dest_port);
    iface::with_interface_and_sockets(|interface, sockets| {
        let cx = interface.context();
        let socket = sockets.get_mut::<tcp::Socket>(handle);
        socket.connect(cx, remote, local_port)
    })?
    .map_err(|_| Errno::EINVAL)?;

    let mut sockets = SOCKETS.lock();
    let socket = sockets.get_mut(&fd).ok_or(Errno::EBADF)?;
    socket.state = SocketState::Connecting;
    Ok(())
}

pub fn tcp_listen(fd: u32, port: u16) -> Result<()> {
    let handle = {
        let sockets = SOCKETS.lock();
        sockets.get(&fd).ok_or(Errno::EBADF)?.handle
    };
    with_socket_set(|sockets| sockets.get_mut::<tcp::Socket>(handle).listen(port))?.map_err(|_| Errno::EINVAL)?;
    let mut sockets = SOCKETS.lock();
    let socket = sockets.get_mut(&fd).ok_or(Errno::EBADF)?;
    socket.state = SocketState::Listening;
    Ok(())
}

pub fn tcp_send(fd: u32, buf: &[u8]) -> Result<usize> {
    let handle = {
        let sockets = SOCKETS.lock();
        sockets.get(&fd).ok_or(Errno::EBADF)?.handle
    };
    for _ in 0..SOCKET_RETRIES {
        let sent = with_socket_set(|sockets| {
            let socket = sockets.get_mut::<tcp::Socket>(handle);
            if socket.can_send() {
                socket.send_slice(buf).ok()
            } else {
                None
            }
        })?;
        let _ = iface::network_poll();
        if let Some(n) = sent {
            return Ok(n);
        }
    }
    Err(Errno::EAGAIN)
}

pub fn tcp_recv(fd: u32, out: &mut [u8]) -> Result<usize> {
    let handle = {
        let sockets = SOCKETS.lock();
        sockets.get(&fd).ok_or(Errno::EBADF)?.handle
    };
    for _ in 0..SOCKET_RETRIES {
        let n = with_socket_set(|sockets| {
            let socket = sockets.get_mut::<tcp::Socket>(handle);
            if socket.can_recv() {
                socket.recv_slice(out).ok()
            } else {
                None
            }
        })?;
        if let Some(n) = n {
            return Ok(n);
        }
        let _ = iface::network_poll();
    }
    Err(Errno::EAGAIN)
}

pub fn tcp_close(fd: u32) -> Result<()> {
    let handle = {
        let mut sockets = SOCKETS.lock();
        let socket = sockets.get_mut(&fd).ok_or(Errno::EBADF)?;
        socket.state = SocketState::Closing;
        socket.handle
    };
    with_socket_set(|sockets| sockets.get_mut::<tcp::Socket>(handle).close())?;
    Ok(())
}

const ICMP_RX_META: usize = 8;
const ICMP_BUF_BYTES: usize = 512;

/// Send an ICMP Echo Request and wait for the matching reply (spec 4.8
/// ICMP). The teacher's Cargo.toml enables `socket-icmp` but never builds a
/// client on it; this is the supplement that uses that feature.
pub fn icmp_ping(dst_ip: [u8; 4], ident: u16, seq: u16, payload: &[u8]) -> Result<()> {
    use smoltcp::wire::{Icmpv4Packet, Icmpv4Repr};

    let rx_meta = vec![icmp::PacketMetadata::EMPTY; ICMP_RX_META];
    let rx_buf = vec![0u8; ICMP_BUF_BYTES];
    let tx_meta = vec![icmp::PacketMetadata::EMPTY; ICMP_RX_META];
    let tx_buf = vec![0u8; ICMP_BUF_BYTES];
    let socket = icmp::Socket::new(icmp::PacketBuffer::new(rx_meta, rx_buf), icmp::PacketBuffer::new(tx_meta, tx_buf));
    let handle = with_socket_set(|sockets| sockets.add(socket))?;

    with_socket_set(|sockets| {
        let socket = sockets.get_mut::<icmp::Socket>(handle);
        socket.bind(icmp::Endpoint::Ident(ident)).ok();
    })?;

    let dst = IpAddress::v4(dst_ip[0], dst_ip[1], dst_ip[2], dst_ip[3]);
    let repr = Icmpv4Repr::EchoRequest { ident, seq_no: seq, data: payload };
    for _ in 0..SOCKET_RETRIES {
        let sent = with_socket_set(|sockets| {
            let socket = sockets.get_mut::<icmp::Socket>(handle);
            if !socket.can_send() {
                return false;
            }
            let mut buf = vec![0u8; repr.buffer_len()];
            let mut packet = Icmpv4Packet::new_unchecked(&mut buf);
            repr.emit(&mut packet, &smoltcp::phy::ChecksumCapabilities::default());
            socket.send_slice(&buf, dst).is_ok()
        })?;
        let _ = iface::network_poll();
        if sent {
            for _ in 0..SOCKET_RETRIES {
                let got = with_socket_set(|sockets| sockets.get_mut::<icmp::Socket>(handle).recv().is_ok())?;
                if got {
                    return Ok(());
                }
                let _ = iface::network_poll();
            }
            return Err(Errno::ETIMEDOUT);
        }
    }
    Err(Errno::EAGAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_ports_increment_and_wrap() {
        let a = ephemeral_port();
        let b = ephemeral_port();
        assert_eq!(b, a + 1);
    }
}
