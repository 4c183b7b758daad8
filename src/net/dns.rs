/// DNS client (spec 4.8 DNS): A-record lookups through `smoltcp`'s `dns`
/// socket, with a small hostname cache. The teacher's Cargo.toml enables
/// `socket-dns` in its smoltcp feature list but never builds a client on top
/// of it; this module is the supplement that uses that otherwise-dormant
/// feature, in `net::socket`'s with-retries-and-poll style.
use super::iface;
use crate::lib::error::{Errno, Result};
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use heapless::FnvIndexMap;
use smoltcp::socket::dns::{self, GetQueryResultError};
use smoltcp::wire::{DnsQueryType, IpAddress};
use spin::Mutex;

const MAX_CACHE: usize = 16;
const POLL_RETRIES: usize = 2_000;

static CACHE: Mutex<FnvIndexMap<String, [u8; 4], MAX_CACHE>> = Mutex::new(FnvIndexMap::new());

/// Register the DNS socket against `servers` (resolver IPs). Call once after
/// the interface has an address (post-DHCP or `set_ip_address`).
pub fn create(servers: &[IpAddress]) -> Result<smoltcp::iface::SocketHandle> {
    let socket = dns::Socket::new(servers, Vec::new());
    iface::with_socket_set(|sockets| sockets.add(socket))
}

fn cached(hostname: &str) -> Option<[u8; 4]> {
    CACHE.lock().get(hostname).copied()
}

/// `resolve(hostname)` (4.8): cached lookup, or a fresh A-record query
/// bounded by a fixed number of interface polls.
pub fn resolve(handle: smoltcp::iface::SocketHandle, hostname: &str) -> Result<[u8; 4]> {
    if let Some(ip) = cached(hostname) {
        return Ok(ip);
    }

    let query = iface::with_interface_and_sockets(|interface, sockets| {
        let cx = interface.context();
        let socket = sockets.get_mut::<dns::Socket>(handle);
        socket.start_query(cx, hostname, DnsQueryType::A)
    })?
    .map_err(|_| Errno::EINVAL)?;

    for _ in 0..POLL_RETRIES {
        let _ = iface::network_poll();
        let result = iface::with_socket_set(|sockets| sockets.get_mut::<dns::Socket>(handle).get_query_result(query))?;
        match result {
            Ok(addrs) => {
                for addr in addrs.iter() {
                    if let IpAddress::Ipv4(v4) = addr {
                        let octets = v4.as_bytes();
                        let ip = [octets[0], octets[1], octets[2], octets[3]];
                        let _ = CACHE.lock().insert(hostname.to_string(), ip);
                        return Ok(ip);
                    }
                }
                return Err(Errno::EADDRNOTAVAIL);
            }
            Err(GetQueryResultError::Pending) => continue,
            Err(_) => return Err(Errno::EIO),
        }
    }
    Err(Errno::ETIMEDOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_returns_without_touching_the_socket_set() {
        CACHE.lock().insert("example.com".to_string(), [93, 184, 216, 34]).ok();
        assert_eq!(cached("example.com"), Some([93, 184, 216, 34]));
        assert_eq!(cached("unknown.test"), None);
    }
}
