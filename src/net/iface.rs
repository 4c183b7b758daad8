/// Network interface bring-up and the global `smoltcp` interface/socket-set
/// pair (spec 4.8). Nothing above this module owns the NIC or a `Device`
/// impl directly: a `NetworkDevice` trait object is installed once via
/// [`set_device`], wrapped in [`super::phy::KernelNetPhy`], and every socket
/// operation reaches it only through [`with_socket_set`]/[`network_poll`].
use super::phy::KernelNetPhy;
use crate::drivers::traits::NetworkDevice;
use crate::lib::error::{Errno, Result};
use alloc::sync::Arc;
use alloc::vec;
use smoltcp::iface::{Config, Interface, SocketSet};
use smoltcp::time::Instant;
use smoltcp::wire::{EthernetAddress, HardwareAddress, IpAddress, IpCidr, Ipv4Address};
use spin::Mutex;

static NIC: Mutex<Option<Arc<dyn NetworkDevice>>> = Mutex::new(None);
static INTERFACE: Mutex<Option<Interface>> = Mutex::new(None);
static SOCKETS: Mutex<Option<SocketSet<'static>>> = Mutex::new(None);

/// Install the active NIC. Replaces any previously installed device. This is
/// the seam a real NIC driver calls into; no driver is wired in this core
/// build (drivers are out of scope per spec 4.10), so in practice the
/// interface stays uninitialized and `network_poll` is a no-op.
pub fn set_device(dev: Arc<dyn NetworkDevice>) {
    *NIC.lock() = Some(dev);
}

fn device() -> Option<Arc<dyn NetworkDevice>> {
    NIC.lock().clone()
}

pub fn local_mac() -> Result<[u8; 6]> {
    Ok(device().ok_or(Errno::ENODEV)?.mac_address())
}

/// Bring up the interface over whatever NIC `set_device` installed, with no
/// IP address yet (DHCP or `set_ip_address` configures one afterward). If no
/// NIC has been attached, leaves the interface unset so `network_poll`
/// returns `Errno::ENODEV` rather than panicking.
pub fn init_network() -> Result<()> {
    let dev = match device() {
        Some(d) => d,
        None => {
            crate::info!("net: no NIC attached, interface left uninitialized");
            return Ok(());
        }
    };
    let mac = dev.mac_address();
    let hw_addr = HardwareAddress::Ethernet(EthernetAddress(mac));
    crate::info!(
        "net: initializing interface with MAC {:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );

    let config = Config::new(hw_addr);
    let mut phy = KernelNetPhy::new(dev);
    let mut iface = Interface::new(config, &mut phy, Instant::from_millis(0));
    iface.update_ip_addrs(|addrs| {
        addrs.push(IpCidr::new(IpAddress::v4(0, 0, 0, 0), 0)).ok();
    });

    *INTERFACE.lock() = Some(iface);
    *SOCKETS.lock() = Some(SocketSet::new(vec![]));
    crate::info!("net: interface initialized (no IP yet, use DHCP or set_ip_address)");
    Ok(())
}

/// Drive the interface's state machine: dispatch queued RX frames into
/// sockets, flush pending TX, answer ARP/ICMP echo transparently. Call
/// periodically from an idle loop or NIC interrupt handler.
pub fn network_poll() -> Result<usize> {
    let dev = device().ok_or(Errno::ENODEV)?;
    let mut iface_lock = INTERFACE.lock();
    let mut sockets_lock = SOCKETS.lock();
    match (iface_lock.as_mut(), sockets_lock.as_mut()) {
        (Some(iface), Some(sockets)) => {
            let mut phy = KernelNetPhy::new(dev);
            let ts = Instant::from_millis(crate::time::get_uptime_ms() as i64);
            let processed = iface.poll(ts, &mut phy, sockets);
            Ok(if processed { 1 } else { 0 })
        }
        _ => Err(Errno::ENODEV),
    }
}

/// Set the interface's IPv4 address directly (for static configuration or
/// tests that don't want to run DHCP).
pub fn set_ip_address(ip: [u8; 4], prefix_len: u8) -> Result<()> {
    let mut guard = INTERFACE.lock();
    let iface = guard.as_mut().ok_or(Errno::ENODEV)?;
    let cidr = IpCidr::new(IpAddress::v4(ip[0], ip[1], ip[2], ip[3]), prefix_len);
    iface.update_ip_addrs(|addrs| {
        addrs.clear();
        addrs.push(cidr).ok();
    });
    crate::info!("net: IP address set to {}.{}.{}.{}/{}", ip[0], ip[1], ip[2], ip[3], prefix_len);
    Ok(())
}

pub fn set_gateway(gw: [u8; 4]) -> Result<()> {
    let mut guard = INTERFACE.lock();
    let iface = guard.as_mut().ok_or(Errno::ENODEV)?;
    let gw_addr = Ipv4Address::new(gw[0], gw[1], gw[2], gw[3]);
    iface.routes_mut().add_default_ipv4_route(gw_addr).map_err(|_| Errno::EINVAL)?;
    crate::info!("net: default gateway set to {}.{}.{}.{}", gw[0], gw[1], gw[2], gw[3]);
    Ok(())
}

pub fn get_ip_address() -> Result<[u8; 4]> {
    let guard = INTERFACE.lock();
    let iface = guard.as_ref().ok_or(Errno::ENODEV)?;
    for addr in iface.ip_addrs() {
        if let IpAddress::Ipv4(v4) = addr.address() {
            let octets = v4.as_bytes();
            return Ok([octets[0], octets[1], octets[2], octets[3]]);
        }
    }
    Err(Errno::EADDRNOTAVAIL)
}

/// Run `f` with mutable access to the global socket set.
pub fn with_socket_set<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut SocketSet) -> R,
{
    let mut guard = SOCKETS.lock();
    let sockets = guard.as_mut().ok_or(Errno::ENODEV)?;
    Ok(f(sockets))
}

/// Run `f` with mutable access to both the interface and the socket set
/// (needed for operations like DNS queries that require `Interface::context`).
pub fn with_interface_and_sockets<F, R>(f: F) -> Result<R>
where
    F: FnOnce(&mut Interface, &mut SocketSet) -> R,
{
    let mut iface_lock = INTERFACE.lock();
    let mut sockets_lock = SOCKETS.lock();
    match (iface_lock.as_mut(), sockets_lock.as_mut()) {
        (Some(iface), Some(sockets)) => Ok(f(iface, sockets)),
        _ => Err(Errno::ENODEV),
    }
}
