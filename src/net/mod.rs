/// Network subsystem (spec 4.8): a `smoltcp`-backed TCP/IP stack — L2
/// framing, ARP, and IPv4 header handling all live inside `smoltcp`'s
/// `Interface`; this core only supplies the `Device` adapter
/// ([`phy::KernelNetPhy`]) over its own `NetworkDevice` trait object, the
/// socket-lifecycle wrappers in [`socket`], and the DHCP/DNS clients built
/// on `smoltcp`'s dhcpv4/dns sockets.
///
/// Nothing below `iface` owns a NIC directly; a `NetworkDevice` trait object
/// is installed once at boot (`iface::set_device`) and every layer above
/// reaches it only through `iface`/`socket` calls, so the whole stack runs
/// unmodified against `drivers::mock::network::MockNetworkDevice` in tests.
pub mod dhcp;
pub mod dns;
pub mod iface;
pub mod phy;
pub mod socket;

pub use socket::{Socket, SocketHandle};

use crate::lib::error::Result;

/// Bring up the interface over whatever NIC `iface::set_device` installed.
/// Call once after `iface::set_device`; safe to call with no NIC attached.
pub fn init_network() -> Result<()> {
    iface::init_network()
}

/// Drive the interface's RX/TX state machine. Non-blocking; returns the
/// number of poll cycles that made progress (0 or 1, per `Interface::poll`).
pub fn network_poll() -> Result<usize> {
    iface::network_poll()
}
