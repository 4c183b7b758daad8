/// `smoltcp::phy::Device` adapter over this core's `NetworkDevice` trait
/// object, so the same stack that runs against a real NIC driver also runs
/// against `drivers::mock::network::MockNetworkDevice` in host tests.
use crate::drivers::traits::NetworkDevice;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use smoltcp::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::time::Instant;

pub struct KernelNetPhy {
    device: Arc<dyn NetworkDevice>,
}

impl KernelNetPhy {
    pub fn new(device: Arc<dyn NetworkDevice>) -> Self {
        Self { device }
    }
}

pub struct KernelRxToken {
    packet: Vec<u8>,
}

pub struct KernelTxToken {
    device: Arc<dyn NetworkDevice>,
}

impl Device for KernelNetPhy {
    type RxToken<'a> = KernelRxToken where Self: 'a;
    type TxToken<'a> = KernelTxToken where Self: 'a;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let mut buf = [0u8; 1536];
        match self.device.recv(&mut buf) {
            Ok(0) => None,
            Ok(n) => Some((
                KernelRxToken { packet: buf[..n].to_vec() },
                KernelTxToken { device: self.device.clone() },
            )),
            Err(_) => None,
        }
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        if self.device.link_up() {
            Some(KernelTxToken { device: self.device.clone() })
        } else {
            None
        }
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.max_transmission_unit = self.device.mtu();
        caps.medium = Medium::Ethernet;
        caps
    }
}

impl RxToken for KernelRxToken {
    fn consume<R, F>(mut self, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        f(&mut self.packet)
    }
}

impl TxToken for KernelTxToken {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buffer = vec![0u8; len];
        let result = f(&mut buffer);
        if let Err(e) = self.device.send(&buffer) {
            crate::warn!("net: tx failed: {:?}", e);
        }
        result
    }
}
