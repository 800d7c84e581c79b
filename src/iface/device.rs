use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use heapless::{String, Vec};

use crate::{Error, Result};

/// Longest link-layer address a device may have (IPoIB uses 20 octets).
pub const MAX_LL_ADDR_LEN: usize = 20;

/// Longest device name.
pub const MAX_NAME_LEN: usize = 16;

enum_with_unknown! {
    /// Link-layer protocol numbers, as used in the BOOTP `htype` field.
    pub enum LinkProtocol(u16) {
        Ethernet = 1,
        Ieee802 = 6,
        Infiniband = 32,
    }
}

enum_with_unknown! {
    /// The bus a network device is attached to.
    pub enum BusType(u8) {
        Pci = 1,
        IsaPnp = 2,
        Eisa = 3,
        Mca = 4,
        Isa = 5,
        Tap = 6,
        Efi = 7,
        Xen = 8,
        Hyperv = 9,
        Usb = 10,
    }
}

/// Location of a network device on its bus, announced to DHCP servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusId {
    pub bus_type: BusType,
    pub vendor: u16,
    pub device: u16,
}

impl BusId {
    pub const LEN: usize = 5;

    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut bytes = [0; Self::LEN];
        bytes[0] = self.bus_type.into();
        NetworkEndian::write_u16(&mut bytes[1..3], self.vendor);
        NetworkEndian::write_u16(&mut bytes[3..5], self.device);
        bytes
    }
}

impl Default for BusId {
    fn default() -> Self {
        BusId {
            bus_type: BusType::Unknown(0),
            vendor: 0,
            device: 0,
        }
    }
}

/// A network device being configured.
///
/// This is a description of the device, not a driver: it carries the
/// addressing information a DHCP client needs to identify itself. Sessions
/// hold it through an `Rc`, so the description outlives every session
/// started on it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Device {
    name: String<MAX_NAME_LEN>,
    link_protocol: LinkProtocol,
    ll_addr: Vec<u8, MAX_LL_ADDR_LEN>,
    hw_addr: Vec<u8, MAX_LL_ADDR_LEN>,
    eth_addr: Option<[u8; 6]>,
    bus_id: BusId,
}

impl Device {
    /// Describe a device with an arbitrary link layer.
    ///
    /// Fails with `NoSpace` if the name or either address is too long.
    pub fn new(
        name: &str,
        link_protocol: LinkProtocol,
        ll_addr: &[u8],
        hw_addr: &[u8],
    ) -> Result<Device> {
        let mut device = Device {
            name: String::new(),
            link_protocol,
            ll_addr: Vec::from_slice(ll_addr).map_err(|_| Error::NoSpace)?,
            hw_addr: Vec::from_slice(hw_addr).map_err(|_| Error::NoSpace)?,
            eth_addr: None,
            bus_id: BusId::default(),
        };
        device.name.push_str(name).map_err(|_| Error::NoSpace)?;
        Ok(device)
    }

    /// Describe an Ethernet device.
    pub fn ethernet(name: &str, mac: [u8; 6]) -> Result<Device> {
        let mut device = Device::new(name, LinkProtocol::Ethernet, &mac, &mac)?;
        device.eth_addr = Some(mac);
        Ok(device)
    }

    /// Set the Ethernet-compatible form of the link-layer address.
    pub fn with_eth_addr(mut self, eth_addr: [u8; 6]) -> Device {
        self.eth_addr = Some(eth_addr);
        self
    }

    pub fn with_bus_id(mut self, bus_id: BusId) -> Device {
        self.bus_id = bus_id;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link_protocol(&self) -> LinkProtocol {
        self.link_protocol
    }

    /// The native link-layer address.
    pub fn ll_addr(&self) -> &[u8] {
        &self.ll_addr
    }

    /// The hardware address, which for some link layers differs from the
    /// link-layer address.
    pub fn hw_addr(&self) -> &[u8] {
        &self.hw_addr
    }

    /// An Ethernet-compatible form of the link-layer address, if the link
    /// layer can produce one.
    pub fn eth_addr(&self) -> Option<[u8; 6]> {
        self.eth_addr
    }

    pub fn bus_id(&self) -> BusId {
        self.bus_id
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bus_id_emit() {
        let bus_id = BusId {
            bus_type: BusType::Pci,
            vendor: 0x8086,
            device: 0x100e,
        };
        assert_eq!(bus_id.emit(), [0x01, 0x80, 0x86, 0x10, 0x0e]);
    }

    #[test]
    fn test_address_too_long() {
        assert_eq!(
            Device::new("ib0", LinkProtocol::Infiniband, &[0; 21], &[0; 8]),
            Err(Error::NoSpace)
        );
        assert_eq!(
            Device::ethernet("a-very-long-device-name", [0; 6]),
            Err(Error::NoSpace)
        );
    }

    #[test]
    fn test_ethernet() {
        let dev = Device::ethernet("net0", [2, 0, 0, 0, 0, 1]).unwrap();
        assert_eq!(dev.link_protocol(), LinkProtocol::Ethernet);
        assert_eq!(dev.ll_addr(), &[2, 0, 0, 0, 0, 1]);
        assert_eq!(dev.eth_addr(), Some([2, 0, 0, 0, 0, 1]));
        assert_eq!(dev.name(), "net0");
    }
}
