use core::fmt;

use byteorder::{ByteOrder, NetworkEndian};

/// A four-octet IPv4 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 4]);

impl Address {
    /// An unspecified address.
    pub const UNSPECIFIED: Address = Address([0x00; 4]);

    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 4]);

    /// Construct an IPv4 address from parts.
    pub const fn new(a0: u8, a1: u8, a2: u8, a3: u8) -> Address {
        Address([a0, a1, a2, a3])
    }

    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv4 address as a sequence of octets, in big-endian.
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.0[0..4] == [255; 4]
    }

    /// Query whether the address is a multicast address.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0xf0 == 224
    }

    /// Query whether the address falls into the "unspecified" range.
    pub const fn is_unspecified(&self) -> bool {
        self.0[0] == 0
            && self.0[1] == 0
            && self.0[2] == 0
            && self.0[3] == 0
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        let mut bytes = [0; 4];
        NetworkEndian::write_u32(&mut bytes, value);
        Address(bytes)
    }
}

impl From<Address> for u32 {
    fn from(addr: Address) -> Self {
        NetworkEndian::read_u32(&addr.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "{=u8}.{=u8}.{=u8}.{=u8}",
            self.0[0],
            self.0[1],
            self.0[2],
            self.0[3]
        )
    }
}

/// An IPv4 address and UDP port pair.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint {
    pub addr: Address,
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint address from given address and port.
    pub const fn new(addr: Address, port: u16) -> Endpoint {
        Endpoint { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl From<(Address, u16)> for Endpoint {
    fn from((addr, port): (Address, u16)) -> Endpoint {
        Endpoint { addr, port }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_address_classes() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(Address::UNSPECIFIED.is_unspecified());
        assert!(Address::new(224, 0, 1, 2).is_multicast());
        assert!(!Address::new(10, 0, 0, 1).is_multicast());
    }

    #[test]
    fn test_u32_conversion() {
        let addr = Address::new(192, 168, 1, 7);
        assert_eq!(u32::from(addr), 0xc0a8_0107);
        assert_eq!(Address::from(0xc0a8_0107), addr);
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new(Address::new(10, 0, 0, 1), 4011);
        assert_eq!(format!("{ep}"), "10.0.0.1:4011");
    }
}
