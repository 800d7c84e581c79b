// PXE vendor option structures, carried as sub-options of DHCP option 43.
// See the Preboot Execution Environment specification v2.1, section 2.2.

use byteorder::{ByteOrder, LittleEndian};
use core::{fmt, iter};

use super::{Error, Ipv4Address, Result};

/// The vendor class prefix announced by PXE clients and servers.
pub const VENDOR_CLASS_PREFIX: &[u8] = b"PXEClient";

/// Query whether a vendor class identifier announces a PXE peer.
pub fn is_pxe_client(vendor_class: &[u8]) -> bool {
    vendor_class.starts_with(VENDOR_CLASS_PREFIX)
}

bitflags::bitflags! {
    /// The PXE discovery control option (43.6).
    pub struct DiscoveryControl: u8 {
        /// Do not broadcast boot server discovery requests.
        const NO_BROADCAST = 0x01;
        /// Do not multicast boot server discovery requests.
        const NO_MULTICAST = 0x02;
        /// Only accept replies from servers in the boot server list.
        const NO_UNKNOWN_SERVERS = 0x04;
        /// Skip discovery and use the boot file in the ProxyDHCP reply.
        const SKIP = 0x08;
    }
}

enum_with_unknown! {
    /// Client system architecture (RFC 4578, option 93).
    pub enum ClientArch(u16) {
        X86Bios = 0,
        NecPc98 = 1,
        EfiItanium = 2,
        DecAlpha = 3,
        ArcX86 = 4,
        IntelLeanClient = 5,
        EfiIa32 = 6,
        EfiX86_64 = 7,
        EfiXscale = 8,
        EfiBc = 9,
        EfiArm32 = 10,
        EfiArm64 = 11,
    }
}

/// Client network device interface (RFC 4578, option 94).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkInterface {
    /// Interface type, 1 for UNDI.
    pub kind: u8,
    pub major: u8,
    pub minor: u8,
}

impl NetworkInterface {
    /// The Universal Network Device Interface, version 2.1.
    pub const UNDI_2_1: NetworkInterface = NetworkInterface {
        kind: 1,
        major: 2,
        minor: 1,
    };

    pub const fn as_bytes(&self) -> [u8; 3] {
        [self.kind, self.major, self.minor]
    }
}

/// The PXE boot menu item option (43.71).
///
/// A client sends it in a boot server discovery request to name the boot
/// server type it wants; a boot server echoes the type in its reply. Both
/// fields are little-endian, unlike the rest of the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootMenuItem {
    pub server_type: u16,
    pub layer: u16,
}

impl BootMenuItem {
    pub const LEN: usize = 4;

    /// Parse a boot menu item. Trailing octets are ignored.
    pub fn parse(data: &[u8]) -> Result<BootMenuItem> {
        if data.len() < Self::LEN {
            return Err(Error);
        }
        Ok(BootMenuItem {
            server_type: LittleEndian::read_u16(&data[0..2]),
            layer: LittleEndian::read_u16(&data[2..4]),
        })
    }

    pub fn emit(&self) -> [u8; Self::LEN] {
        let mut bytes = [0; Self::LEN];
        LittleEndian::write_u16(&mut bytes[0..2], self.server_type);
        LittleEndian::write_u16(&mut bytes[2..4], self.layer);
        bytes
    }
}

impl fmt::Display for BootMenuItem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "type {} layer {}", self.server_type, self.layer)
    }
}

/// One entry of the PXE boot server list option (43.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootServer<'a> {
    pub server_type: u16,
    addresses: &'a [u8],
}

impl<'a> BootServer<'a> {
    /// Iterate over the addresses of this boot server entry, stopping at
    /// the first unspecified address.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Address> + 'a {
        self.addresses
            .chunks_exact(4)
            .map(Ipv4Address::from_bytes)
            .take_while(|addr| !addr.is_unspecified())
    }

    /// Query whether an unspecified address cuts this entry short.
    pub fn is_terminated(&self) -> bool {
        self.addresses().count() < self.len()
    }

    /// Number of addresses in this entry.
    pub fn len(&self) -> usize {
        self.addresses.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Iterate over the entries of a PXE boot server list.
///
/// Each entry is a little-endian server type, an address count and that many
/// IPv4 addresses. The iterator yields `Err(Error)` once, for the first
/// malformed entry, and stops.
pub fn boot_servers(mut data: &[u8]) -> impl Iterator<Item = Result<BootServer<'_>>> + '_ {
    iter::from_fn(move || {
        if data.is_empty() {
            return None;
        }
        if data.len() < 3 {
            data = &[];
            return Some(Err(Error));
        }
        let server_type = LittleEndian::read_u16(&data[0..2]);
        let entry_len = 3 + 4 * data[2] as usize;
        if data.len() < entry_len {
            data = &[];
            return Some(Err(Error));
        }
        let entry = BootServer {
            server_type,
            addresses: &data[3..entry_len],
        };
        data = &data[entry_len..];
        Some(Ok(entry))
    })
}
