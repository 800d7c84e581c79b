/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. It provides two levels
of functionality.

 * First, it provides functions to extract fields from sequences of octets,
   and to insert fields into sequences of octets. This happens `Packet` family of
   structures, e.g. [Dhcpv4Packet].
 * Second, in cases where the space of valid field values is much smaller than the space
   of possible field values, it provides a compact, high-level representation
   of packet data that can be parsed from and emitted into a sequence of octets.
   This happens through the PXE structures, e.g. [PxeBootMenuItem] or
   [PxeBootServer].

The `Packet` family of data structures guarantees that, if the `Packet::check_len()` method
returned `Ok(())`, then no accessor or setter method will panic; however, the guarantee
provided by `Packet::check_len()` may no longer hold after changing certain fields,
which are listed in the documentation for the specific packet.

The `Packet::new_checked` method is a shorthand for a combination of `Packet::new_unchecked`
and `Packet::check_len`.
When parsing untrusted input, it is *necessary* to use `Packet::new_checked()`;
so long as the buffer is not modified, no accessor will fail.
When emitting output, though, it is *incorrect* to use `Packet::new_checked()`;
the length check is likely to succeed on a zeroed buffer, but fail on a buffer
filled with data from a previous packet, such as when reusing buffers, resulting
in nondeterministic panics with some network traffic but not others.
*/

mod field {
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

pub mod dhcpv4;
mod ipv4;
pub mod pxe;

use core::fmt;

pub use self::ipv4::{Address as Ipv4Address, Endpoint as Ipv4Endpoint};

pub use self::dhcpv4::{
    DhcpOption, Flags as DhcpFlags, MessageType as DhcpMessageType, OpCode as DhcpOpCode,
    OptionTag as DhcpOptionTag, Packet as Dhcpv4Packet, CLIENT_PORT as DHCP_CLIENT_PORT,
    MAGIC_COOKIE as DHCP_MAGIC_COOKIE, MIN_LEN as DHCP_MIN_LEN, PXE_PORT as DHCP_PXE_PORT,
    SERVER_PORT as DHCP_SERVER_PORT,
};

pub use self::pxe::{
    BootMenuItem as PxeBootMenuItem, BootServer as PxeBootServer,
    DiscoveryControl as PxeDiscoveryControl,
};

/// Parsing a packet failed.
///
/// Either it is malformed, or it is not supported by this library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Error;

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;
