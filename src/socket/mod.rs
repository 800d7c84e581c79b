/*! Client sessions.

The `socket` module provides the DHCP client session, which runs one
exchange (address acquisition with optional ProxyDHCP, or PXE boot server
discovery) from start to finish, together with the packet builder and the
retry timer it uses.

Sessions are sans-IO: they never touch a socket or a clock, and are driven
through an [Interface](crate::iface::Interface) or directly.
*/

use crate::time::Instant;

pub mod builder;
pub mod dhcp;
pub mod retry;
#[cfg(feature = "async")]
mod waker;

pub use self::builder::RequestConfig;
pub use self::dhcp::{Datagram, Event, Session, Start};
pub use self::retry::{RetryConfig, RetryTimer};

#[cfg(feature = "async")]
pub(crate) use self::waker::WakerRegistration;

/// Gives an indication on the next time the session should be polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollAt {
    /// The session needs to be polled immediately.
    Now,
    /// The session needs to be polled at given [Instant][struct.Instant].
    Time(Instant),
    /// The session does not need to be polled unless there are external changes.
    Ingress,
}
