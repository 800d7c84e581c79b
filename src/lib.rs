#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! The _netboot_ library is a client for the DHCP protocol family used by
//! network boot firmware: plain DHCP address acquisition, the vendor-specific
//! ProxyDHCP exchange, and PXE Boot Server Discovery.
//!
//! It is written for the pre-boot environment: no threads, no blocking calls,
//! a single cooperative event loop and a monotonic clock. The library owns no
//! sockets and no timers; the embedder hands it received datagrams, the
//! current time, a transmit closure and a settings store, and it tells the
//! embedder when it next wants to be polled.
//!
//! # The layers
//!
//! ## The wire layer
//! The `wire` module provides zero-copy views over BOOTP/DHCP packets and
//! their tagged option stream, including the PXE vendor sub-options. Option
//! values are read with `fetch` and written with `store`; writes never exceed
//! the backing buffer.
//!
//! ## The session layer
//! The `socket` module contains the DHCP session: a four-state machine
//! (discovery, request, ProxyDHCP request and PXE boot server discovery) with
//! its packet builder, offer arbitration and retry timer.
//!
//! ## The interface layer
//! The `iface` module describes the network device a session configures,
//! keeps sessions in a `SessionSet`, and drives them through an `Interface`.
//! Completed exchanges are published into a [`settings::Settings`] store as
//! named layers (`dhcp`, `proxydhcp`, `pxebs`).
//!
//! # Minimum Supported Rust Version (MSRV)
//!
//! This crate is guaranteed to compile on stable Rust 1.65 and up with any
//! valid set of features.

#[cfg(not(feature = "alloc"))]
compile_error!("The `alloc` feature is required: sessions keep owned copies of received offers");

extern crate alloc;

use core::fmt;

#[macro_use]
mod macros;
mod rand;

pub mod iface;
pub mod settings;
pub mod socket;
pub mod time;
pub mod wire;

#[cfg(test)]
mod tests;

/// The error type for session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A packet or option did not fit into its buffer.
    NoSpace,
    /// Memory for an owned copy could not be allocated.
    NoMemory,
    /// The retry policy ran out, or every boot server was tried.
    TimedOut,
    /// An argument was unusable, such as a boot server type with no servers.
    InvalidArgument,
    /// The session was closed through its handle before it finished.
    Canceled,
    /// The settings store refused to publish a layer.
    NotSupported,
}

/// The result type for session operations.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::NoSpace => write!(f, "no space in buffer"),
            Error::NoMemory => write!(f, "out of memory"),
            Error::TimedOut => write!(f, "timed out"),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::Canceled => write!(f, "canceled"),
            Error::NotSupported => write!(f, "not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
