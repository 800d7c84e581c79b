// See https://tools.ietf.org/html/rfc2131 for the DHCP specification,
// https://tools.ietf.org/html/rfc2132 for the option namespace and
// the Preboot Execution Environment specification v2.1 for the PXE
// vendor options carried inside option 43.

use byteorder::{ByteOrder, NetworkEndian};
use core::{fmt, iter};

use super::{Error, Ipv4Address, Result};

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;
pub const PXE_PORT: u16 = 4011;

pub const MAGIC_COOKIE: u32 = 0x63825363;

/// Smallest packet buffer every DHCP participant must be able to receive.
pub const MIN_LEN: usize = 552;

/// Largest DHCP message that fits an Ethernet frame (1500 − IPv4 − UDP).
pub const MAX_MESSAGE_SIZE: u16 = 1500 - 20 - 8;

/// Width of the legacy `chaddr` header field.
pub const MAX_CHADDR_LEN: usize = 16;

/// Largest value a single option can carry.
pub const MAX_OPTION_LEN: usize = 255;

enum_with_unknown! {
    /// The possible opcodes of a DHCP packet.
    pub enum OpCode(u8) {
        Request = 1,
        Reply = 2,
    }
}

enum_with_unknown! {
    /// The possible message types of a DHCP packet.
    pub enum MessageType(u8) {
        Discover = 1,
        Offer = 2,
        Request = 3,
        Decline = 4,
        Ack = 5,
        Nak = 6,
        Release = 7,
        Inform = 8,
    }
}

impl MessageType {
    /// The BOOTP operation carrying this message type.
    pub const fn opcode(&self) -> OpCode {
        match *self {
            MessageType::Discover
            | MessageType::Request
            | MessageType::Decline
            | MessageType::Release
            | MessageType::Inform => OpCode::Request,
            MessageType::Offer | MessageType::Ack | MessageType::Nak => OpCode::Reply,
            MessageType::Unknown(_) => OpCode::Unknown(0),
        }
    }

    /// Name a message type, `None` standing for a plain BOOTP packet.
    pub fn name(message_type: Option<MessageType>) -> &'static str {
        match message_type {
            None => "BOOTP",
            Some(MessageType::Discover) => "DHCPDISCOVER",
            Some(MessageType::Offer) => "DHCPOFFER",
            Some(MessageType::Request) => "DHCPREQUEST",
            Some(MessageType::Decline) => "DHCPDECLINE",
            Some(MessageType::Ack) => "DHCPACK",
            Some(MessageType::Nak) => "DHCPNAK",
            Some(MessageType::Release) => "DHCPRELEASE",
            Some(MessageType::Inform) => "DHCPINFORM",
            Some(MessageType::Unknown(_)) => "DHCP<invalid>",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", MessageType::name(Some(*self)))
    }
}

bitflags::bitflags! {
    pub struct Flags: u16 {
        const BROADCAST = 0b1000_0000_0000_0000;
    }
}

/// A DHCP option tag.
///
/// Plain options are identified by their one-octet code. Options living
/// inside an encapsulating option (such as the PXE options inside option 43)
/// are identified by the pair of encapsulator code and sub-option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OptionTag(u16);

impl OptionTag {
    pub const SUBNET_MASK: OptionTag = OptionTag::new(field::OPT_SUBNET_MASK);
    pub const ROUTERS: OptionTag = OptionTag::new(field::OPT_ROUTERS);
    pub const DNS_SERVERS: OptionTag = OptionTag::new(field::OPT_DNS_SERVERS);
    pub const LOG_SERVERS: OptionTag = OptionTag::new(field::OPT_LOG_SERVERS);
    pub const HOST_NAME: OptionTag = OptionTag::new(field::OPT_HOST_NAME);
    pub const DOMAIN_NAME: OptionTag = OptionTag::new(field::OPT_DOMAIN_NAME);
    pub const ROOT_PATH: OptionTag = OptionTag::new(field::OPT_ROOT_PATH);
    pub const VENDOR_ENCAP: OptionTag = OptionTag::new(field::OPT_VENDOR_ENCAP);
    pub const REQUESTED_ADDRESS: OptionTag = OptionTag::new(field::OPT_REQUESTED_ADDRESS);
    pub const MESSAGE_TYPE: OptionTag = OptionTag::new(field::OPT_MESSAGE_TYPE);
    pub const SERVER_IDENTIFIER: OptionTag = OptionTag::new(field::OPT_SERVER_IDENTIFIER);
    pub const PARAMETER_REQUEST_LIST: OptionTag =
        OptionTag::new(field::OPT_PARAMETER_REQUEST_LIST);
    pub const MAX_MESSAGE_SIZE: OptionTag = OptionTag::new(field::OPT_MAX_MESSAGE_SIZE);
    pub const VENDOR_CLASS_ID: OptionTag = OptionTag::new(field::OPT_VENDOR_CLASS_ID);
    pub const CLIENT_ID: OptionTag = OptionTag::new(field::OPT_CLIENT_ID);
    pub const TFTP_SERVER_NAME: OptionTag = OptionTag::new(field::OPT_TFTP_SERVER_NAME);
    pub const BOOTFILE_NAME: OptionTag = OptionTag::new(field::OPT_BOOTFILE_NAME);
    pub const USER_CLASS_ID: OptionTag = OptionTag::new(field::OPT_USER_CLASS_ID);
    pub const CLIENT_ARCHITECTURE: OptionTag = OptionTag::new(field::OPT_CLIENT_ARCHITECTURE);
    pub const CLIENT_NDI: OptionTag = OptionTag::new(field::OPT_CLIENT_NDI);
    pub const CLIENT_UUID: OptionTag = OptionTag::new(field::OPT_CLIENT_UUID);
    pub const EB_ENCAP: OptionTag = OptionTag::new(field::OPT_EB_ENCAP);
    pub const ISCSI_INITIATOR_IQN: OptionTag = OptionTag::new(field::OPT_ISCSI_INITIATOR_IQN);

    pub const PXE_DISCOVERY_CONTROL: OptionTag =
        OptionTag::encap(field::OPT_VENDOR_ENCAP, field::PXE_DISCOVERY_CONTROL);
    pub const PXE_BOOT_SERVER_MCAST: OptionTag =
        OptionTag::encap(field::OPT_VENDOR_ENCAP, field::PXE_BOOT_SERVER_MCAST);
    pub const PXE_BOOT_SERVERS: OptionTag =
        OptionTag::encap(field::OPT_VENDOR_ENCAP, field::PXE_BOOT_SERVERS);
    pub const PXE_BOOT_MENU: OptionTag =
        OptionTag::encap(field::OPT_VENDOR_ENCAP, field::PXE_BOOT_MENU);
    pub const PXE_BOOT_MENU_PROMPT: OptionTag =
        OptionTag::encap(field::OPT_VENDOR_ENCAP, field::PXE_BOOT_MENU_PROMPT);
    pub const PXE_BOOT_MENU_ITEM: OptionTag =
        OptionTag::encap(field::OPT_VENDOR_ENCAP, field::PXE_BOOT_MENU_ITEM);

    pub const EB_PRIORITY: OptionTag = OptionTag::encap(field::OPT_EB_ENCAP, field::EB_PRIORITY);
    pub const EB_YIADDR: OptionTag = OptionTag::encap(field::OPT_EB_ENCAP, field::EB_YIADDR);
    pub const EB_SIADDR: OptionTag = OptionTag::encap(field::OPT_EB_ENCAP, field::EB_SIADDR);
    pub const EB_NO_PXEDHCP: OptionTag =
        OptionTag::encap(field::OPT_EB_ENCAP, field::EB_NO_PXEDHCP);
    pub const EB_BUS_ID: OptionTag = OptionTag::encap(field::OPT_EB_ENCAP, field::EB_BUS_ID);
    pub const EB_USE_CACHED: OptionTag =
        OptionTag::encap(field::OPT_EB_ENCAP, field::EB_USE_CACHED);

    /// A top-level option.
    pub const fn new(code: u8) -> OptionTag {
        OptionTag(code as u16)
    }

    /// A sub-option carried inside the option `encapsulator`.
    pub const fn encap(encapsulator: u8, code: u8) -> OptionTag {
        OptionTag(((encapsulator as u16) << 8) | code as u16)
    }

    /// The option code, within its encapsulator if any.
    pub const fn code(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    /// The encapsulating option code, if this is a sub-option.
    pub const fn encapsulator(&self) -> Option<u8> {
        match (self.0 >> 8) as u8 {
            0 => None,
            code => Some(code),
        }
    }
}

impl fmt::Display for OptionTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.encapsulator() {
            Some(encap) => write!(f, "{}.{}", encap, self.code()),
            None => write!(f, "{}", self.code()),
        }
    }
}

/// A representation of a single DHCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DhcpOption<'a> {
    pub kind: u8,
    pub data: &'a [u8],
}

/// A read/write wrapper around a Dynamic Host Configuration Protocol packet buffer.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

pub(crate) mod field {
    #![allow(non_snake_case)]
    #![allow(unused)]

    use crate::wire::field::*;

    pub const OP: usize = 0;
    pub const HTYPE: usize = 1;
    pub const HLEN: usize = 2;
    pub const HOPS: usize = 3;
    pub const XID: Field = 4..8;
    pub const SECS: Field = 8..10;
    pub const FLAGS: Field = 10..12;
    pub const CIADDR: Field = 12..16;
    pub const YIADDR: Field = 16..20;
    pub const SIADDR: Field = 20..24;
    pub const GIADDR: Field = 24..28;
    pub const CHADDR: Field = 28..44;
    pub const SNAME: Field = 44..108;
    pub const FILE: Field = 108..236;
    pub const MAGIC_NUMBER: Field = 236..240;
    pub const OPTIONS: Rest = 240..;

    // Vendor Extensions
    pub const OPT_PAD: u8 = 0;
    pub const OPT_SUBNET_MASK: u8 = 1;
    pub const OPT_ROUTERS: u8 = 3;
    pub const OPT_DNS_SERVERS: u8 = 6;
    pub const OPT_LOG_SERVERS: u8 = 7;
    pub const OPT_HOST_NAME: u8 = 12;
    pub const OPT_DOMAIN_NAME: u8 = 15;
    pub const OPT_ROOT_PATH: u8 = 17;
    pub const OPT_VENDOR_ENCAP: u8 = 43;

    // DHCP Extensions
    pub const OPT_REQUESTED_ADDRESS: u8 = 50;
    pub const OPT_MESSAGE_TYPE: u8 = 53;
    pub const OPT_SERVER_IDENTIFIER: u8 = 54;
    pub const OPT_PARAMETER_REQUEST_LIST: u8 = 55;
    pub const OPT_MAX_MESSAGE_SIZE: u8 = 57;
    pub const OPT_VENDOR_CLASS_ID: u8 = 60;
    pub const OPT_CLIENT_ID: u8 = 61;
    pub const OPT_TFTP_SERVER_NAME: u8 = 66;
    pub const OPT_BOOTFILE_NAME: u8 = 67;
    pub const OPT_USER_CLASS_ID: u8 = 77;

    // PXE client extensions (RFC 4578)
    pub const OPT_CLIENT_ARCHITECTURE: u8 = 93;
    pub const OPT_CLIENT_NDI: u8 = 94;
    pub const OPT_CLIENT_UUID: u8 = 97;

    // Site-specific encapsulation used by the boot firmware
    pub const OPT_EB_ENCAP: u8 = 175;
    pub const OPT_ISCSI_INITIATOR_IQN: u8 = 203;

    pub const OPT_END: u8 = 255;

    // PXE vendor options, encapsulated in option 43
    pub const PXE_DISCOVERY_CONTROL: u8 = 6;
    pub const PXE_BOOT_SERVER_MCAST: u8 = 7;
    pub const PXE_BOOT_SERVERS: u8 = 8;
    pub const PXE_BOOT_MENU: u8 = 9;
    pub const PXE_BOOT_MENU_PROMPT: u8 = 10;
    pub const PXE_BOOT_MENU_ITEM: u8 = 71;

    // Boot firmware options, encapsulated in option 175
    pub const EB_PRIORITY: u8 = 1;
    pub const EB_YIADDR: u8 = 3;
    pub const EB_SIADDR: u8 = 4;
    pub const EB_NO_PXEDHCP: u8 = 0xb0;
    pub const EB_BUS_ID: u8 = 0xb1;
    pub const EB_USE_CACHED: u8 = 0xb2;
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with DHCP packet structure.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < field::OPTIONS.start {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Returns the operation code of this packet.
    pub fn opcode(&self) -> OpCode {
        OpCode::from(self.buffer.as_ref()[field::OP])
    }

    /// Returns the hardware address type, the link-layer protocol number
    /// of the client's network device.
    pub fn hardware_type(&self) -> u8 {
        self.buffer.as_ref()[field::HTYPE]
    }

    /// Returns the length of the client hardware address.
    pub fn hardware_len(&self) -> u8 {
        self.buffer.as_ref()[field::HLEN]
    }

    /// Returns the transaction ID.
    ///
    /// The transaction ID (called `xid` in the specification) is a random number used to
    /// associate messages and responses between client and server. The number is chosen by
    /// the client.
    pub fn transaction_id(&self) -> u32 {
        NetworkEndian::read_u32(&self.buffer.as_ref()[field::XID])
    }

    /// Returns the `secs` field.
    pub fn secs(&self) -> u16 {
        NetworkEndian::read_u16(&self.buffer.as_ref()[field::SECS])
    }

    /// Returns the flags.
    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(NetworkEndian::read_u16(&self.buffer.as_ref()[field::FLAGS]))
    }

    /// Returns the client IP address (`ciaddr`).
    pub fn client_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::CIADDR])
    }

    /// Returns the address offered or assigned to the client (`yiaddr`).
    pub fn your_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::YIADDR])
    }

    /// Returns the next server to use in bootstrap (`siaddr`).
    pub fn server_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::SIADDR])
    }

    /// Returns the relay agent address (`giaddr`).
    pub fn relay_agent_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::GIADDR])
    }

    /// Returns the client hardware address, truncated to the advertised length.
    pub fn client_hardware_address(&self) -> &[u8] {
        let len = (self.hardware_len() as usize).min(MAX_CHADDR_LEN);
        &self.buffer.as_ref()[field::CHADDR][..len]
    }

    /// Returns the magic cookie.
    pub fn magic_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.buffer.as_ref()[field::MAGIC_NUMBER])
    }

    /// Return the raw option area, or an empty slice for a packet without the
    /// DHCP magic cookie.
    pub fn options(&self) -> &[u8] {
        if self.magic_number() != MAGIC_COOKIE {
            return &[];
        }
        &self.buffer.as_ref()[field::OPTIONS]
    }

    /// Return the value of the option identified by `tag`.
    ///
    /// The pseudo-options [OptionTag::EB_YIADDR] and [OptionTag::EB_SIADDR]
    /// resolve to the matching header fields.
    pub fn option(&self, tag: OptionTag) -> Option<&[u8]> {
        match tag {
            OptionTag::EB_YIADDR => return Some(&self.buffer.as_ref()[field::YIADDR]),
            OptionTag::EB_SIADDR => return Some(&self.buffer.as_ref()[field::SIADDR]),
            _ => {}
        }
        find_tag(self.options(), tag)
    }

    /// Copy the value of the option identified by `tag` into `buf`.
    ///
    /// Returns the full length of the option value, which is larger than
    /// `buf.len()` when the copy was truncated, or `None` if the option is
    /// absent.
    pub fn fetch(&self, tag: OptionTag, buf: &mut [u8]) -> Option<usize> {
        let data = self.option(tag)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Some(data.len())
    }

    /// Returns the message type, or `None` for a BOOTP packet.
    pub fn message_type(&self) -> Option<MessageType> {
        match self.option(OptionTag::MESSAGE_TYPE) {
            Some([0, ..]) | Some([]) | None => None,
            Some([value, ..]) => Some(MessageType::from(*value)),
        }
    }

    /// Returns the server identifier option as an address.
    pub fn server_identifier(&self) -> Option<Ipv4Address> {
        match self.option(OptionTag::SERVER_IDENTIFIER) {
            Some(data) if data.len() >= 4 => Some(Ipv4Address::from_bytes(&data[..4])),
            _ => None,
        }
    }

    /// Return the number of octets in use: the fixed header plus the
    /// options up to and including the end-of-options tag.
    pub fn len(&self) -> usize {
        field::OPTIONS.start + used_len(&self.buffer.as_ref()[field::OPTIONS])
    }

    /// Return whether the packet carries no options at all.
    pub fn is_empty(&self) -> bool {
        self.len() == field::OPTIONS.start
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Sets the `OpCode` for the packet.
    pub fn set_opcode(&mut self, value: OpCode) {
        self.buffer.as_mut()[field::OP] = value.into();
    }

    /// Sets the hardware address type.
    pub fn set_hardware_type(&mut self, value: u8) {
        self.buffer.as_mut()[field::HTYPE] = value;
    }

    /// Sets the hardware address length.
    pub fn set_hardware_len(&mut self, value: u8) {
        self.buffer.as_mut()[field::HLEN] = value;
    }

    /// Sets the hops field.
    pub fn set_hops(&mut self, value: u8) {
        self.buffer.as_mut()[field::HOPS] = value;
    }

    /// Sets the transaction ID.
    pub fn set_transaction_id(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[field::XID], value)
    }

    /// Sets the `secs` field.
    pub fn set_secs(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::SECS], value)
    }

    /// Sets the flags to the specified value.
    pub fn set_flags(&mut self, value: Flags) {
        NetworkEndian::write_u16(&mut self.buffer.as_mut()[field::FLAGS], value.bits())
    }

    /// Sets the client IP address (`ciaddr`).
    pub fn set_client_ip(&mut self, value: Ipv4Address) {
        self.buffer.as_mut()[field::CIADDR].copy_from_slice(value.as_bytes());
    }

    /// Sets the `yiaddr` field.
    pub fn set_your_ip(&mut self, value: Ipv4Address) {
        self.buffer.as_mut()[field::YIADDR].copy_from_slice(value.as_bytes());
    }

    /// Sets the `siaddr` field.
    pub fn set_server_ip(&mut self, value: Ipv4Address) {
        self.buffer.as_mut()[field::SIADDR].copy_from_slice(value.as_bytes());
    }

    /// Sets the `giaddr` field.
    pub fn set_relay_agent_ip(&mut self, value: Ipv4Address) {
        self.buffer.as_mut()[field::GIADDR].copy_from_slice(value.as_bytes());
    }

    /// Return the whole fixed-width `chaddr` field.
    pub fn client_hardware_address_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[field::CHADDR]
    }

    /// Sets the value of the `magic cookie` field.
    ///
    /// This field should be always be `0x63825363`.
    pub fn set_magic_number(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.buffer.as_mut()[field::MAGIC_NUMBER], value)
    }

    /// Return the raw option area.
    pub fn options_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.as_mut()[field::OPTIONS]
    }

    /// Store `value` as the option identified by `tag`.
    ///
    /// An existing instance of the option is replaced in place; otherwise the
    /// option is inserted before the end-of-options tag. Sub-options create or
    /// extend their encapsulating option. Fails with [crate::Error::NoSpace]
    /// if the packet buffer cannot hold the result, leaving the packet
    /// unchanged.
    pub fn store(&mut self, tag: OptionTag, value: &[u8]) -> crate::Result<()> {
        let options = self.options_mut();
        match tag.encapsulator() {
            None => set_option(options, tag.code(), value),
            Some(encap) => {
                let mut scratch = [0u8; MAX_OPTION_LEN];
                let body = find_option(options, encap).unwrap_or(&[]);
                scratch[..body.len()].copy_from_slice(body);
                set_option(&mut scratch, tag.code(), value)?;
                let body_len = used_len(&scratch);
                set_option(options, encap, &scratch[..body_len])
            }
        }
    }
}

/// Return an iterator over the options in `buf`.
///
/// Iteration stops at the end-of-options tag or at the first truncated option.
pub fn parse_options(mut buf: &[u8]) -> impl Iterator<Item = DhcpOption<'_>> + '_ {
    iter::from_fn(move || loop {
        let (&kind, rest) = buf.split_first()?;
        match kind {
            field::OPT_PAD => buf = rest,
            field::OPT_END => {
                buf = &[];
                return None;
            }
            _ => {
                let (&len, rest) = match rest.split_first() {
                    Some(x) => x,
                    None => {
                        buf = &[];
                        return None;
                    }
                };
                let len = len as usize;
                if rest.len() < len {
                    buf = &[];
                    return None;
                }
                let (data, rest) = rest.split_at(len);
                buf = rest;
                return Some(DhcpOption { kind, data });
            }
        }
    })
}

fn find_option(buf: &[u8], code: u8) -> Option<&[u8]> {
    parse_options(buf)
        .find(|opt| opt.kind == code)
        .map(|opt| opt.data)
}

fn find_tag(buf: &[u8], tag: OptionTag) -> Option<&[u8]> {
    match tag.encapsulator() {
        None => find_option(buf, tag.code()),
        Some(encap) => find_option(find_option(buf, encap)?, tag.code()),
    }
}

/// Walk the option stream, returning `(insertion point, used length, offset of
/// the option with code `code`)`. The insertion point is the offset of the
/// end-of-options tag, or the end of the last complete option when there is
/// no such tag.
fn scan(buf: &[u8], code: u8) -> (usize, usize, Option<usize>) {
    let mut offset = 0;
    let mut used = 0;
    let mut found = None;
    while offset < buf.len() {
        match buf[offset] {
            field::OPT_PAD => offset += 1,
            field::OPT_END => return (offset, offset + 1, found),
            kind => {
                if offset + 2 > buf.len() || offset + 2 + buf[offset + 1] as usize > buf.len() {
                    break;
                }
                if kind == code && found.is_none() {
                    found = Some(offset);
                }
                offset += 2 + buf[offset + 1] as usize;
                used = offset;
            }
        }
    }
    (used, used, found)
}

fn used_len(buf: &[u8]) -> usize {
    scan(buf, field::OPT_END).1
}

fn set_option(buf: &mut [u8], code: u8, value: &[u8]) -> crate::Result<()> {
    if value.len() > MAX_OPTION_LEN {
        return Err(crate::Error::NoSpace);
    }
    let (end, used, found) = scan(buf, code);
    let has_end = used > end;
    let (start, old_len) = match found {
        Some(offset) => (offset, 2 + buf[offset + 1] as usize),
        None => (end, 0),
    };
    let new_len = 2 + value.len();
    let new_used = used + new_len - old_len + if has_end { 0 } else { 1 };
    if new_used > buf.len() {
        return Err(crate::Error::NoSpace);
    }

    buf.copy_within(start + old_len..used, start + new_len);
    buf[start] = code;
    buf[start + 1] = value.len() as u8;
    buf[start + 2..start + new_len].copy_from_slice(value);
    if !has_end {
        buf[new_used - 1] = field::OPT_END;
    }
    // Clear whatever a shrinking option left behind.
    for byte in buf[new_used..used.max(new_used)].iter_mut() {
        *byte = field::OPT_PAD;
    }
    Ok(())
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.check_len().is_err() {
            return write!(f, "DHCP (truncated)");
        }
        write!(
            f,
            "{} xid={:08x} yiaddr={}",
            MessageType::name(self.message_type()),
            self.transaction_id(),
            self.your_ip()
        )?;
        if let Some(server) = self.server_identifier() {
            write!(f, " server-id={server}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn blank() -> [u8; 300] {
        let mut bytes = [0u8; 300];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_magic_number(MAGIC_COOKIE);
        bytes
    }

    #[test]
    fn test_header_fields() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_opcode(OpCode::Reply);
        packet.set_hardware_type(1);
        packet.set_hardware_len(6);
        packet.set_transaction_id(0x12345678);
        packet.set_secs(0x0106);
        packet.set_flags(Flags::BROADCAST);
        packet.set_your_ip(Ipv4Address::new(10, 0, 0, 42));
        packet.client_hardware_address_mut()[..6]
            .copy_from_slice(&[0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

        let packet = Packet::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.opcode(), OpCode::Reply);
        assert_eq!(packet.hardware_type(), 1);
        assert_eq!(packet.transaction_id(), 0x12345678);
        assert_eq!(packet.secs(), 0x0106);
        assert_eq!(packet.flags(), Flags::BROADCAST);
        assert_eq!(packet.your_ip(), Ipv4Address::new(10, 0, 0, 42));
        assert_eq!(
            packet.client_hardware_address(),
            &[0x52, 0x54, 0x00, 0x12, 0x34, 0x56]
        );
        assert_eq!(&bytes[10..12], &[0x80, 0x00]);
    }

    #[test]
    fn test_check_len() {
        assert_eq!(Packet::new_checked(&[0u8; 239][..]), Err(Error));
        assert!(Packet::new_checked(&[0u8; 240][..]).is_ok());
    }

    #[test]
    fn test_store_then_fetch() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.store(OptionTag::MESSAGE_TYPE, &[5]).unwrap();
        packet
            .store(OptionTag::SERVER_IDENTIFIER, &[192, 168, 0, 1])
            .unwrap();
        packet.store(OptionTag::BOOTFILE_NAME, b"undionly.kpxe").unwrap();
        packet.store(OptionTag::EB_PRIORITY, &[0xfe]).unwrap();

        assert_eq!(packet.message_type(), Some(MessageType::Ack));
        assert_eq!(
            packet.server_identifier(),
            Some(Ipv4Address::new(192, 168, 0, 1))
        );
        let mut name = [0u8; 32];
        assert_eq!(packet.fetch(OptionTag::BOOTFILE_NAME, &mut name), Some(13));
        assert_eq!(&name[..13], b"undionly.kpxe");
        let mut priority = [0u8; 1];
        assert_eq!(packet.fetch(OptionTag::EB_PRIORITY, &mut priority), Some(1));
        assert_eq!(priority[0] as i8, -2);
        assert_eq!(packet.fetch(OptionTag::ROOT_PATH, &mut name), None);
    }

    #[test]
    fn test_fetch_reports_truncation() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.store(OptionTag::HOST_NAME, b"bootclient").unwrap();
        let mut short = [0u8; 4];
        assert_eq!(packet.fetch(OptionTag::HOST_NAME, &mut short), Some(10));
        assert_eq!(&short, b"boot");
    }

    #[test]
    fn test_store_replaces_in_place() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.store(OptionTag::MESSAGE_TYPE, &[0]).unwrap();
        packet.store(OptionTag::HOST_NAME, b"abc").unwrap();
        packet.store(OptionTag::MESSAGE_TYPE, &[3]).unwrap();
        assert_eq!(
            &packet.options()[..9],
            &[53, 1, 3, 12, 3, b'a', b'b', b'c', 255]
        );

        // Growing shifts the following options, shrinking pads the tail.
        packet.store(OptionTag::MESSAGE_TYPE, &[3, 3]).unwrap();
        assert_eq!(
            &packet.options()[..10],
            &[53, 2, 3, 3, 12, 3, b'a', b'b', b'c', 255]
        );
        packet.store(OptionTag::HOST_NAME, b"a").unwrap();
        assert_eq!(&packet.options()[..9], &[53, 2, 3, 3, 12, 1, b'a', 255, 0]);
        assert_eq!(packet.len(), 240 + 8);
    }

    #[test]
    fn test_store_encapsulated() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet
            .store(OptionTag::PXE_BOOT_MENU_ITEM, &[0x80, 0x01, 0, 0])
            .unwrap();
        packet.store(OptionTag::PXE_DISCOVERY_CONTROL, &[0x07]).unwrap();
        assert_eq!(
            &packet.options()[..13],
            &[43, 10, 71, 4, 0x80, 0x01, 0, 0, 6, 1, 0x07, 255, 255]
        );
        let mut item = [0u8; 4];
        assert_eq!(packet.fetch(OptionTag::PXE_BOOT_MENU_ITEM, &mut item), Some(4));
        assert_eq!(item, [0x80, 0x01, 0, 0]);
        assert_eq!(packet.option(OptionTag::PXE_BOOT_MENU), None);
    }

    #[test]
    fn test_store_no_space() {
        let mut bytes = [0u8; 246];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_magic_number(MAGIC_COOKIE);
        packet.store(OptionTag::MESSAGE_TYPE, &[1]).unwrap();
        // 3 octets of message type, 1 end tag, 2 free.
        assert_eq!(
            packet.store(OptionTag::CLIENT_NDI, &[1]),
            Err(crate::Error::NoSpace)
        );
        assert_eq!(&packet.options()[..4], &[53, 1, 1, 255]);
        assert_eq!(
            packet.store(OptionTag::HOST_NAME, &[0u8; 256]),
            Err(crate::Error::NoSpace)
        );
    }

    #[test]
    fn test_pseudo_options() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_your_ip(Ipv4Address::new(10, 1, 2, 3));
        packet.set_server_ip(Ipv4Address::new(10, 1, 2, 254));
        assert_eq!(packet.option(OptionTag::EB_YIADDR), Some(&[10, 1, 2, 3][..]));
        assert_eq!(
            packet.option(OptionTag::EB_SIADDR),
            Some(&[10, 1, 2, 254][..])
        );
    }

    #[test]
    fn test_missing_cookie_hides_options() {
        let mut bytes = blank();
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.store(OptionTag::MESSAGE_TYPE, &[2]).unwrap();
        packet.set_magic_number(0);
        assert_eq!(packet.message_type(), None);
    }

    #[test]
    fn test_parse_options_stops_on_truncation() {
        let data = [0, 0, 53, 1, 2, 12, 10, b'a'];
        let opts: Vec<_> = parse_options(&data).collect();
        assert_eq!(opts, vec![DhcpOption { kind: 53, data: &[2] }]);
    }

    #[test]
    fn test_message_type_opcode() {
        assert_eq!(MessageType::Discover.opcode(), OpCode::Request);
        assert_eq!(MessageType::Offer.opcode(), OpCode::Reply);
        assert_eq!(MessageType::Inform.opcode(), OpCode::Request);
        assert_eq!(MessageType::Nak.opcode(), OpCode::Reply);
        assert_eq!(MessageType::name(None), "BOOTP");
        assert_eq!(format!("{}", MessageType::Ack), "DHCPACK");
        assert_eq!(format!("{}", MessageType::from(42)), "DHCP<invalid>");
    }

    #[test]
    fn test_option_tag_display() {
        assert_eq!(format!("{}", OptionTag::PXE_BOOT_MENU_ITEM), "43.71");
        assert_eq!(format!("{}", OptionTag::SERVER_IDENTIFIER), "54");
        assert_eq!(OptionTag::EB_BUS_ID.encapsulator(), Some(175));
    }
}
