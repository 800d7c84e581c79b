use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::iface::Device;
use crate::wire::{
    DhcpMessageType, DhcpOpCode, DhcpOptionTag, Dhcpv4Packet, Ipv4Address, Ipv4Endpoint,
    DHCP_MAGIC_COOKIE, DHCP_MIN_LEN, DHCP_PXE_PORT, DHCP_SERVER_PORT,
};

pub(crate) const CLIENT_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];
pub(crate) const TXID: u32 = 0x12345678;

pub(crate) const MY_IP: Ipv4Address = Ipv4Address([192, 168, 1, 42]);
pub(crate) const OTHER_IP: Ipv4Address = Ipv4Address([192, 168, 1, 43]);
pub(crate) const SERVER_IP: Ipv4Address = Ipv4Address([192, 168, 1, 1]);
pub(crate) const OTHER_SERVER_IP: Ipv4Address = Ipv4Address([192, 168, 1, 2]);
pub(crate) const PROXY_IP: Ipv4Address = Ipv4Address([192, 168, 1, 10]);

pub(crate) fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn device() -> Rc<Device> {
    Rc::new(Device::ethernet("net0", CLIENT_MAC).unwrap())
}

pub(crate) fn from_server(addr: Ipv4Address) -> Ipv4Endpoint {
    Ipv4Endpoint::new(addr, DHCP_SERVER_PORT)
}

pub(crate) fn from_proxy(addr: Ipv4Address) -> Ipv4Endpoint {
    Ipv4Endpoint::new(addr, DHCP_PXE_PORT)
}

/// A server reply under construction.
pub(crate) struct Reply {
    bytes: Vec<u8>,
}

impl Reply {
    /// A reply to our transaction; `None` builds a plain BOOTP reply.
    pub(crate) fn new(message_type: Option<DhcpMessageType>) -> Reply {
        let mut bytes = vec![0u8; DHCP_MIN_LEN];
        let mut packet = Dhcpv4Packet::new_unchecked(&mut bytes[..]);
        packet.set_opcode(DhcpOpCode::Reply);
        packet.set_hardware_type(1);
        packet.set_hardware_len(6);
        packet.set_transaction_id(TXID);
        packet.set_magic_number(DHCP_MAGIC_COOKIE);
        packet.client_hardware_address_mut()[..6].copy_from_slice(&CLIENT_MAC);
        if let Some(message_type) = message_type {
            packet
                .store(DhcpOptionTag::MESSAGE_TYPE, &[message_type.into()])
                .unwrap();
        }
        Reply { bytes }
    }

    pub(crate) fn offer() -> Reply {
        Reply::new(Some(DhcpMessageType::Offer))
    }

    pub(crate) fn ack() -> Reply {
        Reply::new(Some(DhcpMessageType::Ack))
    }

    fn packet(&mut self) -> Dhcpv4Packet<&mut [u8]> {
        Dhcpv4Packet::new_unchecked(&mut self.bytes[..])
    }

    pub(crate) fn transaction_id(mut self, xid: u32) -> Reply {
        self.packet().set_transaction_id(xid);
        self
    }

    pub(crate) fn your_ip(mut self, addr: Ipv4Address) -> Reply {
        self.packet().set_your_ip(addr);
        self
    }

    pub(crate) fn option(mut self, tag: DhcpOptionTag, value: &[u8]) -> Reply {
        self.packet().store(tag, value).unwrap();
        self
    }

    pub(crate) fn server_id(self, addr: Ipv4Address) -> Reply {
        self.option(DhcpOptionTag::SERVER_IDENTIFIER, addr.as_bytes())
    }

    pub(crate) fn pxe_client(self) -> Reply {
        self.option(DhcpOptionTag::VENDOR_CLASS_ID, b"PXEClient")
    }

    pub(crate) fn priority(self, priority: i8) -> Reply {
        self.option(DhcpOptionTag::EB_PRIORITY, &[priority as u8])
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        let len = Dhcpv4Packet::new_unchecked(&self.bytes[..]).len();
        &self.bytes[..len]
    }
}
