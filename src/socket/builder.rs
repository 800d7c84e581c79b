use core::fmt::Write;
use heapless::{String, Vec};

use crate::iface::{Device, MAX_LL_ADDR_LEN};
use crate::settings::{self, Settings};
use crate::wire::dhcpv4::{field, MAX_CHADDR_LEN, MAX_MESSAGE_SIZE, MAX_OPTION_LEN};
use crate::wire::pxe::{ClientArch, NetworkInterface};
use crate::wire::{
    DhcpFlags, DhcpMessageType, DhcpOptionTag, Dhcpv4Packet, Ipv4Address, DHCP_MAGIC_COOKIE,
};
use crate::{Error, Result};

/// The boot firmware feature list carried in option 175.
///
/// Each entry is a sub-option of its own: PXE extensions, HTTP, TFTP, DNS,
/// PXE API, menus, and the firmware version (1.0.0).
pub const DEFAULT_FEATURES: &[u8] = &[
    0x10, 1, 1, // PXE extensions
    0x13, 1, 1, // HTTP
    0x15, 1, 1, // TFTP
    0x17, 1, 1, // DNS
    0x21, 1, 1, // PXE API
    0x27, 1, 1, // menu
    0xeb, 3, 1, 0, 0, // version
];

const MAX_REQUEST_OPTIONS_LEN: usize = 320;

const PARAMETER_REQUEST_LIST: &[u8] = &[
    field::OPT_SUBNET_MASK,
    field::OPT_ROUTERS,
    field::OPT_DNS_SERVERS,
    field::OPT_LOG_SERVERS,
    field::OPT_HOST_NAME,
    field::OPT_DOMAIN_NAME,
    field::OPT_ROOT_PATH,
    field::OPT_VENDOR_ENCAP,
    field::OPT_VENDOR_CLASS_ID,
    field::OPT_TFTP_SERVER_NAME,
    field::OPT_BOOTFILE_NAME,
    field::OPT_EB_ENCAP,
    field::OPT_ISCSI_INITIATOR_IQN,
];

/// What a client announces about itself in every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestConfig<'a> {
    pub client_arch: ClientArch,
    pub client_ndi: NetworkInterface,
    /// User class sent unless the `user-class` setting overrides it.
    pub user_class: &'a [u8],
    /// Body of option 175.
    pub features: &'a [u8],
}

impl Default for RequestConfig<'static> {
    fn default() -> Self {
        RequestConfig {
            client_arch: ClientArch::X86Bios,
            client_ndi: NetworkInterface::UNDI_2_1,
            user_class: b"xNBA",
            features: DEFAULT_FEATURES,
        }
    }
}

fn push_option<const N: usize>(buf: &mut Vec<u8, N>, code: u8, data: &[u8]) -> Result<()> {
    if data.len() > MAX_OPTION_LEN {
        return Err(Error::NoSpace);
    }
    buf.push(code).map_err(|_| Error::NoSpace)?;
    buf.push(data.len() as u8).map_err(|_| Error::NoSpace)?;
    buf.extend_from_slice(data).map_err(|_| Error::NoSpace)
}

/// Build the option block every request starts from.
///
/// The message type is a zero placeholder, overwritten by [create_packet].
pub fn request_options(config: &RequestConfig) -> Result<Vec<u8, MAX_REQUEST_OPTIONS_LEN>> {
    let arch: u16 = config.client_arch.into();
    let ndi = config.client_ndi;
    let mut vendor_class: String<32> = String::new();
    write!(
        &mut vendor_class,
        "PXEClient:Arch:{:05}:UNDI:{:03}{:03}",
        arch, ndi.major, ndi.minor
    )
    .map_err(|_| Error::NoSpace)?;

    let mut opts = Vec::new();
    push_option(&mut opts, field::OPT_MESSAGE_TYPE, &[0])?;
    push_option(
        &mut opts,
        field::OPT_MAX_MESSAGE_SIZE,
        &MAX_MESSAGE_SIZE.to_be_bytes(),
    )?;
    push_option(&mut opts, field::OPT_CLIENT_ARCHITECTURE, &arch.to_be_bytes())?;
    push_option(&mut opts, field::OPT_CLIENT_NDI, &ndi.as_bytes())?;
    push_option(&mut opts, field::OPT_VENDOR_CLASS_ID, vendor_class.as_bytes())?;
    push_option(&mut opts, field::OPT_USER_CLASS_ID, config.user_class)?;
    push_option(
        &mut opts,
        field::OPT_PARAMETER_REQUEST_LIST,
        PARAMETER_REQUEST_LIST,
    )?;
    opts.push(field::OPT_END).map_err(|_| Error::NoSpace)?;
    Ok(opts)
}

/// Fill `chaddr` with the client hardware address of `device`.
///
/// Returns the hardware address length and the flags the packet must carry.
/// A link-layer address too wide for the field is replaced by an
/// Ethernet-compatible one or the hardware address, and the packet then asks
/// the server for broadcast replies.
pub fn chaddr(device: &Device, chaddr: &mut [u8]) -> (u8, DhcpFlags) {
    let ll_addr = device.ll_addr();
    if ll_addr.len() <= MAX_CHADDR_LEN {
        chaddr[..ll_addr.len()].copy_from_slice(ll_addr);
        return (ll_addr.len() as u8, DhcpFlags::empty());
    }

    let flags = DhcpFlags::BROADCAST;
    if let Some(eth_addr) = device.eth_addr() {
        chaddr[..eth_addr.len()].copy_from_slice(&eth_addr);
        return (eth_addr.len() as u8, flags);
    }
    let hw_addr = device.hw_addr();
    if hw_addr.len() <= MAX_CHADDR_LEN {
        chaddr[..hw_addr.len()].copy_from_slice(hw_addr);
        return (hw_addr.len() as u8, flags);
    }
    (0, flags)
}

/// Construct a packet of type `message_type` in `buffer`.
///
/// The buffer is zeroed and the fixed header, the magic cookie and the
/// option block `options` are laid down. Fails with `NoSpace` if the buffer
/// cannot hold the header and `options`.
pub fn create_packet<'b>(
    device: &Device,
    message_type: DhcpMessageType,
    transaction_id: u32,
    options: &[u8],
    buffer: &'b mut [u8],
) -> Result<Dhcpv4Packet<&'b mut [u8]>> {
    if buffer.len() < field::OPTIONS.start + options.len() {
        return Err(Error::NoSpace);
    }
    buffer.fill(0);

    let link_protocol: u16 = device.link_protocol().into();
    let mut packet = Dhcpv4Packet::new_unchecked(buffer);
    packet.set_opcode(message_type.opcode());
    packet.set_hardware_type(link_protocol as u8);
    let (hlen, flags) = chaddr(device, packet.client_hardware_address_mut());
    packet.set_hardware_len(hlen);
    packet.set_flags(flags);
    packet.set_transaction_id(transaction_id);
    packet.set_magic_number(DHCP_MAGIC_COOKIE);
    packet.options_mut()[..options.len()].copy_from_slice(options);
    packet.store(DhcpOptionTag::MESSAGE_TYPE, &[message_type.into()])?;
    Ok(packet)
}

/// Construct a client request: [create_packet] with the common request
/// options, plus the client address and the identification options.
pub fn create_request<'b>(
    device: &Device,
    settings: &dyn Settings,
    config: &RequestConfig,
    message_type: DhcpMessageType,
    transaction_id: u32,
    client_ip: Ipv4Address,
    buffer: &'b mut [u8],
) -> Result<Dhcpv4Packet<&'b mut [u8]>> {
    let options = request_options(config)?;
    let mut packet = create_packet(device, message_type, transaction_id, &options, buffer)?;
    packet.set_client_ip(client_ip);

    packet
        .store(DhcpOptionTag::EB_ENCAP, config.features)
        .map_err(|err| {
            net_debug!("DHCP could not set features list option: {}", err);
            err
        })?;
    packet
        .store(DhcpOptionTag::EB_BUS_ID, &device.bus_id().emit())
        .map_err(|err| {
            net_debug!("DHCP could not set bus ID option: {}", err);
            err
        })?;

    let link_protocol: u16 = device.link_protocol().into();
    let mut client_id: Vec<u8, { 1 + MAX_LL_ADDR_LEN }> = Vec::new();
    client_id
        .push(link_protocol as u8)
        .map_err(|_| Error::NoSpace)?;
    client_id
        .extend_from_slice(device.ll_addr())
        .map_err(|_| Error::NoSpace)?;
    packet
        .store(DhcpOptionTag::CLIENT_ID, &client_id)
        .map_err(|err| {
            net_debug!("DHCP could not set client ID: {}", err);
            err
        })?;

    // UUID option is a type octet followed by the UUID itself.
    let mut uuid = [0u8; 17];
    if settings.fetch(None, &settings::UUID, &mut uuid[1..]).is_some() {
        packet
            .store(DhcpOptionTag::CLIENT_UUID, &uuid)
            .map_err(|err| {
                net_debug!("DHCP could not set client UUID: {}", err);
                err
            })?;
    }

    let mut user_class = [0u8; MAX_OPTION_LEN];
    if let Some(len) = settings.fetch(None, &settings::USER_CLASS, &mut user_class) {
        packet
            .store(
                DhcpOptionTag::USER_CLASS_ID,
                &user_class[..len.min(MAX_OPTION_LEN)],
            )
            .map_err(|err| {
                net_debug!("DHCP could not set user class: {}", err);
                err
            })?;
    }

    Ok(packet)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::iface::{BusId, BusType, LinkProtocol};
    use crate::settings::MemorySettings;
    use crate::wire::{DhcpOpCode, DHCP_MIN_LEN};

    const MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

    fn device() -> Device {
        Device::ethernet("net0", MAC).unwrap().with_bus_id(BusId {
            bus_type: BusType::Pci,
            vendor: 0x8086,
            device: 0x100e,
        })
    }

    #[test]
    fn test_request_options() {
        let opts = request_options(&RequestConfig::default()).unwrap();
        assert_eq!(
            &opts[..17],
            &[53, 1, 0, 57, 2, 0x05, 0xc0, 93, 2, 0, 0, 94, 3, 1, 2, 1, 60]
        );
        assert_eq!(&opts[18..18 + 32], b"PXEClient:Arch:00000:UNDI:002001");
        assert_eq!(&opts[50..56], &[77, 4, b'x', b'N', b'B', b'A']);
        assert_eq!(&opts[56..58], &[55, 13]);
        assert_eq!(*opts.last().unwrap(), 255);
    }

    #[test]
    fn test_vendor_class_follows_arch() {
        let config = RequestConfig {
            client_arch: ClientArch::EfiX86_64,
            ..RequestConfig::default()
        };
        let opts = request_options(&config).unwrap();
        assert_eq!(&opts[18..18 + 32], b"PXEClient:Arch:00007:UNDI:002001");
    }

    #[test]
    fn test_chaddr_fits() {
        let mut field = [0u8; 16];
        assert_eq!(chaddr(&device(), &mut field), (6, DhcpFlags::empty()));
        assert_eq!(&field[..6], &MAC);
    }

    #[test]
    fn test_chaddr_too_wide() {
        let ll_addr = [0xaa; 20];
        let mut field = [0u8; 16];

        let dev = Device::new("ib0", LinkProtocol::Infiniband, &ll_addr, &[1; 8])
            .unwrap()
            .with_eth_addr([2, 0, 0, 0, 0, 9]);
        assert_eq!(chaddr(&dev, &mut field), (6, DhcpFlags::BROADCAST));
        assert_eq!(&field[..6], &[2, 0, 0, 0, 0, 9]);

        let dev = Device::new("ib0", LinkProtocol::Infiniband, &ll_addr, &[1; 8]).unwrap();
        assert_eq!(chaddr(&dev, &mut field), (8, DhcpFlags::BROADCAST));

        let dev = Device::new("ib0", LinkProtocol::Infiniband, &ll_addr, &ll_addr).unwrap();
        assert_eq!(chaddr(&dev, &mut field), (0, DhcpFlags::BROADCAST));
    }

    #[test]
    fn test_create_packet_exact_fit() {
        let opts = request_options(&RequestConfig::default()).unwrap();
        let mut buffer = vec![0xffu8; 240 + opts.len()];
        let packet = create_packet(
            &device(),
            DhcpMessageType::Discover,
            0x12345678,
            &opts,
            &mut buffer[..],
        )
        .unwrap();
        assert_eq!(packet.message_type(), Some(DhcpMessageType::Discover));
        assert_eq!(packet.opcode(), DhcpOpCode::Request);
        assert_eq!(packet.hardware_type(), 1);
        assert_eq!(packet.client_hardware_address(), &MAC);
        assert_eq!(packet.transaction_id(), 0x12345678);
        assert_eq!(packet.len(), 240 + opts.len());

        let mut buffer = vec![0u8; 240 + opts.len() - 1];
        assert_eq!(
            create_packet(
                &device(),
                DhcpMessageType::Discover,
                0,
                &opts,
                &mut buffer[..]
            )
            .err(),
            Some(Error::NoSpace)
        );
    }

    #[test]
    fn test_create_packet_reply_opcode() {
        let mut buffer = [0u8; 300];
        let packet = create_packet(
            &device(),
            DhcpMessageType::Ack,
            1,
            &[53, 1, 0, 255],
            &mut buffer[..],
        )
        .unwrap();
        assert_eq!(packet.opcode(), DhcpOpCode::Reply);
    }

    #[test]
    fn test_create_request() {
        let mut settings = MemorySettings::new();
        settings.set(None, &settings::UUID, &[0x11; 16]).unwrap();
        settings.set(None, &settings::USER_CLASS, b"lab").unwrap();

        let mut buffer = [0u8; DHCP_MIN_LEN];
        let packet = create_request(
            &device(),
            &settings,
            &RequestConfig::default(),
            DhcpMessageType::Request,
            0xdeadbeef,
            Ipv4Address::new(10, 0, 0, 7),
            &mut buffer[..],
        )
        .unwrap();

        assert_eq!(packet.client_ip(), Ipv4Address::new(10, 0, 0, 7));
        assert_eq!(packet.message_type(), Some(DhcpMessageType::Request));
        assert_eq!(
            packet.option(DhcpOptionTag::CLIENT_ID),
            Some(&[1, 0x52, 0x54, 0x00, 0x12, 0x34, 0x56][..])
        );
        assert_eq!(
            packet.option(DhcpOptionTag::EB_BUS_ID),
            Some(&[1, 0x80, 0x86, 0x10, 0x0e][..])
        );
        assert_eq!(
            packet.option(DhcpOptionTag::encap(field::OPT_EB_ENCAP, 0xeb)),
            Some(&[1, 0, 0][..])
        );
        let uuid = packet.option(DhcpOptionTag::CLIENT_UUID).unwrap();
        assert_eq!(uuid.len(), 17);
        assert_eq!(uuid[0], 0);
        assert_eq!(&uuid[1..], &[0x11; 16]);
        assert_eq!(packet.option(DhcpOptionTag::USER_CLASS_ID), Some(&b"lab"[..]));
    }

    #[test]
    fn test_create_request_without_settings() {
        let settings = MemorySettings::new();
        let mut buffer = [0u8; DHCP_MIN_LEN];
        let packet = create_request(
            &device(),
            &settings,
            &RequestConfig::default(),
            DhcpMessageType::Discover,
            1,
            Ipv4Address::UNSPECIFIED,
            &mut buffer[..],
        )
        .unwrap();
        assert_eq!(packet.option(DhcpOptionTag::CLIENT_UUID), None);
        assert_eq!(packet.option(DhcpOptionTag::USER_CLASS_ID), Some(&b"xNBA"[..]));
    }
}
