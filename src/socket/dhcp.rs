#[cfg(feature = "async")]
use core::task::Waker;

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::iface::{Context, Device};
use crate::settings::{self, Layer, Settings};
use crate::time::{Duration, Instant};
use crate::wire::pxe::{self, BootMenuItem, DiscoveryControl};
use crate::wire::{
    DhcpMessageType, DhcpOptionTag, Dhcpv4Packet, Ipv4Address, Ipv4Endpoint, DHCP_CLIENT_PORT,
    DHCP_MIN_LEN, DHCP_PXE_PORT, DHCP_SERVER_PORT,
};
use crate::{Error, Result};

#[cfg(feature = "async")]
use super::WakerRegistration;

use super::builder::{self, RequestConfig};
use super::retry::{Expiry, RetryConfig, RetryTimer};
use super::PollAt;

/// The ordinary offer a session requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Offer {
    address: Ipv4Address,
    server: Ipv4Address,
    /// The offering server told us to skip ProxyDHCP.
    no_pxedhcp: bool,
}

/// A ProxyDHCP offer. The packet is kept whole, since it may end up
/// published as the `proxydhcp` settings layer.
#[derive(Debug)]
struct ProxyOffer {
    server: Ipv4Address,
    packet: Vec<u8>,
}

impl ProxyOffer {
    fn new(server: Ipv4Address, payload: &[u8]) -> Result<ProxyOffer> {
        let mut packet = Vec::new();
        packet
            .try_reserve_exact(payload.len())
            .map_err(|_| Error::NoMemory)?;
        packet.extend_from_slice(payload);
        Ok(ProxyOffer { server, packet })
    }

    /// Query whether the offer already carries PXE boot options.
    fn has_pxe_options(&self) -> bool {
        has_pxe_options(&Dhcpv4Packet::new_unchecked(&self.packet[..]))
    }
}

fn has_pxe_options<T: AsRef<[u8]>>(packet: &Dhcpv4Packet<T>) -> bool {
    packet.option(DhcpOptionTag::BOOTFILE_NAME).is_some()
        || packet.option(DhcpOptionTag::PXE_BOOT_MENU).is_some()
}

#[derive(Debug, Default)]
struct DiscoverState {
    /// Best ordinary offer so far.
    offer: Option<Offer>,
    /// Priority of `offer`; later offers must match or beat it.
    priority: i8,
    /// Best ProxyDHCP offer so far.
    proxy: Option<ProxyOffer>,
    proxy_priority: i8,
}

#[derive(Debug)]
struct RequestState {
    offer: Offer,
    proxy: Option<ProxyOffer>,
}

#[derive(Debug)]
struct ProxyRequestState {
    proxy: ProxyOffer,
}

#[derive(Debug)]
struct BootServerState {
    server_type: u16,
    /// Addresses to try, in order. Never empty.
    attempts: Vec<Ipv4Address>,
    attempt: usize,
    /// When present, only replies from these servers are accepted.
    accept: Option<Vec<Ipv4Address>>,
}

impl BootServerState {
    fn destination(&self) -> Ipv4Endpoint {
        let addr = self.attempts[self.attempt];
        let port = match addr.is_broadcast() {
            true => DHCP_SERVER_PORT,
            false => DHCP_PXE_PORT,
        };
        Ipv4Endpoint::new(addr, port)
    }

    fn accepts(&self, server: Ipv4Address) -> bool {
        match &self.accept {
            None => true,
            Some(accept) => accept.contains(&server),
        }
    }
}

#[derive(Debug)]
enum ClientState {
    /// Broadcasting DHCPDISCOVER and collecting offers.
    Discover(DiscoverState),
    /// Requesting the chosen offer.
    Request(RequestState),
    /// Asking the ProxyDHCP server for its PXE options.
    ProxyRequest(ProxyRequestState),
    /// Asking PXE boot servers of one type, one address at a time.
    BootServer(BootServerState),
}

impl ClientState {
    fn name(&self) -> &'static str {
        match self {
            ClientState::Discover(_) => "discovery",
            ClientState::Request(_) => "request",
            ClientState::ProxyRequest(_) => "ProxyDHCP",
            ClientState::BootServer(_) => "PXEBS",
        }
    }

    fn message_type(&self) -> DhcpMessageType {
        match self {
            ClientState::Discover(_) => DhcpMessageType::Discover,
            _ => DhcpMessageType::Request,
        }
    }

    fn applies_min_timeout(&self) -> bool {
        matches!(self, ClientState::Discover(_) | ClientState::BootServer(_))
    }

    /// Low bits of the `secs` field: whether an ordinary and a ProxyDHCP
    /// offer are held.
    fn secs_flags(&self) -> u16 {
        let (offer, proxy) = match self {
            ClientState::Discover(state) => (state.offer.is_some(), state.proxy.is_some()),
            ClientState::Request(state) => (true, state.proxy.is_some()),
            ClientState::ProxyRequest(_) => (true, true),
            ClientState::BootServer(_) => (false, false),
        };
        (if offer { 0x02 } else { 0 }) | (if proxy { 0x01 } else { 0 })
    }
}

/// A received packet that passed the transaction id check.
struct Reply<'p> {
    src: Ipv4Endpoint,
    payload: &'p [u8],
    message_type: Option<DhcpMessageType>,
    /// Server identifier option, unspecified when absent.
    server_id: Ipv4Address,
}

impl<'p> Reply<'p> {
    fn packet(&self) -> Dhcpv4Packet<&'p [u8]> {
        Dhcpv4Packet::new_unchecked(self.payload)
    }
}

enum Transition {
    Stay,
    Enter(ClientState),
    /// Re-enter the current state, resetting its clock and timer.
    Restart,
    Finish(Result<()>),
}

fn register(
    cx: &mut Context,
    layer: Layer,
    parent: Option<&Device>,
    payload: &[u8],
) -> Result<()> {
    cx.settings()
        .register(layer, parent, payload)
        .map_err(|err| {
            net_debug!("DHCP could not register {} settings: {}", layer, err);
            err
        })
}

impl DiscoverState {
    fn receive(&mut self, config: &RetryConfig, elapsed: Duration, reply: &Reply) -> Result<Transition> {
        let packet = reply.packet();
        let address = packet.your_ip();
        let has_pxeclient = packet
            .option(DhcpOptionTag::VENDOR_CLASS_ID)
            .map_or(false, pxe::is_pxe_client);
        let priority = packet
            .option(DhcpOptionTag::EB_PRIORITY)
            .and_then(|data| data.first())
            .map_or(0, |&priority| priority as i8);
        let no_pxedhcp = packet
            .option(DhcpOptionTag::EB_NO_PXEDHCP)
            .and_then(|data| data.first())
            .map_or(false, |&flag| flag != 0);
        net_debug!(
            "DHCP {} from {} ({}) for {}{} pri {}{}",
            DhcpMessageType::name(reply.message_type),
            reply.src,
            reply.server_id,
            address,
            match (has_pxeclient, has_pxe_options(&packet)) {
                (false, _) => "",
                (true, true) => " pxe",
                (true, false) => " proxy",
            },
            priority,
            if no_pxedhcp { " nopxe" } else { "" }
        );

        if !address.is_unspecified()
            && reply.src.port == DHCP_SERVER_PORT
            && matches!(reply.message_type, None | Some(DhcpMessageType::Offer))
            && priority >= self.priority
        {
            self.offer = Some(Offer {
                address,
                server: reply.server_id,
                no_pxedhcp,
            });
            self.priority = priority;
        }

        if !reply.server_id.is_unspecified() && has_pxeclient && priority >= self.proxy_priority {
            // Replacing drops the previously held copy.
            self.proxy = Some(ProxyOffer::new(reply.server_id, reply.payload)?);
            self.proxy_priority = priority;
        }

        let offer = match self.offer {
            Some(offer) => offer,
            None => return Ok(Transition::Stay),
        };
        if offer.no_pxedhcp || self.proxy.is_some() || elapsed > config.proxy_wait {
            Ok(self.request(offer))
        } else {
            Ok(Transition::Stay)
        }
    }

    fn expire(&mut self, config: &RetryConfig, elapsed: Duration) -> Option<Transition> {
        match self.offer {
            Some(offer) if elapsed > config.proxy_wait => Some(self.request(offer)),
            _ => None,
        }
    }

    fn request(&mut self, offer: Offer) -> Transition {
        Transition::Enter(ClientState::Request(RequestState {
            offer,
            proxy: self.proxy.take(),
        }))
    }
}

impl RequestState {
    fn receive(
        &mut self,
        cx: &mut Context,
        device: &Device,
        local: &mut Ipv4Endpoint,
        reply: &Reply,
    ) -> Transition {
        let address = reply.packet().your_ip();
        net_debug!(
            "DHCP {} from {} ({}) for {}",
            DhcpMessageType::name(reply.message_type),
            reply.src,
            reply.server_id,
            address
        );

        if reply.src.port != DHCP_SERVER_PORT
            || !matches!(reply.message_type, None | Some(DhcpMessageType::Ack))
            || reply.server_id != self.offer.server
            || address != self.offer.address
        {
            return Transition::Stay;
        }

        local.addr = address;
        if let Err(err) = register(cx, Layer::Dhcp, Some(device), reply.payload) {
            return Transition::Finish(Err(err));
        }

        match self.proxy.take() {
            Some(proxy) if !self.offer.no_pxedhcp => {
                if !proxy.has_pxe_options() {
                    return Transition::Enter(ClientState::ProxyRequest(ProxyRequestState { proxy }));
                }
                Transition::Finish(register(cx, Layer::ProxyDhcp, None, &proxy.packet))
            }
            _ => Transition::Finish(Ok(())),
        }
    }
}

impl ProxyRequestState {
    fn receive(&mut self, cx: &mut Context, reply: &Reply) -> Transition {
        net_debug!(
            "DHCP {} from {} ({})",
            DhcpMessageType::name(reply.message_type),
            reply.src,
            reply.server_id
        );

        // Some ProxyDHCP servers omit the server identifier.
        if reply.src.port != DHCP_PXE_PORT
            || !matches!(
                reply.message_type,
                Some(DhcpMessageType::Offer) | Some(DhcpMessageType::Ack)
            )
            || (!reply.server_id.is_unspecified() && reply.server_id != self.proxy.server)
        {
            return Transition::Stay;
        }

        Transition::Finish(register(cx, Layer::ProxyDhcp, None, reply.payload))
    }
}

impl BootServerState {
    fn receive(&mut self, cx: &mut Context, reply: &Reply) -> Transition {
        let menu_item = reply
            .packet()
            .option(DhcpOptionTag::PXE_BOOT_MENU_ITEM)
            .and_then(|data| BootMenuItem::parse(data).ok())
            .unwrap_or_default();
        net_debug!(
            "DHCP {} from {} ({}) for type {}",
            DhcpMessageType::name(reply.message_type),
            reply.src,
            reply.server_id,
            menu_item.server_type
        );

        if reply.src.port != DHCP_SERVER_PORT && reply.src.port != DHCP_PXE_PORT {
            return Transition::Stay;
        }
        if reply.message_type != Some(DhcpMessageType::Ack) {
            return Transition::Stay;
        }
        if menu_item.server_type != self.server_type {
            return Transition::Stay;
        }
        let server = match reply.server_id.is_unspecified() {
            true => reply.src.addr,
            false => reply.server_id,
        };
        if !self.accepts(server) {
            net_debug!("DHCP rejecting server {}", server);
            return Transition::Stay;
        }

        Transition::Finish(register(cx, Layer::PxeBootServer, None, reply.payload))
    }

    fn expire(&mut self, config: &RetryConfig, elapsed: Duration) -> Option<Transition> {
        if elapsed <= config.pxebs_wait {
            return None;
        }
        self.attempt += 1;
        if self.attempt < self.attempts.len() {
            Some(Transition::Restart)
        } else {
            Some(Transition::Finish(Err(Error::TimedOut)))
        }
    }
}

/// Return value for the `Session::poll` function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The exchange finished and its settings are published.
    Completed,
    /// The exchange was abandoned.
    Failed(Error),
}

/// A datagram a session wants sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Datagram<'p> {
    pub src: Ipv4Endpoint,
    pub dst: Ipv4Endpoint,
    pub payload: &'p [u8],
}

/// Outcome of starting DHCP on a device.
#[derive(Debug)]
pub enum Start<'a> {
    /// A session was created and must be driven until it finishes.
    Started(Session<'a>),
    /// The device is already configured from cached settings.
    Cached,
}

/// A DHCP client session.
///
/// A session is a single exchange: DHCP address acquisition (optionally
/// followed by ProxyDHCP), or PXE boot server discovery. It owns no socket
/// and no clock; received datagrams go in through `process`, transmissions
/// come out of `dispatch`, and `poll_at` tells when `dispatch` next needs to
/// be called. When the session finishes, `poll` returns an `Event` once and
/// the session does nothing further.
#[derive(Debug)]
pub struct Session<'a> {
    device: Rc<Device>,
    state: ClientState,
    transaction_id: u32,
    local: Ipv4Endpoint,
    /// When the current state was entered.
    start: Instant,
    /// Packets transmitted so far.
    count: u16,
    timer: RetryTimer,
    retry_config: RetryConfig,
    request_config: RequestConfig<'a>,
    /// Set once the session finishes.
    result: Option<Result<()>>,
    event_pending: bool,

    #[cfg(feature = "async")]
    waker: WakerRegistration,
}

impl<'a> Session<'a> {
    fn new(
        cx: &mut Context,
        device: Rc<Device>,
        local_addr: Ipv4Address,
        state: ClientState,
    ) -> Session<'a> {
        let retry_config = RetryConfig::default();
        let mut session = Session {
            device,
            state,
            transaction_id: Self::random_transaction_id(cx),
            local: Ipv4Endpoint::new(local_addr, DHCP_CLIENT_PORT),
            start: cx.now(),
            count: 0,
            timer: RetryTimer::new(retry_config.min_timeout, retry_config.max_timeout),
            retry_config,
            request_config: RequestConfig::default(),
            result: None,
            event_pending: false,
            #[cfg(feature = "async")]
            waker: WakerRegistration::new(),
        };
        session.enter_state(cx.now());
        session
    }

    /// Start DHCP on `device`.
    ///
    /// Returns `Start::Cached` without creating a session when the
    /// `use-cached` setting is set.
    pub fn start_dhcp(cx: &mut Context, device: Rc<Device>) -> Result<Start<'a>> {
        if cx.settings().fetch_uint(None, &settings::USE_CACHED) != 0 {
            net_debug!("DHCP {} using cached network settings", device);
            return Ok(Start::Cached);
        }
        let session = Session::new(
            cx,
            device,
            Ipv4Address::UNSPECIFIED,
            ClientState::Discover(DiscoverState::default()),
        );
        net_debug!(
            "DHCP {:08x} starting on {}",
            session.transaction_id,
            session.device
        );
        Ok(Start::Started(session))
    }

    /// Start PXE boot server discovery for boot servers of type
    /// `server_type`.
    ///
    /// The servers to try come from the PXE discovery control, multicast
    /// address and boot server list settings. Fails with `InvalidArgument`
    /// when that leaves nothing to try.
    pub fn start_pxebs(
        cx: &mut Context,
        device: Rc<Device>,
        server_type: u16,
    ) -> Result<Session<'a>> {
        let store = cx.settings();
        let control = DiscoveryControl::from_bits_truncate(
            store.fetch_uint(None, &settings::PXE_DISCOVERY_CONTROL) as u8,
        );
        let mcast = store
            .fetch_ipv4(None, &settings::PXE_BOOT_SERVER_MCAST)
            .unwrap_or(Ipv4Address::UNSPECIFIED);
        let local_addr = store
            .fetch_ipv4(Some(&*device), &settings::IP)
            .unwrap_or(Ipv4Address::UNSPECIFIED);

        let servers_len = store
            .fetch_len(None, &settings::PXE_BOOT_SERVERS)
            .unwrap_or(0);
        let mut servers = Vec::new();
        servers
            .try_reserve_exact(servers_len)
            .map_err(|_| Error::NoMemory)?;
        servers.resize(servers_len, 0);
        store.fetch(None, &settings::PXE_BOOT_SERVERS, &mut servers);

        // Every listed address takes at least four octets.
        let mut attempts = Vec::new();
        attempts
            .try_reserve_exact(2 + servers_len / 4)
            .map_err(|_| Error::NoMemory)?;
        if !control.contains(DiscoveryControl::NO_MULTICAST) && !mcast.is_unspecified() {
            attempts.push(mcast);
        }
        if !control.contains(DiscoveryControl::NO_BROADCAST) {
            attempts.push(Ipv4Address::BROADCAST);
        }
        let known = attempts.len();
        for entry in pxe::boot_servers(&servers) {
            match entry {
                Ok(server) if server.server_type == server_type => {
                    attempts.extend(server.addresses());
                    // An unspecified address ends the list.
                    if server.is_terminated() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => {
                    net_debug!("DHCP {} found malformed PXE boot server list", device);
                    break;
                }
            }
        }

        let accept = if control.contains(DiscoveryControl::NO_UNKNOWN_SERVERS) {
            let mut accept = Vec::new();
            accept
                .try_reserve_exact(attempts.len() - known)
                .map_err(|_| Error::NoMemory)?;
            accept.extend_from_slice(&attempts[known..]);
            Some(accept)
        } else {
            None
        };

        if attempts.is_empty() {
            net_debug!(
                "DHCP {} has no PXE boot servers for type {:04x}",
                device,
                server_type
            );
            return Err(Error::InvalidArgument);
        }
        for addr in attempts.iter() {
            net_debug!("DHCP {} PXEBS type {:04x} attempting {}", device, server_type, addr);
        }
        if let Some(accept) = &accept {
            for addr in accept.iter() {
                net_debug!("DHCP {} PXEBS type {:04x} accepting {}", device, server_type, addr);
            }
        }

        let state = ClientState::BootServer(BootServerState {
            server_type,
            attempts,
            attempt: 0,
            accept,
        });
        Ok(Session::new(cx, device, local_addr, state))
    }

    /// Set the retry/timeouts configuration.
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = config;
        self.update_bounds();
    }

    /// Set what the session announces about the client.
    pub fn set_request_config(&mut self, config: RequestConfig<'a>) {
        self.request_config = config;
    }

    pub fn device(&self) -> &Rc<Device> {
        &self.device
    }

    pub fn transaction_id(&self) -> u32 {
        self.transaction_id
    }

    /// The local endpoint; the address is unspecified until a lease is
    /// acknowledged.
    pub fn local_endpoint(&self) -> Ipv4Endpoint {
        self.local
    }

    /// Name of the current state, for diagnostics.
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// The result the session finished with, if it has.
    pub fn result(&self) -> Option<Result<()>> {
        self.result
    }

    #[cfg(not(test))]
    fn random_transaction_id(cx: &mut Context) -> u32 {
        cx.rand().rand_u32()
    }

    #[cfg(test)]
    fn random_transaction_id(_cx: &mut Context) -> u32 {
        0x12345678
    }

    fn update_bounds(&mut self) {
        let min_timeout = match self.state.applies_min_timeout() {
            true => self.retry_config.min_timeout,
            false => self.retry_config.default_min_timeout,
        };
        self.timer
            .set_bounds(min_timeout, self.retry_config.max_timeout);
    }

    fn enter_state(&mut self, now: Instant) {
        net_debug!(
            "DHCP {:08x} entering {} state",
            self.transaction_id,
            self.state.name()
        );
        self.start = now;
        self.timer.stop();
        self.update_bounds();
        self.timer.start_nodelay(now);
    }

    fn apply(&mut self, now: Instant, transition: Transition) {
        match transition {
            Transition::Stay => {}
            Transition::Enter(state) => {
                self.state = state;
                self.enter_state(now);
            }
            Transition::Restart => self.enter_state(now),
            Transition::Finish(result) => self.finish(result),
        }
    }

    fn finish(&mut self, result: Result<()>) {
        match result {
            Ok(()) => net_debug!("DHCP {:08x} finished", self.transaction_id),
            Err(err) => net_debug!("DHCP {:08x} failed: {}", self.transaction_id, err),
        }
        self.timer.stop();
        self.result = Some(result);
        self.event_pending = true;
        #[cfg(feature = "async")]
        self.waker.wake_all();
    }

    /// Abandon the session. It finishes with `Error::Canceled` unless it
    /// has already finished.
    pub fn close(&mut self) {
        if self.result.is_none() {
            self.finish(Err(Error::Canceled));
        }
    }

    /// Return when the session next needs `dispatch`.
    pub fn poll_at(&self) -> PollAt {
        match self.timer.expires_at() {
            Some(at) if self.result.is_none() => PollAt::Time(at),
            _ => PollAt::Ingress,
        }
    }

    /// Handle a datagram received on the client port.
    ///
    /// Foreign and unacceptable packets are dropped. Fails only when a
    /// ProxyDHCP offer worth keeping cannot be copied.
    pub fn process(&mut self, cx: &mut Context, src: Ipv4Endpoint, payload: &[u8]) -> Result<()> {
        if self.result.is_some() {
            return Ok(());
        }
        let packet = match Dhcpv4Packet::new_checked(payload) {
            Ok(packet) => packet,
            Err(_) => {
                net_debug!("DHCP {:08x} received truncated packet from {}", self.transaction_id, src);
                return Ok(());
            }
        };
        let reply = Reply {
            src,
            payload,
            message_type: packet.message_type(),
            server_id: packet
                .server_identifier()
                .unwrap_or(Ipv4Address::UNSPECIFIED),
        };
        if packet.transaction_id() != self.transaction_id {
            net_debug!(
                "DHCP {:08x} {} from {} has bad transaction ID {:08x}",
                self.transaction_id,
                DhcpMessageType::name(reply.message_type),
                src,
                packet.transaction_id()
            );
            return Ok(());
        }

        let now = cx.now();
        let elapsed = now - self.start;
        let transition = match &mut self.state {
            ClientState::Discover(state) => state.receive(&self.retry_config, elapsed, &reply)?,
            ClientState::Request(state) => state.receive(cx, &self.device, &mut self.local, &reply),
            ClientState::ProxyRequest(state) => state.receive(cx, &reply),
            ClientState::BootServer(state) => state.receive(cx, &reply),
        };
        self.apply(now, transition);
        Ok(())
    }

    /// Handle timer expiry, transmitting through `emit` when due.
    ///
    /// The retry timer is re-armed before the packet is built, so a failed
    /// transmission is retried on the next expiry.
    pub fn dispatch<F, E>(&mut self, cx: &mut Context, emit: F) -> core::result::Result<(), E>
    where
        F: FnOnce(&mut Context, Datagram) -> core::result::Result<(), E>,
    {
        if self.result.is_some() {
            return Ok(());
        }
        let now = cx.now();
        match self.timer.poll(now) {
            None => return Ok(()),
            Some(Expiry::Fail) => {
                self.finish(Err(Error::TimedOut));
                return Ok(());
            }
            Some(Expiry::Retry) => {}
        }

        let elapsed = now - self.start;
        let transition = match &mut self.state {
            ClientState::Discover(state) => state.expire(&self.retry_config, elapsed),
            ClientState::Request(_) => None,
            ClientState::ProxyRequest(_) if elapsed > self.retry_config.proxy_wait => {
                Some(Transition::Finish(Ok(())))
            }
            ClientState::ProxyRequest(_) => None,
            ClientState::BootServer(state) => state.expire(&self.retry_config, elapsed),
        };
        match transition {
            // A newly entered state is due at once.
            Some(transition) => {
                self.apply(now, transition);
                self.dispatch(cx, emit)
            }
            None => self.transmit(cx, emit),
        }
    }

    fn transmit<F, E>(&mut self, cx: &mut Context, emit: F) -> core::result::Result<(), E>
    where
        F: FnOnce(&mut Context, Datagram) -> core::result::Result<(), E>,
    {
        self.timer.start(cx.now());

        let mut buffer = [0u8; DHCP_MIN_LEN];
        let (dst, len) = {
            let mut packet = match builder::create_request(
                &self.device,
                cx.settings(),
                &self.request_config,
                self.state.message_type(),
                self.transaction_id,
                self.local.addr,
                &mut buffer[..],
            ) {
                Ok(packet) => packet,
                Err(err) => {
                    net_debug!(
                        "DHCP {:08x} could not construct DHCP request: {}",
                        self.transaction_id,
                        err
                    );
                    return Ok(());
                }
            };

            self.count = self.count.wrapping_add(1);
            packet.set_secs((self.count << 2) | self.state.secs_flags());

            let dst = match self.fill(&mut packet) {
                Ok(dst) => dst,
                Err(err) => {
                    net_debug!(
                        "DHCP {:08x} could not fill DHCP request: {}",
                        self.transaction_id,
                        err
                    );
                    return Ok(());
                }
            };
            (dst, packet.len())
        };

        emit(
            cx,
            Datagram {
                src: self.local,
                dst,
                payload: &buffer[..len],
            },
        )
        .map_err(|err| {
            net_debug!("DHCP {:08x} could not transmit UDP packet", self.transaction_id);
            err
        })
    }

    /// Complete a request packet for the current state, returning where it
    /// goes.
    fn fill(&self, packet: &mut Dhcpv4Packet<&mut [u8]>) -> Result<Ipv4Endpoint> {
        let broadcast = Ipv4Endpoint::new(Ipv4Address::BROADCAST, DHCP_SERVER_PORT);
        match &self.state {
            ClientState::Discover(_) => {
                net_debug!("DHCP {:08x} DHCPDISCOVER", self.transaction_id);
                Ok(broadcast)
            }
            ClientState::Request(state) => {
                net_debug!(
                    "DHCP {:08x} DHCPREQUEST to {} for {}",
                    self.transaction_id,
                    state.offer.server,
                    state.offer.address
                );
                packet.store(
                    DhcpOptionTag::SERVER_IDENTIFIER,
                    state.offer.server.as_bytes(),
                )?;
                packet.store(
                    DhcpOptionTag::REQUESTED_ADDRESS,
                    state.offer.address.as_bytes(),
                )?;
                Ok(broadcast)
            }
            ClientState::ProxyRequest(state) => {
                net_debug!(
                    "DHCP {:08x} ProxyDHCP REQUEST to {}",
                    self.transaction_id,
                    state.proxy.server
                );
                packet.store(
                    DhcpOptionTag::SERVER_IDENTIFIER,
                    state.proxy.server.as_bytes(),
                )?;
                Ok(Ipv4Endpoint::new(state.proxy.server, DHCP_PXE_PORT))
            }
            ClientState::BootServer(state) => {
                let dst = state.destination();
                net_debug!(
                    "DHCP {:08x} PXEBS REQUEST to {} for type {}",
                    self.transaction_id,
                    dst,
                    state.server_type
                );
                let item = BootMenuItem {
                    server_type: state.server_type,
                    layer: 0,
                };
                packet.store(DhcpOptionTag::PXE_BOOT_MENU_ITEM, &item.emit())?;
                Ok(dst)
            }
        }
    }

    /// Query the session for completion.
    ///
    /// Returns the completion event once, after the session finishes.
    pub fn poll(&mut self) -> Option<Event> {
        if !self.event_pending {
            return None;
        }
        self.event_pending = false;
        match self.result {
            Some(Ok(())) => Some(Event::Completed),
            Some(Err(err)) => Some(Event::Failed(err)),
            None => None,
        }
    }

    /// Register a waker.
    ///
    /// The waker is woken when the session finishes.
    ///
    /// Notes:
    ///
    /// - Only one waker can be registered at a time. If another waker was previously registered,
    ///   it is overwritten and will no longer be woken.
    /// - The Waker is woken only once. Once woken, you must register it again to receive more wakes.
    #[cfg(feature = "async")]
    pub fn register_waker(&mut self, waker: &Waker) {
        self.waker.register(waker)
    }

    /// Adds another waker, woken when the session finishes.
    #[cfg(feature = "async")]
    pub fn add_waker(&mut self, waker: &Waker) {
        self.waker.add(waker)
    }

    /// Clears all the wakers that were assigned to this session
    #[cfg(feature = "async")]
    pub fn clear_waker(&mut self) {
        self.waker.clear();
    }
}
