use alloc::rc::Rc;
use managed::ManagedSlice;

use super::session_set::{SessionHandle, SessionSet, SessionStorage};
use super::Device;
use crate::rand::Rand;
use crate::settings::Settings;
use crate::socket::{Datagram, Event, PollAt, Session, Start};
use crate::time::Instant;
use crate::wire::Ipv4Endpoint;
use crate::Result;

/// Upper bound on back-to-back dispatches of one session in a single poll.
const MAX_DISPATCH_ROUNDS: usize = 4;

/// Configuration of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Random seed for transaction ids.
    ///
    /// It is strongly recommended that the random seed is different on each boot,
    /// to avoid reusing the transaction ids of an earlier boot stage.
    pub random_seed: u64,
}

impl Config {
    pub fn new() -> Self {
        Default::default()
    }
}

/// What sessions see of the outside world while they run.
pub struct Context<'c> {
    now: Instant,
    settings: &'c mut dyn Settings,
    rand: &'c mut Rand,
}

impl<'c> Context<'c> {
    pub(crate) fn new(now: Instant, settings: &'c mut dyn Settings, rand: &'c mut Rand) -> Self {
        Context {
            now,
            settings,
            rand,
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn settings(&mut self) -> &mut (dyn Settings + 'c) {
        &mut *self.settings
    }

    #[allow(unused)]
    pub(crate) fn rand(&mut self) -> &mut Rand {
        &mut *self.rand
    }
}

/// Outcome of `Interface::start_dhcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// A session is running under this handle.
    InProgress(SessionHandle),
    /// Cached settings are in use, no session was started.
    Cached,
}

/// A driver for DHCP sessions.
///
/// The interface owns the sessions it starts and hands out handles to
/// them. The embedder feeds it received datagrams with `process`, calls
/// `poll` whenever `poll_at` says so, and collects completion events with
/// `poll_events`. Finished sessions stay in the set until `remove`d.
#[derive(Debug)]
pub struct Interface<'a> {
    sessions: SessionSet<'a>,
    rand: Rand,
    last_transaction_id: u32,
}

impl<'a> Interface<'a> {
    /// Create an interface storing its sessions in `storage`.
    pub fn new<S>(config: Config, storage: S) -> Interface<'a>
    where
        S: Into<ManagedSlice<'a, SessionStorage<'a>>>,
    {
        Interface {
            sessions: SessionSet::new(storage),
            rand: Rand::new(config.random_seed),
            last_transaction_id: 0,
        }
    }

    /// Start DHCP on `device`.
    pub fn start_dhcp(
        &mut self,
        now: Instant,
        settings: &mut dyn Settings,
        device: Rc<Device>,
    ) -> Result<Outcome> {
        let mut cx = Context::new(now, settings, &mut self.rand);
        match Session::start_dhcp(&mut cx, device)? {
            Start::Cached => Ok(Outcome::Cached),
            Start::Started(session) => {
                let transaction_id = session.transaction_id();
                let handle = self.sessions.add(session)?;
                self.last_transaction_id = transaction_id;
                Ok(Outcome::InProgress(handle))
            }
        }
    }

    /// Start PXE boot server discovery on `device` for boot servers of
    /// type `server_type`.
    pub fn start_pxebs(
        &mut self,
        now: Instant,
        settings: &mut dyn Settings,
        device: Rc<Device>,
        server_type: u16,
    ) -> Result<SessionHandle> {
        let mut cx = Context::new(now, settings, &mut self.rand);
        let session = Session::start_pxebs(&mut cx, device, server_type)?;
        self.sessions.add(session)
    }

    /// The transaction id of the most recently started DHCP session.
    pub fn last_transaction_id(&self) -> u32 {
        self.last_transaction_id
    }

    /// Get a session by its handle.
    ///
    /// # Panics
    /// This function may panic if the handle does not belong to this interface.
    pub fn session(&self, handle: SessionHandle) -> &Session<'a> {
        self.sessions.get(handle)
    }

    /// Get a mutable session by its handle.
    ///
    /// # Panics
    /// This function may panic if the handle does not belong to this interface.
    pub fn session_mut(&mut self, handle: SessionHandle) -> &mut Session<'a> {
        self.sessions.get_mut(handle)
    }

    /// Iterate over the sessions.
    pub fn sessions(&self) -> impl Iterator<Item = (SessionHandle, &Session<'a>)> {
        self.sessions.iter()
    }

    /// Close a session from outside. It finishes with `Error::Canceled`
    /// unless it has already finished.
    pub fn cancel(&mut self, handle: SessionHandle) {
        net_debug!("[{}]: canceling", handle);
        self.sessions.get_mut(handle).close();
    }

    /// Remove a session, releasing everything it holds.
    pub fn remove(&mut self, handle: SessionHandle) -> Session<'a> {
        self.sessions.remove(handle)
    }

    /// Deliver a datagram received on the DHCP client port to every
    /// session.
    pub fn process(
        &mut self,
        now: Instant,
        settings: &mut dyn Settings,
        src: Ipv4Endpoint,
        payload: &[u8],
    ) -> Result<()> {
        let mut cx = Context::new(now, settings, &mut self.rand);
        let mut result = Ok(());
        for (handle, session) in self.sessions.iter_mut() {
            if let Err(err) = session.process(&mut cx, src, payload) {
                net_debug!("[{}]: could not process packet: {}", handle, err);
                result = Err(err);
            }
        }
        result
    }

    /// Run the timers of every session, transmitting through `transmit`.
    ///
    /// A transmission error stops the poll and is returned; the failed
    /// session retries on its next expiry.
    pub fn poll<F, E>(
        &mut self,
        now: Instant,
        settings: &mut dyn Settings,
        mut transmit: F,
    ) -> core::result::Result<(), E>
    where
        F: FnMut(Datagram) -> core::result::Result<(), E>,
    {
        let mut cx = Context::new(now, settings, &mut self.rand);
        for (handle, session) in self.sessions.iter_mut() {
            for _ in 0..MAX_DISPATCH_ROUNDS {
                match session.poll_at() {
                    PollAt::Now => {}
                    PollAt::Time(at) if at <= now => {}
                    _ => break,
                }
                net_trace!("[{}]: dispatching", handle);
                session.dispatch(&mut cx, |_, datagram| transmit(datagram))?;
            }
        }
        Ok(())
    }

    /// Return the earliest time any session needs `poll`, or `None` if
    /// only received datagrams can make progress.
    pub fn poll_at(&self) -> Option<Instant> {
        self.sessions
            .iter()
            .filter_map(|(_, session)| match session.poll_at() {
                PollAt::Now => Some(Instant::ZERO),
                PollAt::Time(at) => Some(at),
                PollAt::Ingress => None,
            })
            .min()
    }

    /// Return the next completion event of any session.
    pub fn poll_events(&mut self) -> Option<(SessionHandle, Event)> {
        self.sessions
            .iter_mut()
            .find_map(|(handle, session)| session.poll().map(|event| (handle, event)))
    }
}

#[cfg(test)]
mod test {
    use alloc::vec::Vec;

    use super::*;
    use crate::settings::{self, Layer, MemorySettings};
    use crate::tests::*;
    use crate::wire::{DhcpMessageType, DhcpOptionTag, Dhcpv4Packet};
    use crate::Error;

    fn interface<'a>() -> Interface<'a> {
        setup();
        Interface::new(Config { random_seed: 7 }, Vec::new())
    }

    fn poll_all(
        iface: &mut Interface,
        now: Instant,
        settings: &mut MemorySettings,
    ) -> Vec<(Ipv4Endpoint, Vec<u8>)> {
        let mut sent = Vec::new();
        iface
            .poll(now, settings, |datagram| {
                sent.push((datagram.dst, datagram.payload.to_vec()));
                Ok::<_, ()>(())
            })
            .unwrap();
        sent
    }

    fn message_type(payload: &[u8]) -> Option<DhcpMessageType> {
        Dhcpv4Packet::new_checked(payload).unwrap().message_type()
    }

    #[test]
    fn test_dhcp_exchange() {
        let mut iface = interface();
        let mut settings = MemorySettings::new();
        let handle = match iface.start_dhcp(Instant::ZERO, &mut settings, device()) {
            Ok(Outcome::InProgress(handle)) => handle,
            other => panic!("unexpected start: {:?}", other),
        };
        assert_eq!(iface.last_transaction_id(), TXID);
        assert_eq!(iface.poll_at(), Some(Instant::ZERO));

        let sent = poll_all(&mut iface, Instant::ZERO, &mut settings);
        assert_eq!(sent.len(), 1);
        assert_eq!(message_type(&sent[0].1), Some(DhcpMessageType::Discover));
        assert_eq!(iface.poll_at(), Some(Instant::from_secs(1)));

        let offer = Reply::offer()
            .your_ip(MY_IP)
            .server_id(SERVER_IP)
            .option(DhcpOptionTag::EB_NO_PXEDHCP, &[1]);
        iface
            .process(Instant::ZERO, &mut settings, from_server(SERVER_IP), offer.bytes())
            .unwrap();
        let sent = poll_all(&mut iface, Instant::ZERO, &mut settings);
        assert_eq!(sent.len(), 1);
        assert_eq!(message_type(&sent[0].1), Some(DhcpMessageType::Request));
        assert!(iface.poll_events().is_none());

        let ack = Reply::ack().your_ip(MY_IP).server_id(SERVER_IP);
        iface
            .process(Instant::ZERO, &mut settings, from_server(SERVER_IP), ack.bytes())
            .unwrap();
        assert_eq!(iface.poll_events(), Some((handle, Event::Completed)));
        assert!(iface.poll_events().is_none());
        assert_eq!(iface.poll_at(), None);

        assert_eq!(settings.layers().collect::<Vec<_>>(), vec![Layer::Dhcp]);
        let dev = iface.session(handle).device().clone();
        assert_eq!(
            settings.fetch_ipv4(Some(&*dev), &settings::IP),
            Some(MY_IP)
        );
        assert_eq!(iface.remove(handle).result(), Some(Ok(())));
        assert_eq!(iface.sessions().count(), 0);
    }

    #[test]
    fn test_use_cached() {
        let mut iface = interface();
        let mut settings = MemorySettings::new();
        settings.set(None, &settings::USE_CACHED, &[1]).unwrap();
        assert_eq!(
            iface.start_dhcp(Instant::ZERO, &mut settings, device()),
            Ok(Outcome::Cached)
        );
        assert_eq!(iface.sessions().count(), 0);
        assert_eq!(iface.poll_at(), None);
    }

    #[test]
    fn test_storage_full() {
        setup();
        let mut storage = [SessionStorage::EMPTY];
        let mut iface = Interface::new(Config::new(), &mut storage[..]);
        let mut settings = MemorySettings::new();
        assert!(iface
            .start_dhcp(Instant::ZERO, &mut settings, device())
            .is_ok());
        assert_eq!(
            iface.start_dhcp(Instant::ZERO, &mut settings, device()),
            Err(Error::NoSpace)
        );
    }

    #[test]
    fn test_cancel() {
        let mut iface = interface();
        let mut settings = MemorySettings::new();
        let handle = match iface.start_dhcp(Instant::ZERO, &mut settings, device()) {
            Ok(Outcome::InProgress(handle)) => handle,
            other => panic!("unexpected start: {:?}", other),
        };
        iface.cancel(handle);
        assert_eq!(
            iface.poll_events(),
            Some((handle, Event::Failed(Error::Canceled)))
        );
        assert!(poll_all(&mut iface, Instant::ZERO, &mut settings).is_empty());
        assert!(settings.layers().next().is_none());
    }

    #[test]
    fn test_transmit_error() {
        let mut iface = interface();
        let mut settings = MemorySettings::new();
        iface
            .start_dhcp(Instant::ZERO, &mut settings, device())
            .unwrap();
        assert_eq!(
            iface.poll(Instant::ZERO, &mut settings, |_| Err("link down")),
            Err("link down")
        );
        assert_eq!(iface.poll_at(), Some(Instant::from_secs(1)));

        let sent = poll_all(&mut iface, Instant::from_secs(1), &mut settings);
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn test_pxebs_from_proxydhcp() {
        let mut iface = interface();
        let mut settings = MemorySettings::new();
        let proxy = Reply::ack()
            .server_id(PROXY_IP)
            .pxe_client()
            .option(DhcpOptionTag::PXE_DISCOVERY_CONTROL, &[0x03])
            .option(
                DhcpOptionTag::PXE_BOOT_SERVERS,
                &[0x00, 0x80, 0x01, 192, 168, 1, 10],
            );
        settings
            .register(Layer::ProxyDhcp, None, proxy.bytes())
            .unwrap();

        let handle = iface
            .start_pxebs(Instant::ZERO, &mut settings, device(), 0x8000)
            .unwrap();
        let sent = poll_all(&mut iface, Instant::ZERO, &mut settings);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, from_proxy(PROXY_IP));

        let ack =
            Reply::ack().option(DhcpOptionTag::PXE_BOOT_MENU_ITEM, &[0x00, 0x80, 0x00, 0x00]);
        iface
            .process(Instant::ZERO, &mut settings, from_proxy(PROXY_IP), ack.bytes())
            .unwrap();
        assert_eq!(iface.poll_events(), Some((handle, Event::Completed)));
        assert_eq!(settings.layer(Layer::PxeBootServer), Some(ack.bytes()));
    }

    #[test]
    fn test_pxebs_without_servers() {
        let mut iface = interface();
        let mut settings = MemorySettings::new();
        settings
            .set(None, &settings::PXE_DISCOVERY_CONTROL, &[0x01])
            .unwrap();
        assert_eq!(
            iface.start_pxebs(Instant::ZERO, &mut settings, device(), 0),
            Err(Error::InvalidArgument)
        );
        assert_eq!(iface.sessions().count(), 0);
    }
}
