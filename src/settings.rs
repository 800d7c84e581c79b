/*! Configuration settings consumed and published by DHCP sessions.

Sessions read a handful of settings (the user class, the PXE boot server
list, the local address of a device) and publish each accepted reply as a
named *layer*. The store itself is supplied by the embedder through the
[Settings] trait; [MemorySettings] is a simple owned implementation that
resolves settings from explicitly set values first and from registered
layers second.
*/

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use managed::ManagedMap;

use crate::iface::Device;
use crate::wire::{DhcpOptionTag, Dhcpv4Packet, Ipv4Address};
use crate::{Error, Result};

/// A named setting.
///
/// Settings that DHCP servers can provide carry the option tag they are
/// found under in a registered layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Setting {
    pub name: &'static str,
    pub tag: Option<DhcpOptionTag>,
}

/// The system UUID, sixteen octets, as provided by the platform.
pub const UUID: Setting = Setting {
    name: "uuid",
    tag: None,
};

pub const USER_CLASS: Setting = Setting {
    name: "user-class",
    tag: Some(DhcpOptionTag::USER_CLASS_ID),
};

/// Nonzero when the network configuration was inherited from an earlier
/// boot stage and DHCP must not run again.
pub const USE_CACHED: Setting = Setting {
    name: "use-cached",
    tag: Some(DhcpOptionTag::EB_USE_CACHED),
};

/// The local IPv4 address of a device.
pub const IP: Setting = Setting {
    name: "ip",
    tag: Some(DhcpOptionTag::EB_YIADDR),
};

pub const PXE_DISCOVERY_CONTROL: Setting = Setting {
    name: "pxe-discovery-control",
    tag: Some(DhcpOptionTag::PXE_DISCOVERY_CONTROL),
};

pub const PXE_BOOT_SERVER_MCAST: Setting = Setting {
    name: "pxe-boot-server-mcast",
    tag: Some(DhcpOptionTag::PXE_BOOT_SERVER_MCAST),
};

pub const PXE_BOOT_SERVERS: Setting = Setting {
    name: "pxe-boot-servers",
    tag: Some(DhcpOptionTag::PXE_BOOT_SERVERS),
};

pub const FILENAME: Setting = Setting {
    name: "filename",
    tag: Some(DhcpOptionTag::BOOTFILE_NAME),
};

/// A layer of settings published by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Layer {
    /// The acknowledged DHCP lease, parented to its device.
    Dhcp,
    /// The ProxyDHCP reply, global.
    ProxyDhcp,
    /// The PXE boot server reply, global.
    PxeBootServer,
}

impl Layer {
    pub const fn name(&self) -> &'static str {
        match self {
            Layer::Dhcp => "dhcp",
            Layer::ProxyDhcp => "proxydhcp",
            Layer::PxeBootServer => "pxebs",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A settings store.
pub trait Settings {
    /// Copy the value of `setting` into `buf`.
    ///
    /// With a `scope`, only values attached to that device are considered.
    /// Returns the full length of the value, which is larger than `buf.len()`
    /// when the copy was truncated, or `None` if the setting is absent.
    fn fetch(&self, scope: Option<&Device>, setting: &Setting, buf: &mut [u8]) -> Option<usize>;

    /// Publish `packet` as the layer `layer`, parented to `parent` or global.
    ///
    /// A layer with the same name and parent is replaced.
    fn register(&mut self, layer: Layer, parent: Option<&Device>, packet: &[u8]) -> Result<()>;

    /// Fetch a setting as a big-endian unsigned integer, zero if absent.
    fn fetch_uint(&self, scope: Option<&Device>, setting: &Setting) -> u64 {
        let mut buf = [0u8; 8];
        match self.fetch(scope, setting, &mut buf) {
            Some(len) => buf[..len.min(8)]
                .iter()
                .fold(0, |acc, &byte| (acc << 8) | byte as u64),
            None => 0,
        }
    }

    /// Fetch a setting as an IPv4 address.
    fn fetch_ipv4(&self, scope: Option<&Device>, setting: &Setting) -> Option<Ipv4Address> {
        let mut buf = [0u8; 4];
        match self.fetch(scope, setting, &mut buf)? {
            len if len >= 4 => Some(Ipv4Address(buf)),
            _ => None,
        }
    }

    /// Return the length of a setting's value without copying it.
    fn fetch_len(&self, scope: Option<&Device>, setting: &Setting) -> Option<usize> {
        self.fetch(scope, setting, &mut [])
    }
}

type ValueKey = (Option<String>, &'static str);

#[derive(Debug)]
struct Registered {
    layer: Layer,
    parent: Option<String>,
    packet: Vec<u8>,
}

/// A settings store kept in memory.
#[derive(Debug)]
pub struct MemorySettings {
    values: ManagedMap<'static, ValueKey, Vec<u8>>,
    layers: Vec<Registered>,
}

impl MemorySettings {
    pub fn new() -> MemorySettings {
        MemorySettings {
            values: ManagedMap::Owned(Default::default()),
            layers: Vec::new(),
        }
    }

    /// Set an explicit value, global or attached to a device.
    pub fn set(&mut self, scope: Option<&Device>, setting: &Setting, value: &[u8]) -> Result<()> {
        let key = (scope.map(|dev| String::from(dev.name())), setting.name);
        self.values
            .insert(key, Vec::from(value))
            .map(|_| ())
            .map_err(|_| Error::NoSpace)
    }

    /// Remove an explicit value.
    pub fn clear(&mut self, scope: Option<&Device>, setting: &Setting) {
        let key = (scope.map(|dev| String::from(dev.name())), setting.name);
        self.values.remove(&key);
    }

    /// Return the packet registered as `layer`, whatever its parent.
    pub fn layer(&self, layer: Layer) -> Option<&[u8]> {
        self.layers
            .iter()
            .rev()
            .find(|reg| reg.layer == layer)
            .map(|reg| &reg.packet[..])
    }

    /// Return the device name a layer is parented to.
    pub fn parent(&self, layer: Layer) -> Option<Option<&str>> {
        self.layers
            .iter()
            .rev()
            .find(|reg| reg.layer == layer)
            .map(|reg| reg.parent.as_deref())
    }

    /// Iterate over the registered layers, oldest first.
    pub fn layers(&self) -> impl Iterator<Item = Layer> + '_ {
        self.layers.iter().map(|reg| reg.layer)
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings for MemorySettings {
    fn fetch(&self, scope: Option<&Device>, setting: &Setting, buf: &mut [u8]) -> Option<usize> {
        let scope_name = scope.map(|dev| dev.name());
        let explicit = self
            .values
            .iter()
            .find(|((dev, name), _)| dev.as_deref() == scope_name && *name == setting.name);
        if let Some((_, value)) = explicit {
            let len = value.len().min(buf.len());
            buf[..len].copy_from_slice(&value[..len]);
            return Some(value.len());
        }

        let tag = setting.tag?;
        self.layers
            .iter()
            .rev()
            .filter(|reg| scope_name.is_none() || reg.parent.as_deref() == scope_name)
            .filter_map(|reg| Dhcpv4Packet::new_checked(&reg.packet[..]).ok())
            .find_map(|packet| packet.fetch(tag, buf))
    }

    fn register(&mut self, layer: Layer, parent: Option<&Device>, packet: &[u8]) -> Result<()> {
        let parent = parent.map(|dev| String::from(dev.name()));
        let mut copy = Vec::new();
        copy.try_reserve_exact(packet.len())
            .map_err(|_| Error::NoMemory)?;
        copy.extend_from_slice(packet);

        self.layers
            .retain(|reg| !(reg.layer == layer && reg.parent == parent));
        net_debug!("settings: registered layer {}", layer);
        self.layers.push(Registered {
            layer,
            parent,
            packet: copy,
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::DHCP_MAGIC_COOKIE;

    fn lease(yiaddr: Ipv4Address, filename: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 300];
        let mut packet = Dhcpv4Packet::new_unchecked(&mut bytes[..]);
        packet.set_magic_number(DHCP_MAGIC_COOKIE);
        packet.set_your_ip(yiaddr);
        packet.store(DhcpOptionTag::MESSAGE_TYPE, &[5]).unwrap();
        packet.store(DhcpOptionTag::BOOTFILE_NAME, filename).unwrap();
        bytes
    }

    #[test]
    fn test_explicit_value() {
        let mut settings = MemorySettings::new();
        settings.set(None, &USER_CLASS, b"lab").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(settings.fetch(None, &USER_CLASS, &mut buf), Some(3));
        assert_eq!(&buf[..3], b"lab");
        settings.clear(None, &USER_CLASS);
        assert_eq!(settings.fetch_len(None, &USER_CLASS), None);
    }

    #[test]
    fn test_fetch_uint() {
        let mut settings = MemorySettings::new();
        assert_eq!(settings.fetch_uint(None, &USE_CACHED), 0);
        settings.set(None, &USE_CACHED, &[1]).unwrap();
        assert_eq!(settings.fetch_uint(None, &USE_CACHED), 1);
        settings.set(None, &PXE_DISCOVERY_CONTROL, &[0x01, 0x02]).unwrap();
        assert_eq!(settings.fetch_uint(None, &PXE_DISCOVERY_CONTROL), 0x0102);
    }

    #[test]
    fn test_layer_scoping() {
        let dev = Device::ethernet("net0", [2, 0, 0, 0, 0, 1]).unwrap();
        let other = Device::ethernet("net1", [2, 0, 0, 0, 0, 2]).unwrap();
        let mut settings = MemorySettings::new();
        settings
            .register(
                Layer::Dhcp,
                Some(&dev),
                &lease(Ipv4Address::new(10, 0, 0, 5), b"a"),
            )
            .unwrap();

        assert_eq!(
            settings.fetch_ipv4(Some(&dev), &IP),
            Some(Ipv4Address::new(10, 0, 0, 5))
        );
        assert_eq!(settings.fetch_ipv4(Some(&other), &IP), None);
        assert_eq!(
            settings.fetch_ipv4(None, &IP),
            Some(Ipv4Address::new(10, 0, 0, 5))
        );
        assert_eq!(settings.parent(Layer::Dhcp), Some(Some("net0")));
    }

    #[test]
    fn test_newest_layer_wins() {
        let mut settings = MemorySettings::new();
        settings
            .register(
                Layer::ProxyDhcp,
                None,
                &lease(Ipv4Address::UNSPECIFIED, b"proxy.0"),
            )
            .unwrap();
        settings
            .register(
                Layer::PxeBootServer,
                None,
                &lease(Ipv4Address::UNSPECIFIED, b"bs.0"),
            )
            .unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(settings.fetch(None, &FILENAME, &mut buf), Some(4));
        assert_eq!(&buf[..4], b"bs.0");
    }

    #[test]
    fn test_register_replaces_same_layer() {
        let mut settings = MemorySettings::new();
        for name in [&b"one"[..], &b"two"[..]] {
            settings
                .register(Layer::ProxyDhcp, None, &lease(Ipv4Address::UNSPECIFIED, name))
                .unwrap();
        }
        assert_eq!(settings.layers().count(), 1);
        let mut buf = [0u8; 3];
        settings.fetch(None, &FILENAME, &mut buf);
        assert_eq!(&buf, b"two");
    }

    #[test]
    fn test_unpublished_setting() {
        let settings = MemorySettings::new();
        assert_eq!(settings.fetch_len(None, &UUID), None);
    }
}
