#![no_main]
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use netboot::iface::{Config, Device, Interface, Outcome};
use netboot::settings::MemorySettings;
use netboot::time::Instant;
use netboot::wire::{Ipv4Address, Ipv4Endpoint};

#[derive(Debug, Arbitrary)]
struct Datagram {
    at_millis: u16,
    src: [u8; 4],
    src_port: u16,
    payload: Vec<u8>,
}

fuzz_target!(|input: Vec<Datagram>| {
    let device = match Device::ethernet("net0", [0x52, 0x54, 0x00, 0x12, 0x34, 0x56]) {
        Ok(device) => Rc::new(device),
        Err(_) => return,
    };
    let mut settings = MemorySettings::new();
    let mut iface = Interface::new(Config::new(), Vec::new());
    match iface.start_dhcp(Instant::ZERO, &mut settings, device) {
        Ok(Outcome::InProgress(_)) => {}
        _ => return,
    }

    let mut now = Instant::ZERO;
    for datagram in input {
        now += netboot::time::Duration::from_millis(datagram.at_millis as u64);
        let src = Ipv4Endpoint::new(Ipv4Address(datagram.src), datagram.src_port);
        let _ = iface.process(now, &mut settings, src, &datagram.payload);
        let _ = iface.poll(now, &mut settings, |_| Ok::<_, ()>(()));
        while iface.poll_events().is_some() {}
    }
});
