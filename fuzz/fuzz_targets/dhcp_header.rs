#![no_main]
use libfuzzer_sys::fuzz_target;
use netboot::wire::{pxe, DhcpOptionTag, Dhcpv4Packet};

fuzz_target!(|data: &[u8]| {
    let packet = match Dhcpv4Packet::new_checked(data) {
        Ok(packet) => packet,
        Err(_) => return,
    };
    let _ = packet.message_type();
    let _ = packet.server_identifier();
    if let Some(item) = packet.option(DhcpOptionTag::PXE_BOOT_MENU_ITEM) {
        let _ = pxe::BootMenuItem::parse(item);
    }
    if let Some(servers) = packet.option(DhcpOptionTag::PXE_BOOT_SERVERS) {
        for server in pxe::boot_servers(servers).flatten() {
            let _ = server.addresses().count();
        }
    }

    let mut copy = data.to_vec();
    let mut packet = Dhcpv4Packet::new_unchecked(&mut copy[..]);
    let _ = packet.store(DhcpOptionTag::PXE_BOOT_MENU_ITEM, &[0, 1, 0, 0]);
    let _ = packet.store(DhcpOptionTag::SERVER_IDENTIFIER, &[10, 0, 0, 1]);
    assert!(packet.len() <= data.len());
});
