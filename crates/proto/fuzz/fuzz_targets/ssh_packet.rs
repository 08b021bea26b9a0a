//! Fuzz target for packet decoding and dispatch.
//!
//! Any byte string must either fail to decode or decode to a packet that
//! re-encodes losslessly and dispatches without panicking.
//!
//! Run with:
//! ```bash
//! cd crates/proto
//! cargo +nightly fuzz run ssh_packet -- -max_total_time=300
//! ```

#![no_main]
use libfuzzer_sys::fuzz_target;
use mirage_proto::ssh::{
    AuthMarkers, ChannelIdPolicy, ConnectionContext, InboundPacket, MessageDispatcher, Packet,
    UnknownMessagePolicy,
};

fuzz_target!(|data: &[u8]| {
    let packet = match Packet::from_bytes(data) {
        Ok(packet) => packet,
        Err(_) => return,
    };

    let reencoded = Packet::with_raw_type(packet.message_type(), packet.payload().to_vec());
    let reparsed = Packet::from_bytes(&reencoded.to_bytes()).expect("re-encoded packet must decode");
    assert_eq!(reparsed.message_type(), packet.message_type());
    assert_eq!(reparsed.payload(), packet.payload());

    let mut dispatcher =
        MessageDispatcher::new(UnknownMessagePolicy::Unimplemented, AuthMarkers::default());
    let mut ctx = ConnectionContext::new(ChannelIdPolicy::MirrorPeer, "fuzz");
    let _ = dispatcher.dispatch(&mut ctx, &InboundPacket { sequence: 0, packet });
});
