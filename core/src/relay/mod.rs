//! Relay controller — transport events in, framed encapsulations out.
//!
//! The controller sits between the reliable-UDP transport and the upstream
//! game sessions. Inbound, it turns transport events (open, close, datagram)
//! into session calls, stripping the wire framing byte. Outbound, it encodes
//! application packets, wraps oversized ones in a batch container, frames
//! them, and submits them with reliability and priority flags. It owns no
//! sessions and keeps no per-message state; the registry and the transport
//! hold all of it.

pub mod advertise;

pub use advertise::{Advertisement, GAME_VERSION, PROTOCOL_VERSION};

use crate::packet::{framing, Batch, GamePacket, BATCH_THRESHOLD};
use crate::session::{SessionFactory, SessionRegistry};
use crate::transport::{
    EncapsulatedMessage, SendFlags, TransportDriver, TransportError, TransportEvent,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Reason handed to a session when the transport supplies none.
pub const DEFAULT_DISCONNECT_REASON: &str = "Client disconnected";

/// The transport-facing relay.
///
/// Every handler takes `&self` and is safe to call concurrently — from a
/// periodic [`on_tick`](RelayController::on_tick) drain or straight from
/// transport-internal threads; the design assumes neither.
pub struct RelayController {
    transport: Arc<dyn TransportDriver>,
    sessions: Arc<SessionRegistry>,
    factory: Arc<dyn SessionFactory>,
}

impl RelayController {
    pub fn new(
        transport: Arc<dyn TransportDriver>,
        sessions: Arc<SessionRegistry>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            transport,
            sessions,
            factory,
        }
    }

    /// Registry backing this relay.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// A peer connection came up: build a session for it and register it.
    ///
    /// Idempotency is the registry's business, not this layer's.
    pub fn open_session(&self, identifier: &str, address: &str, port: u16, client_token: u64) {
        let ip: IpAddr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                warn!(identifier, address, "session open with unparseable peer address dropped");
                return;
            }
        };
        let peer = SocketAddr::new(ip, port);
        let session = self.factory.create(identifier.to_owned(), peer, client_token);
        self.sessions.new_session(session);
        debug!(identifier, %peer, "session opened");
    }

    /// A peer connection went away: notify the session, which handles the
    /// rest of the teardown itself, including deregistration. Unknown
    /// identifiers are expected churn, not errors.
    pub fn close_session(&self, identifier: &str, reason: &str) {
        let Some(session) = self.sessions.get_session(identifier) else {
            trace!(identifier, "close for unknown session ignored");
            return;
        };
        let reason = if reason.is_empty() {
            DEFAULT_DISCONNECT_REASON
        } else {
            reason
        };
        debug!(identifier, reason, "session closed by transport");
        session.on_disconnect(reason);
    }

    /// An encapsulated message arrived: strip the framing byte and hand the
    /// rest to the session's binary handler. Messages for unknown sessions
    /// and payloads too short to carry a framing byte are dropped.
    pub fn handle_encapsulated(
        &self,
        identifier: &str,
        message: &EncapsulatedMessage,
        _flags: SendFlags,
    ) {
        let Some(session) = self.sessions.get_session(identifier) else {
            trace!(identifier, "encapsulated for unknown session dropped");
            return;
        };
        let Some(body) = framing::strip_frame(&message.payload) else {
            trace!(identifier, "undersized encapsulated payload dropped");
            return;
        };
        session.handle_binary(body);
    }

    /// Unconnected-datagram hook. Inert.
    pub fn handle_raw(&self, _address: &str, _port: u16, _payload: &[u8]) {}

    /// Acknowledgement-bookkeeping hook. Inert; ack tracking stays in the
    /// transport.
    pub fn notify_ack(&self, _identifier: &str, _ack_id: u32) {}

    /// Transport-option hook. Inert.
    pub fn handle_option(&self, _name: &str, _value: &str) {}

    /// Drain every currently pending transport event, then return. Never
    /// waits for new events; an external loop drives this periodically.
    pub fn on_tick(&self) {
        while let Some(event) = self.transport.poll_event() {
            self.dispatch(event);
        }
    }

    /// Route one transport event to its handler. Also the entry point for
    /// transports that deliver from their own threads instead of queueing.
    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::SessionOpened {
                identifier,
                address,
                port,
                client_token,
            } => self.open_session(&identifier, &address, port, client_token),
            TransportEvent::SessionClosed { identifier, reason } => {
                self.close_session(&identifier, &reason);
            }
            TransportEvent::Encapsulated {
                identifier,
                message,
                flags,
            } => self.handle_encapsulated(&identifier, &message, flags),
            TransportEvent::Raw {
                address,
                port,
                payload,
            } => self.handle_raw(&address, port, &payload),
            TransportEvent::Ack { identifier, ack_id } => self.notify_ack(&identifier, ack_id),
            TransportEvent::Option { name, value } => self.handle_option(&name, &value),
        }
    }

    /// Release the transport. No further events are delivered afterward;
    /// resource errors propagate to the caller unchanged.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        self.transport.shutdown()
    }

    /// Administrative close: instruct the transport to terminate the peer
    /// connection. Distinct from [`close_session`](RelayController::close_session),
    /// which reacts to a close the transport already performed.
    pub fn disconnect(&self, identifier: &str, reason: &str) {
        if let Err(err) = self.transport.close_session(identifier, reason) {
            trace!(identifier, %err, "administrative close ignored by transport");
        }
    }

    /// Publish the server-list advertisement with the default protocol and
    /// game versions.
    pub fn set_broadcast_name(&self, server_name: &str, players: u32, max_players: u32) {
        let advert = Advertisement::new(server_name, players, max_players);
        self.transport.send_option("name", &advert.to_string());
    }

    /// Send one application packet toward a peer.
    ///
    /// A non-batch packet whose encoded form exceeds [`BATCH_THRESHOLD`] is
    /// wrapped in a [`Batch`] first; batches are exempt from the check, so
    /// the recursion is at most one level deep. Submission is fire-and-forget
    /// and no retries happen here: a transport refusal (peer already gone) is
    /// expected churn. Effective immediacy is the caller's request OR the
    /// packet's own declared preference.
    pub fn send_packet(&self, identifier: &str, packet: &dyn GamePacket, immediate: bool) {
        let immediate = immediate || packet.wants_immediate();
        let encoded = match packet.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(identifier, %err, "dropping packet that failed to encode");
                return;
            }
        };

        if encoded.len() > BATCH_THRESHOLD && !packet.is_batch() {
            let batch = Batch::wrapping(encoded);
            return self.send_packet(identifier, &batch, immediate);
        }

        let message = EncapsulatedMessage::reliable_ordered(framing::frame(&encoded));
        let flags = SendFlags::for_game_packet(immediate);
        if let Err(err) = self.transport.send(identifier, message, flags) {
            trace!(identifier, %err, "send dropped by transport");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{BATCH_PACKET_ID, FRAME_BYTE};
    use crate::session::UpstreamSession;
    use crate::transport::{LocalTransport, Reliability, SessionId};
    use anyhow::bail;
    use parking_lot::Mutex;

    struct TestPacket {
        body: Vec<u8>,
        immediate: bool,
    }

    impl TestPacket {
        fn sized(len: usize) -> Self {
            Self {
                body: (0..len).map(|i| (i % 251) as u8).collect(),
                immediate: false,
            }
        }

        fn immediate(len: usize) -> Self {
            Self {
                immediate: true,
                ..Self::sized(len)
            }
        }
    }

    impl GamePacket for TestPacket {
        fn encode(&self) -> anyhow::Result<Vec<u8>> {
            Ok(self.body.clone())
        }

        fn wants_immediate(&self) -> bool {
            self.immediate
        }
    }

    struct BrokenPacket;

    impl GamePacket for BrokenPacket {
        fn encode(&self) -> anyhow::Result<Vec<u8>> {
            bail!("refusing to encode")
        }
    }

    struct RecordingSession {
        identifier: String,
        peer: SocketAddr,
        received: Mutex<Vec<Vec<u8>>>,
        disconnects: Mutex<Vec<String>>,
    }

    impl UpstreamSession for RecordingSession {
        fn identifier(&self) -> &str {
            &self.identifier
        }

        fn peer_addr(&self) -> SocketAddr {
            self.peer
        }

        fn handle_binary(&self, payload: &[u8]) {
            self.received.lock().push(payload.to_vec());
        }

        fn on_disconnect(&self, reason: &str) {
            self.disconnects.lock().push(reason.to_owned());
        }
    }

    #[derive(Default)]
    struct RecordingFactory {
        created: Mutex<Vec<Arc<RecordingSession>>>,
    }

    impl RecordingFactory {
        fn session(&self, identifier: &str) -> Arc<RecordingSession> {
            self.created
                .lock()
                .iter()
                .find(|s| s.identifier == identifier)
                .cloned()
                .expect("session was never created")
        }
    }

    impl SessionFactory for RecordingFactory {
        fn create(
            &self,
            identifier: SessionId,
            peer: SocketAddr,
            _client_token: u64,
        ) -> Arc<dyn UpstreamSession> {
            let session = Arc::new(RecordingSession {
                identifier,
                peer,
                received: Mutex::new(Vec::new()),
                disconnects: Mutex::new(Vec::new()),
            });
            self.created.lock().push(Arc::clone(&session));
            session
        }
    }

    struct Fixture {
        transport: Arc<LocalTransport>,
        factory: Arc<RecordingFactory>,
        relay: RelayController,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(LocalTransport::new());
        let factory = Arc::new(RecordingFactory::default());
        let relay = RelayController::new(
            transport.clone(),
            Arc::new(SessionRegistry::new()),
            factory.clone(),
        );
        Fixture {
            transport,
            factory,
            relay,
        }
    }

    #[test]
    fn test_small_packet_sent_bare_and_framed() {
        let f = fixture();
        let packet = TestPacket::sized(100);

        f.relay.send_packet("raknet:1", &packet, false);

        let sends = f.transport.sends();
        assert_eq!(sends.len(), 1);
        let sent = &sends[0];
        assert_eq!(sent.identifier, "raknet:1");
        assert_eq!(sent.message.payload, framing::frame(&packet.body));
        assert_eq!(sent.message.reliability, Reliability::ReliableOrdered);
        assert!(sent.message.need_ack);
        assert_eq!(sent.message.message_index, 0);
        assert!(sent.flags.needs_ack());
        assert!(!sent.flags.is_immediate());
    }

    #[test]
    fn test_oversized_packet_wrapped_in_batch() {
        let f = fixture();
        let packet = TestPacket::sized(600);

        f.relay.send_packet("raknet:1", &packet, false);

        let sends = f.transport.sends();
        assert_eq!(sends.len(), 1);
        let payload = &sends[0].message.payload;
        assert_eq!(payload[0], FRAME_BYTE);
        assert_eq!(payload[1], BATCH_PACKET_ID);
        let expected = Batch::wrapping(packet.body.clone()).encode().unwrap();
        assert_eq!(&payload[1..], expected.as_slice());
        assert_eq!(sends[0].message.reliability, Reliability::ReliableOrdered);
        assert!(sends[0].message.need_ack);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let f = fixture();
        let packet = TestPacket::sized(BATCH_THRESHOLD);

        f.relay.send_packet("raknet:1", &packet, false);

        // Exactly 512 bytes still travels bare.
        let sends = f.transport.sends();
        assert_eq!(sends[0].message.payload, framing::frame(&packet.body));
    }

    #[test]
    fn test_batch_never_rewrapped() {
        let f = fixture();
        let batch = Batch::wrapping((0..2000).map(|i| (i * 31 % 255) as u8).collect());
        let encoded = batch.encode().unwrap();

        f.relay.send_packet("raknet:1", &batch, false);

        let sends = f.transport.sends();
        assert_eq!(sends.len(), 1);
        // Sent as-is regardless of its own encoded size.
        assert_eq!(sends[0].message.payload, framing::frame(&encoded));
    }

    #[test]
    fn test_caller_immediacy_selects_immediate_priority() {
        let f = fixture();
        f.relay.send_packet("raknet:1", &TestPacket::sized(10), true);
        assert!(f.transport.sends()[0].flags.is_immediate());
    }

    #[test]
    fn test_packet_immediacy_overrides_caller() {
        let f = fixture();
        f.relay.send_packet("raknet:1", &TestPacket::immediate(10), false);
        assert!(f.transport.sends()[0].flags.is_immediate());
    }

    #[test]
    fn test_neither_immediate_selects_normal_priority() {
        let f = fixture();
        f.relay.send_packet("raknet:1", &TestPacket::sized(100), false);
        let flags = f.transport.sends()[0].flags;
        assert!(flags.needs_ack());
        assert!(!flags.is_immediate());
    }

    #[test]
    fn test_immediacy_survives_batch_wrapping() {
        let f = fixture();
        f.relay.send_packet("raknet:1", &TestPacket::immediate(600), false);

        let sends = f.transport.sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].message.payload[1], BATCH_PACKET_ID);
        assert!(sends[0].flags.is_immediate());
    }

    #[test]
    fn test_encode_failure_drops_packet() {
        let f = fixture();
        f.relay.send_packet("raknet:1", &BrokenPacket, false);
        assert!(f.transport.sends().is_empty());
    }

    #[test]
    fn test_sequential_sends_keep_call_order() {
        let f = fixture();
        for len in [10usize, 20, 30] {
            f.relay.send_packet("raknet:1", &TestPacket::sized(len), false);
        }

        let sends = f.transport.sends();
        let lengths: Vec<usize> = sends.iter().map(|s| s.message.payload.len() - 1).collect();
        assert_eq!(lengths, vec![10, 20, 30]);
    }

    #[test]
    fn test_open_session_registers() {
        let f = fixture();
        f.relay.open_session("raknet:1", "10.0.0.1", 19132, 42);

        assert_eq!(f.relay.sessions().len(), 1);
        let session = f.factory.session("raknet:1");
        assert_eq!(session.peer_addr(), "10.0.0.1:19132".parse().unwrap());
    }

    #[test]
    fn test_open_session_bad_address_dropped() {
        let f = fixture();
        f.relay.open_session("raknet:1", "not-an-ip", 19132, 42);
        assert!(f.relay.sessions().is_empty());
    }

    #[test]
    fn test_open_then_encapsulated_delivers_stripped_payload() {
        let f = fixture();
        f.relay.open_session("id1", "10.0.0.1", 19132, 42);

        let message = EncapsulatedMessage::reliable_ordered(vec![0xFE, 0x01, 0x02]);
        f.relay
            .handle_encapsulated("id1", &message, SendFlags::from_bits(0));

        let session = f.factory.session("id1");
        assert_eq!(*session.received.lock(), vec![vec![0x01u8, 0x02]]);
    }

    #[test]
    fn test_encapsulated_for_unknown_session_dropped() {
        let f = fixture();
        let message = EncapsulatedMessage::reliable_ordered(vec![0xFE, 0x01]);
        // No sessions exist; nothing to assert beyond "no panic, no send".
        f.relay
            .handle_encapsulated("ghost", &message, SendFlags::from_bits(0));
        assert!(f.transport.sends().is_empty());
    }

    #[test]
    fn test_encapsulated_empty_payload_dropped() {
        let f = fixture();
        f.relay.open_session("id1", "10.0.0.1", 19132, 42);

        let message = EncapsulatedMessage::reliable_ordered(Vec::new());
        f.relay
            .handle_encapsulated("id1", &message, SendFlags::from_bits(0));

        assert!(f.factory.session("id1").received.lock().is_empty());
    }

    #[test]
    fn test_close_session_notifies_without_removing() {
        let f = fixture();
        f.relay.open_session("id1", "10.0.0.1", 19132, 42);

        f.relay.close_session("id1", "timed out");

        let session = f.factory.session("id1");
        assert_eq!(*session.disconnects.lock(), vec!["timed out".to_owned()]);
        // Notify, not destroy: deregistration is the session's own business.
        assert_eq!(f.relay.sessions().len(), 1);
    }

    #[test]
    fn test_close_session_substitutes_default_reason() {
        let f = fixture();
        f.relay.open_session("id1", "10.0.0.1", 19132, 42);

        f.relay.close_session("id1", "");

        let session = f.factory.session("id1");
        assert_eq!(
            *session.disconnects.lock(),
            vec![DEFAULT_DISCONNECT_REASON.to_owned()]
        );
    }

    #[test]
    fn test_close_unknown_session_is_noop() {
        let f = fixture();
        f.relay.close_session("ghost", "whatever");
        assert!(f.relay.sessions().is_empty());
    }

    #[test]
    fn test_disconnect_goes_to_transport() {
        let f = fixture();
        f.relay.disconnect("raknet:1", "kicked by admin");
        assert_eq!(
            f.transport.closes(),
            vec![("raknet:1".to_owned(), "kicked by admin".to_owned())]
        );
    }

    #[test]
    fn test_on_tick_drains_all_pending_events() {
        let f = fixture();
        for i in 0..3 {
            f.transport.inject(TransportEvent::SessionOpened {
                identifier: format!("raknet:{}", i),
                address: "10.0.0.1".into(),
                port: 19132,
                client_token: i,
            });
        }

        f.relay.on_tick();

        assert_eq!(f.relay.sessions().len(), 3);
        // Queue fully drained; a second tick finds nothing.
        f.relay.on_tick();
        assert_eq!(f.relay.sessions().len(), 3);
    }

    #[test]
    fn test_inert_hooks_do_nothing() {
        let f = fixture();
        f.relay.handle_raw("10.0.0.1", 19132, &[0x01]);
        f.relay.notify_ack("raknet:1", 7);
        f.relay.handle_option("portChecking", "false");

        assert!(f.transport.sends().is_empty());
        assert!(f.relay.sessions().is_empty());
    }

    #[test]
    fn test_set_broadcast_name_publishes_option() {
        let f = fixture();
        f.relay.set_broadcast_name("Basalt Proxy", 3, 20);

        assert_eq!(
            f.transport.options(),
            vec![("name".to_owned(), "MCPE;Basalt Proxy;84;0.15.10;3;20".to_owned())]
        );
    }

    #[test]
    fn test_shutdown_propagates_transport_error() {
        let f = fixture();
        f.relay.shutdown().unwrap();
        assert!(f.relay.shutdown().is_err());
    }
}
