//! The access concentrator: owns the two raw sockets, the session table,
//! and the PPPoE discovery/session dispatch logic. See RFC 2516.
//!
//! Protocol state (`Brain`) is kept free of socket I/O so the discovery and
//! session state machine can be exercised in tests without a privileged
//! `AF_PACKET` socket: `handle_*` methods take already-received bytes and
//! return the frames that should go out, and [`AccessConcentrator::run`] is
//! the only place that actually touches a socket.

use crate::addr::AddrBuilder;
use crate::eth::{self, DiscoveryFrame};
use crate::error::BridgeError;
use crate::session::{Service, ServiceState, SessionTable};
use crate::sock::PacketSocket;
use crate::tags::{self, TagSet};
use erdp::ErrorDisplay;
use libc::sockaddr_ll;
use macaddr::MacAddr6;
use std::collections::HashSet;
use std::future::Future;
use std::task::Poll;
use tokio_util::sync::CancellationToken;

/// `sll_pkttype` for a frame addressed to us specifically, as opposed to
/// overheard broadcast/multicast/other-host traffic.
const PACKET_HOST: u8 = 0;

/// A frame to transmit, produced by the pure dispatch methods on [`Brain`]
/// and turned into an actual `sendto` by [`AccessConcentrator::apply`].
enum Outbound {
    Discovery(MacAddr6, DiscoveryFrame),
    Session(MacAddr6, u16, Vec<u8>),
}

/// Protocol state: the configured services and the session table. No
/// sockets, no async — just the discovery/session state machine.
struct Brain {
    ac_name: String,
    services: Vec<Box<dyn Service>>,
    sessions: SessionTable,
    mtu: usize,
}

impl Brain {
    fn handle_discovery_frame(&mut self, peer: MacAddr6, pkttype: u8, data: &[u8]) -> Vec<Outbound> {
        let frame = match DiscoveryFrame::parse(data) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "malformed discovery frame, dropping");
                return Vec::new();
            }
        };

        match frame.code {
            eth::CODE_PADI => self.handle_padi(peer, frame),
            eth::CODE_PADR => self.handle_padr(peer, pkttype, frame),
            eth::CODE_PADT => self.handle_padt(peer, frame),
            code => {
                tracing::debug!(%peer, code, "unexpected discovery code, dropping");
                Vec::new()
            }
        }
    }

    fn handle_padi(&mut self, peer: MacAddr6, frame: DiscoveryFrame) -> Vec<Outbound> {
        if frame.session_id != 0 {
            tracing::debug!(%peer, "PADI with non-zero session id, dropping");
            return Vec::new();
        }

        if frame.tags.has_duplicate(tags::SERVICE_NAME) {
            tracing::debug!(%peer, "PADI with multiple Service-Name tags, dropping");
            return Vec::new();
        }

        let requested = match frame.tags.get_utf8(tags::SERVICE_NAME) {
            Some(Ok(name)) => name.to_owned(),
            Some(Err(_)) => {
                tracing::debug!(%peer, "PADI Service-Name is not valid UTF-8, dropping");
                return Vec::new();
            }
            None => {
                tracing::debug!(%peer, "PADI without Service-Name tag, dropping");
                return Vec::new();
            }
        };

        let wildcard = requested.is_empty();

        if !wildcard && !self.services.iter().any(|s| s.name() == requested) {
            tracing::debug!(%peer, service = %requested, "PADI for unknown service, dropping");
            return Vec::new();
        }

        let mut reply = TagSet::new();

        for svc in &self.services {
            reply.push(tags::SERVICE_NAME, svc.name().as_bytes().to_vec());
        }

        reply.push(tags::AC_NAME, self.ac_name.as_bytes().to_vec());
        reply.echo_from(&frame.tags, tags::HOST_UNIQ);
        reply.echo_from(&frame.tags, tags::RELAY_SESSION_ID);

        vec![Outbound::Discovery(
            peer,
            DiscoveryFrame {
                code: eth::CODE_PADO,
                session_id: 0,
                tags: reply,
            },
        )]
    }

    fn handle_padr(&mut self, peer: MacAddr6, pkttype: u8, frame: DiscoveryFrame) -> Vec<Outbound> {
        if pkttype != PACKET_HOST {
            tracing::debug!(%peer, "PADR not unicast to the AC, dropping");
            return Vec::new();
        }

        if frame.session_id != 0 {
            tracing::debug!(%peer, "PADR with non-zero session id, dropping");
            return Vec::new();
        }

        if frame.tags.has_duplicate(tags::SERVICE_NAME) {
            tracing::debug!(%peer, "PADR with multiple Service-Name tags, dropping");
            return Vec::new();
        }

        let requested = match frame.tags.get_utf8(tags::SERVICE_NAME) {
            Some(Ok(name)) => name.to_owned(),
            Some(Err(_)) => {
                tracing::debug!(%peer, "PADR Service-Name is not valid UTF-8, dropping");
                return Vec::new();
            }
            None => {
                tracing::debug!(%peer, "PADR without Service-Name tag, dropping");
                return Vec::new();
            }
        };

        let mut reply_tags = TagSet::new();
        reply_tags.echo_from(&frame.tags, tags::HOST_UNIQ);
        reply_tags.echo_from(&frame.tags, tags::RELAY_SESSION_ID);

        let candidates: Vec<usize> = self
            .services
            .iter()
            .enumerate()
            .filter(|(_, s)| requested.is_empty() || s.name() == requested)
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            let mut err = reply_tags;
            err.push(
                tags::SERVICE_NAME_ERROR,
                b"Requested service does not exist".to_vec(),
            );

            return vec![Outbound::Discovery(
                peer,
                DiscoveryFrame {
                    code: eth::CODE_PADS,
                    session_id: 0,
                    tags: err,
                },
            )];
        }

        // Prefer an idle candidate; if none is idle, pre-empt the first
        // candidate in configuration order.
        let chosen = candidates
            .iter()
            .copied()
            .find(|&i| self.services[i].state() == ServiceState::Idle)
            .unwrap_or(candidates[0]);

        let mut outbound = Vec::new();

        if self.services[chosen].state() != ServiceState::Idle {
            if let Some((old_peer, old_session)) = self.services[chosen].binding() {
                self.sessions.remove(old_session.get());
                self.services[chosen].disconnect();

                outbound.push(Outbound::Discovery(
                    old_peer,
                    DiscoveryFrame {
                        code: eth::CODE_PADT,
                        session_id: old_session.get(),
                        tags: TagSet::new(),
                    },
                ));
            }
        }

        let session_id = self.sessions.allocate_id();

        match self.services[chosen].connect(peer, session_id) {
            Ok(()) => {
                self.sessions.bind(session_id, chosen);

                let mut ok = reply_tags;
                ok.push(tags::SERVICE_NAME, self.services[chosen].name().as_bytes().to_vec());

                outbound.push(Outbound::Discovery(
                    peer,
                    DiscoveryFrame {
                        code: eth::CODE_PADS,
                        session_id: session_id.get(),
                        tags: ok,
                    },
                ));
            }
            Err(e) => {
                tracing::warn!(service = %self.services[chosen].name(), error = %e, "service connect failed");

                let mut err = reply_tags;
                err.push(tags::AC_SYSTEM_ERROR, e.to_string().into_bytes());

                outbound.push(Outbound::Discovery(
                    peer,
                    DiscoveryFrame {
                        code: eth::CODE_PADS,
                        session_id: 0,
                        tags: err,
                    },
                ));
            }
        }

        outbound
    }

    fn handle_padt(&mut self, peer: MacAddr6, frame: DiscoveryFrame) -> Vec<Outbound> {
        if frame.session_id == 0 {
            tracing::debug!(%peer, "PADT with zero session id, dropping");
            return Vec::new();
        }

        match self.sessions.remove(frame.session_id) {
            Some(idx) => self.services[idx].disconnect(),
            None => tracing::debug!(%peer, session_id = frame.session_id, "PADT for unknown session, dropping"),
        }

        Vec::new()
    }

    fn handle_session_frame(&mut self, peer: MacAddr6, data: &[u8]) -> Vec<Outbound> {
        let frame = match eth::SessionFrame::parse(data) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(%peer, error = %e, "malformed session frame, dropping");
                return Vec::new();
            }
        };

        match self.sessions.get(frame.session_id) {
            Some(idx) => {
                self.services[idx].process_session_payload(frame.payload);
                Vec::new()
            }
            None => {
                tracing::debug!(%peer, session_id = frame.session_id, "stray session frame, sending PADT");

                vec![Outbound::Discovery(
                    peer,
                    DiscoveryFrame {
                        code: eth::CODE_PADT,
                        session_id: frame.session_id,
                        tags: TagSet::new(),
                    },
                )]
            }
        }
    }

    fn send_session(&self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() > self.mtu {
            tracing::warn!(len = payload.len(), mtu = self.mtu, "session payload exceeds mtu, dropping");
            return None;
        }

        Some(payload.to_vec())
    }

    /// Tears every bound service down, emitting a PADT with `AC-System-Error`
    /// to each live peer.
    fn shutdown(&mut self) -> Vec<Outbound> {
        let mut outbound = Vec::new();

        for (session_id, idx) in self.sessions.iter().collect::<Vec<_>>() {
            if let Some((peer, _)) = self.services[idx].binding() {
                let mut t = TagSet::new();
                t.push(tags::AC_SYSTEM_ERROR, b"Shutting down".to_vec());

                outbound.push(Outbound::Discovery(
                    peer,
                    DiscoveryFrame {
                        code: eth::CODE_PADT,
                        session_id: session_id.get(),
                        tags: t,
                    },
                ));
            }
        }

        for svc in &mut self.services {
            svc.disconnect();
        }

        self.sessions = SessionTable::new();

        outbound
    }

    /// Polls every service's modem fd until one has data (or EOF), without
    /// spawning: the service set is small and static, so a hand-rolled
    /// `poll_fn` fan-in keeps everything on the one event loop, rather than
    /// reaching for per-session tasks and shared state.
    async fn next_modem_event(&mut self) -> (usize, std::io::Result<Option<Vec<Vec<u8>>>>) {
        let services = &mut self.services;

        std::future::poll_fn(move |cx| {
            for (idx, svc) in services.iter_mut().enumerate() {
                let fut = svc.read_modem();
                tokio::pin!(fut);

                if let Poll::Ready(res) = fut.poll(cx) {
                    return Poll::Ready((idx, res));
                }
            }

            Poll::Pending
        })
        .await
    }
}

/// Owns the discovery (ethertype 0x8863) and session (ethertype 0x8864)
/// sockets, the configured services, and the session table; drives a
/// single-threaded, cooperative event loop.
pub struct AccessConcentrator {
    local_mac: MacAddr6,
    brain: Brain,
    discovery_sock: PacketSocket,
    session_sock: PacketSocket,
    addr: AddrBuilder,
}

impl AccessConcentrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ac_name: String,
        local_mac: MacAddr6,
        services: Vec<Box<dyn Service>>,
        mtu: usize,
        discovery_sock: PacketSocket,
        session_sock: PacketSocket,
        addr: AddrBuilder,
    ) -> Result<Self, BridgeError> {
        let mut seen = HashSet::new();

        for svc in &services {
            if !seen.insert(svc.name().to_owned()) {
                return Err(BridgeError::DuplicateService(svc.name().to_owned()));
            }
        }

        Ok(Self {
            local_mac,
            brain: Brain {
                ac_name,
                services,
                sessions: SessionTable::new(),
                mtu,
            },
            discovery_sock,
            session_sock,
            addr,
        })
    }

    /// Runs the event loop until `shutdown` is triggered (by the caller, on
    /// SIGINT/SIGTERM), then drains every live session with a PADT before
    /// returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(ac_name = %self.brain.ac_name, local_mac = %self.local_mac, "access concentrator starting");

        loop {
            let mut disc_buf = [0u8; 1500];
            let mut sess_buf = [0u8; 1500];

            tokio::select! {
                _ = shutdown.cancelled() => break,

                r = self.discovery_sock.recv(&mut disc_buf) => {
                    match r {
                        Ok((len, addr)) => {
                            let peer = mac_from_sockaddr(&addr);
                            let pkttype = addr.sll_pkttype;
                            let actions = self.brain.handle_discovery_frame(peer, pkttype, &disc_buf[..len]);
                            self.apply_all(actions);
                        }
                        Err(e) => {
                            tracing::error!("discovery socket recv failed: {}", e.display());
                            shutdown.cancel();
                        }
                    }
                }

                r = self.session_sock.recv(&mut sess_buf) => {
                    match r {
                        Ok((len, addr)) => {
                            let peer = mac_from_sockaddr(&addr);
                            let actions = self.brain.handle_session_frame(peer, &sess_buf[..len]);
                            self.apply_all(actions);
                        }
                        Err(e) => {
                            tracing::error!("session socket recv failed: {}", e.display());
                            shutdown.cancel();
                        }
                    }
                }

                (idx, res) = self.brain.next_modem_event() => {
                    self.handle_modem_event(idx, res);
                }
            }
        }

        let actions = self.brain.shutdown();
        self.apply_all(actions);
    }

    fn handle_modem_event(&mut self, idx: usize, res: std::io::Result<Option<Vec<Vec<u8>>>>) {
        let binding = self.brain.services[idx].binding();

        match res {
            Ok(Some(frames)) => {
                let Some((peer, session_id)) = binding else { return };

                for payload in frames {
                    if let Some(payload) = self.brain.send_session(&payload) {
                        self.apply(Outbound::Session(peer, session_id.get(), payload));
                    }
                }
            }
            Ok(None) => {
                let Some((peer, session_id)) = binding else { return };

                self.brain.sessions.remove(session_id.get());
                self.brain.services[idx].disconnect();

                let mut t = TagSet::new();
                t.push(tags::AC_SYSTEM_ERROR, b"Modem disconnected".to_vec());

                self.apply(Outbound::Discovery(
                    peer,
                    DiscoveryFrame {
                        code: eth::CODE_PADT,
                        session_id: session_id.get(),
                        tags: t,
                    },
                ));
            }
            Err(e) => {
                tracing::warn!(
                    service = %self.brain.services[idx].name(),
                    error = %e,
                    "modem read failed"
                );
            }
        }
    }

    fn apply_all(&self, actions: Vec<Outbound>) {
        for action in actions {
            self.apply(action);
        }
    }

    fn apply(&self, action: Outbound) {
        match action {
            Outbound::Discovery(peer, frame) => {
                let addr = self.addr.build(eth::ETHERTYPE_DISCOVERY, Some(peer));

                if let Err(e) = self.discovery_sock.send(addr, frame.serialize()) {
                    tracing::warn!("failed to send discovery frame to {}: {}", peer, e.display());
                }
            }
            Outbound::Session(peer, session_id, payload) => {
                let addr = self.addr.build(eth::ETHERTYPE_SESSION, Some(peer));
                let wire = eth::SessionFrame::serialize(session_id, &payload);

                if let Err(e) = self.session_sock.send(addr, wire) {
                    tracing::warn!("failed to send session frame to {}: {}", peer, e.display());
                }
            }
        }
    }
}

fn mac_from_sockaddr(addr: &sockaddr_ll) -> MacAddr6 {
    MacAddr6::from(TryInto::<[u8; 6]>::try_into(&addr.sll_addr[..6]).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::num::NonZeroU16;

    struct MockService {
        name: String,
        state: ServiceState,
        binding: Option<(MacAddr6, NonZeroU16)>,
        fail_connect: bool,
        received: Vec<Vec<u8>>,
    }

    impl MockService {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_owned(),
                state: ServiceState::Idle,
                binding: None,
                fail_connect: false,
                received: Vec::new(),
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail_connect: true,
                ..Self::new(name)
            }
        }
    }

    #[async_trait::async_trait]
    impl Service for MockService {
        fn name(&self) -> &str {
            &self.name
        }

        fn state(&self) -> ServiceState {
            self.state
        }

        fn binding(&self) -> Option<(MacAddr6, NonZeroU16)> {
            self.binding
        }

        fn connect(&mut self, peer: MacAddr6, session_id: NonZeroU16) -> Result<(), ServiceError> {
            if self.fail_connect {
                return Err(ServiceError::Io(std::io::Error::other("mock connect failure")));
            }

            self.state = ServiceState::Connected;
            self.binding = Some((peer, session_id));
            Ok(())
        }

        fn disconnect(&mut self) {
            self.state = ServiceState::Idle;
            self.binding = None;
        }

        fn process_session_payload(&mut self, payload: &[u8]) {
            self.received.push(payload.to_vec());
        }

        async fn read_modem(&mut self) -> Result<Option<Vec<Vec<u8>>>, std::io::Error> {
            std::future::pending().await
        }
    }

    fn peer() -> MacAddr6 {
        MacAddr6::from([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb])
    }

    fn brain(services: Vec<Box<dyn Service>>) -> Brain {
        Brain {
            ac_name: "myac".into(),
            services,
            sessions: SessionTable::new(),
            mtu: 1500,
        }
    }

    fn padi(service_name: &str, host_uniq: Option<&[u8]>) -> Vec<u8> {
        let mut tags = TagSet::new();
        tags.push(tags::SERVICE_NAME, service_name.as_bytes().to_vec());

        if let Some(hu) = host_uniq {
            tags.push(tags::HOST_UNIQ, hu.to_vec());
        }

        DiscoveryFrame {
            code: eth::CODE_PADI,
            session_id: 0,
            tags,
        }
        .serialize()
    }

    fn padr(service_name: &str, host_uniq: Option<&[u8]>) -> Vec<u8> {
        let mut tags = TagSet::new();
        tags.push(tags::SERVICE_NAME, service_name.as_bytes().to_vec());

        if let Some(hu) = host_uniq {
            tags.push(tags::HOST_UNIQ, hu.to_vec());
        }

        DiscoveryFrame {
            code: eth::CODE_PADR,
            session_id: 0,
            tags,
        }
        .serialize()
    }

    #[test]
    fn s1_discovery_handshake() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);
        let wire = padi("", Some(b"abcd"));

        let actions = b.handle_discovery_frame(peer(), 1, &wire);
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            Outbound::Discovery(p, f) => {
                assert_eq!(*p, peer());
                assert_eq!(f.code, eth::CODE_PADO);
                assert_eq!(f.session_id, 0);
                assert_eq!(f.tags.get(tags::SERVICE_NAME), Some(b"svc".as_slice()));
                assert_eq!(f.tags.get(tags::AC_NAME), Some(b"myac".as_slice()));
                assert_eq!(f.tags.get(tags::HOST_UNIQ), Some(b"abcd".as_slice()));
            }
            _ => panic!("expected a discovery reply"),
        }
    }

    #[test]
    fn s2_padr_accept() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);
        b.handle_discovery_frame(peer(), 1, &padi("", Some(b"abcd")));

        let actions = b.handle_discovery_frame(peer(), PACKET_HOST, &padr("svc", Some(b"abcd")));
        assert_eq!(actions.len(), 1);

        let session_id = match &actions[0] {
            Outbound::Discovery(p, f) => {
                assert_eq!(*p, peer());
                assert_eq!(f.code, eth::CODE_PADS);
                assert_eq!(f.tags.get(tags::SERVICE_NAME), Some(b"svc".as_slice()));
                assert_eq!(f.tags.get(tags::HOST_UNIQ), Some(b"abcd".as_slice()));
                assert_ne!(f.session_id, 0);
                f.session_id
            }
            _ => panic!("expected a discovery reply"),
        };

        assert_eq!(b.services[0].state(), ServiceState::Connected);
        assert!(b.sessions.contains(session_id));
    }

    #[test]
    fn s3_padr_for_unknown_service() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);

        let actions = b.handle_discovery_frame(peer(), PACKET_HOST, &padr("other", None));
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            Outbound::Discovery(_, f) => {
                assert_eq!(f.code, eth::CODE_PADS);
                assert_eq!(
                    f.tags.get(tags::SERVICE_NAME_ERROR),
                    Some(b"Requested service does not exist".as_slice())
                );
            }
            _ => panic!("expected a discovery reply"),
        }

        assert_eq!(b.sessions.len(), 0);
    }

    #[test]
    fn padr_connect_failure_surfaces_ac_system_error() {
        let mut b = brain(vec![Box::new(MockService::failing("svc"))]);

        let actions = b.handle_discovery_frame(peer(), PACKET_HOST, &padr("svc", None));
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            Outbound::Discovery(_, f) => {
                assert_eq!(f.code, eth::CODE_PADS);
                assert!(f.tags.get(tags::AC_SYSTEM_ERROR).is_some());
                assert_eq!(f.session_id, 0);
            }
            _ => panic!("expected a discovery reply"),
        }

        assert_eq!(b.sessions.len(), 0);
    }

    #[test]
    fn padr_takeover_displaces_existing_session() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);
        b.handle_discovery_frame(peer(), PACKET_HOST, &padr("svc", None));
        assert_eq!(b.sessions.len(), 1);

        let other_peer = MacAddr6::from([0, 1, 2, 3, 4, 5]);
        let actions = b.handle_discovery_frame(other_peer, PACKET_HOST, &padr("svc", None));

        assert_eq!(actions.len(), 2);

        match &actions[0] {
            Outbound::Discovery(p, f) => {
                assert_eq!(*p, peer());
                assert_eq!(f.code, eth::CODE_PADT);
            }
            _ => panic!("expected a PADT for the displaced peer"),
        }

        match &actions[1] {
            Outbound::Discovery(p, f) => {
                assert_eq!(*p, other_peer);
                assert_eq!(f.code, eth::CODE_PADS);
            }
            _ => panic!("expected a PADS for the new peer"),
        }

        assert_eq!(b.sessions.len(), 1);
    }

    #[test]
    fn property_5_idempotent_padt_on_unknown_session() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);

        let mut tags = TagSet::new();
        tags.push(tags::HOST_UNIQ, b"whatever".to_vec());
        let wire = DiscoveryFrame {
            code: eth::CODE_PADT,
            session_id: 0x1234,
            tags,
        }
        .serialize();

        let actions = b.handle_discovery_frame(peer(), PACKET_HOST, &wire);
        assert!(actions.is_empty());
        assert_eq!(b.sessions.len(), 0);
    }

    #[test]
    fn s6_stray_session_frame_triggers_padt() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);
        let wire = eth::SessionFrame::serialize(0x1234, &[0xc0, 0x21]);

        let actions = b.handle_session_frame(peer(), &wire);
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            Outbound::Discovery(p, f) => {
                assert_eq!(*p, peer());
                assert_eq!(f.code, eth::CODE_PADT);
                assert_eq!(f.session_id, 0x1234);
            }
            _ => panic!("expected a PADT"),
        }
    }

    #[test]
    fn known_session_frame_is_delivered_to_the_service() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);
        b.handle_discovery_frame(peer(), PACKET_HOST, &padr("svc", None));
        let session_id = b.sessions.iter().next().unwrap().0.get();

        let wire = eth::SessionFrame::serialize(session_id, &[1, 2, 3]);
        let actions = b.handle_session_frame(peer(), &wire);

        assert!(actions.is_empty());
    }

    #[test]
    fn send_session_drops_oversized_payload() {
        let b = brain(vec![Box::new(MockService::new("svc"))]);
        let payload = vec![0u8; b.mtu + 1];
        assert_eq!(b.send_session(&payload), None);
    }

    #[test]
    fn shutdown_emits_padt_for_every_live_session() {
        let mut b = brain(vec![Box::new(MockService::new("svc"))]);
        b.handle_discovery_frame(peer(), PACKET_HOST, &padr("svc", None));

        let actions = b.shutdown();
        assert_eq!(actions.len(), 1);

        match &actions[0] {
            Outbound::Discovery(p, f) => {
                assert_eq!(*p, peer());
                assert_eq!(f.code, eth::CODE_PADT);
                assert_eq!(
                    f.tags.get(tags::AC_SYSTEM_ERROR),
                    Some(b"Shutting down".as_slice())
                );
            }
            _ => panic!("expected a PADT"),
        }

        assert_eq!(b.sessions.len(), 0);
        assert_eq!(b.services[0].state(), ServiceState::Idle);
    }
}
