//! NAPT (Network Address Port Translation)
//!
//! N:1 masquerading with endpoint-independent mapping: each internal
//! (address, port) gets one external port on the public address no matter
//! which destination it talks to. Ports come from a fixed pool handed out in
//! FIFO order. A binding always exists in both directions or in neither.
//!
//! The NAT boundary is the only state shared between switch sessions, so
//! [`NatBoundary`] funnels every pool and binding operation through a
//! single mutex.

use super::classifier::Classifier;
use super::command::Action;
use super::fields::PacketFields;
use crate::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default external port pool
pub const DEFAULT_PORT_RANGE: (u16, u16) = (50000, 59999);

/// Internal side of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InternalEndpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl fmt::Display for InternalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

#[derive(Debug, Clone)]
struct NatBinding {
    external_port: u16,
    last_used: Instant,
}

/// Bidirectional binding table and port pool
#[derive(Debug)]
pub struct NatTranslator {
    /// Internal endpoint -> binding (SNAT lookup)
    internal_map: HashMap<InternalEndpoint, NatBinding>,
    /// External port -> internal endpoint (DNAT lookup)
    external_map: HashMap<u16, InternalEndpoint>,
    /// Ports not bound to anything, in allocation order
    free_ports: VecDeque<u16>,
    port_range: (u16, u16),
}

impl NatTranslator {
    /// Pool covering `start..=end` (empty if `start > end`)
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            internal_map: HashMap::new(),
            external_map: HashMap::new(),
            free_ports: (start..=end).collect(),
            port_range: (start, end),
        }
    }

    /// External port for an internal endpoint, allocating one on first use
    pub fn translate_outbound(&mut self, addr: IpAddr, port: u16, now: Instant) -> Result<u16> {
        let internal = InternalEndpoint { addr, port };

        if let Some(binding) = self.internal_map.get_mut(&internal) {
            binding.last_used = now;
            return Ok(binding.external_port);
        }

        // Allocate first so a failure leaves both maps untouched
        let external_port = self.free_ports.pop_front().ok_or(Error::PoolExhausted {
            start: self.port_range.0,
            end: self.port_range.1,
        })?;

        self.internal_map.insert(
            internal,
            NatBinding {
                external_port,
                last_used: now,
            },
        );
        self.external_map.insert(external_port, internal);

        debug!(%internal, external_port, bindings = self.internal_map.len(), "NAT binding created");
        Ok(external_port)
    }

    /// Internal endpoint bound to `external_port`
    pub fn translate_inbound(&mut self, external_port: u16, now: Instant) -> Result<InternalEndpoint> {
        let internal = *self
            .external_map
            .get(&external_port)
            .ok_or(Error::UnmappedReturnTraffic {
                port: external_port,
            })?;

        if let Some(binding) = self.internal_map.get_mut(&internal) {
            binding.last_used = now;
        }
        Ok(internal)
    }

    /// Release bindings idle for longer than `max_idle`; their ports go to
    /// the back of the pool. Returns the number released.
    pub fn expire_idle(&mut self, max_idle: Duration, now: Instant) -> usize {
        let expired: Vec<InternalEndpoint> = self
            .internal_map
            .iter()
            .filter(|(_, binding)| now.saturating_duration_since(binding.last_used) >= max_idle)
            .map(|(internal, _)| *internal)
            .collect();

        for internal in &expired {
            if let Some(binding) = self.internal_map.remove(internal) {
                self.external_map.remove(&binding.external_port);
                self.free_ports.push_back(binding.external_port);
            }
        }

        expired.len()
    }

    /// Number of live bindings
    pub fn len(&self) -> usize {
        self.internal_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal_map.is_empty()
    }

    pub fn available_ports(&self) -> usize {
        self.free_ports.len()
    }

    pub fn port_range(&self) -> (u16, u16) {
        self.port_range
    }
}

/// Header rewrite produced by the NAT boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatRewrite {
    /// Inside -> outside: source becomes the public endpoint
    Outbound { public_addr: IpAddr, external_port: u16 },
    /// Outside -> public endpoint: destination becomes the internal endpoint
    Inbound { internal: InternalEndpoint },
}

impl NatRewrite {
    /// Flow actions performing the rewrite on the switch
    pub fn actions(&self) -> Vec<Action> {
        match *self {
            NatRewrite::Outbound {
                public_addr,
                external_port,
            } => vec![Action::SetNwSrc(public_addr), Action::SetTpSrc(external_port)],
            NatRewrite::Inbound { internal } => {
                vec![Action::SetNwDst(internal.addr), Action::SetTpDst(internal.port)]
            }
        }
    }

    /// Apply the rewrite to a copy of the packet's fields
    pub fn apply(&self, fields: &PacketFields) -> PacketFields {
        let mut rewritten = fields.clone();
        match *self {
            NatRewrite::Outbound {
                public_addr,
                external_port,
            } => {
                rewritten.nw_src = Some(public_addr);
                rewritten.tp_src = Some(external_port);
            }
            NatRewrite::Inbound { internal } => {
                rewritten.nw_dst = Some(internal.addr);
                rewritten.tp_dst = Some(internal.port);
            }
        }
        rewritten
    }
}

/// The process-wide NAT boundary shared by all switch sessions
pub struct NatBoundary {
    public_addr: IpAddr,
    internal_zone: String,
    classifier: Arc<Classifier>,
    translator: Mutex<NatTranslator>,
}

impl NatBoundary {
    pub fn new(
        public_addr: IpAddr,
        internal_zone: impl Into<String>,
        classifier: Arc<Classifier>,
        translator: NatTranslator,
    ) -> Self {
        Self {
            public_addr,
            internal_zone: internal_zone.into(),
            classifier,
            translator: Mutex::new(translator),
        }
    }

    pub fn public_addr(&self) -> IpAddr {
        self.public_addr
    }

    fn lock(&self) -> MutexGuard<'_, NatTranslator> {
        // The tables are consistent after every mutation, so a panic elsewhere
        // never leaves them half-updated.
        self.translator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn translate_outbound(&self, addr: IpAddr, port: u16, now: Instant) -> Result<u16> {
        self.lock().translate_outbound(addr, port, now)
    }

    pub fn translate_inbound(&self, external_port: u16, now: Instant) -> Result<InternalEndpoint> {
        self.lock().translate_inbound(external_port, now)
    }

    /// Rewrite for traffic addressed to the public endpoint. `Ok(None)` when
    /// the packet is not TCP/UDP to the public address.
    pub fn inbound(&self, fields: &PacketFields, now: Instant) -> Result<Option<NatRewrite>> {
        if !fields.has_ports() || fields.nw_dst != Some(self.public_addr) {
            return Ok(None);
        }
        let external_port = match fields.tp_dst {
            Some(port) => port,
            None => return Ok(None),
        };

        let internal = self.translate_inbound(external_port, now)?;
        Ok(Some(NatRewrite::Inbound { internal }))
    }

    /// Rewrite for TCP/UDP leaving the internal zone in the public
    /// address family. `Ok(None)` for anything else.
    pub fn outbound(&self, fields: &PacketFields, now: Instant) -> Result<Option<NatRewrite>> {
        if !fields.has_ports() {
            return Ok(None);
        }
        let (src, dst) = match fields.ip_endpoints() {
            Some(endpoints) => endpoints,
            None => return Ok(None),
        };
        if src.is_ipv4() != self.public_addr.is_ipv4()
            || !self.classifier.is_in(&self.internal_zone, src)
            || self.classifier.is_in(&self.internal_zone, dst)
        {
            return Ok(None);
        }
        let src_port = match fields.tp_src {
            Some(port) => port,
            None => return Ok(None),
        };

        let external_port = self.translate_outbound(src, src_port, now)?;
        Ok(Some(NatRewrite::Outbound {
            public_addr: self.public_addr,
            external_port,
        }))
    }

    pub fn expire_idle(&self, max_idle: Duration, now: Instant) -> usize {
        self.lock().expire_idle(max_idle, now)
    }

    pub fn bindings(&self) -> usize {
        self.lock().len()
    }

    pub fn available_ports(&self) -> usize {
        self.lock().available_ports()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::classifier::Zone;
    use crate::protocol::tcp::TcpFlags;
    use crate::protocol::MacAddr;
    use std::net::Ipv4Addr;
    use std::thread;

    fn host(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 0, last))
    }

    fn public() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(128, 128, 129, 1))
    }

    fn server() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(172, 16, 0, 5))
    }

    fn boundary(start: u16, end: u16) -> NatBoundary {
        let classifier = Classifier::new(vec![Zone::new(
            "inside",
            "192.168.0.0/24".parse().unwrap(),
        )]);
        NatBoundary::new(
            public(),
            "inside",
            Arc::new(classifier),
            NatTranslator::new(start, end),
        )
    }

    #[test]
    fn test_outbound_is_stable() {
        let mut nat = NatTranslator::new(50000, 59999);
        let now = Instant::now();

        let first = nat.translate_outbound(host(10), 40000, now).unwrap();
        let second = nat.translate_outbound(host(10), 40000, now).unwrap();
        assert_eq!(first, 50000);
        assert_eq!(first, second);
        assert_eq!(nat.len(), 1);
    }

    #[test]
    fn test_fifo_allocation() {
        let mut nat = NatTranslator::new(50000, 59999);
        let now = Instant::now();

        assert_eq!(nat.translate_outbound(host(10), 1000, now).unwrap(), 50000);
        assert_eq!(nat.translate_outbound(host(10), 1001, now).unwrap(), 50001);
        assert_eq!(nat.translate_outbound(host(11), 1000, now).unwrap(), 50002);
    }

    #[test]
    fn test_inbound_inverts_outbound() {
        let mut nat = NatTranslator::new(50000, 59999);
        let now = Instant::now();

        let port = nat.translate_outbound(host(10), 40000, now).unwrap();
        assert_eq!(
            nat.translate_inbound(port, now).unwrap(),
            InternalEndpoint {
                addr: host(10),
                port: 40000
            }
        );
    }

    #[test]
    fn test_inbound_unmapped() {
        let mut nat = NatTranslator::new(50000, 59999);
        let err = nat.translate_inbound(50000, Instant::now()).unwrap_err();
        assert!(matches!(err, Error::UnmappedReturnTraffic { port: 50000 }));
    }

    #[test]
    fn test_pool_exhaustion_leaves_no_partial_binding() {
        let mut nat = NatTranslator::new(50000, 50001);
        let now = Instant::now();

        nat.translate_outbound(host(1), 1, now).unwrap();
        nat.translate_outbound(host(2), 2, now).unwrap();
        let err = nat.translate_outbound(host(3), 3, now).unwrap_err();

        assert!(matches!(
            err,
            Error::PoolExhausted {
                start: 50000,
                end: 50001
            }
        ));
        assert_eq!(nat.len(), 2);
        assert_eq!(nat.external_map.len(), 2);
        // Existing bindings keep working once the pool is empty
        assert_eq!(nat.translate_outbound(host(1), 1, now).unwrap(), 50000);
    }

    #[test]
    fn test_expire_idle_returns_ports_to_pool() {
        let mut nat = NatTranslator::new(50000, 50001);
        let start = Instant::now();

        nat.translate_outbound(host(1), 1, start).unwrap();
        nat.translate_outbound(host(2), 2, start + Duration::from_secs(100)).unwrap();

        let removed = nat.expire_idle(Duration::from_secs(60), start + Duration::from_secs(120));
        assert_eq!(removed, 1);
        assert_eq!(nat.available_ports(), 1);
        assert!(nat.translate_inbound(50000, start).is_err());

        // Freed port is reused by the next new endpoint
        let port = nat
            .translate_outbound(host(3), 3, start + Duration::from_secs(121))
            .unwrap();
        assert_eq!(port, 50000);
        assert_eq!(nat.len(), nat.external_map.len());
    }

    #[test]
    fn test_empty_pool() {
        let mut nat = NatTranslator::new(10, 9);
        assert_eq!(nat.available_ports(), 0);
        assert!(nat.translate_outbound(host(1), 1, Instant::now()).is_err());
    }

    #[test]
    fn test_boundary_outbound_rewrite() {
        let nat = boundary(50000, 59999);
        let fields = PacketFields::tcp(
            MacAddr::ZERO,
            MacAddr::ZERO,
            (host(10), 40000),
            (server(), 80),
            TcpFlags::SYN,
        );

        let rewrite = nat.outbound(&fields, Instant::now()).unwrap().unwrap();
        assert_eq!(
            rewrite,
            NatRewrite::Outbound {
                public_addr: public(),
                external_port: 50000
            }
        );
        assert_eq!(
            rewrite.actions(),
            vec![Action::SetNwSrc(public()), Action::SetTpSrc(50000)]
        );

        let translated = rewrite.apply(&fields);
        assert_eq!(translated.nw_src, Some(public()));
        assert_eq!(translated.tp_src, Some(50000));
        assert_eq!(translated.nw_dst, fields.nw_dst);
    }

    #[test]
    fn test_boundary_ignores_internal_and_icmp() {
        let nat = boundary(50000, 59999);
        let now = Instant::now();
        let internal = PacketFields::udp(
            MacAddr::ZERO,
            MacAddr::ZERO,
            (host(10), 5000),
            (host(11), 53),
        );
        let icmp = PacketFields::ip(MacAddr::ZERO, MacAddr::ZERO, host(10), server(), 1);

        assert_eq!(nat.outbound(&internal, now).unwrap(), None);
        assert_eq!(nat.outbound(&icmp, now).unwrap(), None);
        assert_eq!(nat.bindings(), 0);
    }

    #[test]
    fn test_boundary_inbound_rewrite() {
        let nat = boundary(50000, 59999);
        let now = Instant::now();
        nat.translate_outbound(host(10), 40000, now).unwrap();

        let reply = PacketFields::tcp(
            MacAddr::ZERO,
            MacAddr::ZERO,
            (server(), 80),
            (public(), 50000),
            TcpFlags::default(),
        );
        let rewrite = nat.inbound(&reply, now).unwrap().unwrap();
        let translated = rewrite.apply(&reply);
        assert_eq!(translated.nw_dst, Some(host(10)));
        assert_eq!(translated.tp_dst, Some(40000));

        let stray = PacketFields::tcp(
            MacAddr::ZERO,
            MacAddr::ZERO,
            (server(), 80),
            (public(), 50001),
            TcpFlags::SYN,
        );
        assert!(matches!(
            nat.inbound(&stray, now),
            Err(Error::UnmappedReturnTraffic { port: 50001 })
        ));

        let elsewhere = PacketFields::tcp(
            MacAddr::ZERO,
            MacAddr::ZERO,
            (server(), 80),
            (host(10), 40000),
            TcpFlags::SYN,
        );
        assert_eq!(nat.inbound(&elsewhere, now).unwrap(), None);
    }

    #[test]
    fn test_boundary_shared_across_threads() {
        let nat = Arc::new(boundary(50000, 50999));
        let now = Instant::now();

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let nat = Arc::clone(&nat);
                thread::spawn(move || {
                    (0..100u16)
                        .map(|p| nat.translate_outbound(host(t), p, now).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ports: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ports.sort_unstable();
        ports.dedup();

        assert_eq!(ports.len(), 400);
        assert_eq!(nat.bindings(), 400);
        assert_eq!(nat.available_ports(), 600);
    }
}
