//! The mDNS engine.
//!
//! One engine owns the multicast socket for its lifetime. It answers
//! questions for locally-announced records, dispatches observed answers to
//! discovery subscriptions and one-shot query callbacks, keeps a cache of
//! observed records, and re-broadcasts its own announcements every TTL.
//!
//! All callbacks run on the host poller's thread; see [`crate::poller`].

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::{Rc, Weak};
use std::time::Duration;

use shared::error::{Error, Result};

use crate::config::{EngineConfig, MAX_NAME_LEN, MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use crate::message::buffer::{Reader, Writer};
use crate::message::name::{read_name, write_name};
use crate::message::{CLASS_IN, FLAGS_RESPONSE_AUTHORITATIVE, HEADER_LEN, Header, RecordType};
use crate::poller::{Poller, TimerHandle};
use crate::record::{RecordData, ServiceRecord};
use crate::routes::RouteTable;
use crate::socket::{Transport, UdpTransport};

/// The mDNS multicast group address (224.0.0.251).
pub const MDNS_MULTICAST_IPV4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The standard mDNS port (5353).
pub const MDNS_PORT: u16 = 5353;

/// mDNS multicast destination address (224.0.0.251:5353).
pub const MDNS_DEST_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(MDNS_MULTICAST_IPV4), MDNS_PORT);

/// Callback invoked for every discovered record matching a subscription.
///
/// Shared and re-entrant: a callback may add or remove subscriptions, query,
/// or announce while it runs.
pub type DiscoveryCallback = Rc<RefCell<dyn FnMut(&ServiceRecord)>>;

/// One-shot callback for a single query answer.
pub type QueryCallback = Box<dyn FnOnce(&ServiceRecord)>;

type TypeLabel = (RecordType, String);

/// Identifies a record previously passed to [`Mdns::announce`], for use with
/// [`Mdns::unannounce`].
#[derive(Debug, Clone)]
pub struct AnnounceHandle {
    rtype: RecordType,
    label: String,
    id: u64,
}

struct Announcement {
    id: u64,
    record: ServiceRecord,
    timer: Option<TimerHandle>,
}

struct Question {
    rtype: RecordType,
    label: String,
}

/// An mDNS responder/discoverer bound to `0.0.0.0:5353`.
///
/// Cheap to clone-by-handle internally; the engine state is dropped (and
/// goodbyes for all announcements are broadcast) when the last handle goes
/// away.
///
/// ```rust,ignore
/// let poller: Rc<dyn Poller> = host_poller();
/// let mdns = Mdns::new(EngineConfig::default(), poller)?;
///
/// mdns.on_discovery("_apple-midi._udp.local", RecordType::Ptr, |record| {
///     log::info!("found peer: {record}");
/// })?;
/// mdns.announce(
///     ServiceRecord::ptr("_apple-midi._udp.local", 60, "studio._apple-midi._udp.local"),
///     true,
/// )?;
/// ```
pub struct Mdns {
    inner: Rc<RefCell<EngineInner>>,
}

impl Clone for Mdns {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct EngineInner {
    transport: Box<dyn Transport>,
    poller: Rc<dyn Poller>,
    routes: RouteTable,
    /// Address substituted into A records with the 0.0.0.0 sentinel.
    /// Re-attributed per inbound peer via the route table.
    local_ip: Ipv4Addr,
    /// Startup address, the fallback when no route matches a peer.
    default_ip: Ipv4Addr,
    announcements: HashMap<TypeLabel, Vec<Announcement>>,
    // BTreeMap keeps dispatch order deterministic across patterns
    discovery_map: BTreeMap<TypeLabel, Vec<DiscoveryCallback>>,
    query_map: HashMap<TypeLabel, Vec<QueryCallback>>,
    cache: HashMap<TypeLabel, Vec<ServiceRecord>>,
    next_announce_id: u64,
    self_weak: Weak<RefCell<EngineInner>>,
}

impl Mdns {
    /// Open the multicast socket and register it with the host poller.
    ///
    /// The advertised local IP is taken from the configuration, falling back
    /// to the first non-loopback interface address.
    pub fn new(config: EngineConfig, poller: Rc<dyn Poller>) -> Result<Mdns> {
        let transport = UdpTransport::new(config.interface)
            .map_err(|e| Error::ErrSocketUnavailable(e.to_string()))?;
        let routes = RouteTable::discover()?;
        Self::with_transport(config, poller, Box::new(transport), routes)
    }

    /// Like [`new`](Mdns::new) but with an injected transport and route
    /// table. This is the constructor tests use to run the engine without a
    /// network.
    pub fn with_transport(
        config: EngineConfig,
        poller: Rc<dyn Poller>,
        transport: Box<dyn Transport>,
        routes: RouteTable,
    ) -> Result<Mdns> {
        let local_ip = config
            .local_ip
            .or_else(|| routes.default_ip())
            .ok_or(Error::ErrNoInterface)?;
        log::debug!("mdns local ip is {local_ip}");

        let fd = transport.fd();
        let inner = Rc::new(RefCell::new(EngineInner {
            transport,
            poller: Rc::clone(&poller),
            routes,
            local_ip,
            default_ip: local_ip,
            announcements: HashMap::new(),
            discovery_map: BTreeMap::new(),
            query_map: HashMap::new(),
            cache: HashMap::new(),
            next_announce_id: 1,
            self_weak: Weak::new(),
        }));
        inner.borrow_mut().self_weak = Rc::downgrade(&inner);

        let weak = Rc::downgrade(&inner);
        poller.add_readable(
            fd,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Mdns { inner }.on_readable();
                }
            }),
        )?;

        log::debug!("mdns waiting for requests at {MDNS_DEST_ADDR}");
        Ok(Mdns { inner })
    }

    /// Subscribe to answers whose label matches `pattern` for this record
    /// type. A pattern of `*.suffix` matches any label ending in `.suffix`;
    /// anything else matches exactly, case-sensitively.
    pub fn on_discovery(
        &self,
        pattern: &str,
        rtype: RecordType,
        callback: impl FnMut(&ServiceRecord) + 'static,
    ) -> Result<()> {
        if pattern.len() > MAX_NAME_LEN {
            return Err(Error::ErrNameTooLong);
        }
        let callback: DiscoveryCallback = Rc::new(RefCell::new(callback));
        self.inner
            .borrow_mut()
            .discovery_map
            .entry((rtype, pattern.to_string()))
            .or_default()
            .push(callback);
        Ok(())
    }

    /// Drop every subscription registered under `(rtype, pattern)`.
    pub fn remove_discovery(&self, pattern: &str, rtype: RecordType) {
        self.inner
            .borrow_mut()
            .discovery_map
            .remove(&(rtype, pattern.to_string()));
    }

    /// Ask the network for records of `(rtype, name)`.
    ///
    /// Cached answers are replayed synchronously (through the full discovery
    /// dispatch) instead of touching the network; otherwise a single
    /// question goes out to the multicast group.
    pub fn query(&self, name: &str, rtype: RecordType) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(Error::ErrNameTooLong);
        }
        let cached: Vec<ServiceRecord> = {
            let inner = self.inner.borrow();
            inner
                .cache
                .get(&(rtype, name.to_string()))
                .cloned()
                .unwrap_or_default()
        };
        if !cached.is_empty() {
            for record in &cached {
                self.detected_service(record);
            }
            return Ok(());
        }
        self.inner.borrow().send_question(name, rtype)
    }

    /// Like [`query`](Mdns::query), additionally registering a one-shot
    /// callback fired on the first matching answer.
    pub fn query_with(
        &self,
        name: &str,
        rtype: RecordType,
        callback: impl FnOnce(&ServiceRecord) + 'static,
    ) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(Error::ErrNameTooLong);
        }
        self.inner
            .borrow_mut()
            .query_map
            .entry((rtype, name.to_string()))
            .or_default()
            .push(Box::new(callback));
        self.query(name, rtype)
    }

    /// Serve `record` authoritatively. With `broadcast` the record goes out
    /// immediately and, while its TTL is non-zero, is re-broadcast every TTL
    /// seconds until unannounced.
    pub fn announce(&self, record: ServiceRecord, broadcast: bool) -> Result<AnnounceHandle> {
        if record.label.len() > MAX_NAME_LEN {
            return Err(Error::ErrNameTooLong);
        }
        let mut inner = self.inner.borrow_mut();

        // Send before storing: by the time the looped-back copy of this
        // broadcast arrives, the record is registered and suppressed.
        if broadcast {
            log::info!("announce service: {record}");
            let _ = inner.send_response(&record);
        } else {
            log::debug!("registering service without broadcast: {record}");
        }

        let id = inner.next_announce_id;
        inner.next_announce_id += 1;
        let key = (record.rtype(), record.label.clone());

        let timer = if broadcast && record.ttl > 0 {
            Some(inner.schedule_reannounce(&key, id, record.ttl)?)
        } else {
            None
        };

        let handle = AnnounceHandle {
            rtype: key.0,
            label: key.1.clone(),
            id,
        };
        inner
            .announcements
            .entry(key)
            .or_default()
            .push(Announcement { id, record, timer });
        Ok(handle)
    }

    /// Withdraw a previously announced record: broadcast one goodbye
    /// (ttl=0), cancel its reannouncement timer, and forget it.
    pub fn unannounce(&self, handle: &AnnounceHandle) {
        let mut inner = self.inner.borrow_mut();
        let key = (handle.rtype, handle.label.clone());
        let removed = match inner.announcements.get_mut(&key) {
            Some(list) => match list.iter().position(|a| a.id == handle.id) {
                Some(idx) => {
                    let ann = list.remove(idx);
                    let empty = list.is_empty();
                    Some((ann, empty))
                }
                None => None,
            },
            None => None,
        };
        if let Some((mut ann, empty)) = removed {
            if empty {
                inner.announcements.remove(&key);
            }
            ann.record.ttl = 0;
            log::info!("unannounce service: {}", ann.record);
            let _ = inner.send_response(&ann.record);
            // dropping `ann` cancels the reannouncement timer
        }
    }

    /// Feed one observed record through suppression, discovery and query
    /// dispatch, and the cache. Inbound packet processing calls this for
    /// every decoded answer; cached replays reuse it too.
    pub fn detected_service(&self, record: &ServiceRecord) {
        // Gather under the borrow, invoke after releasing it: callbacks may
        // mutate any registry, including removing themselves.
        let (discovery, queries) = {
            let mut inner = self.inner.borrow_mut();
            if inner.is_own_announcement(record) {
                return;
            }
            let discovery = inner.matching_discovery(record);
            let queries = inner
                .query_map
                .remove(&(record.rtype(), record.label.clone()))
                .unwrap_or_default();
            (discovery, queries)
        };
        for callback in &discovery {
            (&mut *callback.borrow_mut())(record);
        }
        for callback in queries {
            callback(record);
        }
        self.inner.borrow_mut().update_cache(record);
    }

    /// The address currently substituted into A records carrying the
    /// `0.0.0.0` sentinel.
    pub fn local_ip(&self) -> Ipv4Addr {
        self.inner.borrow().local_ip
    }

    /// Total number of records currently served.
    pub fn announced_count(&self) -> usize {
        self.inner.borrow().announcements.values().map(Vec::len).sum()
    }

    /// Snapshot of the cached records observed under `(rtype, label)`.
    pub fn cached_records(&self, rtype: RecordType, label: &str) -> Vec<ServiceRecord> {
        self.inner
            .borrow()
            .cache
            .get(&(rtype, label.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// The mDNS name of this host: `"<system hostname>.local"`.
    pub fn hostname_local() -> String {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        format!("{host}.local")
    }

    fn on_readable(&self) {
        let answers = {
            let mut inner = self.inner.borrow_mut();
            match inner.read_packet() {
                Ok(answers) => answers,
                Err(err) => {
                    log::warn!("dropping mdns packet: {err}");
                    return;
                }
            }
        };
        for record in &answers {
            self.detected_service(record);
        }
    }
}

impl EngineInner {
    /// Receive and decode one datagram. Questions are answered here;
    /// decoded answers are returned for dispatch outside the engine borrow.
    fn read_packet(&mut self) -> Result<Vec<ServiceRecord>> {
        let mut buf = [0u8; MAX_PACKET_SIZE + 1];
        let (len, peer) = match self.transport.recv(&mut buf) {
            Ok(ok) => ok,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        if len < MIN_PACKET_SIZE {
            log::error!("invalid mdns packet, minimum size is {MIN_PACKET_SIZE} bytes, ignoring");
            return Ok(Vec::new());
        }
        if len > MAX_PACKET_SIZE {
            log::error!("mdns packet over {MAX_PACKET_SIZE} bytes, ignoring");
            return Ok(Vec::new());
        }

        // Attribute a local address to this peer so A responses carry the
        // right source.
        if let IpAddr::V4(peer_ip) = peer.ip() {
            self.local_ip = self.routes.ip_for_peer(peer_ip).unwrap_or(self.default_ip);
        }

        let (questions, answers) = parse_packet(&buf[..len])?;
        for question in &questions {
            self.answer_if_known(question.rtype, &question.label);
        }
        Ok(answers)
    }

    /// Emit one response per announced record under `(rtype, label)`.
    /// Returns whether anything was known.
    fn answer_if_known(&self, rtype: RecordType, label: &str) -> bool {
        match self.announcements.get(&(rtype, label.to_string())) {
            Some(list) => {
                for ann in list {
                    let _ = self.send_response(&ann.record);
                }
                true
            }
            None => false,
        }
    }

    fn is_own_announcement(&self, record: &ServiceRecord) -> bool {
        self.announcements
            .iter()
            .filter(|((rtype, _), _)| *rtype == record.rtype())
            .any(|(_, list)| list.iter().any(|ann| ann.record == *record))
    }

    /// Discovery callbacks whose pattern matches the record, in registry
    /// order.
    fn matching_discovery(&self, record: &ServiceRecord) -> Vec<DiscoveryCallback> {
        let mut matched = Vec::new();
        for ((rtype, pattern), callbacks) in &self.discovery_map {
            if *rtype == record.rtype() && discovery_match(pattern, &record.label) {
                matched.extend(callbacks.iter().map(Rc::clone));
            }
        }
        matched
    }

    fn update_cache(&mut self, record: &ServiceRecord) {
        let key = (record.rtype(), record.label.clone());
        if record.ttl == 0 {
            if let Some(list) = self.cache.get_mut(&key) {
                list.retain(|cached| cached != record);
                if list.is_empty() {
                    self.cache.remove(&key);
                }
            }
            return;
        }
        let list = self.cache.entry(key).or_default();
        match list.iter_mut().find(|cached| **cached == *record) {
            Some(cached) => cached.ttl = record.ttl,
            None => list.push(record.clone()),
        }
    }

    fn schedule_reannounce(&self, key: &TypeLabel, id: u64, ttl: u32) -> Result<TimerHandle> {
        let weak = self.self_weak.clone();
        let key = key.clone();
        self.poller.schedule(
            Duration::from_secs(ttl as u64),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.borrow_mut().reannounce(&key, id);
                }
            }),
        )
    }

    /// Timer body: re-broadcast the announcement and rearm. A record that
    /// was unannounced in the meantime is a harmless lookup miss.
    fn reannounce(&mut self, key: &TypeLabel, id: u64) {
        let record = match self
            .announcements
            .get(key)
            .and_then(|list| list.iter().find(|ann| ann.id == id))
        {
            Some(ann) => ann.record.clone(),
            None => return,
        };
        log::info!("reannounce service: {record}");
        let _ = self.send_response(&record);
        match self.schedule_reannounce(key, id, record.ttl) {
            Ok(timer) => {
                if let Some(ann) = self
                    .announcements
                    .get_mut(key)
                    .and_then(|list| list.iter_mut().find(|ann| ann.id == id))
                {
                    ann.timer = Some(timer);
                }
            }
            Err(err) => log::error!("failed to rearm announcement timer: {err}"),
        }
    }

    /// Encode and broadcast one authoritative response carrying `record`.
    fn send_response(&self, record: &ServiceRecord) -> Result<()> {
        let mut packet = [0u8; MAX_PACKET_SIZE];
        let mut w = Writer::new(&mut packet);

        // Header: transaction id 0, response + authoritative, one answer.
        w.set_position(2)?;
        w.write_u16(FLAGS_RESPONSE_AUTHORITATIVE)?;
        w.set_position(6)?;
        w.write_u16(1)?;

        w.set_position(HEADER_LEN)?;
        write_name(&mut w, &record.label)?;
        w.write_u16(record.rtype().value())?;
        w.write_u16(CLASS_IN)?;
        w.write_u32(record.ttl)?;

        // rdlength is back-patched once the body is written
        let rdlength_at = w.position();
        w.write_u16(0)?;
        let body_start = w.position();

        match &record.data {
            RecordData::A(ip) => {
                let ip = if ip.is_unspecified() { self.local_ip } else { *ip };
                w.write_slice(&ip.octets())?;
            }
            RecordData::Ptr { servicename } => {
                write_name(&mut w, servicename)?;
            }
            RecordData::Srv { hostname, port } => {
                w.write_u16(0)?; // priority
                w.write_u16(0)?; // weight
                w.write_u16(*port)?;
                write_name(&mut w, hostname)?;
            }
            RecordData::Txt(txt) => {
                write_name(&mut w, txt)?;
            }
        }

        let end = w.position();
        w.patch_u16(rdlength_at, (end - body_start) as u16)?;

        self.broadcast(&packet[..end])
    }

    fn send_question(&self, name: &str, rtype: RecordType) -> Result<()> {
        let mut packet = [0u8; MAX_PACKET_SIZE];
        let mut w = Writer::new(&mut packet);

        // Header: transaction id 0, zero flags, one question.
        w.set_position(4)?;
        w.write_u16(1)?;

        w.set_position(HEADER_LEN)?;
        write_name(&mut w, name)?;
        w.write_u16(rtype.value())?;
        w.write_u16(CLASS_IN)?;

        let end = w.position();
        log::trace!("send mdns query {name} {rtype}");
        self.broadcast(&packet[..end])
    }

    fn broadcast(&self, payload: &[u8]) -> Result<()> {
        match self.transport.broadcast(payload) {
            Ok(_) => Ok(()),
            Err(err) => {
                log::warn!("mdns send failed: {err}");
                Err(Error::ErrSendFailed(err.to_string()))
            }
        }
    }
}

impl Drop for EngineInner {
    // Goodbye: withdraw every announcement before the socket closes.
    fn drop(&mut self) {
        for list in self.announcements.values() {
            for ann in list {
                let mut record = ann.record.clone();
                record.ttl = 0;
                let _ = self.send_response(&record);
            }
        }
    }
}

/// Subscription pattern matching. `*.suffix` matches labels ending in
/// `.suffix` (the separating dot is required, so the bare suffix itself does
/// not match); anything else compares exactly. No case folding.
pub(crate) fn discovery_match(pattern: &str, label: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) if suffix.starts_with('.') => label.ends_with(suffix),
        _ => pattern == label,
    }
}

fn parse_packet(datagram: &[u8]) -> Result<(Vec<Question>, Vec<ServiceRecord>)> {
    let mut r = Reader::new(datagram);
    let header = Header::read(&mut r)?;
    log::trace!(
        "mdns packet: id: {}, flags: {:#06x}, questions: {}, answers: {}, authorities: {}, additionals: {}",
        header.id,
        header.flags,
        header.questions,
        header.answers,
        header.authorities,
        header.additionals,
    );

    let mut questions = Vec::new();
    for _ in 0..header.questions {
        let label = read_name(&mut r)?;
        let rtype = r.read_u16()?;
        let _class = r.read_u16()?;
        if let Some(rtype) = RecordType::from_u16(rtype) {
            questions.push(Question { rtype, label });
        }
    }

    // Authority and additional sections are ignored entirely.
    let mut answers = Vec::new();
    for _ in 0..header.answers {
        if let Some(record) = read_answer(&mut r)? {
            answers.push(record);
        }
    }

    Ok((questions, answers))
}

fn read_answer(r: &mut Reader<'_>) -> Result<Option<ServiceRecord>> {
    let label = read_name(r)?;
    let rtype = r.read_u16()?;
    let _class = r.read_u16()?;
    let ttl = r.read_u32()?;
    let rdlength = r.read_u16()? as usize;
    let body_start = r.position();

    let record = match RecordType::from_u16(rtype) {
        Some(RecordType::Ptr) => {
            let servicename = read_name(r)?;
            Some(ServiceRecord::ptr(&label, ttl, &servicename))
        }
        Some(RecordType::Srv) => {
            r.skip(2)?; // priority
            r.skip(2)?; // weight
            let port = r.read_u16()?;
            let hostname = read_name(r)?;
            Some(ServiceRecord::srv(&label, ttl, &hostname, port))
        }
        Some(RecordType::A) => {
            let octets = [r.read_u8()?, r.read_u8()?, r.read_u8()?, r.read_u8()?];
            Some(ServiceRecord::a(&label, ttl, Ipv4Addr::from(octets)))
        }
        // TXT answers carry no discovery information for us; skipped along
        // with unknown types.
        _ => None,
    };

    // Whatever the body held, the next record starts right after rdlength
    // bytes.
    r.set_position(body_start.checked_add(rdlength).ok_or(Error::ErrParseFault)?)?;
    Ok(record)
}
