//! Client runtime - process-wide bus state
//!
//! The runtime owns everything a publishing process shares: role and
//! lifecycle state, the id allocator, the socket set, the publication
//! table, the per-peer ring queues and the background tasks draining
//! them. It is an explicit context object, not a hidden singleton;
//! tests routinely run several runtimes in one process.
//!
//! # Lifecycle
//!
//! `connect`/`with_transport` perform the register handshake (when an
//! upstream transport exists), seed the id allocator from the daemon's
//! guid block grant, and spawn the drain, flush, heartbeat and feedback
//! tasks. `finalize` seals every ring with a Shutdown frame, gives the
//! drain tasks a bounded window to flush, then force-stops; any API call
//! afterward fails fast with `RuntimeShutdown`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use beacon_config::{Config, NodeRole, OverflowSetting};
use beacon_pipeline::{
    DrainTask, OverflowPolicy, PeerId, QueuedFrame, RingSet, SocketSet, TaskSet, TcpTransport,
    Transport,
};
use beacon_protocol::{
    encode_announce, pack, Frame, MsgType, Priority, ProcessId, Publication, Role,
};

use crate::handle::PubHandle;
use crate::uid::UidAllocator;
use crate::{ClientError, Result};

/// Sentinel for a publication that has never been announced
const NEVER_ANNOUNCED: u32 = u32::MAX;

/// Runtime lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    Running,
    Shutdown,
}

/// Publication table entry shared between the runtime and its handles
#[derive(Clone)]
pub(crate) struct PubEntry {
    pub(crate) publication: Arc<Mutex<Publication>>,
    /// Schema version last sent in an announce, NEVER_ANNOUNCED before the
    /// first one
    pub(crate) announced_version: Arc<AtomicU32>,
}

/// Process-wide client runtime
pub struct Runtime {
    role: Role,
    state: RwLock<LifecycleState>,
    config: Config,
    origin: ProcessId,
    uids: UidAllocator,
    sockets: SocketSet,
    rings: RingSet,
    tasks: TaskSet,
    pubs: Mutex<HashMap<u64, PubEntry>>,
}

fn upstream_peer() -> PeerId {
    PeerId::from("upstream")
}

fn role_of(role: NodeRole) -> Role {
    match role {
        NodeRole::Client => Role::Client,
        NodeRole::Daemon => Role::Daemon,
        NodeRole::Leader => Role::Leader,
        NodeRole::Control => Role::Control,
    }
}

fn policy_of(setting: OverflowSetting) -> OverflowPolicy {
    match setting {
        OverflowSetting::EvictForImmediate => OverflowPolicy::EvictForImmediate,
        OverflowSetting::RejectAll => OverflowPolicy::RejectAll,
        OverflowSetting::EvictAll => OverflowPolicy::EvictAll,
    }
}

/// Overflow-eviction rank; Low sheds first, Immediate last
fn priority_rank(priority: Priority) -> u8 {
    match priority {
        Priority::Low => 0,
        Priority::Default => 1,
        Priority::Immediate => 2,
    }
}

impl Runtime {
    /// Connect to the configured upstream daemon and start the runtime
    ///
    /// Detached operation (no `node.upstream` in the config) skips the
    /// handshake and runs without network tasks; publications stay
    /// readable locally.
    pub async fn connect(config: Config) -> Result<Arc<Self>> {
        let transport: Option<Arc<dyn Transport>> = match &config.node.upstream {
            Some(upstream) => {
                let tcp = TcpTransport::connect(&upstream.address()).await?;
                Some(Arc::new(tcp))
            }
            None => None,
        };
        Self::with_transport(config, transport).await
    }

    /// Start the runtime over an already-established transport
    ///
    /// The injection point for tests and in-process wiring; `connect` is
    /// a thin TCP wrapper around this.
    pub async fn with_transport(
        config: Config,
        transport: Option<Arc<dyn Transport>>,
    ) -> Result<Arc<Self>> {
        let role = role_of(config.node.role);
        let origin = ProcessId {
            node: config.node.node_id.clone(),
            process: std::process::id(),
            rank: 0,
            program: std::env::args().next().unwrap_or_default(),
        };

        let ack_timeout = Duration::from_millis(config.global.ack_timeout_ms);
        let uids = match &transport {
            Some(transport) => {
                register(transport.as_ref(), &origin, role, ack_timeout).await?
            }
            None => UidAllocator::new(config.global.guid_start, config.global.guid_max),
        };

        let runtime = Arc::new(Self {
            role,
            state: RwLock::new(LifecycleState::Running),
            origin,
            uids,
            sockets: SocketSet::new(),
            rings: RingSet::new(
                config.global.ring_capacity,
                policy_of(config.global.overflow),
            ),
            tasks: TaskSet::new(),
            pubs: Mutex::new(HashMap::new()),
            config,
        });

        if let Some(transport) = transport {
            runtime.start_tasks(transport, ack_timeout);
        }

        info!(role = %runtime.role, "runtime started");
        Ok(runtime)
    }

    fn start_tasks(self: &Arc<Self>, transport: Arc<dyn Transport>, ack_timeout: Duration) {
        let peer = upstream_peer();
        self.sockets.register(peer.clone(), Arc::clone(&transport));
        let queue = self.rings.queue_for(&peer);

        let (feedback_tx, mut feedback_rx) = mpsc::channel(64);
        let drain = DrainTask::new(
            peer,
            queue,
            transport,
            self.tasks.token(),
            ack_timeout,
        )
        .with_feedback(feedback_tx);
        self.tasks.spawn("drain:upstream", async move {
            if let Err(err) = drain.run().await {
                error!(%err, "upstream drain task failed");
            }
        });

        let runtime = Arc::clone(self);
        let token = self.tasks.token();
        self.tasks.spawn("feedback", async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe = feedback_rx.recv() => {
                        let Some(frame) = maybe else { break };
                        runtime.handle_feedback(frame);
                    }
                }
            }
        });

        let runtime = Arc::clone(self);
        let token = self.tasks.token();
        let flush_every = Duration::from_millis(self.config.global.flush_interval_ms.max(1));
        self.tasks.spawn("flush", async move {
            let mut tick = tokio::time::interval(flush_every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(err) = runtime.flush_all() {
                            debug!(%err, "flush tick incomplete");
                        }
                    }
                }
            }
        });

        let heartbeat_ms = self.config.global.heartbeat_interval_ms;
        if heartbeat_ms > 0 {
            let runtime = Arc::clone(self);
            let token = self.tasks.token();
            self.tasks.spawn("heartbeat", async move {
                let mut tick = tokio::time::interval(Duration::from_millis(heartbeat_ms));
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tick.tick() => {
                            let frame = Frame::empty(MsgType::CheckIn, runtime.role, 0, 0);
                            // a dropped heartbeat is harmless, the next
                            // tick sends another
                            if let Err(err) = runtime.enqueue_upstream(frame, Priority::Low) {
                                debug!(%err, "heartbeat not queued");
                            }
                        }
                    }
                }
            });
        }
    }

    /// Role this runtime plays on the bus
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Process identity stamped into publication origins
    pub fn origin(&self) -> &ProcessId {
        &self.origin
    }

    /// Number of live publications
    pub fn pub_count(&self) -> usize {
        self.pubs.lock().len()
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        match *self.state.read() {
            LifecycleState::Running => Ok(()),
            _ => Err(ClientError::RuntimeShutdown),
        }
    }

    /// Create a publication and register it in the table
    pub fn new_pub(self: &Arc<Self>, title: impl Into<String>) -> Result<PubHandle> {
        self.ensure_running()?;
        let guid = self.uids.next_id()?;
        let entry = PubEntry {
            publication: Arc::new(Mutex::new(Publication::new(
                guid,
                title,
                self.origin.clone(),
            ))),
            announced_version: Arc::new(AtomicU32::new(NEVER_ANNOUNCED)),
        };
        self.pubs.lock().insert(guid, entry.clone());
        Ok(PubHandle::new(Arc::clone(self), guid, entry))
    }

    /// Destroy a publication
    ///
    /// Removes it from the table and invalidates any queued-but-undrained
    /// frames that still reference it.
    pub(crate) fn free_pub(&self, guid: u64) -> Result<()> {
        self.ensure_running()?;
        if self.pubs.lock().remove(&guid).is_none() {
            return Err(ClientError::UnknownPub(guid));
        }
        let discarded = self.rings.discard_pub(guid);
        if discarded > 0 {
            debug!(guid, discarded, "discarded queued frames for freed publication");
        }
        Ok(())
    }

    /// Push a frame onto the upstream ring, if this runtime has one
    pub(crate) fn enqueue_upstream(&self, frame: Frame, priority: Priority) -> Result<()> {
        match self.rings.get(&upstream_peer()) {
            Some(queue) => {
                queue.push(QueuedFrame::new(frame, priority))?;
                Ok(())
            }
            // detached runtimes keep values local
            None => Ok(()),
        }
    }

    /// Send the current schema, as Announce on first call and Reannounce
    /// afterward, and record the announced version
    pub(crate) fn announce_entry(&self, entry: &PubEntry) -> Result<()> {
        self.ensure_running()?;
        let publication = entry.publication.lock();
        let first = entry.announced_version.load(Ordering::Acquire) == NEVER_ANNOUNCED;
        let frame = encode_announce(&publication, self.role, first);
        self.enqueue_upstream(frame, Priority::Immediate)?;
        entry
            .announced_version
            .store(publication.version(), Ordering::Release);
        Ok(())
    }

    /// Pack an entry's dirty values and enqueue the frame
    ///
    /// Runs entirely under the publication's lock: the announce-if-stale
    /// check, the snapshot and the dirty-to-clean reset are one critical
    /// section, so no concurrent write can be cleared unserialized and no
    /// VALUE frame can precede its schema on the wire.
    pub(crate) fn flush_entry(
        &self,
        entry: &PubEntry,
        force_priority: Option<Priority>,
    ) -> Result<bool> {
        self.ensure_running()?;
        let mut publication = entry.publication.lock();
        if !publication.has_pending() {
            return Ok(false);
        }

        let announced = entry.announced_version.load(Ordering::Acquire);
        if announced != publication.version() {
            let frame = encode_announce(&publication, self.role, announced == NEVER_ANNOUNCED);
            self.enqueue_upstream(frame, Priority::Immediate)?;
            entry
                .announced_version
                .store(publication.version(), Ordering::Release);
        }

        let priority = force_priority.unwrap_or_else(|| {
            publication
                .dirty()
                .map(|(_, element)| element.meta().priority)
                .max_by_key(|p| priority_rank(*p))
                .unwrap_or(Priority::Default)
        });

        match pack(&mut publication, self.role) {
            Some(frame) => {
                self.enqueue_upstream(frame, priority)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flush every publication with pending values; returns frames queued
    pub(crate) fn flush_all(&self) -> Result<usize> {
        self.ensure_running()?;
        let entries: Vec<PubEntry> = self.pubs.lock().values().cloned().collect();
        let mut flushed = 0;
        for entry in entries {
            if self.flush_entry(&entry, None)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    fn handle_feedback(&self, frame: Frame) {
        match frame.header.msg_type {
            MsgType::AnnounceRequest => {
                let guid = frame.header.pub_guid;
                let entry = self.pubs.lock().get(&guid).cloned();
                match entry {
                    Some(entry) => {
                        debug!(guid, "peer requested re-announce");
                        if let Err(err) = self.announce_entry(&entry) {
                            warn!(guid, %err, "re-announce failed");
                        }
                    }
                    None => debug!(guid, "re-announce requested for unknown publication"),
                }
            }
            other => debug!(msg_type = %other, "ignoring feedback frame"),
        }
    }

    /// Tear the runtime down
    ///
    /// Transitions to Shutdown (new API calls fail fast), seals every
    /// ring behind a final Shutdown frame, lets the drain tasks flush
    /// within the configured window, then force-stops and drops the
    /// socket set.
    pub async fn finalize(&self) {
        {
            let mut state = self.state.write();
            if *state == LifecycleState::Shutdown {
                return;
            }
            *state = LifecycleState::Shutdown;
        }

        for (peer, queue) in self.rings.queues() {
            let shutdown = Frame::empty(MsgType::Shutdown, self.role, 0, 0);
            if queue
                .push(QueuedFrame::new(shutdown, Priority::Immediate))
                .is_err()
            {
                // full or already sealed; seal directly so the drain task
                // still terminates
                queue.seal();
            }
            debug!(peer = %peer, "ring sealed for shutdown");
        }

        self.tasks
            .shutdown(Duration::from_millis(self.config.global.drain_timeout_ms))
            .await;

        self.pubs.lock().clear();
        self.sockets.clear();
        info!("runtime finalized");
    }
}

/// Register with the daemon and seed the id allocator from its grant
async fn register(
    transport: &dyn Transport,
    origin: &ProcessId,
    role: Role,
    ack_timeout: Duration,
) -> Result<UidAllocator> {
    let frame = Frame::register(origin, role);
    transport.send(frame.encode()).await?;

    let bytes = tokio::time::timeout(ack_timeout, transport.recv())
        .await
        .map_err(|_| ClientError::RegistrationFailed("no answer from daemon".into()))??;
    let ack = Frame::decode(bytes)?;

    match ack.guid_grant() {
        Some((start, count)) if count > 0 => {
            debug!(start, count, "received guid block grant");
            Ok(UidAllocator::new(start, start + count - 1))
        }
        _ => Err(ClientError::RegistrationFailed(
            "register ack carried no guid block".into(),
        )),
    }
}
