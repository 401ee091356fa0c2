//! Daemon service - frame dispatch, granting, relay
//!
//! One service instance per daemon or leader process. Connection
//! handlers feed it decoded frames; it applies them to the mirror
//! table, keeps subscriptions current, relays traffic upstream and
//! outward, and produces the reply frame (ack, grant, announce request)
//! the connection should send back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use beacon_client::UidAllocator;
use beacon_config::Config;
use beacon_pipeline::{QueuedFrame, RingQueue};
use beacon_protocol::{Frame, MsgType, Priority, ProtocolError, Role};

use crate::mirror::MirrorTable;
use crate::subscription::{Pattern, SubHandle, SubTable};
use crate::{DaemonError, Result};

/// Frame-handling counters, relaxed ordering, eventually consistent
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub frames_received: AtomicU64,
    pub values_applied: AtomicU64,
    pub schema_mismatches: AtomicU64,
    pub type_mismatches: AtomicU64,
    pub clients_registered: AtomicU64,
    pub check_ins: AtomicU64,
}

/// The aggregation service shared by all connection handlers
pub struct DaemonService {
    role: Role,
    mirrors: MirrorTable,
    subs: SubTable,
    uids: UidAllocator,
    guid_block_size: u64,
    upstream: Option<Arc<RingQueue>>,
    metrics: ServiceMetrics,
}

impl DaemonService {
    /// Build a service from configuration
    pub fn new(config: &Config) -> Self {
        let role = match config.node.role {
            beacon_config::NodeRole::Leader => Role::Leader,
            _ => Role::Daemon,
        };
        Self {
            role,
            mirrors: MirrorTable::new(),
            subs: SubTable::new(),
            uids: UidAllocator::new(config.global.guid_start, config.global.guid_max),
            guid_block_size: config.global.guid_block_size,
            upstream: None,
            metrics: ServiceMetrics::default(),
        }
    }

    /// Attach the ring feeding the leader; its drain task is spawned by
    /// the process that owns the connection
    pub fn with_upstream(mut self, queue: Arc<RingQueue>) -> Self {
        self.upstream = Some(queue);
        self
    }

    /// Role this service answers as
    pub fn role(&self) -> Role {
        self.role
    }

    /// The mirror table (inspection tools, tests)
    pub fn mirrors(&self) -> &MirrorTable {
        &self.mirrors
    }

    /// Frame-handling counters
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Register interest in publications matching `pattern`
    ///
    /// The match set is seeded against everything currently mirrored and
    /// follows schema changes from then on.
    pub fn subscribe(&self, pattern: Pattern, capacity: usize) -> SubHandle {
        self.subs.subscribe(pattern, capacity, &self.mirrors)
    }

    /// Drop a subscription; in-flight forwarding treats it as a no-op
    pub fn unsubscribe(&self, id: u64) {
        self.subs.unsubscribe(id);
    }

    /// Apply one inbound frame and produce the reply to send, if any
    pub fn handle_frame(&self, frame: Frame) -> Result<Option<Frame>> {
        self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);
        let header = frame.header;

        match header.msg_type {
            MsgType::Register => {
                let (start, count) = self.uids.split_range(self.guid_block_size)?;
                let origin = frame.register_origin()?;
                self.metrics
                    .clients_registered
                    .fetch_add(1, Ordering::Relaxed);
                info!(
                    node = %origin.node,
                    process = origin.process,
                    start,
                    count,
                    "client registered, guid block granted"
                );
                Ok(Some(Frame::ack_with_grant(&header, self.role, start, count)))
            }

            MsgType::Announce | MsgType::Reannounce => {
                self.mirrors.apply_announce(&frame)?;
                if let Some(mirror) = self.mirrors.get(header.pub_guid) {
                    self.subs.reevaluate(header.pub_guid, &mirror.lock());
                }
                // subscribers need the schema before any values
                let shared = Arc::new(frame);
                self.subs.forward(&shared);
                self.forward_upstream(&shared, Priority::Immediate);
                Ok(Some(Frame::ack_for(&header, self.role)))
            }

            MsgType::Value => self.handle_value(frame),

            MsgType::Unannounce => {
                if self.mirrors.remove(header.pub_guid) {
                    self.subs.drop_pub(header.pub_guid);
                    debug!(guid = header.pub_guid, "mirror dropped");
                }
                self.forward_upstream(&Arc::new(frame), Priority::Immediate);
                Ok(None)
            }

            MsgType::CheckIn => {
                self.metrics.check_ins.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }

            MsgType::Shutdown => {
                debug!(role = %header.sender_role, "peer announced shutdown");
                Ok(None)
            }

            // acks are consumed by drain tasks, not the server path
            MsgType::Acknowledge | MsgType::AnnounceRequest => Ok(None),
        }
    }

    /// Value frames: repack into the mirror, then relay
    ///
    /// A missing mirror or stale schema answers with an announce request
    /// instead of failing the connection; a type mismatch drops the
    /// frame and is logged.
    fn handle_value(&self, frame: Frame) -> Result<Option<Frame>> {
        let header = frame.header;
        match self.mirrors.apply_publish(&frame) {
            Ok(applied) => {
                self.metrics
                    .values_applied
                    .fetch_add(applied as u64, Ordering::Relaxed);
                let shared = Arc::new(frame);
                self.subs.forward(&shared);
                self.forward_upstream(&shared, Priority::Default);
                Ok(None)
            }
            Err(DaemonError::UnknownPub(guid)) => {
                self.metrics
                    .schema_mismatches
                    .fetch_add(1, Ordering::Relaxed);
                debug!(guid, "value for unmirrored publication, requesting announce");
                Ok(Some(self.announce_request(guid)))
            }
            Err(DaemonError::Protocol(ProtocolError::SchemaMismatch { guid, index, .. })) => {
                self.metrics
                    .schema_mismatches
                    .fetch_add(1, Ordering::Relaxed);
                debug!(guid, index, "stale schema, requesting re-announce");
                Ok(Some(self.announce_request(guid)))
            }
            Err(DaemonError::Protocol(err @ ProtocolError::TypeMismatch { .. })) => {
                self.metrics
                    .type_mismatches
                    .fetch_add(1, Ordering::Relaxed);
                warn!(guid = header.pub_guid, %err, "value frame dropped");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn announce_request(&self, guid: u64) -> Frame {
        Frame::empty(MsgType::AnnounceRequest, self.role, guid, 0)
    }

    /// Relay a frame toward the leader, when this tier has one
    ///
    /// Overflow on the upstream ring follows the ring's policy; a
    /// dropped relay frame is counted there, never an error here.
    fn forward_upstream(&self, frame: &Arc<Frame>, priority: Priority) {
        let Some(queue) = &self.upstream else { return };
        if self.role != Role::Daemon {
            return;
        }
        let queued = QueuedFrame::new((**frame).clone(), priority);
        if let Err(err) = queue.push(queued) {
            debug!(%err, "upstream relay frame not queued");
        }
    }
}
