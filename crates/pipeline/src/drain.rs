//! Drain task - the single consumer of a ring queue
//!
//! One drain task per outbound peer. It pops frames in FIFO order,
//! writes them to the peer's transport, and waits for an Acknowledge on
//! the message types that require one (Register, Announce, Reannounce).
//!
//! Receiving runs in a companion loop the task spawns for itself:
//! inbound Acknowledge frames are routed to the sender, everything else
//! (feedback such as announce requests) goes to the owner through the
//! feedback channel, whether or not a send is in flight.
//!
//! A drain task blocked on one peer's backpressure never stalls other
//! queues; each peer has its own task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use beacon_protocol::{Frame, MsgType};

use crate::ring::{FrameState, QueuedFrame, RingQueue};
use crate::transport::{PeerId, Transport};
use crate::{PipelineError, Result};

/// Consumes one ring queue and drives one peer connection
pub struct DrainTask {
    peer: PeerId,
    queue: Arc<RingQueue>,
    transport: Arc<dyn Transport>,
    token: CancellationToken,
    ack_timeout: Duration,
    feedback: Option<mpsc::Sender<Frame>>,
}

impl DrainTask {
    /// Create a drain task for a peer
    pub fn new(
        peer: PeerId,
        queue: Arc<RingQueue>,
        transport: Arc<dyn Transport>,
        token: CancellationToken,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            peer,
            queue,
            transport,
            token,
            ack_timeout,
            feedback: None,
        }
    }

    /// Route inbound non-ack frames (feedback) to this channel
    pub fn with_feedback(mut self, feedback: mpsc::Sender<Frame>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Run until the queue is sealed and drained, or cancellation fires
    ///
    /// Returns `Ok` on orderly completion (sealed queue fully emptied).
    /// A transport failure ends the task with an error; the core never
    /// retries - reconnection policy lives with the transport owner.
    pub async fn run(self) -> Result<()> {
        let (ack_tx, mut ack_rx) = mpsc::channel(16);
        let receiver = tokio::spawn(receive_loop(
            self.peer.clone(),
            Arc::clone(&self.transport),
            self.token.clone(),
            ack_tx,
            self.feedback.clone(),
        ));

        let result = self.drive(&mut ack_rx).await;
        receiver.abort();
        result
    }

    async fn drive(&self, ack_rx: &mut mpsc::Receiver<Frame>) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    debug!(peer = %self.peer, "drain task cancelled, flushing remainder");
                    return self.drain_remaining(ack_rx).await;
                }
                maybe = self.queue.recv() => {
                    let Some(queued) = maybe else {
                        debug!(peer = %self.peer, "ring sealed and drained");
                        return Ok(());
                    };
                    self.transmit(queued, ack_rx).await?;
                }
            }
        }
    }

    /// Best-effort flush of whatever is still queued at cancellation
    ///
    /// The task set's grace timeout bounds this; a stuck transport gets
    /// the task aborted from outside.
    async fn drain_remaining(&self, ack_rx: &mut mpsc::Receiver<Frame>) -> Result<()> {
        while let Some(queued) = self.queue.pop() {
            self.transmit(queued, ack_rx).await?;
        }
        Ok(())
    }

    async fn transmit(
        &self,
        mut queued: QueuedFrame,
        ack_rx: &mut mpsc::Receiver<Frame>,
    ) -> Result<()> {
        let msg_type = queued.msg_type();
        let guid = queued.pub_guid();

        if let Err(err) = self.transport.send(queued.frame.encode()).await {
            self.queue.metrics().record_send_failure();
            warn!(peer = %self.peer, %msg_type, guid, %err, "send failed");
            return Err(err);
        }
        self.queue.metrics().record_drained();

        if msg_type.requires_ack() {
            match self.await_ack(msg_type, guid, ack_rx).await {
                Ok(()) => queued.state = FrameState::Acknowledged,
                Err(PipelineError::AckTimeout(ms)) => {
                    // the peer can still heal a missed schema through an
                    // announce request, so a late ack is not fatal
                    warn!(peer = %self.peer, %msg_type, guid, ms, "acknowledge timed out");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Wait for the Acknowledge matching the frame just sent
    async fn await_ack(
        &self,
        sent_type: MsgType,
        guid: u64,
        ack_rx: &mut mpsc::Receiver<Frame>,
    ) -> Result<()> {
        let timeout_ms = self.ack_timeout.as_millis() as u64;
        let deadline = tokio::time::Instant::now() + self.ack_timeout;
        loop {
            let maybe = tokio::time::timeout_at(deadline, ack_rx.recv())
                .await
                .map_err(|_| PipelineError::AckTimeout(timeout_ms))?;
            // a closed ack channel means the receive loop is gone
            // (cancellation or peer hangup); treated like a missed ack so
            // the remaining frames still drain
            let Some(frame) = maybe else {
                return Err(PipelineError::AckTimeout(timeout_ms));
            };

            if frame.acked_msg_type() == Some(sent_type) && frame.header.pub_guid == guid {
                self.queue.metrics().record_ack();
                return Ok(());
            }
            debug!(
                peer = %self.peer,
                acked = ?frame.acked_msg_type(),
                guid = frame.header.pub_guid,
                "unmatched acknowledge dropped"
            );
        }
    }
}

/// Inbound side of the connection
///
/// Decodes every received frame, hands Acknowledge frames to the drain
/// task and everything else to the feedback channel. Runs until the
/// connection closes or cancellation fires; the drain task aborts it on
/// exit.
async fn receive_loop(
    peer: PeerId,
    transport: Arc<dyn Transport>,
    token: CancellationToken,
    ack_tx: mpsc::Sender<Frame>,
    feedback: Option<mpsc::Sender<Frame>>,
) {
    loop {
        let bytes = tokio::select! {
            _ = token.cancelled() => return,
            received = transport.recv() => match received {
                Ok(bytes) => bytes,
                Err(err) => {
                    debug!(peer = %peer, %err, "receive loop ended");
                    return;
                }
            }
        };

        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(peer = %peer, %err, "undecodable inbound frame");
                continue;
            }
        };

        if frame.header.msg_type == MsgType::Acknowledge {
            if ack_tx.send(frame).await.is_err() {
                return;
            }
            continue;
        }

        match &feedback {
            Some(feedback) => {
                if feedback.send(frame).await.is_err() {
                    debug!(peer = %peer, "feedback receiver gone");
                }
            }
            None => {
                debug!(
                    peer = %peer,
                    msg_type = %frame.header.msg_type,
                    "unsolicited frame with no feedback channel"
                );
            }
        }
    }
}
