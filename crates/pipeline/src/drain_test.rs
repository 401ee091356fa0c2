use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use beacon_protocol::{Frame, FrameHeader, MsgType, Priority, Role};

use crate::drain::DrainTask;
use crate::ring::{OverflowPolicy, QueuedFrame, RingQueue};
use crate::transport::{ChannelTransport, PeerId, Transport};

fn value_frame(guid: u64) -> Frame {
    Frame::empty(MsgType::Value, Role::Client, guid, 1)
}

fn spawn_drain(
    ring: Arc<RingQueue>,
    transport: ChannelTransport,
    token: CancellationToken,
    feedback: Option<mpsc::Sender<Frame>>,
) -> tokio::task::JoinHandle<crate::Result<()>> {
    let mut task = DrainTask::new(
        PeerId::from("peer"),
        ring,
        Arc::new(transport),
        token,
        Duration::from_millis(500),
    );
    if let Some(feedback) = feedback {
        task = task.with_feedback(feedback);
    }
    tokio::spawn(task.run())
}

#[tokio::test]
async fn test_frames_drain_in_order() {
    let ring = Arc::new(RingQueue::new(8, OverflowPolicy::default()));
    let (local, remote) = ChannelTransport::pair(8);
    let token = CancellationToken::new();

    for guid in 1..=3 {
        ring.push(QueuedFrame::new(value_frame(guid), Priority::Default))
            .unwrap();
    }
    ring.push(QueuedFrame::new(
        Frame::empty(MsgType::Shutdown, Role::Client, 0, 0),
        Priority::Default,
    ))
    .unwrap();

    let handle = spawn_drain(ring, local, token, None);

    for guid in 1..=3 {
        let frame = Frame::decode(remote.recv().await.unwrap()).unwrap();
        assert_eq!(frame.header.msg_type, MsgType::Value);
        assert_eq!(frame.header.pub_guid, guid);
    }
    let last = Frame::decode(remote.recv().await.unwrap()).unwrap();
    assert_eq!(last.header.msg_type, MsgType::Shutdown);

    // sealed ring fully drained ends the task cleanly
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_announce_waits_for_ack() {
    let ring = Arc::new(RingQueue::new(8, OverflowPolicy::default()));
    let (local, remote) = ChannelTransport::pair(8);
    let token = CancellationToken::new();

    let announce = Frame::empty(MsgType::Announce, Role::Client, 5, 1);
    ring.push(QueuedFrame::new(announce, Priority::Immediate))
        .unwrap();
    ring.push(QueuedFrame::new(value_frame(5), Priority::Default))
        .unwrap();
    ring.seal();

    let metrics = ring.metrics();
    let handle = spawn_drain(ring, local, token, None);

    let received = Frame::decode(remote.recv().await.unwrap()).unwrap();
    assert_eq!(received.header.msg_type, MsgType::Announce);

    // the value frame is not sent until the ack arrives
    let ack = Frame::ack_for(&received.header, Role::Daemon);
    remote.send(ack.encode()).await.unwrap();

    let next = Frame::decode(remote.recv().await.unwrap()).unwrap();
    assert_eq!(next.header.msg_type, MsgType::Value);

    handle.await.unwrap().unwrap();
    assert_eq!(metrics.snapshot().acks_received, 1);
}

#[tokio::test]
async fn test_feedback_routed_while_waiting_for_ack() {
    let ring = Arc::new(RingQueue::new(8, OverflowPolicy::default()));
    let (local, remote) = ChannelTransport::pair(8);
    let token = CancellationToken::new();
    let (feedback_tx, mut feedback_rx) = mpsc::channel(4);

    ring.push(QueuedFrame::new(
        Frame::empty(MsgType::Announce, Role::Client, 9, 2),
        Priority::Immediate,
    ))
    .unwrap();
    ring.seal();

    let handle = spawn_drain(ring, local, token, Some(feedback_tx));

    let received = Frame::decode(remote.recv().await.unwrap()).unwrap();

    // daemon interleaves an announce request before the ack
    let request = Frame::empty(MsgType::AnnounceRequest, Role::Daemon, 77, 0);
    remote.send(request.encode()).await.unwrap();
    remote
        .send(Frame::ack_for(&received.header, Role::Daemon).encode())
        .await
        .unwrap();

    let fed = feedback_rx.recv().await.unwrap();
    assert_eq!(fed.header.msg_type, MsgType::AnnounceRequest);
    assert_eq!(fed.header.pub_guid, 77);

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ack_timeout_is_not_fatal() {
    let ring = Arc::new(RingQueue::new(8, OverflowPolicy::default()));
    let (local, remote) = ChannelTransport::pair(8);
    let token = CancellationToken::new();

    let task = DrainTask::new(
        PeerId::from("peer"),
        Arc::clone(&ring),
        Arc::new(local),
        token,
        Duration::from_millis(20),
    );

    ring.push(QueuedFrame::new(
        Frame::empty(MsgType::Announce, Role::Client, 1, 1),
        Priority::Immediate,
    ))
    .unwrap();
    ring.push(QueuedFrame::new(value_frame(1), Priority::Default))
        .unwrap();
    ring.seal();

    let handle = tokio::spawn(task.run());

    // never ack; after the timeout the value frame still flows
    let first = Frame::decode(remote.recv().await.unwrap()).unwrap();
    assert_eq!(first.header.msg_type, MsgType::Announce);
    let second = Frame::decode(remote.recv().await.unwrap()).unwrap();
    assert_eq!(second.header.msg_type, MsgType::Value);

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_cancellation_flushes_remainder() {
    let ring = Arc::new(RingQueue::new(8, OverflowPolicy::default()));
    let (local, remote) = ChannelTransport::pair(8);
    let token = CancellationToken::new();

    // cancel before the task even starts; queued frames still go out
    ring.push(QueuedFrame::new(value_frame(1), Priority::Default))
        .unwrap();
    ring.push(QueuedFrame::new(value_frame(2), Priority::Default))
        .unwrap();
    token.cancel();

    let handle = spawn_drain(ring, local, token, None);

    assert_eq!(
        Frame::decode(remote.recv().await.unwrap()).unwrap().header.pub_guid,
        1
    );
    assert_eq!(
        Frame::decode(remote.recv().await.unwrap()).unwrap().header.pub_guid,
        2
    );
    handle.await.unwrap().unwrap();
}
