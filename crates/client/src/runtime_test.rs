use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use beacon_config::Config;
use beacon_pipeline::{ChannelTransport, Transport};
use beacon_protocol::{decode_values, Frame, Metadata, MsgType, Role, ValueData, ValueType};

use crate::runtime::{LifecycleState, Runtime};
use crate::ClientError;

fn test_config() -> Config {
    let mut config = Config::default();
    // background ticks effectively off so explicit flush calls fully
    // determine the frame sequence; no heartbeat noise either
    config.global.flush_interval_ms = 60_000;
    config.global.heartbeat_interval_ms = 0;
    config.global.ack_timeout_ms = 500;
    config.global.drain_timeout_ms = 500;
    config
}

/// Records every frame a runtime sends and acks what needs acking
fn spawn_fake_daemon(
    remote: ChannelTransport,
    grant_start: u64,
) -> Arc<Mutex<Vec<Frame>>> {
    let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&frames);
    tokio::spawn(async move {
        loop {
            let Ok(bytes) = remote.recv().await else { break };
            let Ok(frame) = Frame::decode(bytes) else { break };
            let header = frame.header;
            let is_shutdown = header.msg_type == MsgType::Shutdown;
            seen.lock().push(frame);
            let reply = match header.msg_type {
                MsgType::Register => {
                    Some(Frame::ack_with_grant(&header, Role::Daemon, grant_start, 100))
                }
                t if t.requires_ack() => Some(Frame::ack_for(&header, Role::Daemon)),
                _ => None,
            };
            if let Some(reply) = reply {
                if remote.send(reply.encode()).await.is_err() {
                    break;
                }
            }
            if is_shutdown {
                break;
            }
        }
    });
    frames
}

async fn wait_until(frames: &Arc<Mutex<Vec<Frame>>>, pred: impl Fn(&[Frame]) -> bool) {
    for _ in 0..200 {
        if pred(&frames.lock()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_detached_runtime_publish_and_read() {
    let runtime = Runtime::with_transport(test_config(), None).await.unwrap();
    assert_eq!(runtime.state(), LifecycleState::Running);

    let handle = runtime.new_pub("app.stats").unwrap();
    handle
        .add_element("count", ValueType::Integer, Metadata::default())
        .unwrap();
    handle.publish("count", 5i64).unwrap();

    assert!(handle.has_pending());
    assert_eq!(
        handle.get_val("count").unwrap(),
        Some(ValueData::Integer(5))
    );
    assert_eq!(runtime.pub_count(), 1);

    runtime.finalize().await;
}

#[tokio::test]
async fn test_finalize_rejects_further_calls() {
    let runtime = Runtime::with_transport(test_config(), None).await.unwrap();
    let handle = runtime.new_pub("p").unwrap();
    handle
        .add_element("x", ValueType::Integer, Metadata::default())
        .unwrap();

    runtime.finalize().await;
    assert_eq!(runtime.state(), LifecycleState::Shutdown);

    assert!(matches!(
        handle.publish("x", 1i64).unwrap_err(),
        ClientError::RuntimeShutdown
    ));
    assert!(matches!(
        runtime.new_pub("q").unwrap_err(),
        ClientError::RuntimeShutdown
    ));

    // finalize is idempotent
    runtime.finalize().await;
}

#[tokio::test]
async fn test_register_handshake_seeds_allocator() {
    let (local, remote) = ChannelTransport::pair(32);
    let frames = spawn_fake_daemon(remote, 5000);

    let runtime = Runtime::with_transport(test_config(), Some(Arc::new(local)))
        .await
        .unwrap();

    // guids come from the granted block
    let handle = runtime.new_pub("p").unwrap();
    assert_eq!(handle.guid(), 5000);
    let other = runtime.new_pub("q").unwrap();
    assert_eq!(other.guid(), 5001);

    wait_until(&frames, |f| !f.is_empty()).await;
    assert_eq!(frames.lock()[0].header.msg_type, MsgType::Register);

    runtime.finalize().await;
}

#[tokio::test]
async fn test_announce_precedes_values() {
    let (local, remote) = ChannelTransport::pair(32);
    let frames = spawn_fake_daemon(remote, 100);

    let runtime = Runtime::with_transport(test_config(), Some(Arc::new(local)))
        .await
        .unwrap();
    let handle = runtime.new_pub("solver").unwrap();
    handle
        .add_element("x", ValueType::Double, Metadata::default())
        .unwrap();
    handle
        .add_element("y", ValueType::Integer, Metadata::default())
        .unwrap();

    handle.publish("x", 3.14).unwrap();
    assert!(handle.flush().unwrap());

    wait_until(&frames, |f| {
        f.iter().any(|fr| fr.header.msg_type == MsgType::Value)
    })
    .await;

    let seen = frames.lock();
    let kinds: Vec<MsgType> = seen.iter().map(|f| f.header.msg_type).collect();
    assert_eq!(
        kinds,
        vec![MsgType::Register, MsgType::Announce, MsgType::Value]
    );

    // the value frame carries exactly the one dirty element
    let value = &seen[2];
    assert_eq!(value.header.pub_guid, 100);
    let deltas = decode_values(&value.payload).unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].index, 0);
    assert_eq!(deltas[0].data, ValueData::Double(3.14));
    drop(seen);

    runtime.finalize().await;
}

#[tokio::test]
async fn test_schema_growth_reannounces() {
    let (local, remote) = ChannelTransport::pair(32);
    let frames = spawn_fake_daemon(remote, 100);

    let runtime = Runtime::with_transport(test_config(), Some(Arc::new(local)))
        .await
        .unwrap();
    let handle = runtime.new_pub("grow").unwrap();
    handle
        .add_element("a", ValueType::Integer, Metadata::default())
        .unwrap();
    handle.publish("a", 1i64).unwrap();
    handle.flush().unwrap();

    handle
        .add_element("b", ValueType::Integer, Metadata::default())
        .unwrap();
    handle.publish("b", 2i64).unwrap();
    handle.flush().unwrap();

    wait_until(&frames, |f| {
        f.iter().filter(|fr| fr.header.msg_type == MsgType::Value).count() == 2
    })
    .await;

    let seen = frames.lock();
    let kinds: Vec<MsgType> = seen.iter().map(|f| f.header.msg_type).collect();
    assert_eq!(
        kinds,
        vec![
            MsgType::Register,
            MsgType::Announce,
            MsgType::Value,
            MsgType::Reannounce,
            MsgType::Value,
        ]
    );

    // version moved by exactly one between the announces
    assert_eq!(seen[1].header.version + 1, seen[3].header.version);
    // the second value frame addresses the new element's index
    let deltas = decode_values(&seen[4].payload).unwrap();
    assert_eq!(deltas[0].index, 1);
    drop(seen);

    runtime.finalize().await;
}

#[tokio::test]
async fn test_publish_immediately_flushes_inline() {
    let (local, remote) = ChannelTransport::pair(32);
    let frames = spawn_fake_daemon(remote, 100);

    // only the inline path may send; the background tick is parked
    let runtime = Runtime::with_transport(test_config(), Some(Arc::new(local)))
        .await
        .unwrap();
    let handle = runtime.new_pub("alarm").unwrap();
    handle
        .add_element("sos", ValueType::Text, Metadata::default())
        .unwrap();

    handle.publish_immediately("sos", "overload").unwrap();
    assert!(!handle.has_pending());

    wait_until(&frames, |f| {
        f.iter().any(|fr| fr.header.msg_type == MsgType::Value)
    })
    .await;

    runtime.finalize().await;
}

#[tokio::test]
async fn test_announce_request_triggers_reannounce() {
    let (local, remote) = ChannelTransport::pair(32);

    // hand-rolled daemon: acks everything, then asks for a re-announce
    // after the first value frame
    let frames: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&frames);
    tokio::spawn(async move {
        let mut requested = false;
        loop {
            let Ok(bytes) = remote.recv().await else { break };
            let Ok(frame) = Frame::decode(bytes) else { break };
            let header = frame.header;
            let is_shutdown = header.msg_type == MsgType::Shutdown;
            seen.lock().push(frame);
            let reply = match header.msg_type {
                MsgType::Register => {
                    Some(Frame::ack_with_grant(&header, Role::Daemon, 100, 100))
                }
                t if t.requires_ack() => Some(Frame::ack_for(&header, Role::Daemon)),
                _ => None,
            };
            if let Some(reply) = reply {
                let _ = remote.send(reply.encode()).await;
            }
            if header.msg_type == MsgType::Value && !requested {
                requested = true;
                let request =
                    Frame::empty(MsgType::AnnounceRequest, Role::Daemon, header.pub_guid, 0);
                let _ = remote.send(request.encode()).await;
            }
            if is_shutdown {
                break;
            }
        }
    });

    let runtime = Runtime::with_transport(test_config(), Some(Arc::new(local)))
        .await
        .unwrap();
    let handle = runtime.new_pub("healing").unwrap();
    handle
        .add_element("x", ValueType::Integer, Metadata::default())
        .unwrap();
    handle.publish("x", 1i64).unwrap();
    handle.flush().unwrap();

    // the announce request comes back through the feedback path and
    // produces a second schema frame
    wait_until(&frames, |f| {
        f.iter()
            .filter(|fr| {
                matches!(
                    fr.header.msg_type,
                    MsgType::Announce | MsgType::Reannounce
                )
            })
            .count()
            >= 2
    })
    .await;

    runtime.finalize().await;
}

#[tokio::test]
async fn test_background_flush_tick_sends_values() {
    let mut config = test_config();
    config.global.flush_interval_ms = 10;

    let (local, remote) = ChannelTransport::pair(32);
    let frames = spawn_fake_daemon(remote, 100);

    let runtime = Runtime::with_transport(config, Some(Arc::new(local)))
        .await
        .unwrap();
    let handle = runtime.new_pub("ticked").unwrap();
    handle
        .add_element("n", ValueType::Integer, Metadata::default())
        .unwrap();

    // no explicit flush; the background task picks the write up
    handle.publish("n", 11i64).unwrap();
    wait_until(&frames, |f| {
        f.iter().any(|fr| fr.header.msg_type == MsgType::Value)
    })
    .await;

    runtime.finalize().await;
}

#[tokio::test]
async fn test_free_pub_removes_from_table() {
    let runtime = Runtime::with_transport(test_config(), None).await.unwrap();
    let handle = runtime.new_pub("doomed").unwrap();
    let stale = handle.clone();
    assert_eq!(runtime.pub_count(), 1);

    handle.free().unwrap();
    assert_eq!(runtime.pub_count(), 0);

    // a lingering clone cannot free twice
    assert!(matches!(
        stale.free().unwrap_err(),
        ClientError::UnknownPub(_)
    ));

    runtime.finalize().await;
}

#[tokio::test]
async fn test_shutdown_frame_is_last() {
    let (local, remote) = ChannelTransport::pair(32);
    let frames = spawn_fake_daemon(remote, 100);

    let runtime = Runtime::with_transport(test_config(), Some(Arc::new(local)))
        .await
        .unwrap();
    let handle = runtime.new_pub("p").unwrap();
    handle
        .add_element("x", ValueType::Integer, Metadata::default())
        .unwrap();
    handle.publish("x", 7i64).unwrap();
    handle.flush().unwrap();

    runtime.finalize().await;

    wait_until(&frames, |f| {
        f.last()
            .map(|fr| fr.header.msg_type == MsgType::Shutdown)
            .unwrap_or(false)
    })
    .await;

    // every queued frame went out before the shutdown marker
    let seen = frames.lock();
    assert!(seen.iter().any(|f| f.header.msg_type == MsgType::Value));
    assert_eq!(seen.last().unwrap().header.msg_type, MsgType::Shutdown);
}
