use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::compat::TokioAsyncReadCompatExt;
use wifi_module_host::{
    Dispatcher, Error, FrameReceiver, LinkConfig, SessionConfig, Transport, WifiSession,
};
use wifi_module_protocol::{
    Frame, MessageType,
    codec::{encode_ack, encode_frame},
    frame_parser::{FrameParser, FrameParserResult},
};

fn link(config: LinkConfig) -> (Transport, FrameReceiver, DuplexStream) {
    let (host, device) = tokio::io::duplex(4096);
    let (transport, frames) = Transport::from_stream(host.compat(), config);
    (transport, frames, device)
}

/// Read one frame the host wrote, as the module would.
async fn read_frame(device: &mut DuplexStream) -> Frame {
    let mut parser = FrameParser::new();
    let mut byte = [0u8];
    loop {
        device.read_exact(&mut byte).await.unwrap();
        if let FrameParserResult::Ready { frame, .. } = parser.parse(&byte) {
            return frame;
        }
    }
}

fn scan_entry(seq: u8, ssid: &str, channel: u32) -> Vec<u8> {
    let mut payload = vec![0xa4, 0xcf, 0x12, 0x00, 0x00, seq];
    payload.extend((-55i32).to_le_bytes());
    payload.extend(channel.to_le_bytes());
    payload.extend(3u16.to_le_bytes());
    payload.extend(ssid.as_bytes());
    payload.push(0);
    encode_frame(seq, MessageType::Response, 0xf1, &payload)
}

fn spawn_session(
    transport: Transport,
    frames: FrameReceiver,
) -> (
    Arc<Transport>,
    Arc<WifiSession<Arc<Transport>>>,
    tokio::task::JoinHandle<()>,
) {
    let transport = Arc::new(transport);
    let session = Arc::new(WifiSession::new(
        transport.clone(),
        transport.sequence_counter(),
        SessionConfig::default(),
    ));
    let mut dispatcher = Dispatcher::new();
    dispatcher.register({
        let session = session.clone();
        move |frame| session.parse(frame)
    });
    let dispatch = tokio::spawn(dispatcher.run(frames));
    (transport, session, dispatch)
}

#[tokio::test(start_paused = true)]
async fn scan_over_the_link() {
    let (transport, frames, mut device) = link(LinkConfig::default());
    let (transport, session, dispatch) = spawn_session(transport, frames);

    session.scan().await.unwrap();
    let cmd = read_frame(&mut device).await;
    assert_eq!(cmd.message_type, MessageType::Command);
    assert_eq!(cmd.message_id(), Some(0xf0));

    let mut answer = encode_frame(0, MessageType::Response, 0xf0, &[2]);
    // line noise between frames
    answer.extend([0x00, 0xff]);
    answer.extend(scan_entry(1, "honey", 6));
    answer.extend(scan_entry(2, "guest", 11));
    device.write_all(&answer).await.unwrap();

    // fires on the scan count already, entries may still be on their way
    session
        .wait_for_scan_completion(Duration::from_secs(10))
        .await;
    while session.networks_remaining() != 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let entries = session
        .drain_scan_results(Duration::from_millis(100))
        .await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].ssid, "honey");
    assert_eq!(entries[0].bssid_hex(), "a4cf12000001");
    assert_eq!(entries[1].ssid, "guest");
    assert_eq!(entries[1].channel, 11);

    transport.close().await.unwrap();
    dispatch.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn connect_over_the_link() {
    let (transport, frames, mut device) = link(LinkConfig::default());
    let (transport, session, dispatch) = spawn_session(transport, frames);

    let connect = tokio::spawn({
        let session = session.clone();
        async move { session.connect("honey", "password").await }
    });
    let cmd = read_frame(&mut device).await;
    assert_eq!(cmd.message_id(), Some(0xf2));
    assert_eq!(cmd.payload(), b"honey\0password\0");
    device
        .write_all(&encode_frame(7, MessageType::Response, 0xf3, b"\x1110.0.0.5"))
        .await
        .unwrap();

    assert!(connect.await.unwrap().unwrap());
    assert_eq!(session.ip().as_deref(), Some("10.0.0.5"));

    assert!(session.disconnect().await.unwrap());
    assert_eq!(read_frame(&mut device).await.message_id(), Some(0xf4));
    device
        .write_all(&encode_frame(8, MessageType::Response, 0xf5, &[0x11]))
        .await
        .unwrap();
    while session.is_connected() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    transport.close().await.unwrap();
    dispatch.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn acknowledges_frames_when_asked() {
    let config = LinkConfig {
        acknowledge_frames: true,
        ..LinkConfig::default()
    };
    let (transport, mut frames, mut device) = link(config);
    let response = encode_frame(0x21, MessageType::Response, 0xf0, &[0]);
    device.write_all(&response).await.unwrap();

    let frame = frames.recv().await.unwrap();
    assert_eq!(frame.to_bytes(), response);

    let mut ack = [0u8; 5];
    device.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack.as_slice(), encode_ack(&response));
    transport.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_unblocks_the_receiver() {
    let (transport, mut frames, _device) = link(LinkConfig::default());
    assert!(transport.is_open());
    transport.close().await.unwrap();
    assert!(!transport.is_open());
    assert!(frames.recv().await.is_none());
    assert!(matches!(transport.send(&[0x00]).await, Err(Error::Closed)));
    // closing twice is fine
    transport.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn device_hang_up_closes_the_link() {
    let (transport, mut frames, device) = link(LinkConfig::default());
    drop(device);
    while transport.is_open() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    transport.close().await.unwrap();
    assert!(frames.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn overflow_is_reported_on_close() {
    let (transport, mut frames, mut device) = link(LinkConfig {
        queue_capacity: 2,
        ..LinkConfig::default()
    });
    for seq in 0..3 {
        device
            .write_all(&encode_frame(seq, MessageType::Notification, 0x01, &[]))
            .await
            .unwrap();
    }
    while transport.is_open() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(matches!(
        transport.close().await,
        Err(Error::QueueOverflow { capacity: 2 })
    ));
    // the frames that made it are still delivered
    assert_eq!(frames.recv().await.unwrap().sequence_id, 0);
    assert_eq!(frames.recv().await.unwrap().sequence_id, 1);
    assert!(frames.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn overflow_ends_dispatch_and_fails_sends() {
    let (transport, frames, mut device) = link(LinkConfig {
        queue_capacity: 2,
        ..LinkConfig::default()
    });
    for seq in 0..3 {
        device
            .write_all(&encode_frame(seq, MessageType::Notification, 0x01, &[]))
            .await
            .unwrap();
    }
    while transport.is_open() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let dispatched = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = Dispatcher::new();
    dispatcher.register({
        let dispatched = dispatched.clone();
        move |_| {
            dispatched.fetch_add(1, Ordering::Relaxed);
        }
    });
    // no close(): the stopped reader alone ends the dispatch loop
    tokio::time::timeout(Duration::from_secs(60), dispatcher.run(frames))
        .await
        .expect("dispatcher should stop once the reader is gone");
    assert_eq!(dispatched.load(Ordering::Relaxed), 2);

    assert!(matches!(
        transport.send(&[0x00]).await,
        Err(Error::QueueOverflow { capacity: 2 })
    ));
    assert!(matches!(
        transport.close().await,
        Err(Error::QueueOverflow { capacity: 2 })
    ));
}

#[tokio::test]
async fn missing_device() {
    match Transport::open("/dev/does-not-exist", LinkConfig::default()).await {
        Err(Error::LinkUnavailable { path }) => assert_eq!(path, "/dev/does-not-exist"),
        Err(e) => panic!("expected LinkUnavailable, got {e}"),
        Ok(_) => panic!("the device doesn't exist"),
    }
}
