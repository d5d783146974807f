use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use fluid_vitals::application::events::{event_channel, MonitorEvent};
use fluid_vitals::application::inference_cache::InferenceCache;
use fluid_vitals::domain::features::FeatureLayout;
use fluid_vitals::domain::vitals::{VitalSign, VitalsFrame};
use fluid_vitals::infrastructure::connection::{ConnectionContext, ConnectionSettings};
use fluid_vitals::infrastructure::listener::{ListenerError, ListenerSettings, VitalsListener};
use fluid_vitals::infrastructure::wire_codec;
use fluid_vitals::presentation::host::PatientRegistry;

struct Harness {
    listener: VitalsListener,
    cache: Arc<InferenceCache>,
    patients: Arc<PatientRegistry>,
    events: mpsc::Receiver<MonitorEvent>,
}

fn harness(settings: ListenerSettings) -> Harness {
    let layout = FeatureLayout::Standard;
    let cache = Arc::new(InferenceCache::new(100, layout.width()));
    let patients = Arc::new(PatientRegistry::new());
    let (events, rx) = event_channel(64);
    let ctx = Arc::new(ConnectionContext {
        cache: cache.clone(),
        layout,
        patient: patients.clone(),
        events,
        settings: ConnectionSettings {
            idle_timeout: Duration::from_secs(5),
            ..ConnectionSettings::default()
        },
    });

    Harness {
        listener: VitalsListener::new(ctx, settings),
        cache,
        patients,
        events: rx,
    }
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn frame(systolic: i64, diastolic: i64) -> bytes::Bytes {
    wire_codec::encode(&VitalsFrame::from_readings(
        "2026-10-19T08:00:00.000Z",
        [
            (VitalSign::HeartRate, 72),
            (VitalSign::SystolicBp, systolic),
            (VitalSign::DiastolicBp, diastolic),
        ],
    ))
}

async fn next_event(rx: &mut mpsc::Receiver<MonitorEvent>) -> MonitorEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

#[tokio::test]
async fn noisy_client_does_not_affect_concurrent_client() {
    let mut h = harness(ListenerSettings::default());
    let addr = h.listener.start(loopback()).await.unwrap();
    let session = h.patients.select("MRN-7".to_string(), None).session;

    let mut bad = TcpStream::connect(addr).await.unwrap();
    let mut good = TcpStream::connect(addr).await.unwrap();

    bad.write_all(&[0x30, 0x05, 0xde, 0xad, 0xbe, 0xef, 0x00])
        .await
        .unwrap();
    good.write_all(&frame(120, 80)).await.unwrap();

    match next_event(&mut h.events).await {
        MonitorEvent::VitalsUpdate {
            session: seen,
            record,
            ppv,
        } => {
            assert_eq!(seen, session);
            assert_eq!(record.systolic_bp, Some(120.0));
            assert_eq!(record.heart_rate, Some(72.0));
            assert_eq!(ppv.as_deref(), Some("0.0"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // more noise, then the noisy peer disconnects while the other keeps streaming
    bad.write_all(b"\x04\x03bad").await.unwrap();
    drop(bad);

    good.write_all(&frame(130, 70)).await.unwrap();
    match next_event(&mut h.events).await {
        MonitorEvent::VitalsUpdate { ppv, .. } => assert_eq!(ppv.as_deref(), Some("40.0")),
        other => panic!("unexpected event {other:?}"),
    }

    good.write_all(&frame(125, 75)).await.unwrap();
    match next_event(&mut h.events).await {
        MonitorEvent::VitalsUpdate { ppv, .. } => assert_eq!(ppv.as_deref(), Some("40.0")),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.cache.len(), 3);

    h.listener.stop().await;
}

#[tokio::test]
async fn stop_is_bounded_and_port_is_reusable() {
    let h = harness(ListenerSettings {
        max_connections: 4,
        shutdown_grace: Duration::from_millis(500),
    });
    let addr = h.listener.start(loopback()).await.unwrap();

    // an idle but open client must not hold up shutdown
    let mut idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), h.listener.stop())
        .await
        .expect("stop exceeded its bound");
    assert!(!h.listener.is_running());

    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(1), idle.read(&mut buf))
        .await
        .expect("client was not disconnected");
    assert!(matches!(read, Ok(0) | Err(_)));

    // second stop is a no-op
    h.listener.stop().await;

    let restarted = h.listener.start(addr).await.unwrap();
    assert_eq!(restarted, addr);
    h.listener.stop().await;
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let h = harness(ListenerSettings::default());
    let addr = h.listener.start(loopback()).await.unwrap();

    match h.listener.start(loopback()).await {
        Err(ListenerError::AlreadyRunning(running)) => assert_eq!(running, addr),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }

    h.listener.stop().await;
}

#[tokio::test]
async fn connections_over_the_limit_are_closed() {
    let mut h = harness(ListenerSettings {
        max_connections: 1,
        shutdown_grace: Duration::from_millis(500),
    });
    let addr = h.listener.start(loopback()).await.unwrap();

    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(&frame(120, 80)).await.unwrap();
    next_event(&mut h.events).await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
        .await
        .expect("over-limit connection was left open");
    assert!(matches!(read, Ok(0) | Err(_)));

    // the admitted client keeps working
    first.write_all(&frame(125, 80)).await.unwrap();
    assert!(matches!(
        next_event(&mut h.events).await,
        MonitorEvent::VitalsUpdate { .. }
    ));

    h.listener.stop().await;
}
