// Connection handler - Reads, decodes and forwards frames from one device link
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use crate::application::events::{EventSender, MonitorEvent, PatientContext};
use crate::application::inference_cache::InferenceCache;
use crate::application::ppv::PpvCalculator;
use crate::domain::errors::ConnectionError;
use crate::domain::features::{FeatureLayout, FeatureVector};
use crate::domain::session::SessionId;
use crate::domain::vitals::{VitalsFrame, VitalsRecord};
use crate::infrastructure::framing::FrameAccumulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub read_chunk_bytes: usize,
    pub idle_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_chunk_bytes: 1024,
            idle_timeout: Duration::from_secs(10),
            max_frame_bytes: 4096,
        }
    }
}

/// Collaborators shared by every connection handler.
pub struct ConnectionContext {
    pub cache: Arc<InferenceCache>,
    pub layout: FeatureLayout,
    pub patient: Arc<dyn PatientContext>,
    pub events: EventSender,
    pub settings: ConnectionSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub frames: u64,
    pub malformed: u64,
}

pub struct ConnectionHandler<S> {
    stream: S,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
    shutdown: watch::Receiver<bool>,
    frames: FrameAccumulator,
    ppv: PpvCalculator,
    session: Option<SessionId>,
    summary: ConnectionSummary,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        ctx: Arc<ConnectionContext>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let frames = FrameAccumulator::new(ctx.settings.max_frame_bytes);
        Self {
            stream,
            peer,
            ctx,
            shutdown,
            frames,
            ppv: PpvCalculator::new(),
            session: None,
            summary: ConnectionSummary::default(),
        }
    }

    /// Reads until the peer closes, goes idle, fails, or shutdown is signalled.
    ///
    /// Malformed frames are counted and skipped; they never end the connection.
    pub async fn run(mut self) -> Result<ConnectionSummary, ConnectionError> {
        let idle = self.ctx.settings.idle_timeout;
        let mut chunk = vec![0u8; self.ctx.settings.read_chunk_bytes.max(1)];

        loop {
            if *self.shutdown.borrow() {
                tracing::debug!(peer = %self.peer, "shutdown observed, closing connection");
                return Ok(self.summary);
            }

            let read = tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::debug!(peer = %self.peer, "shutdown observed, closing connection");
                        return Ok(self.summary);
                    }
                    continue;
                }
                read = tokio::time::timeout(idle, self.stream.read(&mut chunk)) => read,
            };

            let n = match read {
                Err(_) => return Err(ConnectionError::IdleTimeout(idle)),
                Ok(Err(e)) => return Err(ConnectionError::Io(e)),
                Ok(Ok(0)) => {
                    tracing::debug!(peer = %self.peer, "peer closed connection");
                    return Ok(self.summary);
                }
                Ok(Ok(n)) => n,
            };

            self.frames.extend(&chunk[..n]);
            while let Some(decoded) = self.frames.next_frame() {
                match decoded {
                    Ok(frame) => self.handle_frame(frame),
                    Err(e) => {
                        self.summary.malformed += 1;
                        tracing::warn!(peer = %self.peer, error = %e, "dropping malformed frame");
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: VitalsFrame) {
        let record = match VitalsRecord::from_frame(frame) {
            Ok(record) => record,
            Err(e) => {
                self.summary.malformed += 1;
                tracing::warn!(peer = %self.peer, error = %e, "dropping frame with unexpected codes");
                return;
            }
        };
        self.summary.frames += 1;

        let session = self.ctx.patient.current_session_id();
        if self.session != Some(session) {
            if self.session.is_some() {
                tracing::info!(peer = %self.peer, %session, "session changed, resetting PPV");
            }
            self.ppv.reset();
            self.session = Some(session);
        }
        let ppv = self.ppv.update_from_record(&record);

        let vector = FeatureVector::from_record(
            &record,
            self.ctx.layout,
            self.ctx.patient.current_patient_age(),
        );
        if let Err(e) = self.ctx.cache.push(vector) {
            tracing::warn!(peer = %self.peer, error = %e, "feature vector rejected by cache");
        }

        tracing::debug!(peer = %self.peer, %session, timestamp = %record.timestamp, ?ppv, "vitals frame decoded");
        self.ctx.events.publish(MonitorEvent::VitalsUpdate {
            session,
            record,
            ppv,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    use crate::application::events::event_channel;
    use crate::domain::vitals::VitalSign;
    use crate::infrastructure::wire_codec;

    #[derive(Default)]
    struct SwitchablePatient {
        session: AtomicU64,
    }

    impl PatientContext for SwitchablePatient {
        fn current_session_id(&self) -> SessionId {
            SessionId(self.session.load(Ordering::SeqCst))
        }
    }

    fn context(
        patient: Arc<dyn PatientContext>,
        idle_timeout: Duration,
    ) -> (Arc<ConnectionContext>, mpsc::Receiver<MonitorEvent>) {
        let (events, rx) = event_channel(64);
        let ctx = Arc::new(ConnectionContext {
            cache: Arc::new(InferenceCache::new(100, FeatureLayout::Standard.width())),
            layout: FeatureLayout::Standard,
            patient,
            events,
            settings: ConnectionSettings {
                idle_timeout,
                ..ConnectionSettings::default()
            },
        });
        (ctx, rx)
    }

    fn bp_frame(systolic: i64, diastolic: i64) -> bytes::Bytes {
        wire_codec::encode(&VitalsFrame::from_readings(
            "t",
            [(VitalSign::SystolicBp, systolic), (VitalSign::DiastolicBp, diastolic)],
        ))
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn ppv_of(event: MonitorEvent) -> Option<String> {
        match event {
            MonitorEvent::VitalsUpdate { ppv, .. } => ppv,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_then_valid_frame() {
        let (ctx, mut rx) = context(Arc::new(SwitchablePatient::default()), Duration::from_secs(5));
        let (_tx, shutdown) = watch::channel(false);
        let (client, server) = tokio::io::duplex(4096);
        let handler = ConnectionHandler::new(server, peer(), ctx.clone(), shutdown);
        let task = tokio::spawn(handler.run());

        // noise and a valid frame in the same write
        let mut chunk = b"\x04\x03bad".to_vec();
        chunk.extend_from_slice(&bp_frame(120, 80));
        let mut client = client;
        client.write_all(&chunk).await.unwrap();
        drop(client);

        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary, ConnectionSummary { frames: 1, malformed: 1 });
        assert_eq!(ppv_of(rx.recv().await.unwrap()).as_deref(), Some("0.0"));
        assert_eq!(ctx.cache.len(), 1);
    }

    #[tokio::test]
    async fn test_ppv_resets_on_session_change() {
        let patient = Arc::new(SwitchablePatient::default());
        let (ctx, mut rx) = context(patient.clone(), Duration::from_secs(5));
        let (_tx, shutdown) = watch::channel(false);
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(ConnectionHandler::new(server, peer(), ctx, shutdown).run());

        client.write_all(&bp_frame(120, 80)).await.unwrap();
        assert_eq!(ppv_of(rx.recv().await.unwrap()).as_deref(), Some("0.0"));
        client.write_all(&bp_frame(130, 70)).await.unwrap();
        assert_eq!(ppv_of(rx.recv().await.unwrap()).as_deref(), Some("40.0"));

        patient.session.store(1, Ordering::SeqCst);
        client.write_all(&bp_frame(130, 70)).await.unwrap();
        match rx.recv().await.unwrap() {
            MonitorEvent::VitalsUpdate { session, ppv, .. } => {
                assert_eq!(session, SessionId(1));
                assert_eq!(ppv.as_deref(), Some("0.0"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        drop(client);
        assert_eq!(task.await.unwrap().unwrap().frames, 3);
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_connection() {
        let (ctx, _rx) = context(Arc::new(SwitchablePatient::default()), Duration::from_millis(50));
        let (_tx, shutdown) = watch::channel(false);
        let (_client, server) = tokio::io::duplex(64);

        let result = ConnectionHandler::new(server, peer(), ctx, shutdown).run().await;
        assert!(matches!(result, Err(ConnectionError::IdleTimeout(_))));
    }

    #[tokio::test]
    async fn test_shutdown_signal_ends_connection() {
        let (ctx, _rx) = context(Arc::new(SwitchablePatient::default()), Duration::from_secs(30));
        let (tx, shutdown) = watch::channel(false);
        let (_client, server) = tokio::io::duplex(64);
        let task = tokio::spawn(ConnectionHandler::new(server, peer(), ctx, shutdown).run());

        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
