// Mock bedside agent - Streams randomly generated vitals frames to the manager
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::Rng;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use fluid_vitals::domain::vitals::{VitalSign, VitalsFrame};
use fluid_vitals::infrastructure::wire_codec;

#[derive(Parser)]
#[command(author, version, about = "Mock bedside vitals agent", long_about = None)]
struct Cli {
    /// Manager host to connect to
    #[arg(long, env = "VITALS_AGENT_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Manager vitals port
    #[arg(long, env = "VITALS_AGENT_PORT", default_value_t = 8080)]
    port: u16,

    /// Delay between frames in milliseconds
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,

    /// Stop after this many frames (runs until interrupted when omitted)
    #[arg(long)]
    count: Option<u64>,
}

/// Inclusive ranges of a stable adult patient.
const MOCK_RANGES: [(VitalSign, f64, f64); 6] = [
    (VitalSign::HeartRate, 60.0, 100.0),
    (VitalSign::MeanArterialPressure, 70.0, 105.0),
    (VitalSign::RespiratoryRate, 12.0, 20.0),
    (VitalSign::SystolicBp, 90.0, 130.0),
    (VitalSign::DiastolicBp, 60.0, 90.0),
    (VitalSign::Spo2, 95.0, 100.0),
];

fn mock_frame() -> VitalsFrame {
    let mut rng = rand::thread_rng();
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    VitalsFrame::from_readings(
        timestamp,
        MOCK_RANGES
            .iter()
            .map(|&(sign, low, high)| (sign, rng.gen_range(low..=high).round() as i64)),
    )
}

/// Writes one mock frame per tick until `stop` resolves or the write fails.
///
/// Returns the number of frames sent, at most `count` when one is given.
async fn stream_frames<W, F>(out: &mut W, interval: Duration, count: Option<u64>, stop: F) -> u64
where
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    let mut sent = 0u64;
    tokio::pin!(stop);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let frame = mock_frame();
                if let Err(e) = out.write_all(&wire_codec::encode(&frame)).await {
                    tracing::warn!(error = %e, sent, "connection lost");
                    break;
                }
                sent += 1;
                tracing::debug!(timestamp = %frame.timestamp, "frame sent");
                if count.is_some_and(|limit| sent >= limit) {
                    break;
                }
            }
        }
    }
    sent
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    tracing::info!(%addr, interval_ms = cli.interval_ms, "agent connected");

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };
    let sent = stream_frames(
        &mut stream,
        Duration::from_millis(cli.interval_ms.max(1)),
        cli.count,
        interrupted,
    )
    .await;
    tracing::info!(sent, "stopping agent");

    stream.shutdown().await.ok();
    Ok(())
}
