use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use log::{error, info};

use airtime::capture::{FrameSource, LiveSource, OfflineSource, Poll, TraceWriter};
use airtime::status::{level_for, StatusLogger};
use airtime::util::capture_ts_to_iso8601;
use airtime::AirtimeSession;

#[derive(Parser, Debug)]
#[command(name = "airtime", version)]
#[command(about = "Estimate 802.11 airtime from radiotap captures")]
#[command(group(ArgGroup::new("source").required(true).args(["interface", "read"])))]
struct Cli {
    /// Capture live from an interface already in monitor mode
    #[arg(short, long)]
    interface: Option<String>,

    /// Process a pcap or pcapng capture
    #[arg(short, long)]
    read: Option<PathBuf>,

    /// Save processed frames to a pcapng file
    #[arg(short, long)]
    write: Option<PathBuf>,

    /// Stop a live capture after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Stop after this many frames
    #[arg(short, long)]
    count: Option<u64>,

    /// More output (repeat for debug and trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    StatusLogger::init(level_for(cli.verbose, cli.quiet)).context("Installing logger")?;

    let mut source: Box<dyn FrameSource> = match (&cli.interface, &cli.read) {
        (Some(interface), _) => Box::new(
            LiveSource::open(interface)
                .with_context(|| format!("Opening capture socket on {}", interface))?,
        ),
        (None, Some(path)) => Box::new(
            OfflineSource::open(path)
                .with_context(|| format!("Opening capture file {}", path.display()))?,
        ),
        (None, None) => bail!("Either --interface or --read is required"),
    };

    let mut writer = match &cli.write {
        Some(path) => Some(
            TraceWriter::create(path, cli.interface.as_deref())
                .with_context(|| format!("Creating {}", path.display()))?,
        ),
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let deadline = cli.duration.map(Duration::from_secs);
    let start_time = Instant::now();
    let mut session = AirtimeSession::new();
    let mut frames = 0u64;

    while running.load(Ordering::SeqCst) {
        if deadline.map_or(false, |d| start_time.elapsed() >= d) {
            info!("Capture time elapsed");
            break;
        }
        if cli.count.map_or(false, |c| frames >= c) {
            break;
        }

        let frame = match source.poll_frame() {
            Ok(Poll::Ready(frame)) => frame,
            Ok(Poll::Idle) => {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            Ok(Poll::Finished) => break,
            Err(e) => {
                error!("Capture error: {}", e);
                break;
            }
        };
        frames += 1;

        if let Some(writer) = writer.as_mut() {
            writer.write(&frame).context("Writing frame")?;
        }

        if let Ok(report) = session.process(&frame) {
            info!(
                "{} {} {} bytes: {}us ({:?}), total {}us",
                capture_ts_to_iso8601(report.timestamp),
                report.mode,
                report.frame_length,
                report.duration_us,
                report.membership,
                report.total_us
            );
        }
    }

    if let Some(writer) = writer {
        let written = writer.written();
        writer.finish().context("Flushing output file")?;
        info!("Saved {} frames", written);
    }

    println!("{}", session.summary());
    Ok(())
}
