use std::io;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;
use vidcast::config::{DEFAULT_FRAME_RATE, DEFAULT_QUALITY_PERCENT};
use vidcast::media::mjpeg::DEFAULT_MTU;
use vidcast::{
    Destination, MediaLocator, MjpegConfig, MjpegFileBackend, SessionController, TransmitConfig,
};

#[derive(Parser)]
#[command(
    name = "vidcast",
    about = "Transmit an MJPEG source as JPEG/RTP (RFC 2435) over UDP"
)]
struct Args {
    /// Source locator (file:///path/clip.mjpeg or a plain path)
    source: String,

    /// Destination host
    host: String,

    /// Destination UDP port
    port: u16,

    /// JPEG quality in percent (0-100)
    #[arg(long, short, default_value_t = DEFAULT_QUALITY_PERCENT)]
    quality: f32,

    /// Frame rate of the source
    #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
    frame_rate: f32,

    /// Maximum RTP payload size in bytes
    #[arg(long, default_value_t = DEFAULT_MTU)]
    mtu: usize,

    /// Restart the source when it ends
    #[arg(long = "loop")]
    loop_playback: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let backend = MjpegFileBackend::new(MjpegConfig {
        frame_rate: args.frame_rate,
        loop_playback: args.loop_playback,
        mtu: args.mtu,
        ..MjpegConfig::default()
    });
    let controller = SessionController::from_locator(
        backend,
        MediaLocator::new(args.source),
        Destination::new(&args.host, args.port),
        TransmitConfig {
            quality_percent: args.quality,
            ..TransmitConfig::default()
        },
    );

    if let Err(e) = controller.start() {
        eprintln!("Failed to start transmission: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(format) = controller.negotiated_format() {
        println!("Transmitting {format} to {}", controller.destination());
    }
    println!("Press Enter to stop");

    let (enter_tx, enter_rx) = crossbeam_channel::bounded::<()>(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        let _ = enter_tx.send(());
    });

    loop {
        match enter_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) if controller.has_finished() => {
                println!("End of source");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    controller.stop();
    tracing::info!("done");
    ExitCode::SUCCESS
}
