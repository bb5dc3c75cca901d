//! CLI front end for the voice engine.
//!
//! Wires the device layer to the engine and, in loopback mode, plays the
//! local microphone back as a peer circling the listener — an end-to-end
//! check of the capture gate, scheduler and spatializer without a server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use engine::{tasks, SampleClock, VoiceEngine};
use log::{debug, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voice_core::{
    AttenuationConfig, Dimension, EncodedFrame, EngineEvent, Error, FrameSink, PeerId, Position,
    SAMPLE_RATE,
};

/// Proximity voice chat engine CLI
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    /// List audio devices and exit
    #[clap(long)]
    list_devices: bool,

    /// Capture device name (system default when omitted)
    #[clap(long)]
    input: Option<String>,

    /// Playback device name (system default when omitted)
    #[clap(long)]
    output: Option<String>,

    /// Play your own voice back as a peer circling the listener
    #[clap(long)]
    loopback: bool,

    /// Voice activation threshold percentage (0-100)
    #[clap(long, default_value_t = 5)]
    threshold: u8,
}

/// Id the engine uses for the local player in this standalone setup.
const SELF_ID: PeerId = PeerId::new(0);
/// Synthetic peer carrying the looped-back voice.
const LOOPBACK_ID: PeerId = PeerId::new(1);

/// Feeds encoded capture frames back in as remote audio for the synthetic
/// peer.
struct LoopbackSink {
    events: mpsc::Sender<EngineEvent>,
}

#[async_trait]
impl FrameSink for LoopbackSink {
    async fn send_frame(&self, frame: EncodedFrame) -> Result<(), Error> {
        self.events
            .send(EngineEvent::AudioFrame {
                peer_id: LOOPBACK_ID,
                payload: frame.to_le_bytes().into(),
            })
            .await
            .map_err(|_| Error::Engine("loopback event channel closed".to_string()))
    }
}

/// Stands in for the transport when none is attached.
struct DiscardSink;

#[async_trait]
impl FrameSink for DiscardSink {
    async fn send_frame(&self, frame: EncodedFrame) -> Result<(), Error> {
        debug!("no transport attached, dropping {}-sample frame", frame.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
        debug!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    if args.list_devices {
        for device in audio_io::enumerate_devices() {
            println!("{}", device);
        }
        return Ok(());
    }

    info!("starting voice engine");

    let clock = SampleClock::new(SAMPLE_RATE);
    let engine = Arc::new(VoiceEngine::new(SELF_ID, clock.clone()));
    engine.set_threshold(args.threshold);

    // Output first: the engine can run receive-only, but not output-less.
    let render_engine = engine.clone();
    let render_clock = clock.clone();
    let _playback = audio_io::start_playback(args.output.as_deref(), move |out| {
        render_engine.render(out);
        render_clock.advance((out.len() / 2) as u64);
    })
    .context("failed to open playback device")?;

    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(64);
    let _event_pump = tasks::spawn_event_pump(engine.clone(), event_rx);

    // Capture failure downgrades to receive-only operation.
    let (frame_tx, frame_rx) = mpsc::channel(16);
    let mut capture = match audio_io::start_capture(args.input.as_deref(), frame_tx) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("microphone unavailable, running receive-only: {}", e);
            None
        }
    };

    let sink: Arc<dyn FrameSink> = if args.loopback {
        Arc::new(LoopbackSink {
            events: event_tx.clone(),
        })
    } else {
        Arc::new(DiscardSink)
    };
    let _capture_pump = tasks::spawn_capture_pump(engine.clone(), frame_rx, sink);

    if args.loopback {
        info!("loopback peer enabled, you should hear yourself orbiting");
        spawn_orbit(event_tx.clone());
    }

    // Meter tick, decoupled from the audio callbacks.
    let meter_engine = engine.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        loop {
            tick.tick().await;
            let level = meter_engine.meter_level() as usize;
            let bar = "#".repeat(level / 5);
            let speaking = if meter_engine.is_self_speaking() { "*" } else { " " };
            print!("\rmic {:3}% {} {:<20}", level, speaking, bar);
            let _ = std::io::stdout().flush();
        }
    });

    tokio::signal::ctrl_c().await?;
    println!();
    info!("shutting down");

    if let Some(capture) = capture.as_mut() {
        capture.stop();
    }

    Ok(())
}

/// Drive the synthetic peer in a slow circle around the listener.
fn spawn_orbit(events: mpsc::Sender<EngineEvent>) {
    tokio::spawn(async move {
        // 3D placement with the client-side defaults for everything else.
        let config = AttenuationConfig {
            voice_dimension: Dimension::ThreeD,
            ..AttenuationConfig::default()
        };
        if events
            .send(EngineEvent::ConfigUpdate(config))
            .await
            .is_err()
        {
            return;
        }

        let radius = 5.0f32;
        let mut angle = 0.0f32;
        let mut tick = tokio::time::interval(Duration::from_millis(200));
        loop {
            tick.tick().await;
            let position = Position::new(
                radius * angle.cos(),
                0.0,
                radius * angle.sin(),
                0.0,
            );
            if events
                .send(EngineEvent::PeerPosition {
                    peer_id: LOOPBACK_ID,
                    position,
                })
                .await
                .is_err()
            {
                return;
            }
            angle += 0.05;
        }
    });
}
