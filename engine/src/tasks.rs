//! Pump tasks bridging the engine to its collaborators.

use crate::VoiceEngine;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voice_core::{AudioBuffer, EngineEvent, FrameSink};

/// Forward captured microphone frames through the gate to the transport.
///
/// Ends when the capture side closes its channel.
pub fn spawn_capture_pump(
    engine: Arc<VoiceEngine>,
    mut frames: mpsc::Receiver<AudioBuffer>,
    sink: Arc<dyn FrameSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("capture pump started");
        while let Some(buffer) = frames.recv().await {
            if let Some(frame) = engine.capture_frame(&buffer) {
                if let Err(e) = sink.send_frame(frame).await {
                    warn!("failed to hand voice frame to transport: {}", e);
                }
            }
        }
        info!("capture pump ended");
    })
}

/// Apply transport events to the engine as they arrive.
pub fn spawn_event_pump(
    engine: Arc<VoiceEngine>,
    mut events: mpsc::Receiver<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("event pump started");
        while let Some(event) = events.recv().await {
            engine.handle_event(event);
        }
        info!("event pump ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use async_trait::async_trait;
    use mockall::mock;
    use std::time::Duration;
    use voice_core::{EncodedFrame, Error, PeerId, Position};

    mock! {
        Sink {}

        #[async_trait]
        impl FrameSink for Sink {
            async fn send_frame(&self, frame: EncodedFrame) -> Result<(), Error>;
        }
    }

    fn engine() -> Arc<VoiceEngine> {
        Arc::new(VoiceEngine::new(PeerId::new(1), ManualClock::new()))
    }

    fn speech() -> AudioBuffer {
        (0..8192).map(|i| (i as f32 * 0.05).sin() * 0.5).collect()
    }

    #[test_log::test(tokio::test)]
    async fn capture_pump_sends_voiced_frames_only() {
        let engine = engine();

        let mut sink = MockSink::new();
        sink.expect_send_frame()
            .withf(|frame| frame.len() == 8192)
            .times(1)
            .returning(|_| Ok(()));

        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_capture_pump(engine, rx, Arc::new(sink));

        // One silent frame (gated), one voiced frame (sent).
        tx.send(vec![0.0; 8192]).await.unwrap();
        tx.send(speech()).await.unwrap();
        drop(tx);

        handle.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn capture_pump_survives_sink_errors() {
        let engine = engine();

        let mut sink = MockSink::new();
        sink.expect_send_frame()
            .times(2)
            .returning(|_| Err(Error::Engine("transport closed".into())));

        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_capture_pump(engine, rx, Arc::new(sink));

        tx.send(speech()).await.unwrap();
        tx.send(speech()).await.unwrap();
        drop(tx);

        handle.await.unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn event_pump_drives_the_engine() {
        let engine = engine();
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_event_pump(engine.clone(), rx);

        tx.send(EngineEvent::PeerPosition {
            peer_id: PeerId::new(2),
            position: Position::new(1.0, 0.0, 1.0, 0.0),
        })
        .await
        .unwrap();
        tx.send(EngineEvent::PeerLeft {
            peer_id: PeerId::new(2),
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(engine.live_peer_count(), 0);
    }
}
