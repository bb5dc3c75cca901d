use crate::{EncodedFrame, Error};
use async_trait::async_trait;

/// Outbound boundary to the transport layer: encoded capture frames are
/// handed here for sending.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, frame: EncodedFrame) -> Result<(), Error>;
}
