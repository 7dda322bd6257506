//! Screen capture contract and the bitmap/logical coordinate pair it
//! reports (§2, §4.7). The concrete capture backend is an external
//! collaborator; this crate only defines the interface the executor
//! drives and the scaling math in [`crate::action::ScreenDimensions`].

use async_trait::async_trait;

use crate::action::ScreenDimensions;
use crate::error::Result;

/// A captured frame: a downscaled bitmap plus the dimension pair needed
/// to rescale model-returned coordinates back to the real screen.
#[derive(Debug, Clone)]
pub struct Screenshot {
    /// Base64-encoded image bytes.
    pub data: String,
    pub media_type: String,
    pub dimensions: ScreenDimensions,
}

/// Captures the display, downscaling to at most `max_model_width` pixels
/// wide before the bitmap is shown to the model (§4.7).
#[async_trait]
pub trait ScreenSource: Send + Sync {
    async fn capture(&self, max_model_width: u32) -> Result<Screenshot>;
}
