//! Speech-to-text provider contract and the two interchangeable
//! backends (§4.6). Concrete audio capture is an external collaborator;
//! this module defines the capability trait and the selection/fallback
//! policy around it.

use async_trait::async_trait;

use crate::error::Result;

/// A one-shot setup/listen/stop capability implemented by each STT
/// backend (§4.6).
#[async_trait]
pub trait SttProvider: Send + Sync {
    /// One-shot setup; `Ok(true)` means the backend is ready to listen.
    async fn setup(&self) -> Result<bool>;

    /// Listen for one utterance, firing `on_stable_partial` once the
    /// partial transcript has held steady for the backend's stability
    /// window. Returns the final transcript, or `None` if nothing was
    /// heard before the no-speech deadline.
    async fn listen(&self, on_stable_partial: &(dyn for<'a> Fn(&'a str) + Send + Sync)) -> Result<Option<String>>;

    async fn stop_listening(&self);

    fn name(&self) -> &str;
}

/// Resolve the STT backend per the `USE_ON_DEVICE_STT` configuration
/// option, falling back to the cloud backend if the on-device backend's
/// setup fails (§4.6, §6).
pub async fn select_backend(
    prefer_on_device: bool,
    on_device: Box<dyn SttProvider>,
    cloud: Box<dyn SttProvider>,
) -> Result<Box<dyn SttProvider>> {
    if !prefer_on_device {
        return Ok(cloud);
    }

    match on_device.setup().await {
        Ok(true) => Ok(on_device),
        _ => Ok(cloud),
    }
}

/// Collapses stray whitespace STT sometimes inserts inside email
/// addresses: spaces around `@` and between trailing digits and `@`
/// (§4.5 step 2).
pub fn fix_email_whitespace(transcript: &str) -> String {
    let mut result = String::with_capacity(transcript.len());
    let chars: Vec<char> = transcript.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '@' {
            while result.ends_with(' ') {
                result.pop();
            }
            result.push('@');
            i += 1;
            while i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
            continue;
        }
        result.push(chars[i]);
        i += 1;
    }

    result
}
