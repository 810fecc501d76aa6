//! Hardware H.264 encoder context.
//!
//! The reference platform's bitrate ceiling (700 kbps) is surfaced as a named constant,
//! not a silent clamp: callers that request more get an explicit, logged clamp, never a
//! value that quietly differs from what they asked for.

use crate::error::HalError;
use petcam_hal_sys as sys;

/// Hardware-documented bitrate ceiling, kbps, on the reference platform.
pub const MAX_BITRATE_KBPS: u32 = 700;

/// Outcome of one [`EncoderContext::encode`] call.
#[derive(Debug)]
pub enum EncodeOutcome {
    /// A complete Annex-B NAL unit bytestream is ready.
    Nal(Vec<u8>),
    /// The encoder needs more input before it can produce output.
    Again,
}

/// An open hardware H.264 encoder session.
pub struct EncoderContext {
    handle: sys::EncHandle,
    width: u32,
    height: u32,
    bitrate_kbps: u32,
    scratch: Vec<u8>,
}

// SAFETY: the vendor SDK documents venc_* calls as safe from the single owning thread; a
// capture pipeline holds exactly one EncoderContext and never shares it across threads.
unsafe impl Send for EncoderContext {}

impl EncoderContext {
    /// Create a constant-bitrate H.264 encoder at `width`x`height`@`fps`. `bitrate_kbps` is
    /// clamped to [`MAX_BITRATE_KBPS`] with a logged warning, never silently.
    pub fn create(width: u32, height: u32, fps: u32, bitrate_kbps: u32) -> Result<Self, HalError> {
        let clamped = if bitrate_kbps > MAX_BITRATE_KBPS {
            tracing::warn!(
                requested = bitrate_kbps,
                ceiling = MAX_BITRATE_KBPS,
                "requested encoder bitrate exceeds hardware ceiling, clamping"
            );
            MAX_BITRATE_KBPS
        } else {
            bitrate_kbps
        };

        let mut handle: sys::EncHandle = std::ptr::null_mut();
        // SAFETY: `out` points to a local, writable EncHandle.
        let status = unsafe { sys::venc_create(width, height, clamped, &mut handle) };
        if status != sys::VIO_OK {
            return Err(HalError::from_status(status));
        }

        let _ = fps; // GOP cadence is fixed by the device, not negotiated via this API.

        Ok(Self { handle, width, height, bitrate_kbps: clamped, scratch: vec![0u8; 1 << 20] })
    }

    #[must_use]
    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }

    /// Submit one NV12 frame (external-buffer mode; no copy of plane data into this
    /// function) and retrieve any completed Annex-B output.
    pub fn encode(&mut self, y_plane: &[u8], uv_plane: &[u8]) -> Result<EncodeOutcome, HalError> {
        let mut out_len: u32 = 0;
        // SAFETY: y_plane/uv_plane are valid for their stated lengths for the duration of
        // this call; scratch is writable for its full length, which we pass as out_cap.
        let status = unsafe {
            sys::venc_encode(
                self.handle,
                y_plane.as_ptr(),
                uv_plane.as_ptr(),
                self.scratch.as_mut_ptr(),
                self.scratch.len() as u32,
                &mut out_len,
            )
        };

        match status {
            sys::VIO_OK if out_len > 0 => Ok(EncodeOutcome::Nal(self.scratch[..out_len as usize].to_vec())),
            sys::VIO_OK => Ok(EncodeOutcome::Again),
            sys::VIO_ERR_BUFFER_EXHAUSTED => Ok(EncodeOutcome::Again),
            other => Err(HalError::from_status(other)),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for EncoderContext {
    fn drop(&mut self) {
        // SAFETY: self.handle is not used again after this call.
        let status = unsafe { sys::venc_destroy(self.handle) };
        if status != sys::VIO_OK {
            tracing::warn!(status, "venc_destroy returned non-OK status");
        }
    }
}

/// Classify a NAL's first byte (after the 4-byte Annex-B start code) into the types the
/// wire contract cares about.
#[must_use]
pub fn nal_unit_type(nal_header_byte: u8) -> u8 {
    nal_header_byte & 0x1f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_above_ceiling_is_clamped_not_silently_passed() {
        let encoder = EncoderContext::create(1920, 1080, 30, 5_000).unwrap();
        assert_eq!(encoder.bitrate_kbps(), MAX_BITRATE_KBPS);
    }

    #[test]
    fn bitrate_at_or_below_ceiling_is_unchanged() {
        let encoder = EncoderContext::create(1920, 1080, 30, 500).unwrap();
        assert_eq!(encoder.bitrate_kbps(), 500);
    }

    #[test]
    fn first_encoded_frame_out_of_a_fresh_encoder_is_an_idr() {
        let mut encoder = EncoderContext::create(1920, 1080, 30, 700).unwrap();
        let y = vec![0u8; 16];
        let uv = vec![0u8; 8];
        match encoder.encode(&y, &uv).unwrap() {
            EncodeOutcome::Nal(bytes) => {
                assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
                assert_eq!(nal_unit_type(bytes[4]), 5);
            }
            EncodeOutcome::Again => panic!("expected immediate output from the simulated encoder"),
        }
    }
}
