//! Hardware H.264 decoder context.
//!
//! Mirror of [`super::encoder::EncoderContext`], used by the detection-boundary shim to
//! regenerate NV12 from the compressed stream when a consumer only has access to
//! `/pet_camera_stream` and not the raw NV12 ring — not exercised by the capture pipeline
//! itself, which always has NV12 directly from the VIO context.

use crate::error::HalError;
use petcam_hal_sys as sys;

/// One decoded NV12 frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub y_plane: Vec<u8>,
    pub uv_plane: Vec<u8>,
}

/// An open hardware H.264 decoder session.
pub struct DecoderContext {
    handle: sys::DecHandle,
    width: u32,
    height: u32,
}

// SAFETY: see EncoderContext's Send rationale; one context per owning thread.
unsafe impl Send for DecoderContext {}

impl DecoderContext {
    pub fn create(width: u32, height: u32) -> Result<Self, HalError> {
        let mut handle: sys::DecHandle = std::ptr::null_mut();
        // SAFETY: `out` points to a local, writable DecHandle.
        let status = unsafe { sys::vdec_create(width, height, &mut handle) };
        if status != sys::VIO_OK {
            return Err(HalError::from_status(status));
        }
        Ok(Self { handle, width, height })
    }

    /// Feed one Annex-B NAL unit; returns `Some` when it completed a decoded frame.
    pub fn decode(&mut self, nal: &[u8]) -> Result<Option<DecodedFrame>, HalError> {
        let y_cap = (self.width * self.height) as usize;
        let uv_cap = y_cap / 2;
        let mut y_plane = vec![0u8; y_cap];
        let mut uv_plane = vec![0u8; uv_cap];
        let mut produced: u8 = 0;

        // SAFETY: nal is readable for its length; y_plane/uv_plane are writable for their
        // full capacity, matching the cap arguments passed below.
        let status = unsafe {
            sys::vdec_decode(
                self.handle,
                nal.as_ptr(),
                nal.len() as u32,
                y_plane.as_mut_ptr(),
                y_plane.len() as u32,
                uv_plane.as_mut_ptr(),
                uv_plane.len() as u32,
                &mut produced,
            )
        };
        if status != sys::VIO_OK {
            return Err(HalError::from_status(status));
        }

        if produced == 0 {
            return Ok(None);
        }
        Ok(Some(DecodedFrame { y_plane, uv_plane }))
    }
}

impl Drop for DecoderContext {
    fn drop(&mut self) {
        // SAFETY: self.handle is not used again after this call.
        let status = unsafe { sys::vdec_destroy(self.handle) };
        if status != sys::VIO_OK {
            tracing::warn!(status, "vdec_destroy returned non-OK status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_of_empty_nal_produces_nothing() {
        let mut decoder = DecoderContext::create(64, 32).unwrap();
        assert!(decoder.decode(&[]).unwrap().is_none());
    }

    #[test]
    fn decode_of_idr_nal_produces_a_frame() {
        let mut decoder = DecoderContext::create(64, 32).unwrap();
        let nal = [0x00, 0x00, 0x00, 0x01, 0x65, 0x00];
        let frame = decoder.decode(&nal).unwrap().expect("expected a decoded frame");
        assert_eq!(frame.y_plane.len(), 64 * 32);
        assert_eq!(frame.uv_plane.len(), 64 * 32 / 2);
    }
}
