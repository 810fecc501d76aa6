//! Raw bindings to the board vendor's VIO/VENC/VDEC SDK.
//!
//! Built with `--features vendor-sdk`, `build.rs` runs bindgen against the SDK headers
//! pointed to by `VIO_SDK_DIR` and links the real `libpetcam_vio.so`. Without that feature
//! (the default, and what every non-board dev machine and CI runner uses) this crate
//! compiles a software simulation of the same function surface, so `petcam_core::hal` can
//! be built and unit-tested with no board attached.
//!
//! Nothing above this crate should reach for the vendor SDK directly — `petcam_core::hal`
//! is the only consumer, and it never matches on the `vendor-sdk` feature itself; it just
//! calls the functions below and gets hardware or simulation depending on how this crate
//! was built.

#![allow(non_camel_case_types)]

use std::ffi::c_void;

/// Opaque handle to an open video-input channel.
pub type VioHandle = *mut c_void;
/// Opaque handle to an open hardware encoder session.
pub type EncHandle = *mut c_void;
/// Opaque handle to an open hardware decoder session (used for the detection-shim mirror).
pub type DecHandle = *mut c_void;

/// A single plane of a frame as the SDK hands it back: pointer, stride, and a DMA fd for
/// zero-copy re-import by another process.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VioPlane {
    pub virt_addr: *mut u8,
    pub phys_addr: u64,
    pub dma_fd: i32,
    pub stride: u32,
    pub size: u32,
}

/// Frame descriptor returned by `vio_get_frame`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VioFrame {
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub y_plane: VioPlane,
    pub uv_plane: VioPlane,
}

/// SDK return codes. `0` is success; everything else mirrors the vendor convention of
/// negative error codes.
pub type VioStatus = i32;

pub const VIO_OK: VioStatus = 0;
pub const VIO_ERR_TIMEOUT: VioStatus = -1;
pub const VIO_ERR_NO_DEVICE: VioStatus = -2;
pub const VIO_ERR_INVALID_CHANNEL: VioStatus = -3;
pub const VIO_ERR_BUFFER_EXHAUSTED: VioStatus = -4;

#[cfg(feature = "vendor-sdk")]
mod ffi {
    include!(concat!(env!("OUT_DIR"), "/bindings.rs"));
}

#[cfg(feature = "vendor-sdk")]
mod hardware {
    use super::*;

    /// Open video input channel `chn` (0 = day sensor, 1 = night sensor) and configure the
    /// sensor/ISP/scaler chain for `width`x`height` at `fps`.
    ///
    /// # Safety
    /// Must be paired with exactly one `vio_close` once the returned handle is no longer
    /// used by any thread.
    pub unsafe fn vio_open(chn: u32, width: u32, height: u32, fps: u32) -> (VioStatus, VioHandle) {
        // SAFETY: `vio_open` is a SDK entry point safe to call from any thread once the
        // board driver module is loaded; the caller owns the returned handle.
        let handle = super::ffi::vio_open(chn, width, height, fps);
        if handle.is_null() {
            (VIO_ERR_NO_DEVICE, std::ptr::null_mut())
        } else {
            (VIO_OK, handle)
        }
    }

    /// Block for the next frame on `handle`, up to `timeout_ms`.
    ///
    /// # Safety
    /// `handle` must come from a live `vio_open` call not yet closed.
    pub unsafe fn vio_get_frame(handle: VioHandle, timeout_ms: u32, out: *mut VioFrame) -> VioStatus {
        // SAFETY: `handle` and `out` are caller-validated per the function's own safety
        // doc; the SDK writes into `out` only on a `VIO_OK` return.
        super::ffi::vio_get_frame(handle, timeout_ms, out.cast())
    }

    /// Return a frame obtained from `vio_get_frame` to the driver's buffer ring.
    ///
    /// # Safety
    /// `frame` must have been populated by a prior `vio_get_frame` call on the same
    /// `handle` and not already released.
    pub unsafe fn vio_release_frame(handle: VioHandle, frame: *const VioFrame) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::vio_release_frame(handle, frame.cast())
    }

    /// Close a video input channel opened with `vio_open`.
    ///
    /// # Safety
    /// `handle` must not be used again after this call.
    pub unsafe fn vio_close(handle: VioHandle) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::vio_close(handle)
    }

    /// Create a hardware H.264 encoder session at the given resolution and bitrate.
    ///
    /// # Safety
    /// `out` must point to valid, writable memory for an `EncHandle`.
    pub unsafe fn venc_create(width: u32, height: u32, bitrate_kbps: u32, out: *mut EncHandle) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::venc_create(width, height, bitrate_kbps, out.cast())
    }

    /// Push one NV12 frame into the encoder and retrieve any Annex-B NAL units it produced.
    ///
    /// # Safety
    /// `y_plane`/`uv_plane` must each be readable for their respective plane sizes;
    /// `out_buf` must be writable for at least `out_cap` bytes.
    pub unsafe fn venc_encode(
        handle: EncHandle,
        y_plane: *const u8,
        uv_plane: *const u8,
        out_buf: *mut u8,
        out_cap: u32,
        out_len: *mut u32,
    ) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::venc_encode(handle, y_plane, uv_plane, out_buf, out_cap, out_len)
    }

    /// Destroy an encoder session.
    ///
    /// # Safety
    /// `handle` must not be used again after this call.
    pub unsafe fn venc_destroy(handle: EncHandle) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::venc_destroy(handle)
    }

    /// Create a hardware H.264 decoder session, used to regenerate NV12 from the
    /// compressed stream when a consumer only has access to it.
    ///
    /// # Safety
    /// `out` must point to valid, writable memory for a `DecHandle`.
    pub unsafe fn vdec_create(width: u32, height: u32, out: *mut DecHandle) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::vdec_create(width, height, out.cast())
    }

    /// Push one Annex-B NAL unit into the decoder and retrieve a decoded NV12 frame if one
    /// completed.
    ///
    /// # Safety
    /// `nal` must be readable for `nal_len` bytes; `y_out`/`uv_out` must be writable for
    /// their respective plane capacities.
    pub unsafe fn vdec_decode(
        handle: DecHandle,
        nal: *const u8,
        nal_len: u32,
        y_out: *mut u8,
        y_cap: u32,
        uv_out: *mut u8,
        uv_cap: u32,
        produced: *mut u8,
    ) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::vdec_decode(handle, nal, nal_len, y_out, y_cap, uv_out, uv_cap, produced)
    }

    /// Destroy a decoder session.
    ///
    /// # Safety
    /// `handle` must not be used again after this call.
    pub unsafe fn vdec_destroy(handle: DecHandle) -> VioStatus {
        // SAFETY: see function doc.
        super::ffi::vdec_destroy(handle)
    }
}

#[cfg(not(feature = "vendor-sdk"))]
mod simulated {
    //! Software stand-in for the board SDK. Generates deterministic synthetic frames and a
    //! minimal (non-conformant) Annex-B byte stream so the HAL adapter, capture pipeline,
    //! and switch controller are all exercisable in unit and integration tests without a
    //! board attached.
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct SimChannel {
        chn: u32,
        width: u32,
        height: u32,
        sequence: AtomicU64,
        y: Vec<u8>,
        uv: Vec<u8>,
    }

    /// Fallback frame size used only if a caller somehow opens a channel at 0x0 (configuration
    /// bug upstream); keeps the simulation from allocating zero-length planes.
    const FALLBACK_WIDTH: u32 = 1920;
    const FALLBACK_HEIGHT: u32 = 1080;

    /// # Safety
    /// No raw pointers are dereferenced by the simulation; the handle is an opaque boxed
    /// value the caller must pass back unmodified to `vio_close`.
    pub unsafe fn vio_open(chn: u32, width: u32, height: u32, _fps: u32) -> (VioStatus, VioHandle) {
        let width = if width == 0 { FALLBACK_WIDTH } else { width };
        let height = if height == 0 { FALLBACK_HEIGHT } else { height };
        let y_len = (width * height) as usize;
        let uv_len = y_len / 2;
        let state = Box::new(SimChannel {
            chn,
            width,
            height,
            sequence: AtomicU64::new(0),
            y: vec![128u8; y_len],
            uv: vec![128u8; uv_len],
        });
        (VIO_OK, Box::into_raw(state).cast())
    }

    /// # Safety
    /// `handle` must be a live value returned by `vio_open` and `out` must be writable.
    pub unsafe fn vio_get_frame(handle: VioHandle, _timeout_ms: u32, out: *mut VioFrame) -> VioStatus {
        let chan = &*handle.cast::<SimChannel>();
        let sequence = chan.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let timestamp_ns = sequence * 33_333_333;
        *out = VioFrame {
            width: chan.width,
            height: chan.height,
            sequence,
            timestamp_ns,
            y_plane: VioPlane {
                virt_addr: chan.y.as_ptr() as *mut u8,
                phys_addr: 0,
                dma_fd: -1,
                stride: chan.width,
                size: chan.y.len() as u32,
            },
            uv_plane: VioPlane {
                virt_addr: chan.uv.as_ptr() as *mut u8,
                phys_addr: 0,
                dma_fd: -1,
                stride: chan.width,
                size: chan.uv.len() as u32,
            },
        };
        let _ = chan.chn;
        VIO_OK
    }

    /// # Safety
    /// No-op in simulation; kept for API parity with the hardware path.
    pub unsafe fn vio_release_frame(_handle: VioHandle, _frame: *const VioFrame) -> VioStatus {
        VIO_OK
    }

    /// # Safety
    /// `handle` must be a value previously returned by `vio_open`, not already closed.
    pub unsafe fn vio_close(handle: VioHandle) -> VioStatus {
        drop(Box::from_raw(handle.cast::<SimChannel>()));
        VIO_OK
    }

    struct SimEncoder {
        width: u32,
        height: u32,
        bitrate_kbps: u32,
        frame_count: u64,
    }

    /// # Safety
    /// `out` must be writable for one `EncHandle`.
    pub unsafe fn venc_create(width: u32, height: u32, bitrate_kbps: u32, out: *mut EncHandle) -> VioStatus {
        let state = Box::new(SimEncoder { width, height, bitrate_kbps, frame_count: 0 });
        *out = Box::into_raw(state).cast();
        VIO_OK
    }

    /// # Safety
    /// `out_buf` must be writable for `out_cap` bytes; `y_plane`/`uv_plane` are accepted but
    /// not read by the simulation (the simulated bitstream is not a function of pixel data).
    pub unsafe fn venc_encode(
        handle: EncHandle,
        _y_plane: *const u8,
        _uv_plane: *const u8,
        out_buf: *mut u8,
        out_cap: u32,
        out_len: *mut u32,
    ) -> VioStatus {
        let enc = &mut *handle.cast::<SimEncoder>();
        enc.frame_count += 1;
        let is_idr = enc.frame_count % 30 == 1;
        let nal_type: u8 = if is_idr { 5 } else { 1 };
        let payload = [0x00, 0x00, 0x00, 0x01, 0x60 | nal_type, 0u8, 0u8];
        if payload.len() as u32 > out_cap {
            return VIO_ERR_BUFFER_EXHAUSTED;
        }
        std::ptr::copy_nonoverlapping(payload.as_ptr(), out_buf, payload.len());
        *out_len = payload.len() as u32;
        let _ = (enc.width, enc.height, enc.bitrate_kbps);
        VIO_OK
    }

    /// # Safety
    /// `handle` must be a value previously returned by `venc_create`, not already destroyed.
    pub unsafe fn venc_destroy(handle: EncHandle) -> VioStatus {
        drop(Box::from_raw(handle.cast::<SimEncoder>()));
        VIO_OK
    }

    struct SimDecoder {
        width: u32,
        height: u32,
    }

    /// # Safety
    /// `out` must be writable for one `DecHandle`.
    pub unsafe fn vdec_create(width: u32, height: u32, out: *mut DecHandle) -> VioStatus {
        let state = Box::new(SimDecoder { width, height });
        *out = Box::into_raw(state).cast();
        VIO_OK
    }

    /// # Safety
    /// `y_out`/`uv_out` must be writable for `y_cap`/`uv_cap` bytes; `produced` must be
    /// writable for one byte.
    pub unsafe fn vdec_decode(
        handle: DecHandle,
        _nal: *const u8,
        nal_len: u32,
        y_out: *mut u8,
        y_cap: u32,
        uv_out: *mut u8,
        uv_cap: u32,
        produced: *mut u8,
    ) -> VioStatus {
        let dec = &*handle.cast::<SimDecoder>();
        if nal_len == 0 {
            *produced = 0;
            return VIO_OK;
        }
        let y_len = (dec.width * dec.height).min(y_cap);
        let uv_len = (dec.width * dec.height / 2).min(uv_cap);
        std::ptr::write_bytes(y_out, 128, y_len as usize);
        std::ptr::write_bytes(uv_out, 128, uv_len as usize);
        *produced = 1;
        VIO_OK
    }

    /// # Safety
    /// `handle` must be a value previously returned by `vdec_create`, not already destroyed.
    pub unsafe fn vdec_destroy(handle: DecHandle) -> VioStatus {
        drop(Box::from_raw(handle.cast::<SimDecoder>()));
        VIO_OK
    }
}

#[cfg(feature = "vendor-sdk")]
pub use hardware::*;
#[cfg(not(feature = "vendor-sdk"))]
pub use simulated::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_channel_round_trips_frames() {
        unsafe {
            let (status, handle) = vio_open(0, 64, 32, 30);
            assert_eq!(status, VIO_OK);

            let mut frame = std::mem::zeroed::<VioFrame>();
            assert_eq!(vio_get_frame(handle, 1000, &mut frame), VIO_OK);
            assert_eq!(frame.sequence, 1);
            assert_eq!(frame.width, 64);
            assert_eq!(frame.height, 32);

            assert_eq!(vio_release_frame(handle, &frame), VIO_OK);
            assert_eq!(vio_close(handle), VIO_OK);
        }
    }

    #[test]
    fn simulated_encoder_marks_periodic_idr() {
        unsafe {
            let mut enc: EncHandle = std::ptr::null_mut();
            assert_eq!(venc_create(1920, 1080, 700, &mut enc), VIO_OK);

            let mut buf = [0u8; 64];
            let mut len = 0u32;
            assert_eq!(
                venc_encode(enc, std::ptr::null(), std::ptr::null(), buf.as_mut_ptr(), buf.len() as u32, &mut len),
                VIO_OK
            );
            assert!(len > 0);
            let nal_type = buf[4] & 0x1f;
            assert_eq!(nal_type, 5, "first frame out of a fresh encoder must be an IDR");

            assert_eq!(venc_destroy(enc), VIO_OK);
        }
    }

    #[test]
    fn simulated_decoder_produces_a_frame_for_nonempty_input() {
        unsafe {
            let mut dec: DecHandle = std::ptr::null_mut();
            assert_eq!(vdec_create(1920, 1080, &mut dec), VIO_OK);

            let nal = [0x00, 0x00, 0x00, 0x01, 0x65];
            let mut y = vec![0u8; 1920 * 1080];
            let mut uv = vec![0u8; 1920 * 1080 / 2];
            let mut produced = 0u8;
            assert_eq!(
                vdec_decode(dec, nal.as_ptr(), nal.len() as u32, y.as_mut_ptr(), y.len() as u32, uv.as_mut_ptr(), uv.len() as u32, &mut produced),
                VIO_OK
            );
            assert_eq!(produced, 1);

            assert_eq!(vdec_destroy(dec), VIO_OK);
        }
    }
}
