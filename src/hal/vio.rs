//! VIO (video-input) context: sensor + ISP + scaler, wrapped behind a small safe contract.
//!
//! This is the only place above `petcam-hal-sys` that calls into the vendor VIO API.
//! Calls must be serialised per context, so a `VioContext` is `!Sync` by construction (it
//! owns a raw handle with no internal locking): the type system forces one context per
//! thread, matching the capture pipeline's single-threaded hot loop.

use crate::error::HalError;
use petcam_hal_sys as sys;
use std::time::Duration;

/// Host routing for a physical camera: day camera -> host 0, night camera -> host 2.
#[derive(Debug, Clone, Copy)]
pub struct VioRoute {
    pub camera_index: u8,
    pub host_route: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// One plane of a frame delivered by the VIO context, carrying everything needed to
/// populate a [`crate::shm::ZcDescriptor`] for zero-copy re-import elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct VioPlane {
    pub virt_addr: u64,
    pub phys_addr: u64,
    pub dma_fd: i32,
    pub stride: u32,
    pub size: u32,
}

/// A frame handed back by [`VioContext::get_frame`]. Must be returned to the pool via
/// [`VioContext::release_frame`] before the next `get_frame` call on the same context.
#[derive(Debug, Clone, Copy)]
pub struct VioFrame {
    pub sequence: u64,
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    pub y_plane: VioPlane,
    pub uv_plane: VioPlane,
}

impl VioFrame {
    /// Read-only view of the Y-plane bytes, for brightness sampling / gamma application.
    ///
    /// # Safety
    /// Valid only until the frame is released; the underlying DMA buffer may be recycled by
    /// the driver afterward.
    #[must_use]
    pub unsafe fn y_plane_bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.y_plane.virt_addr as *const u8, self.y_plane.size as usize)
    }

    /// Mutable view of the Y-plane bytes, for in-place gamma correction.
    ///
    /// # Safety
    /// See [`Self::y_plane_bytes`]; additionally the caller must not alias this with any
    /// other live reference to the same buffer.
    #[must_use]
    pub unsafe fn y_plane_bytes_mut(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.y_plane.virt_addr as *mut u8, self.y_plane.size as usize)
    }
}

/// An open video-input channel. One per physical camera, held by its capture pipeline for
/// the process's entire lifetime.
pub struct VioContext {
    handle: sys::VioHandle,
    route: VioRoute,
}

// SAFETY: the vendor SDK documents vio_* calls as safe to invoke from whichever single
// thread owns the handle; we never call concurrently on one context.
unsafe impl Send for VioContext {}

impl VioContext {
    /// Open the sensor/ISP/scaler for `route`. Routing is board-specific: day camera
    /// binds host 0, night camera binds host 2.
    pub fn create(route: VioRoute) -> Result<Self, HalError> {
        // SAFETY: vio_open is the documented entry point for this operation; the returned
        // handle is owned exclusively by this VioContext from here on.
        let (status, handle) =
            unsafe { sys::vio_open(route.host_route, route.width, route.height, route.fps) };
        if status != sys::VIO_OK {
            return Err(HalError::from_status(status));
        }
        Ok(Self { handle, route })
    }

    #[must_use]
    pub fn route(&self) -> VioRoute {
        self.route
    }

    /// Block up to `timeout` for the next hardware frame. This is the data path's primary
    /// suspension point: while no client drives downstream, this call simply blocks, and
    /// the pipeline yields the CPU entirely.
    pub fn get_frame(&mut self, timeout: Duration) -> Result<VioFrame, HalError> {
        // SAFETY: self.handle is live for the lifetime of self; `raw` is fully initialised
        // by the SDK only on a VIO_OK return, which we check before reading it.
        let raw = unsafe {
            let mut raw = std::mem::zeroed::<sys::VioFrame>();
            let status = sys::vio_get_frame(self.handle, timeout.as_millis() as u32, &mut raw);
            if status != sys::VIO_OK {
                return Err(HalError::from_status(status));
            }
            raw
        };

        Ok(VioFrame {
            sequence: raw.sequence,
            timestamp_ns: raw.timestamp_ns,
            width: raw.width,
            height: raw.height,
            y_plane: VioPlane {
                virt_addr: raw.y_plane.virt_addr as u64,
                phys_addr: raw.y_plane.phys_addr,
                dma_fd: raw.y_plane.dma_fd,
                stride: raw.y_plane.stride,
                size: raw.y_plane.size,
            },
            uv_plane: VioPlane {
                virt_addr: raw.uv_plane.virt_addr as u64,
                phys_addr: raw.uv_plane.phys_addr,
                dma_fd: raw.uv_plane.dma_fd,
                stride: raw.uv_plane.stride,
                size: raw.uv_plane.size,
            },
        })
    }

    /// Return a frame obtained from [`Self::get_frame`] to the driver's buffer pool.
    pub fn release_frame(&mut self, frame: &VioFrame) -> Result<(), HalError> {
        let raw = sys::VioFrame {
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
            timestamp_ns: frame.timestamp_ns,
            y_plane: sys::VioPlane {
                virt_addr: frame.y_plane.virt_addr as *mut u8,
                phys_addr: frame.y_plane.phys_addr,
                dma_fd: frame.y_plane.dma_fd,
                stride: frame.y_plane.stride,
                size: frame.y_plane.size,
            },
            uv_plane: sys::VioPlane {
                virt_addr: frame.uv_plane.virt_addr as *mut u8,
                phys_addr: frame.uv_plane.phys_addr,
                dma_fd: frame.uv_plane.dma_fd,
                stride: frame.uv_plane.stride,
                size: frame.uv_plane.size,
            },
        };
        // SAFETY: `raw` mirrors a frame previously returned by `get_frame` on this same
        // handle, not yet released.
        let status = unsafe { sys::vio_release_frame(self.handle, &raw) };
        if status != sys::VIO_OK {
            return Err(HalError::from_status(status));
        }
        Ok(())
    }
}

impl Drop for VioContext {
    fn drop(&mut self) {
        // SAFETY: self.handle is not used again after this call.
        let status = unsafe { sys::vio_close(self.handle) };
        if status != sys::VIO_OK {
            tracing::warn!(camera = self.route.camera_index, status, "vio_close returned non-OK status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(camera_index: u8, host_route: u32) -> VioRoute {
        VioRoute { camera_index, host_route, width: 1920, height: 1080, fps: 30 }
    }

    #[test]
    fn get_frame_then_release_round_trips_against_simulation() {
        let mut ctx = VioContext::create(route(0, 0)).unwrap();
        let frame = ctx.get_frame(Duration::from_millis(100)).unwrap();
        assert!(frame.width > 0 && frame.height > 0);
        ctx.release_frame(&frame).unwrap();
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let mut ctx = VioContext::create(route(1, 2)).unwrap();
        let first = ctx.get_frame(Duration::from_millis(100)).unwrap();
        ctx.release_frame(&first).unwrap();
        let second = ctx.get_frame(Duration::from_millis(100)).unwrap();
        assert!(second.sequence > first.sequence);
        ctx.release_frame(&second).unwrap();
    }
}
