//! Fixed-capacity staging buffer for one frame's payload bytes.
//!
//! Pooled and reused across frames: the pixel/bitstream bytes are never re-zeroed on
//! release (the next producer overwrites them via `copy_from_hal` before `actual_len`
//! is trusted again), only the metadata is cleared. That keeps release O(1) instead of
//! O(frame size).

/// One pooled frame: a fixed-capacity byte buffer plus the metadata a ring slot needs.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Pre-allocated payload storage; capacity fixed at pool creation.
    pub bytes: Vec<u8>,
    /// Valid bytes written this frame (`<= bytes.capacity()`).
    pub actual_len: usize,
    /// Monotonic sequence number assigned by the capture pipeline.
    pub sequence: u64,
    /// Capture wall-clock timestamp, nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    /// 0 = day camera, 1 = night camera.
    pub camera_id: u8,
    pub width: u32,
    pub height: u32,
}

impl FrameBuffer {
    /// Allocate a buffer with `byte_capacity` bytes of backing storage.
    ///
    /// # Panics
    /// Panics if `byte_capacity` is 0.
    #[must_use]
    pub fn with_capacity(byte_capacity: usize) -> Self {
        assert!(byte_capacity > 0, "frame buffer capacity must be > 0");
        Self {
            bytes: vec![0u8; byte_capacity],
            actual_len: 0,
            sequence: 0,
            timestamp_ns: 0,
            camera_id: 0,
            width: 0,
            height: 0,
        }
    }

    /// Reset metadata for reuse. Does not zero `bytes` — see module docs.
    pub fn reset(&mut self) {
        self.actual_len = 0;
        self.sequence = 0;
        self.timestamp_ns = 0;
        self.camera_id = 0;
        self.width = 0;
        self.height = 0;
    }

    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.actual_len]
    }

    #[inline]
    #[must_use]
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.actual_len]
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Copy `len` bytes from a HAL-owned buffer into this slot.
    ///
    /// # Safety
    /// `src` must point to at least `len` readable bytes, and `len` must not exceed
    /// `self.capacity()`.
    ///
    /// # Panics
    /// Panics if `len > self.capacity()`.
    #[inline]
    pub unsafe fn copy_from_hal(&mut self, src: *const u8, len: usize) {
        assert!(
            len <= self.bytes.capacity(),
            "frame payload ({len} bytes) exceeds buffer capacity ({})",
            self.bytes.capacity()
        );
        std::ptr::copy_nonoverlapping(src, self.bytes.as_mut_ptr(), len);
        self.actual_len = len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_metadata_not_capacity() {
        let mut frame = FrameBuffer::with_capacity(1024);
        frame.actual_len = 512;
        frame.sequence = 42;
        frame.camera_id = 1;

        frame.reset();

        assert_eq!(frame.actual_len, 0);
        assert_eq!(frame.sequence, 0);
        assert_eq!(frame.camera_id, 0);
        assert_eq!(frame.capacity(), 1024);
    }

    #[test]
    fn copy_from_hal_sets_actual_len() {
        let mut frame = FrameBuffer::with_capacity(1024);
        let src: Vec<u8> = (0..512).map(|i| i as u8).collect();

        unsafe { frame.copy_from_hal(src.as_ptr(), src.len()) };

        assert_eq!(frame.actual_len, 512);
        assert_eq!(frame.payload(), &src[..]);
    }

    #[test]
    #[should_panic(expected = "exceeds buffer capacity")]
    fn copy_from_hal_overflow_panics() {
        let mut frame = FrameBuffer::with_capacity(100);
        let src = [0u8; 200];
        unsafe { frame.copy_from_hal(src.as_ptr(), src.len()) };
    }
}
