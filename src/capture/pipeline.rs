//! The per-camera capture main loop.
//!
//! Stateless across switches: this loop runs identically whether or not its camera is
//! currently active. Only the encoder-publish step differs in behavior; everything else,
//! zero-copy descriptor publication, brightness tracking, NR tuning, runs every frame
//! regardless, because the switch controller and the detection shim both need a live probe
//! of *both* cameras at all times.

use crate::error::{HalError, PetcamError};
use crate::error_recovery::TransientCounter;
use crate::hal::{
    apply_gamma, normalize_isp_stat, sampled_y_mean, EncodeOutcome, EncoderContext, IspStat, NrBand,
    NrController, VioContext, VioRoute,
};
use crate::health::StallMonitor;
use crate::names;
use crate::shm::{retry_attach, ControlRecord, FrameRecord, LatestRegion, PixelFormat, RingRegion, ZcDescriptor, ZcRegion};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Worst-case Annex-B output size for a single encoded frame on the reference platform;
/// sizes the H.264 ring's per-slot payload capacity.
const H264_SLOT_PAYLOAD_CAP: usize = 256 * 1024;

/// Everything [`CapturePipeline::new`] needs, gathered from [`crate::config::Settings`] plus
/// the operator-provided process flags (camera index, config path).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub camera_id: u8,
    pub host_route: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    pub ring_capacity: usize,
    pub mjpeg_enabled: bool,
    pub semaphore_timeout: Duration,
    pub consecutive_transient_limit: u32,
}

/// One running camera: owns its hardware contexts and the regions it's responsible for.
pub struct CapturePipeline {
    camera_id: u8,
    vio: VioContext,
    encoder: EncoderContext,
    zc_region: ZcRegion,
    control: LatestRegion<ControlRecord>,
    active_frame_ring: RingRegion,
    stream_ring: RingRegion,
    mjpeg_ring: Option<RingRegion>,
    /// True for the camera that created (and so is responsible for ultimately destroying)
    /// the shared output rings. See [`Self::new`]'s ownership tie-break.
    owns_shared_rings: bool,
    nr_controller: NrController,
    get_frame_transients: TransientCounter,
    encode_transients: TransientCounter,
    stall: StallMonitor,
}

impl CapturePipeline {
    /// Bring up hardware contexts and attach/create every region this camera touches.
    ///
    /// Ownership tie-break for the shared output rings (`ACTIVE_FRAME`, `STREAM`,
    /// `MJPEG_FRAME`): each region needs exactly one owner process, but the writer is
    /// whichever camera is active, which changes over the process's lifetime. Resolved by
    /// having the day camera (the preferred initial active camera) create these regions at
    /// startup; the night camera attaches to them with the standard bounded retry. Both
    /// cameras write to them identically once attached; ownership only matters for which
    /// process is responsible for `destroy()` at full-system shutdown.
    pub fn new(config: PipelineConfig) -> Result<Self, PetcamError> {
        let vio = VioContext::create(VioRoute {
            camera_index: config.camera_id,
            host_route: config.host_route,
            width: config.width,
            height: config.height,
            fps: config.fps,
        })
        .map_err(PetcamError::Hal)?;

        let encoder = EncoderContext::create(config.width, config.height, config.fps, config.bitrate_kbps)
            .map_err(PetcamError::Hal)?;

        let zc_name = names::zero_copy(config.camera_id);
        let zc_region = ZcRegion::create(&zc_name, config.camera_id)?;

        let control = retry_attach(|| LatestRegion::<ControlRecord>::open(names::CONTROL))?;

        let nv12_payload = (config.width * config.height * 3 / 2) as usize;
        let is_day = config.camera_id == names::CAMERA_DAY;

        let active_frame_ring = if is_day {
            RingRegion::create(names::ACTIVE_FRAME, config.ring_capacity, nv12_payload, frame_interval_ms(config.fps))?
        } else {
            retry_attach(|| RingRegion::open(names::ACTIVE_FRAME))?
        };

        let stream_ring = if is_day {
            RingRegion::create(names::STREAM, config.ring_capacity, H264_SLOT_PAYLOAD_CAP, frame_interval_ms(config.fps))?
        } else {
            retry_attach(|| RingRegion::open(names::STREAM))?
        };

        let mjpeg_ring = if config.mjpeg_enabled {
            Some(if is_day {
                RingRegion::create(names::MJPEG_FRAME, config.ring_capacity, nv12_payload, frame_interval_ms(config.fps))?
            } else {
                retry_attach(|| RingRegion::open(names::MJPEG_FRAME))?
            })
        } else {
            None
        };

        Ok(Self {
            camera_id: config.camera_id,
            vio,
            encoder,
            zc_region,
            control,
            active_frame_ring,
            stream_ring,
            mjpeg_ring,
            owns_shared_rings: is_day,
            nr_controller: NrController::default(),
            get_frame_transients: TransientCounter::new("get_frame_timeout", config.consecutive_transient_limit),
            encode_transients: TransientCounter::new("encode_again", config.consecutive_transient_limit),
            stall: StallMonitor::new("capture_pipeline"),
        })
    }

    /// Run until `shutdown` is set. Each iteration blocks on `get_frame` with a 1 s timeout
    /// so the shutdown flag is checked at least once a second even when hardware is idle.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), PetcamError> {
        while !shutdown.load(Ordering::Relaxed) {
            self.tick()?;
        }
        info!(camera_id = self.camera_id, "capture pipeline shutting down cleanly");
        Ok(())
    }

    /// One iteration of the main capture loop.
    fn tick(&mut self) -> Result<(), PetcamError> {
        // Step 1: blocking hardware frame wait, the data path's primary suspension point.
        let mut frame = match self.vio.get_frame(Duration::from_secs(1)) {
            Ok(frame) => {
                self.get_frame_transients.reset();
                frame
            }
            Err(HalError::Timeout) => {
                self.get_frame_transients.record()?;
                self.stall.tick(false);
                return Ok(());
            }
            Err(other) => return Err(PetcamError::Hal(other)),
        };

        // Step 2: brightness. ISP auto-exposure statistics are not modeled by the HAL shim
        // on this build (see DESIGN.md); the sampled Y-plane mean is used unconditionally,
        // with the ISP-stat path left fully implemented and unit-tested for boards whose
        // vendor SDK exposes it.
        let isp_stat: Option<IspStat> = None;
        // SAFETY: the frame has not been released yet, so its Y-plane buffer is live.
        let y_bytes = unsafe { frame.y_plane_bytes() };
        let brightness_avg = isp_stat.map(normalize_isp_stat).unwrap_or_else(|| sampled_y_mean(y_bytes, 16));

        let now = Instant::now();
        let nr_band = NrBand::for_brightness(brightness_avg);
        if let Some(applied) = self.nr_controller.maybe_apply(nr_band, now) {
            let (nr3d, nr2d) = applied.strengths();
            debug!(camera_id = self.camera_id, band = ?applied, nr3d, nr2d, "noise-reduction preset changed");
        }

        let (timestamp_sec, timestamp_nsec) = unix_timestamp();

        // Step 4: consult active-camera index (acquire-equivalent via LatestRegion::read's
        // version-stable retry loop) before deciding what step 5 applies.
        let (control_record, _version) = self.control.read()?;
        let active = control_record.active_camera == i32::from(self.camera_id);

        let mut correction_applied = false;
        if active {
            // Step 5a: adaptive gamma.
            if brightness_avg < 80 {
                // SAFETY: no other reference to this plane is live; frame is not yet released.
                let y_mut = unsafe { frame.y_plane_bytes_mut() };
                apply_gamma(y_mut, brightness_avg);
                correction_applied = true;
            }

            // SAFETY: re-borrow after the mutable gamma pass; frame is still live.
            let y_bytes = unsafe { frame.y_plane_bytes() };
            let uv_bytes = unsafe {
                std::slice::from_raw_parts(frame.uv_plane.virt_addr as *const u8, frame.uv_plane.size as usize)
            };

            // Step 5b: publish NV12.
            let mut nv12_payload = Vec::with_capacity(y_bytes.len() + uv_bytes.len());
            nv12_payload.extend_from_slice(y_bytes);
            nv12_payload.extend_from_slice(uv_bytes);
            self.active_frame_ring.publish(&FrameRecord {
                sequence: frame.sequence,
                timestamp_sec,
                timestamp_nsec,
                camera_id: self.camera_id,
                width: frame.width,
                height: frame.height,
                format: PixelFormat::Nv12,
                payload: nv12_payload,
            })?;

            // Step 5c: submit to the encoder; publish any completed Annex-B bitstream.
            match self.encoder.encode(y_bytes, uv_bytes) {
                Ok(EncodeOutcome::Nal(bytes)) => {
                    self.encode_transients.reset();
                    self.stream_ring.publish(&FrameRecord {
                        sequence: frame.sequence,
                        timestamp_sec,
                        timestamp_nsec,
                        camera_id: self.camera_id,
                        width: frame.width,
                        height: frame.height,
                        format: PixelFormat::H264,
                        payload: bytes,
                    })?;
                }
                Ok(EncodeOutcome::Again) => {
                    self.encode_transients.record()?;
                }
                Err(err) => return Err(PetcamError::Hal(err)),
            }
        }

        // Step 3 (done last so the published descriptor's `correction_applied` flag
        // reflects this frame's actual gamma decision): always publish the zero-copy
        // descriptor, active or not.
        let mut descriptor = ZcDescriptor::empty(self.camera_id);
        descriptor.sequence = frame.sequence;
        descriptor.timestamp_sec = timestamp_sec;
        descriptor.timestamp_nsec = timestamp_nsec;
        descriptor.brightness_avg = brightness_avg;
        descriptor.correction_applied = u8::from(correction_applied);
        descriptor.contiguous = 0;
        descriptor.width = frame.width;
        descriptor.height = frame.height;
        descriptor.format = PixelFormat::Nv12 as u32;
        descriptor.plane_count = 2;
        descriptor.planes[0] = crate::shm::PlaneDescriptor {
            dma_fd: frame.y_plane.dma_fd,
            share_id: 0,
            phys_addr: frame.y_plane.phys_addr,
            virt_addr: frame.y_plane.virt_addr,
            size: frame.y_plane.size,
            stride: frame.y_plane.stride,
            offset: 0,
            _pad: 0,
        };
        descriptor.planes[1] = crate::shm::PlaneDescriptor {
            dma_fd: frame.uv_plane.dma_fd,
            share_id: 0,
            phys_addr: frame.uv_plane.phys_addr,
            virt_addr: frame.uv_plane.virt_addr,
            size: frame.uv_plane.size,
            stride: frame.uv_plane.stride,
            offset: 0,
            _pad: 0,
        };
        self.zc_region.publish(descriptor);

        self.stall.tick(true);

        // Step 6.
        self.vio.release_frame(&frame).map_err(PetcamError::Hal)?;

        Ok(())
    }

    /// Tear down this camera's hardware contexts and regions. Always destroys the
    /// zero-copy descriptor this camera alone owns; destroys the shared output rings too
    /// only if this camera created them (see [`Self::new`]'s ownership note) — callers
    /// should only invoke this as part of a full-fleet shutdown, never an isolated restart.
    pub fn shutdown(self) {
        if let Err(err) = self.zc_region.destroy() {
            warn!(camera_id = self.camera_id, error = %err, "failed to unlink zero-copy region");
        }
        if self.owns_shared_rings {
            if let Err(err) = self.active_frame_ring.destroy() {
                warn!(error = %err, "failed to unlink active-frame region");
            }
            if let Err(err) = self.stream_ring.destroy() {
                warn!(error = %err, "failed to unlink stream region");
            }
            if let Some(mjpeg) = self.mjpeg_ring {
                if let Err(err) = mjpeg.destroy() {
                    warn!(error = %err, "failed to unlink mjpeg region");
                }
            }
        }
    }
}

fn frame_interval_ms(fps: u32) -> u32 {
    if fps == 0 {
        0
    } else {
        1000 / fps
    }
}

fn unix_timestamp() -> (i64, i64) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (now.as_secs() as i64, i64::from(now.subsec_nanos()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shm::ControlRecord;
    use serial_test::serial;

    fn config(camera_id: u8) -> PipelineConfig {
        PipelineConfig {
            camera_id,
            host_route: if camera_id == 0 { 0 } else { 2 },
            width: 64,
            height: 32,
            fps: 30,
            bitrate_kbps: 700,
            ring_capacity: 4,
            mjpeg_enabled: false,
            semaphore_timeout: Duration::from_secs(1),
            consecutive_transient_limit: 10,
        }
    }

    fn with_control(camera: i32, body: impl FnOnce()) {
        let mut control = LatestRegion::create(names::CONTROL, ControlRecord { active_camera: camera, _reserved: 0 }).unwrap();
        control.publish(ControlRecord { active_camera: camera, _reserved: 0 });
        body();
        control.destroy().unwrap();
    }

    #[test]
    #[serial]
    fn day_pipeline_creates_shared_rings_and_publishes_when_active() {
        with_control(0, || {
            let mut pipeline = CapturePipeline::new(config(0)).unwrap();
            let shutdown = AtomicBool::new(false);
            pipeline.tick().unwrap();

            let active_frame = pipeline.active_frame_ring.read_latest();
            assert!(active_frame.is_some(), "active day camera must publish NV12 frames");
            let _ = shutdown;
            pipeline.shutdown();
        });
    }

    #[test]
    #[serial]
    fn inactive_pipeline_still_publishes_zero_copy_descriptor() {
        with_control(0, || {
            // camera 1 (night) is not active here, but still needs the shared rings to
            // already exist; create them inline the way the day pipeline would.
            let nv12 = RingRegion::create(names::ACTIVE_FRAME, 4, 64 * 32 * 3 / 2, 33).unwrap();
            let stream = RingRegion::create(names::STREAM, 4, 4096, 33).unwrap();

            let mut pipeline_cfg = config(1);
            pipeline_cfg.mjpeg_enabled = false;
            let mut pipeline = CapturePipeline::new(pipeline_cfg).unwrap();

            let before_version = pipeline.zc_region.version();
            pipeline.tick().unwrap();
            assert!(pipeline.zc_region.version() > before_version);
            assert!(
                pipeline.active_frame_ring.read_latest().is_none(),
                "night camera must not publish NV12 while inactive"
            );

            pipeline.shutdown();
            nv12.destroy().unwrap();
            stream.destroy().unwrap();
        });
    }
}
