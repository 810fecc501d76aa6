//! HAL Adapter: the only layer that talks to the vendor VIO/VENC/VDEC SDK.
//!
//! Everything above this module deals in the safe types re-exported here; raw vendor
//! status codes never escape [`petcam_hal_sys`] — they're mapped to [`crate::error::HalError`]
//! at the boundary this module's submodules own.

pub mod brightness;
pub mod decoder;
pub mod encoder;
pub mod gamma;
pub mod noise_reduction;
pub mod vio;

pub use brightness::{normalize_isp_stat, sampled_y_mean, IspStat};
pub use decoder::{DecodedFrame, DecoderContext};
pub use encoder::{nal_unit_type, EncodeOutcome, EncoderContext, MAX_BITRATE_KBPS};
pub use gamma::apply_gamma;
pub use noise_reduction::{NrBand, NrController};
pub use vio::{VioContext, VioFrame, VioPlane, VioRoute};
