//! Media inspection parsing and statistics
//!
//! Everything in here is pure: the analyzer adapter runs the external tools and
//! hands their output to these functions.

pub mod breathing;
pub mod ffprobe;
pub mod frames;
pub mod quality;

pub use breathing::{BreathingRating, BreathingReport};
pub use ffprobe::{FormatInfo, ProbeOutput, StreamInfo};
pub use frames::{FrameSample, FrameStats, PictType};
pub use quality::{FramePsnr, PsnrSummary};
