//! # vidcompress
//!
//! Re-encode a video file into a smaller, web-friendly one: the best video
//! stream is decoded, scaled to fit inside 1280×720 and encoded with the
//! first available software encoder (`libx264`, then `mpeg4`, then
//! `libx265`), into a container chosen from the output file's extension.
//! The source's display orientation is carried across.
//!
//! Built on FFmpeg via [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next).
//!
//! ## Quick Start
//!
//! ### Compress a Video
//!
//! ```no_run
//! use vidcompress::Transcoder;
//!
//! let summary = Transcoder::new("holiday.mov", "holiday.mp4").run()?;
//! println!("{} frames at {} with {}", summary.frames_encoded, summary.resolution, summary.encoder);
//! # Ok::<(), vidcompress::TranscodeError>(())
//! ```
//!
//! ### Probe a File
//!
//! ```no_run
//! use vidcompress::MediaProbe;
//!
//! print!("{}", MediaProbe::probe("holiday.mp4")?);
//! # Ok::<(), vidcompress::TranscodeError>(())
//! ```
//!
//! ## Guarantees
//!
//! - Output dimensions never exceed the bounding box, keep the source aspect
//!   ratio up to even rounding, and are always even.
//! - Output timestamps are a contiguous frame count, so a source with
//!   broken timestamps still produces a playable file.
//! - Every resource a run acquires is released exactly once, newest first,
//!   whether the run succeeds or fails at any step. See [`teardown`].
//! - Decode errors on individual packets are logged and skipped; encode and
//!   write errors end the run.
//!
//! ## Logging
//!
//! The crate reports through the [`log`](https://crates.io/crates/log)
//! facade. Stage transitions and resource release are logged at `debug`,
//! skipped packets and frames at `warn`. FFmpeg's own console output is
//! tuned separately with [`set_ffmpeg_log_level`].
//!
//! ## C ABI
//!
//! The `cdylib` build exports `vidcompress_probe`, `vidcompress_transcode`
//! and `vidcompress_release`; see [`ffi`].

pub mod backend;
pub mod config;
pub mod error;
pub mod ffi;
pub mod ffmpeg;
pub mod ffmpeg_backend;
pub mod negotiate;
pub mod orientation;
pub mod probe;
pub mod progress;
pub mod report;
pub mod resolution;
pub mod teardown;
pub mod timestamp;
pub mod transcode;

pub use backend::{
    Backend, ContainerInfo, Decoder, Demuxer, Encoder, MediaFrame, MediaPacket, Muxer, Scaler,
    StreamDescriptor, VideoGeometry,
};
pub use config::TranscodeOptions;
pub use error::TranscodeError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use ffmpeg_backend::FfmpegBackend;
pub use negotiate::{EncoderConfig, EncoderKind, EncoderRegistry, negotiate_encoder};
pub use orientation::{Orientation, apply_orientation};
pub use probe::{MediaProbe, ProbeSummary};
pub use progress::{ProgressCallback, ProgressInfo};
pub use resolution::{Resolution, plan_bounded_resolution, plan_output_resolution};
pub use teardown::Stage;
pub use timestamp::{FrameClock, PacketTiming, is_valid_time_base, rescale};
pub use transcode::{TranscodeSummary, Transcoder};
