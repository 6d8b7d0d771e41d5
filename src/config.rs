//! Transcode configuration.
//!
//! [`TranscodeOptions`] carries the tunables of a transcode. The defaults
//! are the product policy: fit inside 1280×720, prefer `libx264`, assume
//! 30 fps when the input does not say, 2.5 Mb/s, 60-frame GOP, up to two
//! B-frames. Codec-specific tuning (see [`negotiate`](crate::negotiate))
//! is applied on top.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use vidcompress::{
//!     ProgressCallback, ProgressInfo, Resolution, TranscodeError, TranscodeOptions, Transcoder,
//! };
//!
//! struct LogProgress;
//!
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} frames encoded", info.current);
//!     }
//! }
//!
//! let options = TranscodeOptions::new()
//!     .with_max_resolution(Resolution::new(854, 480))
//!     .with_progress(Arc::new(LogProgress))
//!     .with_batch_size(30);
//! Transcoder::new("input.mov", "output.mp4")
//!     .with_options(options)
//!     .run()?;
//! # Ok::<(), TranscodeError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use ffmpeg_next::Rational;

use crate::negotiate::EncoderKind;
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::resolution::Resolution;

/// Default target bit rate in bits per second.
pub const DEFAULT_BIT_RATE: usize = 2_500_000;

/// Default distance between key frames.
pub const DEFAULT_GOP_SIZE: u32 = 60;

/// Default maximum consecutive B-frames.
pub const DEFAULT_MAX_B_FRAMES: usize = 2;

/// Options for a transcode.
#[derive(Clone)]
pub struct TranscodeOptions {
    /// Bounding box the output must fit inside.
    pub(crate) max_resolution: Resolution,
    /// Encoders to try, in order.
    pub(crate) encoder_preference: Vec<EncoderKind>,
    /// Frame rate used when the input has no usable one.
    pub(crate) fallback_frame_rate: Rational,
    /// Base bit rate before codec tuning.
    pub(crate) bit_rate: usize,
    /// Base GOP size before codec tuning.
    pub(crate) gop_size: u32,
    /// Base B-frame limit before codec tuning.
    pub(crate) max_b_frames: usize,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Fire the progress callback every N encoded frames.
    pub(crate) batch_size: u64,
}

impl Debug for TranscodeOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TranscodeOptions")
            .field("max_resolution", &self.max_resolution)
            .field("encoder_preference", &self.encoder_preference)
            .field("fallback_frame_rate", &self.fallback_frame_rate)
            .field("bit_rate", &self.bit_rate)
            .field("gop_size", &self.gop_size)
            .field("max_b_frames", &self.max_b_frames)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscodeOptions {
    /// Create options with the default policy.
    pub fn new() -> Self {
        Self {
            max_resolution: Resolution::default(),
            encoder_preference: EncoderKind::PREFERENCE.to_vec(),
            fallback_frame_rate: Rational::new(30, 1),
            bit_rate: DEFAULT_BIT_RATE,
            gop_size: DEFAULT_GOP_SIZE,
            max_b_frames: DEFAULT_MAX_B_FRAMES,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Set the bounding box for the output resolution.
    #[must_use]
    pub fn with_max_resolution(mut self, bounds: Resolution) -> Self {
        self.max_resolution = bounds;
        self
    }

    /// Replace the encoder negotiation order.
    #[must_use]
    pub fn with_encoder_preference(mut self, preference: Vec<EncoderKind>) -> Self {
        self.encoder_preference = preference;
        self
    }

    /// Set the frame rate assumed for inputs that do not declare one.
    ///
    /// Invalid rates (zero or negative terms) are ignored.
    #[must_use]
    pub fn with_fallback_frame_rate(mut self, frame_rate: Rational) -> Self {
        if frame_rate.numerator() > 0 && frame_rate.denominator() > 0 {
            self.fallback_frame_rate = frame_rate;
        }
        self
    }

    /// Set the base bit rate in bits per second.
    #[must_use]
    pub fn with_bit_rate(mut self, bit_rate: usize) -> Self {
        self.bit_rate = bit_rate;
        self
    }

    /// Set the base GOP size.
    #[must_use]
    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Set the base B-frame limit.
    #[must_use]
    pub fn with_max_b_frames(mut self, max_b_frames: usize) -> Self {
        self.max_b_frames = max_b_frames;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Bounding box for the output resolution.
    pub fn max_resolution(&self) -> Resolution {
        self.max_resolution
    }

    /// Encoder negotiation order.
    pub fn encoder_preference(&self) -> &[EncoderKind] {
        &self.encoder_preference
    }

    /// Frame rate assumed for inputs that do not declare one.
    pub fn fallback_frame_rate(&self) -> Rational {
        self.fallback_frame_rate
    }
}
