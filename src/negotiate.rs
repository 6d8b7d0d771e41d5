//! Encoder negotiation and codec-specific tuning.
//!
//! Software encoders are tried in a fixed order, first match wins:
//!
//! 1. `libx264`: best quality per byte, run in constant-rate-factor mode.
//! 2. `mpeg4`: the fallback for constrained playback targets. It gets
//!    conservative settings (no B-frames, short GOP, 1/30 time base) because
//!    some decoders choke on anything fancier.
//! 3. `libx265`: last resort, default settings.
//!
//! # Example
//!
//! ```
//! use vidcompress::{EncoderKind, EncoderRegistry, negotiate_encoder};
//!
//! struct OnlyMpeg4;
//!
//! impl EncoderRegistry for OnlyMpeg4 {
//!     fn has_encoder(&self, name: &str) -> bool {
//!         name == "mpeg4"
//!     }
//! }
//!
//! let chosen = negotiate_encoder(&OnlyMpeg4, &EncoderKind::PREFERENCE).unwrap();
//! assert_eq!(chosen, EncoderKind::Mpeg4);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use ffmpeg_next::Rational;
use ffmpeg_next::format::Pixel;

use crate::config::TranscodeOptions;
use crate::error::TranscodeError;
use crate::resolution::Resolution;

/// Read-only view of the encoders a media library has registered.
pub trait EncoderRegistry {
    /// Returns `true` if an encoder called `name` can be opened.
    fn has_encoder(&self, name: &str) -> bool;
}

/// Software encoders the pipeline knows how to tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderKind {
    /// x264 H.264 encoder.
    Libx264,
    /// FFmpeg's native MPEG-4 Part 2 encoder.
    Mpeg4,
    /// x265 HEVC encoder.
    Libx265,
}

impl EncoderKind {
    /// Default negotiation order.
    pub const PREFERENCE: [EncoderKind; 3] =
        [EncoderKind::Libx264, EncoderKind::Mpeg4, EncoderKind::Libx265];

    /// Registry name of the encoder.
    pub const fn name(self) -> &'static str {
        match self {
            EncoderKind::Libx264 => "libx264",
            EncoderKind::Mpeg4 => "mpeg4",
            EncoderKind::Libx265 => "libx265",
        }
    }
}

impl Display for EncoderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

/// Pick the first encoder in `preference` that `registry` has.
///
/// # Errors
///
/// Returns [`TranscodeError::NoEncoderAvailable`] when none is registered.
pub fn negotiate_encoder<R: EncoderRegistry + ?Sized>(
    registry: &R,
    preference: &[EncoderKind],
) -> Result<EncoderKind, TranscodeError> {
    for &kind in preference {
        if registry.has_encoder(kind.name()) {
            log::debug!("Negotiated encoder {kind}");
            return Ok(kind);
        }
        log::debug!("Encoder {kind} is not registered");
    }

    let tried: Vec<&str> = preference.iter().map(|kind| kind.name()).collect();
    Err(TranscodeError::NoEncoderAvailable(tried.join("/")))
}

/// Everything needed to open an encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Which encoder to open.
    pub encoder: EncoderKind,
    /// Output frame size.
    pub resolution: Resolution,
    /// Input pixel format the encoder expects.
    pub pixel_format: Pixel,
    /// Encoder time base; one tick per frame.
    pub time_base: Rational,
    /// Nominal frame rate.
    pub frame_rate: Rational,
    /// Distance between key frames.
    pub gop_size: u32,
    /// Maximum consecutive B-frames.
    pub max_b_frames: usize,
    /// Target bit rate in bits per second; zero leaves rate control to the
    /// codec options.
    pub bit_rate: usize,
    /// Put parameter sets in the container's global header.
    pub global_header: bool,
    /// Encoder options passed at open time, in order.
    pub options: Vec<(String, String)>,
}

impl EncoderConfig {
    /// Build the configuration for `encoder` and apply its tuning.
    ///
    /// `frame_rate` must already be valid (positive numerator and
    /// denominator); the pipeline substitutes the fallback rate first.
    pub fn new(
        encoder: EncoderKind,
        resolution: Resolution,
        frame_rate: Rational,
        global_header: bool,
        options: &TranscodeOptions,
    ) -> Self {
        let mut config = Self {
            encoder,
            resolution,
            pixel_format: Pixel::YUV420P,
            time_base: frame_rate.invert(),
            frame_rate,
            gop_size: options.gop_size,
            max_b_frames: options.max_b_frames,
            bit_rate: options.bit_rate,
            global_header,
            options: Vec::new(),
        };
        config.tune();
        config
    }

    fn tune(&mut self) {
        match self.encoder {
            EncoderKind::Libx264 => {
                self.set_option("preset", "medium");
                self.set_option("profile", "main");
                self.set_option("tune", "film");
                self.set_option("crf", "22");
                self.bit_rate = 0;
            }
            EncoderKind::Mpeg4 => {
                self.max_b_frames = 0;
                self.gop_size = 12;
                self.time_base = Rational::new(1, 30);
                self.frame_rate = Rational::new(30, 1);
                self.set_option("qmin", "3");
                self.set_option("qmax", "31");
            }
            EncoderKind::Libx265 => {}
        }
    }

    fn set_option(&mut self, key: &str, value: &str) {
        self.options.push((key.to_string(), value.to_string()));
    }

    /// Look up an encoder option by key.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
