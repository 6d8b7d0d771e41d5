//! Timestamp rescaling between time bases.
//!
//! Encoded packets come out of the encoder stamped in the encoder's time
//! base, but the muxer expects the output stream's time base (which the
//! muxer may pick itself while writing the header, e.g. 1/15360 for MP4).
//! Conversions go through FFmpeg's `av_rescale_q`, so long runs never
//! accumulate drift. Both time bases must be valid; the transcoder checks
//! the output stream's before any packet is written.

use ffmpeg_next::{Rational, Rescale};

/// Rescale `value` from time base `from` to time base `to`.
///
/// Rounds to nearest, halfway cases away from zero.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    value.rescale(from, to)
}

/// Whether `time_base` can be used as a rescaling target.
pub fn is_valid_time_base(time_base: Rational) -> bool {
    time_base.numerator() > 0 && time_base.denominator() > 0
}

/// Timing fields of one compressed packet.
///
/// Absent timestamps stay absent through rescaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketTiming {
    /// Presentation timestamp.
    pub pts: Option<i64>,
    /// Decode timestamp.
    pub dts: Option<i64>,
    /// Packet duration; zero when unknown.
    pub duration: i64,
}

impl PacketTiming {
    /// Rescale all three fields from `from` to `to`.
    pub fn rescale(self, from: Rational, to: Rational) -> Self {
        Self {
            pts: self.pts.map(|pts| pts.rescale(from, to)),
            dts: self.dts.map(|dts| dts.rescale(from, to)),
            duration: self.duration.rescale(from, to),
        }
    }
}

/// Synthetic presentation clock for frames entering the encoder.
///
/// Source timestamps may be irregular or missing altogether, so every frame
/// handed to the encoder is restamped with 0, 1, 2, … in encoder time-base
/// units (one tick per frame).
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    next: i64,
}

impl FrameClock {
    /// Create a clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next timestamp and advance the clock.
    pub fn tick(&mut self) -> i64 {
        let pts = self.next;
        self.next += 1;
        pts
    }

    /// Number of timestamps handed out so far.
    pub fn frames(&self) -> u64 {
        self.next as u64
    }
}
