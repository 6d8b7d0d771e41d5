//! Output resolution planning.
//!
//! The pipeline never upscales: a source is shrunk uniformly until it fits
//! inside the bounding box (1280×720 by default) and both dimensions are
//! rounded down to even numbers, which 4:2:0 pixel formats require.
//!
//! # Example
//!
//! ```
//! use vidcompress::plan_output_resolution;
//!
//! let planned = plan_output_resolution(1920, 1080);
//! assert_eq!((planned.width, planned.height), (1280, 720));
//!
//! let planned = plan_output_resolution(640, 480);
//! assert_eq!((planned.width, planned.height), (640, 480));
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Default maximum output width.
pub const MAX_OUTPUT_WIDTH: u32 = 1280;

/// Default maximum output height.
pub const MAX_OUTPUT_HEIGHT: u32 = 720;

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a resolution from a width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(MAX_OUTPUT_WIDTH, MAX_OUTPUT_HEIGHT)
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Plan the output size for a source of `width`×`height` inside the default
/// 1280×720 box.
///
/// Non-positive source dimensions are not an error; see
/// [`plan_bounded_resolution`].
pub fn plan_output_resolution(width: i32, height: i32) -> Resolution {
    plan_bounded_resolution(width, height, Resolution::default())
}

/// Plan the output size for a source of `width`×`height` inside `bounds`.
///
/// The scale factor is `min(1, bounds.width / width, bounds.height / height)`
/// and each scaled dimension is floored to an even number. The arithmetic is
/// done on integers so that sizes which fit exactly (1920×1080 into
/// 1280×720) never lose a pixel to floating-point error.
///
/// A non-positive source dimension does not constrain the scale. Any
/// dimension that comes out as zero falls back to the matching bound.
pub fn plan_bounded_resolution(width: i32, height: i32, bounds: Resolution) -> Resolution {
    let source_width = i64::from(width);
    let source_height = i64::from(height);
    let max_width = i64::from(bounds.width);
    let max_height = i64::from(bounds.height);

    // Candidate scale factors as (numerator, denominator); 1/1 means "no shrink".
    let width_factor = if source_width > max_width {
        (max_width, source_width)
    } else {
        (1, 1)
    };
    let height_factor = if source_height > max_height {
        (max_height, source_height)
    } else {
        (1, 1)
    };

    // a/b <= c/d  <=>  a*d <= c*b for positive denominators.
    let (numerator, denominator) =
        if width_factor.0 * height_factor.1 <= height_factor.0 * width_factor.1 {
            width_factor
        } else {
            height_factor
        };

    let scaled_even = |dimension: i64| -> i64 {
        if dimension <= 0 {
            return 0;
        }
        dimension * numerator / (2 * denominator) * 2
    };

    let output_width = scaled_even(source_width);
    let output_height = scaled_even(source_height);

    if output_width <= 0 || output_height <= 0 {
        log::warn!(
            "Source geometry {width}x{height} is degenerate; substituting {} where needed",
            bounds
        );
    }

    Resolution {
        width: if output_width > 0 {
            output_width as u32
        } else {
            bounds.width
        },
        height: if output_height > 0 {
            output_height as u32
        } else {
            bounds.height
        },
    }
}
