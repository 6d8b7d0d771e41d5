//! Orientation metadata passthrough.
//!
//! Phones record portrait video as landscape frames plus a display matrix
//! telling players how to rotate them. The frames are re-encoded untouched,
//! so the matrix (and the older `rotate` tag some muxers still write) must be
//! carried over verbatim or the output plays sideways.

use crate::backend::Muxer;
use crate::error::TranscodeError;

/// Metadata key of the legacy rotation tag.
pub const ROTATE_TAG: &str = "rotate";

/// Size in bytes of a display matrix: 3×3 signed 32-bit integers.
pub const DISPLAY_MATRIX_SIZE: usize = 36;

/// Orientation information attached to a video stream.
///
/// Both parts are independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Orientation {
    /// Raw display-matrix side data, copied byte for byte.
    pub display_matrix: Option<Vec<u8>>,
    /// Value of the `rotate` metadata tag, copied verbatim.
    pub rotate_tag: Option<String>,
}

impl Orientation {
    /// Returns `true` when there is nothing to copy.
    pub fn is_empty(&self) -> bool {
        self.display_matrix.is_none() && self.rotate_tag.is_none()
    }

    /// Counter-clockwise rotation encoded in the display matrix, in degrees.
    ///
    /// The matrix is nine native-endian `i32`s; the first two rows hold
    /// 16.16 fixed-point values. Returns `None` when there is no matrix, it
    /// is too short, or its scale is zero.
    pub fn rotation_degrees(&self) -> Option<f64> {
        let data = self.display_matrix.as_deref()?;
        if data.len() < DISPLAY_MATRIX_SIZE {
            return None;
        }

        let entry = |index: usize| -> f64 {
            let start = index * 4;
            let bytes = [data[start], data[start + 1], data[start + 2], data[start + 3]];
            f64::from(i32::from_ne_bytes(bytes)) / 65536.0
        };

        let scale_0 = entry(0).hypot(entry(3));
        let scale_1 = entry(1).hypot(entry(4));
        if scale_0 == 0.0 || scale_1 == 0.0 {
            return None;
        }

        let rotation = -(entry(1) / scale_1).atan2(entry(0) / scale_0).to_degrees();
        // Normalise -0.0 to 0.0.
        Some(if rotation == 0.0 { 0.0 } else { rotation })
    }
}

/// Copy `orientation` onto output stream `stream`.
///
/// Must run before the container header is written. Missing parts are
/// skipped silently.
pub fn apply_orientation<M: Muxer + ?Sized>(
    muxer: &mut M,
    stream: usize,
    orientation: &Orientation,
) -> Result<(), TranscodeError> {
    if let Some(matrix) = orientation.display_matrix.as_deref().filter(|m| !m.is_empty()) {
        log::debug!(
            "Copying {} bytes of display matrix to output stream {stream}",
            matrix.len()
        );
        muxer.set_display_matrix(stream, matrix)?;
    }

    if let Some(rotate) = orientation.rotate_tag.as_deref() {
        log::debug!("Copying rotate tag {rotate:?} to output stream {stream}");
        muxer.set_stream_tag(stream, ROTATE_TAG, rotate)?;
    }

    if let Some(degrees) = orientation.rotation_degrees() {
        log::info!("Preserving display rotation of {degrees:.0} degrees");
    }

    Ok(())
}
