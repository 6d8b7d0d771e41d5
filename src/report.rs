//! String-returning entry points.
//!
//! Callers that only want a message to show a user, such as the C ABI in
//! [`ffi`](crate::ffi), get one here. Failures are folded into the
//! returned text instead of an error value.

use std::path::Path;

use crate::error::TranscodeError;
use crate::probe::MediaProbe;
use crate::transcode::Transcoder;

/// Message returned after a successful transcode.
pub const TRANSCODE_SUCCESS: &str = "Video compression completed successfully";

/// Probe `path` and return its four-line summary, or a short error message.
pub fn probe<P: AsRef<Path>>(path: P) -> String {
    match MediaProbe::probe(path) {
        Ok(summary) => summary.to_string(),
        Err(TranscodeError::FileOpen { .. }) => "Error opening file".to_string(),
        Err(TranscodeError::StreamInfo(_)) => "Error finding stream info".to_string(),
        Err(error) => error.to_string(),
    }
}

/// Transcode `input` to `output` with default options and describe the outcome.
pub fn transcode<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> String {
    match Transcoder::new(input, output).run() {
        Ok(summary) => {
            log::info!(
                "{} frames encoded with {} at {}",
                summary.frames_encoded,
                summary.encoder,
                summary.resolution
            );
            TRANSCODE_SUCCESS.to_string()
        }
        Err(error) => error.to_string(),
    }
}
