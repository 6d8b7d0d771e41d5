//! Error types for the `vidcompress` crate.
//!
//! This module defines [`TranscodeError`], the error type returned by every
//! fallible operation in the crate. Each variant corresponds to the pipeline
//! step that failed, so the message alone tells the caller how far a
//! transcode got before it was torn down.

use std::path::PathBuf;

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `vidcompress` operations.
///
/// None of these are fatal to the calling process: the pipeline releases
/// everything it acquired before returning one of them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TranscodeError {
    /// The input container could not be opened.
    #[error("Error opening input file {path}: {reason}")]
    FileOpen {
        /// Path that was passed in.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// Stream headers could not be read from the input.
    #[error("Error finding stream info: {0}")]
    StreamInfo(String),

    /// The input does not contain a video stream.
    #[error("No video stream found")]
    NoVideoStream,

    /// No decoder is registered for the video stream's codec.
    #[error("Video decoder not found for codec {0}")]
    DecoderUnavailable(String),

    /// The decoder exists but could not be configured or opened.
    #[error("Failed to open decoder: {0}")]
    DecoderOpenFailed(String),

    /// The output container format could not be inferred from the path.
    #[error("Failed to create output context for {path}: {reason}")]
    OutputFormatInference {
        /// Destination path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// None of the preferred encoders is registered.
    #[error("No suitable software encoder found ({0})")]
    NoEncoderAvailable(String),

    /// The negotiated encoder refused to open.
    #[error("Failed to open encoder: {encoder}, {reason}")]
    EncoderOpenFailed {
        /// Name of the encoder that was negotiated.
        encoder: String,
        /// Diagnostic text from the codec library.
        reason: String,
    },

    /// The output stream could not be created or configured from the
    /// encoder's parameters.
    #[error("Failed to set encoder parameters: {0}")]
    StreamSetupFailed(String),

    /// The output file could not be opened for writing.
    #[error("Failed to open output file {path}: {reason}")]
    OutputOpenFailed {
        /// Destination path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The container header could not be written.
    #[error("Failed to write header: {0}")]
    HeaderWriteFailed(String),

    /// The scaling context could not be created.
    #[error("Failed to init scaler: {0}")]
    ScalerInitFailed(String),

    /// A frame or packet buffer could not be allocated.
    #[error("Failed to allocate frames/packets: {0}")]
    AllocationFailed(String),

    /// The decoder failed on a packet or while producing frames.
    #[error("Failed to decode video frame: {0}")]
    DecodeFailed(String),

    /// A decoded frame could not be converted to the encoder's geometry.
    #[error("Failed to scale frame: {0}")]
    ScaleFailed(String),

    /// The encoder rejected a frame or the end-of-stream signal.
    #[error("Failed to encode frame: {0}")]
    EncodeFailed(String),

    /// The muxer rejected an encoded packet.
    #[error("Failed to write packet: {0}")]
    PacketWriteFailed(String),

    /// The container trailer could not be written.
    #[error("Failed to write trailer: {0}")]
    TrailerWriteFailed(String),

    /// An error originating from the FFmpeg libraries outside a named step.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),
}

impl From<FfmpegError> for TranscodeError {
    fn from(error: FfmpegError) -> Self {
        TranscodeError::FfmpegError(error.to_string())
    }
}
