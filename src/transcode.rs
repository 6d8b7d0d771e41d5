//! Single-pass video transcoding.
//!
//! [`Transcoder`] reads one container, decodes its best video stream,
//! shrinks every frame to fit the configured bounding box, re-encodes with
//! the first available encoder and writes a new container whose format is
//! inferred from the output extension. Audio, subtitles and any other
//! streams are dropped. Orientation metadata is carried over.
//!
//! # Example
//!
//! ```no_run
//! use vidcompress::{TranscodeError, Transcoder};
//!
//! let summary = Transcoder::new("input.mov", "output.mp4").run()?;
//! println!(
//!     "{} frames encoded with {} at {}",
//!     summary.frames_encoded, summary.encoder, summary.resolution
//! );
//! # Ok::<(), TranscodeError>(())
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::Rational;

use crate::backend::{
    Backend, Decoder, Demuxer, Encoder, MediaFrame, MediaPacket, Muxer, Scaler, VideoGeometry,
};
use crate::config::TranscodeOptions;
use crate::error::TranscodeError;
use crate::ffmpeg_backend::FfmpegBackend;
use crate::negotiate::{EncoderConfig, EncoderKind, negotiate_encoder};
use crate::orientation::apply_orientation;
use crate::progress::ProgressTracker;
use crate::resolution::{Resolution, plan_bounded_resolution};
use crate::teardown::{Resources, Stage, advance};
use crate::timestamp::{FrameClock, is_valid_time_base};

/// Outcome of a successful transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSummary {
    /// Encoder that produced the output.
    pub encoder: EncoderKind,
    /// Output frame size.
    pub resolution: Resolution,
    /// Frames produced by the decoder.
    pub frames_decoded: u64,
    /// Frames handed to the encoder.
    pub frames_encoded: u64,
    /// Encoded packets written to the output.
    pub packets_written: u64,
    /// Input packets the decoder rejected.
    pub packets_skipped: u64,
    /// Decoded frames that could not be scaled.
    pub frames_skipped: u64,
}

/// Builder for a transcode from one file to another.
///
/// Created with [`Transcoder::new`] for the FFmpeg backend or
/// [`Transcoder::with_backend`] for any other [`Backend`].
pub struct Transcoder<B: Backend = FfmpegBackend> {
    backend: B,
    input_path: PathBuf,
    output_path: PathBuf,
    options: TranscodeOptions,
}

impl Transcoder<FfmpegBackend> {
    /// Create a transcoder from `input` to `output` using FFmpeg.
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(input: P1, output: P2) -> Self {
        Self::with_backend(FfmpegBackend::new(), input, output)
    }
}

impl<B: Backend> Transcoder<B> {
    /// Create a transcoder that drives `backend`.
    pub fn with_backend<P1: AsRef<Path>, P2: AsRef<Path>>(backend: B, input: P1, output: P2) -> Self {
        Self {
            backend,
            input_path: input.as_ref().to_path_buf(),
            output_path: output.as_ref().to_path_buf(),
            options: TranscodeOptions::default(),
        }
    }

    /// Replace the transcode options.
    #[must_use]
    pub fn with_options(mut self, options: TranscodeOptions) -> Self {
        self.options = options;
        self
    }

    /// The backend this transcoder drives.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run the transcode to completion on the calling thread.
    ///
    /// Every resource acquired along the way is released before this
    /// returns, whether it succeeds or fails.
    ///
    /// If a failure happens after the output file was opened but before its
    /// trailer was written, the file is left on disk incomplete and most
    /// likely unplayable. It is not deleted.
    ///
    /// A failed run ends in [`Stage::Failed`]; the last stage it completed
    /// is logged with the error.
    ///
    /// # Errors
    ///
    /// One [`TranscodeError`] variant per step that can fail, e.g.
    /// [`TranscodeError::FileOpen`], [`TranscodeError::NoVideoStream`],
    /// [`TranscodeError::NoEncoderAvailable`] or
    /// [`TranscodeError::EncoderOpenFailed`].
    pub fn run(&self) -> Result<TranscodeSummary, TranscodeError> {
        log::info!(
            "Transcoding {:?} -> {:?}",
            self.input_path,
            self.output_path
        );

        let mut resources = Resources::<B>::new();
        let result = self.execute(&mut resources);

        match &result {
            Ok(summary) => log::info!(
                "Transcoded {} frames ({} packets) with {} at {}",
                summary.frames_encoded,
                summary.packets_written,
                summary.encoder,
                summary.resolution
            ),
            Err(error) => {
                log::warn!(
                    "Transcode of {:?} failed after stage '{}': {error}",
                    self.input_path,
                    resources.stage
                );
                resources.fail();
                if resources.sink.is_some() {
                    log::warn!(
                        "Output {:?} was opened and is left incomplete",
                        self.output_path
                    );
                }
            }
        }

        drop(resources);
        result
    }

    fn execute(&self, res: &mut Resources<B>) -> Result<TranscodeSummary, TranscodeError> {
        let backend = &self.backend;
        let options = &self.options;

        let input = res.input.insert(backend.open_input(&self.input_path)?);
        advance(&mut res.stage, Stage::Opened);

        input.find_stream_info()?;
        advance(&mut res.stage, Stage::StreamInfoProbed);

        let stream = input.best_video_stream().ok_or(TranscodeError::NoVideoStream)?;
        log::debug!(
            "Selected video stream {} ({}, {}x{})",
            stream.index,
            stream.codec,
            stream.width,
            stream.height
        );
        advance(&mut res.stage, Stage::VideoStreamLocated);

        let decoder = res.decoder.insert(backend.open_decoder(input, &stream)?);
        let source = decoder.geometry();
        advance(&mut res.stage, Stage::DecoderReady);

        let output = res.output.insert(backend.create_output(&self.output_path)?);
        advance(&mut res.stage, Stage::OutputContainerCreated);

        let kind = negotiate_encoder(backend, &options.encoder_preference)?;
        let resolution = plan_bounded_resolution(
            i32::try_from(source.width).unwrap_or(0),
            i32::try_from(source.height).unwrap_or(0),
            options.max_resolution,
        );
        let frame_rate = usable_frame_rate(stream.frame_rate).unwrap_or_else(|| {
            log::warn!(
                "Input has no usable frame rate; assuming {}",
                options.fallback_frame_rate
            );
            options.fallback_frame_rate
        });
        let config = EncoderConfig::new(
            kind,
            resolution,
            frame_rate,
            output.requires_global_header(),
            options,
        );
        log::debug!(
            "Encoding {}x{} -> {} with {} at {} fps",
            source.width,
            source.height,
            resolution,
            kind,
            config.frame_rate
        );
        advance(&mut res.stage, Stage::EncoderNegotiated);

        let (encoder, stream_index) = backend.open_encoder(output, &config)?;
        let encoder = res.encoder.insert(encoder);
        advance(&mut res.stage, Stage::EncoderReady);

        res.sink = Some(backend.open_sink(output, &self.output_path)?);
        apply_orientation(output, stream_index, &stream.orientation)
            .map_err(|error| TranscodeError::HeaderWriteFailed(error.to_string()))?;
        output.write_header()?;
        let output_time_base = output.stream_time_base(stream_index)?;
        if !is_valid_time_base(output_time_base) {
            return Err(TranscodeError::StreamSetupFailed(format!(
                "output stream {stream_index} has invalid time base {output_time_base}"
            )));
        }
        advance(&mut res.stage, Stage::HeaderWritten);

        let target = VideoGeometry {
            width: resolution.width,
            height: resolution.height,
            format: config.pixel_format,
        };
        let scaler = res.scaler.insert(backend.create_scaler(source, target)?);
        let decoded_frame = res.decoded_frame.insert(backend.allocate_frame(None)?);
        let scaled_frame = res.scaled_frame.insert(backend.allocate_frame(Some(target))?);
        let input_packet = res.input_packet.insert(backend.allocate_packet()?);
        let output_packet = res.output_packet.insert(backend.allocate_packet()?);
        advance(&mut res.stage, Stage::Transcoding);

        let encoder_time_base = encoder.time_base();
        let mut frame_loop = FrameLoop::<B> {
            decoder,
            scaler,
            encoder,
            output,
            decoded_frame,
            scaled_frame,
            output_packet,
            stream_index,
            encoder_time_base,
            output_time_base,
            clock: FrameClock::new(),
            progress: ProgressTracker::new(
                options.progress.clone(),
                stream.frame_count,
                options.batch_size,
            ),
            frames_decoded: 0,
            packets_written: 0,
            packets_skipped: 0,
            frames_skipped: 0,
        };

        loop {
            match input.read_packet(input_packet) {
                Ok(true) => {}
                Ok(false) => break,
                Err(error) => {
                    log::warn!("Stopping at unreadable input packet: {error}");
                    break;
                }
            }

            // Only the selected video stream is decoded; everything else is dropped.
            if input_packet.stream_index() == stream.index {
                match frame_loop.decoder.send_packet(input_packet) {
                    Ok(()) => frame_loop.pump_decoder()?,
                    Err(error) => {
                        log::warn!("Skipping packet rejected by the decoder: {error}");
                        frame_loop.packets_skipped += 1;
                    }
                }
            }
            input_packet.unref();
        }

        advance(&mut res.stage, Stage::Draining);
        frame_loop.flush()?;

        frame_loop.output.write_trailer()?;
        frame_loop.progress.finish();
        advance(&mut res.stage, Stage::Finalized);

        Ok(TranscodeSummary {
            encoder: kind,
            resolution,
            frames_decoded: frame_loop.frames_decoded,
            frames_encoded: frame_loop.clock.frames(),
            packets_written: frame_loop.packets_written,
            packets_skipped: frame_loop.packets_skipped,
            frames_skipped: frame_loop.frames_skipped,
        })
    }
}

/// A frame rate is usable when both terms are positive.
fn usable_frame_rate(rate: Option<Rational>) -> Option<Rational> {
    rate.filter(|rate| rate.numerator() > 0 && rate.denominator() > 0)
}

/// Borrowed view of the resources the per-frame loop works on.
struct FrameLoop<'a, B: Backend> {
    decoder: &'a mut B::Decoder,
    scaler: &'a mut B::Scaler,
    encoder: &'a mut B::Encoder,
    output: &'a mut B::Output,
    decoded_frame: &'a mut B::Frame,
    scaled_frame: &'a mut B::Frame,
    output_packet: &'a mut B::Packet,
    stream_index: usize,
    encoder_time_base: Rational,
    output_time_base: Rational,
    clock: FrameClock,
    progress: ProgressTracker,
    frames_decoded: u64,
    packets_written: u64,
    packets_skipped: u64,
    frames_skipped: u64,
}

impl<B: Backend> FrameLoop<'_, B> {
    /// Pull every frame the decoder has ready and push each to the encoder.
    fn pump_decoder(&mut self) -> Result<(), TranscodeError> {
        loop {
            match self.decoder.receive_frame(self.decoded_frame) {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(error) => {
                    log::warn!("Decoder failed, dropping its pending frames: {error}");
                    return Ok(());
                }
            }
            self.frames_decoded += 1;

            if let Err(error) = self.scaler.scale(self.decoded_frame, self.scaled_frame) {
                log::warn!("Skipping frame that could not be scaled: {error}");
                self.frames_skipped += 1;
                continue;
            }

            let pts = self.clock.tick();
            self.scaled_frame.set_pts(Some(pts));
            self.encoder.send_frame(self.scaled_frame)?;
            self.progress.advance();

            self.drain_encoder()?;
        }
    }

    /// Pull every packet the encoder has ready and write it out.
    fn drain_encoder(&mut self) -> Result<(), TranscodeError> {
        while self.encoder.receive_packet(self.output_packet)? {
            self.output_packet.set_stream_index(self.stream_index);
            let timing = self
                .output_packet
                .timing()
                .rescale(self.encoder_time_base, self.output_time_base);
            self.output_packet.set_timing(timing);
            self.output.write_packet(self.output_packet)?;
            self.output_packet.unref();
            self.packets_written += 1;
        }
        Ok(())
    }

    /// Flush the decoder, then the encoder.
    fn flush(&mut self) -> Result<(), TranscodeError> {
        match self.decoder.send_eof() {
            Ok(()) => self.pump_decoder()?,
            Err(error) => log::warn!("Decoder flush failed: {error}"),
        }

        self.encoder.send_eof()?;
        self.drain_encoder()
    }
}
