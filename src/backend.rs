//! Capabilities the transcode pipeline consumes.
//!
//! The pipeline never talks to a codec library directly. It drives a
//! [`Backend`], whose associated types are the demuxer, decoder, muxer,
//! encoder, I/O sink, scaler, frame and packet of one particular media
//! library. [`FfmpegBackend`](crate::FfmpegBackend) is the production
//! implementation.
//!
//! Every associated resource type owns whatever it acquired and releases it
//! in `Drop`. The pipeline relies on that to guarantee release on every exit
//! path; see [`teardown`](crate::teardown).
//!
//! Decoders and encoders follow the push/pull model: one push may make zero
//! or more outputs available, and the caller pulls until the stage reports
//! it has nothing more (`Ok(false)`) before pushing again.

use std::path::Path;

use ffmpeg_next::Rational;
use ffmpeg_next::format::Pixel;

use crate::error::TranscodeError;
use crate::negotiate::{EncoderConfig, EncoderRegistry};
use crate::orientation::Orientation;
use crate::timestamp::PacketTiming;

/// Width, height and pixel layout of a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: Pixel,
}

/// Description of one elementary video stream inside an input container.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Index of the stream within its container.
    pub index: usize,
    /// Codec name as reported by the container (e.g. `"h264"`).
    pub codec: String,
    /// Coded width; may be zero or negative for malformed inputs.
    pub width: i32,
    /// Coded height; may be zero or negative for malformed inputs.
    pub height: i32,
    /// Time base of the stream's packets.
    pub time_base: Rational,
    /// Best guess of the frame rate, if the container offers one.
    pub frame_rate: Option<Rational>,
    /// Number of frames, if the container records it.
    pub frame_count: Option<u64>,
    /// Display orientation attached to the stream.
    pub orientation: Orientation,
}

/// Summary fields of an opened container, read without decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    /// Short format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format_name: String,
    /// Duration in microseconds, if known.
    pub duration_micros: Option<i64>,
    /// Total bit rate in bits per second; zero when unknown.
    pub bit_rate: i64,
    /// Number of streams in the container.
    pub stream_count: usize,
}

/// A compressed packet buffer, reused across reads.
pub trait MediaPacket {
    /// Index of the stream the packet belongs to.
    fn stream_index(&self) -> usize;
    /// Reassign the packet to another stream.
    fn set_stream_index(&mut self, index: usize);
    /// Current timestamps and duration.
    fn timing(&self) -> PacketTiming;
    /// Overwrite timestamps and duration.
    fn set_timing(&mut self, timing: PacketTiming);
    /// Drop the payload reference so the buffer can be refilled.
    fn unref(&mut self);
}

/// A raw picture buffer, reused across decodes.
pub trait MediaFrame {
    /// Presentation timestamp.
    fn pts(&self) -> Option<i64>;
    /// Overwrite the presentation timestamp.
    fn set_pts(&mut self, pts: Option<i64>);
}

/// An opened input container.
pub trait Demuxer {
    /// Packet type read from the container.
    type Packet;

    /// Read stream headers so codec parameters are populated.
    fn find_stream_info(&mut self) -> Result<(), TranscodeError>;

    /// Container summary fields.
    fn info(&self) -> ContainerInfo;

    /// Pick the best video stream, or `None` when there is none.
    fn best_video_stream(&self) -> Option<StreamDescriptor>;

    /// Read the next packet into `packet`. Returns `Ok(false)` at end of input.
    fn read_packet(&mut self, packet: &mut Self::Packet) -> Result<bool, TranscodeError>;
}

/// An opened video decoder.
pub trait Decoder {
    /// Compressed input.
    type Packet;
    /// Decoded output.
    type Frame;

    /// Geometry of decoded frames, resolved when the decoder opened.
    fn geometry(&self) -> VideoGeometry;

    /// Push one compressed packet.
    fn send_packet(&mut self, packet: &Self::Packet) -> Result<(), TranscodeError>;

    /// Push end of stream so buffered frames are released.
    fn send_eof(&mut self) -> Result<(), TranscodeError>;

    /// Pull one frame. Returns `Ok(false)` when no frame is available.
    fn receive_frame(&mut self, frame: &mut Self::Frame) -> Result<bool, TranscodeError>;
}

/// An opened video encoder.
pub trait Encoder {
    /// Raw input.
    type Frame;
    /// Compressed output.
    type Packet;

    /// Name the encoder was opened under (e.g. `"libx264"`).
    fn name(&self) -> &str;

    /// Time base of the packets the encoder produces.
    fn time_base(&self) -> Rational;

    /// Push one frame.
    fn send_frame(&mut self, frame: &Self::Frame) -> Result<(), TranscodeError>;

    /// Push end of stream so buffered packets are released.
    fn send_eof(&mut self) -> Result<(), TranscodeError>;

    /// Pull one packet. Returns `Ok(false)` when no packet is available.
    fn receive_packet(&mut self, packet: &mut Self::Packet) -> Result<bool, TranscodeError>;
}

/// A resampling transform from decoder geometry to encoder geometry.
pub trait Scaler {
    /// Picture type on both sides.
    type Frame;

    /// Scale `source` into `target`.
    fn scale(&mut self, source: &Self::Frame, target: &mut Self::Frame)
    -> Result<(), TranscodeError>;
}

/// An output container being written.
pub trait Muxer {
    /// Packet type written to the container.
    type Packet;

    /// Short name of the inferred output format (e.g. `"mp4"`).
    fn format_name(&self) -> String;

    /// Whether codecs must place parameter sets in a global header.
    fn requires_global_header(&self) -> bool;

    /// Attach a side-data block (display matrix) to a stream.
    fn set_display_matrix(&mut self, stream: usize, data: &[u8]) -> Result<(), TranscodeError>;

    /// Set a metadata tag on a stream.
    fn set_stream_tag(&mut self, stream: usize, key: &str, value: &str)
    -> Result<(), TranscodeError>;

    /// Write the container header.
    fn write_header(&mut self) -> Result<(), TranscodeError>;

    /// Time base of an output stream. Only final once the header is written.
    fn stream_time_base(&self, stream: usize) -> Result<Rational, TranscodeError>;

    /// Write one packet in interleaved (output) order.
    fn write_packet(&mut self, packet: &mut Self::Packet) -> Result<(), TranscodeError>;

    /// Write the container trailer.
    fn write_trailer(&mut self) -> Result<(), TranscodeError>;
}

/// A media library the pipeline can drive.
///
/// Methods are listed in the order the pipeline acquires their results.
pub trait Backend: EncoderRegistry {
    /// Compressed packet buffer.
    type Packet: MediaPacket;
    /// Raw picture buffer.
    type Frame: MediaFrame;
    /// Input container.
    type Input: Demuxer<Packet = Self::Packet>;
    /// Video decoder.
    type Decoder: Decoder<Packet = Self::Packet, Frame = Self::Frame>;
    /// Output container.
    type Output: Muxer<Packet = Self::Packet>;
    /// Video encoder.
    type Encoder: Encoder<Frame = Self::Frame, Packet = Self::Packet>;
    /// Open handle on the output file.
    type Sink;
    /// Scaling context.
    type Scaler: Scaler<Frame = Self::Frame>;

    /// Open an input container.
    fn open_input(&self, path: &Path) -> Result<Self::Input, TranscodeError>;

    /// Find and open a decoder for `stream`.
    fn open_decoder(
        &self,
        input: &Self::Input,
        stream: &StreamDescriptor,
    ) -> Result<Self::Decoder, TranscodeError>;

    /// Create an output container whose format is inferred from `path`.
    fn create_output(&self, path: &Path) -> Result<Self::Output, TranscodeError>;

    /// Open the encoder described by `config` and attach a matching stream
    /// to `output`. Returns the encoder and the new stream's index.
    fn open_encoder(
        &self,
        output: &mut Self::Output,
        config: &EncoderConfig,
    ) -> Result<(Self::Encoder, usize), TranscodeError>;

    /// Open the file `output` writes to.
    fn open_sink(&self, output: &mut Self::Output, path: &Path)
    -> Result<Self::Sink, TranscodeError>;

    /// Create a scaler between two geometries.
    fn create_scaler(
        &self,
        source: VideoGeometry,
        target: VideoGeometry,
    ) -> Result<Self::Scaler, TranscodeError>;

    /// Allocate a frame; with a geometry, its picture buffer is allocated too.
    fn allocate_frame(&self, geometry: Option<VideoGeometry>)
    -> Result<Self::Frame, TranscodeError>;

    /// Allocate an empty packet.
    fn allocate_packet(&self) -> Result<Self::Packet, TranscodeError>;
}
