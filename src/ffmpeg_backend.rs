//! FFmpeg implementation of the [`Backend`] traits.
//!
//! Most of the work goes through `ffmpeg-next`. A few steps drop to
//! `ffmpeg-sys-next` because the safe wrapper fuses them with a neighbour
//! the pipeline needs to keep separate: opening an input also probes its
//! streams, and creating an output also opens the file. Stream side data
//! and `av_guess_frame_rate` have no safe wrapper at all.

use std::ffi::{CString, c_int};
use std::path::Path;
use std::ptr;
use std::slice;

use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::format::context::{Input, Output};
use ffmpeg_next::format::stream::Stream;
use ffmpeg_next::format::Flags as FormatFlags;
use ffmpeg_next::frame::{Frame, Video as VideoFrame};
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::error::EAGAIN;
use ffmpeg_next::{Dictionary, Error as FfmpegError, Packet, Rational, decoder, encoder};
use ffmpeg_sys_next as sys;

use crate::backend::{
    Backend, ContainerInfo, Decoder, Demuxer, Encoder, MediaFrame, MediaPacket, Muxer, Scaler,
    StreamDescriptor, VideoGeometry,
};
use crate::error::TranscodeError;
use crate::negotiate::{EncoderConfig, EncoderRegistry};
use crate::orientation::{Orientation, ROTATE_TAG};
use crate::timestamp::PacketTiming;

/// The production backend, backed by the system FFmpeg libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Create the backend.
    pub fn new() -> Self {
        Self
    }
}

impl EncoderRegistry for FfmpegBackend {
    fn has_encoder(&self, name: &str) -> bool {
        encoder::find_by_name(name).is_some()
    }
}

/// Outcome of one pull from a decoder or encoder.
fn pulled(result: Result<(), FfmpegError>) -> Result<bool, FfmpegError> {
    match result {
        Ok(()) => Ok(true),
        Err(FfmpegError::Eof) => Ok(false),
        Err(FfmpegError::Other { errno }) if errno == EAGAIN => Ok(false),
        Err(error) => Err(error),
    }
}

fn path_to_cstring(path: &Path) -> Option<CString> {
    CString::new(path.to_string_lossy().as_bytes()).ok()
}

impl Backend for FfmpegBackend {
    type Packet = Packet;
    type Frame = VideoFrame;
    type Input = FfmpegInput;
    type Decoder = FfmpegDecoder;
    type Output = FfmpegOutput;
    type Encoder = FfmpegEncoder;
    type Sink = FfmpegSink;
    type Scaler = FfmpegScaler;

    fn open_input(&self, path: &Path) -> Result<FfmpegInput, TranscodeError> {
        let open_error = |reason: String| TranscodeError::FileOpen {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;
        let c_path =
            path_to_cstring(path).ok_or_else(|| open_error("path contains a NUL byte".into()))?;

        let mut context = ptr::null_mut();
        let ret = unsafe {
            sys::avformat_open_input(&mut context, c_path.as_ptr(), ptr::null(), ptr::null_mut())
        };
        if ret < 0 {
            return Err(open_error(FfmpegError::from(ret).to_string()));
        }

        log::debug!("Opened input {}", path.display());
        // The context is now ours; `Input` closes it on drop.
        Ok(FfmpegInput {
            context: unsafe { Input::wrap(context) },
        })
    }

    fn open_decoder(
        &self,
        input: &FfmpegInput,
        stream: &StreamDescriptor,
    ) -> Result<FfmpegDecoder, TranscodeError> {
        let source = input
            .context
            .stream(stream.index)
            .ok_or(TranscodeError::NoVideoStream)?;
        let parameters = source.parameters();

        let codec = decoder::find(parameters.id())
            .ok_or_else(|| TranscodeError::DecoderUnavailable(stream.codec.clone()))?;

        let context = CodecContext::from_parameters(parameters).map_err(|error| {
            TranscodeError::DecoderOpenFailed(format!("failed to copy decoder parameters: {error}"))
        })?;
        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|error| TranscodeError::DecoderOpenFailed(error.to_string()))?;

        log::debug!(
            "Opened {} decoder ({}x{} {:?})",
            stream.codec,
            decoder.width(),
            decoder.height(),
            decoder.format()
        );
        Ok(FfmpegDecoder { decoder })
    }

    fn create_output(&self, path: &Path) -> Result<FfmpegOutput, TranscodeError> {
        let inference_error = |reason: String| TranscodeError::OutputFormatInference {
            path: path.to_path_buf(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| inference_error(format!("FFmpeg initialisation failed: {error}")))?;
        let c_path = path_to_cstring(path)
            .ok_or_else(|| inference_error("path contains a NUL byte".into()))?;

        let mut context = ptr::null_mut();
        let ret = unsafe {
            sys::avformat_alloc_output_context2(
                &mut context,
                ptr::null(),
                ptr::null(),
                c_path.as_ptr(),
            )
        };
        if ret < 0 || context.is_null() {
            return Err(inference_error(FfmpegError::from(ret).to_string()));
        }

        // Only the context is allocated here; the file is opened by `open_sink`.
        let context = unsafe { Output::wrap(context) };
        log::debug!(
            "Created {} output context for {}",
            context.format().name(),
            path.display()
        );
        Ok(FfmpegOutput { context })
    }

    fn open_encoder(
        &self,
        output: &mut FfmpegOutput,
        config: &EncoderConfig,
    ) -> Result<(FfmpegEncoder, usize), TranscodeError> {
        let name = config.encoder.name();
        let open_failed = |reason: String| TranscodeError::EncoderOpenFailed {
            encoder: name.to_string(),
            reason,
        };

        let codec = encoder::find_by_name(name)
            .ok_or_else(|| open_failed("encoder is not registered".to_string()))?;

        let mut stream = output.context.add_stream(codec).map_err(|error| {
            TranscodeError::StreamSetupFailed(format!("failed to create output stream: {error}"))
        })?;
        let stream_index = stream.index();

        let mut video = CodecContext::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|error| open_failed(format!("could not allocate encoder context: {error}")))?;

        video.set_width(config.resolution.width);
        video.set_height(config.resolution.height);
        video.set_format(config.pixel_format);
        video.set_time_base(config.time_base);
        video.set_frame_rate(Some(config.frame_rate));
        video.set_gop(config.gop_size);
        video.set_max_b_frames(config.max_b_frames);
        video.set_bit_rate(config.bit_rate);

        if config.global_header {
            unsafe {
                (*video.as_mut_ptr()).flags |= sys::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let mut options = Dictionary::new();
        for (key, value) in &config.options {
            options.set(key, value);
        }

        let encoder = video
            .open_as_with(codec, options)
            .map_err(|error| open_failed(error.to_string()))?;

        stream.set_parameters(&encoder);
        stream.set_time_base(config.time_base);
        stream.set_avg_frame_rate(config.frame_rate);

        log::debug!("Opened {name} encoder on output stream {stream_index}");
        Ok((
            FfmpegEncoder {
                encoder,
                name,
                time_base: config.time_base,
            },
            stream_index,
        ))
    }

    fn open_sink(&self, output: &mut FfmpegOutput, path: &Path) -> Result<FfmpegSink, TranscodeError> {
        if output.context.format().flags().contains(FormatFlags::NO_FILE) {
            return Ok(FfmpegSink {
                context: ptr::null_mut(),
            });
        }

        let open_error = |reason: String| TranscodeError::OutputOpenFailed {
            path: path.to_path_buf(),
            reason,
        };
        let c_path =
            path_to_cstring(path).ok_or_else(|| open_error("path contains a NUL byte".into()))?;

        let context = unsafe { output.context.as_mut_ptr() };
        let ret = unsafe {
            sys::avio_open(
                &mut (*context).pb,
                c_path.as_ptr(),
                sys::AVIO_FLAG_WRITE as c_int,
            )
        };
        if ret < 0 {
            return Err(open_error(FfmpegError::from(ret).to_string()));
        }

        log::debug!("Opened output file {}", path.display());
        Ok(FfmpegSink { context })
    }

    fn create_scaler(
        &self,
        source: VideoGeometry,
        target: VideoGeometry,
    ) -> Result<FfmpegScaler, TranscodeError> {
        let context = ScalingContext::get(
            source.format,
            source.width,
            source.height,
            target.format,
            target.width,
            target.height,
            ScalingFlags::LANCZOS,
        )
        .map_err(|error| {
            TranscodeError::ScalerInitFailed(format!(
                "{}x{} {:?} -> {}x{} {:?}: {error}",
                source.width,
                source.height,
                source.format,
                target.width,
                target.height,
                target.format
            ))
        })?;
        Ok(FfmpegScaler { context })
    }

    fn allocate_frame(&self, geometry: Option<VideoGeometry>) -> Result<VideoFrame, TranscodeError> {
        let Some(geometry) = geometry else {
            return Ok(VideoFrame::empty());
        };

        let frame = VideoFrame::new(geometry.format, geometry.width, geometry.height);
        let allocated = unsafe { !(*frame.as_ptr()).data[0].is_null() };
        if !allocated {
            return Err(TranscodeError::AllocationFailed(format!(
                "no picture buffer for {}x{} {:?}",
                geometry.width, geometry.height, geometry.format
            )));
        }
        Ok(frame)
    }

    fn allocate_packet(&self) -> Result<Packet, TranscodeError> {
        Ok(Packet::empty())
    }
}

/// An opened input container.
pub struct FfmpegInput {
    context: Input,
}

impl Demuxer for FfmpegInput {
    type Packet = Packet;

    fn find_stream_info(&mut self) -> Result<(), TranscodeError> {
        let ret =
            unsafe { sys::avformat_find_stream_info(self.context.as_mut_ptr(), ptr::null_mut()) };
        if ret < 0 {
            return Err(TranscodeError::StreamInfo(FfmpegError::from(ret).to_string()));
        }
        Ok(())
    }

    fn info(&self) -> ContainerInfo {
        let duration = self.context.duration();
        ContainerInfo {
            format_name: self.context.format().name().to_string(),
            duration_micros: (duration != sys::AV_NOPTS_VALUE).then_some(duration),
            bit_rate: self.context.bit_rate(),
            stream_count: self.context.nb_streams() as usize,
        }
    }

    fn best_video_stream(&self) -> Option<StreamDescriptor> {
        let stream = self.context.streams().best(Type::Video)?;
        let parameters = stream.parameters();
        let (width, height) = unsafe {
            let raw = parameters.as_ptr();
            ((*raw).width, (*raw).height)
        };

        let guessed = unsafe {
            sys::av_guess_frame_rate(
                self.context.as_ptr() as *mut _,
                stream.as_ptr() as *mut _,
                ptr::null_mut(),
            )
        };
        let frames = stream.frames();

        Some(StreamDescriptor {
            index: stream.index(),
            codec: parameters.id().name().to_string(),
            width,
            height,
            time_base: stream.time_base(),
            frame_rate: Some(Rational::from(guessed)),
            frame_count: (frames > 0).then_some(frames as u64),
            orientation: read_orientation(&stream),
        })
    }

    fn read_packet(&mut self, packet: &mut Packet) -> Result<bool, TranscodeError> {
        match packet.read(&mut self.context) {
            Ok(()) => Ok(true),
            Err(FfmpegError::Eof) => Ok(false),
            Err(error) => Err(TranscodeError::FfmpegError(error.to_string())),
        }
    }
}

fn read_orientation(stream: &Stream) -> Orientation {
    let display_matrix = unsafe {
        let parameters = (*stream.as_ptr()).codecpar;
        let side_data = sys::av_packet_side_data_get(
            (*parameters).coded_side_data,
            (*parameters).nb_coded_side_data,
            sys::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null() || (*side_data).data.is_null() || (*side_data).size == 0 {
            None
        } else {
            Some(slice::from_raw_parts((*side_data).data, (*side_data).size as usize).to_vec())
        }
    };

    Orientation {
        display_matrix,
        rotate_tag: stream.metadata().get(ROTATE_TAG).map(str::to_string),
    }
}

/// An opened video decoder.
pub struct FfmpegDecoder {
    decoder: decoder::Video,
}

impl Decoder for FfmpegDecoder {
    type Packet = Packet;
    type Frame = VideoFrame;

    fn geometry(&self) -> VideoGeometry {
        VideoGeometry {
            width: self.decoder.width(),
            height: self.decoder.height(),
            format: self.decoder.format(),
        }
    }

    fn send_packet(&mut self, packet: &Packet) -> Result<(), TranscodeError> {
        self.decoder
            .send_packet(packet)
            .map_err(|error| TranscodeError::DecodeFailed(error.to_string()))
    }

    fn send_eof(&mut self) -> Result<(), TranscodeError> {
        self.decoder
            .send_eof()
            .map_err(|error| TranscodeError::DecodeFailed(error.to_string()))
    }

    fn receive_frame(&mut self, frame: &mut VideoFrame) -> Result<bool, TranscodeError> {
        pulled(self.decoder.receive_frame(frame))
            .map_err(|error| TranscodeError::DecodeFailed(error.to_string()))
    }
}

/// An output container.
pub struct FfmpegOutput {
    context: Output,
}

impl Muxer for FfmpegOutput {
    type Packet = Packet;

    fn format_name(&self) -> String {
        self.context.format().name().to_string()
    }

    fn requires_global_header(&self) -> bool {
        self.context
            .format()
            .flags()
            .contains(FormatFlags::GLOBAL_HEADER)
    }

    fn set_display_matrix(&mut self, stream: usize, data: &[u8]) -> Result<(), TranscodeError> {
        let mut target = self.context.stream_mut(stream).ok_or_else(|| {
            TranscodeError::StreamSetupFailed(format!("output stream {stream} does not exist"))
        })?;

        unsafe {
            let parameters = (*target.as_mut_ptr()).codecpar;
            let side_data = sys::av_packet_side_data_new(
                &mut (*parameters).coded_side_data,
                &mut (*parameters).nb_coded_side_data,
                sys::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
                data.len(),
                0,
            );
            if side_data.is_null() {
                return Err(TranscodeError::AllocationFailed(
                    "display matrix side data".to_string(),
                ));
            }
            ptr::copy_nonoverlapping(data.as_ptr(), (*side_data).data, data.len());
        }
        Ok(())
    }

    fn set_stream_tag(&mut self, stream: usize, key: &str, value: &str) -> Result<(), TranscodeError> {
        let invalid = |what: &str| {
            TranscodeError::StreamSetupFailed(format!("metadata {what} contains a NUL byte"))
        };
        let c_key = CString::new(key).map_err(|_| invalid("key"))?;
        let c_value = CString::new(value).map_err(|_| invalid("value"))?;

        let mut target = self.context.stream_mut(stream).ok_or_else(|| {
            TranscodeError::StreamSetupFailed(format!("output stream {stream} does not exist"))
        })?;
        let ret = unsafe {
            sys::av_dict_set(
                &mut (*target.as_mut_ptr()).metadata,
                c_key.as_ptr(),
                c_value.as_ptr(),
                0,
            )
        };
        if ret < 0 {
            return Err(TranscodeError::StreamSetupFailed(
                FfmpegError::from(ret).to_string(),
            ));
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), TranscodeError> {
        self.context
            .write_header()
            .map_err(|error| TranscodeError::HeaderWriteFailed(error.to_string()))
    }

    fn stream_time_base(&self, stream: usize) -> Result<Rational, TranscodeError> {
        self.context
            .stream(stream)
            .map(|stream| stream.time_base())
            .ok_or_else(|| TranscodeError::StreamSetupFailed(format!("no output stream {stream}")))
    }

    fn write_packet(&mut self, packet: &mut Packet) -> Result<(), TranscodeError> {
        packet
            .write_interleaved(&mut self.context)
            .map_err(|error| TranscodeError::PacketWriteFailed(error.to_string()))
    }

    fn write_trailer(&mut self) -> Result<(), TranscodeError> {
        self.context
            .write_trailer()
            .map_err(|error| TranscodeError::TrailerWriteFailed(error.to_string()))
    }
}

/// An opened video encoder.
pub struct FfmpegEncoder {
    encoder: encoder::video::Encoder,
    name: &'static str,
    time_base: Rational,
}

impl Encoder for FfmpegEncoder {
    type Frame = VideoFrame;
    type Packet = Packet;

    fn name(&self) -> &str {
        self.name
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_frame(&mut self, frame: &VideoFrame) -> Result<(), TranscodeError> {
        self.encoder
            .send_frame(frame)
            .map_err(|error| TranscodeError::EncodeFailed(error.to_string()))
    }

    fn send_eof(&mut self) -> Result<(), TranscodeError> {
        self.encoder
            .send_eof()
            .map_err(|error| TranscodeError::EncodeFailed(error.to_string()))
    }

    fn receive_packet(&mut self, packet: &mut Packet) -> Result<bool, TranscodeError> {
        pulled(self.encoder.receive_packet(packet))
            .map_err(|error| TranscodeError::EncodeFailed(error.to_string()))
    }
}

/// The open output file of an [`FfmpegOutput`].
///
/// Closes the file on drop. It refers to the output context by pointer, so
/// it must be dropped before the output it was opened on; the pipeline's
/// teardown order guarantees that.
pub struct FfmpegSink {
    context: *mut sys::AVFormatContext,
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if !self.context.is_null() {
            unsafe {
                sys::avio_closep(&mut (*self.context).pb);
            }
        }
    }
}

/// A software scaling context.
pub struct FfmpegScaler {
    context: ScalingContext,
}

impl Scaler for FfmpegScaler {
    type Frame = VideoFrame;

    fn scale(&mut self, source: &VideoFrame, target: &mut VideoFrame) -> Result<(), TranscodeError> {
        // The encoder may still reference the previous picture.
        let ret = unsafe { sys::av_frame_make_writable(target.as_mut_ptr()) };
        if ret < 0 {
            return Err(TranscodeError::ScaleFailed(FfmpegError::from(ret).to_string()));
        }
        self.context
            .run(source, target)
            .map_err(|error| TranscodeError::ScaleFailed(error.to_string()))
    }
}

impl MediaPacket for Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }

    fn set_stream_index(&mut self, index: usize) {
        self.set_stream(index);
    }

    fn timing(&self) -> PacketTiming {
        PacketTiming {
            pts: self.pts(),
            dts: self.dts(),
            duration: self.duration(),
        }
    }

    fn set_timing(&mut self, timing: PacketTiming) {
        self.set_pts(timing.pts);
        self.set_dts(timing.dts);
        self.set_duration(timing.duration);
    }

    fn unref(&mut self) {
        unsafe {
            sys::av_packet_unref(self.as_mut_ptr());
        }
    }
}

impl MediaFrame for VideoFrame {
    fn pts(&self) -> Option<i64> {
        Frame::pts(self)
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        Frame::set_pts(self, pts);
    }
}
