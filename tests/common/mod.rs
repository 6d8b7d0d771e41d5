//! Scripted in-memory backend for pipeline tests.
//!
//! Every resource it hands out carries a guard that records its acquisition
//! and release in a shared [`Ledger`], so tests can check teardown order and
//! balance. Any step can be made to fail through [`MockConfig::fail_at`].

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use ffmpeg_next::Rational;
use ffmpeg_next::format::Pixel;
use vidcompress::{
    Backend, ContainerInfo, Decoder, Demuxer, Encoder, EncoderConfig, EncoderRegistry, MediaFrame,
    MediaPacket, Muxer, Orientation, PacketTiming, Scaler, StreamDescriptor, TranscodeError,
    VideoGeometry,
};

/// A step of the pipeline the mock can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    OpenInput,
    StreamInfo,
    OpenDecoder,
    CreateOutput,
    OpenEncoder,
    OpenSink,
    DisplayMatrix,
    WriteHeader,
    CreateScaler,
    AllocateFrame,
    AllocatePacket,
    EncodeFrame,
    WritePacket,
    /// Encoder end-of-stream signal, at the start of draining.
    FlushEncoder,
    /// Writing a packet the encoder released only after end-of-stream.
    WriteDrained,
    WriteTrailer,
}

impl FailAt {
    pub const ALL: [FailAt; 16] = [
        FailAt::OpenInput,
        FailAt::StreamInfo,
        FailAt::OpenDecoder,
        FailAt::CreateOutput,
        FailAt::OpenEncoder,
        FailAt::OpenSink,
        FailAt::DisplayMatrix,
        FailAt::WriteHeader,
        FailAt::CreateScaler,
        FailAt::AllocateFrame,
        FailAt::AllocatePacket,
        FailAt::EncodeFrame,
        FailAt::WritePacket,
        FailAt::FlushEncoder,
        FailAt::WriteDrained,
        FailAt::WriteTrailer,
    ];

    fn error(self) -> TranscodeError {
        let reason = format!("injected failure at {self:?}");
        match self {
            FailAt::OpenInput => TranscodeError::FileOpen {
                path: "input.mov".into(),
                reason,
            },
            FailAt::StreamInfo => TranscodeError::StreamInfo(reason),
            FailAt::OpenDecoder => TranscodeError::DecoderOpenFailed(reason),
            FailAt::CreateOutput => TranscodeError::OutputFormatInference {
                path: "output.mp4".into(),
                reason,
            },
            FailAt::OpenEncoder => TranscodeError::EncoderOpenFailed {
                encoder: "mock".to_string(),
                reason,
            },
            FailAt::OpenSink => TranscodeError::OutputOpenFailed {
                path: "output.mp4".into(),
                reason,
            },
            FailAt::DisplayMatrix => TranscodeError::AllocationFailed(reason),
            FailAt::WriteHeader => TranscodeError::HeaderWriteFailed(reason),
            FailAt::CreateScaler => TranscodeError::ScalerInitFailed(reason),
            FailAt::AllocateFrame | FailAt::AllocatePacket => {
                TranscodeError::AllocationFailed(reason)
            }
            FailAt::EncodeFrame | FailAt::FlushEncoder => TranscodeError::EncodeFailed(reason),
            FailAt::WritePacket | FailAt::WriteDrained => {
                TranscodeError::PacketWriteFailed(reason)
            }
            FailAt::WriteTrailer => TranscodeError::TrailerWriteFailed(reason),
        }
    }
}

/// One entry of the scripted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// A well-formed packet.
    Packet { stream: usize, pts: Option<i64> },
    /// A packet the decoder rejects.
    Corrupt { stream: usize },
    /// A read error that ends the input.
    ReadError,
}

/// Behaviour of a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub width: u32,
    pub height: u32,
    pub stream_width: i32,
    pub stream_height: i32,
    /// Index of the video stream; `None` means the input has none.
    pub video_stream: Option<usize>,
    pub stream_count: usize,
    pub time_base: Rational,
    pub frame_rate: Option<Rational>,
    pub frame_count: Option<u64>,
    pub orientation: Orientation,
    pub encoders: Vec<&'static str>,
    pub packets: Vec<Scripted>,
    /// Frames the decoder holds back before emitting the lowest pts.
    pub decoder_delay: usize,
    /// Frames the encoder holds back before emitting a packet.
    pub encoder_delay: usize,
    /// Time base the muxer settles on once the header is written.
    pub output_time_base: Rational,
    /// Decoded frames (1-based) the scaler refuses.
    pub unscalable_frames: Vec<u64>,
    pub fail_at: Option<FailAt>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            stream_width: 1920,
            stream_height: 1080,
            video_stream: Some(0),
            stream_count: 2,
            time_base: Rational::new(1, 90000),
            frame_rate: Some(Rational::new(30, 1)),
            frame_count: None,
            orientation: Orientation::default(),
            encoders: vec!["libx264", "mpeg4", "libx265"],
            packets: video_packets(0, 10),
            decoder_delay: 0,
            encoder_delay: 0,
            output_time_base: Rational::new(1, 15360),
            unscalable_frames: Vec::new(),
            fail_at: None,
        }
    }
}

/// `count` video packets on `stream` with regular pts 3000 apart.
pub fn video_packets(stream: usize, count: i64) -> Vec<Scripted> {
    (0..count)
        .map(|i| Scripted::Packet {
            stream,
            pts: Some(i * 3000),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquired(String),
    Released(String),
}

/// Everything the mock observed during a run.
#[derive(Debug, Default)]
pub struct Ledger {
    pub events: Vec<Event>,
    pub encoder_config: Option<EncoderConfig>,
    pub scaler_geometry: Option<(VideoGeometry, VideoGeometry)>,
    pub display_matrix: Option<(usize, Vec<u8>)>,
    pub tags: Vec<(usize, String, String)>,
    pub header_written: bool,
    pub trailer_written: bool,
    pub decoded_streams: Vec<usize>,
    pub frames_sent: Vec<Option<i64>>,
    pub written: Vec<(usize, PacketTiming)>,
}

impl Ledger {
    pub fn acquired(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Acquired(name) => Some(name.clone()),
                Event::Released(_) => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Released(name) => Some(name.clone()),
                Event::Acquired(_) => None,
            })
            .collect()
    }
}

type SharedLedger = Rc<RefCell<Ledger>>;

/// Records its own release when dropped.
#[derive(Debug)]
pub struct Tracked {
    name: String,
    ledger: SharedLedger,
}

impl Tracked {
    fn new(ledger: &SharedLedger, name: impl Into<String>) -> Self {
        let name = name.into();
        ledger.borrow_mut().events.push(Event::Acquired(name.clone()));
        Self {
            name,
            ledger: ledger.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.ledger
            .borrow_mut()
            .events
            .push(Event::Released(self.name.clone()));
    }
}

pub struct MockBackend {
    pub config: MockConfig,
    pub ledger: SharedLedger,
    frames: Cell<usize>,
    packets: Cell<usize>,
}

impl MockBackend {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            ledger: Rc::default(),
            frames: Cell::new(0),
            packets: Cell::new(0),
        }
    }

    fn check(&self, step: FailAt) -> Result<(), TranscodeError> {
        match self.config.fail_at {
            Some(fail) if fail == step => Err(step.error()),
            _ => Ok(()),
        }
    }
}

impl EncoderRegistry for MockBackend {
    fn has_encoder(&self, name: &str) -> bool {
        self.config.encoders.contains(&name)
    }
}

#[derive(Debug)]
pub struct MockPacket {
    stream: usize,
    timing: PacketTiming,
    corrupt: bool,
    /// Produced by the encoder after end-of-stream.
    drained: bool,
    _guard: Tracked,
}

impl MediaPacket for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn set_stream_index(&mut self, index: usize) {
        self.stream = index;
    }

    fn timing(&self) -> PacketTiming {
        self.timing
    }

    fn set_timing(&mut self, timing: PacketTiming) {
        self.timing = timing;
    }

    fn unref(&mut self) {
        self.timing = PacketTiming::default();
        self.corrupt = false;
        self.drained = false;
    }
}

#[derive(Debug)]
pub struct MockFrame {
    pts: Option<i64>,
    _guard: Tracked,
}

impl MediaFrame for MockFrame {
    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn set_pts(&mut self, pts: Option<i64>) {
        self.pts = pts;
    }
}

pub struct MockInput {
    config: MockConfig,
    cursor: usize,
    _guard: Tracked,
}

impl Demuxer for MockInput {
    type Packet = MockPacket;

    fn find_stream_info(&mut self) -> Result<(), TranscodeError> {
        match self.config.fail_at {
            Some(FailAt::StreamInfo) => Err(FailAt::StreamInfo.error()),
            _ => Ok(()),
        }
    }

    fn info(&self) -> ContainerInfo {
        ContainerInfo {
            format_name: "mock".to_string(),
            duration_micros: Some(self.config.packets.len() as i64 * 33_333),
            bit_rate: 1_000_000,
            stream_count: self.config.stream_count,
        }
    }

    fn best_video_stream(&self) -> Option<StreamDescriptor> {
        let index = self.config.video_stream?;
        Some(StreamDescriptor {
            index,
            codec: "h264".to_string(),
            width: self.config.stream_width,
            height: self.config.stream_height,
            time_base: self.config.time_base,
            frame_rate: self.config.frame_rate,
            frame_count: self.config.frame_count,
            orientation: self.config.orientation.clone(),
        })
    }

    fn read_packet(&mut self, packet: &mut MockPacket) -> Result<bool, TranscodeError> {
        let Some(&next) = self.config.packets.get(self.cursor) else {
            return Ok(false);
        };
        self.cursor += 1;

        match next {
            Scripted::Packet { stream, pts } => {
                packet.stream = stream;
                packet.timing = PacketTiming {
                    pts,
                    dts: pts,
                    duration: 3000,
                };
                packet.corrupt = false;
                Ok(true)
            }
            Scripted::Corrupt { stream } => {
                packet.stream = stream;
                packet.timing = PacketTiming::default();
                packet.corrupt = true;
                Ok(true)
            }
            Scripted::ReadError => Err(TranscodeError::FfmpegError("I/O error".to_string())),
        }
    }
}

pub struct MockDecoder {
    geometry: VideoGeometry,
    delay: usize,
    pending: Vec<Option<i64>>,
    ledger: SharedLedger,
    _guard: Tracked,
}

impl MockDecoder {
    fn take_lowest(&mut self) -> Option<Option<i64>> {
        let position = self
            .pending
            .iter()
            .enumerate()
            .min_by_key(|(_, pts)| **pts)
            .map(|(position, _)| position)?;
        Some(self.pending.remove(position))
    }
}

impl Decoder for MockDecoder {
    type Packet = MockPacket;
    type Frame = MockFrame;

    fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    fn send_packet(&mut self, packet: &MockPacket) -> Result<(), TranscodeError> {
        if packet.corrupt {
            return Err(TranscodeError::DecodeFailed(
                "invalid data found when processing input".to_string(),
            ));
        }
        self.ledger.borrow_mut().decoded_streams.push(packet.stream);
        self.pending.push(packet.timing.pts);
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), TranscodeError> {
        self.delay = 0;
        Ok(())
    }

    fn receive_frame(&mut self, frame: &mut MockFrame) -> Result<bool, TranscodeError> {
        if self.pending.len() <= self.delay {
            return Ok(false);
        }
        match self.take_lowest() {
            Some(pts) => {
                frame.pts = pts;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct MockScaler {
    unscalable: Vec<u64>,
    seen: u64,
    _guard: Tracked,
}

impl Scaler for MockScaler {
    type Frame = MockFrame;

    fn scale(&mut self, _source: &MockFrame, target: &mut MockFrame) -> Result<(), TranscodeError> {
        self.seen += 1;
        if self.unscalable.contains(&self.seen) {
            return Err(TranscodeError::ScaleFailed("bad picture".to_string()));
        }
        // Scaling never carries timestamps across.
        target.pts = None;
        Ok(())
    }
}

pub struct MockEncoder {
    name: &'static str,
    time_base: Rational,
    delay: usize,
    pending: Vec<i64>,
    next_dts: i64,
    fail_at: Option<FailAt>,
    flushed: bool,
    ledger: SharedLedger,
    _guard: Tracked,
}

impl Encoder for MockEncoder {
    type Frame = MockFrame;
    type Packet = MockPacket;

    fn name(&self) -> &str {
        self.name
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_frame(&mut self, frame: &MockFrame) -> Result<(), TranscodeError> {
        if self.fail_at == Some(FailAt::EncodeFrame) {
            return Err(FailAt::EncodeFrame.error());
        }
        self.ledger.borrow_mut().frames_sent.push(frame.pts);
        self.pending.push(frame.pts.unwrap_or(0));
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), TranscodeError> {
        if self.fail_at == Some(FailAt::FlushEncoder) {
            return Err(FailAt::FlushEncoder.error());
        }
        self.delay = 0;
        self.flushed = true;
        Ok(())
    }

    fn receive_packet(&mut self, packet: &mut MockPacket) -> Result<bool, TranscodeError> {
        if self.pending.len() <= self.delay {
            return Ok(false);
        }
        let pts = self.pending.remove(0);
        packet.stream = 99;
        packet.drained = self.flushed;
        packet.timing = PacketTiming {
            pts: Some(pts),
            dts: Some(self.next_dts),
            duration: 1,
        };
        self.next_dts += 1;
        Ok(true)
    }
}

pub struct MockOutput {
    fail_at: Option<FailAt>,
    output_time_base: Rational,
    header_written: bool,
    ledger: SharedLedger,
    _guard: Tracked,
}

impl Muxer for MockOutput {
    type Packet = MockPacket;

    fn format_name(&self) -> String {
        "mp4".to_string()
    }

    fn requires_global_header(&self) -> bool {
        true
    }

    fn set_display_matrix(&mut self, stream: usize, data: &[u8]) -> Result<(), TranscodeError> {
        if self.fail_at == Some(FailAt::DisplayMatrix) {
            return Err(FailAt::DisplayMatrix.error());
        }
        self.ledger.borrow_mut().display_matrix = Some((stream, data.to_vec()));
        Ok(())
    }

    fn set_stream_tag(&mut self, stream: usize, key: &str, value: &str) -> Result<(), TranscodeError> {
        self.ledger
            .borrow_mut()
            .tags
            .push((stream, key.to_string(), value.to_string()));
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), TranscodeError> {
        if self.fail_at == Some(FailAt::WriteHeader) {
            return Err(FailAt::WriteHeader.error());
        }
        self.header_written = true;
        self.ledger.borrow_mut().header_written = true;
        Ok(())
    }

    fn stream_time_base(&self, stream: usize) -> Result<Rational, TranscodeError> {
        if stream != 0 {
            return Err(TranscodeError::StreamSetupFailed(format!("no output stream {stream}")));
        }
        if self.header_written {
            Ok(self.output_time_base)
        } else {
            Ok(Rational::new(0, 1))
        }
    }

    fn write_packet(&mut self, packet: &mut MockPacket) -> Result<(), TranscodeError> {
        if self.fail_at == Some(FailAt::WritePacket) {
            return Err(FailAt::WritePacket.error());
        }
        if packet.drained && self.fail_at == Some(FailAt::WriteDrained) {
            return Err(FailAt::WriteDrained.error());
        }
        self.ledger
            .borrow_mut()
            .written
            .push((packet.stream, packet.timing));
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), TranscodeError> {
        if self.fail_at == Some(FailAt::WriteTrailer) {
            return Err(FailAt::WriteTrailer.error());
        }
        self.ledger.borrow_mut().trailer_written = true;
        Ok(())
    }
}

impl Backend for MockBackend {
    type Packet = MockPacket;
    type Frame = MockFrame;
    type Input = MockInput;
    type Decoder = MockDecoder;
    type Output = MockOutput;
    type Encoder = MockEncoder;
    type Sink = Tracked;
    type Scaler = MockScaler;

    fn open_input(&self, _path: &Path) -> Result<MockInput, TranscodeError> {
        self.check(FailAt::OpenInput)?;
        Ok(MockInput {
            config: self.config.clone(),
            cursor: 0,
            _guard: Tracked::new(&self.ledger, "input"),
        })
    }

    fn open_decoder(
        &self,
        _input: &MockInput,
        _stream: &StreamDescriptor,
    ) -> Result<MockDecoder, TranscodeError> {
        self.check(FailAt::OpenDecoder)?;
        Ok(MockDecoder {
            geometry: VideoGeometry {
                width: self.config.width,
                height: self.config.height,
                format: Pixel::YUV420P,
            },
            delay: self.config.decoder_delay,
            pending: Vec::new(),
            ledger: self.ledger.clone(),
            _guard: Tracked::new(&self.ledger, "decoder"),
        })
    }

    fn create_output(&self, _path: &Path) -> Result<MockOutput, TranscodeError> {
        self.check(FailAt::CreateOutput)?;
        Ok(MockOutput {
            fail_at: self.config.fail_at,
            output_time_base: self.config.output_time_base,
            header_written: false,
            ledger: self.ledger.clone(),
            _guard: Tracked::new(&self.ledger, "output"),
        })
    }

    fn open_encoder(
        &self,
        _output: &mut MockOutput,
        config: &EncoderConfig,
    ) -> Result<(MockEncoder, usize), TranscodeError> {
        self.check(FailAt::OpenEncoder)?;
        self.ledger.borrow_mut().encoder_config = Some(config.clone());
        let encoder = MockEncoder {
            name: config.encoder.name(),
            time_base: config.time_base,
            delay: self.config.encoder_delay,
            pending: Vec::new(),
            next_dts: -(self.config.encoder_delay as i64),
            fail_at: self.config.fail_at,
            flushed: false,
            ledger: self.ledger.clone(),
            _guard: Tracked::new(&self.ledger, "encoder"),
        };
        Ok((encoder, 0))
    }

    fn open_sink(&self, _output: &mut MockOutput, _path: &Path) -> Result<Tracked, TranscodeError> {
        self.check(FailAt::OpenSink)?;
        Ok(Tracked::new(&self.ledger, "sink"))
    }

    fn create_scaler(
        &self,
        source: VideoGeometry,
        target: VideoGeometry,
    ) -> Result<MockScaler, TranscodeError> {
        self.check(FailAt::CreateScaler)?;
        self.ledger.borrow_mut().scaler_geometry = Some((source, target));
        Ok(MockScaler {
            unscalable: self.config.unscalable_frames.clone(),
            seen: 0,
            _guard: Tracked::new(&self.ledger, "scaler"),
        })
    }

    fn allocate_frame(&self, _geometry: Option<VideoGeometry>) -> Result<MockFrame, TranscodeError> {
        let n = self.frames.get() + 1;
        // The second frame is the one that fails, so one is already held.
        if n == 2 {
            self.check(FailAt::AllocateFrame)?;
        }
        self.frames.set(n);
        Ok(MockFrame {
            pts: None,
            _guard: Tracked::new(&self.ledger, format!("frame#{n}")),
        })
    }

    fn allocate_packet(&self) -> Result<MockPacket, TranscodeError> {
        let n = self.packets.get() + 1;
        if n == 2 {
            self.check(FailAt::AllocatePacket)?;
        }
        self.packets.set(n);
        Ok(MockPacket {
            stream: 0,
            timing: PacketTiming::default(),
            corrupt: false,
            drained: false,
            _guard: Tracked::new(&self.ledger, format!("packet#{n}")),
        })
    }
}
