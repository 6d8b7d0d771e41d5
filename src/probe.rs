//! Container probing.
//!
//! [`MediaProbe`] opens a container, reads its summary fields and closes it
//! again. No packets are read and nothing is decoded, so probing is cheap
//! even for long files.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::Path;
use std::time::Duration;

use crate::backend::{Backend, ContainerInfo, Demuxer};
use crate::error::TranscodeError;
use crate::ffmpeg_backend::FfmpegBackend;

/// Summary fields of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSummary {
    /// Short format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format_name: String,
    /// Container duration; zero when the container does not record one.
    /// A negative recorded duration is reported by magnitude.
    pub duration: Duration,
    /// Total bit rate in bits per second; zero when unknown.
    pub bit_rate: i64,
    /// Number of streams of any kind.
    pub stream_count: usize,
}

impl From<ContainerInfo> for ProbeSummary {
    fn from(info: ContainerInfo) -> Self {
        let micros = info.duration_micros.unwrap_or(0).unsigned_abs();
        Self {
            format_name: info.format_name,
            duration: Duration::from_micros(micros),
            bit_rate: info.bit_rate,
            stream_count: info.stream_count,
        }
    }
}

impl Display for ProbeSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "Format: {}", self.format_name)?;
        writeln!(f, "Duration: {:.2} seconds", self.duration.as_secs_f64())?;
        writeln!(f, "Bitrate: {} kb/s", self.bit_rate / 1000)?;
        writeln!(f, "Streams: {}", self.stream_count)
    }
}

/// Reads container summaries.
///
/// ```no_run
/// use vidcompress::MediaProbe;
///
/// let summary = MediaProbe::probe("clip.mp4")?;
/// print!("{summary}");
/// # Ok::<(), vidcompress::TranscodeError>(())
/// ```
pub struct MediaProbe;

impl MediaProbe {
    /// Probe a file with the FFmpeg backend.
    ///
    /// # Errors
    ///
    /// [`TranscodeError::FileOpen`] if the file cannot be opened as a
    /// container, [`TranscodeError::StreamInfo`] if its stream headers
    /// cannot be read.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<ProbeSummary, TranscodeError> {
        Self::probe_with(&FfmpegBackend::new(), path)
    }

    /// Probe a file with any backend.
    pub fn probe_with<B: Backend, P: AsRef<Path>>(
        backend: &B,
        path: P,
    ) -> Result<ProbeSummary, TranscodeError> {
        let path = path.as_ref();
        log::debug!("Probing {}", path.display());

        let mut input = backend.open_input(path)?;
        input.find_stream_info()?;
        Ok(ProbeSummary::from(input.info()))
    }

    /// Probe several files. A file that fails yields an `Err` entry rather
    /// than aborting the batch.
    pub fn probe_many<P: AsRef<Path>>(paths: &[P]) -> Vec<Result<ProbeSummary, TranscodeError>> {
        let backend = FfmpegBackend::new();
        paths
            .iter()
            .map(|path| Self::probe_with(&backend, path))
            .collect()
    }
}
