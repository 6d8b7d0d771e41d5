//! Pipeline stages and resource teardown.
//!
//! A transcode acquires up to ten resources, each depending on the ones
//! before it. [`Resources`] holds one slot per resource in acquisition
//! order; its `Drop` empties the slots back to front. Whatever the exit path
//! (success, `?` on any step, or a panic unwinding through the pipeline),
//! exactly the resources that were acquired are released, each once, in
//! reverse order.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::backend::Backend;

/// Progress of a transcode through its state machine.
///
/// Stages only move forward. A run ends in one of two terminal stages:
/// [`Stage::Finalized`] once the trailer is written, or [`Stage::Failed`]
/// from any earlier stage when a step returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Nothing acquired yet.
    Idle,
    /// Input container opened.
    Opened,
    /// Stream headers read.
    StreamInfoProbed,
    /// Best video stream selected.
    VideoStreamLocated,
    /// Decoder opened.
    DecoderReady,
    /// Output container created from the destination extension.
    OutputContainerCreated,
    /// Encoder chosen and output geometry planned.
    EncoderNegotiated,
    /// Encoder opened and output stream attached.
    EncoderReady,
    /// Orientation copied and header written.
    HeaderWritten,
    /// Frame loop running.
    Transcoding,
    /// Flushing buffered frames and packets.
    Draining,
    /// Trailer written.
    Finalized,
    /// A step failed; resources are being released.
    Failed,
}

impl Stage {
    /// Returns `true` once an output file may exist on disk.
    ///
    /// [`Stage::Failed`] does not say how far the run got, so it returns
    /// `false`.
    pub fn output_may_exist(self) -> bool {
        (Stage::EncoderReady..=Stage::Finalized).contains(&self)
    }

    /// Returns `true` for [`Stage::Finalized`] and [`Stage::Failed`].
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Finalized | Stage::Failed)
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Opened => "opened",
            Stage::StreamInfoProbed => "stream info probed",
            Stage::VideoStreamLocated => "video stream located",
            Stage::DecoderReady => "decoder ready",
            Stage::OutputContainerCreated => "output container created",
            Stage::EncoderNegotiated => "encoder negotiated",
            Stage::EncoderReady => "encoder ready",
            Stage::HeaderWritten => "header written",
            Stage::Transcoding => "transcoding",
            Stage::Draining => "draining",
            Stage::Finalized => "finalized",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Every resource a transcode can hold, in acquisition order.
///
/// Slots are filled with `Option::insert` as the pipeline advances. The
/// pipeline borrows the slots it needs directly, so several can be in use at
/// once.
pub(crate) struct Resources<B: Backend> {
    pub(crate) stage: Stage,
    /// Last stage completed before the run failed.
    pub(crate) failed_after: Option<Stage>,
    pub(crate) input: Option<B::Input>,
    pub(crate) decoder: Option<B::Decoder>,
    pub(crate) output: Option<B::Output>,
    pub(crate) encoder: Option<B::Encoder>,
    pub(crate) sink: Option<B::Sink>,
    pub(crate) scaler: Option<B::Scaler>,
    pub(crate) decoded_frame: Option<B::Frame>,
    pub(crate) scaled_frame: Option<B::Frame>,
    pub(crate) input_packet: Option<B::Packet>,
    pub(crate) output_packet: Option<B::Packet>,
}

impl<B: Backend> Resources<B> {
    pub(crate) fn new() -> Self {
        Self {
            stage: Stage::Idle,
            failed_after: None,
            input: None,
            decoder: None,
            output: None,
            encoder: None,
            sink: None,
            scaler: None,
            decoded_frame: None,
            scaled_frame: None,
            input_packet: None,
            output_packet: None,
        }
    }

    /// Move to [`Stage::Failed`], remembering the stage that was reached.
    pub(crate) fn fail(&mut self) {
        if self.stage.is_terminal() {
            return;
        }
        self.failed_after = Some(self.stage);
        advance(&mut self.stage, Stage::Failed);
    }

    /// Release everything acquired so far, newest first.
    ///
    /// Emptied slots are skipped, so only the first call releases anything.
    fn release_all(&mut self) {
        match self.failed_after {
            Some(reached) => log::debug!("Tearing down after failure past stage '{reached}'"),
            None => log::debug!("Tearing down after stage '{}'", self.stage),
        }

        release(&mut self.output_packet, "output packet");
        release(&mut self.input_packet, "input packet");
        release(&mut self.scaled_frame, "scaled frame");
        release(&mut self.decoded_frame, "decoded frame");
        release(&mut self.scaler, "scaler");
        release(&mut self.sink, "output sink");
        release(&mut self.encoder, "encoder");
        release(&mut self.output, "output container");
        release(&mut self.decoder, "decoder");
        release(&mut self.input, "input container");
    }
}

impl<B: Backend> Drop for Resources<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn release<T>(slot: &mut Option<T>, name: &str) {
    if let Some(resource) = slot.take() {
        log::debug!("Releasing {name}");
        drop(resource);
    }
}

/// Record entry into `next`.
pub(crate) fn advance(stage: &mut Stage, next: Stage) {
    debug_assert!(next > *stage, "stage went backwards: {stage} -> {next}");
    log::debug!("Stage: {stage} -> {next}");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Opened < Stage::StreamInfoProbed);
        assert!(Stage::HeaderWritten < Stage::Transcoding);
        assert!(Stage::Draining < Stage::Finalized);
    }

    #[test]
    fn output_may_exist_from_encoder_ready() {
        assert!(!Stage::EncoderNegotiated.output_may_exist());
        assert!(Stage::EncoderReady.output_may_exist());
        assert!(Stage::Finalized.output_may_exist());
        assert!(!Stage::Failed.output_may_exist());
    }

    #[test]
    fn failed_is_terminal_and_displays() {
        assert!(Stage::Failed.is_terminal());
        assert!(Stage::Finalized.is_terminal());
        assert!(!Stage::Draining.is_terminal());
        assert_eq!(Stage::Failed.to_string(), "failed");
    }

    #[test]
    fn failing_from_draining_records_the_stage_reached() {
        let mut stage = Stage::Idle;
        for next in [
            Stage::Opened,
            Stage::StreamInfoProbed,
            Stage::VideoStreamLocated,
            Stage::DecoderReady,
            Stage::OutputContainerCreated,
            Stage::EncoderNegotiated,
            Stage::EncoderReady,
            Stage::HeaderWritten,
            Stage::Transcoding,
            Stage::Draining,
        ] {
            advance(&mut stage, next);
        }
        // Any stage short of a terminal one can move to Failed.
        let reached = stage;
        advance(&mut stage, Stage::Failed);
        assert_eq!(reached, Stage::Draining);
        assert_eq!(stage, Stage::Failed);
        assert!(Stage::Failed > Stage::Finalized);
    }

    #[test]
    fn advance_moves_forward() {
        let mut stage = Stage::Idle;
        advance(&mut stage, Stage::Opened);
        assert_eq!(stage, Stage::Opened);
    }
}
