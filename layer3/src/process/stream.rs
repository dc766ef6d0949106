use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use log::Level;

use crate::process::decode::FrameDecoder;
use crate::process::extract::BitReader;
use crate::process::synthesis::{DEFAULT_OUTPUT_SCALE, SynthesisFilterBank};
use crate::process::{FrameWarning, PcmSink};
use crate::structs::header::FrameHeader;
use crate::utils::errors::DecodeError;

/// Consecutive frame failures tolerated before a stream is abandoned.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 1000;

/// Session-wide decoding options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderConfig {
    /// Multiplier applied to synthesized samples before clipping to 16 bits.
    pub output_scale: f64,
    /// Failures in a row that turn into [`DecodeError::UnrecoverableStream`].
    pub max_consecutive_failures: usize,
    /// Verify the CRC-16 of protected frames.
    pub verify_crc: bool,
    /// Warnings at or above this level fail their frame.
    pub fail_level: Level,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            output_scale: DEFAULT_OUTPUT_SCALE,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            verify_crc: true,
            fail_level: Level::Error,
        }
    }
}

impl DecoderConfig {
    pub fn with_output_scale(mut self, scale: f64) -> Self {
        self.output_scale = scale;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: usize) -> Self {
        self.max_consecutive_failures = max.max(1);
        self
    }

    pub fn with_verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Strict decoding fails a frame on any warning.
    pub fn strict(mut self, strict: bool) -> Self {
        self.fail_level = if strict { Level::Warn } else { Level::Error };
        self
    }
}

/// Outcome of one successfully decoded frame.
#[derive(Debug)]
pub struct FrameReport {
    pub header: FrameHeader,
    /// Bytes discarded before this frame's sync word.
    pub skipped_bytes: usize,
    pub warnings: Vec<FrameWarning>,
    /// Sample rate or channel count differs from the previous frame.
    pub format_changed: bool,
    /// Sync was lost before this frame; history was cleared.
    pub resynchronized: bool,
}

/// Running totals of a decoding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames_decoded: u64,
    pub frames_failed: u64,
    pub bytes_skipped: u64,
    /// Samples emitted per channel.
    pub samples_emitted: u64,
    pub warnings: u64,
}

/// A decoding session over one input stream.
///
/// Composes the [`BitReader`], the [`FrameDecoder`] and one
/// [`SynthesisFilterBank`] per channel, and owns every piece of per-stream
/// state. Sessions share nothing mutable and may run on separate threads.
///
/// # Example
///
/// ```rust,no_run
/// use layer3::process::InterleavedBuffer;
/// use layer3::process::stream::StreamDecoder;
///
/// let file = std::fs::File::open("clip.mp3")?;
/// let mut decoder = StreamDecoder::new(std::io::BufReader::new(file));
/// let mut pcm = InterleavedBuffer::new(2);
///
/// loop {
///     match decoder.decode_frame(&mut pcm) {
///         Ok(Some(report)) => println!("{}: {} samples", report.header, pcm.take().len()),
///         Ok(None) => break,
///         Err(e) if e.is_recoverable() => eprintln!("frame dropped: {e}"),
///         Err(e) => return Err(e.into()),
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct StreamDecoder<R: Read = io::Empty> {
    reader: BitReader<R>,
    decoder: FrameDecoder,
    banks: Vec<SynthesisFilterBank>,
    config: DecoderConfig,
    /// Header of the last decoded frame.
    format: Option<FrameHeader>,
    consecutive_failures: usize,
    stats: DecodeStats,
    stopped: bool,
}

impl Default for StreamDecoder<io::Empty> {
    fn default() -> Self {
        Self::new(io::empty())
    }
}

impl StreamDecoder<io::Empty> {
    /// Appends input in push mode.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.reader.push_bytes(data);
    }
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, DecoderConfig::default())
    }

    pub fn with_config(source: R, config: DecoderConfig) -> Self {
        Self {
            reader: BitReader::new(source),
            decoder: FrameDecoder::new(config.fail_level, config.verify_crc),
            banks: Vec::new(),
            config,
            format: None,
            consecutive_failures: 0,
            stats: DecodeStats::default(),
            stopped: false,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Header of the most recently decoded frame.
    pub fn format(&self) -> Option<&FrameHeader> {
        self.format.as_ref()
    }

    /// Stops the session for good; later calls decode nothing.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn reset_history(&mut self, channels: usize) {
        self.decoder.reset();
        self.banks = (0..channels as u8)
            .map(|ch| SynthesisFilterBank::new(ch, self.config.output_scale))
            .collect();
    }

    /// Decodes the next frame into `sink`.
    ///
    /// Returns `Ok(None)` at the end of the input (or once stopped).
    /// Recoverable errors discard one frame and leave the session usable;
    /// after `max_consecutive_failures` of them in a row the session fails
    /// with [`DecodeError::UnrecoverableStream`] and stops.
    pub fn decode_frame<S: PcmSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<Option<FrameReport>, DecodeError> {
        if self.stopped {
            return Ok(None);
        }

        let frame = match self.reader.next_frame() {
            Ok(frame) => frame,
            Err(DecodeError::StreamExhausted) => return Ok(None),
            Err(e) => {
                self.stopped = true;
                return Err(e);
            }
        };
        let header = frame.header;
        self.stats.bytes_skipped += frame.skipped as u64;

        let resynchronized = frame.skipped > 0 && self.format.is_some();
        let format_changed = self
            .format
            .is_some_and(|previous| !previous.is_compatible(&header));

        if resynchronized || format_changed {
            self.reader.reset_reservoir();
        }
        if resynchronized || format_changed || self.banks.len() != header.channel_count() {
            self.reset_history(header.channel_count());
        }

        let result = self
            .decoder
            .decode_frame(&mut self.reader, &frame, &mut self.banks, sink);
        self.reader.close_frame();

        match result {
            Ok(warnings) => {
                self.consecutive_failures = 0;
                self.format = Some(header);

                self.stats.frames_decoded += 1;
                self.stats.samples_emitted += header.samples_per_frame() as u64;
                self.stats.warnings += warnings.len() as u64;
                sink.end_frame();

                Ok(Some(FrameReport {
                    header,
                    skipped_bytes: frame.skipped,
                    warnings,
                    format_changed,
                    resynchronized,
                }))
            }
            Err(e) => {
                self.stats.frames_failed += 1;
                self.consecutive_failures += 1;
                // The overlap may hold part of the discarded frame
                self.decoder.reset();

                if self.consecutive_failures >= self.config.max_consecutive_failures {
                    self.stopped = true;
                    return Err(DecodeError::UnrecoverableStream(self.consecutive_failures));
                }
                Err(e)
            }
        }
    }

    /// Decodes until the input ends, a fatal error occurs or `keep_going`
    /// is cleared. The flag is checked before every frame.
    ///
    /// Recoverable frame errors are skipped; use
    /// [`decode_frame`](Self::decode_frame) to observe them.
    pub fn run<S: PcmSink + ?Sized>(
        &mut self,
        sink: &mut S,
        keep_going: &AtomicBool,
    ) -> Result<DecodeStats, DecodeError> {
        loop {
            if !keep_going.load(Ordering::Relaxed) {
                self.stop();
            }

            match self.decode_frame(sink) {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(self.stats),
                Err(e) if e.is_recoverable() => {}
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::InterleavedBuffer;
    use crate::process::testing::*;
    use crate::structs::side_info::BlockType;

    /// A frame whose side information is self-contradictory.
    fn broken_frame() -> Vec<u8> {
        let mut gr = short_granule(0, 0, false);
        gr.block_type = BlockType::Normal;
        FrameBuilder::new(MONO_HEADER).granule(0, 0, gr, &[], &[]).build()
    }

    fn tone_frame(header: u32, seed: i32) -> Vec<u8> {
        FrameBuilder::new(header)
            .granule(0, 0, long_granule(0, 0, 180), &[], &tone_values(seed))
            .granule(1, 0, long_granule(0, 0, 180), &[], &tone_values(seed + 1))
            .build()
    }

    #[test]
    fn decodes_until_exhausted() -> anyhow::Result<()> {
        let mut decoder = StreamDecoder::default();
        for _ in 0..3 {
            decoder.push_bytes(&silent_frame(MONO_HEADER, 0));
        }

        let mut sink = InterleavedBuffer::new(1);
        let stats = decoder.run(&mut sink, &AtomicBool::new(true))?;

        assert_eq!(stats.frames_decoded, 3);
        assert_eq!(stats.samples_emitted, 3 * 1152);
        assert_eq!(sink.samples().len(), 3 * 1152);
        assert!(sink.samples().iter().all(|&s| s == 0));
        assert!(decoder.decode_frame(&mut sink)?.is_none());

        Ok(())
    }

    #[test]
    fn resyncs_after_corruption() -> anyhow::Result<()> {
        let mut stream = tone_frame(MONO_HEADER, 0);
        // Keep the sync word but make the bitrate forbidden
        let mut damaged = tone_frame(MONO_HEADER, 1);
        damaged[2] |= 0xF0;
        stream.extend(damaged);
        stream.extend(tone_frame(MONO_HEADER, 2));

        let mut decoder = StreamDecoder::default();
        decoder.push_bytes(&stream);
        let mut sink = InterleavedBuffer::new(1);

        let first = decoder.decode_frame(&mut sink)?.expect("first frame");
        assert!(!first.resynchronized);

        let second = decoder.decode_frame(&mut sink)?.expect("third frame");
        assert!(second.resynchronized);
        assert_eq!(second.skipped_bytes, 417);
        assert!(decoder.decode_frame(&mut sink)?.is_none());

        // After resync the third frame decodes exactly as it would alone
        let mut alone = StreamDecoder::default();
        alone.push_bytes(&tone_frame(MONO_HEADER, 2));
        let mut expected = InterleavedBuffer::new(1);
        alone.decode_frame(&mut expected)?;
        assert_eq!(&sink.samples()[1152..], expected.samples());

        Ok(())
    }

    #[test]
    fn overlap_continues_across_frames() -> anyhow::Result<()> {
        let mut decoder = StreamDecoder::default();
        decoder.push_bytes(&tone_frame(MONO_HEADER, 0));
        decoder.push_bytes(&silent_frame(MONO_HEADER, 0));

        let mut sink = InterleavedBuffer::new(1);
        decoder.run(&mut sink, &AtomicBool::new(true))?;

        // The silent frame still carries the tail of the tone
        assert!(sink.samples()[1152..].iter().any(|&s| s != 0));

        Ok(())
    }

    #[test]
    fn failure_bound_abandons_stream() -> anyhow::Result<()> {
        let mut decoder = StreamDecoder::with_config(
            io::empty(),
            DecoderConfig::default().with_max_consecutive_failures(3),
        );
        for _ in 0..5 {
            decoder.push_bytes(&broken_frame());
        }

        let mut sink = InterleavedBuffer::new(1);
        assert!(matches!(
            decoder.decode_frame(&mut sink),
            Err(DecodeError::InvalidSideInfo(_))
        ));
        assert!(decoder.decode_frame(&mut sink).is_err());
        assert!(matches!(
            decoder.decode_frame(&mut sink),
            Err(DecodeError::UnrecoverableStream(3))
        ));
        assert!(decoder.is_stopped());
        assert!(decoder.decode_frame(&mut sink)?.is_none());
        assert_eq!(decoder.stats().frames_failed, 3);

        Ok(())
    }

    #[test]
    fn success_resets_failure_count() -> anyhow::Result<()> {
        let mut decoder = StreamDecoder::with_config(
            io::empty(),
            DecoderConfig::default().with_max_consecutive_failures(2),
        );
        decoder.push_bytes(&broken_frame());
        decoder.push_bytes(&silent_frame(MONO_HEADER, 0));
        decoder.push_bytes(&broken_frame());

        let mut sink = InterleavedBuffer::new(1);
        let stats = decoder.run(&mut sink, &AtomicBool::new(true))?;
        assert_eq!(stats.frames_failed, 2);
        assert_eq!(stats.frames_decoded, 1);

        Ok(())
    }

    #[test]
    fn cancellation_stops_between_frames() -> anyhow::Result<()> {
        let mut decoder = StreamDecoder::default();
        decoder.push_bytes(&silent_frame(MONO_HEADER, 0));

        let mut sink = InterleavedBuffer::new(1);
        let stats = decoder.run(&mut sink, &AtomicBool::new(false))?;
        assert_eq!(stats.frames_decoded, 0);
        assert!(decoder.is_stopped());

        // A stopped session is not resumable
        decoder.push_bytes(&silent_frame(MONO_HEADER, 0));
        assert!(decoder.run(&mut sink, &AtomicBool::new(true))?.frames_decoded == 0);

        Ok(())
    }

    #[test]
    fn format_change_is_reported() -> anyhow::Result<()> {
        let mut decoder = StreamDecoder::default();
        decoder.push_bytes(&silent_frame(MONO_HEADER, 0));
        decoder.push_bytes(&silent_frame(STEREO_HEADER, 0));
        decoder.push_bytes(&silent_frame(STEREO_HEADER, 0));

        let mut sink = InterleavedBuffer::new(1);
        let first = decoder.decode_frame(&mut sink)?.expect("mono frame");
        assert!(!first.format_changed);

        let second = decoder.decode_frame(&mut sink)?.expect("stereo frame");
        assert!(second.format_changed);
        assert_eq!(second.header.channel_count(), 2);
        assert_eq!(sink.channels(), 2);
        assert_eq!(sink.samples().len(), 1152 + 2 * 1152);

        Ok(())
    }
}
