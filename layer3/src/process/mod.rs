use std::fmt::Display;

use crate::process::hybrid::SUBBANDS;
use crate::utils::errors::DecodeError;

/// Frame extraction and the bit reservoir.
///
/// Provides the [`BitReader`](extract::BitReader) for finding sync words and
/// extracting individual [`Frame`](extract::Frame) objects from continuous
/// stream data.
pub mod extract;

/// Per-frame decoding from side information to PCM.
///
/// Provides the [`FrameDecoder`](decode::FrameDecoder) state machine.
pub mod decode;

/// Huffman decoding, requantization and reordering of spectral lines.
pub mod requantize;

/// Mid/side and intensity stereo.
pub mod stereo;

/// IMDCT, windowing and overlap-add.
pub mod hybrid;

/// Polyphase synthesis filter bank.
pub mod synthesis;

/// Stream-level decoding session.
///
/// Provides the [`StreamDecoder`](stream::StreamDecoder) combining extraction,
/// decoding, synthesis, failure accounting and cancellation.
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

/// Receiver of decoded PCM.
///
/// `emit_samples` is called once per channel per synthesis step, channels in
/// ascending order, so stereo output alternates `0, 1, 0, 1, ...`.
pub trait PcmSink {
    /// Called before the first block of each decoded frame.
    fn start_frame(&mut self, _channels: u8) {}

    fn emit_samples(&mut self, channel: u8, samples: &[i16; SUBBANDS]);

    /// Called after the last block of each successfully decoded frame.
    fn end_frame(&mut self) {}
}

/// Sink collecting interleaved samples (`L0, R0, L1, R1, ...`).
#[derive(Debug, Clone, Default)]
pub struct InterleavedBuffer {
    channels: u8,
    pending: [[i16; SUBBANDS]; 2],
    samples: Vec<i16>,
}

impl InterleavedBuffer {
    pub fn new(channels: u8) -> Self {
        Self {
            channels: channels.clamp(1, 2),
            pending: [[0; SUBBANDS]; 2],
            samples: Vec::new(),
        }
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Switches the interleaving for a new logical stream.
    pub fn set_channels(&mut self, channels: u8) {
        self.channels = channels.clamp(1, 2);
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Takes the collected samples, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }
}

impl PcmSink for InterleavedBuffer {
    fn start_frame(&mut self, channels: u8) {
        self.set_channels(channels);
    }

    fn emit_samples(&mut self, channel: u8, samples: &[i16; SUBBANDS]) {
        if self.channels == 1 {
            self.samples.extend_from_slice(samples);
            return;
        }

        let channel = channel.min(1) as usize;
        self.pending[channel] = *samples;
        if channel == 1 {
            let [left, right] = &self.pending;
            for (l, r) in left.iter().zip(right) {
                self.samples.push(*l);
                self.samples.push(*r);
            }
        }
    }
}

/// A recoverable problem met while decoding a frame.
#[derive(Debug)]
pub struct FrameWarning {
    pub level: log::Level,
    pub error: DecodeError,
}

impl Display for FrameWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_stereo_blocks() {
        let mut buffer = InterleavedBuffer::new(2);
        buffer.emit_samples(0, &[1; SUBBANDS]);
        assert!(buffer.samples().is_empty());
        buffer.emit_samples(1, &[-1; SUBBANDS]);

        let samples = buffer.take();
        assert_eq!(samples.len(), 64);
        assert_eq!(&samples[..4], &[1, -1, 1, -1]);
        assert!(buffer.samples().is_empty());

        buffer.set_channels(1);
        buffer.emit_samples(0, &[3; SUBBANDS]);
        assert_eq!(buffer.samples(), &[3; SUBBANDS]);
    }

    #[test]
    fn follows_the_frame_channel_count() {
        let mut buffer = InterleavedBuffer::new(1);
        buffer.start_frame(2);
        buffer.emit_samples(0, &[1; SUBBANDS]);
        buffer.emit_samples(1, &[2; SUBBANDS]);
        assert_eq!(&buffer.take()[..4], &[1, 2, 1, 2]);

        buffer.start_frame(1);
        buffer.emit_samples(0, &[3; SUBBANDS]);
        assert_eq!(buffer.take(), vec![3; SUBBANDS]);
        assert_eq!(buffer.channels(), 1);
    }
}
