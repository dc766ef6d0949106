use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::Arc;

use crate::structs::header::{FrameHeader, MAX_MAIN_DATA_BEGIN, SYNC_MASK};
use crate::utils::errors::DecodeError;

const READ_CHUNK: usize = 4096;

/// Sliding byte window over the input stream.
///
/// Locates frame sync words, extracts complete frames and keeps the bit
/// reservoir through which granules reach back into earlier frames' main data.
///
/// Input is pulled from the wrapped source when the window runs dry, or pushed
/// with [`push_bytes`](Self::push_bytes) when the reader is built over
/// [`io::Empty`].
///
/// # Example
///
/// ```rust,no_run
/// use layer3::process::extract::BitReader;
///
/// let mut reader = BitReader::default();
/// reader.push_bytes(&std::fs::read("clip.mp3")?);
///
/// while let Ok(frame) = reader.next_frame() {
///     println!("{} ({} bytes)", frame.header, frame.as_ref().len());
///     reader.close_frame();
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct BitReader<R: Read = io::Empty> {
    source: R,
    buffer: VecDeque<u8>,
    /// Read cursor in bits, relative to the front of `buffer`.
    bit_pos: usize,
    eof: bool,
    reservoir: BitReservoir,
    bytes_skipped: usize,
    /// Header of the last extracted frame.
    last_header: Option<FrameHeader>,
}

impl Default for BitReader<io::Empty> {
    fn default() -> Self {
        Self::new(io::empty())
    }
}

impl<R: Read> BitReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buffer: VecDeque::with_capacity(READ_CHUNK * 2),
            bit_pos: 0,
            eof: false,
            reservoir: BitReservoir::default(),
            bytes_skipped: 0,
            last_header: None,
        }
    }

    /// Appends raw stream bytes to the window.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Number of bytes currently buffered, consumed or not.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes discarded while searching for sync words.
    pub fn bytes_skipped(&self) -> usize {
        self.bytes_skipped
    }

    /// Extracts the next `n` bits (1..=32), most significant bit first.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, DecodeError> {
        debug_assert!((1..=32).contains(&n));

        let start_byte = self.bit_pos >> 3;
        let end_bit = self.bit_pos + n as usize;
        let end_byte = end_bit.div_ceil(8);
        if !self.fill(end_byte)? {
            return Err(DecodeError::StreamExhausted);
        }

        let mut acc = 0u64;
        for &byte in self.buffer.range(start_byte..end_byte) {
            acc = (acc << 8) | byte as u64;
        }
        let shift = end_byte * 8 - end_bit;
        self.bit_pos = end_bit;

        Ok(((acc >> shift) & ((1u64 << n) - 1)) as u32)
    }

    /// Scans forward to the next frame header.
    ///
    /// A candidate is accepted when its header parses and, if the following
    /// header is already reachable, that one starts with a sync word too.
    /// A candidate directly following the previous frame with the same version
    /// and sample rate needs no successor, so trailing tags and damage after a
    /// good frame do not cost that frame. Refuted candidates advance the window
    /// by a single byte so a false sync can never hide a real one. Returns the
    /// number of bytes skipped, or `None` when the input ran out first.
    pub fn find_sync(&mut self) -> Result<Option<usize>, DecodeError> {
        self.discard_consumed();
        let mut skipped = 0;

        loop {
            if !self.fill(4)? {
                return Ok(None);
            }

            if let Ok(header) = FrameHeader::parse(self.peek_u32(0)) {
                let next = header.frame_length_bytes();
                if !self.fill(next + 4)? {
                    // Last frame of the stream: nothing left to confirm against
                    return Ok(Some(skipped));
                }

                if self.peek_u32(next) & SYNC_MASK == SYNC_MASK
                    || (skipped == 0 && self.continues_stream(&header))
                {
                    return Ok(Some(skipped));
                }
            }

            self.buffer.pop_front();
            skipped += 1;
            self.bytes_skipped += 1;
        }
    }

    /// Extracts the next complete frame and loads its main data into the reservoir.
    ///
    /// Fails with [`DecodeError::StreamExhausted`] when no complete frame is
    /// buffered; the window and reservoir are left as they were (apart from
    /// skipped garbage) so the call can be retried after more input arrives.
    pub fn next_frame(&mut self) -> Result<Frame, DecodeError> {
        let skipped = self.find_sync()?.ok_or(DecodeError::StreamExhausted)?;

        let header = FrameHeader::parse(self.peek_u32(0))?;
        let len = header.frame_length_bytes();
        if !self.fill(len)? {
            return Err(DecodeError::StreamExhausted);
        }

        let header = FrameHeader::parse(self.read_bits(32)?)?;
        let data: Arc<[u8]> = self.buffer.range(..len).copied().collect();
        self.bit_pos = len * 8;
        self.last_header = Some(header);

        let main_start = header.side_info_offset() + header.side_info_length_bytes();
        self.reservoir.push_frame(&data[main_start.min(len)..]);

        Ok(Frame {
            header,
            skipped,
            data,
        })
    }

    /// Positions the reservoir `offset_bytes` before the current frame's main data.
    pub fn set_position_relative(&mut self, offset_bytes: usize) -> Result<(), DecodeError> {
        self.reservoir.set_position_relative(offset_bytes)
    }

    /// Main data from the reservoir position to the end of the current frame.
    pub fn main_data(&self) -> &[u8] {
        self.reservoir.main_data()
    }

    /// Releases consumed input and trims the reservoir to the longest reachable look-behind.
    pub fn close_frame(&mut self) {
        self.discard_consumed();
        self.reservoir.trim(MAX_MAIN_DATA_BEGIN);
    }

    /// Drops main data retained from earlier frames, as required after losing sync.
    pub fn reset_reservoir(&mut self) {
        self.reservoir.reset();
    }

    pub fn reservoir(&self) -> &BitReservoir {
        &self.reservoir
    }

    fn continues_stream(&self, header: &FrameHeader) -> bool {
        self.last_header.is_some_and(|last| {
            last.version == header.version
                && last.layer == header.layer
                && last.sample_rate_index == header.sample_rate_index
        })
    }

    fn discard_consumed(&mut self) {
        let consumed = self.bit_pos.div_ceil(8).min(self.buffer.len());
        self.buffer.drain(..consumed);
        self.bit_pos = 0;
    }

    fn peek_u32(&self, offset: usize) -> u32 {
        self.buffer
            .range(offset..offset + 4)
            .fold(0, |acc, &byte| (acc << 8) | byte as u32)
    }

    /// Pulls from the source until `len` bytes are buffered. Returns `false`
    /// when the source ends first.
    fn fill(&mut self, len: usize) -> Result<bool, DecodeError> {
        let mut chunk = [0u8; READ_CHUNK];

        while self.buffer.len() < len {
            if self.eof {
                return Ok(false);
            }

            match self.source.read(&mut chunk) {
                Ok(0) => self.eof = true,
                Ok(n) => self.buffer.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(true)
    }
}

/// Retained main data shared across frames.
///
/// Holds the tail of earlier frames' main data followed by the current
/// frame's. A granule may start up to `main_data_begin` bytes before the
/// current frame's own main data.
#[derive(Debug, Default)]
pub struct BitReservoir {
    bytes: Vec<u8>,
    /// Start of the current frame's main data.
    frame_start: usize,
    /// Start of the main data being decoded.
    read_start: usize,
}

impl BitReservoir {
    fn push_frame(&mut self, main_data: &[u8]) {
        self.frame_start = self.bytes.len();
        self.read_start = self.frame_start;
        self.bytes.extend_from_slice(main_data);
    }

    fn set_position_relative(&mut self, offset_bytes: usize) -> Result<(), DecodeError> {
        if offset_bytes > self.frame_start {
            return Err(DecodeError::ReservoirUnderflow {
                requested: offset_bytes,
                available: self.frame_start,
            });
        }

        self.read_start = self.frame_start - offset_bytes;
        Ok(())
    }

    fn main_data(&self) -> &[u8] {
        &self.bytes[self.read_start..]
    }

    fn trim(&mut self, max_len: usize) {
        let excess = self.bytes.len().saturating_sub(max_len);
        if excess > 0 {
            self.bytes.drain(..excess);
            self.frame_start = self.frame_start.saturating_sub(excess);
            self.read_start = self.read_start.saturating_sub(excess);
        }
    }

    fn reset(&mut self) {
        self.bytes.drain(..self.frame_start);
        self.frame_start = 0;
        self.read_start = 0;
    }

    /// Bytes retained from earlier frames and reachable by `main_data_begin`.
    pub fn retained(&self) -> usize {
        self.frame_start
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A complete frame as it appeared in the stream.
///
/// Frame bytes can be accessed through the [`AsRef<[u8]>`] implementation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    /// Bytes discarded while searching for this frame's sync word.
    pub skipped: usize,
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Frame {
    /// CRC-16 stored after the header of protected frames.
    pub fn crc(&self) -> Option<u16> {
        self.header
            .protection
            .then(|| u16::from_be_bytes([self.data[4], self.data[5]]))
    }

    pub fn side_info(&self) -> &[u8] {
        let start = self.header.side_info_offset();
        &self.data[start..start + self.header.side_info_length_bytes()]
    }

    /// Main data bytes carried by this frame itself.
    pub fn main_data(&self) -> &[u8] {
        let start = self.header.side_info_offset() + self.header.side_info_length_bytes();
        &self.data[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{MONO_HEADER, silent_frame};

    #[test]
    fn read_bits_crosses_bytes() -> anyhow::Result<()> {
        let mut reader = BitReader::default();
        reader.push_bytes(&[0xA5, 0x0F, 0xF0]);

        assert_eq!(reader.read_bits(4)?, 0xA);
        assert_eq!(reader.read_bits(8)?, 0x50);
        assert_eq!(reader.read_bits(12)?, 0xFF0);
        assert!(matches!(reader.read_bits(1), Err(DecodeError::StreamExhausted)));

        Ok(())
    }

    #[test]
    fn truncated_frame_is_retryable() -> anyhow::Result<()> {
        let frame = silent_frame(MONO_HEADER, 0);
        let mut reader = BitReader::default();

        reader.push_bytes(&frame[..frame.len() - 10]);
        assert!(matches!(reader.next_frame(), Err(DecodeError::StreamExhausted)));
        assert!(reader.reservoir().is_empty());
        assert_eq!(reader.buffered(), frame.len() - 10);

        reader.push_bytes(&frame[frame.len() - 10..]);
        let extracted = reader.next_frame()?;
        assert_eq!(extracted.as_ref(), &frame[..]);
        assert_eq!(extracted.skipped, 0);
        assert_eq!(reader.reservoir().len(), extracted.main_data().len());

        reader.close_frame();
        assert_eq!(reader.buffered(), 0);

        Ok(())
    }

    #[test]
    fn skips_garbage_and_false_syncs() -> anyhow::Result<()> {
        let frame = silent_frame(MONO_HEADER, 0);
        let mut stream = vec![0x00, 0x12, 0xFF, 0xFB, 0x90, 0xC4, 0x00];
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&frame);

        let mut reader = BitReader::default();
        reader.push_bytes(&stream);

        // The embedded header at offset 2 is refuted by its missing successor
        let first = reader.next_frame()?;
        assert_eq!(first.skipped, 7);
        reader.close_frame();

        let second = reader.next_frame()?;
        assert_eq!(second.skipped, 0);
        assert_eq!(reader.bytes_skipped(), 7);

        Ok(())
    }

    #[test]
    fn keeps_frame_before_trailing_tag() -> anyhow::Result<()> {
        let frame = silent_frame(MONO_HEADER, 0);
        let mut stream = frame.clone();
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(b"TAG");
        stream.extend_from_slice(&[b' '; 125]);

        let mut reader = BitReader::default();
        reader.push_bytes(&stream);

        for _ in 0..2 {
            assert_eq!(reader.next_frame()?.skipped, 0);
            reader.close_frame();
        }
        assert!(matches!(reader.next_frame(), Err(DecodeError::StreamExhausted)));

        Ok(())
    }

    #[test]
    fn keeps_frame_before_inserted_byte() -> anyhow::Result<()> {
        let frame = silent_frame(MONO_HEADER, 0);
        let mut stream = frame.clone();
        stream.extend_from_slice(&frame);
        stream.push(0x00);
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&frame);

        let mut reader = BitReader::default();
        reader.push_bytes(&stream);

        let skipped: Vec<usize> = (0..4)
            .map(|_| {
                let skipped = reader.next_frame().map(|frame| frame.skipped);
                reader.close_frame();
                skipped
            })
            .collect::<Result<_, _>>()?;
        assert_eq!(skipped, [0, 0, 1, 0]);

        Ok(())
    }

    #[test]
    fn reservoir_look_behind() -> anyhow::Result<()> {
        let frame = silent_frame(MONO_HEADER, 0);
        let mut reader = BitReader::default();
        reader.push_bytes(&frame);
        reader.push_bytes(&frame);

        let first = reader.next_frame()?;
        let main_len = first.main_data().len();
        assert!(matches!(
            reader.set_position_relative(1),
            Err(DecodeError::ReservoirUnderflow {
                requested: 1,
                available: 0
            })
        ));
        reader.close_frame();

        reader.next_frame()?;
        assert_eq!(reader.reservoir().retained(), main_len.min(MAX_MAIN_DATA_BEGIN));
        reader.set_position_relative(100)?;
        assert_eq!(reader.main_data().len(), 100 + main_len);

        reader.close_frame();
        assert!(reader.reservoir().len() <= MAX_MAIN_DATA_BEGIN);

        reader.reset_reservoir();
        assert!(reader.set_position_relative(1).is_err());

        Ok(())
    }

    #[test]
    fn pulls_from_source() -> anyhow::Result<()> {
        let frame = silent_frame(MONO_HEADER, 0);
        let mut stream = frame.clone();
        stream.extend_from_slice(&frame);

        let mut reader = BitReader::new(io::Cursor::new(stream));
        reader.next_frame()?;
        reader.close_frame();
        reader.next_frame()?;
        reader.close_frame();
        assert!(matches!(reader.next_frame(), Err(DecodeError::StreamExhausted)));

        Ok(())
    }
}
