use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use l3dec_macros::{ToBytes, riff_chunk_id};

use crate::byteorder::WriteBytesLe;

const WAVE_FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Offset of the RIFF size field.
const RIFF_SIZE_OFFSET: u64 = 4;
/// RIFF header (12) + fmt chunk (8 + 16) + data chunk id.
const DATA_SIZE_OFFSET: u64 = 12 + 24 + 4;

pub trait RiffChunk {
    fn chunk_id(&self) -> &[u8; 4];
    fn chunk_data(&self) -> Vec<u8>;

    fn write_all<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let data = self.chunk_data();
        writer.write_all(self.chunk_id())?;
        writer.write_all(&(data.len() as u32).to_le_bytes())?;
        writer.write_all(&data)?;
        if data.len() % 2 == 1 {
            writer.write_all(&[0])?;
        }
        Ok(())
    }
}

#[derive(Debug, ToBytes)]
#[riff_chunk_id(b"fmt ")]
pub struct FormatChunk {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        let block_align = channels * (BITS_PER_SAMPLE / 8);
        Self {
            format_tag: WAVE_FORMAT_PCM,
            channels,
            sample_rate,
            byte_rate: sample_rate * block_align as u32,
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

/// RIFF/WAVE writer for interleaved 16-bit PCM.
///
/// Sizes are written as zero up front and patched by [`finish`](Self::finish),
/// so an interrupted file still carries a usable header.
pub struct WAVWriter<W: Write + Seek> {
    writer: BufWriter<W>,
    format: FormatChunk,
    data_written: u64,
    header_written: bool,
}

impl<W: Write + Seek> WAVWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channels: u16) -> Self {
        Self {
            writer: BufWriter::new(writer),
            format: FormatChunk::pcm16(sample_rate, channels),
            data_written: 0,
            header_written: false,
        }
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        self.writer.write_all(b"RIFF")?;
        self.writer.write_all(&0u32.to_le_bytes())?;
        self.writer.write_all(b"WAVE")?;

        self.format.write_all(&mut self.writer)?;

        self.writer.write_all(b"data")?;
        self.writer.write_all(&0u32.to_le_bytes())?;

        self.header_written = true;
        Ok(())
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        if !self.header_written {
            self.write_header()?;
        }

        let mut bytes = Vec::with_capacity(samples.len() * 2);
        samples.write_le(&mut bytes);
        self.writer.write_all(&bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    /// Patches the RIFF and data sizes. Sizes beyond 4 GiB are clamped.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.header_written {
            self.write_header()?;
        }

        let pad = self.data_written % 2;
        if pad == 1 {
            self.writer.write_all(&[0])?;
        }
        self.writer.flush()?;

        let end = self.writer.stream_position()?;
        let data_size = self.data_written.min(u32::MAX as u64) as u32;
        let riff_size = (DATA_SIZE_OFFSET + 4 - 8 + self.data_written + pad).min(u32::MAX as u64) as u32;

        self.writer.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.writer.write_all(&riff_size.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.writer.write_all(&data_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    #[cfg(test)]
    pub fn into_inner(self) -> io::Result<W> {
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}
