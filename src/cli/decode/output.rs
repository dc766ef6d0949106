use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::super::command::{AudioFormat, Endian};
use crate::byteorder::{WriteBytesBe, WriteBytesLe};
use crate::wav::WAVWriter;

pub fn create_path_with_suffix(base_path: &Path, suffix: &str) -> PathBuf {
    let stem = base_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}.{suffix}");
    if let Some(ext) = base_path.extension() {
        name = format!("{name}.{}", ext.to_string_lossy());
    }
    base_path.with_file_name(name)
}

pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        _ => base_path.with_extension(expected_ext),
    }
}

/// Output file for the `index`-th logical stream. Later streams get a numbered suffix.
pub fn segment_path(base_path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        base_path.to_path_buf()
    } else {
        create_path_with_suffix(base_path, &index.to_string())
    }
}

pub fn is_stdout(path: &Path) -> bool {
    path.as_os_str() == "-"
}

pub enum AudioWriter {
    Pcm {
        writer: BufWriter<Box<dyn Write>>,
        endian: Endian,
    },
    Wav(WAVWriter<File>),
}

impl AudioWriter {
    pub fn create(
        path: &Path,
        format: AudioFormat,
        endian: Endian,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        match format {
            AudioFormat::Pcm => {
                let sink: Box<dyn Write> = if is_stdout(path) {
                    Box::new(io::stdout())
                } else {
                    Box::new(
                        File::create(path)
                            .with_context(|| format!("Failed to create {}", path.display()))?,
                    )
                };
                Ok(AudioWriter::Pcm {
                    writer: BufWriter::new(sink),
                    endian,
                })
            }
            AudioFormat::Wav => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut wav = WAVWriter::new(file, sample_rate, channels);
                wav.write_header()?;
                Ok(AudioWriter::Wav(wav))
            }
        }
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        match self {
            AudioWriter::Pcm { writer, endian } => {
                let mut bytes = Vec::with_capacity(samples.len() * 2);
                match endian {
                    Endian::Little => samples.write_le(&mut bytes),
                    Endian::Big => samples.write_be(&mut bytes),
                }
                writer.write_all(&bytes)?;
            }
            AudioWriter::Wav(wav) => wav.write_samples(samples)?,
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        match self {
            AudioWriter::Pcm { mut writer, .. } => writer.flush()?,
            AudioWriter::Wav(mut wav) => {
                wav.finish()?;
                log::debug!("Wrote {} bytes of PCM data", wav.data_written());
            }
        }
        Ok(())
    }
}
