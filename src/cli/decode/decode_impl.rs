use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use layer3::process::stream::{DecodeStats, DecoderConfig};

use super::decoder_thread::{DecodeEvent, DecoderThreadConfig, spawn_decoder_thread};
use super::output::{AudioWriter, create_path_with_extension, is_stdout, segment_path};
use super::progress::{create_progress_bar, estimate_total_frames};
use crate::cli::command::{AudioFormat, Cli, DecodeArgs, Endian};
use crate::input::{InputReader, is_stdin};

/// Writer side of the decode: one output file per logical stream.
struct OutputState {
    base_path: PathBuf,
    format: AudioFormat,
    endian: Endian,
    writer: Option<AudioWriter>,
    segments: usize,
    sample_rate: u32,
    channels: u16,
    samples_written: u64,
}

impl OutputState {
    fn start_segment(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            if is_stdout(&self.base_path) {
                log::warn!(
                    "Format changed to {sample_rate} Hz, {channels} channel(s) mid-stream on stdout"
                );
                self.writer = Some(writer);
                self.sample_rate = sample_rate;
                self.channels = channels;
                return Ok(());
            }
            writer.finish()?;
        }

        let path = segment_path(&self.base_path, self.segments);
        log::info!(
            "Writing {} ({sample_rate} Hz, {channels} channel(s))",
            path.display()
        );

        self.writer = Some(AudioWriter::create(
            &path,
            self.format,
            self.endian,
            sample_rate,
            channels,
        )?);
        self.segments += 1;
        self.sample_rate = sample_rate;
        self.channels = channels;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("Samples received before the stream format");
        };
        writer.write_samples(samples)?;
        self.samples_written += samples.len() as u64 / self.channels.max(1) as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }
}

fn output_base_path(args: &DecodeArgs) -> Result<PathBuf> {
    let ext = args.format.extension();
    match &args.output_path {
        Some(path) if is_stdout(path) => {
            if args.format == AudioFormat::Wav {
                bail!("WAV output needs a seekable file; use --format pcm to write to stdout");
            }
            Ok(path.clone())
        }
        Some(path) => Ok(create_path_with_extension(path, ext)),
        None if is_stdin(&args.input) => {
            bail!("--output-path is required when reading from stdin")
        }
        None => Ok(create_path_with_extension(&args.input, ext)),
    }
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding Layer III stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let base_path = output_base_path(args)?;
    log::info!("Output path: {}", base_path.display());

    if args.format == AudioFormat::Wav && args.endian == Endian::Big {
        log::warn!("WAV output is always little-endian, ignoring --endian big");
    }

    // Estimate total frames if needed
    let is_pipe = is_stdin(&args.input);
    let total_frames = if !is_pipe && multi.is_some() {
        let total = estimate_total_frames(&args.input)?;
        Some(args.frames.map_or(total, |limit| total.min(limit)))
    } else {
        if is_pipe {
            log::debug!("Skipping progress estimation for pipe input");
        }
        args.frames.filter(|_| multi.is_some())
    };

    // Create progress bar
    let pb = if let Some(multi) = multi {
        Some(create_progress_bar(multi, total_frames)?)
    } else {
        None
    };

    let config = DecoderConfig::default()
        .with_max_consecutive_failures(args.max_failures)
        .with_verify_crc(!args.no_crc)
        .strict(cli.strict);
    log::debug!("Decoder configuration: {config:?}");

    let (tx, rx) = mpsc::channel();
    let keep_going = Arc::new(AtomicBool::new(true));

    let decode_thread = spawn_decoder_thread(DecoderThreadConfig {
        input: InputReader::new(&args.input)?,
        config,
        strict_mode: cli.strict,
        frame_limit: args.frames,
        keep_going: Arc::clone(&keep_going),
        tx,
        pb_clone: pb.clone(),
    });

    let mut output = OutputState {
        base_path,
        format: args.format,
        endian: args.endian,
        writer: None,
        segments: 0,
        sample_rate: 0,
        channels: 0,
        samples_written: 0,
    };
    let start_time = std::time::Instant::now();

    while let Ok(result) = rx.recv() {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                keep_going.store(false, Ordering::Relaxed);
                output.finish()?;
                if let Some(pb) = pb {
                    pb.finish_with_message("decode failed");
                }
                return Err(e);
            }
        };

        let written = match event {
            DecodeEvent::Format {
                sample_rate,
                channels,
            } => output.start_segment(sample_rate, channels),
            DecodeEvent::Samples(samples) => output.write(&samples),
        };

        if let Err(e) = written {
            keep_going.store(false, Ordering::Relaxed);
            if let Some(pb) = pb {
                pb.finish_with_message("write failed");
            }
            return Err(e);
        }
    }

    output.finish()?;

    match decode_thread.join() {
        Ok(Ok(stats)) => {
            if stats.frames_decoded == 0 {
                if let Some(pb) = &pb {
                    pb.finish_with_message("no frames decoded");
                }
                bail!("No Layer III frames found in {}", args.input.display());
            }

            finalize_progress_bar(&pb, total_frames, &output, start_time);
            log_summary(&stats, &output);
            log::info!("Decoding completed successfully");
        }
        Ok(Err(e)) => {
            if let Some(pb) = pb {
                pb.finish_with_message("decode failed");
            }
            return Err(e);
        }
        Err(_) => {
            if let Some(pb) = pb {
                pb.finish_with_message("decode thread panicked");
            }
            bail!("Decode thread panicked");
        }
    }

    Ok(())
}

fn log_summary(stats: &DecodeStats, output: &OutputState) {
    log::info!(
        "Frames: {} decoded, {} dropped, {} bytes skipped, {} warnings",
        stats.frames_decoded,
        stats.frames_failed,
        stats.bytes_skipped,
        stats.warnings
    );
    if output.segments > 1 {
        log::info!("Output split into {} files on format changes", output.segments);
    }
}

fn finalize_progress_bar(
    pb: &Option<ProgressBar>,
    total_frames: Option<u64>,
    output: &OutputState,
    start_time: std::time::Instant,
) {
    if let Some(pb) = pb {
        let elapsed = start_time.elapsed();
        let audio_duration_secs =
            crate::timestamp::samples_to_secs(output.samples_written, output.sample_rate);
        let realtime_multiplier = audio_duration_secs / elapsed.as_secs_f64().max(f64::EPSILON);
        let final_time_str = crate::timestamp::time_str(audio_duration_secs);

        if total_frames.is_some() {
            pb.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
        } else {
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        }

        pb.finish_with_message(format!(
            "speed: {realtime_multiplier:.1}x | timestamp: {final_time_str}"
        ));
    }
}
