use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use indicatif::ProgressBar;
use layer3::process::InterleavedBuffer;
use layer3::process::stream::{DecodeStats, DecoderConfig, FrameReport, StreamDecoder};

use crate::input::InputReader;

/// Messages sent from the decoder thread to the writer.
#[derive(Debug)]
pub enum DecodeEvent {
    /// A new logical stream starts; sent before its first samples.
    Format { sample_rate: u32, channels: u16 },
    /// Interleaved samples of one decoded frame.
    Samples(Vec<i16>),
}

pub struct DecoderThreadConfig {
    pub input: InputReader,
    pub config: DecoderConfig,
    pub strict_mode: bool,
    pub frame_limit: Option<u64>,
    pub keep_going: Arc<AtomicBool>,
    pub tx: mpsc::Sender<Result<DecodeEvent>>,
    pub pb_clone: Option<ProgressBar>,
}

fn log_report(report: &FrameReport, frame_index: u64) {
    if report.resynchronized {
        log::warn!(
            "Lost sync before frame {frame_index}: skipped {} bytes",
            report.skipped_bytes
        );
    } else if report.skipped_bytes > 0 {
        log::debug!("Skipped {} leading bytes", report.skipped_bytes);
    }

    if report.format_changed {
        log::info!("Stream format changed at frame {frame_index}: {}", report.header);
    }

    for warning in &report.warnings {
        log::log!(warning.level, "Frame {frame_index}: {warning}");
    }
}

pub fn spawn_decoder_thread(config: DecoderThreadConfig) -> thread::JoinHandle<Result<DecodeStats>> {
    thread::spawn(move || -> Result<DecodeStats> {
        let DecoderThreadConfig {
            input,
            config,
            strict_mode,
            frame_limit,
            keep_going,
            tx,
            pb_clone,
        } = config;

        let mut decoder = StreamDecoder::with_config(input, config);
        // Interleaving follows each frame's channel count
        let mut pcm = InterleavedBuffer::new(2);
        let mut frame_index: u64 = 0;

        loop {
            if !keep_going.load(Ordering::Relaxed) {
                log::debug!("Decoding stopped at frame {frame_index}");
                decoder.stop();
            }

            match decoder.decode_frame(&mut pcm) {
                Ok(Some(report)) => {
                    log_report(&report, frame_index);
                    frame_index += 1;

                    if frame_index == 1 || report.format_changed {
                        let format = DecodeEvent::Format {
                            sample_rate: report.header.sample_rate_hz(),
                            channels: report.header.channel_count() as u16,
                        };
                        if tx.send(Ok(format)).is_err() {
                            keep_going.store(false, Ordering::Relaxed);
                        }
                    }

                    if tx.send(Ok(DecodeEvent::Samples(pcm.take()))).is_err() {
                        keep_going.store(false, Ordering::Relaxed);
                    }

                    if let Some(pb) = &pb_clone {
                        pb.set_position(frame_index);
                    }

                    if frame_limit.is_some_and(|limit| frame_index >= limit) {
                        log::info!("Reached frame limit of {frame_index} frames");
                        keep_going.store(false, Ordering::Relaxed);
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    log::error!("Decode error after frame {frame_index}: {e}");
                    if strict_mode {
                        let _ = tx.send(Err(e.into()));
                        decoder.stop();
                        break;
                    }
                    if let Some(pb) = &pb_clone {
                        pb.set_message("decoding (some frames dropped)");
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.into()));
                    break;
                }
            }
        }

        let stats = decoder.stats();
        log::info!(
            "Processing complete: {} frames decoded, {} dropped, {} samples",
            stats.frames_decoded,
            stats.frames_failed,
            stats.samples_emitted
        );
        Ok(stats)
    })
}
