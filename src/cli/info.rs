use std::io::Read;

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use layer3::process::extract::BitReader;
use layer3::structs::header::FrameHeader;
use layer3::utils::errors::DecodeError;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::{samples_to_secs, time_str};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing Layer III stream: {}", args.input.display());

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Analyzing frames...");
            Some(pb)
        }
        None => None,
    };

    let mut input = InputReader::new(&args.input)?;
    if input.is_pipe() {
        log::debug!("Reading stream from stdin");
    }
    let summary = analyze_stream(&mut input, cli.strict, pb.as_ref()).map(|summary| {
        summary.map(|mut summary| {
            summary.input_bytes = input.bytes_read();
            summary
        })
    });

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    match summary? {
        Some(summary) if args.yaml => print!("{}", serde_yaml_ng::to_string(&summary)?),
        Some(summary) => display_summary(&summary),
        None => {
            println!("No Layer III frame found in the input.");
            println!("This doesn't appear to be a valid MPEG audio Layer III stream.");
        }
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StreamSummary {
    pub version: String,
    pub layer: u8,
    pub sample_rate: u32,
    pub channels: usize,
    pub channel_mode: String,
    pub bitrate_kbps: u32,
    pub average_bitrate_kbps: f64,
    pub variable_bitrate: bool,
    pub emphasis: String,
    pub copyright: bool,
    pub original: bool,
    pub crc_protected: bool,
    pub frames: u64,
    pub samples_per_frame: usize,
    pub total_samples: u64,
    pub duration_secs: f64,
    pub duration: String,
    pub frame_bytes: u64,
    pub input_bytes: u64,
    pub leading_bytes_skipped: u64,
    pub resync_bytes_skipped: u64,
    pub format_changes: u64,
}

impl StreamSummary {
    fn new(first: &FrameHeader, leading: usize) -> Self {
        Self {
            version: first.version.to_string(),
            layer: first.layer,
            sample_rate: first.sample_rate_hz(),
            channels: first.channel_count(),
            channel_mode: first.channel_mode.to_string(),
            bitrate_kbps: first.bitrate_kbps(),
            average_bitrate_kbps: 0.0,
            variable_bitrate: false,
            emphasis: first.emphasis.to_string(),
            copyright: first.copyright,
            original: first.original,
            crc_protected: first.protection,
            frames: 0,
            samples_per_frame: first.samples_per_frame(),
            total_samples: 0,
            duration_secs: 0.0,
            duration: String::new(),
            frame_bytes: 0,
            input_bytes: 0,
            leading_bytes_skipped: leading as u64,
            resync_bytes_skipped: 0,
            format_changes: 0,
        }
    }

    fn finalize(&mut self) {
        self.duration_secs = samples_to_secs(self.total_samples, self.sample_rate);
        self.duration = time_str(self.duration_secs);
        if self.duration_secs > 0.0 {
            self.average_bitrate_kbps =
                (self.frame_bytes as f64 * 8.0 / self.duration_secs / 1000.0 * 10.0).round() / 10.0;
        }
    }
}

/// Walks every frame header of `source`. Returns `None` when no frame is found.
///
/// Strict mode fails on the first loss of sync after the first frame.
pub fn analyze_stream<R: Read>(
    source: R,
    strict: bool,
    pb: Option<&ProgressBar>,
) -> Result<Option<StreamSummary>> {
    let mut reader = BitReader::new(source);
    let mut summary: Option<StreamSummary> = None;
    let mut previous: Option<FrameHeader> = None;

    loop {
        let frame = match reader.next_frame() {
            Ok(frame) => frame,
            Err(DecodeError::StreamExhausted) => break,
            Err(e) => return Err(e.into()),
        };
        let header = frame.header;

        let summary = summary.get_or_insert_with(|| StreamSummary::new(&header, frame.skipped));

        if let Some(previous) = previous {
            if frame.skipped > 0 {
                if strict {
                    bail!(
                        "Lost sync after frame {}: skipped {} bytes",
                        summary.frames,
                        frame.skipped
                    );
                }
                log::warn!(
                    "Lost sync after frame {}: skipped {} bytes",
                    summary.frames,
                    frame.skipped
                );
                summary.resync_bytes_skipped += frame.skipped as u64;
            }

            if !previous.is_compatible(&header) {
                log::info!("Stream format changed at frame {}: {header}", summary.frames);
                summary.format_changes += 1;
            }
            if previous.bitrate_index != header.bitrate_index {
                summary.variable_bitrate = true;
            }
        }

        summary.frames += 1;
        summary.total_samples += header.samples_per_frame() as u64;
        summary.frame_bytes += frame.as_ref().len() as u64;
        previous = Some(header);
        reader.close_frame();

        if summary.frames.is_multiple_of(100) {
            if let Some(pb) = pb {
                pb.set_message(format!("Analyzing frames...       {}", summary.frames));
                pb.tick();
            }
        }
    }

    Ok(summary.map(|mut summary| {
        summary.finalize();
        summary
    }))
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

fn display_summary(s: &StreamSummary) {
    println!();
    println!("Layer III Stream Information");
    println!("============================");
    println!();
    println!("Format                      {} Layer {}", s.version, s.layer);
    println!("Sampling frequency          {} Hz", s.sample_rate);
    println!("Channels                    {} ({})", s.channels, s.channel_mode);
    if s.variable_bitrate {
        println!(
            "Bitrate                     variable, {:.1} kbps average",
            s.average_bitrate_kbps
        );
    } else {
        println!("Bitrate                     {} kbps", s.bitrate_kbps);
    }
    println!("Emphasis                    {}", s.emphasis);
    println!("CRC protected               {}", yes_no(s.crc_protected));
    println!("Copyright                   {}", yes_no(s.copyright));
    println!("Original                    {}", yes_no(s.original));
    println!();
    println!("Analysis Summary");
    println!("  Frames processed          {}", s.frames);
    println!("  Samples per frame         {}", s.samples_per_frame);
    println!("  Duration                  {}", s.duration);
    let size_mb = s.input_bytes as f64 / 1_000_000.0;
    println!("  Size                      {size_mb:.2} MB ({} bytes)", s.input_bytes);
    if s.leading_bytes_skipped > 0 {
        println!("  Leading bytes skipped     {}", s.leading_bytes_skipped);
    }
    if s.resync_bytes_skipped > 0 {
        println!("  Bytes skipped on resync   {}", s.resync_bytes_skipped);
    }
    if s.format_changes > 0 {
        println!("  Format changes            {}", s.format_changes);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1, 128 kbps, 44.1 kHz, mono: 417-byte frames.
    const MONO_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];
    /// Same with bitrate index 10 (160 kbps): 522-byte frames.
    const MONO_160_HEADER: [u8; 4] = [0xFF, 0xFB, 0xA0, 0xC4];

    fn frame(header: [u8; 4], len: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len];
        frame[..4].copy_from_slice(&header);
        frame
    }

    #[test]
    fn summarizes_constant_bitrate() -> Result<()> {
        let mut stream = b"ID3 junk".to_vec();
        for _ in 0..10 {
            stream.extend(frame(MONO_HEADER, 417));
        }

        let summary = analyze_stream(&stream[..], false, None)?.expect("frames present");
        assert_eq!(summary.frames, 10);
        assert_eq!(summary.sample_rate, 44100);
        assert_eq!(summary.channels, 1);
        assert_eq!(summary.total_samples, 11520);
        assert_eq!(summary.leading_bytes_skipped, 8);
        assert!(!summary.variable_bitrate);
        assert_eq!(summary.duration, "00:00:00.261");

        let yaml = serde_yaml_ng::to_string(&summary)?;
        assert!(yaml.contains("sample_rate: 44100"));
        Ok(())
    }

    #[test]
    fn detects_variable_bitrate_and_resync() -> Result<()> {
        let mut stream = frame(MONO_HEADER, 417);
        // Sync word intact, bitrate index forbidden
        stream.extend(frame([0xFF, 0xFB, 0xF0, 0xC4], 417));
        stream.extend(frame(MONO_160_HEADER, 522));
        stream.extend(frame(MONO_HEADER, 417));

        let summary = analyze_stream(&stream[..], false, None)?.expect("frames present");
        assert_eq!(summary.frames, 3);
        assert!(summary.variable_bitrate);
        assert_eq!(summary.resync_bytes_skipped, 417);
        assert_eq!(summary.format_changes, 0);

        assert!(analyze_stream(&stream[..], true, None).is_err());
        Ok(())
    }

    #[test]
    fn empty_input_has_no_summary() -> Result<()> {
        assert!(analyze_stream(&[0u8; 64][..], false, None)?.is_none());
        Ok(())
    }
}
