use std::path::Path;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use layer3::process::extract::BitReader;
use layer3::utils::errors::DecodeError;

use crate::input::InputReader;

/// Counts the frames of a file without decoding them.
pub fn estimate_total_frames(input_path: &Path) -> Result<u64> {
    log::info!("Counting frames for progress estimation");
    let count_start = std::time::Instant::now();

    let mut reader = BitReader::new(InputReader::new(input_path)?);
    let mut frames = 0u64;
    let mut bytes = 0u64;

    loop {
        match reader.next_frame() {
            Ok(frame) => {
                frames += 1;
                bytes += frame.as_ref().len() as u64;
                reader.close_frame();
            }
            Err(DecodeError::StreamExhausted) => break,
            Err(e) => return Err(e.into()),
        }
    }

    let count_elapsed = count_start.elapsed();
    log::info!(
        "Found {frames} frames in {:.3}s ({bytes} bytes of frame data)",
        count_elapsed.as_secs_f64(),
    );

    Ok(frames)
}

pub fn create_progress_bar(
    multi: &MultiProgress,
    total_frames: Option<u64>,
) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_frames {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);

        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
        )?);

        pb
    };
    pb.set_message("initializing decoder");
    Ok(pb)
}
