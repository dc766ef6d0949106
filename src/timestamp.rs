pub fn time_str(sec: f64) -> String {
    let ms = sec * 1000f64;
    let hours = (ms / 3600000f64) as u64;
    let minutes = ((ms % 3600000f64) / 60000f64) as u64;
    let seconds = ((ms % 60000f64) / 1000f64) as u64;
    let milliseconds = (ms % 1000f64) as u64;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

/// Duration of `samples` sample frames at `sample_rate` Hz.
pub fn samples_to_secs(samples: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(time_str(0.0), "00:00:00.000");
        assert_eq!(time_str(3723.5), "01:02:03.500");
        assert_eq!(time_str(360000.0), "100:00:00.000");
    }

    #[test]
    fn converts_samples() {
        assert_eq!(samples_to_secs(44100, 44100), 1.0);
        assert_eq!(samples_to_secs(1152, 0), 0.0);
    }
}
