//! Logger setup: colored text or one JSON object per record.

use std::io::Write;

use anyhow::Result;
use env_logger::fmt::Formatter;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use serde::Serialize;

use crate::cli::command::{Cli, LogFormat};

#[derive(Debug, Serialize)]
struct JsonRecord<'a> {
    ts: String,
    level: &'a str,
    /// Module that logged the record, e.g. `layer3::process::stream`.
    target: &'a str,
    msg: String,
}

fn write_json(buf: &mut Formatter, record: &log::Record) -> std::io::Result<()> {
    let line = JsonRecord {
        ts: buf.timestamp_millis().to_string(),
        level: record.level().as_str(),
        target: record.target(),
        msg: record.args().to_string(),
    };
    serde_json::to_writer(&mut *buf, &line)?;
    writeln!(buf)
}

/// Installs the global logger. With progress bars enabled, log lines are
/// routed through `multi` so they do not tear the bars.
pub fn init(cli: &Cli, multi: &MultiProgress) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());
    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(write_json);
        }
    }

    if cli.progress {
        LogWrapper::new(multi.clone(), builder.build()).try_init()?;
    } else {
        builder.try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_records_escape_messages() -> anyhow::Result<()> {
        let record = JsonRecord {
            ts: "2024-01-01T00:00:00.000Z".into(),
            level: log::Level::Warn.as_str(),
            target: "layer3::process::stream",
            msg: "Frame 7: tag \"TAG\"\nskipped".into(),
        };

        let line = serde_json::to_string(&record)?;
        assert!(!line.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&line)?;
        assert_eq!(parsed["level"], "WARN");
        assert_eq!(parsed["target"], "layer3::process::stream");
        assert_eq!(parsed["msg"], "Frame 7: tag \"TAG\"\nskipped");

        Ok(())
    }
}
