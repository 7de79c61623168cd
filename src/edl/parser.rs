//! EDL file parsing
//!
//! One record per line: `start stop action`. Times are seconds, optionally
//! written as `mm:ss` or `hh:mm:ss`. Action `0` skips the window, `1` mutes
//! it. Blank lines and text after `#` are ignored.

use crate::edl::{EdlAction, EdlRecord};
use crate::utils::error::{AvClockError, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Parse EDL text into validated records
pub fn parse_edl(text: &str) -> Result<Vec<EdlRecord>> {
    let mut records: Vec<EdlRecord> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(AvClockError::edl(
                line_no,
                format!("expected 'start stop action', got {} fields", fields.len()),
            ));
        }

        let start = parse_time(fields[0])
            .ok_or_else(|| AvClockError::edl(line_no, format!("invalid start time '{}'", fields[0])))?;
        let stop = parse_time(fields[1])
            .ok_or_else(|| AvClockError::edl(line_no, format!("invalid stop time '{}'", fields[1])))?;
        let action = match fields[2] {
            "0" => EdlAction::Skip,
            "1" => EdlAction::Mute,
            other => {
                return Err(AvClockError::edl(line_no, format!("unknown action '{}'", other)));
            }
        };

        if stop < start {
            return Err(AvClockError::edl(
                line_no,
                format!("stop {} is before start {}", stop, start),
            ));
        }

        if let Some(last) = records.last() {
            if start < last.stop_sec {
                return Err(AvClockError::edl(
                    line_no,
                    format!("record starting at {} overlaps the previous one ending at {}", start, last.stop_sec),
                ));
            }
        }

        records.push(EdlRecord::new(start, stop, action));
    }

    debug!("Parsed {} EDL records", records.len());
    Ok(records)
}

/// Read and parse an EDL file
pub fn load_edl(path: &Path) -> Result<Vec<EdlRecord>> {
    let text = fs::read_to_string(path)?;
    parse_edl(&text)
}

/// Parse `ss`, `mm:ss` or `hh:mm:ss`, each with an optional fraction
fn parse_time(field: &str) -> Option<f64> {
    let mut seconds = 0.0;
    let parts: Vec<&str> = field.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    for (i, part) in parts.iter().enumerate() {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        // only the last component may carry a fraction
        if i + 1 < parts.len() && value.fract() != 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + value;
    }

    Some(seconds)
}
