//! Output formatting for CLI

use cineteca_core::PlaybackState;
use clap::ValueEnum;
use console::{style, StyledObject};
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

/// Pretty-print any serializable value as JSON
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// `h:mm:ss` / `m:ss` rendering of a position in seconds
pub fn format_position(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

pub fn styled_state(state: &PlaybackState) -> StyledObject<String> {
    let label = state.to_string();
    match state {
        PlaybackState::Playing => style(label).green().bold(),
        PlaybackState::Paused | PlaybackState::Ready => style(label).cyan(),
        PlaybackState::Loading | PlaybackState::Buffering => style(label).yellow(),
        PlaybackState::Error(_) => style(label).red().bold(),
        PlaybackState::Idle => style(label).dim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0.0), "0:00");
        assert_eq!(format_position(65.4), "1:05");
        assert_eq!(format_position(3725.0), "1:02:05");
        assert_eq!(format_position(-3.0), "0:00");
    }
}
