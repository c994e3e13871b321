//! Keyboard bindings

use super::Command;
use crate::types::{Overlay, PlayerConfig};
use serde::{Deserialize, Serialize};

/// Keys the player reacts to. Anything else arrives as `Char`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Space,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub key: Key,
    #[serde(default)]
    pub shift: bool,
    /// Focus is inside a text field; shortcuts must not fire
    #[serde(default)]
    pub in_text_input: bool,
}

impl KeyInput {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            shift: false,
            in_text_input: false,
        }
    }

    pub fn shifted(key: Key) -> Self {
        Self {
            shift: true,
            ..Self::new(key)
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyBindings {
    seek_step: f64,
    seek_step_large: f64,
    volume_step: f64,
}

impl KeyBindings {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            seek_step: config.seek_step,
            seek_step_large: config.seek_step_large,
            volume_step: config.volume_step,
        }
    }

    pub fn map(&self, input: &KeyInput, volume: f64) -> Option<Command> {
        if input.in_text_input {
            return None;
        }

        let step = if input.shift {
            self.seek_step_large
        } else {
            self.seek_step
        };

        let command = match input.key {
            Key::Space => Command::TogglePlay,
            Key::ArrowLeft => Command::SeekBy(-step),
            Key::ArrowRight => Command::SeekBy(step),
            Key::ArrowUp => Command::SetVolume((volume + self.volume_step).min(1.0)),
            Key::ArrowDown => Command::SetVolume((volume - self.volume_step).max(0.0)),
            Key::Escape => Command::CloseOverlay,
            Key::Char(c) => match c.to_ascii_lowercase() {
                'k' => Command::TogglePlay,
                'f' => Command::ToggleFullscreen,
                'm' => Command::ToggleMute,
                'p' => Command::TogglePictureInPicture,
                's' => Command::ToggleOverlay(Overlay::Settings),
                '?' => Command::ToggleOverlay(Overlay::Shortcuts),
                // Layouts that report the unshifted key
                '/' if input.shift => Command::ToggleOverlay(Overlay::Shortcuts),
                _ => return None,
            },
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> KeyBindings {
        KeyBindings::new(&PlayerConfig::default())
    }

    #[test]
    fn test_core_bindings() {
        let keys = bindings();
        assert_eq!(keys.map(&KeyInput::new(Key::Space), 1.0), Some(Command::TogglePlay));
        assert_eq!(keys.map(&KeyInput::new(Key::Char('K')), 1.0), Some(Command::TogglePlay));
        assert_eq!(keys.map(&KeyInput::new(Key::Char('f')), 1.0), Some(Command::ToggleFullscreen));
        assert_eq!(keys.map(&KeyInput::new(Key::Char('m')), 1.0), Some(Command::ToggleMute));
        assert_eq!(
            keys.map(&KeyInput::new(Key::Char('p')), 1.0),
            Some(Command::TogglePictureInPicture)
        );
        assert_eq!(keys.map(&KeyInput::new(Key::Char('x')), 1.0), None);
    }

    #[test]
    fn test_arrow_seek_steps() {
        let keys = bindings();
        assert_eq!(keys.map(&KeyInput::new(Key::ArrowLeft), 1.0), Some(Command::SeekBy(-5.0)));
        assert_eq!(keys.map(&KeyInput::new(Key::ArrowRight), 1.0), Some(Command::SeekBy(5.0)));
        assert_eq!(keys.map(&KeyInput::shifted(Key::ArrowLeft), 1.0), Some(Command::SeekBy(-10.0)));
        assert_eq!(keys.map(&KeyInput::shifted(Key::ArrowRight), 1.0), Some(Command::SeekBy(10.0)));
    }

    #[test]
    fn test_volume_keys_clamp() {
        let keys = bindings();
        assert_eq!(keys.map(&KeyInput::new(Key::ArrowUp), 0.95), Some(Command::SetVolume(1.0)));
        assert_eq!(keys.map(&KeyInput::new(Key::ArrowDown), 0.05), Some(Command::SetVolume(0.0)));
    }

    #[test]
    fn test_text_input_swallows_shortcuts() {
        let input = KeyInput {
            key: Key::Space,
            shift: false,
            in_text_input: true,
        };
        assert_eq!(bindings().map(&input, 1.0), None);
    }

    #[test]
    fn test_overlay_keys() {
        let keys = bindings();
        assert_eq!(
            keys.map(&KeyInput::new(Key::Char('?')), 1.0),
            Some(Command::ToggleOverlay(Overlay::Shortcuts))
        );
        assert_eq!(
            keys.map(&KeyInput::new(Key::Char('s')), 1.0),
            Some(Command::ToggleOverlay(Overlay::Settings))
        );
        assert_eq!(keys.map(&KeyInput::new(Key::Escape), 1.0), Some(Command::CloseOverlay));
    }
}
