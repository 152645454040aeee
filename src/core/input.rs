use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lane {
    Left = 0,
    Down = 1,
    Up = 2,
    Right = 3,
}

impl Lane {
    pub const ALL: [Lane; 4] = [Lane::Left, Lane::Down, Lane::Up, Lane::Right];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub fn from_index(index: usize) -> Option<Lane> {
        Self::ALL.get(index).copied()
    }
}

/// Everything the game reacts to, independent of the device it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Lane { lane: Lane, pressed: bool },
    TogglePause,
    Start,
    Back,
}

/// Physical key per lane. Arrow keys always work as a second binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBindings {
    pub lanes: [KeyCode; 4],
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            lanes: [KeyCode::KeyD, KeyCode::KeyF, KeyCode::KeyJ, KeyCode::KeyK],
        }
    }
}

impl KeyBindings {
    #[inline(always)]
    pub fn lane_from_keycode(&self, code: KeyCode) -> Option<Lane> {
        if let Some(i) = self.lanes.iter().position(|&k| k == code) {
            return Lane::from_index(i);
        }
        match code {
            KeyCode::ArrowLeft => Some(Lane::Left),
            KeyCode::ArrowDown => Some(Lane::Down),
            KeyCode::ArrowUp => Some(Lane::Up),
            KeyCode::ArrowRight => Some(Lane::Right),
            _ => None,
        }
    }

    /// Maps a winit key event to an action. Auto-repeat presses are dropped so
    /// holding a key never counts as several hits.
    pub fn action_for(&self, event: &KeyEvent) -> Option<Action> {
        let PhysicalKey::Code(code) = event.physical_key else {
            return None;
        };
        let pressed = event.state == ElementState::Pressed;
        if pressed && event.repeat {
            return None;
        }
        if let Some(lane) = self.lane_from_keycode(code) {
            return Some(Action::Lane { lane, pressed });
        }
        if !pressed {
            return None;
        }
        match code {
            KeyCode::Escape => Some(Action::TogglePause),
            KeyCode::Enter | KeyCode::Space => Some(Action::Start),
            KeyCode::Backspace => Some(Action::Back),
            _ => None,
        }
    }
}

/// Parses a key name from the config file (`D`, `f`, `Semicolon`, `ArrowLeft`).
pub fn keycode_from_name(name: &str) -> Option<KeyCode> {
    let name = name.trim();
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return match c.to_ascii_uppercase() {
            'A' => Some(KeyCode::KeyA),
            'B' => Some(KeyCode::KeyB),
            'C' => Some(KeyCode::KeyC),
            'D' => Some(KeyCode::KeyD),
            'E' => Some(KeyCode::KeyE),
            'F' => Some(KeyCode::KeyF),
            'G' => Some(KeyCode::KeyG),
            'H' => Some(KeyCode::KeyH),
            'I' => Some(KeyCode::KeyI),
            'J' => Some(KeyCode::KeyJ),
            'K' => Some(KeyCode::KeyK),
            'L' => Some(KeyCode::KeyL),
            'M' => Some(KeyCode::KeyM),
            'N' => Some(KeyCode::KeyN),
            'O' => Some(KeyCode::KeyO),
            'P' => Some(KeyCode::KeyP),
            'Q' => Some(KeyCode::KeyQ),
            'R' => Some(KeyCode::KeyR),
            'S' => Some(KeyCode::KeyS),
            'T' => Some(KeyCode::KeyT),
            'U' => Some(KeyCode::KeyU),
            'V' => Some(KeyCode::KeyV),
            'W' => Some(KeyCode::KeyW),
            'X' => Some(KeyCode::KeyX),
            'Y' => Some(KeyCode::KeyY),
            'Z' => Some(KeyCode::KeyZ),
            ';' => Some(KeyCode::Semicolon),
            ',' => Some(KeyCode::Comma),
            '.' => Some(KeyCode::Period),
            '/' => Some(KeyCode::Slash),
            _ => None,
        };
    }
    match name.to_ascii_lowercase().as_str() {
        "semicolon" => Some(KeyCode::Semicolon),
        "comma" => Some(KeyCode::Comma),
        "period" => Some(KeyCode::Period),
        "slash" => Some(KeyCode::Slash),
        "space" => Some(KeyCode::Space),
        "arrowleft" | "left" => Some(KeyCode::ArrowLeft),
        "arrowdown" | "down" => Some(KeyCode::ArrowDown),
        "arrowup" | "up" => Some(KeyCode::ArrowUp),
        "arrowright" | "right" => Some(KeyCode::ArrowRight),
        _ => None,
    }
}

/// Inverse of `keycode_from_name` for the keys it understands.
pub fn keycode_name(code: KeyCode) -> String {
    let debug = format!("{code:?}");
    match debug.strip_prefix("Key") {
        Some(letter) => letter.to_string(),
        None => debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_indices_round_trip() {
        for lane in Lane::ALL {
            assert_eq!(Lane::from_index(lane.index()), Some(lane));
        }
        assert_eq!(Lane::from_index(4), None);
    }

    #[test]
    fn default_bindings_and_arrows() {
        let keys = KeyBindings::default();
        assert_eq!(keys.lane_from_keycode(KeyCode::KeyD), Some(Lane::Left));
        assert_eq!(keys.lane_from_keycode(KeyCode::KeyK), Some(Lane::Right));
        assert_eq!(keys.lane_from_keycode(KeyCode::ArrowUp), Some(Lane::Up));
        assert_eq!(keys.lane_from_keycode(KeyCode::KeyQ), None);
    }

    #[test]
    fn custom_bindings_take_priority() {
        let keys = KeyBindings {
            lanes: [KeyCode::KeyS, KeyCode::KeyD, KeyCode::KeyL, KeyCode::Semicolon],
        };
        assert_eq!(keys.lane_from_keycode(KeyCode::KeyD), Some(Lane::Down));
        assert_eq!(keys.lane_from_keycode(KeyCode::Semicolon), Some(Lane::Right));
    }

    #[test]
    fn key_names_parse() {
        assert_eq!(keycode_from_name("d"), Some(KeyCode::KeyD));
        assert_eq!(keycode_from_name(" K "), Some(KeyCode::KeyK));
        assert_eq!(keycode_from_name(";"), Some(KeyCode::Semicolon));
        assert_eq!(keycode_from_name("ArrowLeft"), Some(KeyCode::ArrowLeft));
        assert_eq!(keycode_from_name("F13"), None);
    }

    #[test]
    fn key_names_print_back() {
        for code in [KeyCode::KeyJ, KeyCode::Semicolon, KeyCode::ArrowDown] {
            assert_eq!(keycode_from_name(&keycode_name(code)), Some(code));
        }
    }
}
