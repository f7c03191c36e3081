//! Keyboard sampling with edge detection for one-shot actions.

use macroquad::prelude::*;
use shared::movement::InputFlags;

/// Reports the frame on which a held key first goes down.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn update(&mut self, down: bool) -> bool {
        let pressed = down && !self.previous;
        self.previous = down;
        pressed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggles {
    pub prediction: bool,
    pub interpolation: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameInput {
    pub flags: InputFlags,
    pub interact: bool,
    pub toggles: Toggles,
}

/// Collects movement keys, the interact key and debug toggles each frame.
#[derive(Debug, Default)]
pub struct InputManager {
    interact: EdgeDetector,
    toggle_prediction: EdgeDetector,
    toggle_interpolation: EdgeDetector,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the keyboard. Supports both WASD and arrow keys.
    pub fn update(&mut self) -> FrameInput {
        let flags = InputFlags::from_keys(
            is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
        );
        let interact = self
            .interact
            .update(is_key_down(KeyCode::E) || is_key_down(KeyCode::Space));

        let toggles = Toggles {
            prediction: self.toggle_prediction.update(is_key_down(KeyCode::Key1)),
            interpolation: self.toggle_interpolation.update(is_key_down(KeyCode::Key2)),
        };

        FrameInput {
            flags,
            interact,
            toggles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_detector_fires_once_per_press() {
        let mut edge = EdgeDetector::default();
        let fired: Vec<bool> = [false, true, true, true, false, true]
            .into_iter()
            .map(|down| edge.update(down))
            .collect();
        assert_eq!(fired, vec![false, true, false, false, false, true]);
    }

    #[test]
    fn test_input_manager_creation() {
        let manager = InputManager::new();
        assert!(!manager.interact.previous);
    }
}
