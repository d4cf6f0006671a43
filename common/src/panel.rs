use std::collections::HashSet;

use log::info;

use crate::{
    config::ButtonSpec,
    error::PortalError,
    types::{ButtonStyle, Rect, TouchPoint},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub id: u8,
    pub bounds: Rect,
    pub label: String,
    pub style: ButtonStyle,
    pub selected: bool,
}

impl Button {
    pub fn contains(&self, point: TouchPoint) -> bool {
        self.bounds.contains(point)
    }
}

/// Result of applying one touch sample to the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchOutcome {
    pub selected: Option<u8>,
    pub changed: bool,
}

/// Resolves a touch to at most one button id.
///
/// Buttons are scanned in declaration order and a later match overwrites an
/// earlier one, so where boxes overlap the last declared button wins.
pub fn dispatch(touch: Option<TouchPoint>, buttons: &[Button]) -> Option<u8> {
    let point = touch?;
    buttons
        .iter()
        .rev()
        .find(|button| button.contains(point))
        .map(|button| button.id)
}

/// Logical button state. Rendering lives behind [`crate::display::Display`].
#[derive(Debug, Clone)]
pub struct ButtonPanel {
    buttons: Vec<Button>,
    screen: Rect,
}

impl ButtonPanel {
    pub fn new(specs: &[ButtonSpec], screen: Rect) -> Result<Self, PortalError> {
        let mut seen = HashSet::new();
        let mut buttons = Vec::with_capacity(specs.len());

        for spec in specs {
            if !seen.insert(spec.id) {
                return Err(PortalError::Config(format!(
                    "duplicate button id {}",
                    spec.id
                )));
            }
            if spec.bounds.is_empty() {
                return Err(PortalError::Config(format!(
                    "button {} ({}) has an empty hit box",
                    spec.id, spec.label
                )));
            }
            buttons.push(Button {
                id: spec.id,
                bounds: spec.bounds,
                label: spec.label.clone(),
                style: spec.style,
                selected: false,
            });
        }

        Ok(Self { buttons, screen })
    }

    pub fn buttons(&self) -> &[Button] {
        &self.buttons
    }

    pub fn selected(&self) -> Option<u8> {
        self.buttons
            .iter()
            .find(|button| button.selected)
            .map(|button| button.id)
    }

    /// `0` or `1`; unknown ids read as unselected.
    pub fn state(&self, id: u8) -> u8 {
        self.buttons
            .iter()
            .find(|button| button.id == id)
            .map(|button| u8::from(button.selected))
            .unwrap_or(0)
    }

    /// Selecting a button deselects every other one. Returns false for an unknown id.
    pub fn set_selected(&mut self, id: u8, selected: bool) -> bool {
        if !self.buttons.iter().any(|button| button.id == id) {
            return false;
        }

        for button in &mut self.buttons {
            if button.id == id {
                button.selected = selected;
            } else if selected {
                button.selected = false;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        for button in &mut self.buttons {
            button.selected = false;
        }
    }

    /// Off-screen points count as no touch; an absent touch clears the selection.
    pub fn apply_touch(&mut self, touch: Option<TouchPoint>) -> TouchOutcome {
        let previous = self.selected();
        let touch = touch.filter(|point| self.screen.contains(*point));
        let hit = dispatch(touch, &self.buttons);

        match hit {
            Some(id) => {
                self.set_selected(id, true);
                info!("button {id} pressed");
            }
            None => self.clear(),
        }

        TouchOutcome {
            selected: hit,
            changed: previous != hit,
        }
    }
}
