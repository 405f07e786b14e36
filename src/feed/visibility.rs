//! Visibility gate: sheds the connection while nobody observes the book

use crate::websocket::LinkState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VisibilityState {
    /// No signal observed yet
    #[default]
    Unknown,
    Focused,
    Unfocused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Close,
    Nothing,
}

#[derive(Debug)]
pub struct VisibilityGate {
    state: VisibilityState,
    enabled: bool,
}

impl VisibilityGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: VisibilityState::Unknown,
            enabled,
        }
    }

    pub fn state(&self) -> VisibilityState {
        self.state
    }

    /// Record a visibility signal
    ///
    /// Only losing visibility while connected asks for a close; regaining
    /// it never reconnects.
    pub fn observe(&mut self, visible: bool, link: LinkState) -> GateAction {
        let next = if visible {
            VisibilityState::Focused
        } else {
            VisibilityState::Unfocused
        };
        let lost = next == VisibilityState::Unfocused && self.state != VisibilityState::Unfocused;
        self.state = next;

        if self.enabled && lost && link == LinkState::Connected {
            GateAction::Close
        } else {
            GateAction::Nothing
        }
    }
}
