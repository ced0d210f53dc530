//! Pointer/click hand assignment
//!
//! Recomputed every frame from the frame contents and the two persisted
//! preferences. No state is kept: the same inputs always give the same
//! roles.

use crate::types::{HandCount, HandFrame, HandObservation, Handedness, PrimaryHandPreference};

/// Result of role resolution; both roles may point at the same hand
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandRoles<'a> {
    /// Hand whose finger drives the cursor
    pub pointer: Option<&'a HandObservation>,
    /// Hand whose gesture triggers the click
    pub click: Option<&'a HandObservation>,
}

impl<'a> HandRoles<'a> {
    pub fn none() -> Self {
        Self {
            pointer: None,
            click: None,
        }
    }

    /// Whether pointer and click are played by different hands
    pub fn is_split(&self) -> bool {
        match (self.pointer, self.click) {
            (Some(p), Some(c)) => !std::ptr::eq(p, c),
            _ => false,
        }
    }

    /// Hand to evaluate the fist gesture on
    pub fn fist_hand(&self) -> Option<&'a HandObservation> {
        self.click.or(self.pointer)
    }
}

/// Assign pointer and click roles for one frame
pub fn resolve_roles<'a>(
    frame: &'a HandFrame,
    max_hands: HandCount,
    preference: PrimaryHandPreference,
) -> HandRoles<'a> {
    let hands = &frame.hands;

    if max_hands == HandCount::Two && hands.len() == 2 {
        let left = frame.hand(Handedness::Left);
        let right = frame.hand(Handedness::Right);

        return match preference {
            PrimaryHandPreference::Left => HandRoles {
                pointer: left.or(right),
                click: right.or(left),
            },
            PrimaryHandPreference::Right => HandRoles {
                pointer: right.or(left),
                click: left.or(right),
            },
            PrimaryHandPreference::Auto => HandRoles {
                pointer: hands.first(),
                click: hands.get(1),
            },
        };
    }

    let single = hands.first();
    HandRoles {
        pointer: single,
        click: single,
    }
}
