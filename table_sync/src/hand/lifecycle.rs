//! Hand phase tracking, driven only by hands the server sends.

use log::debug;

use crate::table::entities::{Hand, HandId, Phase};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleEvent {
    /// A hand with a new ID arrived. All per-hand presentation state must be
    /// reset.
    HandStarted { hand_id: HandId, phase: Phase },
    PhaseAdvanced {
        hand_id: HandId,
        from: Phase,
        to: Phase,
    },
    /// The server cleared the hand.
    HandCleared { hand_id: HandId },
}

/// Tracks the live hand's ID and phase across snapshots and updates.
///
/// Phases only move forward within a hand and `Complete` is terminal; a
/// different hand ID always starts a fresh instance.
#[derive(Debug, Default)]
pub struct HandLifecycle {
    current: Option<(HandId, Phase)>,
}

impl HandLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the canonical hand against what was seen last.
    pub fn observe(&mut self, hand: Option<&Hand>) -> Option<LifecycleEvent> {
        match (self.current, hand) {
            (None, None) => None,
            (Some((hand_id, _)), None) => {
                self.current = None;
                Some(LifecycleEvent::HandCleared { hand_id })
            }
            (Some((hand_id, phase)), Some(hand)) if hand_id == hand.hand_id => {
                if phase == Phase::Complete || hand.phase <= phase {
                    if hand.phase < phase {
                        debug!(
                            "Hand {hand_id}: ignoring phase {} after {phase}",
                            hand.phase
                        );
                    }
                    return None;
                }
                self.current = Some((hand_id, hand.phase));
                Some(LifecycleEvent::PhaseAdvanced {
                    hand_id,
                    from: phase,
                    to: hand.phase,
                })
            }
            (_, Some(hand)) => {
                self.current = Some((hand.hand_id, hand.phase));
                Some(LifecycleEvent::HandStarted {
                    hand_id: hand.hand_id,
                    phase: hand.phase,
                })
            }
        }
    }

    pub fn hand_id(&self) -> Option<HandId> {
        self.current.map(|(hand_id, _)| hand_id)
    }

    pub fn phase(&self) -> Phase {
        self.current.map(|(_, phase)| phase).unwrap_or_default()
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Complete
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}
