//! Order and pacing of the hole-card deal.

use log::{debug, trace};
use std::fmt;

use crate::{
    config::{PresentationConfig, millis},
    scheduler::{Generation, Millis, Scheduler},
    table::entities::SeatIndex,
};

/// Hole cards each seat receives.
pub const CARDS_PER_SEAT: usize = 2;

/// One dealt card: which seat, and which of its hole-card slots.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct DealEntry {
    pub seat_position: SeatIndex,
    pub card_slot_index: usize,
}

impl From<(SeatIndex, usize)> for DealEntry {
    fn from((seat_position, card_slot_index): (SeatIndex, usize)) -> Self {
        Self {
            seat_position,
            card_slot_index,
        }
    }
}

/// Deal order for a hand: starting at the small blind (or the lowest active
/// seat if the small blind is unknown or not active), one card to every seat,
/// then a second pass.
pub fn compute_sequence(
    active_seat_positions: &[SeatIndex],
    small_blind_position: Option<SeatIndex>,
) -> Vec<DealEntry> {
    let mut seats = active_seat_positions.to_vec();
    seats.sort_unstable();
    seats.dedup();

    let start = small_blind_position
        .and_then(|sb| seats.iter().position(|&seat| seat == sb))
        .unwrap_or(0);
    seats.rotate_left(start);

    (0..CARDS_PER_SEAT)
        .flat_map(|slot| seats.iter().map(move |&seat| DealEntry::from((seat, slot))))
        .collect()
}

pub type CardCallback = Box<dyn FnMut(DealEntry) + Send>;
pub type CompleteCallback = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DealStep {
    Card(usize),
    Settle,
}

struct Playback {
    generation: Generation,
    sequence: Vec<DealEntry>,
    dealt: usize,
    on_each_card: CardCallback,
    on_complete: Option<CompleteCallback>,
}

/// Plays deal sequences back one card at a time.
///
/// Each `play` supersedes the previous one. Steps of a superseded sequence
/// may still come due but carry a stale generation and do nothing.
pub struct DealingSequencer {
    config: PresentationConfig,
    generation: Generation,
    timers: Scheduler<(Generation, DealStep)>,
    playback: Option<Playback>,
}

impl DealingSequencer {
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            config,
            generation: Generation::default(),
            timers: Scheduler::new(),
            playback: None,
        }
    }

    /// Start dealing `sequence`. The first card is due immediately, the rest
    /// one deal interval apart; `on_complete` runs once after the settle
    /// delay that follows the last card.
    pub fn play<F, G>(
        &mut self,
        now: Millis,
        sequence: Vec<DealEntry>,
        on_each_card: F,
        on_complete: G,
    ) -> Generation
    where
        F: FnMut(DealEntry) + Send + 'static,
        G: FnOnce() + Send + 'static,
    {
        let generation = self.generation.bump();
        if self.playback.is_some() {
            debug!("Deal superseded by generation {}", generation.0);
        }

        let first = if sequence.is_empty() {
            (millis(self.config.deal_settle_delay), DealStep::Settle)
        } else {
            (0, DealStep::Card(0))
        };
        self.playback = Some(Playback {
            generation,
            sequence,
            dealt: 0,
            on_each_card: Box::new(on_each_card),
            on_complete: Some(Box::new(on_complete)),
        });
        self.timers.schedule(now, first.0, (generation, first.1));
        generation
    }

    /// Run every step due at `now`.
    pub fn on_timer(&mut self, now: Millis) {
        while let Some((_, (generation, step))) = self.timers.pop_due(now) {
            self.step(now, generation, step);
        }
    }

    /// Abandon the current sequence without completing it.
    pub fn cancel(&mut self) {
        self.generation.bump();
        self.timers.clear();
        self.playback = None;
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_some()
    }

    /// Cards dealt so far in the current sequence.
    pub fn dealt(&self) -> usize {
        self.playback.as_ref().map_or(0, |playback| playback.dealt)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    fn step(&mut self, now: Millis, generation: Generation, step: DealStep) {
        let Some(playback) = self.playback.as_mut() else {
            trace!("Deal step with nothing playing");
            return;
        };
        if generation != self.generation || generation != playback.generation {
            trace!("Discarding deal step from generation {}", generation.0);
            return;
        }

        match step {
            DealStep::Card(index) => {
                let Some(&entry) = playback.sequence.get(index) else {
                    return;
                };
                (playback.on_each_card)(entry);
                playback.dealt = index + 1;

                let next = if index + 1 < playback.sequence.len() {
                    (millis(self.config.deal_interval), DealStep::Card(index + 1))
                } else {
                    (millis(self.config.deal_settle_delay), DealStep::Settle)
                };
                self.timers.schedule(now, next.0, (generation, next.1));
            }
            DealStep::Settle => {
                if let Some(mut playback) = self.playback.take()
                    && let Some(on_complete) = playback.on_complete.take()
                {
                    on_complete();
                }
            }
        }
    }
}

impl fmt::Debug for DealingSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DealingSequencer")
            .field("generation", &self.generation)
            .field("playing", &self.is_playing())
            .field("dealt", &self.dealt())
            .finish()
    }
}
