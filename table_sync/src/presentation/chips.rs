//! Visual chip movement: bets swept into the pot, the pot paid out.
//!
//! Entries here are transient and never authoritative. The displayed pot
//! counter only changes when an animation reports completion. Every
//! collection and every payout is stamped with a fresh generation, and a
//! completion only counts for the animation carrying that stamp.

use log::{debug, trace};
use std::{collections::VecDeque, fmt};

use crate::{
    net::messages::WinnerEntry,
    scheduler::Generation,
    table::entities::{Chips, HandId, SeatIndex},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChipEndpoint {
    Seat(SeatIndex),
    Pot,
}

impl fmt::Display for ChipEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seat(position) => write!(f, "seat {position}"),
            Self::Pot => write!(f, "pot"),
        }
    }
}

/// One chip movement in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChipAnimation {
    pub source: ChipEndpoint,
    pub destination: ChipEndpoint,
    pub amount: Chips,
    pub generation: Generation,
}

impl fmt::Display for ChipAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${} {} -> {}", self.amount, self.source, self.destination)
    }
}

/// Result of a finished collection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CollectionComplete {
    pub pot: Chips,
    /// First payout, if a distribution was waiting on this collection.
    pub distribution: Option<ChipAnimation>,
}

#[derive(Debug, Default)]
pub struct ChipSettlementOrchestrator {
    generation: Generation,
    hand_id: Option<HandId>,
    pot: Chips,
    collecting: Vec<ChipAnimation>,
    distributing: Option<ChipAnimation>,
    payouts: VecDeque<WinnerEntry>,
    held_distribution: Option<(Chips, Vec<WinnerEntry>)>,
}

impl ChipSettlementOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep every non-zero bet toward the pot. Returns the generation this
    /// collection must be completed under, or `None` if nobody had a bet.
    pub fn begin_collection(&mut self, bets_by_seat: &[(SeatIndex, Chips)]) -> Option<Generation> {
        if !self.collecting.is_empty() {
            debug!("Collection restarted before completing, settling previous bets");
            self.settle_collection();
        }

        let bets: Vec<(SeatIndex, Chips)> = bets_by_seat
            .iter()
            .copied()
            .filter(|(_, amount)| *amount > 0)
            .collect();
        if bets.is_empty() {
            return None;
        }

        let generation = self.generation.bump();
        self.collecting = bets
            .into_iter()
            .map(|(position, amount)| ChipAnimation {
                source: ChipEndpoint::Seat(position),
                destination: ChipEndpoint::Pot,
                amount,
                generation,
            })
            .collect();
        Some(generation)
    }

    /// The collection animation finished: fold the swept bets into the pot
    /// counter. A held distribution starts now.
    pub fn complete_collection_to_pot(
        &mut self,
        generation: Generation,
    ) -> Option<CollectionComplete> {
        if self.collection_generation() != Some(generation) {
            trace!("Ignoring collection completion from generation {}", generation.0);
            return None;
        }

        self.settle_collection();
        let distribution = match self.held_distribution.take() {
            Some((pot_amount, winners)) => self.begin_distribution(pot_amount, &winners),
            None => None,
        };
        Some(CollectionComplete {
            pot: self.pot,
            distribution,
        })
    }

    /// Pay the pot out to `winners`, one at a time. Held until any
    /// collection in progress completes.
    pub fn begin_distribution(
        &mut self,
        pot_amount: Chips,
        winners: &[WinnerEntry],
    ) -> Option<ChipAnimation> {
        if !self.collecting.is_empty() {
            debug!("Holding distribution until collection completes");
            self.held_distribution = Some((pot_amount, winners.to_vec()));
            return None;
        }

        self.pot = pot_amount;
        self.payouts = winners.iter().copied().filter(|w| w.amount > 0).collect();
        self.distributing = None;
        self.next_payout()
    }

    /// The current payout finished. Returns the next one, or `None` once
    /// every winner has been paid and distribution state is cleared.
    pub fn advance_distribution(&mut self, generation: Generation) -> Option<ChipAnimation> {
        let current = self.distributing?;
        if current.generation != generation {
            trace!("Ignoring payout completion from generation {}", generation.0);
            return None;
        }

        self.pot = self.pot.saturating_sub(current.amount);
        self.next_payout()
    }

    /// Drop every transient entry. Completions from before the reset are
    /// ignored from now on.
    pub fn reset(&mut self, hand_id: Option<HandId>) {
        let generation = self.generation.bump();
        *self = Self {
            generation,
            hand_id,
            ..Self::default()
        };
    }

    pub fn hand_id(&self) -> Option<HandId> {
        self.hand_id
    }

    /// Displayed pot counter.
    pub fn pot(&self) -> Chips {
        self.pot
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn collecting(&self) -> &[ChipAnimation] {
        &self.collecting
    }

    fn collection_generation(&self) -> Option<Generation> {
        self.collecting.first().map(|entry| entry.generation)
    }

    pub fn distributing(&self) -> Option<&ChipAnimation> {
        self.distributing.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.collecting.is_empty()
            && self.distributing.is_none()
            && self.held_distribution.is_none()
    }

    fn settle_collection(&mut self) {
        let swept = self
            .collecting
            .drain(..)
            .fold(0, |total: Chips, entry| total.saturating_add(entry.amount));
        self.pot = self.pot.saturating_add(swept);
    }

    fn next_payout(&mut self) -> Option<ChipAnimation> {
        match self.payouts.pop_front() {
            Some(winner) => {
                let animation = ChipAnimation {
                    source: ChipEndpoint::Pot,
                    destination: ChipEndpoint::Seat(winner.position),
                    amount: winner.amount,
                    generation: self.generation.bump(),
                };
                self.distributing = Some(animation);
                Some(animation)
            }
            None => {
                self.distributing = None;
                self.pot = 0;
                None
            }
        }
    }
}
