//! Local presentation of a showdown.
//!
//! The presenter walks `intro → revealing → winner_announced → settling →
//! complete` on its own timers while a countdown to the next hand ticks once
//! per second. None of it is authoritative: a new hand tears it down at any
//! point, and nothing belonging to a torn-down showdown runs afterwards.

use log::{debug, trace};
use std::collections::BTreeSet;
use std::fmt;

use crate::{
    config::{PresentationConfig, millis},
    net::messages::{Reveal, ShowdownResult, WinnerEntry},
    scheduler::{Generation, Millis, Scheduler},
    table::entities::{Card, HandId, SeatIndex},
};

const COUNTDOWN_TICK: Millis = 1000;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ShowdownPhase {
    #[default]
    Idle,
    Intro,
    Revealing,
    WinnerAnnounced,
    Settling,
    Complete,
}

impl fmt::Display for ShowdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Idle => "idle",
            Self::Intro => "intro",
            Self::Revealing => "revealing",
            Self::WinnerAnnounced => "winner announced",
            Self::Settling => "settling",
            Self::Complete => "complete",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShowdownEvent {
    PhaseChanged {
        hand_id: HandId,
        phase: ShowdownPhase,
    },
    SeatRevealed {
        hand_id: HandId,
        position: SeatIndex,
        cards: Vec<Card>,
        description: Option<String>,
    },
    WinnersAnnounced {
        hand_id: HandId,
        winners: Vec<WinnerEntry>,
    },
    /// Whole seconds until the next hand.
    Countdown { hand_id: HandId, remaining: u64 },
    /// The countdown reached zero. Emitted at most once per showdown.
    Completed { hand_id: HandId },
}

pub type ShowdownListener = Box<dyn FnMut(ShowdownEvent) + Send>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ShowdownTimer {
    Reveal(usize),
    Announce,
    Settle,
    Finish,
    Tick,
}

struct ActiveShowdown {
    hand_id: HandId,
    phase: ShowdownPhase,
    reveals: Vec<Reveal>,
    winners: Vec<WinnerEntry>,
    revealed: BTreeSet<SeatIndex>,
    countdown: u64,
    completed: bool,
    listener: ShowdownListener,
}

pub struct ShowdownPresenter {
    config: PresentationConfig,
    generation: Generation,
    timers: Scheduler<(Generation, ShowdownTimer)>,
    active: Option<ActiveShowdown>,
}

impl ShowdownPresenter {
    pub fn new(config: PresentationConfig) -> Self {
        Self {
            config,
            generation: Generation::default(),
            timers: Scheduler::new(),
            active: None,
        }
    }

    /// Start presenting `result`. A repeat of the showdown already being
    /// presented is ignored; any other showdown in progress is torn down.
    pub fn begin<F>(&mut self, now: Millis, result: &ShowdownResult, listener: F) -> Generation
    where
        F: FnMut(ShowdownEvent) + Send + 'static,
    {
        if self.hand_id() == Some(result.hand_id) {
            debug!("Showdown for hand {} already presented", result.hand_id);
            return self.generation;
        }

        let generation = self.generation.bump();
        let countdown = result.next_hand_delay.div_ceil(COUNTDOWN_TICK);
        self.active = Some(ActiveShowdown {
            hand_id: result.hand_id,
            phase: ShowdownPhase::Idle,
            reveals: result.reveals.clone(),
            winners: result.winners.clone(),
            revealed: BTreeSet::new(),
            countdown,
            completed: false,
            listener: Box::new(listener),
        });

        self.set_phase(ShowdownPhase::Intro);
        self.emit(ShowdownEvent::Countdown {
            hand_id: result.hand_id,
            remaining: countdown,
        });
        if countdown == 0 {
            self.complete();
            return generation;
        }

        self.schedule(now, COUNTDOWN_TICK, ShowdownTimer::Tick);
        let first = if result.reveals.is_empty() {
            ShowdownTimer::Announce
        } else {
            ShowdownTimer::Reveal(0)
        };
        self.schedule(now, millis(self.config.showdown_intro), first);
        generation
    }

    /// Fire every step due at `now`.
    pub fn on_timer(&mut self, now: Millis) {
        while let Some((_, (generation, timer))) = self.timers.pop_due(now) {
            if generation != self.generation || self.active.is_none() {
                trace!("Discarding showdown step from generation {}", generation.0);
                continue;
            }
            self.step(now, timer);
        }
    }

    /// Tear down the current showdown because a new hand started.
    pub fn reset(&mut self) {
        self.generation.bump();
        self.timers.clear();
        if let Some(active) = self.active.take() {
            debug!("Showdown for hand {} torn down", active.hand_id);
        }
    }

    /// Tear down the current showdown at the user's request.
    pub fn dismiss(&mut self) {
        self.reset();
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn hand_id(&self) -> Option<HandId> {
        self.active.as_ref().map(|active| active.hand_id)
    }

    pub fn phase(&self) -> ShowdownPhase {
        self.active
            .as_ref()
            .map(|active| active.phase)
            .unwrap_or_default()
    }

    pub fn revealed_seats(&self) -> Vec<SeatIndex> {
        self.active
            .as_ref()
            .map(|active| active.revealed.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn countdown_remaining(&self) -> Option<u64> {
        self.active.as_ref().map(|active| active.countdown)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    fn step(&mut self, now: Millis, timer: ShowdownTimer) {
        match timer {
            ShowdownTimer::Tick => {
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                active.countdown = active.countdown.saturating_sub(1);
                let event = ShowdownEvent::Countdown {
                    hand_id: active.hand_id,
                    remaining: active.countdown,
                };
                let done = active.countdown == 0;
                self.emit(event);
                if done {
                    self.complete();
                } else {
                    self.schedule(now, COUNTDOWN_TICK, ShowdownTimer::Tick);
                }
            }
            ShowdownTimer::Reveal(index) => {
                self.set_phase(ShowdownPhase::Revealing);
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                let Some(reveal) = active.reveals.get(index).cloned() else {
                    return;
                };
                active.revealed.insert(reveal.position);
                let next = if index + 1 < active.reveals.len() {
                    ShowdownTimer::Reveal(index + 1)
                } else {
                    ShowdownTimer::Announce
                };
                let event = ShowdownEvent::SeatRevealed {
                    hand_id: active.hand_id,
                    position: reveal.position,
                    cards: reveal.cards,
                    description: reveal.description,
                };
                self.emit(event);
                self.schedule(now, millis(self.config.showdown_reveal_step), next);
            }
            ShowdownTimer::Announce => {
                self.set_phase(ShowdownPhase::WinnerAnnounced);
                if let Some(active) = self.active.as_ref() {
                    let event = ShowdownEvent::WinnersAnnounced {
                        hand_id: active.hand_id,
                        winners: active.winners.clone(),
                    };
                    self.emit(event);
                }
                let delay = millis(self.config.showdown_winner_announce);
                self.schedule(now, delay, ShowdownTimer::Settle);
            }
            ShowdownTimer::Settle => {
                self.set_phase(ShowdownPhase::Settling);
                let delay = millis(self.config.showdown_settle);
                self.schedule(now, delay, ShowdownTimer::Finish);
            }
            ShowdownTimer::Finish => self.set_phase(ShowdownPhase::Complete),
        }
    }

    /// Countdown reached zero: jump to `Complete`, report it once, and stop
    /// every remaining step.
    fn complete(&mut self) {
        self.set_phase(ShowdownPhase::Complete);
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.completed {
            return;
        }
        active.completed = true;
        let hand_id = active.hand_id;
        self.generation.bump();
        self.emit(ShowdownEvent::Completed { hand_id });
    }

    fn set_phase(&mut self, phase: ShowdownPhase) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.phase == phase {
            return;
        }
        active.phase = phase;
        let hand_id = active.hand_id;
        self.emit(ShowdownEvent::PhaseChanged { hand_id, phase });
    }

    fn schedule(&mut self, now: Millis, delay: Millis, timer: ShowdownTimer) {
        self.timers.schedule(now, delay, (self.generation, timer));
    }

    fn emit(&mut self, event: ShowdownEvent) {
        if let Some(active) = self.active.as_mut() {
            (active.listener)(event);
        }
    }
}

impl fmt::Debug for ShowdownPresenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShowdownPresenter")
            .field("generation", &self.generation)
            .field("hand_id", &self.hand_id())
            .field("phase", &self.phase())
            .field("countdown", &self.countdown_remaining())
            .finish()
    }
}
