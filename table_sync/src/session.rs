//! One client's view of one table.
//!
//! [`TableSession`] consumes every inbound envelope for its table, feeds the
//! reconciler, and starts or tears down the presentation sequences as the
//! hand moves on. Everything it wants the caller to show is pushed to a
//! [`SessionEvent`] channel; everything it wants sent to the server is
//! returned from [`TableSession::handle`] or
//! [`TableSession::request_action`].

use log::{debug, info, trace, warn};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    config::{PresentationConfig, millis},
    hand::{
        lifecycle::{HandLifecycle, LifecycleEvent},
        showdown::{ShowdownEvent, ShowdownPresenter},
    },
    net::{
        connection::ConnectionState,
        envelope::Envelope,
        messages::{
            ActionResult, Announcement, ClientMessage, ServerMessage, ShowdownResult,
            TableSnapshot, TableStateUpdate, TurnPrompt,
        },
    },
    presentation::{
        chips::{ChipAnimation, ChipSettlementOrchestrator},
        dealing::{DealEntry, DealingSequencer, compute_sequence},
    },
    scheduler::{Generation, Millis, Scheduler},
    table::{
        announcements::AnnouncementBoard,
        entities::{Action, ActionChoices, Chips, HandId, Phase, PlayerId, SeatIndex, TableId},
        reconciler::{PromptOutcome, TableStateReconciler, UpdateOutcome},
    },
};

/// Something the UI should show.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Connection {
        state: ConnectionState,
        attempt: u32,
    },
    /// Canonical state changed; re-render from the session's reconciler.
    TableUpdated { version: u64 },
    /// An update arrived without a base snapshot; a resubscribe was issued.
    ResyncRequested,
    HandStarted { hand_id: HandId },
    PhaseAdvanced {
        hand_id: HandId,
        from: Phase,
        to: Phase,
    },
    HandCleared { hand_id: HandId },
    /// The local seat is prompted to act.
    YourTurn {
        hand_id: HandId,
        allowed: ActionChoices,
        call_amount: Chips,
        min_raise: Chips,
        max_raise: Option<Chips>,
    },
    ActionAccepted { position: SeatIndex, action: Action },
    ActionRejected { action: Action, reason: Option<String> },
    CardDealt(DealEntry),
    DealComplete { hand_id: HandId },
    ChipsMoving(ChipAnimation),
    PotUpdated(Chips),
    Showdown(ShowdownEvent),
    Announcement(Announcement),
}

/// Why an action request was not sent.
#[derive(Debug, Error, PartialEq)]
pub enum ActionError {
    #[error("No hand in progress")]
    NoHand,

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("'{action}' is not allowed (allowed: {allowed})")]
    NotAllowed {
        action: Action,
        allowed: ActionChoices,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SessionTimer {
    CollectionDone(Generation),
    PayoutDone(Generation),
}

#[derive(Debug)]
pub struct TableSession {
    config: PresentationConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    reconciler: TableStateReconciler,
    lifecycle: HandLifecycle,
    dealing: DealingSequencer,
    showdown: ShowdownPresenter,
    chips: ChipSettlementOrchestrator,
    announcements: AnnouncementBoard,
    timers: Scheduler<SessionTimer>,
    pending_actions: HashMap<String, Action>,
    resync_requested: bool,
    left: bool,
}

impl TableSession {
    pub fn new(
        table_id: TableId,
        local_player: Option<PlayerId>,
        config: PresentationConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            reconciler: TableStateReconciler::new(table_id, local_player),
            lifecycle: HandLifecycle::new(),
            dealing: DealingSequencer::new(config.clone()),
            showdown: ShowdownPresenter::new(config.clone()),
            chips: ChipSettlementOrchestrator::new(),
            announcements: AnnouncementBoard::new(),
            timers: Scheduler::new(),
            pending_actions: HashMap::new(),
            resync_requested: false,
            left: false,
            config,
            events,
        };
        (session, receiver)
    }

    pub fn table_id(&self) -> TableId {
        self.reconciler.table_id()
    }

    /// Canonical state, read-only.
    pub fn state(&self) -> &TableStateReconciler {
        &self.reconciler
    }

    pub fn showdown(&self) -> &ShowdownPresenter {
        &self.showdown
    }

    pub fn dealing(&self) -> &DealingSequencer {
        &self.dealing
    }

    pub fn chips(&self) -> &ChipSettlementOrchestrator {
        &self.chips
    }

    pub fn announcements(&self) -> &AnnouncementBoard {
        &self.announcements
    }

    /// Message that subscribes to this session's table.
    pub fn subscribe_message(&self) -> ClientMessage {
        ClientMessage::SubscribeTable {
            table_id: self.table_id(),
        }
    }

    pub fn unsubscribe_message(&self) -> ClientMessage {
        ClientMessage::UnsubscribeTable {
            table_id: self.table_id(),
        }
    }

    /// Leave the table. Presentation is torn down, and from now on the
    /// session neither resubscribes on reconnect nor applies table messages.
    /// Returns the message that tells the server.
    pub fn leave(&mut self) -> ClientMessage {
        info!("Leaving table {}", self.table_id());
        self.left = true;
        self.resync_requested = false;
        self.pending_actions.clear();
        self.dealing.cancel();
        self.showdown.reset();
        self.chips.reset(None);
        self.reconciler.require_snapshot();
        self.unsubscribe_message()
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Process one inbound envelope. Returns messages to send to the server.
    pub fn handle(&mut self, now: Millis, envelope: &Envelope<ServerMessage>) -> Vec<ClientMessage> {
        if let Some(table_id) = envelope.message().table_id()
            && table_id != self.table_id()
        {
            debug!("Ignoring {} for table {table_id}", envelope.kind());
            return Vec::new();
        }

        if let ServerMessage::ConnectionState(payload) = envelope.message() {
            self.emit(SessionEvent::Connection {
                state: payload.state,
                attempt: payload.attempt,
            });
            if payload.state == ConnectionState::Connected && !self.left {
                return self.resubscribe();
            }
            return Vec::new();
        }
        if self.left {
            trace!("Ignoring {} after leaving the table", envelope.kind());
            return Vec::new();
        }

        match envelope.message() {
            ServerMessage::ConnectionState(_) => {}
            ServerMessage::TableSnapshot(snapshot) => self.on_snapshot(now, snapshot),
            ServerMessage::TableStateUpdate(update) => return self.on_update(now, update),
            ServerMessage::TurnPrompt(prompt) => self.on_turn_prompt(prompt),
            ServerMessage::ActionResult(result) => {
                self.on_action_result(envelope.request_id(), result)
            }
            ServerMessage::ShowdownResult(result) => self.on_showdown(now, result),
            ServerMessage::Announcement(announcement) => {
                if self.announcements.post(announcement.clone()) {
                    self.emit(SessionEvent::Announcement(announcement.clone()));
                }
            }
            ServerMessage::HeartbeatPing(_) | ServerMessage::HeartbeatPong(_) => {}
        }
        Vec::new()
    }

    /// Build an action request for the local seat, checked against the
    /// choices the server last offered.
    pub fn request_action(&mut self, action: Action) -> Result<Envelope<ClientMessage>, ActionError> {
        let hand_id = self.reconciler.hand_id().ok_or(ActionError::NoHand)?;
        let allowed = self
            .reconciler
            .allowed_actions()
            .ok_or(ActionError::NotYourTurn)?;
        if !allowed.contains(&action) {
            return Err(ActionError::NotAllowed {
                action,
                allowed: allowed.clone(),
            });
        }

        let envelope = Envelope::request(ClientMessage::ActionRequest {
            table_id: self.table_id(),
            hand_id,
            action: action.clone(),
        });
        if let Some(request_id) = envelope.request_id() {
            self.pending_actions.insert(request_id.to_string(), action);
        }
        Ok(envelope)
    }

    /// Requests still waiting for an `action-result`.
    pub fn pending_actions(&self) -> usize {
        self.pending_actions.len()
    }

    /// Stop presenting the showdown before its countdown ends.
    pub fn dismiss_showdown(&mut self) {
        self.showdown.dismiss();
    }

    pub fn dismiss_announcement(&mut self) -> Option<Announcement> {
        self.announcements.dismiss()
    }

    /// Run every presentation step due at `now`.
    pub fn on_timer(&mut self, now: Millis) {
        self.dealing.on_timer(now);
        self.showdown.on_timer(now);

        while let Some((_, timer)) = self.timers.pop_due(now) {
            match timer {
                SessionTimer::CollectionDone(generation) => {
                    if let Some(done) = self.chips.complete_collection_to_pot(generation) {
                        self.emit(SessionEvent::PotUpdated(done.pot));
                        if let Some(payout) = done.distribution {
                            self.start_payout(now, payout);
                        }
                    }
                }
                SessionTimer::PayoutDone(generation) => {
                    let current = self.chips.distributing().map(|payout| payout.generation);
                    if current != Some(generation) {
                        continue;
                    }
                    match self.chips.advance_distribution(generation) {
                        Some(payout) => self.start_payout(now, payout),
                        None => self.emit(SessionEvent::PotUpdated(self.chips.pot())),
                    }
                }
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        [
            self.dealing.next_deadline(),
            self.showdown.next_deadline(),
            self.timers.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn resubscribe(&mut self) -> Vec<ClientMessage> {
        self.reconciler.require_snapshot();
        self.resync_requested = true;
        vec![self.subscribe_message()]
    }

    fn on_snapshot(&mut self, now: Millis, snapshot: &TableSnapshot) {
        let bets = self.reconciler.bets_by_seat();
        if self.reconciler.apply_snapshot(snapshot) == UpdateOutcome::Applied {
            self.resync_requested = false;
            self.after_state_change(now, bets);
        }
    }

    fn on_update(&mut self, now: Millis, update: &TableStateUpdate) -> Vec<ClientMessage> {
        let bets = self.reconciler.bets_by_seat();
        match self.reconciler.apply_incremental_update(update) {
            UpdateOutcome::Applied => self.after_state_change(now, bets),
            UpdateOutcome::AwaitingSnapshot if !self.resync_requested => {
                self.emit(SessionEvent::ResyncRequested);
                self.resync_requested = true;
                return vec![self.subscribe_message()];
            }
            UpdateOutcome::AwaitingSnapshot
            | UpdateOutcome::Stale { .. }
            | UpdateOutcome::WrongTable => {}
        }
        Vec::new()
    }

    fn after_state_change(&mut self, now: Millis, previous_bets: Vec<(SeatIndex, Chips)>) {
        self.emit(SessionEvent::TableUpdated {
            version: self.reconciler.version(),
        });

        match self.lifecycle.observe(self.reconciler.hand()) {
            Some(LifecycleEvent::HandStarted { hand_id, phase }) => {
                info!("Hand {hand_id} started ({phase})");
                self.start_hand(now, hand_id, phase);
            }
            Some(LifecycleEvent::PhaseAdvanced { hand_id, from, to }) => {
                self.emit(SessionEvent::PhaseAdvanced { hand_id, from, to });
                if to > Phase::Preflop {
                    self.collect_bets(now, &previous_bets);
                }
            }
            Some(LifecycleEvent::HandCleared { hand_id }) => {
                self.dealing.cancel();
                self.showdown.reset();
                self.chips.reset(None);
                self.emit(SessionEvent::HandCleared { hand_id });
            }
            None => {}
        }
    }

    fn start_hand(&mut self, now: Millis, hand_id: HandId, phase: Phase) {
        self.showdown.reset();
        self.chips.reset(Some(hand_id));
        self.dealing.cancel();
        self.emit(SessionEvent::HandStarted { hand_id });

        if phase != Phase::Preflop {
            return;
        }
        let small_blind = self.reconciler.hand().and_then(|hand| hand.small_blind_position);
        let sequence = compute_sequence(&self.reconciler.active_seat_positions(), small_blind);
        let cards = self.events.clone();
        let done = self.events.clone();
        self.dealing.play(
            now,
            sequence,
            move |entry| {
                let _ = cards.send(SessionEvent::CardDealt(entry));
            },
            move || {
                let _ = done.send(SessionEvent::DealComplete { hand_id });
            },
        );
    }

    fn collect_bets(&mut self, now: Millis, bets: &[(SeatIndex, Chips)]) {
        let Some(generation) = self.chips.begin_collection(bets) else {
            return;
        };
        for animation in self.chips.collecting().to_vec() {
            self.emit(SessionEvent::ChipsMoving(animation));
        }
        let delay = millis(self.config.chip_animation);
        self.timers
            .schedule(now, delay, SessionTimer::CollectionDone(generation));
    }

    fn start_payout(&mut self, now: Millis, payout: ChipAnimation) {
        self.emit(SessionEvent::ChipsMoving(payout));
        let delay = millis(self.config.chip_animation);
        self.timers
            .schedule(now, delay, SessionTimer::PayoutDone(payout.generation));
    }

    fn on_turn_prompt(&mut self, prompt: &TurnPrompt) {
        match self.reconciler.apply_turn_prompt(prompt) {
            PromptOutcome::Accepted => {
                if self.reconciler.current_prompt().is_some() {
                    self.emit(SessionEvent::YourTurn {
                        hand_id: prompt.hand_id,
                        allowed: prompt.allowed_actions.clone(),
                        call_amount: prompt.call_amount,
                        min_raise: prompt.min_raise,
                        max_raise: prompt.max_raise,
                    });
                }
            }
            PromptOutcome::NotMine | PromptOutcome::StaleHand | PromptOutcome::WrongTable => {}
        }
    }

    fn on_action_result(&mut self, request_id: Option<&str>, result: &ActionResult) {
        self.reconciler.apply_action_result(result);

        let Some(requested) = request_id.and_then(|id| self.pending_actions.remove(id)) else {
            if result.accepted {
                self.emit(SessionEvent::ActionAccepted {
                    position: result.position,
                    action: result.action.clone(),
                });
            }
            return;
        };

        if result.accepted {
            self.emit(SessionEvent::ActionAccepted {
                position: result.position,
                action: result.action.clone(),
            });
        } else {
            warn!(
                "Action {requested} rejected: {}",
                result.reason.as_deref().unwrap_or("no reason given")
            );
            self.emit(SessionEvent::ActionRejected {
                action: requested,
                reason: result.reason.clone(),
            });
        }
    }

    fn on_showdown(&mut self, now: Millis, result: &ShowdownResult) {
        if let Some(hand_id) = self.reconciler.hand_id()
            && hand_id != result.hand_id
        {
            debug!(
                "Ignoring showdown for hand {} during hand {hand_id}",
                result.hand_id
            );
            return;
        }
        if self.showdown.hand_id() == Some(result.hand_id) {
            debug!("Showdown for hand {} redelivered", result.hand_id);
            return;
        }

        let events = self.events.clone();
        self.showdown.begin(now, result, move |event| {
            let _ = events.send(SessionEvent::Showdown(event));
        });

        if let Some(payout) = self
            .chips
            .begin_distribution(result.total_awarded(), &result.winners)
        {
            self.start_payout(now, payout);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The receiver going away only means nobody is rendering.
        let _ = self.events.send(event);
    }
}
