//! Canonical table state for one subscribed table.
//!
//! The reconciler is the only writer of seats, hand, and identity state. It
//! applies full snapshots unconditionally and versioned incremental updates
//! monotonically, so updates arriving out of order converge on the state of
//! the highest version seen. It never predicts state the server has not
//! sent.

use log::{debug, trace};

use super::entities::{
    ActionChoices, Card, Chips, Hand, HandId, IdentityBinding, Phase, PlayerId, Seat, SeatIndex,
    TableId, TableInfo, Version,
};
use crate::net::messages::{ActionResult, TableSnapshot, TableStateUpdate, TurnPrompt};

/// What an incremental update did to the canonical state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateOutcome {
    Applied,
    /// Version at or below the current one; discarded.
    Stale { current: Version },
    /// No snapshot since the last (re)subscribe; a full resync is needed.
    AwaitingSnapshot,
    /// Addressed to a different table.
    WrongTable,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PromptOutcome {
    /// Prompt for the local seat in the current hand; actions are available.
    Accepted,
    /// Prompt for someone else. Any local prompt was cleared.
    NotMine,
    /// Prompt for a hand that is no longer current.
    StaleHand,
    WrongTable,
}

#[derive(Debug)]
pub struct TableStateReconciler {
    table_id: TableId,
    local_player: Option<PlayerId>,
    version: Version,
    has_snapshot: bool,
    table: TableInfo,
    seats: Vec<Seat>,
    hand: Option<Hand>,
    identity: IdentityBinding,
    prompt: Option<TurnPrompt>,
}

impl TableStateReconciler {
    pub fn new(table_id: TableId, local_player: Option<PlayerId>) -> Self {
        Self {
            table_id,
            local_player,
            version: 0,
            has_snapshot: false,
            table: TableInfo::default(),
            seats: Vec::new(),
            hand: None,
            identity: IdentityBinding::default(),
            prompt: None,
        }
    }

    /// Replace every slice with the snapshot's contents.
    pub fn apply_snapshot(&mut self, snapshot: &TableSnapshot) -> UpdateOutcome {
        if snapshot.table_id != self.table_id {
            return UpdateOutcome::WrongTable;
        }

        let previous = self.turn_key();
        self.version = snapshot.version;
        self.has_snapshot = true;
        self.table = snapshot.table.clone();
        self.seats = snapshot.seats.clone();
        self.hand = snapshot.hand.clone();
        self.identity = IdentityBinding {
            my_position: snapshot.my_position,
            my_hole_cards: snapshot.my_hole_cards.clone(),
        };
        self.revalidate_prompt(previous);

        debug!(
            "Table {} snapshot applied at version {}",
            self.table_id, self.version
        );
        UpdateOutcome::Applied
    }

    /// Overwrite the slices present in the update, if it is newer than
    /// anything applied so far.
    pub fn apply_incremental_update(&mut self, update: &TableStateUpdate) -> UpdateOutcome {
        if update.table_id != self.table_id {
            return UpdateOutcome::WrongTable;
        }
        if !self.has_snapshot {
            debug!(
                "Table {} update v{} before snapshot, resync needed",
                self.table_id, update.version
            );
            return UpdateOutcome::AwaitingSnapshot;
        }
        if update.version <= self.version {
            debug!(
                "Table {} discarding stale update v{} (at v{})",
                self.table_id, update.version, self.version
            );
            return UpdateOutcome::Stale {
                current: self.version,
            };
        }

        let previous = self.turn_key();
        let changes = &update.changes;
        if let Some(seats) = &changes.seats {
            self.seats = seats.clone();
        }
        if let Some(hand) = &changes.hand {
            self.hand = hand.clone();
        }
        if let Some(position) = changes.my_position {
            self.identity.my_position = position;
        }
        if let Some(cards) = &changes.my_hole_cards {
            self.identity.my_hole_cards = cards.clone();
        }
        self.version = update.version;
        self.revalidate_prompt(previous);

        trace!("Table {} at version {}", self.table_id, self.version);
        UpdateOutcome::Applied
    }

    pub fn apply_turn_prompt(&mut self, prompt: &TurnPrompt) -> PromptOutcome {
        if prompt.table_id != self.table_id {
            return PromptOutcome::WrongTable;
        }
        if self.my_position() != Some(prompt.position) {
            if self.prompt.take().is_some() {
                debug!("Turn moved to seat {}, clearing local prompt", prompt.position);
            }
            return PromptOutcome::NotMine;
        }
        if let Some(hand_id) = self.hand_id()
            && hand_id != prompt.hand_id
        {
            debug!(
                "Ignoring prompt for hand {} during hand {hand_id}",
                prompt.hand_id
            );
            return PromptOutcome::StaleHand;
        }

        self.prompt = Some(prompt.clone());
        PromptOutcome::Accepted
    }

    /// An accepted action by the local seat consumes the local prompt.
    pub fn apply_action_result(&mut self, result: &ActionResult) {
        if result.table_id == self.table_id
            && result.accepted
            && self.my_position() == Some(result.position)
        {
            self.prompt = None;
        }
    }

    /// Require a fresh snapshot before further updates are applied. Called
    /// whenever the subscription is re-established.
    pub fn require_snapshot(&mut self) {
        self.has_snapshot = false;
        self.prompt = None;
    }

    /// Drop all state and start over for `table_id`.
    pub fn reset(&mut self, table_id: TableId) {
        *self = Self::new(table_id, self.local_player.take());
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn has_snapshot(&self) -> bool {
        self.has_snapshot
    }

    pub fn table(&self) -> &TableInfo {
        &self.table
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn seat(&self, position: SeatIndex) -> Option<&Seat> {
        self.seats.iter().find(|seat| seat.position == position)
    }

    pub fn hand(&self) -> Option<&Hand> {
        self.hand.as_ref()
    }

    pub fn hand_id(&self) -> Option<HandId> {
        self.hand.as_ref().map(|hand| hand.hand_id)
    }

    pub fn phase(&self) -> Phase {
        self.hand.as_ref().map(|hand| hand.phase).unwrap_or_default()
    }

    pub fn acting_position(&self) -> Option<SeatIndex> {
        self.hand.as_ref().and_then(|hand| hand.acting_position)
    }

    pub fn identity(&self) -> &IdentityBinding {
        &self.identity
    }

    pub fn local_player(&self) -> Option<&PlayerId> {
        self.local_player.as_ref()
    }

    /// The server's position for the local player, or else the seat whose
    /// occupant is the local identity.
    pub fn my_position(&self) -> Option<SeatIndex> {
        self.identity.my_position.or_else(|| {
            let me = self.local_player.as_ref()?;
            self.seats
                .iter()
                .find(|seat| seat.occupant.as_ref() == Some(me))
                .map(|seat| seat.position)
        })
    }

    pub fn my_hole_cards(&self) -> Option<&[Card]> {
        self.identity.my_hole_cards.as_deref()
    }

    pub fn is_my_turn(&self) -> bool {
        matches!(
            (self.my_position(), self.acting_position()),
            (Some(mine), Some(acting)) if mine == acting
        )
    }

    /// The prompt's choices, while it still targets the local seat in the
    /// current hand and that seat is acting.
    pub fn current_prompt(&self) -> Option<&TurnPrompt> {
        let prompt = self.prompt.as_ref()?;
        let current = self.my_position() == Some(prompt.position)
            && self.hand_id().is_none_or(|id| id == prompt.hand_id)
            && self.is_my_turn();
        current.then_some(prompt)
    }

    pub fn allowed_actions(&self) -> Option<&ActionChoices> {
        self.current_prompt().map(|prompt| &prompt.allowed_actions)
    }

    /// Seats holding cards in the current hand, ascending.
    pub fn active_seat_positions(&self) -> Vec<SeatIndex> {
        let mut positions: Vec<SeatIndex> = self
            .seats
            .iter()
            .filter(|seat| seat.status.is_dealt_in())
            .map(|seat| seat.position)
            .collect();
        positions.sort_unstable();
        positions
    }

    /// Every seat with chips in front of it.
    pub fn bets_by_seat(&self) -> Vec<(SeatIndex, Chips)> {
        self.seats
            .iter()
            .filter(|seat| seat.current_bet_amount > 0)
            .map(|seat| (seat.position, seat.current_bet_amount))
            .collect()
    }

    fn turn_key(&self) -> (Option<HandId>, Option<SeatIndex>) {
        (self.hand_id(), self.acting_position())
    }

    /// Drop the local prompt when the acting seat or the hand changed,
    /// unless the prompt already targets the new acting seat of this hand.
    fn revalidate_prompt(&mut self, previous: (Option<HandId>, Option<SeatIndex>)) {
        if previous == self.turn_key() {
            return;
        }
        let acting = self.acting_position();
        let hand_id = self.hand_id();
        let keep = self.prompt.as_ref().is_some_and(|prompt| {
            Some(prompt.position) == acting && Some(prompt.hand_id) == hand_id
        });
        if !keep && self.prompt.take().is_some() {
            debug!("Acting seat changed, clearing local prompt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::messages::StateChanges;
    use crate::table::entities::{Action, ActionChoice, SeatStatus, Suit};

    const TABLE: TableId = 7;

    fn seat(position: SeatIndex, name: &str, bet: Chips) -> Seat {
        Seat {
            position,
            occupant: Some(PlayerId::new(name)),
            stack: 1000,
            current_bet_amount: bet,
            status: SeatStatus::Active,
            ..Default::default()
        }
    }

    fn hand(hand_id: HandId, acting: Option<SeatIndex>) -> Hand {
        Hand {
            hand_id,
            phase: Phase::Preflop,
            acting_position: acting,
            ..Default::default()
        }
    }

    fn snapshot(version: Version) -> TableSnapshot {
        TableSnapshot {
            table_id: TABLE,
            version,
            table: TableInfo {
                name: "Main".to_string(),
                max_seats: 6,
                small_blind: 5,
                big_blind: 10,
            },
            seats: vec![seat(0, "alice", 5), seat(2, "bob", 10), seat(4, "carol", 0)],
            hand: Some(hand(1, Some(4))),
            my_position: None,
            my_hole_cards: None,
        }
    }

    fn update(version: Version, changes: StateChanges) -> TableStateUpdate {
        TableStateUpdate {
            table_id: TABLE,
            version,
            changes,
        }
    }

    fn prompt(position: SeatIndex, hand_id: HandId) -> TurnPrompt {
        TurnPrompt {
            table_id: TABLE,
            hand_id,
            position,
            allowed_actions: [ActionChoice::Fold, ActionChoice::Call(10)].into(),
            call_amount: 10,
            min_raise: 20,
            ..Default::default()
        }
    }

    fn reconciler_as(name: &str) -> TableStateReconciler {
        let mut reconciler = TableStateReconciler::new(TABLE, Some(PlayerId::new(name)));
        reconciler.apply_snapshot(&snapshot(10));
        reconciler
    }

    #[test]
    fn test_snapshot_replaces_everything() {
        let mut reconciler = reconciler_as("alice");
        let mut next = snapshot(3);
        next.seats = vec![seat(1, "dave", 0)];
        next.hand = None;
        next.my_position = Some(1);

        assert_eq!(reconciler.apply_snapshot(&next), UpdateOutcome::Applied);
        assert_eq!(reconciler.version(), 3);
        assert_eq!(reconciler.seats().len(), 1);
        assert!(reconciler.hand().is_none());
        assert_eq!(reconciler.my_position(), Some(1));
    }

    #[test]
    fn test_stale_and_duplicate_updates_are_discarded() {
        let mut reconciler = reconciler_as("alice");
        let changes = StateChanges {
            seats: Some(vec![]),
            ..Default::default()
        };

        assert_eq!(
            reconciler.apply_incremental_update(&update(10, changes.clone())),
            UpdateOutcome::Stale { current: 10 }
        );
        assert_eq!(reconciler.seats().len(), 3);

        assert_eq!(
            reconciler.apply_incremental_update(&update(11, changes.clone())),
            UpdateOutcome::Applied
        );
        assert_eq!(
            reconciler.apply_incremental_update(&update(11, changes)),
            UpdateOutcome::Stale { current: 11 }
        );
    }

    #[test]
    fn test_absent_fields_untouched_and_null_clears() {
        let mut reconciler = reconciler_as("alice");
        let changes = StateChanges {
            hand: Some(None),
            my_hole_cards: Some(Some(vec![Card(14, Suit::Spade), Card(13, Suit::Heart)])),
            ..Default::default()
        };

        reconciler.apply_incremental_update(&update(11, changes));
        assert!(reconciler.hand().is_none());
        assert_eq!(reconciler.seats().len(), 3);
        assert_eq!(reconciler.my_hole_cards().map(<[Card]>::len), Some(2));
        assert_eq!(reconciler.version(), 11);
    }

    #[test]
    fn test_updates_before_snapshot_need_resync() {
        let mut reconciler = TableStateReconciler::new(TABLE, None);
        let outcome = reconciler.apply_incremental_update(&update(1, StateChanges::default()));
        assert_eq!(outcome, UpdateOutcome::AwaitingSnapshot);

        let mut reconciler = reconciler_as("alice");
        reconciler.require_snapshot();
        let outcome = reconciler.apply_incremental_update(&update(50, StateChanges::default()));
        assert_eq!(outcome, UpdateOutcome::AwaitingSnapshot);
        assert_eq!(reconciler.version(), 10);
    }

    #[test]
    fn test_other_tables_are_ignored() {
        let mut reconciler = reconciler_as("alice");
        let mut other = update(99, StateChanges::default());
        other.table_id = TABLE + 1;
        assert_eq!(
            reconciler.apply_incremental_update(&other),
            UpdateOutcome::WrongTable
        );
        assert_eq!(reconciler.version(), 10);
    }

    #[test]
    fn test_my_position_from_server_or_occupant() {
        let reconciler = reconciler_as("carol");
        assert_eq!(reconciler.my_position(), Some(4));
        assert!(reconciler.is_my_turn());

        let mut reconciler = reconciler_as("carol");
        let mut next = snapshot(11);
        next.my_position = Some(2);
        reconciler.apply_snapshot(&next);
        assert_eq!(reconciler.my_position(), Some(2));
        assert!(!reconciler.is_my_turn());

        let spectator = TableStateReconciler::new(TABLE, None);
        assert_eq!(spectator.my_position(), None);
        assert!(!spectator.is_my_turn());
    }

    #[test]
    fn test_prompt_for_local_seat_exposes_actions() {
        let mut reconciler = reconciler_as("carol");
        assert_eq!(reconciler.apply_turn_prompt(&prompt(4, 1)), PromptOutcome::Accepted);

        let actions = reconciler.allowed_actions().unwrap();
        assert!(actions.contains(&Action::Call));
        assert!(!actions.contains(&Action::Check));
    }

    #[test]
    fn test_prompt_for_other_seat_clears_local_prompt() {
        let mut reconciler = reconciler_as("carol");
        reconciler.apply_turn_prompt(&prompt(4, 1));

        assert_eq!(reconciler.apply_turn_prompt(&prompt(0, 1)), PromptOutcome::NotMine);
        assert!(reconciler.allowed_actions().is_none());
    }

    #[test]
    fn test_prompt_for_old_hand_is_ignored() {
        let mut reconciler = reconciler_as("carol");
        assert_eq!(reconciler.apply_turn_prompt(&prompt(4, 0)), PromptOutcome::StaleHand);
        assert!(reconciler.allowed_actions().is_none());
    }

    #[test]
    fn test_acting_change_clears_prompt() {
        let mut reconciler = reconciler_as("carol");
        reconciler.apply_turn_prompt(&prompt(4, 1));

        let changes = StateChanges {
            hand: Some(Some(hand(1, Some(0)))),
            ..Default::default()
        };
        reconciler.apply_incremental_update(&update(11, changes));
        assert!(reconciler.allowed_actions().is_none());

        // Turn coming back does not resurrect the old prompt.
        let changes = StateChanges {
            hand: Some(Some(hand(1, Some(4)))),
            ..Default::default()
        };
        reconciler.apply_incremental_update(&update(12, changes));
        assert!(reconciler.is_my_turn());
        assert!(reconciler.allowed_actions().is_none());
    }

    #[test]
    fn test_prompt_ahead_of_acting_update_survives() {
        let mut reconciler = reconciler_as("alice");
        reconciler.apply_turn_prompt(&prompt(0, 1));
        assert!(reconciler.allowed_actions().is_none());

        let changes = StateChanges {
            hand: Some(Some(hand(1, Some(0)))),
            ..Default::default()
        };
        reconciler.apply_incremental_update(&update(11, changes));
        assert!(reconciler.allowed_actions().is_some());
    }

    #[test]
    fn test_accepted_action_consumes_prompt() {
        let mut reconciler = reconciler_as("carol");
        reconciler.apply_turn_prompt(&prompt(4, 1));

        reconciler.apply_action_result(&ActionResult {
            table_id: TABLE,
            position: 4,
            action: Action::Call,
            accepted: false,
            reason: Some("too slow".to_string()),
        });
        assert!(reconciler.allowed_actions().is_some());

        reconciler.apply_action_result(&ActionResult {
            table_id: TABLE,
            position: 4,
            action: Action::Call,
            accepted: true,
            reason: None,
        });
        assert!(reconciler.allowed_actions().is_none());
    }

    #[test]
    fn test_derived_seat_views() {
        let mut reconciler = reconciler_as("alice");
        let mut seats = vec![seat(5, "erin", 0), seat(0, "alice", 5), seat(2, "bob", 10)];
        seats[0].status = SeatStatus::SittingOut;
        reconciler.apply_incremental_update(&update(
            11,
            StateChanges {
                seats: Some(seats),
                ..Default::default()
            },
        ));

        assert_eq!(reconciler.active_seat_positions(), vec![0, 2]);
        assert_eq!(reconciler.bets_by_seat(), vec![(0, 5), (2, 10)]);
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut reconciler = reconciler_as("carol");
        reconciler.reset(TABLE + 1);
        assert_eq!(reconciler.table_id(), TABLE + 1);
        assert!(!reconciler.has_snapshot());
        assert!(reconciler.seats().is_empty());
        assert_eq!(reconciler.local_player(), Some(&PlayerId::new("carol")));
    }
}
