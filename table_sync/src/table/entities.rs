//! Canonical table entities as narrated by the server.
//!
//! Nothing in here is computed locally. Seats, hands, and cards arrive in
//! `table-snapshot` and `table-state-update` payloads and are stored as-is
//! by the [`TableStateReconciler`](super::reconciler::TableStateReconciler).

use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashSet,
    fmt,
    hash::{Hash, Hasher},
    mem::discriminant,
};

/// Longest local identity we keep. Anything longer is truncated.
pub const MAX_PLAYER_ID_LENGTH: usize = 32;

/// A hand never shows more than five community cards.
pub const MAX_COMMUNITY_CARDS: usize = 5;

/// Hold'em hole cards.
pub const MAX_HOLE_CARDS: usize = 2;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "♣",
            Self::Spade => "♠",
            Self::Diamond => "♦",
            Self::Heart => "♥",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values.
pub type Value = u8;

/// A card is a tuple of a value (deuce=2u8 ... ace=14u8) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            1 | 14 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        let repr = format!("{value}/{}", self.1);
        write!(f, "{repr:>4}")
    }
}

/// Type alias for whole chips. Stacks, bets, and pots are all whole chips.
pub type Chips = u64;

/// Type alias for seat positions (0..max_seats).
pub type SeatIndex = usize;

/// Server-assigned hand identifier. A new value means a new hand.
pub type HandId = u64;

/// Server-assigned table identifier.
pub type TableId = i64;

/// Per-table monotonically increasing state version.
pub type Version = u64;

/// Opaque identity of a player, as supplied by the identity service and as
/// it appears in seat occupancy.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(s: &str) -> Self {
        let mut id: String = s
            .chars()
            .map(|c| if c.is_ascii_whitespace() { '_' } else { c })
            .collect();
        id.truncate(MAX_PLAYER_ID_LENGTH);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A player action, either requested by the local player or reported by the
/// server as a seat's last action.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    AllIn,
    Call,
    Check,
    Fold,
    Raise(Option<Chips>),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::AllIn => "all-ins",
            Self::Call => "calls",
            Self::Check => "checks",
            Self::Fold => "folds",
            Self::Raise(Some(amount)) => &format!("raises ${amount}"),
            Self::Raise(None) => "raises",
        };
        write!(f, "{repr}")
    }
}

/// One of the actions a turn prompt allows.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionChoice {
    AllIn,
    Call(Chips),
    Check,
    Fold,
    Raise(Chips),
}

impl fmt::Display for ActionChoice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::AllIn => "all-in".to_string(),
            Self::Call(amount) => format!("call (== ${amount})"),
            Self::Check => "check".to_string(),
            Self::Fold => "fold".to_string(),
            Self::Raise(amount) => format!("raise (>= ${amount})"),
        };
        write!(f, "{repr}")
    }
}

// Choices compare by variant only. The amounts are display hints; the server
// validates the actual bet.
impl Eq for ActionChoice {}

impl Hash for ActionChoice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
    }
}

impl PartialEq for ActionChoice {
    fn eq(&self, other: &Self) -> bool {
        discriminant(self) == discriminant(other)
    }
}

/// The set of actions a turn prompt offers.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ActionChoices(pub HashSet<ActionChoice>);

impl ActionChoices {
    pub fn contains(&self, action: &Action) -> bool {
        let action_choice = match action {
            Action::AllIn => ActionChoice::AllIn,
            Action::Call => ActionChoice::Call(0),
            Action::Check => ActionChoice::Check,
            Action::Fold => ActionChoice::Fold,
            Action::Raise(_) => ActionChoice::Raise(0),
        };
        self.0.contains(&action_choice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ActionChoices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut choices: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        choices.sort();
        write!(f, "{}", choices.join(", "))
    }
}

impl<I> From<I> for ActionChoices
where
    I: IntoIterator<Item = ActionChoice>,
{
    fn from(iter: I) -> Self {
        Self(iter.into_iter().collect::<HashSet<_>>())
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeatStatus {
    #[default]
    Empty,
    Active,
    Folded,
    AllIn,
    SittingOut,
    Disconnected,
}

impl SeatStatus {
    /// Whether a seat in this status receives hole cards at the start of a
    /// hand.
    pub fn is_dealt_in(&self) -> bool {
        matches!(self, Self::Active | Self::AllIn)
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Empty => "empty",
            Self::Active => "active",
            Self::Folded => "folded",
            Self::AllIn => "all-in",
            Self::SittingOut => "sitting out",
            Self::Disconnected => "disconnected",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub position: SeatIndex,
    #[serde(default)]
    pub occupant: Option<PlayerId>,
    #[serde(default)]
    pub stack: Chips,
    #[serde(default)]
    pub current_bet_amount: Chips,
    #[serde(default)]
    pub status: SeatStatus,
    #[serde(default)]
    pub is_dealer: bool,
    #[serde(default)]
    pub is_current_turn: bool,
    #[serde(default)]
    pub last_action: Option<Action>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "waiting",
            Self::Preflop => "preflop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Showdown => "showdown",
            Self::Complete => "complete",
        };
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidePot {
    pub amount: Chips,
    #[serde(default)]
    pub eligible_positions: Vec<SeatIndex>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hand {
    pub hand_id: HandId,
    pub phase: Phase,
    #[serde(default)]
    pub community_cards: Vec<Card>,
    #[serde(default)]
    pub pot: Chips,
    #[serde(default)]
    pub side_pots: Vec<SidePot>,
    #[serde(default)]
    pub current_bet: Chips,
    #[serde(default)]
    pub min_raise: Chips,
    #[serde(default)]
    pub acting_position: Option<SeatIndex>,
    pub dealer_position: SeatIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_blind_position: Option<SeatIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub big_blind_position: Option<SeatIndex>,
    /// Epoch milliseconds by which the acting seat must act.
    #[serde(default)]
    pub turn_deadline: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    #[serde(default)]
    pub name: String,
    pub max_seats: usize,
    #[serde(default)]
    pub small_blind: Chips,
    #[serde(default)]
    pub big_blind: Chips,
}

impl fmt::Display for TableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}-max, ${}/{})",
            self.name, self.max_seats, self.small_blind, self.big_blind
        )
    }
}

/// Where the local player sits and what they hold. Whether it is their turn
/// is always derived from this and the hand, never stored.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdentityBinding {
    pub my_position: Option<SeatIndex>,
    pub my_hole_cards: Option<Vec<Card>>,
}
