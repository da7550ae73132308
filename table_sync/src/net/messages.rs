//! Typed message payloads exchanged with the table server.
//!
//! Every frame on the wire is an [`Envelope`](super::envelope::Envelope)
//! whose `type` tag selects one variant of [`ServerMessage`] (inbound) or
//! [`ClientMessage`] (outbound). Decoding goes through [`WireMessage`] so an
//! unknown tag or a mismatched payload is a [`CodecError`] rather than a
//! silently defaulted value.

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, str::FromStr};

use super::{
    connection::ConnectionState,
    errors::{CodecError, CodecResult},
};
use crate::table::entities::{
    Action, ActionChoices, Card, Chips, Hand, HandId, MAX_COMMUNITY_CARDS, MAX_HOLE_CARDS, Seat,
    SeatIndex, TableId, TableInfo, Version,
};

/// The `type` tag of an envelope.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageKind {
    ConnectionState,
    TableSnapshot,
    TableStateUpdate,
    TurnPrompt,
    ActionResult,
    ShowdownResult,
    Announcement,
    HeartbeatPing,
    HeartbeatPong,
    SubscribeTable,
    UnsubscribeTable,
    ActionRequest,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionState => "connection-state",
            Self::TableSnapshot => "table-snapshot",
            Self::TableStateUpdate => "table-state-update",
            Self::TurnPrompt => "turn-prompt",
            Self::ActionResult => "action-result",
            Self::ShowdownResult => "showdown-result",
            Self::Announcement => "announcement",
            Self::HeartbeatPing => "heartbeat-ping",
            Self::HeartbeatPong => "heartbeat-pong",
            Self::SubscribeTable => "subscribe-table",
            Self::UnsubscribeTable => "unsubscribe-table",
            Self::ActionRequest => "action-request",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "connection-state" => Self::ConnectionState,
            "table-snapshot" => Self::TableSnapshot,
            "table-state-update" => Self::TableStateUpdate,
            "turn-prompt" => Self::TurnPrompt,
            "action-result" => Self::ActionResult,
            "showdown-result" => Self::ShowdownResult,
            "announcement" => Self::Announcement,
            "heartbeat-ping" => Self::HeartbeatPing,
            "heartbeat-pong" => Self::HeartbeatPong,
            "subscribe-table" => Self::SubscribeTable,
            "unsubscribe-table" => Self::UnsubscribeTable,
            "action-request" => Self::ActionRequest,
            other => return Err(CodecError::UnknownType(other.to_string())),
        };
        Ok(kind)
    }
}

/// A message that can travel inside an envelope.
pub trait WireMessage: Sized {
    fn kind(&self) -> MessageKind;

    fn to_payload(&self) -> CodecResult<Value>;

    fn from_parts(kind: MessageKind, payload: Value) -> CodecResult<Self>;
}

fn payload_from<T: DeserializeOwned>(kind: MessageKind, payload: Value) -> CodecResult<T> {
    serde_json::from_value(payload).map_err(|source| CodecError::Payload {
        kind: kind.to_string(),
        source,
    })
}

fn payload_to<T: Serialize>(value: &T) -> CodecResult<Value> {
    serde_json::to_value(value).map_err(CodecError::Encode)
}

/// Distinguishes "field absent" (`None`) from "field present and null"
/// (`Some(None)`) in partial updates.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Synthesised locally on every connection lifecycle transition.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatePayload {
    pub state: ConnectionState,
    /// Reconnect attempts made so far in the current outage.
    #[serde(default)]
    pub attempt: u32,
}

/// Full table state. Replaces everything the reconciler holds.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table_id: TableId,
    pub version: Version,
    pub table: TableInfo,
    #[serde(default)]
    pub seats: Vec<Seat>,
    #[serde(default)]
    pub hand: Option<Hand>,
    #[serde(default)]
    pub my_position: Option<SeatIndex>,
    #[serde(default)]
    pub my_hole_cards: Option<Vec<Card>>,
}

/// Top-level slices an incremental update may overwrite. An absent field
/// leaves the slice untouched; a field present as `null` clears it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<Vec<Seat>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub hand: Option<Option<Hand>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub my_position: Option<Option<SeatIndex>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub my_hole_cards: Option<Option<Vec<Card>>>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.seats.is_none()
            && self.hand.is_none()
            && self.my_position.is_none()
            && self.my_hole_cards.is_none()
    }
}

/// Versioned partial table state.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStateUpdate {
    pub table_id: TableId,
    pub version: Version,
    #[serde(default)]
    pub changes: StateChanges,
}

/// Invitation for one seat to act.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPrompt {
    pub table_id: TableId,
    pub hand_id: HandId,
    pub position: SeatIndex,
    #[serde(default)]
    pub allowed_actions: ActionChoices,
    #[serde(default)]
    pub call_amount: Chips,
    #[serde(default)]
    pub min_raise: Chips,
    #[serde(default)]
    pub max_raise: Option<Chips>,
    /// Epoch milliseconds by which the seat must act.
    #[serde(default)]
    pub deadline: Option<i64>,
}

/// The server's verdict on an action request. Correlated through the
/// envelope's `requestId`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub table_id: TableId,
    pub position: SeatIndex,
    pub action: Action,
    pub accepted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reveal {
    pub position: SeatIndex,
    pub cards: Vec<Card>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerEntry {
    pub position: SeatIndex,
    pub amount: Chips,
}

/// Authoritative showdown narration: who showed what and who was paid.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownResult {
    pub table_id: TableId,
    pub hand_id: HandId,
    #[serde(default)]
    pub reveals: Vec<Reveal>,
    #[serde(default)]
    pub winners: Vec<WinnerEntry>,
    /// Milliseconds until the server deals the next hand.
    #[serde(default)]
    pub next_hand_delay: u64,
}

impl ShowdownResult {
    pub fn total_awarded(&self) -> Chips {
        self.winners
            .iter()
            .fold(0, |total, winner| total.saturating_add(winner.amount))
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    #[serde(default)]
    pub priority: u8,
    pub text: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    #[serde(default)]
    pub seq: u64,
}

/// A message from the table server (or synthesised by the connection
/// manager, for `connection-state`).
#[derive(Clone, Debug, PartialEq)]
pub enum ServerMessage {
    ConnectionState(ConnectionStatePayload),
    TableSnapshot(TableSnapshot),
    TableStateUpdate(TableStateUpdate),
    TurnPrompt(TurnPrompt),
    ActionResult(ActionResult),
    ShowdownResult(ShowdownResult),
    Announcement(Announcement),
    HeartbeatPing(Heartbeat),
    HeartbeatPong(Heartbeat),
}

impl ServerMessage {
    /// Table the message concerns, for messages scoped to one table.
    pub fn table_id(&self) -> Option<TableId> {
        match self {
            Self::TableSnapshot(snapshot) => Some(snapshot.table_id),
            Self::TableStateUpdate(update) => Some(update.table_id),
            Self::TurnPrompt(prompt) => Some(prompt.table_id),
            Self::ActionResult(result) => Some(result.table_id),
            Self::ShowdownResult(result) => Some(result.table_id),
            Self::ConnectionState(_)
            | Self::Announcement(_)
            | Self::HeartbeatPing(_)
            | Self::HeartbeatPong(_) => None,
        }
    }

    /// Structural limits the server never violates. A payload breaking them
    /// is treated like any other malformed frame.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            Self::TableSnapshot(snapshot) => {
                check_hand(snapshot.hand.as_ref())?;
                check_hole_cards(snapshot.my_hole_cards.as_deref())?;
                let max_seats = snapshot.table.max_seats;
                if let Some(seat) = snapshot.seats.iter().find(|s| s.position >= max_seats) {
                    return Err(CodecError::InvalidPayload(format!(
                        "seat position {} outside a {max_seats}-seat table",
                        seat.position
                    )));
                }
                if let Some(position) = snapshot.my_position
                    && position >= max_seats
                {
                    return Err(CodecError::InvalidPayload(format!(
                        "local position {position} outside a {max_seats}-seat table"
                    )));
                }
                Ok(())
            }
            Self::TableStateUpdate(update) => {
                if let Some(hand) = &update.changes.hand {
                    check_hand(hand.as_ref())?;
                }
                if let Some(cards) = &update.changes.my_hole_cards {
                    check_hole_cards(cards.as_deref())?;
                }
                Ok(())
            }
            Self::ShowdownResult(result) => {
                for reveal in &result.reveals {
                    check_hole_cards(Some(reveal.cards.as_slice()))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn check_hand(hand: Option<&Hand>) -> CodecResult<()> {
    match hand {
        Some(hand) if hand.community_cards.len() > MAX_COMMUNITY_CARDS => {
            Err(CodecError::InvalidPayload(format!(
                "{} community cards",
                hand.community_cards.len()
            )))
        }
        _ => Ok(()),
    }
}

fn check_hole_cards(cards: Option<&[Card]>) -> CodecResult<()> {
    match cards {
        Some(cards) if cards.len() > MAX_HOLE_CARDS => Err(CodecError::InvalidPayload(format!(
            "{} hole cards",
            cards.len()
        ))),
        _ => Ok(()),
    }
}

impl WireMessage for ServerMessage {
    fn kind(&self) -> MessageKind {
        match self {
            Self::ConnectionState(_) => MessageKind::ConnectionState,
            Self::TableSnapshot(_) => MessageKind::TableSnapshot,
            Self::TableStateUpdate(_) => MessageKind::TableStateUpdate,
            Self::TurnPrompt(_) => MessageKind::TurnPrompt,
            Self::ActionResult(_) => MessageKind::ActionResult,
            Self::ShowdownResult(_) => MessageKind::ShowdownResult,
            Self::Announcement(_) => MessageKind::Announcement,
            Self::HeartbeatPing(_) => MessageKind::HeartbeatPing,
            Self::HeartbeatPong(_) => MessageKind::HeartbeatPong,
        }
    }

    fn to_payload(&self) -> CodecResult<Value> {
        match self {
            Self::ConnectionState(payload) => payload_to(payload),
            Self::TableSnapshot(payload) => payload_to(payload),
            Self::TableStateUpdate(payload) => payload_to(payload),
            Self::TurnPrompt(payload) => payload_to(payload),
            Self::ActionResult(payload) => payload_to(payload),
            Self::ShowdownResult(payload) => payload_to(payload),
            Self::Announcement(payload) => payload_to(payload),
            Self::HeartbeatPing(payload) | Self::HeartbeatPong(payload) => payload_to(payload),
        }
    }

    fn from_parts(kind: MessageKind, payload: Value) -> CodecResult<Self> {
        let message = match kind {
            MessageKind::ConnectionState => Self::ConnectionState(payload_from(kind, payload)?),
            MessageKind::TableSnapshot => Self::TableSnapshot(payload_from(kind, payload)?),
            MessageKind::TableStateUpdate => Self::TableStateUpdate(payload_from(kind, payload)?),
            MessageKind::TurnPrompt => Self::TurnPrompt(payload_from(kind, payload)?),
            MessageKind::ActionResult => Self::ActionResult(payload_from(kind, payload)?),
            MessageKind::ShowdownResult => Self::ShowdownResult(payload_from(kind, payload)?),
            MessageKind::Announcement => Self::Announcement(payload_from(kind, payload)?),
            MessageKind::HeartbeatPing => Self::HeartbeatPing(payload_from(kind, payload)?),
            MessageKind::HeartbeatPong => Self::HeartbeatPong(payload_from(kind, payload)?),
            MessageKind::SubscribeTable
            | MessageKind::UnsubscribeTable
            | MessageKind::ActionRequest => {
                return Err(CodecError::UnknownType(kind.to_string()));
            }
        };
        message.validate()?;
        Ok(message)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match &self {
            Self::ConnectionState(payload) => format!("connection {}", payload.state),
            Self::TableSnapshot(snapshot) => format!("snapshot v{}", snapshot.version),
            Self::TableStateUpdate(update) => format!("update v{}", update.version),
            Self::TurnPrompt(prompt) => format!("seat {} to act", prompt.position),
            Self::ActionResult(result) if result.accepted => {
                format!("seat {} {}", result.position, result.action)
            }
            Self::ActionResult(result) => format!(
                "seat {} rejected: {}",
                result.position,
                result.reason.as_deref().unwrap_or("no reason given")
            ),
            Self::ShowdownResult(result) => format!("showdown for hand {}", result.hand_id),
            Self::Announcement(announcement) => announcement.text.clone(),
            Self::HeartbeatPing(_) => "ping".to_string(),
            Self::HeartbeatPong(_) => "pong".to_string(),
        };
        write!(f, "{repr}")
    }
}

/// A message from this client to the table server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientMessage {
    SubscribeTable { table_id: TableId },
    UnsubscribeTable { table_id: TableId },
    ActionRequest {
        table_id: TableId,
        hand_id: HandId,
        action: Action,
    },
    HeartbeatPing(Heartbeat),
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableRef {
    table_id: TableId,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionRequestPayload {
    table_id: TableId,
    hand_id: HandId,
    action: Action,
}

impl WireMessage for ClientMessage {
    fn kind(&self) -> MessageKind {
        match self {
            Self::SubscribeTable { .. } => MessageKind::SubscribeTable,
            Self::UnsubscribeTable { .. } => MessageKind::UnsubscribeTable,
            Self::ActionRequest { .. } => MessageKind::ActionRequest,
            Self::HeartbeatPing(_) => MessageKind::HeartbeatPing,
        }
    }

    fn to_payload(&self) -> CodecResult<Value> {
        match self {
            Self::SubscribeTable { table_id } | Self::UnsubscribeTable { table_id } => {
                payload_to(&TableRef {
                    table_id: *table_id,
                })
            }
            Self::ActionRequest {
                table_id,
                hand_id,
                action,
            } => payload_to(&ActionRequestPayload {
                table_id: *table_id,
                hand_id: *hand_id,
                action: action.clone(),
            }),
            Self::HeartbeatPing(heartbeat) => payload_to(heartbeat),
        }
    }

    fn from_parts(kind: MessageKind, payload: Value) -> CodecResult<Self> {
        let message = match kind {
            MessageKind::SubscribeTable => {
                let TableRef { table_id } = payload_from(kind, payload)?;
                Self::SubscribeTable { table_id }
            }
            MessageKind::UnsubscribeTable => {
                let TableRef { table_id } = payload_from(kind, payload)?;
                Self::UnsubscribeTable { table_id }
            }
            MessageKind::ActionRequest => {
                let ActionRequestPayload {
                    table_id,
                    hand_id,
                    action,
                } = payload_from(kind, payload)?;
                Self::ActionRequest {
                    table_id,
                    hand_id,
                    action,
                }
            }
            MessageKind::HeartbeatPing => Self::HeartbeatPing(payload_from(kind, payload)?),
            _ => return Err(CodecError::UnknownType(kind.to_string())),
        };
        Ok(message)
    }
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match &self {
            Self::SubscribeTable { table_id } => format!("subscribe to table {table_id}"),
            Self::UnsubscribeTable { table_id } => format!("unsubscribe from table {table_id}"),
            Self::ActionRequest { action, .. } => action.to_string(),
            Self::HeartbeatPing(heartbeat) => format!("ping #{}", heartbeat.seq),
        };
        write!(f, "{repr}")
    }
}
