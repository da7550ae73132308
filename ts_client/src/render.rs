//! Plain-text rendering of the table and of session events.

use std::fmt::Write;
use table_sync::{
    SessionEvent,
    entities::{Card, Seat, SeatStatus},
    hand::ShowdownEvent,
    table::TableStateReconciler,
};

/// Width of the table banner.
const WIDTH: usize = 60;

pub fn format_cards(cards: &[Card]) -> String {
    cards
        .iter()
        .map(|card| card.to_string().trim().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full table view from canonical state.
pub fn table_view(state: &TableStateReconciler) -> String {
    let mut out = String::new();
    let table = state.table();

    let _ = writeln!(out, "{}", "═".repeat(WIDTH));
    let _ = writeln!(
        out,
        "{} (table {}, v{})  blinds ${}/{}",
        if table.name.is_empty() { "Table" } else { table.name.as_str() },
        state.table_id(),
        state.version(),
        table.small_blind,
        table.big_blind
    );
    let _ = writeln!(out, "{}", "─".repeat(WIDTH));

    match state.hand() {
        Some(hand) => {
            let _ = write!(out, "Hand #{}  {}  pot ${}", hand.hand_id, hand.phase, hand.pot);
            if !hand.community_cards.is_empty() {
                let _ = write!(out, "  board {}", format_cards(&hand.community_cards));
            }
            let _ = writeln!(out);
        }
        None => {
            let _ = writeln!(out, "Waiting for the next hand");
        }
    }

    let my_position = state.my_position();
    for seat in state.seats() {
        if seat.status == SeatStatus::Empty && seat.occupant.is_none() {
            continue;
        }
        let _ = writeln!(out, "{}", seat_line(state, seat, my_position == Some(seat.position)));
    }

    if let Some(cards) = state.my_hole_cards()
        && !cards.is_empty()
    {
        let _ = writeln!(out, "Your cards: {}", format_cards(cards));
    }
    let _ = write!(out, "{}", "═".repeat(WIDTH));
    out
}

fn seat_line(state: &TableStateReconciler, seat: &Seat, is_me: bool) -> String {
    let name = seat
        .occupant
        .as_ref()
        .map_or("-", |player| player.as_str());

    let mut markers = Vec::new();
    if let Some(hand) = state.hand() {
        if seat.position == hand.dealer_position {
            markers.push("D");
        }
        if hand.small_blind_position == Some(seat.position) {
            markers.push("SB");
        }
        if hand.big_blind_position == Some(seat.position) {
            markers.push("BB");
        }
    }
    if is_me {
        markers.push("you");
    }

    let mut line = format!(
        "{} [{}] {:<12} ${:<7} {}",
        if state.acting_position() == Some(seat.position) { "→" } else { " " },
        seat.position,
        name,
        seat.stack,
        seat.status
    );
    if seat.current_bet_amount > 0 {
        let _ = write!(line, "  bet ${}", seat.current_bet_amount);
    }
    if let Some(action) = &seat.last_action {
        let _ = write!(line, "  ({action})");
    }
    if !markers.is_empty() {
        let _ = write!(line, "  {}", markers.join("/"));
    }
    line
}

/// One line describing `event`, or `None` for events that only mean the
/// table view should be redrawn.
pub fn event_line(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::Connection { state, attempt } if *attempt > 0 => {
            format!("Connection {state} (attempt {attempt})")
        }
        SessionEvent::Connection { state, .. } => format!("Connection {state}"),
        SessionEvent::TableUpdated { .. } => return None,
        SessionEvent::ResyncRequested => "Out of sync, requesting a fresh snapshot".to_string(),
        SessionEvent::HandStarted { hand_id } => format!("── Hand #{hand_id} ──"),
        SessionEvent::PhaseAdvanced { from, to, .. } => format!("{from} -> {to}"),
        SessionEvent::HandCleared { hand_id } => format!("Hand #{hand_id} over"),
        SessionEvent::YourTurn {
            allowed,
            call_amount,
            ..
        } if *call_amount > 0 => format!("Your turn, ${call_amount} to call. Allowed: {allowed}"),
        SessionEvent::YourTurn { allowed, .. } => format!("Your turn. Allowed: {allowed}"),
        SessionEvent::ActionAccepted { position, action } => format!("Seat {position} {action}"),
        SessionEvent::ActionRejected { action, reason } => format!(
            "Rejected ({action}): {}",
            reason.as_deref().unwrap_or("no reason given")
        ),
        SessionEvent::CardDealt(entry) => format!(
            "Card {} to seat {}",
            entry.card_slot_index + 1,
            entry.seat_position
        ),
        SessionEvent::DealComplete { .. } => "Cards are out".to_string(),
        SessionEvent::ChipsMoving(animation) => format!("Chips {animation}"),
        SessionEvent::PotUpdated(pot) => format!("Pot ${pot}"),
        SessionEvent::Showdown(event) => showdown_line(event),
        SessionEvent::Announcement(announcement) => format!("** {} **", announcement.text),
    };
    Some(line)
}

fn showdown_line(event: &ShowdownEvent) -> String {
    match event {
        ShowdownEvent::PhaseChanged { phase, .. } => format!("Showdown: {phase}"),
        ShowdownEvent::SeatRevealed {
            position,
            cards,
            description,
            ..
        } => match description {
            Some(description) => {
                format!("Seat {position} shows {} ({description})", format_cards(cards))
            }
            None => format!("Seat {position} shows {}", format_cards(cards)),
        },
        ShowdownEvent::WinnersAnnounced { winners, .. } => {
            let winners: Vec<String> = winners
                .iter()
                .map(|winner| format!("seat {} wins ${}", winner.position, winner.amount))
                .collect();
            format!("Winners: {}", winners.join(", "))
        }
        ShowdownEvent::Countdown { remaining, .. } => format!("Next hand in {remaining}s"),
        ShowdownEvent::Completed { .. } => "Next hand starting".to_string(),
    }
}

/// Prefix a line with the local wall-clock time.
pub fn timestamped(line: &str) -> String {
    format!("[{}] {line}", chrono::Local::now().format("%H:%M:%S"))
}
