//! Integration tests for a table session following one hand end to end.

use table_sync::{
    ActionError, ClientMessage, ConnectionState, Envelope, PresentationConfig, ServerMessage,
    SessionEvent, TableSession,
    entities::{
        Action, ActionChoice, Card, Hand, Phase, PlayerId, Seat, SeatStatus, Suit, TableInfo,
    },
    hand::ShowdownEvent,
    net::messages::{
        ConnectionStatePayload, Reveal, ShowdownResult, StateChanges, TableSnapshot,
        TableStateUpdate, TurnPrompt, WinnerEntry,
    },
    presentation::ChipEndpoint,
    scheduler::Millis,
};
use tokio::sync::mpsc::UnboundedReceiver;

const TABLE: i64 = 1;

fn session() -> (TableSession, UnboundedReceiver<SessionEvent>) {
    TableSession::new(TABLE, Some(PlayerId::new("carol")), PresentationConfig::default())
}

fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

fn run_until(session: &mut TableSession, end: Millis) {
    while let Some(deadline) = session.next_deadline() {
        if deadline > end {
            break;
        }
        session.on_timer(deadline);
    }
}

fn deliver(session: &mut TableSession, now: Millis, message: ServerMessage) -> Vec<ClientMessage> {
    session.handle(now, &Envelope::new(message))
}

fn seat(position: usize, name: &str, bet: u64) -> Seat {
    Seat {
        position,
        occupant: Some(PlayerId::new(name)),
        stack: 1000 - bet,
        current_bet_amount: bet,
        status: SeatStatus::Active,
        ..Default::default()
    }
}

fn hand(hand_id: u64, phase: Phase, acting: Option<usize>, pot: u64) -> Hand {
    Hand {
        hand_id,
        phase,
        pot,
        acting_position: acting,
        dealer_position: 4,
        small_blind_position: Some(0),
        big_blind_position: Some(2),
        ..Default::default()
    }
}

fn snapshot(version: u64, hand: Hand, seats: Vec<Seat>) -> ServerMessage {
    ServerMessage::TableSnapshot(TableSnapshot {
        table_id: TABLE,
        version,
        table: TableInfo {
            name: "Main".to_string(),
            max_seats: 6,
            small_blind: 5,
            big_blind: 10,
        },
        seats,
        hand: Some(hand),
        my_position: None,
        my_hole_cards: Some(vec![Card(14, Suit::Spade), Card(13, Suit::Spade)]),
    })
}

fn update(version: u64, changes: StateChanges) -> ServerMessage {
    ServerMessage::TableStateUpdate(TableStateUpdate {
        table_id: TABLE,
        version,
        changes,
    })
}

fn connected() -> ServerMessage {
    ServerMessage::ConnectionState(ConnectionStatePayload {
        state: ConnectionState::Connected,
        attempt: 0,
    })
}

fn blinds_posted() -> ServerMessage {
    snapshot(
        1,
        hand(1, Phase::Preflop, Some(4), 0),
        vec![seat(0, "alice", 5), seat(2, "bob", 10), seat(4, "carol", 0)],
    )
}

fn call_prompt() -> ServerMessage {
    ServerMessage::TurnPrompt(TurnPrompt {
        table_id: TABLE,
        hand_id: 1,
        position: 4,
        allowed_actions: [
            ActionChoice::Fold,
            ActionChoice::Call(10),
            ActionChoice::Raise(20),
        ]
        .into(),
        call_amount: 10,
        min_raise: 20,
        ..Default::default()
    })
}

fn action_result_frame(request_id: &str, accepted: bool) -> String {
    format!(
        r#"{{"type":"action-result","sentAt":0,"traceId":"t","requestId":"{request_id}","payload":{{"tableId":{TABLE},"position":4,"action":"call","accepted":{accepted},"reason":{reason}}},"schemaVersion":1}}"#,
        reason = if accepted { "null" } else { r#""out of turn""# }
    )
}

#[test]
fn test_connect_subscribes() {
    let (mut session, mut events) = session();
    let outbound = deliver(&mut session, 0, connected());

    assert_eq!(outbound, vec![ClientMessage::SubscribeTable { table_id: TABLE }]);
    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Connection {
            state: ConnectionState::Connected,
            attempt: 0
        }]
    );
}

#[test]
fn test_new_hand_deals_from_small_blind() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    run_until(&mut session, 10_000);

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::HandStarted { hand_id: 1 }));

    let dealt: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::CardDealt(entry) => Some((entry.seat_position, entry.card_slot_index)),
            _ => None,
        })
        .collect();
    assert_eq!(dealt, vec![(0, 0), (2, 0), (4, 0), (0, 1), (2, 1), (4, 1)]);
    assert_eq!(
        events.last(),
        Some(&SessionEvent::DealComplete { hand_id: 1 })
    );
}

#[test]
fn test_turn_prompt_and_action_round_trip() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    assert_eq!(
        session.request_action(Action::Call).unwrap_err(),
        ActionError::NotYourTurn
    );

    deliver(&mut session, 10, call_prompt());
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::YourTurn { call_amount: 10, .. })));

    assert!(matches!(
        session.request_action(Action::Check),
        Err(ActionError::NotAllowed { .. })
    ));

    let request = session.request_action(Action::Call).unwrap();
    let request_id = request.request_id().unwrap().to_string();
    assert_eq!(session.pending_actions(), 1);
    assert_eq!(
        *request.message(),
        ClientMessage::ActionRequest {
            table_id: TABLE,
            hand_id: 1,
            action: Action::Call
        }
    );

    let result = Envelope::<ServerMessage>::decode(&action_result_frame(&request_id, true)).unwrap();
    session.handle(20, &result);

    assert_eq!(session.pending_actions(), 0);
    assert!(session.state().allowed_actions().is_none());
    assert!(drain(&mut events).contains(&SessionEvent::ActionAccepted {
        position: 4,
        action: Action::Call
    }));
}

#[test]
fn test_rejected_action_is_reported() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    deliver(&mut session, 10, call_prompt());
    let request = session.request_action(Action::Fold).unwrap();
    drain(&mut events);

    let frame = action_result_frame(request.request_id().unwrap(), false);
    session.handle(20, &Envelope::decode(&frame).unwrap());

    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::ActionRejected {
            action: Action::Fold,
            reason: Some("out of turn".to_string())
        }]
    );
    assert!(session.state().allowed_actions().is_some());
}

#[test]
fn test_street_change_collects_bets_into_pot() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    deliver(
        &mut session,
        100,
        update(
            2,
            StateChanges {
                seats: Some(vec![seat(0, "alice", 10), seat(2, "bob", 10), seat(4, "carol", 10)]),
                ..Default::default()
            },
        ),
    );
    run_until(&mut session, 2000);
    drain(&mut events);

    deliver(
        &mut session,
        2000,
        update(
            3,
            StateChanges {
                seats: Some(vec![seat(0, "alice", 0), seat(2, "bob", 0), seat(4, "carol", 0)]),
                hand: Some(Some(hand(1, Phase::Flop, Some(0), 30))),
                ..Default::default()
            },
        ),
    );

    let moving: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::ChipsMoving(animation) => Some(animation),
            _ => None,
        })
        .collect();
    assert_eq!(moving.len(), 3);
    assert!(moving.iter().all(|a| a.destination == ChipEndpoint::Pot));

    run_until(&mut session, 2500);
    assert!(drain(&mut events).contains(&SessionEvent::PotUpdated(30)));
    assert_eq!(session.chips().pot(), 30);
}

#[test]
fn test_back_to_back_streets_settle_in_order() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    let bets = |amounts: [u64; 3]| {
        vec![
            seat(0, "alice", amounts[0]),
            seat(2, "bob", amounts[1]),
            seat(4, "carol", amounts[2]),
        ]
    };
    let street = |version: u64, seats: Vec<Seat>, phase: Option<Phase>| {
        update(
            version,
            StateChanges {
                seats: Some(seats),
                hand: phase.map(|phase| Some(hand(1, phase, Some(0), 0))),
                ..Default::default()
            },
        )
    };

    deliver(&mut session, 0, street(2, bets([10, 10, 10]), None));
    deliver(&mut session, 1000, street(3, bets([0, 0, 0]), Some(Phase::Flop)));
    deliver(&mut session, 1100, street(4, bets([20, 20, 0]), None));
    deliver(&mut session, 1400, street(5, bets([0, 0, 0]), Some(Phase::Turn)));
    drain(&mut events);

    // The flop sweep was overtaken; its completion must not settle the turn.
    run_until(&mut session, 1899);
    assert_eq!(session.chips().collecting().len(), 2);
    assert_eq!(session.chips().pot(), 30);
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::PotUpdated(_))));

    run_until(&mut session, 1900);
    assert!(drain(&mut events).contains(&SessionEvent::PotUpdated(70)));
    assert!(session.chips().collecting().is_empty());
}

#[test]
fn test_redelivered_showdown_keeps_payout_pace() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    run_until(&mut session, 5000);

    let showdown = ShowdownResult {
        table_id: TABLE,
        hand_id: 1,
        winners: vec![
            WinnerEntry { position: 4, amount: 60 },
            WinnerEntry { position: 0, amount: 40 },
        ],
        next_hand_delay: 5000,
        ..Default::default()
    };
    deliver(&mut session, 5000, ServerMessage::ShowdownResult(showdown.clone()));
    drain(&mut events);

    deliver(&mut session, 5300, ServerMessage::ShowdownResult(showdown));
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, SessionEvent::ChipsMoving(_))));

    let destination = |session: &TableSession| {
        session.chips().distributing().map(|payout| payout.destination)
    };
    run_until(&mut session, 5499);
    assert_eq!(destination(&session), Some(ChipEndpoint::Seat(4)));
    run_until(&mut session, 5999);
    assert_eq!(destination(&session), Some(ChipEndpoint::Seat(0)));
    assert_eq!(session.chips().pot(), 40);

    run_until(&mut session, 6000);
    assert_eq!(destination(&session), None);
    assert!(drain(&mut events).contains(&SessionEvent::PotUpdated(0)));
}

#[test]
fn test_showdown_pays_winners_one_at_a_time() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    run_until(&mut session, 5000);
    drain(&mut events);

    let showdown = ShowdownResult {
        table_id: TABLE,
        hand_id: 1,
        reveals: vec![Reveal {
            position: 4,
            cards: vec![Card(14, Suit::Spade), Card(13, Suit::Spade)],
            description: Some("ace high".to_string()),
        }],
        winners: vec![
            WinnerEntry { position: 4, amount: 20 },
            WinnerEntry { position: 0, amount: 10 },
        ],
        next_hand_delay: 5000,
    };
    deliver(&mut session, 5000, ServerMessage::ShowdownResult(showdown));

    let first: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::ChipsMoving(animation) => Some(animation.destination),
            _ => None,
        })
        .collect();
    assert_eq!(first, vec![ChipEndpoint::Seat(4)]);

    run_until(&mut session, 20_000);
    let rest = drain(&mut events);
    let payouts: Vec<_> = rest
        .iter()
        .filter_map(|event| match event {
            SessionEvent::ChipsMoving(animation) => Some(animation.destination),
            _ => None,
        })
        .collect();
    assert_eq!(payouts, vec![ChipEndpoint::Seat(0)]);
    assert!(rest.contains(&SessionEvent::PotUpdated(0)));

    let completions = rest
        .iter()
        .filter(|event| matches!(event, SessionEvent::Showdown(ShowdownEvent::Completed { .. })))
        .count();
    assert_eq!(completions, 1);
}

#[test]
fn test_new_hand_mid_showdown_cancels_presentation() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    run_until(&mut session, 5000);

    let showdown = ShowdownResult {
        table_id: TABLE,
        hand_id: 1,
        winners: vec![WinnerEntry { position: 2, amount: 15 }],
        next_hand_delay: 5000,
        ..Default::default()
    };
    deliver(&mut session, 5000, ServerMessage::ShowdownResult(showdown));
    run_until(&mut session, 6200);
    assert!(session.showdown().is_active());

    deliver(
        &mut session,
        6200,
        update(
            2,
            StateChanges {
                hand: Some(Some(hand(2, Phase::Preflop, Some(2), 0))),
                ..Default::default()
            },
        ),
    );
    assert!(!session.showdown().is_active());
    assert!(session.chips().is_idle());
    drain(&mut events);

    run_until(&mut session, 60_000);
    let after = drain(&mut events);
    assert!(!after.iter().any(|event| matches!(event, SessionEvent::Showdown(_))));
    assert!(!after.iter().any(|event| matches!(event, SessionEvent::PotUpdated(_))));
    assert!(after.contains(&SessionEvent::DealComplete { hand_id: 2 }));
}

#[test]
fn test_update_before_snapshot_requests_resync_once() {
    let (mut session, mut events) = session();
    let first = deliver(&mut session, 0, update(5, StateChanges::default()));
    let second = deliver(&mut session, 1, update(6, StateChanges::default()));

    assert_eq!(first, vec![ClientMessage::SubscribeTable { table_id: TABLE }]);
    assert!(second.is_empty());
    assert_eq!(drain(&mut events), vec![SessionEvent::ResyncRequested]);

    deliver(&mut session, 2, blinds_posted());
    assert!(session.state().has_snapshot());
}

#[test]
fn test_reconnect_requires_fresh_snapshot() {
    let (mut session, _events) = session();
    deliver(&mut session, 0, blinds_posted());

    let outbound = deliver(&mut session, 100, connected());
    assert_eq!(outbound.len(), 1);
    assert!(!session.state().has_snapshot());

    deliver(&mut session, 200, update(9, StateChanges::default()));
    assert_eq!(session.state().version(), 1);
}

#[test]
fn test_leaving_stops_resubscribing() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    assert_eq!(
        session.leave(),
        ClientMessage::UnsubscribeTable { table_id: TABLE }
    );
    assert!(session.has_left());
    assert!(!session.dealing().is_playing());
    drain(&mut events);

    assert!(deliver(&mut session, 100, connected()).is_empty());
    assert!(deliver(&mut session, 200, update(9, StateChanges::default())).is_empty());
    deliver(&mut session, 300, blinds_posted());

    assert_eq!(
        drain(&mut events),
        vec![SessionEvent::Connection {
            state: ConnectionState::Connected,
            attempt: 0
        }]
    );
    assert!(!session.state().has_snapshot());
}

#[test]
fn test_stale_and_foreign_messages_change_nothing() {
    let (mut session, mut events) = session();
    deliver(&mut session, 0, blinds_posted());
    deliver(&mut session, 0, update(2, StateChanges::default()));
    drain(&mut events);

    deliver(&mut session, 10, update(2, StateChanges::default()));
    deliver(&mut session, 10, update(1, StateChanges::default()));
    deliver(
        &mut session,
        10,
        ServerMessage::TableStateUpdate(TableStateUpdate {
            table_id: TABLE + 1,
            version: 50,
            changes: StateChanges::default(),
        }),
    );

    assert!(drain(&mut events).is_empty());
    assert_eq!(session.state().version(), 2);
}

#[test]
fn test_my_turn_derived_from_seat_occupant() {
    let (mut session, _events) = session();
    deliver(&mut session, 0, blinds_posted());
    assert_eq!(session.state().my_position(), Some(4));
    assert!(session.state().is_my_turn());

    deliver(
        &mut session,
        10,
        update(
            2,
            StateChanges {
                hand: Some(Some(hand(1, Phase::Preflop, Some(0), 0))),
                ..Default::default()
            },
        ),
    );
    assert!(!session.state().is_my_turn());
}
