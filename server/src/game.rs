use ruffhouse_protocol::*;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};
use uuid::Uuid;

// ==== knobs ====
pub const MIN_PLAYERS: usize = 2; // seats with avatars needed to start
pub const FOLLOW_SUIT: bool = true; // must follow the led suit when able?
pub const WIN_THRESHOLD: u32 = 5; // unique top score that ends the match
pub const TRUMP_SUIT: Suit = Suit::Hearts;

pub type Tx = UnboundedSender<ServerToClient>;

/// A player's durable slot in the room. Created the first time a persistent
/// id joins and kept for the room's lifetime; `connection_id` and `tx` are
/// rebound on every reconnect, everything else survives disconnects.
pub struct Seat {
    pub player_id: Uuid,
    pub connection_id: Option<Uuid>,
    pub avatar: Avatar,
    pub hand: Vec<Card>,
    pub tricks_won: u32,
    pub bid: Option<i32>,
    pub connected: bool,
    pub tx: Option<Tx>,
}

/// One independent game instance. Seat index is the fixed turn order.
/// `round_lead` anchors the deal rotation across rounds; the per-trick
/// leader is whatever `current_turn` points at when a trick opens.
pub struct Room {
    pub name: String,
    pub phase: Phase,
    pub seats: Vec<Seat>,
    pub current_trick: Vec<Play>,
    pub scoreboard: Vec<u32>,
    pub current_turn: usize,
    pub round_lead: usize,
    pub last_trick_winner: Option<usize>,
    pub match_winner: Option<usize>,
}

impl Room {
    pub fn new(name: String) -> Self {
        Room {
            name,
            phase: Phase::Lobby,
            seats: Vec::new(),
            current_trick: Vec::new(),
            scoreboard: Vec::new(),
            current_turn: 0,
            round_lead: 0,
            last_trick_winner: None,
            match_winner: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error("need at least 2 players with avatars to start")]
    NotEnoughPlayers,
    #[error("that avatar is already taken")]
    AvatarTaken,
    #[error("not your turn")]
    NotYourTurn,
    #[error("you have already bid this round")]
    AlreadyBid,
    #[error("that card is not in your hand")]
    CardNotInHand,
    #[error("you must follow the led suit")]
    MustFollowSuit,
    #[error("the match is over")]
    GameOver,
    #[error("a match is already in progress")]
    GameInProgress,
    #[error("you are not seated in this room")]
    NotSeated,
    #[error("cannot do that during {0:?}")]
    BadPhase(Phase),
    #[error("cannot deal to {0} seats")]
    InvalidSeatCount(usize),
    #[error("trick resolved with no plays")]
    EmptyTrick,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::NotEnoughPlayers => ErrorKind::NotEnoughPlayers,
            GameError::AvatarTaken => ErrorKind::AvatarTaken,
            GameError::NotYourTurn => ErrorKind::NotYourTurn,
            GameError::AlreadyBid => ErrorKind::AlreadyBid,
            GameError::CardNotInHand => ErrorKind::CardNotInHand,
            GameError::MustFollowSuit => ErrorKind::MustFollowSuit,
            GameError::GameOver => ErrorKind::GameOver,
            GameError::GameInProgress => ErrorKind::GameInProgress,
            GameError::NotSeated => ErrorKind::NotSeated,
            GameError::BadPhase(_) => ErrorKind::BadPhase,
            GameError::InvalidSeatCount(_) => ErrorKind::InvalidSeatCount,
            GameError::EmptyTrick => ErrorKind::EmptyTrick,
        }
    }
}

pub fn seat_of(r: &Room, connection_id: Uuid) -> Option<usize> {
    r.seats
        .iter()
        .position(|s| s.connection_id == Some(connection_id))
}

pub fn seat_of_player(r: &Room, player_id: Uuid) -> Option<usize> {
    r.seats.iter().position(|s| s.player_id == player_id)
}

/// Bind `player_id` to a seat. A known persistent id rebinds its live
/// connection (idempotent; safe on transport reconnect). An unknown id gets
/// a fresh seat appended in the lobby; once a round is live the roster is
/// closed and only reconnects are accepted.
pub fn join_or_reconnect(
    r: &mut Room,
    player_id: Uuid,
    connection_id: Uuid,
    tx: Option<Tx>,
) -> Result<usize, GameError> {
    let seat = match seat_of_player(r, player_id) {
        Some(seat) => {
            let s = &mut r.seats[seat];
            s.connection_id = Some(connection_id);
            s.connected = true;
            s.tx = tx;
            info!("[JOIN] room={} seat={} reconnected", r.name, seat);
            send_info_except(r, seat, &format!("{} reconnected", r.seats[seat].avatar));
            seat
        }
        None => {
            if r.phase != Phase::Lobby {
                return Err(GameError::GameInProgress);
            }
            let seat = r.seats.len();
            r.seats.push(Seat {
                player_id,
                connection_id: Some(connection_id),
                avatar: Avatar::Undefined,
                hand: Vec::new(),
                tricks_won: 0,
                bid: None,
                connected: true,
                tx,
            });
            r.scoreboard.push(0);
            info!("[JOIN] room={} seat={} joined", r.name, seat);
            seat
        }
    };

    broadcast_state(r);
    if let Some(tx) = &r.seats[seat].tx {
        let _ = tx.send(ServerToClient::Joined {
            snapshot: public_room(r),
            your_seat: seat,
            your_hand: private_hand(&r.seats[seat]),
        });
    }
    Ok(seat)
}

/// Transport-level drop. The seat, its hand, bid and tricks are retained so
/// the player can reconnect; only the routing handle is severed.
pub fn mark_disconnected(r: &mut Room, connection_id: Uuid) -> Option<usize> {
    let seat = seat_of(r, connection_id)?;
    {
        let s = &mut r.seats[seat];
        s.connected = false;
        s.connection_id = None;
        s.tx = None;
    }
    info!("[DROP] room={} seat={} disconnected", r.name, seat);
    send_info_except(r, seat, &format!("{} disconnected", r.seats[seat].avatar));
    broadcast_state(r);
    Some(seat)
}

pub fn select_avatar(r: &mut Room, connection_id: Uuid, choice: Avatar) -> Result<(), GameError> {
    let seat = seat_of(r, connection_id).ok_or(GameError::NotSeated)?;
    if choice != Avatar::Undefined
        && r.seats
            .iter()
            .enumerate()
            .any(|(i, s)| i != seat && s.avatar == choice)
    {
        return Err(GameError::AvatarTaken);
    }
    r.seats[seat].avatar = choice;
    debug!("[AVATAR] room={} seat={} -> {}", r.name, seat, choice);
    broadcast_state(r);
    Ok(())
}

/// Lobby -> Bidding. Requires at least `MIN_PLAYERS` seats that have picked
/// an avatar; deals a fresh round to every seat with seat 0 leading.
pub fn start_game(r: &mut Room, connection_id: Uuid) -> Result<(), GameError> {
    seat_of(r, connection_id).ok_or(GameError::NotSeated)?;
    if r.phase != Phase::Lobby {
        return Err(GameError::BadPhase(r.phase));
    }
    let ready = r
        .seats
        .iter()
        .filter(|s| s.avatar != Avatar::Undefined)
        .count();
    if ready < MIN_PLAYERS {
        return Err(GameError::NotEnoughPlayers);
    }
    r.round_lead = 0;
    deal_round(r)
}

/// Build, shuffle and distribute a fresh deck; reset per-round seat state;
/// open bidding at the round lead.
fn deal_round(r: &mut Room) -> Result<(), GameError> {
    let n = r.seats.len();
    let hands = match Deck::standard_shuffled().deal(n) {
        Some(hands) => hands,
        None => {
            error!("[DEAL] room={} invalid seat count {}", r.name, n);
            return Err(GameError::InvalidSeatCount(n));
        }
    };
    for (seat, hand) in r.seats.iter_mut().zip(hands) {
        seat.hand = hand;
        seat.tricks_won = 0;
        seat.bid = None;
    }
    r.current_trick.clear();
    r.last_trick_winner = None;
    r.current_turn = r.round_lead;
    r.phase = Phase::Bidding;
    info!(
        "[DEAL] room={} seats={} hand_size={} lead={}",
        r.name,
        n,
        52 / n,
        r.round_lead
    );
    for seat in 0..n {
        send_hand_to(r, seat);
    }
    broadcast_state(r);
    Ok(())
}

/// Record the acting seat's bid. Any integer is accepted; the turn walks
/// cyclically to the next unset bid, and when none remain trick play opens
/// at the round lead.
pub fn submit_bid(r: &mut Room, connection_id: Uuid, value: i32) -> Result<(), GameError> {
    let seat = seat_of(r, connection_id).ok_or(GameError::NotSeated)?;
    match r.phase {
        Phase::Bidding => {}
        Phase::MatchOver => return Err(GameError::GameOver),
        phase => return Err(GameError::BadPhase(phase)),
    }
    if seat != r.current_turn {
        return Err(GameError::NotYourTurn);
    }
    if r.seats[seat].bid.is_some() {
        return Err(GameError::AlreadyBid);
    }

    r.seats[seat].bid = Some(value);
    debug!("[BID] room={} seat={} bid={}", r.name, seat, value);

    let n = r.seats.len();
    let next = (1..n)
        .map(|step| (seat + step) % n)
        .find(|&i| r.seats[i].bid.is_none());
    match next {
        Some(i) => r.current_turn = i,
        None => {
            r.current_turn = r.round_lead;
            r.phase = Phase::TrickPlay;
            info!("[BID] room={} complete, trick play opens", r.name);
        }
    }
    broadcast_state(r);
    Ok(())
}

/// Play a card from the acting seat's hand into the current trick. All
/// preconditions are checked before any state is touched, so a rejection is
/// a strict no-op.
pub fn play_card(r: &mut Room, connection_id: Uuid, card: Card) -> Result<(), GameError> {
    let seat = seat_of(r, connection_id).ok_or(GameError::NotSeated)?;
    match r.phase {
        Phase::TrickPlay => {}
        Phase::MatchOver => return Err(GameError::GameOver),
        phase => return Err(GameError::BadPhase(phase)),
    }
    if seat != r.current_turn {
        return Err(GameError::NotYourTurn);
    }
    let pos = r.seats[seat]
        .hand
        .iter()
        .position(|c| c.id == card.id)
        .ok_or(GameError::CardNotInHand)?;
    if FOLLOW_SUIT {
        if let Some(lead) = r.current_trick.first().map(|p| p.card.suit) {
            let played = r.seats[seat].hand[pos];
            if played.suit != lead && r.seats[seat].hand.iter().any(|c| c.suit == lead) {
                return Err(GameError::MustFollowSuit);
            }
        }
    }

    let played = r.seats[seat].hand.remove(pos);
    r.current_trick.push(Play { seat, card: played });
    r.current_turn = (seat + 1) % r.seats.len();
    debug!("[PLAY] room={} seat={} card={}", r.name, seat, played);
    send_hand_to(r, seat);

    if r.current_trick.len() == r.seats.len() {
        let widx = match resolve_trick(&r.current_trick, TRUMP_SUIT) {
            Some(widx) => widx,
            None => {
                error!("[TRICK] room={} resolved an empty trick", r.name);
                return Err(GameError::EmptyTrick);
            }
        };
        let winner = r.current_trick[widx].seat;
        r.seats[winner].tricks_won += 1;
        r.last_trick_winner = Some(winner);
        r.current_trick.clear();
        r.current_turn = winner;
        info!(
            "[TRICK] room={} winner_seat={} tricks={}",
            r.name, winner, r.seats[winner].tricks_won
        );
        if r.seats.iter().all(|s| s.hand.is_empty()) {
            return finish_round(r);
        }
    }
    broadcast_state(r);
    Ok(())
}

/// Round scoring and either match termination or the next deal. Every seat
/// tied on the most tricks scores a point; the match ends only on a unique
/// leader at `WIN_THRESHOLD` or better.
fn finish_round(r: &mut Room) -> Result<(), GameError> {
    let max_tricks = r.seats.iter().map(|s| s.tricks_won).max().unwrap_or(0);
    for (i, seat) in r.seats.iter().enumerate() {
        if seat.tricks_won == max_tricks {
            r.scoreboard[i] += 1;
        }
    }
    r.phase = Phase::RoundEnd;
    info!(
        "[ROUND] room={} max_tricks={} scoreboard={:?}",
        r.name, max_tricks, r.scoreboard
    );
    broadcast_state(r);

    let max_score = r.scoreboard.iter().copied().max().unwrap_or(0);
    let mut leaders = r
        .scoreboard
        .iter()
        .enumerate()
        .filter(|(_, &score)| score == max_score);
    let front = leaders.next().map(|(i, _)| i);
    let unique = leaders.next().is_none();

    if let (Some(winner), true) = (front, unique && max_score >= WIN_THRESHOLD) {
        r.match_winner = Some(winner);
        r.phase = Phase::MatchOver;
        info!(
            "[MATCH] room={} winner_seat={} score={}",
            r.name, winner, max_score
        );
        send_info(
            r,
            &format!("{} wins the match", r.seats[winner].avatar),
        );
        broadcast_state(r);
        return Ok(());
    }

    r.round_lead = (r.round_lead + 1) % r.seats.len();
    deal_round(r)
}

/// Resend the current snapshot (and the requester's own hand) without
/// mutating anything; used by late joiners and reconnecting clients.
pub fn get_state(r: &Room, connection_id: Uuid) -> Result<(), GameError> {
    let seat = seat_of(r, connection_id).ok_or(GameError::NotSeated)?;
    if let Some(tx) = &r.seats[seat].tx {
        let _ = tx.send(ServerToClient::UpdateState {
            snapshot: public_room(r),
        });
        let _ = tx.send(ServerToClient::YourHand {
            hand: private_hand(&r.seats[seat]),
        });
    }
    Ok(())
}

/// ---- snapshots & delivery ----

/// The public view: hand sizes only, never hand contents.
pub fn public_room(r: &Room) -> RoomSnapshot {
    RoomSnapshot {
        room: r.name.clone(),
        phase: r.phase,
        seats: r
            .seats
            .iter()
            .enumerate()
            .map(|(i, s)| PublicSeat {
                player_id: s.player_id,
                seat: i,
                avatar: s.avatar,
                name: s.avatar.display_name().to_string(),
                cards_count: s.hand.len(),
                tricks_won: s.tricks_won,
                bid: s.bid,
                connected: s.connected,
            })
            .collect(),
        current_trick: r.current_trick.clone(),
        scoreboard: r.scoreboard.clone(),
        current_turn: r.current_turn,
        round_lead: r.round_lead,
        last_trick_winner: r.last_trick_winner,
        match_winner: r.match_winner,
    }
}

fn private_hand(seat: &Seat) -> PrivateHand {
    PrivateHand {
        cards: seat.hand.clone(),
    }
}

pub fn broadcast_state(r: &Room) {
    let snapshot = public_room(r);
    for s in r.seats.iter() {
        if let Some(tx) = &s.tx {
            let _ = tx.send(ServerToClient::UpdateState {
                snapshot: snapshot.clone(),
            });
        }
    }
}

fn send_hand_to(r: &Room, seat: usize) {
    if let Some(tx) = &r.seats[seat].tx {
        let _ = tx.send(ServerToClient::YourHand {
            hand: private_hand(&r.seats[seat]),
        });
    }
}

fn send_info(r: &Room, message: &str) {
    for s in r.seats.iter() {
        if let Some(tx) = &s.tx {
            let _ = tx.send(ServerToClient::Info {
                message: message.to_string(),
            });
        }
    }
}

fn send_info_except(r: &Room, except: usize, message: &str) {
    for (i, s) in r.seats.iter().enumerate() {
        if i == except {
            continue;
        }
        if let Some(tx) = &s.tx {
            let _ = tx.send(ServerToClient::Info {
                message: message.to_string(),
            });
        }
    }
}
