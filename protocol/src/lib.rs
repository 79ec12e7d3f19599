use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ---- Avatars ----
///
/// The fixed roster of table characters. A seat holds `Undefined` until its
/// player picks one; every non-`Undefined` avatar is held by at most one seat
/// per room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Avatar {
    Angela,
    Brad,
    Carol,
    Derek,
    Rowan,
    Tony,
    Undefined,
}

impl Default for Avatar {
    fn default() -> Self {
        Avatar::Undefined
    }
}

impl Avatar {
    /// Selectable roster, in lobby display order.
    pub const CHOICES: [Avatar; 6] = [
        Avatar::Angela,
        Avatar::Brad,
        Avatar::Carol,
        Avatar::Derek,
        Avatar::Rowan,
        Avatar::Tony,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Avatar::Angela => "Angela",
            Avatar::Brad => "Brad",
            Avatar::Carol => "Carol",
            Avatar::Derek => "Derek",
            Avatar::Rowan => "Rowan",
            Avatar::Tony => "Tony",
            Avatar::Undefined => "Unknown",
        }
    }
}

impl fmt::Display for Avatar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// ---- Cards ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rank {
    Two = 2,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

impl Rank {
    pub const ALL: [Rank; 13] = [
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Ace,
    ];
}

/// One physical card. `id` is the card's position in the canonical 52-card
/// ordering (`suit * 13 + rank`), so it is unique within a deck and stable
/// across serialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub suit: Suit,
    pub rank: Rank,
    pub id: u8,
}

impl Card {
    pub fn new(suit: Suit, rank: Rank) -> Self {
        Card {
            suit,
            rank,
            id: suit as u8 * 13 + (rank as u8 - 2),
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = match self.rank {
            Rank::Ace => "A",
            Rank::King => "K",
            Rank::Queen => "Q",
            Rank::Jack => "J",
            Rank::Ten => "10",
            Rank::Nine => "9",
            Rank::Eight => "8",
            Rank::Seven => "7",
            Rank::Six => "6",
            Rank::Five => "5",
            Rank::Four => "4",
            Rank::Three => "3",
            Rank::Two => "2",
        };
        let s = match self.suit {
            Suit::Clubs => "♣",
            Suit::Diamonds => "♦",
            Suit::Hearts => "♥",
            Suit::Spades => "♠",
        };
        write!(f, "{}{}", r, s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub cards: Vec<Card>,
}

impl Deck {
    /// A full 52-card deck in uniformly random order. `shuffle` is a
    /// Fisher–Yates pass, so every permutation is equally likely.
    pub fn standard_shuffled() -> Self {
        let mut cards = Vec::with_capacity(52);
        for &s in &Suit::ALL {
            for &r in &Rank::ALL {
                cards.push(Card::new(s, r));
            }
        }
        cards.shuffle(&mut thread_rng());
        Deck { cards }
    }

    /// Split the deck into one hand of `52 / seat_count` cards per seat,
    /// contiguous blocks in seat order. The remainder for non-divisible seat
    /// counts is left undealt. `None` when `seat_count < 2`.
    pub fn deal(self, seat_count: usize) -> Option<Vec<Vec<Card>>> {
        if seat_count < 2 {
            return None;
        }
        let hand_size = self.cards.len() / seat_count;
        let mut hands = Vec::with_capacity(seat_count);
        for seat in 0..seat_count {
            hands.push(self.cards[seat * hand_size..(seat + 1) * hand_size].to_vec());
        }
        Some(hands)
    }
}

/// ---- Tricks ----
///
/// One card committed to the current trick by the seat at `seat`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Play {
    pub seat: usize,
    pub card: Card,
}

/// Winning play of a completed trick: the highest trump if any trump was
/// played, otherwise the highest card of the led suit. Returns the index into
/// `plays`; `None` only for an empty trick, which the room state machine
/// never produces.
pub fn resolve_trick(plays: &[Play], trump: Suit) -> Option<usize> {
    if plays.is_empty() {
        return None;
    }
    let lead = plays[0].card.suit;
    let mut best = 0usize;
    for i in 1..plays.len() {
        if beats(plays[i].card, plays[best].card, lead, trump) {
            best = i;
        }
    }
    Some(best)
}

/// Whether `challenger` outranks the current `best` play. `best` is always
/// either of the led suit or a trump.
fn beats(challenger: Card, best: Card, lead: Suit, trump: Suit) -> bool {
    if challenger.suit == best.suit {
        return challenger.rank > best.rank;
    }
    if challenger.suit == trump {
        return true;
    }
    if best.suit == trump {
        return false;
    }
    challenger.suit == lead
}

/// ---- Room snapshots ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Bidding,
    TrickPlay,
    RoundEnd,
    MatchOver,
}

/// Everything a seat is allowed to know about another seat. Hand contents
/// stay server-side; only `cards_count` crosses the wire here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicSeat {
    pub player_id: Uuid,
    pub seat: usize,
    pub avatar: Avatar,
    pub name: String,
    pub cards_count: usize,
    pub tricks_won: u32,
    pub bid: Option<i32>,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateHand {
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: String,
    pub phase: Phase,
    pub seats: Vec<PublicSeat>,
    pub current_trick: Vec<Play>,
    pub scoreboard: Vec<u32>,
    pub current_turn: usize,
    pub round_lead: usize,
    pub last_trick_winner: Option<usize>,
    pub match_winner: Option<usize>,
}

/// ---- Errors ----
///
/// Rejection kinds surfaced to the acting connection. `InvalidSeatCount` and
/// `EmptyTrick` are internal-consistency faults; clients should never see
/// them in correct operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    NotEnoughPlayers,
    AvatarTaken,
    NotYourTurn,
    AlreadyBid,
    CardNotInHand,
    MustFollowSuit,
    GameOver,
    GameInProgress,
    NotSeated,
    BadPhase,
    InvalidSeatCount,
    EmptyTrick,
    BadMessage,
}

/// ---- Wire messages ----
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientToServer {
    /// Join a room, or reconnect to the seat already bound to `player_id`.
    Join { room: String, player_id: Uuid },
    SelectAvatar { choice: Avatar },
    StartGame,
    SubmitBid { value: i32 },
    PlayCard { card: Card },
    GetState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerToClient {
    Hello {
        connection_id: Uuid,
    },
    Joined {
        snapshot: RoomSnapshot,
        your_seat: usize,
        your_hand: PrivateHand,
    },
    UpdateState {
        snapshot: RoomSnapshot,
    },
    YourHand {
        hand: PrivateHand,
    },
    Info {
        message: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}
