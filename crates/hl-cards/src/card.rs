use hl_core::Arbitrary;

/// Card rank, Two through Ace.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Rank {
    Two = 0,
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
    pub const fn all() -> [Self; 13] {
        [
            Self::Two,
            Self::Three,
            Self::Four,
            Self::Five,
            Self::Six,
            Self::Seven,
            Self::Eight,
            Self::Nine,
            Self::Ten,
            Self::Jack,
            Self::Queen,
            Self::King,
            Self::Ace,
        ]
    }
}

impl From<u8> for Rank {
    fn from(n: u8) -> Self {
        debug_assert!(n < 13);
        Self::all()[n as usize]
    }
}
impl From<Rank> for u8 {
    fn from(r: Rank) -> Self {
        r as u8
    }
}

impl TryFrom<char> for Rank {
    type Error = anyhow::Error;
    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            '2' => Ok(Self::Two),
            '3' => Ok(Self::Three),
            '4' => Ok(Self::Four),
            '5' => Ok(Self::Five),
            '6' => Ok(Self::Six),
            '7' => Ok(Self::Seven),
            '8' => Ok(Self::Eight),
            '9' => Ok(Self::Nine),
            'T' => Ok(Self::Ten),
            'J' => Ok(Self::Jack),
            'Q' => Ok(Self::Queen),
            'K' => Ok(Self::King),
            'A' => Ok(Self::Ace),
            other => Err(anyhow::anyhow!("invalid rank '{}'", other)),
        }
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", "23456789TJQKA".as_bytes()[*self as usize] as char)
    }
}

/// Card suit. Display is the lowercase letter used in upstream card strings.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Suit {
    Club = 0,
    Diamond,
    Heart,
    Spade,
}

impl From<u8> for Suit {
    fn from(n: u8) -> Self {
        match n % 4 {
            0 => Self::Club,
            1 => Self::Diamond,
            2 => Self::Heart,
            _ => Self::Spade,
        }
    }
}
impl From<Suit> for u8 {
    fn from(s: Suit) -> Self {
        s as u8
    }
}

impl TryFrom<char> for Suit {
    type Error = anyhow::Error;
    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_lowercase() {
            'c' => Ok(Self::Club),
            'd' => Ok(Self::Diamond),
            'h' => Ok(Self::Heart),
            's' => Ok(Self::Spade),
            other => Err(anyhow::anyhow!("invalid suit '{}'", other)),
        }
    }
}

impl std::fmt::Display for Suit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", "cdhs".as_bytes()[*self as usize] as char)
    }
}

/// A playing card encoded as a single byte, `rank * 4 + suit`.
///
/// The 52 cards map bijectively onto `0..52`, sorted first by rank and then
/// by suit. Parsed from two-character strings like `"As"` or `"Tc"`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Card(u8);

impl Card {
    pub fn rank(&self) -> Rank {
        Rank::from(self.0 / 4)
    }
    pub fn suit(&self) -> Suit {
        Suit::from(self.0 % 4)
    }
}

impl From<(Rank, Suit)> for Card {
    fn from((r, s): (Rank, Suit)) -> Self {
        Self(u8::from(r) * 4 + u8::from(s))
    }
}
impl From<Card> for u8 {
    fn from(c: Card) -> Self {
        c.0
    }
}
impl From<u8> for Card {
    fn from(n: u8) -> Self {
        debug_assert!(n < 52);
        Self(n)
    }
}

/// Single-bit representation for set membership in [`Hand`](super::Hand).
impl From<Card> for u64 {
    fn from(c: Card) -> Self {
        1 << c.0
    }
}

impl TryFrom<&str> for Card {
    type Error = anyhow::Error;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(r), Some(q), None) => Ok(Self::from((Rank::try_from(r)?, Suit::try_from(q)?))),
            _ => Err(anyhow::anyhow!("card must be 2 characters: '{}'", s)),
        }
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", self.rank(), self.suit())
    }
}

impl Arbitrary for Card {
    fn random() -> Self {
        use rand::Rng;
        Self(rand::rng().random_range(0..52))
    }
}
