use super::card::Card;
use hl_core::Arbitrary;

/// An unordered set of cards as a 52-bit bitstring in a u64.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub struct Hand(u64);

impl Hand {
    pub fn size(&self) -> usize {
        self.0.count_ones() as usize
    }
    pub fn contains(&self, card: Card) -> bool {
        self.0 & u64::from(card) != 0
    }
    /// Union of two hands.
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
    pub fn cards(&self) -> Vec<Card> {
        let mut bits = self.0;
        let mut cards = Vec::with_capacity(self.size());
        while bits != 0 {
            cards.push(Card::from(bits.trailing_zeros() as u8));
            bits &= bits - 1;
        }
        cards
    }
}

impl From<u64> for Hand {
    fn from(n: u64) -> Self {
        Self(n)
    }
}
impl From<Hand> for u64 {
    fn from(hand: Hand) -> Self {
        hand.0
    }
}
impl From<Vec<Card>> for Hand {
    fn from(cards: Vec<Card>) -> Self {
        Self(cards.into_iter().map(u64::from).fold(0, |acc, c| acc | c))
    }
}

/// Parses concatenated two-character cards, whitespace ignored: `"AsKh"`.
impl TryFrom<&str> for Hand {
    type Error = anyhow::Error;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let squeezed = s.replace(char::is_whitespace, "");
        anyhow::ensure!(squeezed.len() % 2 == 0, "odd card string '{}'", s);
        let cards = squeezed
            .as_bytes()
            .chunks(2)
            .map(std::str::from_utf8)
            .map(|chunk| Card::try_from(chunk?))
            .collect::<Result<Vec<Card>, _>>()?;
        Ok(Self::from(cards))
    }
}

impl std::fmt::Display for Hand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for card in self.cards() {
            write!(f, "{}", card)?;
        }
        Ok(())
    }
}

impl Arbitrary for Hand {
    fn random() -> Self {
        use rand::Rng;
        let mut bits = 0u64;
        while bits.count_ones() < 5 {
            bits |= 1 << rand::rng().random_range(0..52);
        }
        Self(bits)
    }
}
