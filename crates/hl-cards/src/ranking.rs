use super::card::Rank;
use super::hand::Hand;

/// A made-hand category with its defining rank(s).
///
/// Kicker cards are intentionally not modeled: the pipeline consumes hand
/// strength as a percentile, and the in-category interpolation below only
/// keys on the defining ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Ranking {
    HighCard(Rank),
    OnePair(Rank),
    TwoPair(Rank, Rank),
    ThreeOAK(Rank),
    Straight(Rank),
    Flush(Rank),
    FullHouse(Rank, Rank),
    FourOAK(Rank),
    StraightFlush(Rank),
}

/// Distinct five-card classes per category among the 7462 equivalence
/// classes, weakest category first. Used to anchor the percentile model.
const CLASS_COUNTS: [(u32, u32); 9] = [
    (0, 1277),    // high card
    (1277, 2860), // one pair
    (4137, 858),  // two pair
    (4995, 858),  // three of a kind
    (5853, 10),   // straight
    (5863, 1277), // flush
    (7140, 156),  // full house
    (7296, 156),  // four of a kind
    (7452, 10),   // straight flush
];
const CLASS_TOTAL: f64 = 7462.0;

impl Ranking {
    /// Evaluates the best made hand in a 5-7 card set.
    pub fn of(hand: Hand) -> Self {
        let eval = Tally::from(hand);
        None.or_else(|| eval.straight_flush())
            .or_else(|| eval.four_oak())
            .or_else(|| eval.full_house())
            .or_else(|| eval.flush())
            .or_else(|| eval.straight())
            .or_else(|| eval.three_oak())
            .or_else(|| eval.two_pair())
            .or_else(|| eval.one_pair())
            .or_else(|| eval.high_card())
            .expect("at least one card in hand")
    }

    fn category(&self) -> usize {
        match self {
            Self::HighCard(_) => 0,
            Self::OnePair(_) => 1,
            Self::TwoPair(_, _) => 2,
            Self::ThreeOAK(_) => 3,
            Self::Straight(_) => 4,
            Self::Flush(_) => 5,
            Self::FullHouse(_, _) => 6,
            Self::FourOAK(_) => 7,
            Self::StraightFlush(_) => 8,
        }
    }

    fn primaries(&self) -> (Rank, Rank) {
        match *self {
            Self::HighCard(r)
            | Self::OnePair(r)
            | Self::ThreeOAK(r)
            | Self::Straight(r)
            | Self::Flush(r)
            | Self::FourOAK(r)
            | Self::StraightFlush(r) => (r, r),
            Self::TwoPair(hi, lo) | Self::FullHouse(hi, lo) => (hi, lo),
        }
    }

    /// Fraction of the 7462 five-card classes ranked below this hand,
    /// in `[0, 1)`. Higher is stronger. Within a category the position is
    /// interpolated from the defining ranks, so the mapping is monotone in
    /// category and in primary rank but deliberately approximate between
    /// kicker variations.
    pub fn fraction(&self) -> f64 {
        let (below, count) = CLASS_COUNTS[self.category()];
        let (hi, lo) = self.primaries();
        let t = (u8::from(hi) as f64 * 13.0 + u8::from(lo) as f64) / 169.0;
        (below as f64 + t * count as f64) / CLASS_TOTAL
    }
}

impl std::fmt::Display for Ranking {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::HighCard(r) => write!(f, "HighCard      {}", r),
            Self::OnePair(r) => write!(f, "OnePair       {}", r),
            Self::TwoPair(a, b) => write!(f, "TwoPair       {}{}", a, b),
            Self::ThreeOAK(r) => write!(f, "ThreeOfAKind  {}", r),
            Self::Straight(r) => write!(f, "Straight      {}", r),
            Self::Flush(r) => write!(f, "Flush         {}", r),
            Self::FullHouse(a, b) => write!(f, "FullHouse     {}{}", a, b),
            Self::FourOAK(r) => write!(f, "FourOfAKind   {}", r),
            Self::StraightFlush(r) => write!(f, "StraightFlush {}", r),
        }
    }
}

/// Rank and suit tallies extracted from a hand in one pass.
struct Tally {
    /// Cards of each rank.
    counts: [u8; 13],
    /// Ranks present per suit, as 13-bit masks.
    suits: [u16; 4],
    /// Ranks present in the hand, suit-blind.
    ranks: u16,
}

impl From<Hand> for Tally {
    fn from(hand: Hand) -> Self {
        let mut counts = [0u8; 13];
        let mut suits = [0u16; 4];
        let mut ranks = 0u16;
        for card in hand.cards() {
            let r = u8::from(card.rank()) as usize;
            let s = u8::from(card.suit()) as usize;
            counts[r] += 1;
            suits[s] |= 1 << r;
            ranks |= 1 << r;
        }
        Self { counts, suits, ranks }
    }
}

impl Tally {
    /// Highest rank completing a straight in `mask`, wheel included.
    fn straight_high(mask: u16) -> Option<Rank> {
        const WHEEL: u16 = 0b1_0000_0000_1111;
        let runs = mask & mask << 1 & mask << 2 & mask << 3 & mask << 4;
        if runs != 0 {
            Some(Rank::from(runs.ilog2() as u8))
        } else if mask & WHEEL == WHEEL {
            Some(Rank::Five)
        } else {
            None
        }
    }

    /// Highest rank held at least `n` times, below `cap` when given.
    fn rank_of_n(&self, n: u8, cap: Option<Rank>) -> Option<Rank> {
        let top = cap.map(|r| u8::from(r) as usize).unwrap_or(13);
        (0..top)
            .rev()
            .find(|&r| self.counts[r] >= n)
            .map(|r| Rank::from(r as u8))
    }

    fn flush_suit(&self) -> Option<u16> {
        self.suits
            .iter()
            .copied()
            .find(|mask| mask.count_ones() >= 5)
    }

    fn straight_flush(&self) -> Option<Ranking> {
        self.flush_suit()
            .and_then(Self::straight_high)
            .map(Ranking::StraightFlush)
    }
    fn four_oak(&self) -> Option<Ranking> {
        self.rank_of_n(4, None).map(Ranking::FourOAK)
    }
    fn full_house(&self) -> Option<Ranking> {
        let trips = self.rank_of_n(3, None)?;
        // the pair may sit above or below the trips rank
        let pair = (0..13)
            .rev()
            .map(|r| Rank::from(r as u8))
            .find(|&r| r != trips && self.counts[u8::from(r) as usize] >= 2)?;
        Some(Ranking::FullHouse(trips, pair))
    }
    fn flush(&self) -> Option<Ranking> {
        self.flush_suit()
            .map(|mask| Ranking::Flush(Rank::from(mask.ilog2() as u8)))
    }
    fn straight(&self) -> Option<Ranking> {
        Self::straight_high(self.ranks).map(Ranking::Straight)
    }
    fn three_oak(&self) -> Option<Ranking> {
        self.rank_of_n(3, None).map(Ranking::ThreeOAK)
    }
    fn two_pair(&self) -> Option<Ranking> {
        let hi = self.rank_of_n(2, None)?;
        let lo = self.rank_of_n(2, Some(hi))?;
        Some(Ranking::TwoPair(hi, lo))
    }
    fn one_pair(&self) -> Option<Ranking> {
        self.rank_of_n(2, None).map(Ranking::OnePair)
    }
    fn high_card(&self) -> Option<Ranking> {
        self.rank_of_n(1, None).map(Ranking::HighCard)
    }
}

/// Percentile strength of hole + board, in `[0, 1)`, higher = stronger.
/// Returns `None` with fewer than five total cards.
pub fn made_hand_fraction(hole: Hand, board: Hand) -> Option<f64> {
    let all = hole.union(board);
    match all.size() {
        0..=4 => None,
        _ => Some(Ranking::of(all).fraction()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank_of(s: &str) -> Ranking {
        Ranking::of(Hand::try_from(s).unwrap())
    }

    #[test]
    fn high_card() {
        assert_eq!(rank_of("AsKhQdJc9s"), Ranking::HighCard(Rank::Ace));
    }

    #[test]
    fn one_pair() {
        assert_eq!(rank_of("AsAhKdQcJs"), Ranking::OnePair(Rank::Ace));
    }

    #[test]
    fn two_pair() {
        assert_eq!(
            rank_of("AsAhKdKcQs"),
            Ranking::TwoPair(Rank::Ace, Rank::King)
        );
    }

    #[test]
    fn three_oak() {
        assert_eq!(rank_of("AsAhAdKcQs"), Ranking::ThreeOAK(Rank::Ace));
    }

    #[test]
    fn straight() {
        assert_eq!(rank_of("TsJhQdKcAs"), Ranking::Straight(Rank::Ace));
    }

    #[test]
    fn wheel_straight() {
        assert_eq!(rank_of("As2h3d4c5s"), Ranking::Straight(Rank::Five));
    }

    #[test]
    fn flush() {
        assert_eq!(rank_of("AsKsQsJs9s"), Ranking::Flush(Rank::Ace));
    }

    #[test]
    fn full_house() {
        assert_eq!(
            rank_of("AsAhAdKcKs"),
            Ranking::FullHouse(Rank::Ace, Rank::King)
        );
    }

    #[test]
    fn four_oak() {
        assert_eq!(rank_of("AsAhAdAcKs"), Ranking::FourOAK(Rank::Ace));
    }

    #[test]
    fn straight_flush() {
        assert_eq!(rank_of("TsJsQsKsAs"), Ranking::StraightFlush(Rank::Ace));
    }

    #[test]
    fn wheel_straight_flush() {
        assert_eq!(rank_of("As2s3s4s5s"), Ranking::StraightFlush(Rank::Five));
    }

    #[test]
    fn seven_card_best_category() {
        assert_eq!(
            rank_of("AsAhKdKcQsJh9d"),
            Ranking::TwoPair(Rank::Ace, Rank::King)
        );
    }

    #[test]
    fn full_house_over_flush() {
        assert_eq!(
            rank_of("AsAhAdKsKhQsJs"),
            Ranking::FullHouse(Rank::Ace, Rank::King)
        );
    }

    #[test]
    fn two_trips_make_full_house() {
        assert_eq!(
            rank_of("AsAhAdKcKsKhQd"),
            Ranking::FullHouse(Rank::Ace, Rank::King)
        );
    }

    #[test]
    fn flush_beats_straight_in_same_hand() {
        assert_eq!(rank_of("4h6h7h8h9hTs"), Ranking::Flush(Rank::Nine));
    }

    #[test]
    fn fraction_orders_categories() {
        let pair = rank_of("AsAhKdQcJs").fraction();
        let flush = rank_of("AsKsQsJs9s").fraction();
        let quads = rank_of("AsAhAdAcKs").fraction();
        assert!(pair < flush && flush < quads);
        assert!(quads < 1.0);
    }

    #[test]
    fn fraction_orders_within_category() {
        let kings = rank_of("KsKhQdJc9s").fraction();
        let aces = rank_of("AsAhKdQcJs").fraction();
        assert!(kings < aces);
    }

    #[test]
    fn fraction_none_before_flop() {
        let hole = Hand::try_from("AsKh").unwrap();
        assert_eq!(made_hand_fraction(hole, Hand::default()), None);
    }
}
