//! Hand evaluation
//!
//! Three dice map to a rank and a power. Ranks are tested in strict priority
//! order on the sorted triple, so evaluation does not depend on input order.
//!
//! Power table:
//! - Ace [1-1-1]: 60
//! - Triple [x-x-x], x >= 2: 10 + 5x (20-40)
//! - Straight [4-5-6]: 50
//! - Strike [3-4-5]: 40
//! - Slash [2-3-4]: 30
//! - Storm [1-2-3]: 20
//! - Pair [x-x-y]: 5 + 2x (7-17)
//! - No hand: sum of faces (3-16)

use serde::{Deserialize, Serialize};

use super::dice::Dice;

/// Named hand categories, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRank {
    Ace,
    Triple,
    Straight,
    Strike,
    Slash,
    Storm,
    Pair,
    NoHand,
}

impl HandRank {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            HandRank::Ace => "Ace",
            HandRank::Triple => "Triple",
            HandRank::Straight => "Straight",
            HandRank::Strike => "Strike",
            HandRank::Slash => "Slash",
            HandRank::Storm => "Storm",
            HandRank::Pair => "Pair",
            HandRank::NoHand => "NoHand",
        }
    }

    /// Whether this rank is one of the fixed-power runs
    pub fn is_sequence(&self) -> bool {
        matches!(
            self,
            HandRank::Straight | HandRank::Strike | HandRank::Slash | HandRank::Storm
        )
    }
}

impl std::fmt::Display for HandRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of evaluating a hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandResult {
    pub rank: HandRank,
    pub power: i32,
}

impl HandResult {
    fn new(rank: HandRank, power: i32) -> Self {
        Self { rank, power }
    }
}

/// Evaluate three dice
pub fn evaluate(dice: &Dice) -> HandResult {
    let mut sorted = *dice;
    sorted.sort_unstable();
    let [a, b, c] = sorted.map(i32::from);

    if a == 1 && b == 1 && c == 1 {
        return HandResult::new(HandRank::Ace, 60);
    }
    if a == b && b == c {
        return HandResult::new(HandRank::Triple, 10 + a * 5);
    }
    match (a, b, c) {
        (4, 5, 6) => return HandResult::new(HandRank::Straight, 50),
        (3, 4, 5) => return HandResult::new(HandRank::Strike, 40),
        (2, 3, 4) => return HandResult::new(HandRank::Slash, 30),
        (1, 2, 3) => return HandResult::new(HandRank::Storm, 20),
        _ => {}
    }
    // Sorted, so the paired face is always the middle one
    if a == b || b == c {
        return HandResult::new(HandRank::Pair, 5 + b * 2);
    }

    HandResult::new(HandRank::NoHand, a + b + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permutations(d: Dice) -> Vec<Dice> {
        let [x, y, z] = d;
        vec![
            [x, y, z],
            [x, z, y],
            [y, x, z],
            [y, z, x],
            [z, x, y],
            [z, y, x],
        ]
    }

    #[test]
    fn test_ace_is_highest() {
        let hand = evaluate(&[1, 1, 1]);
        assert_eq!(hand.rank, HandRank::Ace);
        assert_eq!(hand.power, 60);
    }

    #[test]
    fn test_triple_scales_with_face() {
        assert_eq!(evaluate(&[3, 3, 3]), HandResult::new(HandRank::Triple, 25));
        assert_eq!(evaluate(&[2, 2, 2]).power, 20);
        assert_eq!(evaluate(&[6, 6, 6]).power, 40);
    }

    #[test]
    fn test_sequences() {
        assert_eq!(evaluate(&[4, 5, 6]), HandResult::new(HandRank::Straight, 50));
        assert_eq!(evaluate(&[5, 3, 4]), HandResult::new(HandRank::Strike, 40));
        assert_eq!(evaluate(&[4, 2, 3]), HandResult::new(HandRank::Slash, 30));
        assert_eq!(evaluate(&[3, 2, 1]), HandResult::new(HandRank::Storm, 20));
    }

    #[test]
    fn test_pair_scales_on_paired_face() {
        assert_eq!(evaluate(&[2, 2, 5]), HandResult::new(HandRank::Pair, 9));
        assert_eq!(evaluate(&[5, 6, 6]), HandResult::new(HandRank::Pair, 17));
        assert_eq!(evaluate(&[1, 4, 1]), HandResult::new(HandRank::Pair, 7));
    }

    #[test]
    fn test_no_hand_is_sum() {
        assert_eq!(evaluate(&[1, 2, 4]), HandResult::new(HandRank::NoHand, 7));
        assert_eq!(evaluate(&[6, 1, 3]).power, 10);
    }

    #[test]
    fn test_permutation_invariant() {
        for a in 1..=6u8 {
            for b in 1..=6u8 {
                for c in 1..=6u8 {
                    let expected = evaluate(&[a, b, c]);
                    for p in permutations([a, b, c]) {
                        assert_eq!(evaluate(&p), expected, "{:?}", p);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rank_names() {
        assert_eq!(HandRank::NoHand.to_string(), "NoHand");
        assert!(HandRank::Storm.is_sequence());
        assert!(!HandRank::Pair.is_sequence());
    }
}
