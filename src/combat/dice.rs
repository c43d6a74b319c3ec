//! Dice rolling
//!
//! All dice are produced server-side through a `DiceSource`. Production code
//! uses `SecureDice`; tests inject `ScriptedDice` to replay exact faces.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of faces on a die
pub const FACES: u8 = 6;

/// A three-dice hand, each face in `1..=6`
pub type Dice = [u8; 3];

/// Source of server-side randomness for rolls, re-rolls and random picks
pub trait DiceSource: Send + Sync {
    /// Roll one die, uniform over `1..=6`
    fn roll_die(&self) -> u8;

    /// Uniform index in `0..upper` (`upper` must be non-zero)
    fn index(&self, upper: usize) -> usize;

    /// Fair coin
    fn coin_flip(&self) -> bool;

    /// Roll a full hand
    fn roll(&self) -> Dice {
        [self.roll_die(), self.roll_die(), self.roll_die()]
    }
}

/// Thread-local CSPRNG (ChaCha, seeded from the OS); never exposed to clients
#[derive(Debug, Default, Clone, Copy)]
pub struct SecureDice;

impl DiceSource for SecureDice {
    fn roll_die(&self) -> u8 {
        rand::rng().random_range(1..=FACES)
    }

    fn index(&self, upper: usize) -> usize {
        rand::rng().random_range(0..upper)
    }

    fn coin_flip(&self) -> bool {
        rand::rng().random_bool(0.5)
    }
}

/// Deterministic source that cycles through a fixed face sequence
///
/// `index` always answers 0 and `coin_flip` answers the configured value.
#[derive(Debug)]
pub struct ScriptedDice {
    faces: Vec<u8>,
    cursor: AtomicUsize,
    coin: bool,
}

impl ScriptedDice {
    /// Create a scripted source; faces outside `1..=6` are clamped
    pub fn new(faces: impl Into<Vec<u8>>) -> Self {
        let mut faces: Vec<u8> = faces.into();
        if faces.is_empty() {
            faces.push(1);
        }
        for face in &mut faces {
            *face = (*face).clamp(1, FACES);
        }
        Self {
            faces,
            cursor: AtomicUsize::new(0),
            coin: true,
        }
    }

    /// Set the answer returned by `coin_flip`
    pub fn with_coin(mut self, coin: bool) -> Self {
        self.coin = coin;
        self
    }

    /// How many faces have been consumed so far
    pub fn consumed(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl DiceSource for ScriptedDice {
    fn roll_die(&self) -> u8 {
        let n = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.faces[n % self.faces.len()]
    }

    fn index(&self, _upper: usize) -> usize {
        0
    }

    fn coin_flip(&self) -> bool {
        self.coin
    }
}

/// Check that a face value is a legal die face
pub fn is_valid_face(face: u8) -> bool {
    (1..=FACES).contains(&face)
}

/// Verification hash published with each roll
///
/// First 16 hex chars of SHA-256 over the rendered dice and a millisecond
/// timestamp.
pub fn dice_hash(dice: &Dice, timestamp_ms: i64) -> String {
    let data = format!("[{}, {}, {}]{}", dice[0], dice[1], dice[2], timestamp_ms);
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}
