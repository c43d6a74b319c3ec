//! Damage resolution
//!
//! Shields absorb incoming damage before hit points:
//! - `absorbed = min(damage, shield)`
//! - the remainder reduces HP, floored at 0

use serde::{Deserialize, Serialize};

/// Outcome of applying one hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DamageResult {
    /// Damage before the shield
    pub incoming: i32,
    /// Portion soaked by the shield
    pub absorbed: i32,
    /// Portion that reached HP (may exceed the HP that was left)
    pub dealt: i32,
    /// Target HP after the hit
    pub hp_after: i32,
    /// Target shield after the hit
    pub shield_after: i32,
}

/// Apply `damage` to a target with `hp` and `shield`
///
/// Negative damage is treated as 0; this never heals.
pub fn apply_damage(hp: i32, shield: i32, damage: i32) -> DamageResult {
    let incoming = damage.max(0);
    let shield = shield.max(0);
    let absorbed = incoming.min(shield);
    let dealt = incoming - absorbed;

    DamageResult {
        incoming,
        absorbed,
        dealt,
        hp_after: (hp - dealt).max(0),
        shield_after: shield - absorbed,
    }
}
