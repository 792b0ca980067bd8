//! Shop offers.
//!
//! Each slot first rolls a rarity from the participant's level odds, then
//! picks uniformly among the catalog's templates of that rarity. A rarity
//! with no templates falls back to the whole catalog.

use rand::Rng;

use crate::{CharacterCatalog, CharacterId, Rarity};

/// Rarity weights per level (index 0 is level 1), in `Rarity::ALL` order.
const RARITY_ODDS: [[u32; 5]; 8] = [
    [100, 0, 0, 0, 0],
    [70, 30, 0, 0, 0],
    [60, 35, 5, 0, 0],
    [50, 35, 15, 0, 0],
    [40, 35, 23, 2, 0],
    [33, 30, 30, 7, 0],
    [24, 30, 30, 15, 1],
    [20, 25, 30, 20, 5],
];

fn odds_for(level: u32) -> &'static [u32; 5] {
    let index = (level.max(1) as usize - 1).min(RARITY_ODDS.len() - 1);
    &RARITY_ODDS[index]
}

fn roll_rarity<R: Rng + ?Sized>(level: u32, rng: &mut R) -> Rarity {
    let odds = odds_for(level);
    let total: u32 = odds.iter().sum();
    let mut roll = rng.random_range(0..total);
    for (rarity, &weight) in Rarity::ALL.iter().zip(odds) {
        if roll < weight {
            return *rarity;
        }
        roll -= weight;
    }
    Rarity::Common
}

/// Rolls a fresh offer of `size` characters for a participant at `level`.
pub(crate) fn roll_offer<R: Rng + ?Sized>(
    catalog: &CharacterCatalog,
    level: u32,
    size: usize,
    rng: &mut R,
) -> Vec<CharacterId> {
    let all: Vec<CharacterId> = catalog.iter().map(|t| t.id).collect();
    if all.is_empty() {
        return Vec::new();
    }
    (0..size)
        .map(|_| {
            let rarity = roll_rarity(level, rng);
            let tier: Vec<CharacterId> = catalog.by_rarity(rarity).map(|t| t.id).collect();
            let pool = if tier.is_empty() { &all } else { &tier };
            pool[rng.random_range(0..pool.len())]
        })
        .collect()
}
