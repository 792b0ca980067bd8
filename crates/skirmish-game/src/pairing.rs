//! 1:1 combat pairing with recent-opponent avoidance.
//!
//! Every active id ends up in exactly one pair or as the bye. The loop
//! below consumes the shuffled pool from the front and only ever removes
//! ids it has placed, so nothing can be left behind.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use rand::Rng;
use rand::seq::SliceRandom;

/// How many recent opponents each id remembers for a given active count.
pub fn history_cap(active: usize) -> usize {
    if active >= 6 { 2 } else { 1 }
}

/// Rolling list of each id's most recent opponents. Never replicated.
#[derive(Debug, Clone)]
pub struct OpponentHistory<K> {
    recent: HashMap<K, VecDeque<K>>,
}

impl<K> Default for OpponentHistory<K> {
    fn default() -> Self {
        Self {
            recent: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> OpponentHistory<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `other` is among `owner`'s recent opponents.
    pub fn contains(&self, owner: &K, other: &K) -> bool {
        self.recent.get(owner).is_some_and(|list| list.contains(other))
    }

    /// Most recent last.
    pub fn recent(&self, owner: &K) -> Vec<K> {
        self.recent
            .get(owner)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Records that `a` and `b` fought, keeping at most `cap` entries each.
    pub fn record(&mut self, a: &K, b: &K, cap: usize) {
        self.push(a, b.clone(), cap);
        self.push(b, a.clone(), cap);
    }

    fn push(&mut self, owner: &K, opponent: K, cap: usize) {
        let list = self.recent.entry(owner.clone()).or_default();
        list.push_back(opponent);
        while list.len() > cap {
            list.pop_front();
        }
    }

    /// Empties `owner`'s list (bye or elimination).
    pub fn clear(&mut self, owner: &K) {
        self.recent.remove(owner);
    }

    /// Removes every trace of `id` (it left the room).
    pub fn forget(&mut self, id: &K) {
        self.recent.remove(id);
        for list in self.recent.values_mut() {
            list.retain(|other| other != id);
        }
    }
}

/// The result of one pairing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing<K> {
    pub pairs: Vec<(K, K)>,
    pub bye: Option<K>,
}

impl<K> Default for Pairing<K> {
    fn default() -> Self {
        Self {
            pairs: Vec::new(),
            bye: None,
        }
    }
}

/// Pairs `active` ids for `round`.
///
/// The pool is shuffled; then the first remaining id is matched with the
/// first later id not in its history, or with the next id if all of them
/// are. An id left alone at the end is the bye and its history is cleared.
pub fn pair<K, R>(
    active: &[K],
    round: u32,
    history: &mut OpponentHistory<K>,
    rng: &mut R,
) -> Pairing<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    R: Rng + ?Sized,
{
    let cap = history_cap(active.len());
    let mut shuffled = active.to_vec();
    shuffled.shuffle(rng);
    let mut pool: VecDeque<K> = shuffled.into();

    let mut pairing = Pairing::default();
    let mut fallbacks = 0usize;

    while let Some(current) = pool.pop_front() {
        if pool.is_empty() {
            history.clear(&current);
            pairing.bye = Some(current);
            break;
        }

        let index = match pool.iter().position(|c| !history.contains(&current, c)) {
            Some(index) => index,
            None => {
                fallbacks += 1;
                0
            }
        };
        let Some(opponent) = pool.remove(index) else {
            // `index` is in range: 0 on a non-empty pool or a found position.
            continue;
        };

        history.record(&current, &opponent, cap);
        pairing.pairs.push((current, opponent));
    }

    tracing::debug!(
        round,
        active = active.len(),
        pairs = pairing.pairs.len(),
        bye = ?pairing.bye,
        fallbacks,
        "pairing complete"
    );
    pairing
}
