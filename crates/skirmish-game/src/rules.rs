//! Tunable game rules.

/// Economy, timing, and board settings shared by every room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    pub starting_gold: u32,
    pub starting_health: u32,
    /// Gold granted to every surviving participant on each new round.
    pub income: u32,
    /// Experience granted to every surviving participant on each new round.
    pub round_xp: u32,
    pub preparation_seconds: u32,
    pub combat_seconds: u32,
    pub shop_size: usize,
    pub reroll_cost: u32,
    pub xp_cost: u32,
    pub xp_gain: u32,
    /// Cumulative experience needed for level 2, 3, ... The maximum level
    /// is `level_thresholds.len() + 1`.
    pub level_thresholds: Vec<u32>,
    pub bench_size: usize,
    pub arena_rows: usize,
    /// Columns `0..arena_cols / 2` are a participant's own half.
    pub arena_cols: usize,
    pub min_participants: usize,
    pub max_participants: usize,
    /// Enables `debug_toggle_pause` and `debug_skip_phase`.
    pub debug_actions: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            starting_gold: 10,
            starting_health: 100,
            income: 5,
            round_xp: 2,
            preparation_seconds: 30,
            combat_seconds: 20,
            shop_size: 5,
            reroll_cost: 2,
            xp_cost: 4,
            xp_gain: 4,
            level_thresholds: vec![2, 6, 10, 20, 36, 56, 80],
            bench_size: 10,
            arena_rows: 6,
            arena_cols: 8,
            min_participants: 2,
            max_participants: 8,
            debug_actions: false,
        }
    }
}

impl GameRules {
    /// Fix values that would make a room unplayable.
    pub fn validated(mut self) -> Self {
        if self.min_participants == 0 {
            tracing::warn!("min_participants is 0, using 1");
            self.min_participants = 1;
        }
        if self.max_participants < self.min_participants {
            tracing::warn!(
                max = self.max_participants,
                min = self.min_participants,
                "max_participants below min_participants, raising it"
            );
            self.max_participants = self.min_participants;
        }
        if self.arena_cols < 2 {
            tracing::warn!(cols = self.arena_cols, "arena needs at least 2 columns");
            self.arena_cols = 2;
        }
        if self.preparation_seconds == 0 {
            tracing::warn!("preparation_seconds is 0, using 1");
            self.preparation_seconds = 1;
        }
        if self.combat_seconds == 0 {
            tracing::warn!("combat_seconds is 0, using 1");
            self.combat_seconds = 1;
        }
        self.arena_rows = self.arena_rows.max(1);
        self.bench_size = self.bench_size.max(1);
        self
    }

    pub fn max_level(&self) -> u32 {
        self.level_thresholds.len() as u32 + 1
    }

    /// The level reached with `xp` total experience.
    pub fn level_for(&self, xp: u32) -> u32 {
        1 + self.level_thresholds.iter().filter(|&&t| xp >= t).count() as u32
    }

    /// Whether `col` lies on a participant's own half.
    pub fn in_own_half(&self, col: usize) -> bool {
        col < self.arena_cols / 2
    }

    pub fn in_arena(&self, row: usize, col: usize) -> bool {
        row < self.arena_rows && col < self.arena_cols
    }
}
