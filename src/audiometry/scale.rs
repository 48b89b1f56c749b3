// Fixed audiometric scales - ears, test frequencies, and the dB HL ladder
//
// Every scale here is an ordered table with index-based lookup. Hearing
// levels are stored as a position on the ladder, never as a float, so two
// levels compare equal exactly when they are the same rung.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest presentable hearing level (dB HL)
pub const MIN_LEVEL_DB: i32 = -10;

/// Highest presentable hearing level (dB HL)
pub const MAX_LEVEL_DB: i32 = 100;

/// Spacing between adjacent ladder rungs (dB)
pub const LEVEL_STEP_DB: i32 = 5;

const LADDER_LEN: usize = ((MAX_LEVEL_DB - MIN_LEVEL_DB) / LEVEL_STEP_DB + 1) as usize;

/// Ear under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ear {
    Left,
    Right,
}

impl Ear {
    /// The opposite ear
    pub fn other(self) -> Ear {
        match self {
            Ear::Left => Ear::Right,
            Ear::Right => Ear::Left,
        }
    }

    /// Get human-readable name for display
    pub fn display_name(self) -> &'static str {
        match self {
            Ear::Left => "LEFT",
            Ear::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Ear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Standard test frequency
///
/// Serialized as the plain frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Frequency {
    Hz500,
    Hz1000,
    Hz2000,
    Hz4000,
    Hz8000,
}

impl Frequency {
    /// All test frequencies in presentation order
    pub const ALL: [Frequency; 5] = [
        Frequency::Hz500,
        Frequency::Hz1000,
        Frequency::Hz2000,
        Frequency::Hz4000,
        Frequency::Hz8000,
    ];

    /// Frequency in Hz
    pub fn hz(self) -> u32 {
        match self {
            Frequency::Hz500 => 500,
            Frequency::Hz1000 => 1000,
            Frequency::Hz2000 => 2000,
            Frequency::Hz4000 => 4000,
            Frequency::Hz8000 => 8000,
        }
    }

    /// Look up a standard frequency by its exact value in Hz
    pub fn from_hz(hz: u32) -> Option<Frequency> {
        Self::ALL.iter().copied().find(|f| f.hz() == hz)
    }

    /// Position in the presentation order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Get the next frequency in the presentation order
    ///
    /// # Returns
    /// * `Some(Frequency)` - Next frequency to test
    /// * `None` - Frequency sequence complete
    pub fn next(self) -> Option<Frequency> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl TryFrom<u32> for Frequency {
    type Error = String;

    fn try_from(hz: u32) -> Result<Self, Self::Error> {
        Frequency::from_hz(hz).ok_or_else(|| format!("{} Hz is not a standard test frequency", hz))
    }
}

impl From<Frequency> for u32 {
    fn from(frequency: Frequency) -> u32 {
        frequency.hz()
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Result of moving along the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelStep {
    /// Level after the move (clamped to the ladder)
    pub level: HearingLevel,
    /// False when the level was already at the boundary in that direction
    pub moved: bool,
}

/// A rung on the dB HL ladder {-10, -5, 0, ..., 100}
///
/// Serialized as the dB HL value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct HearingLevel(u8);

impl HearingLevel {
    /// Quietest level on the ladder (-10 dB HL)
    pub const MIN: HearingLevel = HearingLevel(0);

    /// Loudest level on the ladder (100 dB HL)
    pub const MAX: HearingLevel = HearingLevel((LADDER_LEN - 1) as u8);

    /// Exact ladder lookup; `None` for values off the 5 dB grid or out of range
    pub fn from_db(db: i32) -> Option<HearingLevel> {
        if !(MIN_LEVEL_DB..=MAX_LEVEL_DB).contains(&db) {
            return None;
        }
        let offset = db - MIN_LEVEL_DB;
        if offset % LEVEL_STEP_DB != 0 {
            return None;
        }
        Some(HearingLevel((offset / LEVEL_STEP_DB) as u8))
    }

    /// Snap an arbitrary dB value to the nearest rung, clamping to the ladder
    pub fn nearest(db: f32) -> HearingLevel {
        if db.is_nan() {
            return HearingLevel::MIN;
        }
        let rungs = ((db - MIN_LEVEL_DB as f32) / LEVEL_STEP_DB as f32).round();
        let index = rungs.clamp(0.0, (LADDER_LEN - 1) as f32) as u8;
        HearingLevel(index)
    }

    /// Level in dB HL
    pub fn db(self) -> i32 {
        MIN_LEVEL_DB + i32::from(self.0) * LEVEL_STEP_DB
    }

    /// Position on the ladder (0 = -10 dB HL)
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    pub fn is_max(self) -> bool {
        self == HearingLevel::MAX
    }

    pub fn is_min(self) -> bool {
        self == HearingLevel::MIN
    }

    /// Move to the first rung at least `by_db` louder, clamped to the top
    pub fn raise(self, by_db: u32) -> LevelStep {
        let target = (self.index() + rungs_for(by_db)).min(LADDER_LEN - 1);
        self.step_to(target)
    }

    /// Move to the first rung at least `by_db` quieter, clamped to the bottom
    pub fn lower(self, by_db: u32) -> LevelStep {
        let target = self.index().saturating_sub(rungs_for(by_db));
        self.step_to(target)
    }

    /// Every rung in ascending order
    pub fn ladder() -> impl Iterator<Item = HearingLevel> {
        (0..LADDER_LEN as u8).map(HearingLevel)
    }

    fn step_to(self, target: usize) -> LevelStep {
        let level = HearingLevel(target as u8);
        LevelStep {
            level,
            moved: level != self,
        }
    }
}

/// Number of rungs needed to cover at least `by_db`
fn rungs_for(by_db: u32) -> usize {
    let step = LEVEL_STEP_DB as u32;
    by_db.div_ceil(step) as usize
}

impl TryFrom<i32> for HearingLevel {
    type Error = String;

    fn try_from(db: i32) -> Result<Self, Self::Error> {
        HearingLevel::from_db(db)
            .ok_or_else(|| format!("{} dB HL is not on the hearing level ladder", db))
    }
}

impl From<HearingLevel> for i32 {
    fn from(level: HearingLevel) -> i32 {
        level.db()
    }
}

impl fmt::Display for HearingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} dB HL", self.db())
    }
}
