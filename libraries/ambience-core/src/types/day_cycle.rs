//! Day-cycle gating for track eligibility

use bitflags::bitflags;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Set of in-game times of day a track may play in.
    ///
    /// `DAY` includes `DAWN` and `NIGHT` includes `DUSK`, so a track flagged
    /// for the day also plays at dawn.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DayCycle: u8 {
        const DAWN = 0b0001;
        const DAY = Self::DAWN.bits() | 0b0010;
        const DUSK = 0b0100;
        const NIGHT = Self::DUSK.bits() | 0b1000;
    }
}

impl Default for DayCycle {
    fn default() -> Self {
        Self::DAY | Self::NIGHT
    }
}

impl DayCycle {
    /// Set union
    pub fn union_with(self, other: Self) -> Self {
        self | other
    }

    /// Set intersection
    pub fn intersect_with(self, other: Self) -> Self {
        self & other
    }

    /// Whether a track carrying these flags may play at `time`
    pub fn allows(self, time: TimeOfDay) -> bool {
        self.contains(time.as_cycle())
    }
}

/// The single current time-of-day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeOfDay {
    Dawn,
    #[default]
    Day,
    Dusk,
    Night,
}

/// One full in-game day lasts two real hours
const CYCLE_MINUTES: u32 = 120;

impl TimeOfDay {
    pub fn as_cycle(self) -> DayCycle {
        match self {
            Self::Dawn => DayCycle::DAWN,
            Self::Day => DayCycle::DAY,
            Self::Dusk => DayCycle::DUSK,
            Self::Night => DayCycle::NIGHT,
        }
    }

    /// Derive the in-game time of day from wall-clock UTC.
    ///
    /// The cycle restarts every even UTC hour: dawn at minute 25, day at 30,
    /// dusk at 100 and night from 105 until minute 25 of the next cycle.
    pub fn from_utc(now: DateTime<Utc>) -> Self {
        let minute = (now.hour() * 60 + now.minute()) % CYCLE_MINUTES;
        match minute {
            25..=29 => Self::Dawn,
            30..=99 => Self::Day,
            100..=104 => Self::Dusk,
            _ => Self::Night,
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Dawn => "Dawn",
            Self::Day => "Day",
            Self::Dusk => "Dusk",
            Self::Night => "Night",
        };
        f.write_str(name)
    }
}
