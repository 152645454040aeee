use crate::core::input::Lane;
use crate::game::life::LifeChange;
use std::fmt;

// Nested windows around the judgement line, in scroll units.
pub const PERFECT_WINDOW: f32 = 6.0;
pub const GOOD_WINDOW: f32 = 12.0;
pub const BAD_WINDOW: f32 = 18.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    Perfect,
    Good,
    Bad,
    Miss,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::Perfect => "PERFECT",
            Grade::Good => "GOOD",
            Grade::Bad => "BAD",
            Grade::Miss => "MISS",
        };
        f.write_str(s)
    }
}

/// Why a judgement happened. Hold breaks are scored as misses but use their
/// own health penalty.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JudgeSource {
    Tap,
    HoldComplete,
    HoldBroken,
    ScrolledPast,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Judgment {
    pub seq: u64,
    pub grade: Grade,
    pub lane: Lane,
    pub source: JudgeSource,
    /// Signed offset from the judgement line at the moment of judging.
    pub offset: f32,
}

/// Classifies a distance from the judgement line. `None` means the note is
/// not within reach of an input at all.
pub fn classify(distance: f32) -> Option<Grade> {
    let distance = distance.abs();
    if distance <= PERFECT_WINDOW {
        Some(Grade::Perfect)
    } else if distance <= GOOD_WINDOW {
        Some(Grade::Good)
    } else if distance <= BAD_WINDOW {
        Some(Grade::Bad)
    } else {
        None
    }
}

pub fn score_for(grade: Grade) -> u64 {
    match grade {
        Grade::Perfect => 500,
        Grade::Good => 200,
        Grade::Bad => 50,
        Grade::Miss => 0,
    }
}

pub fn life_delta_for(grade: Grade, source: JudgeSource) -> i32 {
    match (grade, source) {
        (_, JudgeSource::HoldBroken) => LifeChange::HOLD_BROKEN,
        (Grade::Perfect, _) => LifeChange::PERFECT,
        (Grade::Good, _) => LifeChange::GOOD,
        (Grade::Bad, _) => LifeChange::BAD,
        (Grade::Miss, _) => LifeChange::MISS,
    }
}

#[inline(always)]
pub fn keeps_combo(grade: Grade) -> bool {
    matches!(grade, Grade::Perfect | Grade::Good)
}

/// Per-session counters, logged on the results screen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub perfect: u32,
    pub good: u32,
    pub bad: u32,
    pub miss: u32,
    pub holds_completed: u32,
    pub holds_broken: u32,
}

impl Tally {
    pub fn record(&mut self, judgment: &Judgment) {
        match judgment.grade {
            Grade::Perfect => self.perfect += 1,
            Grade::Good => self.good += 1,
            Grade::Bad => self.bad += 1,
            Grade::Miss => self.miss += 1,
        }
        match judgment.source {
            JudgeSource::HoldComplete => self.holds_completed += 1,
            JudgeSource::HoldBroken => self.holds_broken += 1,
            JudgeSource::Tap | JudgeSource::ScrolledPast => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.perfect + self.good + self.bad + self.miss
    }

    /// Weighted accuracy in `[0, 1]`: PERFECT counts fully, GOOD half, BAD a tenth.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let earned = self.perfect as f64 + self.good as f64 * 0.5 + self.bad as f64 * 0.1;
        earned / total as f64
    }
}
