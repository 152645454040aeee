use crate::core::input::Lane;
use crate::game::note::NoteKind;
use crate::game::speed::{Difficulty, TierTuning};
use crate::game::timing::REFERENCE_FRAME_MS;
use log::trace;
use rand::Rng;

/// No new notes once less than this much of the track remains.
pub const END_GUARD_SECS: f32 = 2.0;
pub const HOLD_MIN_LEN: f32 = 20.0;
pub const HOLD_MAX_LEN: f32 = 45.0;
/// Floor used when turning a hold length into a cooldown, so a stalled
/// speed cannot produce an endless gap.
const MIN_COOLDOWN_SPEED: f32 = 0.05;

/// Where the music is, as seen by the game loop this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackClock {
    pub position: f32,
    pub duration: Option<f32>,
    pub ended: bool,
}

impl TrackClock {
    pub fn remaining(&self) -> Option<f32> {
        self.duration.map(|d| (d - self.position).max(0.0))
    }

    /// True once notes spawned now could no longer reach the judgement line.
    pub fn near_end(&self) -> bool {
        self.ended || self.remaining().is_some_and(|r| r < END_GUARD_SECS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Closed,
    /// Loud enough and at least half a beat since the last note.
    Energy,
    /// Too long since the last note, whatever the energy.
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub lane: Lane,
    pub kind: NoteKind,
}

#[derive(Debug, Clone)]
pub struct Spawner {
    bpm: u32,
    tuning: TierTuning,
    last_spawn_ms: f64,
    spawn_delay_ms: f64,
}

impl Spawner {
    pub fn new(bpm: u32, difficulty: Difficulty) -> Self {
        Self {
            bpm: bpm.max(1),
            tuning: difficulty.tuning(),
            last_spawn_ms: 0.0,
            spawn_delay_ms: 0.0,
        }
    }

    /// Treats `now_ms` as the time of the last spawn and drops any cooldown.
    pub fn reset(&mut self, now_ms: f64) {
        self.last_spawn_ms = now_ms;
        self.spawn_delay_ms = 0.0;
    }

    /// Skips `paused_ms` of wall time. The gap since the last spawn and any
    /// pending hold cooldown carry over unchanged.
    pub fn resume(&mut self, paused_ms: f64) {
        self.last_spawn_ms += paused_ms.max(0.0);
    }

    #[inline(always)]
    pub fn half_beat_ms(&self) -> f64 {
        60_000.0 / self.bpm as f64 / 2.0
    }

    pub fn last_spawn_ms(&self) -> f64 {
        self.last_spawn_ms
    }

    pub fn spawn_delay_ms(&self) -> f64 {
        self.spawn_delay_ms
    }

    pub fn gate(&self, now_ms: f64, bass: f32) -> Gate {
        let since_last = now_ms - self.last_spawn_ms;
        if since_last < self.spawn_delay_ms {
            return Gate::Closed;
        }
        if bass > self.tuning.spawn_threshold && since_last > self.half_beat_ms() {
            Gate::Energy
        } else if since_last > self.tuning.silence_ceiling_ms {
            Gate::Silence
        } else {
            Gate::Closed
        }
    }

    /// Decides whether a note spawns this tick. `speed` is the current scroll
    /// speed, used to size the cooldown after a hold.
    pub fn poll<R: Rng + ?Sized>(
        &mut self,
        now_ms: f64,
        bass: f32,
        speed: f32,
        track: &TrackClock,
        rng: &mut R,
    ) -> Option<SpawnRequest> {
        if track.near_end() {
            return None;
        }

        let accepted = match self.gate(now_ms, bass) {
            Gate::Closed => return None,
            Gate::Energy => true,
            Gate::Silence => {
                bass > self.tuning.spawn_threshold || rng.random_bool(self.tuning.accept_chance)
            }
        };
        if !accepted {
            trace!("Spawn attempt rejected at {:.0}ms", now_ms);
            return None;
        }

        let lane = Lane::ALL[rng.random_range(0..Lane::ALL.len())];
        let kind = if rng.random_bool(self.tuning.hold_chance) {
            let length = rng.random_range(HOLD_MIN_LEN..=HOLD_MAX_LEN);
            self.spawn_delay_ms = cooldown_ms(length, speed);
            NoteKind::hold(length)
        } else {
            self.spawn_delay_ms = 0.0;
            NoteKind::Normal
        };

        self.last_spawn_ms = now_ms;
        Some(SpawnRequest { lane, kind })
    }
}

/// Time for a hold body of `length` to scroll by at `speed`.
pub fn cooldown_ms(length: f32, speed: f32) -> f64 {
    let speed = speed.max(MIN_COOLDOWN_SPEED) as f64;
    length as f64 / speed * REFERENCE_FRAME_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const LIVE_TRACK: TrackClock = TrackClock {
        position: 10.0,
        duration: Some(120.0),
        ended: false,
    };

    #[test]
    fn half_beat_from_bpm() {
        let spawner = Spawner::new(150, Difficulty::Hard);
        assert_eq!(spawner.half_beat_ms(), 200.0);
    }

    #[test]
    fn energy_gate_waits_for_half_beat() {
        let mut spawner = Spawner::new(150, Difficulty::Hard);
        spawner.reset(0.0);
        assert_eq!(spawner.gate(200.0, 220.0), Gate::Closed);
        assert_eq!(spawner.gate(220.0, 220.0), Gate::Energy);
        // quiet: only the silence ceiling opens it
        assert_eq!(spawner.gate(500.0, 10.0), Gate::Closed);
        assert_eq!(spawner.gate(801.0, 10.0), Gate::Silence);
    }

    #[test]
    fn easy_silence_ceiling_is_longer() {
        let mut spawner = Spawner::new(128, Difficulty::Easy);
        spawner.reset(0.0);
        assert_eq!(spawner.gate(1_000.0, 0.0), Gate::Closed);
        assert_eq!(spawner.gate(1_201.0, 0.0), Gate::Silence);
    }

    #[test]
    fn loud_spawn_is_always_accepted() {
        let mut rng = StdRng::seed_from_u64(3);
        for seed_tick in 0..50 {
            let mut spawner = Spawner::new(150, Difficulty::Hard);
            spawner.reset(0.0);
            let now = 220.0 + seed_tick as f64;
            assert!(spawner.poll(now, 220.0, 1.0, &LIVE_TRACK, &mut rng).is_some());
            assert_eq!(spawner.last_spawn_ms(), now);
        }
    }

    #[test]
    fn no_spawn_near_track_end() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut spawner = Spawner::new(150, Difficulty::Hard);
        spawner.reset(0.0);
        let closing = TrackClock {
            position: 118.5,
            duration: Some(120.0),
            ended: false,
        };
        assert!(spawner.poll(5_000.0, 255.0, 1.0, &closing, &mut rng).is_none());
        let ended = TrackClock {
            ended: true,
            ..LIVE_TRACK
        };
        assert!(spawner.poll(5_000.0, 255.0, 1.0, &ended, &mut rng).is_none());
    }

    #[test]
    fn unknown_duration_keeps_spawning() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut spawner = Spawner::new(150, Difficulty::Hard);
        spawner.reset(0.0);
        let streaming = TrackClock {
            position: 300.0,
            duration: None,
            ended: false,
        };
        assert!(spawner.poll(1_000.0, 255.0, 1.0, &streaming, &mut rng).is_some());
    }

    #[test]
    fn hold_spawn_blocks_until_cooldown() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut spawner = Spawner::new(150, Difficulty::Hard);
        spawner.reset(0.0);
        let mut now = 0.0;
        let mut hold = None;
        while now < 600_000.0 {
            now += 250.0;
            if let Some(req) = spawner.poll(now, 255.0, 1.0, &LIVE_TRACK, &mut rng) {
                if let NoteKind::Hold { remaining, .. } = req.kind {
                    hold = Some((now, remaining));
                    break;
                }
            }
        }
        let (spawned_at, length) = hold.expect("a hold within the first 10 minutes");
        assert!((HOLD_MIN_LEN..=HOLD_MAX_LEN).contains(&length));
        let cooldown = cooldown_ms(length, 1.0);
        assert_eq!(spawner.spawn_delay_ms(), cooldown);
        assert_eq!(spawner.gate(spawned_at + cooldown - 1.0, 255.0), Gate::Closed);
        assert_eq!(spawner.gate(spawned_at + cooldown + 1.0, 255.0), Gate::Energy);
    }

    #[test]
    fn resume_carries_the_cooldown_over() {
        let mut spawner = Spawner::new(150, Difficulty::Hard);
        spawner.reset(1_000.0);
        spawner.spawn_delay_ms = 360.0;
        spawner.resume(10_000.0);
        assert_eq!(spawner.spawn_delay_ms(), 360.0);
        assert_eq!(spawner.gate(11_000.0 + 359.0, 255.0), Gate::Closed);
        assert_eq!(spawner.gate(11_000.0 + 361.0, 255.0), Gate::Energy);
    }

    #[test]
    fn cooldown_scales_with_length() {
        assert!(cooldown_ms(40.0, 1.0) > cooldown_ms(20.0, 1.0));
        assert!(cooldown_ms(20.0, 0.0).is_finite());
    }
}
