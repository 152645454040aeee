use crate::core::analysis::BandEnergy;
use crate::core::input::Lane;
use crate::game::judgment::{self, BAD_WINDOW, Grade, JudgeSource, Judgment, Tally};
use crate::game::life::{self, MAX_HEALTH};
use crate::game::motion::{self, MotionEvent};
use crate::game::note::{JUDGEMENT_LINE, Note, NoteKind, NoteStatus, NoteView};
use crate::game::song::TrackInfo;
use crate::game::spawner::{Spawner, TrackClock};
use crate::game::speed::{Difficulty, SpeedModel};
use crate::game::timing::FrameClock;
use log::{debug, info};
use rand::rngs::StdRng;

const STATUS_LOG_INTERVAL_MS: f64 = 1000.0;

/// Feedback the presenter turns into sound or flashes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cue {
    Hit(Grade),
    Miss,
    /// A press that found no note in reach.
    Whiff,
    Fail,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TickOutcome {
    pub dt_factor: f32,
    pub spawned: Option<u64>,
    pub health_depleted: bool,
}

pub struct State {
    pub difficulty: Difficulty,
    pub notes: Vec<Note>,
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub health: i32,
    pub tally: Tally,
    pub speed: SpeedModel,
    pub spawner: Spawner,
    pub clock: FrameClock,
    pub rng: StdRng,
    pub energy: BandEnergy,
    pub last_judgement: Option<Judgment>,
    pub cues: Vec<Cue>,
    next_note_id: u64,
    next_judgement_seq: u64,
    last_status_log_ms: f64,
}

pub fn init(track: &TrackInfo, rng: StdRng) -> State {
    info!(
        "Initializing gameplay for '{}' ({} BPM, {}).",
        track.title, track.bpm, track.difficulty
    );
    State {
        difficulty: track.difficulty,
        notes: Vec::new(),
        score: 0,
        combo: 0,
        max_combo: 0,
        health: MAX_HEALTH,
        tally: Tally::default(),
        speed: SpeedModel::new(track.difficulty),
        spawner: Spawner::new(track.bpm, track.difficulty),
        clock: FrameClock::new(),
        rng,
        energy: BandEnergy::default(),
        last_judgement: None,
        cues: Vec::new(),
        next_note_id: 1,
        next_judgement_seq: 0,
        last_status_log_ms: 0.0,
    }
}

/// Clears every per-session value. The RNG keeps running so consecutive
/// sessions do not replay the same chart.
pub fn reset(state: &mut State) {
    state.notes.clear();
    state.score = 0;
    state.combo = 0;
    state.max_combo = 0;
    state.health = MAX_HEALTH;
    state.tally = Tally::default();
    state.speed.reset();
    state.spawner.reset(0.0);
    state.clock = FrameClock::new();
    state.energy = BandEnergy::default();
    state.last_judgement = None;
    state.cues.clear();
    state.next_note_id = 1;
    state.last_status_log_ms = 0.0;
}

/// Starts the frame and spawn clocks at `now_ms`, so time spent in a
/// countdown or pause is not integrated into the next tick. After a pause
/// the spawner skips the paused time and keeps any hold cooldown.
pub fn begin(state: &mut State, now_ms: f64) {
    match state.clock.last_frame_ms() {
        Some(paused_at) => state.spawner.resume(now_ms - paused_at),
        None => state.spawner.reset(now_ms),
    }
    state.clock.reset(now_ms);
    state.last_status_log_ms = now_ms;
}

pub fn is_dead(state: &State) -> bool {
    state.health <= 0
}

pub fn live_note_count(state: &State) -> usize {
    state.notes.iter().filter(|n| n.is_live()).count()
}

pub fn note_views(state: &State) -> Vec<NoteView> {
    state.notes.iter().map(NoteView::from).collect()
}

/// One simulation step: speed, spawn, motion, then judgement of what motion
/// reported. Counters are only touched through `apply_judgment`.
pub fn update(state: &mut State, now_ms: f64, energy: BandEnergy, track: TrackClock) -> TickOutcome {
    let dt_factor = state.clock.advance(now_ms);
    state.energy = energy;
    let speed = state.speed.update(energy.bass, dt_factor);

    let mut spawned = None;
    if let Some(request) =
        state
            .spawner
            .poll(now_ms, energy.bass, speed, &track, &mut state.rng)
    {
        let id = state.next_note_id;
        state.next_note_id += 1;
        state.notes.push(Note::new(id, request.lane, request.kind));
        debug!(
            "Spawned note {} in lane {:?} ({}).",
            id,
            request.lane,
            if request.kind.is_hold() { "hold" } else { "tap" }
        );
        spawned = Some(id);
    }

    for event in motion::advance(&mut state.notes, speed, dt_factor) {
        match event {
            MotionEvent::HoldCompleted { lane, .. } => {
                apply_judgment(state, Grade::Perfect, lane, JudgeSource::HoldComplete, 0.0);
            }
            MotionEvent::HoldBroken { lane, remaining, .. } => {
                apply_judgment(state, Grade::Miss, lane, JudgeSource::HoldBroken, remaining);
            }
            MotionEvent::Missed { lane, position, .. } => {
                apply_judgment(
                    state,
                    Grade::Miss,
                    lane,
                    JudgeSource::ScrolledPast,
                    position - JUDGEMENT_LINE,
                );
            }
        }
    }

    if now_ms - state.last_status_log_ms >= STATUS_LOG_INTERVAL_MS {
        info!(
            "Time: {:.2}, Speed: {:.3}, Combo: {}, Health: {}, Live Notes: {}",
            track.position,
            speed,
            state.combo,
            state.health,
            live_note_count(state)
        );
        state.last_status_log_ms = now_ms;
    }

    TickOutcome {
        dt_factor,
        spawned,
        health_depleted: is_dead(state),
    }
}

/// Resolves a press in `lane` against the closest eligible note. Returns the
/// judgement for a tap; engaging a hold or hitting nothing returns `None`.
pub fn judge_a_tap(state: &mut State, lane: Lane) -> Option<Judgment> {
    let Some(index) = closest_eligible(&state.notes, lane) else {
        debug!("Press in lane {:?} found nothing in reach.", lane);
        state.cues.push(Cue::Whiff);
        return None;
    };

    let note = &mut state.notes[index];
    let offset = note.position - JUDGEMENT_LINE;
    match &mut note.kind {
        NoteKind::Normal => {
            let grade = judgment::classify(offset).unwrap_or(Grade::Bad);
            note.finish(NoteStatus::Resolved(grade));
            Some(apply_judgment(state, grade, lane, JudgeSource::Tap, offset))
        }
        NoteKind::Hold { engaged, held, .. } => {
            *engaged = true;
            *held = true;
            debug!(
                "Hold {} engaged in lane {:?} at offset {:.2}.",
                note.id, lane, offset
            );
            None
        }
    }
}

/// Lets go of every engaged hold in `lane`; motion breaks any that still
/// have length left on the next tick.
pub fn release_lane(state: &mut State, lane: Lane) {
    for note in state.notes.iter_mut().filter(|n| n.is_live() && n.lane == lane) {
        if let NoteKind::Hold {
            engaged: true,
            held,
            ..
        } = &mut note.kind
        {
            *held = false;
        }
    }
}

/// Lets go of every engaged hold without breaking it. The hold scrolls on
/// from where it was and a new press in its lane latches it again.
pub fn unlatch_holds(state: &mut State) {
    for note in state.notes.iter_mut().filter(|n| n.is_live()) {
        if let NoteKind::Hold { engaged, held, .. } = &mut note.kind {
            if *engaged {
                debug!("Hold {} unlatched in lane {:?}.", note.id, note.lane);
            }
            *engaged = false;
            *held = false;
        }
    }
}

fn closest_eligible(notes: &[Note], lane: Lane) -> Option<usize> {
    notes
        .iter()
        .enumerate()
        .filter(|(_, n)| {
            n.is_live() && n.lane == lane && !n.is_engaged() && n.distance() <= BAD_WINDOW
        })
        .min_by(|(_, a), (_, b)| a.distance().total_cmp(&b.distance()))
        .map(|(i, _)| i)
}

fn apply_judgment(
    state: &mut State,
    grade: Grade,
    lane: Lane,
    source: JudgeSource,
    offset: f32,
) -> Judgment {
    let judgment = Judgment {
        seq: state.next_judgement_seq,
        grade,
        lane,
        source,
        offset,
    };
    state.next_judgement_seq += 1;

    state.score += judgment::score_for(grade);
    if judgment::keeps_combo(grade) {
        state.combo += 1;
        state.max_combo = state.max_combo.max(state.combo);
    } else {
        state.combo = 0;
    }
    state.health = life::apply(state.health, judgment::life_delta_for(grade, source));
    state.tally.record(&judgment);
    state.last_judgement = Some(judgment);
    state.cues.push(match grade {
        Grade::Miss => Cue::Miss,
        hit => Cue::Hit(hit),
    });

    debug!(
        "JUDGED: Lane {:?}, Offset {:.2}, Grade {} ({:?}), Combo {}, Health {}",
        lane, offset, grade, source, state.combo, state.health
    );
    judgment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::life::LifeChange;
    use rand::SeedableRng;

    fn track(difficulty: Difficulty) -> TrackInfo {
        TrackInfo {
            title: "Test".to_string(),
            artist: "Nobody".to_string(),
            bpm: 150,
            src: "test.ogg".into(),
            difficulty,
        }
    }

    fn state() -> State {
        init(&track(Difficulty::Hard), StdRng::seed_from_u64(7))
    }

    fn place(state: &mut State, lane: Lane, kind: NoteKind, position: f32) -> u64 {
        let id = state.next_note_id;
        state.next_note_id += 1;
        let mut note = Note::new(id, lane, kind);
        note.position = position;
        state.notes.push(note);
        id
    }

    #[test]
    fn closest_note_wins() {
        let mut s = state();
        let far = place(&mut s, Lane::Down, NoteKind::Normal, JUDGEMENT_LINE - 9.0);
        let near = place(&mut s, Lane::Down, NoteKind::Normal, JUDGEMENT_LINE + 3.0);
        let judged = judge_a_tap(&mut s, Lane::Down).expect("a judgement");
        assert_eq!(judged.grade, Grade::Perfect);
        let resolved: Vec<u64> = s.notes.iter().filter(|n| n.is_resolved()).map(|n| n.id).collect();
        assert_eq!(resolved, vec![near]);
        assert!(s.notes.iter().any(|n| n.id == far && n.is_live()));
    }

    #[test]
    fn other_lanes_are_ignored() {
        let mut s = state();
        place(&mut s, Lane::Left, NoteKind::Normal, JUDGEMENT_LINE);
        assert!(judge_a_tap(&mut s, Lane::Right).is_none());
        assert_eq!(s.cues, vec![Cue::Whiff]);
        assert_eq!(s.score, 0);
        assert_eq!(s.health, MAX_HEALTH);
    }

    #[test]
    fn bad_hit_breaks_combo() {
        let mut s = state();
        s.combo = 12;
        s.max_combo = 12;
        place(&mut s, Lane::Up, NoteKind::Normal, JUDGEMENT_LINE + 15.0);
        let judged = judge_a_tap(&mut s, Lane::Up).expect("a judgement");
        assert_eq!(judged.grade, Grade::Bad);
        assert_eq!(s.combo, 0);
        assert_eq!(s.max_combo, 12);
        assert_eq!(s.score, 50);
        assert_eq!(s.health, MAX_HEALTH + LifeChange::BAD);
    }

    #[test]
    fn pressing_a_hold_engages_it() {
        let mut s = state();
        let id = place(&mut s, Lane::Left, NoteKind::hold(30.0), JUDGEMENT_LINE - 2.0);
        assert!(judge_a_tap(&mut s, Lane::Left).is_none());
        let note = s.notes.iter().find(|n| n.id == id).expect("hold still tracked");
        assert!(note.is_live());
        assert!(note.is_engaged());
        assert!(s.cues.is_empty());

        // an engaged hold is not a candidate for a second press
        assert!(judge_a_tap(&mut s, Lane::Left).is_none());
        assert_eq!(s.cues, vec![Cue::Whiff]);
    }

    #[test]
    fn completed_hold_scores_perfect() {
        let mut s = state();
        begin(&mut s, 0.0);
        place(&mut s, Lane::Right, NoteKind::hold(0.1), JUDGEMENT_LINE);
        judge_a_tap(&mut s, Lane::Right);
        let out = update(&mut s, 16.0, BandEnergy::default(), TrackClock::default());
        assert!(!out.health_depleted);
        assert_eq!(s.score, 500);
        assert_eq!(s.combo, 1);
        assert_eq!(s.tally.holds_completed, 1);
        assert!(s.notes.iter().all(|n| n.is_live()));
    }

    #[test]
    fn misses_drain_to_zero_and_clamp() {
        let mut s = state();
        begin(&mut s, 0.0);
        for _ in 0..12 {
            place(&mut s, Lane::Left, NoteKind::Normal, 104.0);
        }
        let out = update(&mut s, 16.0, BandEnergy::default(), TrackClock::default());
        assert!(out.health_depleted);
        assert_eq!(s.health, 0);
        assert_eq!(s.tally.miss, 12);
        assert!(s.notes.iter().all(|n| n.is_live()));
    }

    #[test]
    fn hold_cooldown_survives_a_pause() {
        let mut s = init(&track(Difficulty::Hard), StdRng::seed_from_u64(42));
        begin(&mut s, 0.0);
        let loud = BandEnergy {
            bass: 255.0,
            mid: 0.0,
            high: 0.0,
        };
        let clock = TrackClock {
            position: 1.0,
            duration: None,
            ended: false,
        };

        let mut now = 0.0;
        let mut hold_at = None;
        while now < 600_000.0 && hold_at.is_none() {
            now += 16.0;
            if let Some(id) = update(&mut s, now, loud, clock).spawned {
                if s.notes.iter().any(|n| n.id == id && n.kind.is_hold()) {
                    hold_at = Some(now);
                }
            }
        }
        let spawned_at = hold_at.expect("a hold spawns");
        let cooldown = s.spawner.spawn_delay_ms();
        assert!(cooldown > 32.0, "cooldown {cooldown}");

        let resumed_at = spawned_at + 10_000.0;
        begin(&mut s, resumed_at);
        assert_eq!(s.spawner.spawn_delay_ms(), cooldown);
        let mut t = resumed_at;
        while t + 16.0 < resumed_at + cooldown {
            t += 16.0;
            assert_eq!(
                update(&mut s, t, loud, clock).spawned,
                None,
                "spawned {}ms after resume",
                t - resumed_at
            );
        }
        assert!(update(&mut s, resumed_at + cooldown + 250.0, loud, clock).spawned.is_some());
    }

    #[test]
    fn unlatched_hold_can_be_pressed_again() {
        let mut s = state();
        begin(&mut s, 0.0);
        let id = place(&mut s, Lane::Up, NoteKind::hold(30.0), JUDGEMENT_LINE);
        judge_a_tap(&mut s, Lane::Up);
        unlatch_holds(&mut s);
        {
            let note = s.notes.iter().find(|n| n.id == id).expect("hold still tracked");
            assert!(note.is_live());
            assert!(!note.is_engaged());
        }

        assert!(judge_a_tap(&mut s, Lane::Up).is_none());
        assert!(s.cues.is_empty());
        update(&mut s, 16.0, BandEnergy::default(), TrackClock::default());
        let note = s.notes.iter().find(|n| n.id == id).expect("hold still tracked");
        assert!(note.is_engaged());
        assert_eq!(note.position, JUDGEMENT_LINE);
        assert_eq!(s.tally.holds_broken, 0);
        assert_eq!(s.combo, 0);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut s = state();
        s.score = 900;
        s.combo = 4;
        s.health = 12;
        place(&mut s, Lane::Left, NoteKind::Normal, 40.0);
        reset(&mut s);
        assert_eq!((s.score, s.combo, s.max_combo, s.health), (0, 0, 0, MAX_HEALTH));
        assert!(s.notes.is_empty());
        assert_eq!(s.speed.current(), s.speed.tuning().start_speed);
    }
}
