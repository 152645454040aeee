use crate::core::analysis::{AudioAnalyzer, SignalSource};
use crate::core::audio::AudioError;
use crate::core::input::Lane;
use crate::game::gameplay::{self, State};
use crate::game::judgment::Judgment;
use crate::game::note::NoteView;
use crate::game::song::TrackInfo;
use crate::game::spawner::TrackClock;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use std::fmt;
use std::sync::Arc;

pub use crate::game::gameplay::Cue;

pub const COUNTDOWN_STEPS: u8 = 3;
pub const COUNTDOWN_STEP_MS: f64 = 800.0;

/// The host's music player.
pub trait Playback {
    fn play(&mut self) -> Result<(), AudioError>;
    fn pause(&mut self);
    fn rewind(&mut self);
    fn position_secs(&self) -> f32;
    /// `None` while the length is not known yet.
    fn duration_secs(&self) -> Option<f32>;
    fn has_ended(&self) -> bool;
}

impl<T: Playback + ?Sized> Playback for Box<T> {
    fn play(&mut self) -> Result<(), AudioError> {
        (**self).play()
    }
    fn pause(&mut self) {
        (**self).pause()
    }
    fn rewind(&mut self) {
        (**self).rewind()
    }
    fn position_secs(&self) -> f32 {
        (**self).position_secs()
    }
    fn duration_secs(&self) -> Option<f32> {
        (**self).duration_secs()
    }
    fn has_ended(&self) -> bool {
        (**self).has_ended()
    }
}

/// Receives one snapshot per tick. Must not reach back into the session.
pub trait Presenter {
    fn present(&mut self, snapshot: &Snapshot);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Countdown,
    Playing,
    Paused,
    GameOver,
    Results,
}

impl Phase {
    /// A finished session that only `start_new_game` or `on_back` leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::GameOver | Phase::Results)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "IDLE",
            Phase::Countdown => "COUNTDOWN",
            Phase::Playing => "PLAYING",
            Phase::Paused => "PAUSED",
            Phase::GameOver => "GAME OVER",
            Phase::Results => "RESULTS",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub score: u64,
    pub combo: u32,
    pub max_combo: u32,
    pub health: i32,
    pub current_time: f32,
    pub duration: Option<f32>,
    /// Bass energy normalised to `0..=1`.
    pub audio_intensity: f32,
    pub speed: f32,
    pub notes: Vec<NoteView>,
    pub last_judgement: Option<Judgment>,
    pub phase: Phase,
    pub countdown: Option<u8>,
    /// Cues raised since the previous snapshot.
    pub cues: Vec<Cue>,
}

pub struct Session<P: Playback> {
    pub track: TrackInfo,
    playback: P,
    analyzer: AudioAnalyzer,
    source: Option<Arc<dyn SignalSource>>,
    state: State,
    phase: Phase,
    countdown_started_ms: Option<f64>,
    last_now_ms: f64,
}

impl<P: Playback> Session<P> {
    pub fn new(
        track: TrackInfo,
        playback: P,
        source: Option<Arc<dyn SignalSource>>,
        rng: StdRng,
    ) -> Self {
        let state = gameplay::init(&track, rng);
        Self {
            track,
            playback,
            analyzer: AudioAnalyzer::new(),
            source,
            state,
            phase: Phase::Idle,
            countdown_started_ms: None,
            last_now_ms: 0.0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn playback(&self) -> &P {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut P {
        &mut self.playback
    }

    pub fn analyzer(&self) -> &AudioAnalyzer {
        &self.analyzer
    }

    /// Current countdown number, `None` outside the countdown.
    pub fn countdown(&self) -> Option<u8> {
        if self.phase != Phase::Countdown {
            return None;
        }
        let elapsed = self
            .countdown_started_ms
            .map_or(0.0, |start| (self.last_now_ms - start).max(0.0));
        let step = (elapsed / COUNTDOWN_STEP_MS) as u8;
        Some(COUNTDOWN_STEPS.saturating_sub(step).max(1))
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("Session phase: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn enter_countdown(&mut self) {
        self.countdown_started_ms = None;
        self.set_phase(Phase::Countdown);
    }

    /// Resets everything and starts the countdown. Only valid from `Idle` or a
    /// finished session.
    pub fn start_new_game(&mut self) {
        if !(self.phase == Phase::Idle || self.phase.is_terminal()) {
            debug!("start_new_game ignored in phase {}.", self.phase);
            return;
        }
        info!("Starting '{}' by {}.", self.track.title, self.track.artist);
        gameplay::reset(&mut self.state);
        self.playback.pause();
        self.playback.rewind();
        if let Some(source) = &self.source {
            self.analyzer.setup(source.clone());
        }
        self.enter_countdown();
    }

    pub fn toggle_pause(&mut self) {
        match self.phase {
            Phase::Playing => {
                self.playback.pause();
                gameplay::unlatch_holds(&mut self.state);
                self.set_phase(Phase::Paused);
            }
            Phase::Paused => self.enter_countdown(),
            other => debug!("toggle_pause ignored in phase {}.", other),
        }
    }

    /// Aborts the session and returns to `Idle`.
    pub fn on_back(&mut self) {
        self.playback.pause();
        self.analyzer.teardown();
        gameplay::reset(&mut self.state);
        self.countdown_started_ms = None;
        self.set_phase(Phase::Idle);
    }

    /// Ends the session as failed. Calling it again has no effect.
    pub fn trigger_game_over(&mut self) {
        if self.phase == Phase::Idle || self.phase.is_terminal() {
            return;
        }
        self.playback.pause();
        self.state.cues.push(Cue::Fail);
        info!("Player has failed!");
        self.log_summary();
        self.set_phase(Phase::GameOver);
    }

    fn show_results(&mut self) {
        self.playback.pause();
        info!("Track finished.");
        self.log_summary();
        self.set_phase(Phase::Results);
    }

    fn log_summary(&self) {
        let tally = &self.state.tally;
        info!(
            "Score: {}, Max Combo: {}, Perfect: {}, Good: {}, Bad: {}, Miss: {}, Holds: {}/{}, Accuracy: {:.1}%",
            self.state.score,
            self.state.max_combo,
            tally.perfect,
            tally.good,
            tally.bad,
            tally.miss,
            tally.holds_completed,
            tally.holds_completed + tally.holds_broken,
            tally.accuracy() * 100.0
        );
    }

    fn enter_gameplay(&mut self, now_ms: f64) {
        gameplay::begin(&mut self.state, now_ms);
        self.countdown_started_ms = None;
        self.analyzer.resume();
        if let Err(e) = self.playback.play() {
            warn!("Music playback failed to start: {}", e);
        }
        self.set_phase(Phase::Playing);
    }

    pub fn on_lane_action_start(&mut self, lane: usize) {
        let Some(lane) = self.playable_lane(lane) else {
            return;
        };
        gameplay::judge_a_tap(&mut self.state, lane);
    }

    pub fn on_lane_action_end(&mut self, lane: usize) {
        let Some(lane) = self.playable_lane(lane) else {
            return;
        };
        gameplay::release_lane(&mut self.state, lane);
    }

    fn playable_lane(&self, index: usize) -> Option<Lane> {
        if self.phase != Phase::Playing {
            debug!("Lane input ignored in phase {}.", self.phase);
            return None;
        }
        let lane = Lane::from_index(index);
        if lane.is_none() {
            debug!("Ignoring input for out-of-range lane {}.", index);
        }
        lane
    }

    /// Advances the session to `now_ms` (a monotonic clock in milliseconds).
    pub fn tick(&mut self, now_ms: f64) {
        self.last_now_ms = now_ms;
        match self.phase {
            Phase::Idle | Phase::Paused | Phase::GameOver | Phase::Results => {}
            Phase::Countdown => {
                let started = *self.countdown_started_ms.get_or_insert(now_ms);
                if now_ms - started >= COUNTDOWN_STEPS as f64 * COUNTDOWN_STEP_MS {
                    self.enter_gameplay(now_ms);
                }
            }
            Phase::Playing => self.tick_playing(now_ms),
        }
    }

    fn tick_playing(&mut self, now_ms: f64) {
        let energy = self.analyzer.get_analysis();
        let track = TrackClock {
            position: self.playback.position_secs(),
            duration: self.playback.duration_secs(),
            ended: self.playback.has_ended(),
        };
        let outcome = gameplay::update(&mut self.state, now_ms, energy, track);

        if outcome.health_depleted {
            self.trigger_game_over();
        } else if track.ended && gameplay::live_note_count(&self.state) == 0 {
            self.show_results();
        }
    }

    /// Builds the per-tick view and drains pending cues.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot {
            score: self.state.score,
            combo: self.state.combo,
            max_combo: self.state.max_combo,
            health: self.state.health,
            current_time: self.playback.position_secs(),
            duration: self.playback.duration_secs(),
            audio_intensity: (self.state.energy.bass / 255.0).clamp(0.0, 1.0),
            speed: self.state.speed.current(),
            notes: gameplay::note_views(&self.state),
            last_judgement: self.state.last_judgement,
            phase: self.phase,
            countdown: self.countdown(),
            cues: std::mem::take(&mut self.state.cues),
        }
    }

    pub fn publish(&mut self, presenter: &mut dyn Presenter) {
        let snapshot = self.snapshot();
        presenter.present(&snapshot);
    }
}
