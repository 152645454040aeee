use neonlane::config::{self, Config, WINDOW_TITLE};
use neonlane::core::analysis::SignalSource;
use neonlane::core::audio::{self, AudioError};
use neonlane::core::gamepad::{self, GamepadState};
use neonlane::core::input::{Action, KeyBindings};
use neonlane::game::gameplay::Cue;
use neonlane::game::judgment::Grade;
use neonlane::game::session::{Phase, Playback, Presenter, Session, Snapshot};
use neonlane::game::song::TrackInfo;
use gilrs::{GamepadId, Gilrs};
use log::{error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Fullscreen, Window},
};

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);
const TITLE_REFRESH: Duration = Duration::from_millis(100);

const SFX_HIT_PATH: &str = "assets/sounds/hit.ogg";
const SFX_MISS_PATH: &str = "assets/sounds/miss.ogg";
const SFX_FAIL_PATH: &str = "assets/sounds/fail.ogg";

/// Stands in for the music when no track could be loaded: the clock runs
/// while "playing" and the track never ends on its own.
#[derive(Default)]
struct SilentClock {
    started: Option<Instant>,
    offset: f32,
}

impl Playback for SilentClock {
    fn play(&mut self) -> Result<(), AudioError> {
        self.started.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(started) = self.started.take() {
            self.offset += started.elapsed().as_secs_f32();
        }
    }

    fn rewind(&mut self) {
        self.offset = 0.0;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn position_secs(&self) -> f32 {
        self.offset + self.started.map_or(0.0, |s| s.elapsed().as_secs_f32())
    }

    fn duration_secs(&self) -> Option<f32> {
        None
    }

    fn has_ended(&self) -> bool {
        false
    }
}

fn format_clock(secs: f32) -> String {
    let total = secs.max(0.0) as u32;
    format!("{}:{:02}", total / 60, total % 60)
}

/// One-line HUD for the window title.
fn hud_line(track: &TrackInfo, snapshot: &Snapshot) -> String {
    let head = format!("{} | {} - {} [{}]", WINDOW_TITLE, track.title, track.artist, track.difficulty);
    match snapshot.phase {
        Phase::Idle => format!("{head} | Enter to start"),
        Phase::Countdown => format!("{head} | {}", snapshot.countdown.unwrap_or(1)),
        Phase::Playing => {
            let clock = match snapshot.duration {
                Some(d) => format!("{}/{}", format_clock(snapshot.current_time), format_clock(d)),
                None => format_clock(snapshot.current_time),
            };
            let judged = snapshot
                .last_judgement
                .map(|j| format!(" | {}", j.grade))
                .unwrap_or_default();
            format!(
                "{head} | {clock} | Score {} | Combo {} | HP {}{judged}",
                snapshot.score, snapshot.combo, snapshot.health
            )
        }
        Phase::Paused => format!("{head} | PAUSED | Esc to resume"),
        Phase::GameOver | Phase::Results => format!(
            "{head} | {} | Score {} | Max Combo {} | Enter to play again",
            snapshot.phase, snapshot.score, snapshot.max_combo
        ),
    }
}

fn cue_sound(cue: Cue) -> Option<&'static str> {
    match cue {
        Cue::Hit(Grade::Perfect | Grade::Good) => Some(SFX_HIT_PATH),
        Cue::Hit(Grade::Bad | Grade::Miss) | Cue::Whiff | Cue::Miss => Some(SFX_MISS_PATH),
        Cue::Fail => Some(SFX_FAIL_PATH),
    }
}

/// Writes the HUD into the window title and plays a sound per cue.
struct TitlePresenter {
    window: Arc<Window>,
    track: TrackInfo,
    last_title: String,
    last_refresh: Instant,
}

impl Presenter for TitlePresenter {
    fn present(&mut self, snapshot: &Snapshot) {
        for sound in snapshot.cues.iter().filter_map(|&cue| cue_sound(cue)) {
            audio::play_sfx(sound);
        }
        if self.last_refresh.elapsed() < TITLE_REFRESH && snapshot.phase == Phase::Playing {
            return;
        }
        let title = hud_line(&self.track, snapshot);
        if title != self.last_title {
            self.window.set_title(&title);
            self.last_title = title;
        }
        self.last_refresh = Instant::now();
    }
}

pub struct App {
    window: Option<Arc<Window>>,
    presenter: Option<TitlePresenter>,
    session: Session<Box<dyn Playback>>,
    keys: KeyBindings,
    gilrs: Option<Gilrs>,
    active_pad: Option<GamepadId>,
    pad_state: GamepadState,
    start_time: Instant,
    display_width: u32,
    display_height: u32,
    windowed: bool,
}

impl App {
    fn new(track: TrackInfo, config: &Config) -> Self {
        let playback: Box<dyn Playback> = match audio::load_music(&track.src) {
            Ok(handle) => {
                info!("Loading music '{}'.", handle.path().display());
                Box::new(handle)
            }
            Err(e) => {
                warn!("{}; playing without music.", e);
                Box::new(SilentClock::default())
            }
        };
        let source = audio::analysis_tap().map(|tap| tap as Arc<dyn SignalSource>);
        let rng = match config.seed {
            Some(seed) => {
                info!("Using fixed note seed {}.", seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_os_rng(),
        };

        let gilrs = match Gilrs::new() {
            Ok(g) => Some(g),
            Err(e) => {
                warn!("Gamepad support unavailable: {}", e);
                None
            }
        };

        Self {
            window: None,
            presenter: None,
            session: Session::new(track, playback, source, rng),
            keys: config.keys.clone(),
            gilrs,
            active_pad: None,
            pad_state: GamepadState::default(),
            start_time: Instant::now(),
            display_width: config.display_width,
            display_height: config.display_height,
            windowed: config.windowed,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let mut window_attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(self.display_width, self.display_height));
        if !self.windowed {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(window_attributes)?);
        self.presenter = Some(TitlePresenter {
            window: window.clone(),
            track: self.session.track.clone(),
            last_title: String::new(),
            last_refresh: Instant::now(),
        });
        self.window = Some(window);
        info!("Starting event loop...");
        Ok(())
    }

    fn handle_action(&mut self, action: Action, event_loop: &ActiveEventLoop) {
        match action {
            Action::Lane { lane, pressed: true } => self.session.on_lane_action_start(lane.index()),
            Action::Lane { lane, pressed: false } => self.session.on_lane_action_end(lane.index()),
            Action::TogglePause => self.session.toggle_pause(),
            Action::Start => self.session.start_new_game(),
            Action::Back => {
                if self.session.phase() == Phase::Idle {
                    info!("Back from idle. Shutting down.");
                    event_loop.exit();
                } else {
                    self.session.on_back();
                }
            }
        }
    }

    fn now_ms(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() * 1000.0
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init_window(event_loop) {
                error!("Failed to create window: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Focused(false) if self.session.phase() == Phase::Playing => {
                info!("Window lost focus; pausing.");
                self.session.toggle_pause();
            }
            WindowEvent::KeyboardInput { event: key_event, .. } => {
                if let Some(action) = self.keys.action_for(&key_event) {
                    self.handle_action(action, event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let actions = match self.gilrs.as_mut() {
            Some(gilrs) => gamepad::poll_and_collect(gilrs, &mut self.active_pad, &mut self.pad_state),
            None => Vec::new(),
        };
        for action in actions {
            self.handle_action(action, event_loop);
        }

        let now = self.now_ms();
        self.session.tick(now);
        if let Some(presenter) = self.presenter.as_mut() {
            self.session.publish(presenter);
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + FRAME_INTERVAL));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.session.on_back();
    }
}

pub fn run(track: TrackInfo) -> Result<(), Box<dyn Error>> {
    let config = config::get();
    let event_loop = EventLoop::new()?;
    let mut app = App::new(track, &config);
    event_loop.run_app(&mut app)?;
    Ok(())
}
