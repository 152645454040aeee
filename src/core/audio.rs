use crate::core::analysis::{FFT_SIZE, SignalSource};
use crate::core::resample::Resampler;
use crate::game::session::Playback;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, StreamConfig};
use lewton::inside_ogg::OggStreamReader;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use thiserror::Error;

/// Mono samples the analysis tap keeps; a few FFT windows of history.
const TAP_CAPACITY: usize = FFT_SIZE * 8;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("audio output is not running")]
    Unavailable,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: lewton::VorbisError,
    },
    #[error("track '{0}' could not be loaded")]
    NotLoaded(PathBuf),
}

// --- Engine Commands ---
enum AudioCommand {
    PlaySfx(Arc<Vec<i16>>),
    ResumeOutput,
}

// --- Global State ---
static ENGINE: Lazy<Option<AudioEngine>> = Lazy::new(init_engine_and_thread);

struct AudioEngine {
    command_sender: Sender<AudioCommand>,
    sfx_cache: Mutex<HashMap<String, Option<Arc<Vec<i16>>>>>,
    device_sample_rate: u32,
    device_channels: usize,
    shared: Arc<Shared>,
}

/// State the real-time callback reads. Everything is either atomic or
/// guarded by a mutex the callback only ever `try_lock`s.
struct Shared {
    deck: MusicDeck,
    tap: Arc<AnalysisTap>,
    music_volume: AtomicU32,
    sfx_volume: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        Self {
            deck: MusicDeck::default(),
            tap: Arc::new(AnalysisTap::new(TAP_CAPACITY)),
            music_volume: AtomicU32::new(1.0f32.to_bits()),
            sfx_volume: AtomicU32::new(1.0f32.to_bits()),
        }
    }
}

/// The one music track, fully decoded and resampled to the device format.
#[derive(Default)]
struct MusicDeck {
    track: Mutex<Option<Arc<Vec<i16>>>>,
    /// Interleaved sample index of the next sample to play.
    cursor: AtomicUsize,
    /// Interleaved length, 0 while the decoder is still running.
    len: AtomicUsize,
    playing: AtomicBool,
    failed: AtomicBool,
    /// Bumped on every load so a stale decoder or handle can tell it lost.
    generation: AtomicU64,
}

impl MusicDeck {
    /// Writes the next `out.len()` music samples into `out` (which must be
    /// zeroed) and advances the cursor.
    fn fill(&self, out: &mut [f32], volume: f32) {
        if !self.playing.load(Ordering::Acquire) {
            return;
        }
        let Ok(guard) = self.track.try_lock() else {
            return;
        };
        let Some(track) = guard.as_ref() else {
            return;
        };
        let cursor = self.cursor.load(Ordering::Acquire);
        let n = track.len().saturating_sub(cursor).min(out.len());
        for (o, s) in out[..n].iter_mut().zip(&track[cursor..cursor + n]) {
            *o = s.to_sample::<f32>() * volume;
        }
        // A rewind that landed meanwhile wins over this advance.
        let _ = self.cursor.compare_exchange(
            cursor,
            cursor + n,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    fn install(&self, generation: u64, data: Vec<i16>) -> bool {
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        let len = data.len();
        *self.track.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(data));
        self.len.store(len, Ordering::Release);
        true
    }
}

/// Mono downmix of the music the callback just played, newest last.
pub struct AnalysisTap {
    ring: Mutex<VecDeque<f32>>,
    capacity: usize,
}

impl AnalysisTap {
    fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn push_interleaved(&self, data: &[f32], channels: usize) {
        let Ok(mut ring) = self.ring.try_lock() else {
            return;
        };
        for frame in data.chunks(channels.max(1)) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(mono);
        }
    }

    fn clear(&self) {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl SignalSource for AnalysisTap {
    fn read_latest(&self, out: &mut [f32]) -> usize {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        let n = ring.len().min(out.len());
        for (o, s) in out[..n].iter_mut().zip(ring.range(ring.len() - n..)) {
            *o = *s;
        }
        n
    }

    fn resume(&self) {
        resume_output();
    }
}

/// The music track loaded by `load_music`. Dropping it stops playback.
pub struct MusicHandle {
    path: PathBuf,
    generation: u64,
}

impl MusicHandle {
    fn deck(&self) -> Option<&'static MusicDeck> {
        ENGINE
            .as_ref()
            .map(|engine| &engine.shared.deck)
            .filter(|deck| deck.generation.load(Ordering::Acquire) == self.generation)
    }

    fn frames_to_secs(samples: usize) -> f32 {
        match ENGINE.as_ref() {
            Some(engine) => {
                samples as f32 / engine.device_channels as f32 / engine.device_sample_rate as f32
            }
            None => 0.0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Playback for MusicHandle {
    fn play(&mut self) -> Result<(), AudioError> {
        let deck = self.deck().ok_or(AudioError::Unavailable)?;
        if deck.failed.load(Ordering::Acquire) {
            return Err(AudioError::NotLoaded(self.path.clone()));
        }
        deck.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(deck) = self.deck() {
            deck.playing.store(false, Ordering::Release);
        }
    }

    fn rewind(&mut self) {
        if let Some(deck) = self.deck() {
            deck.cursor.store(0, Ordering::Release);
        }
    }

    fn position_secs(&self) -> f32 {
        self.deck()
            .map_or(0.0, |d| Self::frames_to_secs(d.cursor.load(Ordering::Acquire)))
    }

    fn duration_secs(&self) -> Option<f32> {
        let len = self.deck()?.len.load(Ordering::Acquire);
        (len > 0).then(|| Self::frames_to_secs(len))
    }

    fn has_ended(&self) -> bool {
        self.deck().is_some_and(|d| {
            let len = d.len.load(Ordering::Acquire);
            len > 0 && d.cursor.load(Ordering::Acquire) >= len
        })
    }
}

impl Drop for MusicHandle {
    fn drop(&mut self) {
        self.pause();
    }
}

// --- Public API ---

/// Starts the audio engine. Returns false when no output is available; every
/// other call then quietly does nothing.
pub fn init() -> bool {
    ENGINE.is_some()
}

pub fn set_volumes(music: f32, sfx: f32) {
    if let Some(engine) = ENGINE.as_ref() {
        let shared = &engine.shared;
        shared
            .music_volume
            .store(music.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        shared
            .sfx_volume
            .store(sfx.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// The live signal of the music output, for the analyzer.
pub fn analysis_tap() -> Option<Arc<AnalysisTap>> {
    ENGINE.as_ref().map(|engine| engine.shared.tap.clone())
}

/// Re-starts the output stream in case the platform suspended it.
pub fn resume_output() {
    if let Some(engine) = ENGINE.as_ref() {
        let _ = engine.command_sender.send(AudioCommand::ResumeOutput);
    }
}

/// Plays a sound effect from the given path.
pub fn play_sfx(path: &str) {
    let Some(engine) = ENGINE.as_ref() else {
        return;
    };
    let sound_data = {
        let mut cache = engine.sfx_cache.lock().unwrap_or_else(|e| e.into_inner());
        let entry = cache.entry(path.to_string()).or_insert_with(|| {
            match load_and_resample_sfx(engine, Path::new(path)) {
                Ok(data) => {
                    info!("Cached SFX: {}", path);
                    Some(data)
                }
                Err(e) => {
                    // remembered as missing so the warning is not repeated
                    warn!("Failed to load SFX '{}': {}", path, e);
                    None
                }
            }
        });
        let Some(data) = entry.clone() else {
            return;
        };
        data
    };
    let _ = engine.command_sender.send(AudioCommand::PlaySfx(sound_data));
}

/// Replaces the current track with `path`. The file is opened here so a
/// missing track fails immediately; decoding happens on a worker thread.
pub fn load_music(path: &Path) -> Result<MusicHandle, AudioError> {
    let engine = ENGINE.as_ref().ok_or(AudioError::Unavailable)?;
    let file = File::open(path).map_err(|source| AudioError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let shared = engine.shared.clone();
    let deck = &shared.deck;
    let generation = deck.generation.fetch_add(1, Ordering::AcqRel) + 1;
    deck.playing.store(false, Ordering::Release);
    deck.failed.store(false, Ordering::Release);
    deck.len.store(0, Ordering::Release);
    deck.cursor.store(0, Ordering::Release);
    *deck.track.lock().unwrap_or_else(|e| e.into_inner()) = None;
    shared.tap.clear();

    let owned_path = path.to_path_buf();
    let (out_hz, out_ch) = (engine.device_sample_rate, engine.device_channels);
    thread::spawn(move || {
        let started = std::time::Instant::now();
        match decode_ogg(BufReader::new(file), &owned_path, out_hz, out_ch) {
            Ok(data) => {
                let secs = data.len() as f32 / out_ch as f32 / out_hz as f32;
                if shared.deck.install(generation, data) {
                    info!(
                        "Decoded '{}' ({:.1}s of audio in {:?}).",
                        owned_path.display(),
                        secs,
                        started.elapsed()
                    );
                }
            }
            Err(e) => {
                if shared.deck.generation.load(Ordering::Acquire) == generation {
                    shared.deck.failed.store(true, Ordering::Release);
                }
                error!("Music decoder thread failed: {}", e);
            }
        }
    });

    Ok(MusicHandle {
        path: path.to_path_buf(),
        generation,
    })
}

// --- Engine Implementation ---

fn init_engine_and_thread() -> Option<AudioEngine> {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        warn!("{}; audio disabled.", AudioError::NoDevice);
        return None;
    };
    let config = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("No default audio config ({}); audio disabled.", e);
            return None;
        }
    };
    let stream_config: StreamConfig = config.into();
    let device_sample_rate = stream_config.sample_rate.0;
    let device_channels = stream_config.channels as usize;

    let shared = Arc::new(Shared::new());
    let (command_sender, command_receiver) = channel();
    let (ready_sender, ready_receiver) = channel();
    let thread_shared = shared.clone();
    thread::spawn(move || {
        audio_manager_thread(command_receiver, thread_shared, ready_sender);
    });

    match ready_receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!("{}; audio disabled.", e);
            return None;
        }
        Err(_) => {
            warn!("Audio manager thread exited early; audio disabled.");
            return None;
        }
    }

    info!(
        "Audio engine initialized ({} Hz, {} ch).",
        device_sample_rate, device_channels
    );
    Some(AudioEngine {
        command_sender,
        sfx_cache: Mutex::new(HashMap::new()),
        device_sample_rate,
        device_channels,
        shared,
    })
}

/// Owns the cpal stream and forwards commands to the callback.
fn audio_manager_thread(
    command_receiver: Receiver<AudioCommand>,
    shared: Arc<Shared>,
    ready: Sender<Result<(), AudioError>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err(AudioError::NoDevice));
        return;
    };
    let stream_config: StreamConfig = match device.default_output_config() {
        Ok(config) => config.into(),
        Err(e) => {
            let _ = ready.send(Err(AudioError::Stream(e.to_string())));
            return;
        }
    };
    let channels = stream_config.channels as usize;

    let (sfx_sender, sfx_receiver) = channel::<Arc<Vec<i16>>>();
    let mut active_sfx: Vec<(Arc<Vec<i16>>, usize)> = Vec::new();
    let callback_shared = shared.clone();

    let stream = match device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _| {
            for new_sfx in sfx_receiver.try_iter() {
                active_sfx.push((new_sfx, 0));
            }
            audio_callback_mixer(data, channels, &callback_shared, &mut active_sfx);
        },
        |err| error!("Audio stream error: {}", err),
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(AudioError::Stream(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(AudioError::Stream(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    // The stream lives as long as this loop.
    while let Ok(command) = command_receiver.recv() {
        match command {
            AudioCommand::PlaySfx(data) => {
                let _ = sfx_sender.send(data);
            }
            AudioCommand::ResumeOutput => {
                if let Err(e) = stream.play() {
                    warn!("Failed to resume audio output: {}", e);
                }
            }
        }
    }
}

/// Music first, then the analysis tap sees it, then effects on top.
fn audio_callback_mixer(
    out: &mut [f32],
    channels: usize,
    shared: &Shared,
    active_sfx: &mut Vec<(Arc<Vec<i16>>, usize)>,
) {
    out.fill(0.0);
    let music_volume = f32::from_bits(shared.music_volume.load(Ordering::Relaxed));
    shared.deck.fill(out, music_volume);
    shared.tap.push_interleaved(out, channels);

    let sfx_volume = f32::from_bits(shared.sfx_volume.load(Ordering::Relaxed));
    active_sfx.retain_mut(|(data, cursor)| {
        let n = (data.len() - *cursor).min(out.len());
        for (o, s) in out[..n].iter_mut().zip(&data[*cursor..*cursor + n]) {
            *o += s.to_sample::<f32>() * sfx_volume;
        }
        *cursor += n;
        *cursor < data.len()
    });

    for sample in out.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }
}

/// Decodes a whole Ogg Vorbis stream and converts it to the device format.
fn decode_ogg<R: Read + Seek>(
    reader: R,
    path: &Path,
    out_hz: u32,
    out_ch: usize,
) -> Result<Vec<i16>, AudioError> {
    let decode_err = |source| AudioError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let mut ogg = OggStreamReader::new(reader).map_err(decode_err)?;
    let in_ch = ogg.ident_hdr.audio_channels as usize;
    let in_hz = ogg.ident_hdr.audio_sample_rate;

    let mut resampler = Resampler::new(in_hz, out_hz, in_ch, out_ch);
    let mut out = Vec::new();
    while let Some(packet) = ogg.read_dec_packet_itl().map_err(decode_err)? {
        resampler.process(&packet, &mut out);
    }
    resampler.flush(&mut out);
    // keep whole frames only
    out.truncate(out.len() - out.len() % out_ch.max(1));
    Ok(out)
}

fn load_and_resample_sfx(engine: &AudioEngine, path: &Path) -> Result<Arc<Vec<i16>>, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let data = decode_ogg(
        BufReader::new(file),
        path,
        engine.device_sample_rate,
        engine.device_channels,
    )?;
    Ok(Arc::new(data))
}
