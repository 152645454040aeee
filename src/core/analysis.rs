use log::debug;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::ops::Range;
use std::sync::Arc;

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

pub const BASS_BINS: Range<usize> = 0..10;
pub const MID_BINS: Range<usize> = 10..50;
pub const HIGH_BINS: Range<usize> = 50..100;

// Decibel range mapped onto 0..=255, same as a browser AnalyserNode.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// A live audio signal the analyzer can pull time-domain samples from.
pub trait SignalSource: Send + Sync {
    /// Copies the most recent mono samples into `out`, oldest first, and
    /// returns how many were written (at most `out.len()`).
    fn read_latest(&self, out: &mut [f32]) -> usize;

    /// Un-suspends the pipeline feeding this source. Must be safe to call
    /// repeatedly.
    fn resume(&self) {}
}

/// Mean byte magnitude per frequency band, each in `0.0..=255.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergy {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

pub struct AudioAnalyzer {
    source: Option<Arc<dyn SignalSource>>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    spectrum: Vec<Complex32>,
    bins: Vec<u8>,
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        Self {
            source: None,
            fft,
            window: blackman_window(FFT_SIZE),
            samples: vec![0.0; FFT_SIZE],
            spectrum: vec![Complex32::new(0.0, 0.0); FFT_SIZE],
            bins: vec![0; BIN_COUNT],
        }
    }

    /// Binds the analyzer to `source`. Only the first call after construction
    /// or `teardown` has an effect; returns whether this call bound it.
    pub fn setup(&mut self, source: Arc<dyn SignalSource>) -> bool {
        if self.source.is_some() {
            debug!("Analyzer already bound; ignoring second setup.");
            return false;
        }
        self.source = Some(source);
        true
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    /// Releases the current binding so the next session can bind again.
    pub fn teardown(&mut self) {
        if self.source.take().is_some() {
            debug!("Analyzer binding released.");
        }
        self.bins.iter_mut().for_each(|b| *b = 0);
    }

    pub fn resume(&self) {
        if let Some(source) = &self.source {
            source.resume();
        }
    }

    /// Reads the live signal and returns the current band energies. Every
    /// call performs a fresh read; nothing is smoothed across calls.
    pub fn get_analysis(&mut self) -> BandEnergy {
        let Some(source) = &self.source else {
            return BandEnergy::default();
        };

        let got = source.read_latest(&mut self.samples);
        if got == 0 {
            self.bins.iter_mut().for_each(|b| *b = 0);
            return BandEnergy::default();
        }
        if got < FFT_SIZE {
            // left-pad a short read with silence
            self.samples.copy_within(0..got, FFT_SIZE - got);
            self.samples[..FFT_SIZE - got].iter_mut().for_each(|s| *s = 0.0);
        }

        for ((slot, &sample), &w) in self.spectrum.iter_mut().zip(&self.samples).zip(&self.window) {
            *slot = Complex32::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.spectrum);

        let scale = 1.0 / FFT_SIZE as f32;
        for (bin, value) in self.bins.iter_mut().zip(&self.spectrum[..BIN_COUNT]) {
            *bin = magnitude_to_byte(value.norm() * scale);
        }

        band_energy(&self.bins)
    }

    /// Byte spectrum computed by the last `get_analysis` call.
    pub fn frequency_data(&self) -> &[u8] {
        &self.bins
    }
}

/// Averages the bass, mid and high slices of a byte spectrum.
pub fn band_energy(bins: &[u8]) -> BandEnergy {
    BandEnergy {
        bass: average(bins, BASS_BINS),
        mid: average(bins, MID_BINS),
        high: average(bins, HIGH_BINS),
    }
}

fn average(bins: &[u8], range: Range<usize>) -> f32 {
    let end = range.end.min(bins.len());
    let start = range.start.min(end);
    let slice = &bins[start..end];
    if slice.is_empty() {
        return 0.0;
    }
    let sum: u32 = slice.iter().map(|&b| b as u32).sum();
    sum as f32 / slice.len() as f32
}

fn magnitude_to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 || !magnitude.is_finite() {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SineSource {
        cycles: f32,
        amplitude: f32,
        resumes: AtomicUsize,
    }

    impl SineSource {
        fn new(cycles: f32, amplitude: f32) -> Self {
            Self {
                cycles,
                amplitude,
                resumes: AtomicUsize::new(0),
            }
        }
    }

    impl SignalSource for SineSource {
        fn read_latest(&self, out: &mut [f32]) -> usize {
            let n = out.len() as f32;
            for (i, s) in out.iter_mut().enumerate() {
                *s = self.amplitude
                    * (2.0 * std::f32::consts::PI * self.cycles * i as f32 / n).sin();
            }
            out.len()
        }

        fn resume(&self) {
            self.resumes.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct EmptySource;

    impl SignalSource for EmptySource {
        fn read_latest(&self, _out: &mut [f32]) -> usize {
            0
        }
    }

    #[test]
    fn unbound_reads_zero() {
        let mut analyzer = AudioAnalyzer::new();
        assert_eq!(analyzer.get_analysis(), BandEnergy::default());
        analyzer.resume();
    }

    #[test]
    fn empty_source_reads_zero() {
        let mut analyzer = AudioAnalyzer::new();
        analyzer.setup(Arc::new(EmptySource));
        assert_eq!(analyzer.get_analysis(), BandEnergy::default());
    }

    #[test]
    fn silence_reads_zero() {
        let mut analyzer = AudioAnalyzer::new();
        analyzer.setup(Arc::new(SineSource::new(3.0, 0.0)));
        assert_eq!(analyzer.get_analysis(), BandEnergy::default());
    }

    #[test]
    fn low_tone_lands_in_bass() {
        let mut analyzer = AudioAnalyzer::new();
        analyzer.setup(Arc::new(SineSource::new(3.0, 1.0)));
        let energy = analyzer.get_analysis();
        assert!(energy.bass > 100.0, "bass {}", energy.bass);
        assert!(energy.mid < 10.0, "mid {}", energy.mid);
        assert!(energy.high < 10.0, "high {}", energy.high);
        assert_eq!(analyzer.frequency_data()[3], 255);
    }

    #[test]
    fn high_tone_lands_in_high_band() {
        let mut analyzer = AudioAnalyzer::new();
        analyzer.setup(Arc::new(SineSource::new(75.0, 1.0)));
        let energy = analyzer.get_analysis();
        assert!(energy.high > energy.bass);
        assert!(energy.bass < 10.0);
    }

    #[test]
    fn setup_is_idempotent_until_teardown() {
        let mut analyzer = AudioAnalyzer::new();
        let first = Arc::new(SineSource::new(3.0, 1.0));
        assert!(analyzer.setup(first.clone()));
        assert!(!analyzer.setup(Arc::new(SineSource::new(75.0, 1.0))));
        analyzer.resume();
        analyzer.resume();
        assert_eq!(first.resumes.load(Ordering::Relaxed), 2);

        // still bound to the low tone
        assert!(analyzer.get_analysis().bass > 100.0);

        analyzer.teardown();
        assert!(!analyzer.is_bound());
        assert!(analyzer.setup(Arc::new(EmptySource)));
    }

    #[test]
    fn band_average_uses_fixed_slices() {
        let mut bins = vec![0u8; BIN_COUNT];
        bins[BASS_BINS].iter_mut().for_each(|b| *b = 200);
        bins[MID_BINS.start] = 40;
        let energy = band_energy(&bins);
        assert_eq!(energy.bass, 200.0);
        assert_eq!(energy.mid, 1.0);
        assert_eq!(energy.high, 0.0);
        assert_eq!(band_energy(&[]), BandEnergy::default());
    }
}
