//! Polyphase Kaiser-windowed sinc resampler used to bring decoded Ogg data
//! to the output device's rate and channel count.

use std::collections::VecDeque;

pub const BASE_TAPS: usize = 8;
pub const BETA: f64 = 8.0;

#[inline(always)]
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Zeroth-order modified Bessel function, truncated series.
fn bessel_i0(x: f64) -> f64 {
    let half = x * 0.5;
    let (mut term, mut sum) = (1.0, 1.0);
    for k in 1..=12 {
        let k = k as f64;
        term *= (half * half) / (k * k);
        sum += term;
    }
    sum
}

fn kaiser_sinc(len: usize, cutoff: f64, beta: f64) -> Vec<f64> {
    let mid = (len - 1) as f64 / 2.0;
    let norm = bessel_i0(beta);
    (0..len)
        .map(|i| {
            let x = i as f64 - mid;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (std::f64::consts::PI * 2.0 * cutoff * x).sin() / (std::f64::consts::PI * x)
            };
            let ratio = if mid > 0.0 { x / mid } else { 0.0 };
            let w = bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / norm;
            sinc * w
        })
        .collect()
}

pub struct Resampler {
    up: usize,
    down: usize,
    taps_per_phase: usize,
    in_ch: usize,
    out_ch: usize,
    /// `up` rows of `taps_per_phase` coefficients; row `p` pairs with the
    /// history newest-first.
    phases: Vec<f32>,
    /// Per-channel history, newest sample at index 0.
    history: Vec<Vec<f32>>,
    phase: usize,
    pending: VecDeque<f32>,
    frame: Vec<f32>,
}

impl Resampler {
    pub fn new(in_hz: u32, out_hz: u32, in_ch: usize, out_ch: usize) -> Self {
        Self::with_quality(in_hz, out_hz, in_ch, out_ch, BASE_TAPS, BETA)
    }

    pub fn with_quality(
        in_hz: u32,
        out_hz: u32,
        in_ch: usize,
        out_ch: usize,
        taps: usize,
        beta: f64,
    ) -> Self {
        let in_hz = in_hz.max(1);
        let out_hz = out_hz.max(1);
        let g = gcd(out_hz, in_hz);
        let (up, down) = ((out_hz / g) as usize, (in_hz / g) as usize);
        let taps = taps.max(2);

        let len = taps * up;
        let mut proto = kaiser_sinc(len, 0.5 / up.max(down) as f64, beta);
        let sum: f64 = proto.iter().sum();
        if sum.abs() > f64::EPSILON {
            let scale = up as f64 / sum;
            proto.iter_mut().for_each(|v| *v *= scale);
        }

        let mut phases = vec![0.0f32; len];
        for p in 0..up {
            for k in 0..taps {
                phases[p * taps + k] = proto[p + k * up] as f32;
            }
        }

        let in_ch = in_ch.max(1);
        Self {
            up,
            down,
            taps_per_phase: taps,
            in_ch,
            out_ch: out_ch.max(1),
            phases,
            history: vec![vec![0.0; taps]; in_ch],
            phase: 0,
            pending: VecDeque::new(),
            frame: vec![0.0; in_ch],
        }
    }

    /// Output frames per input frame.
    pub fn ratio(&self) -> f64 {
        self.up as f64 / self.down as f64
    }

    fn shift_in(&mut self) -> bool {
        if self.pending.len() < self.in_ch {
            return false;
        }
        for hist in self.history.iter_mut() {
            hist.rotate_right(1);
            hist[0] = self.pending.pop_front().unwrap_or(0.0);
        }
        true
    }

    /// Feeds interleaved input and appends every output frame that can be
    /// produced so far.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        self.pending.extend(input.iter().map(|&s| s as f32 / 32768.0));
        loop {
            while self.phase >= self.up {
                if !self.shift_in() {
                    return;
                }
                self.phase -= self.up;
            }

            let tpp = self.taps_per_phase;
            let coeffs = &self.phases[self.phase * tpp..(self.phase + 1) * tpp];
            for (acc, hist) in self.frame.iter_mut().zip(&self.history) {
                *acc = coeffs.iter().zip(hist).map(|(c, s)| c * s).sum();
            }
            for c in 0..self.out_ch {
                let v = self.frame[c % self.in_ch] * 32767.0;
                out.push(v.clamp(-32768.0, 32767.0) as i16);
            }
            self.phase += self.down;
        }
    }

    /// Pushes enough silence through the filter to drain the tail of the signal.
    pub fn flush(&mut self, out: &mut Vec<i16>) {
        let silence = vec![0i16; self.taps_per_phase * self.in_ch];
        self.process(&silence, out);
    }
}
