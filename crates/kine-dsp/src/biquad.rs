//! Biquad filter implementation using Transposed Direct Form II.
//!
//! TDF-II is numerically well-behaved in floating point and underlies
//! the 3-band EQ stage (§4.3.2): a low-shelf at 200 Hz, a peak at 2 kHz,
//! and a high-shelf at 8 kHz, chained in series per channel.

use kine_core::Sample;
use std::f64::consts::PI;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Biquad coefficients in the standard normalized (a0 = 1) form.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Peaking EQ filter coefficients. `gain_db` is the peak boost/cut.
    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Low shelf filter coefficients.
    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// High shelf filter coefficients.
    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Unity-gain bypass.
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Which constructor last produced the cached coefficients, along with
/// the parameters it was built from. Lets `set_*` skip the recompute
/// when the smoothed gain hasn't moved beyond a flicker threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CoeffSource {
    None,
    Peaking(f64, f64, f64),
    LowShelf(f64, f64, f64),
    HighShelf(f64, f64, f64),
    Bypass,
}

const GAIN_EPSILON_DB: f64 = 1e-3;

/// Transposed Direct Form II biquad filter: one instance per band, per
/// channel.
#[derive(Debug, Clone)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    last_source: CoeffSource,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTDF2 {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            coeffs: BiquadCoeffs::bypass(),
            last_source: CoeffSource::Bypass,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
        self.last_source = CoeffSource::None;
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn set_peaking(&mut self, freq: f64, q: f64, gain_db: f64) {
        let source = CoeffSource::Peaking(freq, q, gain_db);
        if !Self::matches_within_epsilon(&self.last_source, &source) {
            self.coeffs = BiquadCoeffs::peaking(freq, q, gain_db, self.sample_rate);
            self.last_source = source;
        }
    }

    pub fn set_low_shelf(&mut self, freq: f64, q: f64, gain_db: f64) {
        let source = CoeffSource::LowShelf(freq, q, gain_db);
        if !Self::matches_within_epsilon(&self.last_source, &source) {
            self.coeffs = BiquadCoeffs::low_shelf(freq, q, gain_db, self.sample_rate);
            self.last_source = source;
        }
    }

    pub fn set_high_shelf(&mut self, freq: f64, q: f64, gain_db: f64) {
        let source = CoeffSource::HighShelf(freq, q, gain_db);
        if !Self::matches_within_epsilon(&self.last_source, &source) {
            self.coeffs = BiquadCoeffs::high_shelf(freq, q, gain_db, self.sample_rate);
            self.last_source = source;
        }
    }

    pub fn set_bypass(&mut self) {
        self.coeffs = BiquadCoeffs::bypass();
        self.last_source = CoeffSource::Bypass;
    }

    /// True when `candidate` is the same filter type, at the same
    /// freq/Q, as the cached source, with the gain within epsilon.
    fn matches_within_epsilon(cached: &CoeffSource, candidate: &CoeffSource) -> bool {
        match (cached, candidate) {
            (CoeffSource::Peaking(f1, q1, g1), CoeffSource::Peaking(f2, q2, g2))
            | (CoeffSource::LowShelf(f1, q1, g1), CoeffSource::LowShelf(f2, q2, g2))
            | (CoeffSource::HighShelf(f1, q1, g1), CoeffSource::HighShelf(f2, q2, g2)) => {
                f1 == f2 && q1 == q2 && (g1 - g2).abs() < GAIN_EPSILON_DB
            }
            _ => false,
        }
    }
}

impl Processor for BiquadTDF2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTDF2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}

impl ProcessorConfig for BiquadTDF2 {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass() {
        let mut filter = BiquadTDF2::new(48000.0);
        filter.set_bypass();

        let input = 0.5;
        let output = filter.process_sample(input);
        assert!((output - input).abs() < 1e-10);
    }

    #[test]
    fn test_low_shelf_cut_reduces_dc() {
        let mut filter = BiquadTDF2::new(48000.0);
        filter.set_low_shelf(200.0, 0.707, -12.0);

        for _ in 0..2000 {
            filter.process_sample(1.0);
        }
        let output = filter.process_sample(1.0);
        assert!(output < 1.0);
        assert!(output > 0.0);
    }

    #[test]
    fn test_reset() {
        let mut filter = BiquadTDF2::new(48000.0);
        filter.set_peaking(2000.0, 0.707, -6.0);

        for _ in 0..100 {
            filter.process_sample(1.0);
        }

        filter.reset();

        assert_eq!(filter.z1, 0.0);
        assert_eq!(filter.z2, 0.0);
    }
}
