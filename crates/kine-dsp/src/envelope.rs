//! Envelope and sequencer bank (C4, §4.4): three decay envelopes
//! (ENV1/2/3) and two anchor-distance sequencer CVs (SEQ1/2).
//!
//! The bank itself is sample-rate driven (advanced once per audio
//! sample by the callback engine); the trigger *decisions* are made at
//! frame rate by the contour scanner (C5) and delivered here as
//! discrete events.

use kine_core::Sample;

/// One of the three decay envelopes. `idle` holds at 0; `decaying`
/// multiplies by `exp(-dt/tau)` every sample after a trigger sets
/// level to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Decaying,
}

#[derive(Debug, Clone, Copy)]
pub struct DecayEnvelope {
    state: EnvelopeState,
    level: f64,
}

impl Default for DecayEnvelope {
    fn default() -> Self {
        Self {
            state: EnvelopeState::Idle,
            level: 0.0,
        }
    }
}

impl DecayEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instant re-trigger: level snaps to 1, state becomes decaying.
    #[inline]
    pub fn trigger(&mut self) {
        self.level = 1.0;
        self.state = EnvelopeState::Decaying;
    }

    /// Advance by one sample and return the current CV level.
    #[inline]
    pub fn tick(&mut self, dt: f64, tau: f64) -> Sample {
        if self.state == EnvelopeState::Decaying {
            self.level *= (-dt / tau.max(1e-9)).exp();
            if self.level < 1e-6 {
                self.level = 0.0;
                self.state = EnvelopeState::Idle;
            }
        }
        self.level
    }

    #[inline]
    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

const MIN_SEQ_RANGE: f64 = 1e-6;
const MAX_SEQ_RANGE: f64 = 1.2;
const MIN_SEQ_GAIN: f64 = 2.0;
const MAX_SEQ_GAIN: f64 = 8.0;

/// Maps a `range` knob in (0, 1.2] to a distance-scaling gain in
/// [2, 8], exponentially (§4.4): closer to 1.2, the gentler the
/// scaling; closer to 0, the steeper.
#[inline]
pub fn distance_gain(range: f64) -> f64 {
    let range = range.clamp(MIN_SEQ_RANGE, MAX_SEQ_RANGE);
    let gain = ((MAX_SEQ_RANGE - range) * 8.0_f64.ln() / MAX_SEQ_RANGE).exp() * 2.0;
    gain.clamp(MIN_SEQ_GAIN, MAX_SEQ_GAIN)
}

/// A single-axis distance sequencer (SEQ1 = X, SEQ2 = Y).
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceSequencer {
    cv: f64,
}

impl DistanceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the CV from a signed axis distance and a range
    /// parameter. Cheap enough to call every sample, but in practice
    /// only changes at frame rate since `delta` comes from C5.
    #[inline]
    pub fn update(&mut self, delta: f64, range: f64) -> Sample {
        let gain = distance_gain(range);
        self.cv = (delta.abs() * gain).clamp(0.0, 1.0);
        self.cv
    }

    #[inline]
    pub fn cv(&self) -> f64 {
        self.cv
    }
}

/// Hysteresis comparator used for ENV1 (X > Y) / ENV2 (Y > X) trigger
/// policy: fires once when crossing above, and won't fire again until
/// it has dropped back below by at least the margin.
#[derive(Debug, Clone, Copy)]
pub struct HysteresisTrigger {
    armed: bool,
    margin: f64,
}

impl HysteresisTrigger {
    pub fn new(margin: f64) -> Self {
        Self {
            armed: true,
            margin,
        }
    }

    /// Feed the latest (a, b) pair; returns true exactly once per
    /// crossing of `a > b`.
    #[inline]
    pub fn update(&mut self, a: f64, b: f64) -> bool {
        let above = a > b;
        if above && self.armed {
            self.armed = false;
            true
        } else if !above && (b - a) > self.margin {
            self.armed = true;
            false
        } else {
            false
        }
    }
}

/// The full bank: 3 envelopes + 2 sequencers + the hysteresis state
/// for ENV1/ENV2's anchor-distance triggers. ENV3 has no hysteresis of
/// its own — it fires on a discrete speed-drop event that only the
/// contour scanner can detect (it alone holds consecutive frames'
/// weights), delivered via [`trigger_env3`](Self::trigger_env3).
#[derive(Debug, Clone)]
pub struct EnvelopeBank {
    pub env1: DecayEnvelope,
    pub env2: DecayEnvelope,
    pub env3: DecayEnvelope,
    pub seq1: DistanceSequencer,
    pub seq2: DistanceSequencer,
    x_over_y: HysteresisTrigger,
    y_over_x: HysteresisTrigger,
}

impl Default for EnvelopeBank {
    fn default() -> Self {
        Self {
            env1: DecayEnvelope::new(),
            env2: DecayEnvelope::new(),
            env3: DecayEnvelope::new(),
            seq1: DistanceSequencer::new(),
            seq2: DistanceSequencer::new(),
            x_over_y: HysteresisTrigger::new(0.05),
            y_over_x: HysteresisTrigger::new(0.05),
        }
    }
}

impl EnvelopeBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the ENV1 (X > Y) / ENV2 (Y > X) anchor-distance
    /// hysteresis policy from the latest cursor/anchor distances.
    /// Cheap enough to call every audio buffer against the
    /// vision-published atomics — the hysteresis margin means repeated
    /// calls between frame updates are idempotent.
    pub fn evaluate_triggers(&mut self, dx: f64, dy: f64) {
        if self.x_over_y.update(dx.abs(), dy.abs()) {
            self.env1.trigger();
        }
        if self.y_over_x.update(dy.abs(), dx.abs()) {
            self.env2.trigger();
        }
    }

    /// ENV3's speed-decrease trigger (§4.5 step 5), delivered from the
    /// vision thread's per-frame weight delta via the trigger queue.
    #[inline]
    pub fn trigger_env3(&mut self) {
        self.env3.trigger();
    }

    /// Advance all three envelopes by one audio sample; update the two
    /// sequencer CVs from the latest distance/range readings. SEQ1 and
    /// SEQ2 each carry their own `range` parameter (§4.4).
    #[inline]
    pub fn tick_audio(
        &mut self,
        dt: f64,
        tau1: f64,
        tau2: f64,
        tau3: f64,
        dx: f64,
        dy: f64,
        range1: f64,
        range2: f64,
    ) -> [Sample; 5] {
        let e1 = self.env1.tick(dt, tau1);
        let e2 = self.env2.tick(dt, tau2);
        let e3 = self.env3.tick(dt, tau3);
        let s1 = self.seq1.update(dx, range1);
        let s2 = self.seq2.update(dy, range2);
        [e1, e2, e3, s1, s2]
    }

    pub fn reset(&mut self) {
        self.env1.reset();
        self.env2.reset();
        self.env3.reset();
        self.seq1 = DistanceSequencer::new();
        self.seq2 = DistanceSequencer::new();
        self.x_over_y = HysteresisTrigger::new(0.05);
        self.y_over_x = HysteresisTrigger::new(0.05);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_sets_level_to_one_then_decays() {
        let mut env = DecayEnvelope::new();
        env.trigger();
        assert_eq!(env.level(), 1.0);
        let after = env.tick(1.0 / 48_000.0, 0.1);
        assert!(after < 1.0);
        assert!(after > 0.0);
    }

    #[test]
    fn idle_envelope_stays_at_zero() {
        let mut env = DecayEnvelope::new();
        let level = env.tick(1.0 / 48_000.0, 0.1);
        assert_eq!(level, 0.0);
    }

    #[test]
    fn distance_gain_is_clamped_to_two_eight() {
        assert!((distance_gain(1.2) - 2.0).abs() < 1e-6);
        assert!((distance_gain(1e-6) - 8.0).abs() < 1e-3);
    }

    #[test]
    fn sequencer_cv_is_clamped_to_unit_range() {
        let mut seq = DistanceSequencer::new();
        let cv = seq.update(10.0, 1.2);
        assert!((0.0..=1.0).contains(&cv));
    }

    #[test]
    fn hysteresis_fires_once_per_crossing() {
        let mut trig = HysteresisTrigger::new(0.05);
        assert!(trig.update(1.0, 0.0));
        assert!(!trig.update(1.0, 0.0));
        assert!(!trig.update(0.0, 1.0));
        assert!(trig.update(1.0, 0.0));
    }

    #[test]
    fn trigger_env3_sets_level_to_one() {
        let mut bank = EnvelopeBank::new();
        assert_eq!(bank.env3.level(), 0.0);
        bank.trigger_env3();
        assert_eq!(bank.env3.level(), 1.0);
    }

    #[test]
    fn evaluate_triggers_only_drives_env1_and_env2() {
        let mut bank = EnvelopeBank::new();
        bank.evaluate_triggers(1.0, 0.0);
        assert_eq!(bank.env1.level(), 1.0);
        assert_eq!(bank.env2.level(), 0.0);
        assert_eq!(bank.env3.level(), 0.0);
    }
}
