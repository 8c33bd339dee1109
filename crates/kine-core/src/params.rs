//! Parameter types for audio processors

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Parameter ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

/// Atomic parameter for lock-free access
pub struct AtomicParam {
    bits: AtomicU64,
}

impl AtomicParam {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Smoothly transition to new value
    #[inline]
    pub fn smooth_set(&self, target: f64, smoothing: f64) {
        let current = self.get();
        let new_value = current + (target - current) * smoothing;
        self.set(new_value);
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// ============ Parameter Store ============
//
// The process-wide parameter set: every writer (UI, MIDI-learn, the
// contour-scanner overlay) updates a target; every reader (the audio
// callback, the GL thread) reads the smoothed current value. Both halves
// of each parameter live in their own `AtomicParam`, so a read can never
// observe a torn float, even though the two halves (target vs. current)
// may individually be a buffer or two out of sync with each other.

/// Logical identity of every parameter the core exposes. Declaration
/// order is also index order into `ParameterStore`'s backing arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(usize)]
pub enum ParamTag {
    TrackGain0,
    TrackGain1,
    TrackGain2,
    TrackGain3,
    TrackPan0,
    TrackPan1,
    TrackPan2,
    TrackPan3,
    SliceLength,
    SliceScan,
    VoiceCount,
    EqLowGain,
    EqMidGain,
    EqHighGain,
    DelayTimeL,
    DelayTimeR,
    DelayFeedback,
    DelayWet,
    GrainDensity,
    GrainWet,
    ReverbRoom,
    ReverbDamping,
    ReverbDecay,
    ReverbWet,
    FeedbackAmount,
    Env1Tau,
    Env2Tau,
    Env3Tau,
    Seq1Range,
    Seq2Range,
    AnchorX,
    AnchorY,
    Chan0Intensity,
    Chan0Rotation,
    Chan0Curve,
    Chan0PitchRatio,
    Chan1Intensity,
    Chan1Rotation,
    Chan1Curve,
    Chan1PitchRatio,
    Chan2Intensity,
    Chan2Rotation,
    Chan2Curve,
    Chan2PitchRatio,
    Chan3Intensity,
    Chan3Rotation,
    Chan3Curve,
    Chan3PitchRatio,
    BaseHue,
    ColorSchemeFader,
    BlendModeFader,
    Brightness,
    RegionMapEnable,
    CameraMix,
    TScan,
}

impl ParamTag {
    pub const COUNT: usize = Self::TScan as usize + 1;

    /// All tags, in index order.
    pub const ALL: [ParamTag; Self::COUNT] = [
        Self::TrackGain0,
        Self::TrackGain1,
        Self::TrackGain2,
        Self::TrackGain3,
        Self::TrackPan0,
        Self::TrackPan1,
        Self::TrackPan2,
        Self::TrackPan3,
        Self::SliceLength,
        Self::SliceScan,
        Self::VoiceCount,
        Self::EqLowGain,
        Self::EqMidGain,
        Self::EqHighGain,
        Self::DelayTimeL,
        Self::DelayTimeR,
        Self::DelayFeedback,
        Self::DelayWet,
        Self::GrainDensity,
        Self::GrainWet,
        Self::ReverbRoom,
        Self::ReverbDamping,
        Self::ReverbDecay,
        Self::ReverbWet,
        Self::FeedbackAmount,
        Self::Env1Tau,
        Self::Env2Tau,
        Self::Env3Tau,
        Self::Seq1Range,
        Self::Seq2Range,
        Self::AnchorX,
        Self::AnchorY,
        Self::Chan0Intensity,
        Self::Chan0Rotation,
        Self::Chan0Curve,
        Self::Chan0PitchRatio,
        Self::Chan1Intensity,
        Self::Chan1Rotation,
        Self::Chan1Curve,
        Self::Chan1PitchRatio,
        Self::Chan2Intensity,
        Self::Chan2Rotation,
        Self::Chan2Curve,
        Self::Chan2PitchRatio,
        Self::Chan3Intensity,
        Self::Chan3Rotation,
        Self::Chan3Curve,
        Self::Chan3PitchRatio,
        Self::BaseHue,
        Self::ColorSchemeFader,
        Self::BlendModeFader,
        Self::Brightness,
        Self::RegionMapEnable,
        Self::CameraMix,
        Self::TScan,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn to_id(self) -> ParamId {
        ParamId(self as u32)
    }

    /// The smoothing regime this parameter advances.
    pub fn smoothing_rate(self) -> SmoothingRate {
        use ParamTag::*;
        match self {
            SliceScan | VoiceCount | RegionMapEnable => SmoothingRate::Instant,
            DelayTimeL | DelayTimeR => SmoothingRate::Slow,
            _ => SmoothingRate::Fast,
        }
    }

    /// Default (unscaled, already-denormalized) value at store creation.
    pub fn default_value(self) -> f64 {
        use ParamTag::*;
        match self {
            TrackGain0 | TrackGain1 | TrackGain2 | TrackGain3 => 0.8,
            VoiceCount => 1.0,
            SliceLength => 0.25,
            Seq1Range | Seq2Range => 0.6,
            ColorSchemeFader | BlendModeFader => 0.0,
            Brightness => 1.0,
            Chan0Intensity | Chan1Intensity | Chan2Intensity | Chan3Intensity => 1.0,
            Chan0PitchRatio | Chan1PitchRatio | Chan2PitchRatio | Chan3PitchRatio => 1.0,
            TScan => 4.0,
            _ => 0.0,
        }
    }
}

/// Smoothing regime: fast for gains/mixes, slow for delay times
/// (prevents pitch artifacts from rapid modulation), instant for
/// triggers and discrete selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmoothingRate {
    Fast,
    Slow,
    Instant,
}

impl SmoothingRate {
    #[inline]
    pub fn alpha(self) -> f64 {
        match self {
            Self::Fast => 0.2,
            Self::Slow => 0.05,
            Self::Instant => 1.0,
        }
    }
}

/// Process-wide, lock-free parameter set. One `AtomicParam` pair (target,
/// current) per `ParamTag`, indexed directly — no map lookup on the
/// real-time path.
pub struct ParameterStore {
    targets: Vec<AtomicParam>,
    current: Vec<AtomicParam>,
}

impl ParameterStore {
    pub fn new() -> Self {
        let targets: Vec<AtomicParam> = ParamTag::ALL
            .iter()
            .map(|tag| AtomicParam::new(tag.default_value()))
            .collect();
        let current: Vec<AtomicParam> = ParamTag::ALL
            .iter()
            .map(|tag| AtomicParam::new(tag.default_value()))
            .collect();
        Self { targets, current }
    }

    /// Writer side: update a parameter's target. Non-blocking, callable
    /// from any thread.
    #[inline]
    pub fn set_target(&self, tag: ParamTag, value: f64) {
        self.targets[tag.index()].set(value);
    }

    #[inline]
    pub fn target(&self, tag: ParamTag) -> f64 {
        self.targets[tag.index()].get()
    }

    /// Reader side: the smoothed current value.
    #[inline]
    pub fn read(&self, tag: ParamTag) -> f64 {
        self.current[tag.index()].get()
    }

    /// Advance every parameter's smoothed current one step toward its
    /// target. Called once per audio buffer by the audio callback and
    /// once per video frame by the GL thread — each consumer domain
    /// ticks independently using its own regime-derived alpha.
    pub fn tick(&self) {
        for tag in ParamTag::ALL {
            let idx = tag.index();
            let target = self.targets[idx].get();
            self.current[idx].smooth_set(target, tag.smoothing_rate().alpha());
        }
    }

    /// Snapshot all current values into a persistence document.
    pub fn snapshot(&self) -> crate::persistence::ParamDocument {
        let mut doc = crate::persistence::ParamDocument::default();
        for tag in ParamTag::ALL {
            doc.values.insert(tag, self.current[tag.index()].get());
        }
        doc
    }

    /// Restore targets (and, for an immediate load, current values too)
    /// from a persistence document. Missing tags keep their defaults.
    pub fn restore(&self, doc: &crate::persistence::ParamDocument) {
        for (&tag, &value) in &doc.values {
            self.targets[tag.index()].set(value);
            self.current[tag.index()].set(value);
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[test]
    fn tick_moves_monotonically_toward_target() {
        let store = ParameterStore::new();
        store.set_target(ParamTag::FeedbackAmount, 0.8);
        let mut prev = store.read(ParamTag::FeedbackAmount);
        for _ in 0..40 {
            store.tick();
            let cur = store.read(ParamTag::FeedbackAmount);
            assert!(cur >= prev - 1e-12);
            prev = cur;
        }
        assert!((prev - 0.8).abs() < 1e-3);
    }

    #[test]
    fn first_buffer_matches_fast_alpha() {
        let store = ParameterStore::new();
        store.set_target(ParamTag::FeedbackAmount, 0.8);
        store.tick();
        assert!((store.read(ParamTag::FeedbackAmount) - 0.16).abs() < 1e-9);
    }

    #[test]
    fn instant_regime_snaps_in_one_tick() {
        let store = ParameterStore::new();
        store.set_target(ParamTag::SliceScan, 0.73);
        store.tick();
        assert_eq!(store.read(ParamTag::SliceScan), 0.73);
    }
}
