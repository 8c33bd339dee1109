//! MIDI-learn mapping table: (logical parameter id) -> (midi channel, cc,
//! min, max). Per the design notes, the core holds only the mapping
//! table; the MIDI thread consults it and calls `ParameterStore::set_target`
//! directly. No per-widget dynamic typing lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ParamTag;

/// A single MIDI-learn binding: which CC, on which channel, maps to what
/// denormalized range for a given parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidiBinding {
    pub channel: u8,
    pub cc: u8,
    pub min: f64,
    pub max: f64,
}

impl MidiBinding {
    pub fn new(channel: u8, cc: u8, min: f64, max: f64) -> Self {
        Self {
            channel,
            cc,
            min,
            max,
        }
    }

    /// Map a raw 0..127 CC value into this binding's denormalized range.
    #[inline]
    pub fn denormalize(&self, cc_value: u8) -> f64 {
        let normalized = cc_value as f64 / 127.0;
        self.min + normalized * (self.max - self.min)
    }
}

/// The full mapping table, keyed by logical parameter. Consulted by the
/// MIDI thread on every incoming CC message; never touched by the audio
/// callback or GL thread.
#[derive(Debug, Clone, Default)]
pub struct MidiLearnTable {
    bindings: BTreeMap<ParamTag, MidiBinding>,
    by_cc: BTreeMap<(u8, u8), ParamTag>,
}

impl MidiLearnTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, tag: ParamTag, binding: MidiBinding) {
        self.by_cc.insert((binding.channel, binding.cc), tag);
        self.bindings.insert(tag, binding);
    }

    pub fn unbind(&mut self, tag: ParamTag) {
        if let Some(binding) = self.bindings.remove(&tag) {
            self.by_cc.remove(&(binding.channel, binding.cc));
        }
    }

    pub fn binding_for(&self, tag: ParamTag) -> Option<MidiBinding> {
        self.bindings.get(&tag).copied()
    }

    /// All current bindings, for persistence (§A5).
    pub fn bindings_snapshot(&self) -> BTreeMap<ParamTag, MidiBinding> {
        self.bindings.clone()
    }

    /// Resolve an incoming (channel, cc, value) triple to a parameter
    /// target write, if a binding exists.
    pub fn resolve(&self, channel: u8, cc: u8, value: u8) -> Option<(ParamTag, f64)> {
        let tag = *self.by_cc.get(&(channel, cc))?;
        let binding = self.bindings.get(&tag)?;
        Some((tag, binding.denormalize(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_maps_cc_through_binding_range() {
        let mut table = MidiLearnTable::new();
        table.bind(
            ParamTag::FeedbackAmount,
            MidiBinding::new(0, 20, 0.0, 1.0),
        );
        let (tag, value) = table.resolve(0, 20, 127).unwrap();
        assert_eq!(tag, ParamTag::FeedbackAmount);
        assert!((value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unbind_removes_both_indices() {
        let mut table = MidiLearnTable::new();
        table.bind(ParamTag::TScan, MidiBinding::new(1, 5, 1.0, 10.0));
        table.unbind(ParamTag::TScan);
        assert!(table.resolve(1, 5, 64).is_none());
        assert!(table.binding_for(ParamTag::TScan).is_none());
    }
}
