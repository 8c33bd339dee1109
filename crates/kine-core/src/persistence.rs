//! Persistence documents: parameter snapshots and MIDI-learn bindings,
//! stored as keyed structured documents. Load/save is UI-thread-only and
//! fallible; none of this runs on a real-time thread.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::midi_learn::MidiBinding;
use crate::{CoreResult, ParamTag};

/// tag -> value. `BTreeMap` keeps the serialized document's key order
/// stable across saves, which makes diffs in source control readable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamDocument {
    pub values: BTreeMap<ParamTag, f64>,
}

impl ParamDocument {
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// tag -> (midi channel, cc number, min, max).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidiLearnDocument {
    pub bindings: BTreeMap<ParamTag, MidiBinding>,
}

impl MidiLearnDocument {
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_document_round_trips_through_json() {
        let mut doc = ParamDocument::default();
        doc.values.insert(ParamTag::FeedbackAmount, 0.42);
        let text = serde_json::to_string(&doc).unwrap();
        let back: ParamDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back.values.get(&ParamTag::FeedbackAmount), Some(&0.42));
    }
}
