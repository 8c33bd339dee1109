//! The MIDI-learn consult (§9 Design Notes): a mapping table keyed by
//! logical parameter id, consulted by a dedicated thread that resolves
//! incoming CC messages and calls `ParameterStore::set_target`.
//!
//! The MIDI transport itself — device enumeration, SysEx, clock — is
//! out of scope (§1); this module only owns the consult loop. An
//! external MIDI backend pushes raw CC triples through the
//! [`crossbeam_channel::Sender`] half of [`midi_event_channel`], the
//! same "opaque external producer" shape `kine_video::CameraSource`
//! uses for camera frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

use kine_core::{MidiLearnTable, ParameterStore};

/// One raw incoming MIDI CC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    pub channel: u8,
    pub cc: u8,
    pub value: u8,
}

/// How long the consult thread blocks between polls of the shutdown
/// flag when no MIDI event is pending (§9 "cooperative cancellation").
const POLL_TIMEOUT: Duration = Duration::from_millis(20);

pub fn midi_event_channel() -> (Sender<MidiEvent>, Receiver<MidiEvent>) {
    crossbeam_channel::unbounded()
}

/// Spawn the MIDI-learn consult thread. Drains `events`, resolves each
/// against `table`, and writes resolved targets straight into `params`
/// — no per-widget dynamic dispatch, per §9.
pub fn spawn_consult_thread(
    events: Receiver<MidiEvent>,
    table: Arc<RwLock<MidiLearnTable>>,
    params: Arc<ParameterStore>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("kine-midi".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match events.recv_timeout(POLL_TIMEOUT) {
                    Ok(event) => {
                        let resolved = table.read().resolve(event.channel, event.cc, event.value);
                        if let Some((tag, value)) = resolved {
                            params.set_target(tag, value);
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                }
            }
        })
        .expect("failed to spawn kine-midi thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kine_core::{MidiBinding, ParamTag};

    #[test]
    fn consult_thread_resolves_events_into_param_targets() {
        let (tx, rx) = midi_event_channel();
        let mut table = MidiLearnTable::new();
        table.bind(ParamTag::FeedbackAmount, MidiBinding::new(0, 20, 0.0, 1.0));
        let table = Arc::new(RwLock::new(table));
        let params = Arc::new(ParameterStore::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = spawn_consult_thread(rx, table, Arc::clone(&params), Arc::clone(&shutdown));
        tx.send(MidiEvent {
            channel: 0,
            cc: 20,
            value: 127,
        })
        .unwrap();

        // Give the thread a moment to drain the event.
        std::thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();

        assert!((params.target(ParamTag::FeedbackAmount) - 1.0).abs() < 1e-6);
    }
}
