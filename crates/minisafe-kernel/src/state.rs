//! Single-writer cell holding the session's [`SafetyState`].
//!
//! [`state_cell`] hands out exactly one [`StateWriter`], which is not
//! `Clone`, and a [`StateReader`] that can be cloned freely.  The supervisor
//! keeps the writer; the gateway and the console hold readers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use minisafe_types::SafetyState;

fn encode(state: SafetyState) -> u8 {
    match state {
        SafetyState::Normal => 0,
        SafetyState::Avoiding => 1,
        SafetyState::HardStopped => 2,
        SafetyState::Overridden => 3,
        SafetyState::Returning => 4,
        SafetyState::EStopped => 5,
    }
}

fn decode(raw: u8) -> SafetyState {
    match raw {
        0 => SafetyState::Normal,
        1 => SafetyState::Avoiding,
        2 => SafetyState::HardStopped,
        3 => SafetyState::Overridden,
        4 => SafetyState::Returning,
        // Unknown values fail safe.
        _ => SafetyState::EStopped,
    }
}

/// Create a cell initialised to `initial`.
pub fn state_cell(initial: SafetyState) -> (StateWriter, StateReader) {
    let cell = Arc::new(AtomicU8::new(encode(initial)));
    (
        StateWriter {
            cell: Arc::clone(&cell),
        },
        StateReader { cell },
    )
}

/// The only handle that can change the state.
#[derive(Debug)]
pub struct StateWriter {
    cell: Arc<AtomicU8>,
}

impl StateWriter {
    pub fn set(&self, state: SafetyState) {
        self.cell.store(encode(state), Ordering::SeqCst);
    }

    pub fn get(&self) -> SafetyState {
        decode(self.cell.load(Ordering::SeqCst))
    }

    /// Another read-only handle onto the same cell.
    pub fn reader(&self) -> StateReader {
        StateReader {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Read-only view of the current state.
#[derive(Debug, Clone)]
pub struct StateReader {
    cell: Arc<AtomicU8>,
}

impl StateReader {
    pub fn get(&self) -> SafetyState {
        decode(self.cell.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SafetyState; 6] = [
        SafetyState::Normal,
        SafetyState::Avoiding,
        SafetyState::HardStopped,
        SafetyState::Overridden,
        SafetyState::Returning,
        SafetyState::EStopped,
    ];

    #[test]
    fn readers_observe_writer_updates() {
        let (writer, reader) = state_cell(SafetyState::Normal);
        let late = writer.reader();
        assert_eq!(reader.get(), SafetyState::Normal);
        writer.set(SafetyState::Overridden);
        assert_eq!(reader.get(), SafetyState::Overridden);
        assert_eq!(late.clone().get(), SafetyState::Overridden);
    }

    #[test]
    fn every_state_survives_the_cell() {
        for state in ALL {
            assert_eq!(decode(encode(state)), state);
        }
    }

    #[test]
    fn garbage_decodes_as_estop() {
        assert_eq!(decode(200), SafetyState::EStopped);
    }
}
