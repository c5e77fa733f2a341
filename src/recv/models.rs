// region:    --- Peeling structs

pub(crate) type EquationId = usize;

/// A parity frame that still references more than one unknown chunk.
///
/// `residue` is the frame body with every already known chunk XORed out.
#[derive(Debug, Clone)]
pub(crate) struct Equation {
    pub unknown: Vec<usize>,
    pub residue: Vec<u8>,
}

/// Slot arena for pending equations. Retired slots are recycled.
#[derive(Debug, Default)]
pub(crate) struct EquationArena {
    slots: Vec<Option<Equation>>,
    free: Vec<EquationId>,
    live: usize,
}

impl EquationArena {
    pub fn insert(&mut self, equation: Equation) -> EquationId {
        self.live += 1;
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(equation);
                id
            }
            None => {
                self.slots.push(Some(equation));
                self.slots.len() - 1
            }
        }
    }

    pub fn get_mut(&mut self, id: EquationId) -> Option<&mut Equation> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: EquationId) -> Option<Equation> {
        let equation = self.slots.get_mut(id).and_then(Option::take)?;
        self.free.push(id);
        self.live -= 1;
        Some(equation)
    }

    pub fn len(&self) -> usize {
        self.live
    }
}

// endregion: --- Peeling structs

// region:    --- Decoder reporting

/// What a single accepted frame did to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing new: a repeated frame index, or every referenced chunk was known.
    Duplicate,
    /// Stored as a parity equation waiting for more chunks.
    Pending,
    /// `new_chunks` chunks became known, the transfer is still incomplete.
    Resolved { new_chunks: usize },
    /// The last missing chunk became known with this frame.
    Completed,
    /// The transfer had already completed, the frame was not looked at.
    AlreadyCompleted,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Every `decode` call before completion.
    pub frames_received: u64,
    /// Frames that parsed and belonged to the transmission.
    pub frames_accepted: u64,
    /// Accepted frames that carried new information.
    pub frames_useful: u64,
    pub duplicates: u64,
    /// Malformed, corrupted or foreign frames.
    pub rejected: u64,
    pub pending_equations: usize,
}

// endregion: --- Decoder reporting
