//! Reconstruction state of one transmission and the peeling decoder over it.

use std::collections::{HashSet, VecDeque};

use super::models::{Equation, EquationArena, EquationId};
use crate::frame::{xor_into, Packet, Preamble};

/// Result of absorbing one frame into a `Transmission`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Absorbed {
    Duplicate,
    Pending,
    Resolved(usize),
}

#[derive(Debug)]
pub(crate) struct Transmission {
    pub total_chunks: u32,
    pub payload_length: u64,
    pub chunk_length: u32,
    // -- write once: a resolved chunk is never overwritten
    chunks: Vec<Option<Vec<u8>>>,
    resolved: usize,
    equations: EquationArena,
    // -- waiting[c] = equations that still list chunk c as unknown
    waiting: Vec<Vec<EquationId>>,
    seen_frames: HashSet<u64>,
}

impl Transmission {
    pub fn new(preamble: &Preamble) -> Self {
        let total = preamble.total_chunks as usize;
        Self {
            total_chunks: preamble.total_chunks,
            payload_length: preamble.payload_length,
            chunk_length: preamble.chunk_length,
            chunks: vec![None; total],
            resolved: 0,
            equations: EquationArena::default(),
            waiting: vec![Vec::new(); total],
            seen_frames: HashSet::new(),
        }
    }

    pub fn matches(&self, preamble: &Preamble) -> bool {
        self.total_chunks == preamble.total_chunks
            && self.payload_length == preamble.payload_length
            && self.chunk_length == preamble.chunk_length
    }

    pub fn resolved(&self) -> usize {
        self.resolved
    }

    pub fn total(&self) -> usize {
        self.chunks.len()
    }

    pub fn pending(&self) -> usize {
        self.equations.len()
    }

    pub fn is_complete(&self) -> bool {
        self.resolved == self.chunks.len()
    }

    /// Feeds one frame already checked with `matches`.
    pub fn absorb(&mut self, packet: Packet) -> Absorbed {
        if !self.seen_frames.insert(packet.preamble.frame_index) {
            return Absorbed::Duplicate;
        }

        // -- XOR out what is known, keep what is not
        let mut residue = packet.data;
        let mut unknown = Vec::new();
        for index in packet.preamble.encoded_indices {
            let index = index as usize;
            match &self.chunks[index] {
                Some(chunk) => xor_into(&mut residue, chunk),
                None => unknown.push(index),
            }
        }

        match unknown.len() {
            0 => Absorbed::Duplicate,
            1 => Absorbed::Resolved(self.peel(unknown[0], residue)),
            _ => {
                let id = self.equations.insert(Equation {
                    unknown: unknown.clone(),
                    residue,
                });
                for index in unknown {
                    self.waiting[index].push(id);
                }
                Absorbed::Pending
            }
        }
    }

    /// Resolves `index` and propagates through pending equations until fixpoint.
    /// Returns the number of newly resolved chunks.
    fn peel(&mut self, index: usize, bytes: Vec<u8>) -> usize {
        let mut queue = VecDeque::from([(index, bytes)]);
        let mut newly_resolved = 0;

        while let Some((index, bytes)) = queue.pop_front() {
            if self.chunks[index].is_some() {
                continue;
            }
            for id in std::mem::take(&mut self.waiting[index]) {
                let Some(equation) = self.equations.get_mut(id) else {
                    continue;
                };
                xor_into(&mut equation.residue, &bytes);
                equation.unknown.retain(|&u| u != index);
                if equation.unknown.len() > 1 {
                    continue;
                }
                if let Some(equation) = self.equations.remove(id) {
                    if let Some(&last) = equation.unknown.first() {
                        queue.push_back((last, equation.residue));
                    }
                }
            }
            self.chunks[index] = Some(bytes);
            self.resolved += 1;
            newly_resolved += 1;
        }
        newly_resolved
    }

    /// Concatenated chunks with the padding cut off. `None` until complete.
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let mut payload = Vec::with_capacity(self.chunks.len() * self.chunk_length as usize);
        for chunk in self.chunks.iter().flatten() {
            payload.extend_from_slice(chunk);
        }
        payload.truncate(self.payload_length as usize);
        Some(payload)
    }
}
