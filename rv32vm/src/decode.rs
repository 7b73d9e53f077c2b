//! Instruction decoder
//!
//! Decoding happens in multiple steps, each of which masks out a
//! portion of the instruction word and compares the result against a
//! set of values. Depending on the value obtained, decoding proceeds
//! to the next step. The next step is either another [`Decoder`] or
//! the value stored for the instruction (here, an execution
//! function).
//!
//! The decoder is a tree. Each node holds the mask applied at that
//! node, and each edge is a value that can be obtained under the
//! mask. Decoding an instruction means following a branch from the
//! root mask (the opcode) to a leaf. For RV32IM the tree is at most
//! three levels deep: opcode, then funct3, then funct7 (or the full
//! I-type immediate for SYSTEM instructions).

use std::collections::{hash_map::Entry, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecoderError {
    #[error("missing next step for mask 0x{mask:x} and value 0x{value:x}")]
    MissingNextStep { mask: u32, value: u32 },
    #[error("attempt to add decoding with conflicting mask 0x{mask:x}")]
    AmbiguousDecodingMask { mask: u32 },
    #[error("attempt to add decoding conflicting with an existing instruction")]
    ConflictingExec,
    #[error("at least one mask and value is compulsory in push_instruction")]
    NoDecodingMaskSpecified,
}

/// Represents a node and subsequent edge in the decoder tree
pub struct MaskWithValue {
    pub mask: u32,
    pub value: u32,
}

#[derive(Debug)]
enum NextStep<E> {
    Decode(Decoder<E>),
    Exec(E),
}

#[derive(Debug)]
pub struct Decoder<E> {
    mask: u32,
    value_map: HashMap<u32, NextStep<E>>,
}

impl<E: Copy> Decoder<E> {
    pub fn new(mask: u32) -> Self {
        Self {
            mask,
            value_map: HashMap::new(),
        }
    }

    /// Walk the tree by applying each node's mask to the instruction,
    /// until an execution value is reached
    pub fn get_exec(&self, instr: u32) -> Result<E, DecoderError> {
        let value = self.mask & instr;
        match self.value_map.get(&value) {
            Some(NextStep::Exec(exec)) => Ok(*exec),
            Some(NextStep::Decode(decoder)) => decoder.get_exec(instr),
            None => Err(DecoderError::MissingNextStep {
                mask: self.mask,
                value,
            }),
        }
    }

    /// Add an instruction, specified by a sequence of masks and
    /// expected values
    ///
    /// The vector is in reverse order: the last element is consumed
    /// by this node, and earlier elements build the levels below it.
    /// Adding an instruction amounts to adding a new branch to the
    /// tree.
    ///
    /// Two kinds of insertion error can happen. A mask following a
    /// value can conflict with the mask already present at that node,
    /// which is a decoding ambiguity (the decoder would not know
    /// which mask to apply next). Alternatively the new branch can be
    /// a prefix or extension of an existing branch, in which case the
    /// new decoding would shadow (or be shadowed by) an instruction
    /// that is already present.
    pub fn push_instruction(
        &mut self,
        mut masks_with_values: Vec<MaskWithValue>,
        exec: E,
    ) -> Result<(), DecoderError> {
        let MaskWithValue { mask, value } = masks_with_values
            .pop()
            .ok_or(DecoderError::NoDecodingMaskSpecified)?;
        if mask != self.mask {
            return Err(DecoderError::AmbiguousDecodingMask { mask });
        }

        if masks_with_values.is_empty() {
            return match self.value_map.entry(value) {
                Entry::Occupied(_) => Err(DecoderError::ConflictingExec),
                Entry::Vacant(slot) => {
                    slot.insert(NextStep::Exec(exec));
                    Ok(())
                }
            };
        }

        let next_mask = masks_with_values
            .last()
            .expect("vector is non-empty here")
            .mask;
        match self.value_map.entry(value) {
            Entry::Occupied(mut slot) => match slot.get_mut() {
                NextStep::Decode(decoder) => decoder.push_instruction(masks_with_values, exec),
                NextStep::Exec(_) => Err(DecoderError::ConflictingExec),
            },
            Entry::Vacant(slot) => {
                let mut decoder = Decoder::new(next_mask);
                decoder.push_instruction(masks_with_values, exec)?;
                slot.insert(NextStep::Decode(decoder));
                Ok(())
            }
        }
    }
}
