//! Executable model of the wire format described by a [`SlotPlan`].
//!
//! [`pack`] follows the same placement rules as the generated wrapper and
//! [`unpack`] the same rules as the generated handler. Both read slot
//! positions from the plan, so the model checks the plan itself: a layout
//! bug that would desynchronise the two generated bodies shows up here as a
//! failed round trip.

use thiserror::Error;

use crate::slots::{DIRECT_SLOTS, OVERFLOW_CUT, SlotLocation, SlotPlan, SlotRef};

/// One marshalled word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    Value(u64),
    /// Address of the caller's wide return holder.
    ReturnHolder,
}

/// Contents of one trap register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Unused,
    Word(Word),
    /// Address of the overflow block.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub registers: [Register; DIRECT_SLOTS],
    pub block: Vec<Word>,
}

/// Arguments as the handler hands them to the implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    pub args: Vec<u64>,
    pub return_holder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("expected {expected} arguments, got {found}")]
    ArgCount { expected: usize, found: usize },
    #[error("argument {index} does not fit in its slots")]
    ValueTooWide { index: usize },
    /// The handler's bounds check on the overflow block failed.
    #[error("overflow block holds {found} words, call needs {expected}")]
    BlockLength { expected: usize, found: usize },
    #[error("slot {slot} does not hold what the plan expects")]
    BadSlot { slot: usize },
}

fn mask(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Low and high halves of `value` for `word_bits`-wide registers.
pub fn split(value: u64, word_bits: u32) -> (u64, u64) {
    let hi = if word_bits >= u64::BITS {
        0
    } else {
        value >> word_bits
    };
    (value & mask(word_bits), hi)
}

/// Inverse of [`split`].
pub fn join(lo: u64, hi: u64, word_bits: u32) -> u64 {
    if word_bits >= u64::BITS {
        lo
    } else {
        lo | (hi << word_bits)
    }
}

/// Marshal `args` the way the wrapper does.
pub fn pack(plan: &SlotPlan, args: &[u64], word_bits: u32) -> Result<WireFrame, WireError> {
    if args.len() != plan.param_slots.len() {
        return Err(WireError::ArgCount {
            expected: plan.param_slots.len(),
            found: args.len(),
        });
    }

    let mut words = vec![Word::Value(0); plan.total_slots];
    for (index, (slot, &value)) in plan.param_slots.iter().zip(args).enumerate() {
        match *slot {
            SlotRef::Direct(s) => {
                if value & !mask(word_bits) != 0 {
                    return Err(WireError::ValueTooWide { index });
                }
                words[s] = Word::Value(value);
            }
            SlotRef::SplitDirect(lo, hi) => {
                if value & !mask(word_bits.saturating_mul(2)) != 0 {
                    return Err(WireError::ValueTooWide { index });
                }
                let (l, h) = split(value, word_bits);
                words[lo] = Word::Value(l);
                words[hi] = Word::Value(h);
            }
        }
    }
    if let Some(r) = plan.return_slot() {
        words[r] = Word::ReturnHolder;
    }

    let mut registers = [Register::Unused; DIRECT_SLOTS];
    let mut block = Vec::with_capacity(plan.overflow_len());
    for (slot, word) in words.into_iter().enumerate() {
        match plan.location(slot) {
            SlotLocation::Register(r) => registers[r] = Register::Word(word),
            SlotLocation::Overflow(_) => block.push(word),
        }
    }
    if plan.overflows() {
        registers[OVERFLOW_CUT] = Register::Block;
    }

    Ok(WireFrame { registers, block })
}

/// Reconstruct the arguments the way the handler does.
pub fn unpack(plan: &SlotPlan, frame: &WireFrame, word_bits: u32) -> Result<Unpacked, WireError> {
    if frame.block.len() != plan.overflow_len() {
        return Err(WireError::BlockLength {
            expected: plan.overflow_len(),
            found: frame.block.len(),
        });
    }
    if plan.overflows() && frame.registers[OVERFLOW_CUT] != Register::Block {
        return Err(WireError::BadSlot { slot: OVERFLOW_CUT });
    }

    let word_at = |slot: usize| -> Result<Word, WireError> {
        match plan.location(slot) {
            SlotLocation::Register(r) => match frame.registers[r] {
                Register::Word(w) => Ok(w),
                _ => Err(WireError::BadSlot { slot }),
            },
            SlotLocation::Overflow(p) => Ok(frame.block[p]),
        }
    };
    let value_at = |slot: usize| -> Result<u64, WireError> {
        match word_at(slot)? {
            Word::Value(v) => Ok(v),
            Word::ReturnHolder => Err(WireError::BadSlot { slot }),
        }
    };

    let args = plan
        .param_slots
        .iter()
        .map(|slot| match *slot {
            SlotRef::Direct(s) => value_at(s),
            SlotRef::SplitDirect(lo, hi) => Ok(join(value_at(lo)?, value_at(hi)?, word_bits)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(r) = plan.return_slot()
        && word_at(r)? != Word::ReturnHolder
    {
        return Err(WireError::BadSlot { slot: r });
    }

    Ok(Unpacked {
        args,
        return_holder: plan.return_is_wide,
    })
}
