//! Slot allocation for the register-passing convention.
//!
//! Every argument is assigned one slot (a native-width word) or, when the
//! classifier says it is wide, two consecutive slots holding the low half
//! then the high half. A wide return value takes one more slot that carries
//! the address the handler writes the result to.
//!
//! Only [`DIRECT_SLOTS`] words travel in registers. When a call needs more,
//! slots from [`OVERFLOW_CUT`] onwards are packed into an out-of-band block
//! and register [`OVERFLOW_CUT`] carries the block's address instead. Both
//! emitters ask the plan where a slot lives; neither recomputes it.

use serde::Serialize;

use crate::signature::Signature;
use crate::width::WidthClassifier;

/// Words the trap primitive passes in registers.
pub const DIRECT_SLOTS: usize = 6;

/// First slot index that moves into the overflow block, and the register
/// that then carries the block's address.
pub const OVERFLOW_CUT: usize = DIRECT_SLOTS - 1;

/// Where one parameter's value is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRef {
    Direct(usize),
    /// Low half first, then high half.
    SplitDirect(usize, usize),
}

impl SlotRef {
    pub fn is_split(&self) -> bool {
        matches!(self, SlotRef::SplitDirect(..))
    }

    /// The first slot this parameter occupies.
    pub fn first(&self) -> usize {
        match *self {
            SlotRef::Direct(s) | SlotRef::SplitDirect(s, _) => s,
        }
    }
}

/// Physical position of a slot on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLocation {
    /// Passed directly in this register.
    Register(usize),
    /// Word at this position of the overflow block.
    Overflow(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotPlan {
    pub param_slots: Vec<SlotRef>,
    pub return_is_wide: bool,
    pub total_slots: usize,
}

impl SlotPlan {
    pub fn allocate(sig: &Signature, classifier: &WidthClassifier) -> Self {
        let mut next = 0;
        let param_slots = sig
            .params
            .iter()
            .map(|p| {
                let slot = if classifier.is_wide(&p.ty) {
                    SlotRef::SplitDirect(next, next + 1)
                } else {
                    SlotRef::Direct(next)
                };
                next += if slot.is_split() { 2 } else { 1 };
                slot
            })
            .collect();

        let return_is_wide = classifier.is_wide(&sig.return_type);
        if return_is_wide {
            next += 1;
        }

        SlotPlan {
            param_slots,
            return_is_wide,
            total_slots: next,
        }
    }

    pub fn overflows(&self) -> bool {
        self.total_slots > DIRECT_SLOTS
    }

    /// Words in the overflow block; zero when everything fits in registers.
    pub fn overflow_len(&self) -> usize {
        if self.overflows() {
            self.total_slots - OVERFLOW_CUT
        } else {
            0
        }
    }

    /// Registers the trap actually carries, including the block reference.
    pub fn registers_used(&self) -> usize {
        self.total_slots.min(DIRECT_SLOTS)
    }

    pub fn location(&self, slot: usize) -> SlotLocation {
        debug_assert!(slot < self.total_slots, "slot {slot} out of plan");
        if self.overflows() && slot >= OVERFLOW_CUT {
            SlotLocation::Overflow(slot - OVERFLOW_CUT)
        } else {
            SlotLocation::Register(slot)
        }
    }

    /// Slot carrying the address of the wide return holder.
    pub fn return_slot(&self) -> Option<usize> {
        self.return_is_wide.then(|| self.total_slots - 1)
    }
}

/// Free-function form of [`SlotPlan::allocate`].
pub fn allocate(sig: &Signature, classifier: &WidthClassifier) -> SlotPlan {
    SlotPlan::allocate(sig, classifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(decl: &str, params: &str) -> Signature {
        Signature::parse(decl, params, 0).unwrap()
    }

    #[test]
    fn narrow_call_takes_one_slot_per_param() {
        let plan = allocate(&sig("int foo", "int a"), &WidthClassifier::narrow_registers());
        assert_eq!(plan.param_slots, [SlotRef::Direct(0)]);
        assert_eq!(plan.total_slots, 1);
        assert!(!plan.return_is_wide);
        assert!(!plan.overflows());
    }

    #[test]
    fn wide_param_splits_low_then_high() {
        let plan = allocate(
            &sig("void bar", "s64_t a, int b"),
            &WidthClassifier::narrow_registers(),
        );
        assert_eq!(
            plan.param_slots,
            [SlotRef::SplitDirect(0, 1), SlotRef::Direct(2)]
        );
        assert_eq!(plan.total_slots, 3);
        assert!(!plan.overflows());
    }

    #[test]
    fn native_wide_target_does_not_split() {
        let plan = allocate(&sig("void bar", "s64_t a, int b"), &WidthClassifier::native_wide());
        assert_eq!(plan.param_slots, [SlotRef::Direct(0), SlotRef::Direct(1)]);
        assert_eq!(plan.total_slots, 2);
    }

    #[test]
    fn wide_return_reserves_last_slot() {
        let plan = allocate(&sig("u64_t k_uptime", "int a"), &WidthClassifier::narrow_registers());
        assert!(plan.return_is_wide);
        assert_eq!(plan.total_slots, 2);
        assert_eq!(plan.return_slot(), Some(1));
    }

    #[test]
    fn zero_slot_call() {
        let plan = allocate(&sig("void k_yield", "void"), &WidthClassifier::narrow_registers());
        assert_eq!(plan.total_slots, 0);
        assert_eq!(plan.registers_used(), 0);
        assert_eq!(plan.overflow_len(), 0);
        assert_eq!(plan.return_slot(), None);
    }

    #[test]
    fn six_slots_stay_in_registers() {
        let plan = allocate(
            &sig("int f", "int a, int b, int c, int d, int e, int g"),
            &WidthClassifier::narrow_registers(),
        );
        assert_eq!(plan.total_slots, 6);
        assert!(!plan.overflows());
        assert_eq!(plan.location(5), SlotLocation::Register(5));
    }

    #[test]
    fn seven_slots_cut_over_at_five() {
        let plan = allocate(
            &sig("int f", "int a, int b, int c, int d, int e, u64_t g"),
            &WidthClassifier::narrow_registers(),
        );
        assert_eq!(plan.total_slots, 7);
        assert!(plan.overflows());
        assert_eq!(plan.registers_used(), DIRECT_SLOTS);
        assert_eq!(plan.overflow_len(), 2);
        for slot in 0..5 {
            assert_eq!(plan.location(slot), SlotLocation::Register(slot));
        }
        assert_eq!(plan.location(5), SlotLocation::Overflow(0));
        assert_eq!(plan.location(6), SlotLocation::Overflow(1));
    }

    #[test]
    fn wide_return_slot_can_overflow() {
        let plan = allocate(
            &sig("s64_t f", "int a, int b, int c, int d, int e, int g"),
            &WidthClassifier::narrow_registers(),
        );
        assert_eq!(plan.total_slots, 7);
        assert_eq!(plan.return_slot(), Some(6));
        assert_eq!(plan.location(6), SlotLocation::Overflow(1));
    }

    #[test]
    fn serializes_for_plan_dumps() {
        let plan = allocate(&sig("void bar", "u64_t a, int b"), &WidthClassifier::narrow_registers());
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["total_slots"], 3);
        assert_eq!(json["param_slots"][0]["split_direct"][1], 1);
        assert_eq!(json["param_slots"][1]["direct"], 2);
    }
}
