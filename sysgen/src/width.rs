//! Width classification: which values need two registers to cross the trap.

use std::collections::BTreeSet;

use crate::signature::TypeRef;

/// Types split on narrow-register targets unless configured otherwise.
pub const DEFAULT_WIDE_TYPES: &[&str] = &["s64_t", "u64_t"];

/// Size of a wide value. A register at least this wide never splits.
pub const WIDE_BITS: u32 = 64;

/// Register width of the narrowest supported target.
pub const NARROW_REGISTER_BITS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthClassifier {
    wide_types: BTreeSet<String>,
    register_bits: u32,
}

impl WidthClassifier {
    pub fn new(register_bits: u32) -> Self {
        WidthClassifier {
            wide_types: DEFAULT_WIDE_TYPES.iter().map(|t| t.to_string()).collect(),
            register_bits,
        }
    }

    /// 32-bit registers: the configured wide types are split in two.
    pub fn narrow_registers() -> Self {
        Self::new(NARROW_REGISTER_BITS)
    }

    /// 64-bit registers: nothing is ever split.
    pub fn native_wide() -> Self {
        Self::new(WIDE_BITS)
    }

    pub fn with_wide_type(mut self, tag: impl Into<String>) -> Self {
        self.add_wide_type(tag);
        self
    }

    pub fn add_wide_type(&mut self, tag: impl Into<String>) {
        self.wide_types.insert(tag.into().trim().to_string());
    }

    pub fn register_bits(&self) -> u32 {
        self.register_bits
    }

    /// Whether this target splits wide values at all.
    pub fn splits(&self) -> bool {
        self.register_bits < WIDE_BITS
    }

    pub fn wide_types(&self) -> impl Iterator<Item = &str> {
        self.wide_types.iter().map(String::as_str)
    }

    /// True iff `tag` is a wide type and the target's registers are narrow.
    pub fn classify(&self, tag: &str) -> bool {
        self.splits() && self.wide_types.contains(tag.trim())
    }

    pub fn is_wide(&self, ty: &TypeRef) -> bool {
        self.classify(ty.as_str())
    }
}

impl Default for WidthClassifier {
    fn default() -> Self {
        Self::narrow_registers()
    }
}
