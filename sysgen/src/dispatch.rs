//! Call ids and the kernel dispatch table.
//!
//! Ids come from sorting the `K_SYSCALL_<NAME>` symbols of every call and
//! numbering from zero, followed by the two sentinels. The table binds
//! every id to a handler in two phases: first each call is resolved to a
//! [`Binding`], then the table is laid out from the resolved bindings. A
//! call that is disabled keeps its id but points at the shared
//! unimplemented handler.

use std::collections::{BTreeMap, BTreeSet};

use crate::cfrag::{self, Item};
use crate::error::{GenError, Result};
use crate::handler::handler_prototype;
use crate::signature::SyscallSet;

pub const ID_PREFIX: &str = "K_SYSCALL_";
pub const UNIMPLEMENTED_ID: &str = "K_SYSCALL_UNIMPLEMENTED";
pub const COUNT_ID: &str = "K_SYSCALL_NUM";
pub const UNIMPLEMENTED_HANDLER: &str = "handle_unimplemented";

pub const GENERATED_BANNER: &str = "auto-generated by sysgen, don't edit";

pub fn id_symbol(name: &str) -> String {
    format!("{ID_PREFIX}{}", name.to_uppercase())
}

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Stable numbering of one run's calls plus the two sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIds {
    /// `(symbol, call name)` sorted by symbol.
    calls: Vec<(String, String)>,
}

impl CallIds {
    pub fn assign<'a, I>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut by_symbol: BTreeMap<String, &str> = BTreeMap::new();
        for name in names {
            let symbol = id_symbol(name);
            if symbol == UNIMPLEMENTED_ID
                || symbol == COUNT_ID
                || format!("handle_{name}") == UNIMPLEMENTED_HANDLER
            {
                return Err(GenError::ReservedId {
                    name: name.to_string(),
                    symbol,
                });
            }
            if let Some(first) = by_symbol.insert(symbol.clone(), name) {
                return Err(GenError::IdCollision {
                    symbol,
                    first: first.to_string(),
                    second: name.to_string(),
                });
            }
        }
        let calls = by_symbol
            .into_iter()
            .map(|(symbol, name)| (symbol, name.to_string()))
            .collect();
        Ok(CallIds { calls })
    }

    pub fn from_set(set: &SyscallSet) -> Result<Self> {
        Self::assign(set.calls().map(|(_, c)| c.name.as_str()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn unimplemented(&self) -> usize {
        self.calls.len()
    }

    /// Value of the count sentinel, which is also the table size.
    pub fn count(&self) -> usize {
        self.calls.len() + 1
    }

    pub fn get(&self, symbol: &str) -> Option<usize> {
        match symbol {
            UNIMPLEMENTED_ID => Some(self.unimplemented()),
            COUNT_ID => Some(self.count()),
            _ => self.calls.iter().position(|(s, _)| s == symbol),
        }
    }

    /// Calls in id order as `(id, symbol, call name)`.
    pub fn calls(&self) -> impl Iterator<Item = (usize, &str, &str)> {
        self.calls
            .iter()
            .enumerate()
            .map(|(id, (symbol, name))| (id, symbol.as_str(), name.as_str()))
    }

    /// Every symbol with its value, sentinels last.
    pub fn listing(&self) -> Vec<(String, usize)> {
        let mut out: Vec<(String, usize)> =
            self.calls().map(|(id, symbol, _)| (symbol.to_string(), id)).collect();
        out.push((UNIMPLEMENTED_ID.to_string(), self.unimplemented()));
        out.push((COUNT_ID.to_string(), self.count()));
        out
    }
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// How the table reaches a call's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Weak alias of the unimplemented handler, overridden by the real one
    /// when it is linked in.
    Weak,
    /// Always linked in; gets a plain forward declaration.
    Strong,
    /// Configured out; the table points at the unimplemented handler.
    Unimplemented,
}

/// Configured exceptions to the default [`Binding::Weak`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub strong: BTreeSet<String>,
    pub disabled: BTreeSet<String>,
}

/// Resolve every call to a binding. Configured names must be calls.
pub fn resolve(ids: &CallIds, resolution: &Resolution) -> Result<BTreeMap<String, Binding>> {
    let known: BTreeSet<&str> = ids.calls().map(|(_, _, name)| name).collect();
    for (names, setting) in [
        (&resolution.strong, "strong"),
        (&resolution.disabled, "disabled"),
    ] {
        if let Some(name) = names.iter().find(|n| !known.contains(n.as_str())) {
            return Err(GenError::UnknownCall {
                name: name.clone(),
                setting,
            });
        }
    }
    if let Some(name) = resolution.strong.intersection(&resolution.disabled).next() {
        return Err(GenError::ConflictingBinding { name: name.clone() });
    }

    Ok(known
        .into_iter()
        .map(|name| {
            let binding = if resolution.disabled.contains(name) {
                Binding::Unimplemented
            } else if resolution.strong.contains(name) {
                Binding::Strong
            } else {
                Binding::Weak
            };
            (name.to_string(), binding)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTable {
    /// `(id symbol, handler)` in id order, unimplemented sentinel last.
    entries: Vec<(String, String)>,
    weak: Vec<String>,
    strong: Vec<String>,
}

impl DispatchTable {
    pub fn build(ids: &CallIds, bindings: &BTreeMap<String, Binding>) -> Result<Self> {
        let mut entries = Vec::with_capacity(ids.count());
        let mut weak = Vec::new();
        let mut strong = Vec::new();

        for (id, symbol, name) in ids.calls() {
            if id != entries.len() {
                return Err(GenError::Internal(format!(
                    "id {id} of `{symbol}` is out of sequence"
                )));
            }
            let binding = bindings.get(name).ok_or_else(|| {
                GenError::Internal(format!("no binding resolved for `{name}`"))
            })?;
            let handler = format!("handle_{name}");
            let target = match binding {
                Binding::Weak => {
                    weak.push(handler.clone());
                    handler
                }
                Binding::Strong => {
                    strong.push(handler.clone());
                    handler
                }
                Binding::Unimplemented => UNIMPLEMENTED_HANDLER.to_string(),
            };
            entries.push((symbol.to_string(), target));
        }
        entries.push((UNIMPLEMENTED_ID.to_string(), UNIMPLEMENTED_HANDLER.to_string()));

        if entries.len() != ids.count() {
            return Err(GenError::Internal(format!(
                "dispatch table has {} entries, expected {}",
                entries.len(),
                ids.count()
            )));
        }

        Ok(DispatchTable {
            entries,
            weak,
            strong,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handler_for(&self, symbol: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, h)| h.as_str())
    }

    /// The dispatch unit: fallback declarations and the table itself.
    pub fn emit(&self) -> String {
        let mut items = vec![
            Item::Comment(GENERATED_BANNER.to_string()),
            Item::Blank,
            Item::Comment(
                "Weak handler functions that get replaced by the real ones unless a system\n\
                 call is not implemented due to kernel configuration."
                    .to_string(),
            ),
        ];
        for handler in &self.weak {
            items.push(Item::Blank);
            items.push(Item::Line(format!("__weak ALIAS_OF({UNIMPLEMENTED_HANDLER})")));
            items.push(Item::Decl(handler_prototype(handler)));
        }
        if !self.strong.is_empty() {
            items.push(Item::Blank);
            for handler in &self.strong {
                items.push(Item::Decl(format!("extern {}", handler_prototype(handler))));
            }
        }
        items.push(Item::Blank);
        items.push(Item::Initializer {
            decl: format!("const syscall_handler_t k_syscall_table[{COUNT_ID}]"),
            values: self
                .entries
                .iter()
                .map(|(symbol, handler)| format!("[{symbol}] = {handler}"))
                .collect(),
        });
        cfrag::print(&items)
    }
}

/// The call-id listing header.
pub fn emit_call_list(ids: &CallIds) -> String {
    const GUARD: &str = "SYSCALL_LIST_H";
    let mut items = vec![
        Item::Comment(GENERATED_BANNER.to_string()),
        Item::Directive(format!("#ifndef {GUARD}")),
        Item::Directive(format!("#define {GUARD}")),
        Item::Blank,
    ];
    items.extend(
        ids.listing()
            .into_iter()
            .map(|(symbol, value)| Item::Directive(format!("#define {symbol} {value}"))),
    );
    items.extend([
        Item::Blank,
        Item::Directive("#ifndef _ASMLANGUAGE".to_string()),
        Item::Blank,
        Item::Directive("#include <sys/stdint.h>".to_string()),
        Item::Blank,
        Item::Directive("#endif /* _ASMLANGUAGE */".to_string()),
        Item::Blank,
        Item::Directive(format!("#endif /* {GUARD} */")),
    ]);
    cfrag::print(&items)
}
