//! Signature model for system calls.
//!
//! Declarations arrive as JSON records produced by the header scanner:
//!
//! ```json
//! [
//!   [["int k_sem_take", "struct k_sem *sem, s64_t timeout"], "kernel.h"],
//!   [["void k_yield", "void"], "kernel.h"]
//! ]
//! ```
//!
//! Each record is the return type and name, the parameter list, and the
//! header (source unit) that declared it. Parsing rejects shapes the wire
//! format cannot carry: arrays and bare function pointer types.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{DeclFault, GenError, Result};
use crate::generate::handler_file;
use crate::wrapper::is_reserved_local;

static TYPED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)([A-Za-z0-9_]+)$").expect("static regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A C type as written in the declaration, e.g. `const char *`.
///
/// The tag is opaque to the generator; only the width classifier looks
/// inside it, and only to compare against the configured wide types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(String);

impl TypeRef {
    pub fn new(tag: impl Into<String>) -> Self {
        TypeRef(tag.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_void(&self) -> bool {
        self.0 == "void"
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub ty: TypeRef,
    pub name: String,
}

/// A normalized system call: name, return type and ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub return_type: TypeRef,
    pub params: Vec<Param>,
}

impl Signature {
    /// Parse a declaration such as `("int k_foo", "int a, u64_t b")`.
    ///
    /// `record` is the position of the declaration in the input and only
    /// feeds error reporting.
    pub fn parse(decl: &str, params: &str, record: usize) -> Result<Self> {
        let malformed = |item: &str, fault| GenError::Malformed {
            record,
            decl: decl.trim().to_string(),
            item: item.trim().to_string(),
            fault,
        };

        let (return_type, name) = parse_typed_name(decl).map_err(|f| malformed(decl, f))?;

        let params = match params.trim() {
            "" | "void" => Vec::new(),
            list => list
                .split(',')
                .map(|item| {
                    let (ty, name) = parse_typed_name(item).map_err(|f| malformed(item, f))?;
                    if is_reserved_local(&name) {
                        return Err(malformed(item, DeclFault::ReservedName));
                    }
                    Ok(Param { ty, name })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(Signature {
            name,
            return_type,
            params,
        })
    }

    /// `K_SYSCALL_<NAME>`, the symbolic call id.
    pub fn id_symbol(&self) -> String {
        crate::dispatch::id_symbol(&self.name)
    }

    /// Kernel-side entry point that unmarshals the call.
    pub fn handler_name(&self) -> String {
        format!("handle_{}", self.name)
    }

    /// The real implementation both sides eventually call.
    pub fn impl_name(&self) -> String {
        format!("syscall_{}", self.name)
    }

    /// Parameter list as it appears in a prototype.
    pub fn prototype_params(&self) -> String {
        if self.params.is_empty() {
            return "void".to_string();
        }
        self.params
            .iter()
            .map(|p| format!("{} {}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn returns_void(&self) -> bool {
        self.return_type.is_void()
    }
}

/// Split `"<type> <name>"` into its type and trailing identifier.
pub fn parse_typed_name(item: &str) -> std::result::Result<(TypeRef, String), DeclFault> {
    let item = item.trim();
    if item.contains('[') {
        return Err(DeclFault::Array);
    }
    if item.contains('(') {
        return Err(DeclFault::FunctionPointer);
    }
    let caps = TYPED_NAME.captures(item).ok_or(DeclFault::Unparseable)?;
    let ty = caps[1].trim();
    if ty.is_empty() {
        return Err(DeclFault::Unparseable);
    }
    Ok((TypeRef::new(ty), caps[2].to_string()))
}

// ---------------------------------------------------------------------------
// Input set
// ---------------------------------------------------------------------------

/// One header that declares system calls, with its calls in source order.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub name: String,
    pub calls: Vec<Signature>,
}

#[derive(Deserialize)]
struct RawRecord((String, String), String);

/// Every system call of one generation run, grouped by declaring header.
#[derive(Debug, Clone, Default)]
pub struct SyscallSet {
    units: Vec<SourceUnit>,
}

impl SyscallSet {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| GenError::io(path, e))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let records: Vec<RawRecord> = serde_json::from_str(text)?;
        Self::from_records(
            records
                .iter()
                .map(|RawRecord((decl, params), unit)| (decl.as_str(), params.as_str(), unit.as_str())),
        )
    }

    /// Build the set from `(declaration, parameter list, unit)` records.
    ///
    /// Fails on the first malformed declaration, duplicated name or unit
    /// name that cannot be written below the output directory.
    pub fn from_records<'a, I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut units: Vec<SourceUnit> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (record, (decl, params, unit)) in records.into_iter().enumerate() {
            let sig = Signature::parse(decl, params, record)?;
            if let Some(&first) = seen.get(&sig.name) {
                return Err(GenError::Duplicate {
                    record,
                    name: sig.name,
                    first_unit: units[first].name.clone(),
                });
            }

            let handler = handler_file(&sig.name);
            if unit == handler || units.iter().any(|u| u.name == handler) {
                return Err(GenError::UnitPath {
                    record,
                    unit: handler,
                    reason: format!("collides with the handler unit of `{}`", sig.name),
                });
            }

            let idx = match units.iter().position(|u| u.name == unit) {
                Some(idx) => idx,
                None => {
                    check_unit(unit, record, seen.keys())?;
                    units.push(SourceUnit {
                        name: unit.to_string(),
                        calls: Vec::new(),
                    });
                    units.len() - 1
                }
            };
            seen.insert(sig.name.clone(), idx);
            units[idx].calls.push(sig);
        }

        Ok(SyscallSet { units })
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    /// All calls with their declaring unit, in input order per unit.
    pub fn calls(&self) -> impl Iterator<Item = (&SourceUnit, &Signature)> {
        self.units
            .iter()
            .flat_map(|u| u.calls.iter().map(move |c| (u, c)))
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.calls().map(|(_, c)| c).find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.units.iter().map(|u| u.calls.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A unit name becomes a path under the output directory: it must stay
/// relative, below that directory, and clear of every handler unit.
fn check_unit<'a>(
    unit: &str,
    record: usize,
    calls: impl IntoIterator<Item = &'a String>,
) -> Result<()> {
    let path = Path::new(unit);
    let reason = if unit.is_empty() {
        Some("empty unit name".to_string())
    } else if path.has_root() || path.is_absolute() {
        Some("absolute paths are not allowed".to_string())
    } else if path.components().any(|c| !matches!(c, Component::Normal(_))) {
        Some("`.` and `..` components are not allowed".to_string())
    } else {
        calls
            .into_iter()
            .find(|call| handler_file(call) == unit)
            .map(|call| format!("collides with the handler unit of `{call}`"))
    };
    match reason {
        Some(reason) => Err(GenError::UnitPath {
            record,
            unit: unit.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
