//! Whole-run generation.
//!
//! [`generate`] is pure: it turns a [`SyscallSet`] into an in-memory
//! [`Artifacts`] value or fails without side effects. [`Artifacts::write`]
//! is the only place that touches the filesystem, and it is reached only
//! once every artifact has been produced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cfrag::{self, Item};
use crate::dispatch::{self, CallIds, DispatchTable, GENERATED_BANNER, Resolution};
use crate::error::{GenError, Result};
use crate::handler::emit_handler;
use crate::signature::SyscallSet;
use crate::slots::SlotPlan;
use crate::width::WidthClassifier;
use crate::wrapper::emit_wrapper;

#[derive(Debug, Clone, Default)]
pub struct GenOptions {
    pub classifier: WidthClassifier,
    pub resolution: Resolution,
}

/// Every generated file, keyed the way it is laid out on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub dispatch: String,
    pub call_list: String,
    /// Wrapper header per declaring unit.
    pub headers: BTreeMap<String, String>,
    /// Handler unit per call.
    pub handlers: BTreeMap<String, String>,
}

/// Where [`Artifacts::write`] puts each artifact.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub dispatch: PathBuf,
    pub call_list: PathBuf,
    /// Directory for wrapper headers and handler units.
    pub base: PathBuf,
}

/// A call's id and slot plan, as reported by `sysgen plan`.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedCall {
    pub name: String,
    pub unit: String,
    pub id: usize,
    pub symbol: String,
    pub overflow_words: usize,
    pub plan: SlotPlan,
}

const STRICT_ALIASING_PUSH: &[&str] = &[
    "#if __GNUC__ > 4 || (__GNUC__ == 4 && __GNUC_MINOR__ >= 6)",
    "#pragma GCC diagnostic push",
    "#endif",
    "#ifdef __GNUC__",
    "#pragma GCC diagnostic ignored \"-Wstrict-aliasing\"",
    "#endif",
];

const STRICT_ALIASING_POP: &[&str] = &[
    "#if __GNUC__ > 4 || (__GNUC__ == 4 && __GNUC_MINOR__ >= 6)",
    "#pragma GCC diagnostic pop",
    "#endif",
];

fn directives(lines: &[&str]) -> impl Iterator<Item = Item> {
    lines.iter().map(|l| Item::Directive(l.to_string()))
}

/// `INCLUDE_SYSCALLS_<UNIT>` with every non-alphanumeric character folded
/// to `_`.
pub fn include_guard(unit: &str) -> String {
    format!("INCLUDE_SYSCALLS_{unit}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Handler unit file name for a call.
pub fn handler_file(call: &str) -> String {
    format!("{call}_mrsh.c")
}

pub fn plans(set: &SyscallSet, classifier: &WidthClassifier) -> Result<Vec<PlannedCall>> {
    let ids = CallIds::from_set(set)?;
    set.calls()
        .map(|(unit, sig)| {
            let symbol = sig.id_symbol();
            let id = ids
                .get(&symbol)
                .ok_or_else(|| GenError::Internal(format!("no id for `{}`", sig.name)))?;
            let plan = SlotPlan::allocate(sig, classifier);
            Ok(PlannedCall {
                name: sig.name.clone(),
                unit: unit.name.clone(),
                id,
                symbol,
                overflow_words: plan.overflow_len(),
                plan,
            })
        })
        .collect()
}

pub fn generate(set: &SyscallSet, options: &GenOptions) -> Result<Artifacts> {
    let ids = CallIds::from_set(set)?;
    let bindings = dispatch::resolve(&ids, &options.resolution)?;
    let table = DispatchTable::build(&ids, &bindings)?;

    let mut headers = BTreeMap::new();
    let mut handlers = BTreeMap::new();
    for unit in set.units() {
        let mut wrappers = Vec::with_capacity(unit.calls.len());
        for sig in &unit.calls {
            let plan = SlotPlan::allocate(sig, &options.classifier);
            log::debug!(
                "{}: {} slot(s), plan {:?}",
                sig.name,
                plan.total_slots,
                plan.param_slots
            );
            if plan.overflows() {
                log::trace!(
                    "{}: {} word(s) in overflow block",
                    sig.name,
                    plan.overflow_len()
                );
            }
            wrappers.push(emit_wrapper(sig, &plan));
            handlers.insert(
                sig.name.clone(),
                handler_unit(&unit.name, emit_handler(sig, &plan)),
            );
        }
        headers.insert(unit.name.clone(), wrapper_header(&unit.name, wrappers));
    }

    Ok(Artifacts {
        dispatch: table.emit(),
        call_list: dispatch::emit_call_list(&ids),
        headers,
        handlers,
    })
}

fn wrapper_header(unit: &str, wrappers: Vec<Vec<Item>>) -> String {
    let guard = include_guard(unit);
    let mut items = vec![
        Item::Comment(GENERATED_BANNER.to_string()),
        Item::Directive(format!("#ifndef {guard}")),
        Item::Directive(format!("#define {guard}")),
        Item::Blank,
        Item::Directive("#ifndef _ASMLANGUAGE".to_string()),
        Item::Blank,
        Item::Directive("#include <syscall_list.h>".to_string()),
        Item::Directive("#include <api/syscall.h>".to_string()),
        Item::Blank,
    ];
    items.extend(directives(STRICT_ALIASING_PUSH));
    items.extend([
        Item::Blank,
        Item::Directive("#ifdef __cplusplus".to_string()),
        Item::Line("extern \"C\" {".to_string()),
        Item::Directive("#endif".to_string()),
    ]);
    for wrapper in wrappers {
        items.push(Item::Blank);
        items.extend(wrapper);
    }
    items.extend([
        Item::Blank,
        Item::Directive("#ifdef __cplusplus".to_string()),
        Item::Line("}".to_string()),
        Item::Directive("#endif".to_string()),
        Item::Blank,
    ]);
    items.extend(directives(STRICT_ALIASING_POP));
    items.extend([
        Item::Blank,
        Item::Directive("#endif /* _ASMLANGUAGE */".to_string()),
        Item::Directive(format!("#endif /* {guard} */")),
    ]);
    cfrag::print(&items)
}

fn handler_unit(unit: &str, handler: Vec<Item>) -> String {
    let mut items = vec![Item::Comment(GENERATED_BANNER.to_string())];
    items.extend(directives(STRICT_ALIASING_PUSH));
    items.push(Item::Directive(format!("#include <syscalls/{unit}>")));
    items.push(Item::Blank);
    items.extend(handler);
    items.push(Item::Blank);
    items.extend(directives(STRICT_ALIASING_POP));
    cfrag::print(&items)
}

impl Artifacts {
    /// Every output file with its contents, in a stable order.
    pub fn files<'a>(&'a self, out: &'a OutputPaths) -> impl Iterator<Item = (PathBuf, &'a str)> {
        let tables = [
            (out.dispatch.clone(), self.dispatch.as_str()),
            (out.call_list.clone(), self.call_list.as_str()),
        ];
        let headers = self
            .headers
            .iter()
            .map(|(unit, text)| (out.base.join(unit), text.as_str()));
        let handlers = self
            .handlers
            .iter()
            .map(|(call, text)| (out.base.join(handler_file(call)), text.as_str()));
        tables.into_iter().chain(headers).chain(handlers)
    }

    pub fn write(&self, out: &OutputPaths) -> Result<()> {
        create_dir(&out.base)?;
        for (path, text) in self.files(out) {
            if let Some(parent) = path.parent() {
                create_dir(parent)?;
            }
            std::fs::write(&path, text).map_err(|e| GenError::io(&path, e))?;
            log::info!("wrote {}", path.display());
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| GenError::io(dir, e))
}
