//! Kernel-side handler emission.
//!
//! Every handler has the dispatcher's fixed shape: six register words and
//! the caller's context token. When the plan overflows, the sixth word is
//! the overflow block and is declared `void *more`.

use crate::cfrag::{Item, Stmt, split_union};
use crate::slots::{DIRECT_SLOTS, OVERFLOW_CUT, SlotLocation, SlotPlan, SlotRef};
use crate::signature::Signature;
use crate::wrapper::OVERFLOW_BLOCK;

/// Context token parameter supplied by the trap path.
pub const CONTEXT_TOKEN: &str = "ssf";

/// Where the handler reads slot `slot` from.
pub fn slot_expr(plan: &SlotPlan, slot: usize) -> String {
    match plan.location(slot) {
        SlotLocation::Register(r) => format!("arg{r}"),
        SlotLocation::Overflow(pos) => format!("(((uintptr_t *){OVERFLOW_BLOCK})[{pos}])"),
    }
}

/// Parameter list shared by every handler and the dispatch declarations.
pub fn handler_params(overflows: bool) -> String {
    let mut params: Vec<String> = (0..OVERFLOW_CUT).map(|r| format!("uintptr_t arg{r}")).collect();
    if overflows {
        params.push(format!("void *{OVERFLOW_BLOCK}"));
    } else {
        params.push(format!("uintptr_t arg{OVERFLOW_CUT}"));
    }
    params.push(format!("void *{CONTEXT_TOKEN}"));
    params.join(", ")
}

/// Prototype of a handler as the dispatch table sees it.
pub fn handler_prototype(name: &str) -> String {
    format!("uintptr_t {name}({})", handler_params(false))
}

pub fn emit_handler(sig: &Signature, plan: &SlotPlan) -> Vec<Item> {
    let mut body = vec![Stmt::Expr(format!(
        "_current_cpu->syscall_frame_point = {CONTEXT_TOKEN}"
    ))];

    for r in plan.registers_used()..DIRECT_SLOTS {
        body.push(Stmt::Unused(format!("arg{r}")));
    }

    if plan.overflows() {
        body.push(Stmt::Expr(format!(
            "SYSCALL_OOPS(SYSCALL_MEMORY_READ({OVERFLOW_BLOCK}, {} * sizeof(uintptr_t)))",
            plan.overflow_len()
        )));
    }

    let mut args = Vec::with_capacity(sig.params.len());
    let mut nsplit = 0;
    for (param, slot) in sig.params.iter().zip(&plan.param_slots) {
        match *slot {
            SlotRef::Direct(s) => {
                args.push(format!("*({}*)&{}", param.ty, slot_expr(plan, s)));
            }
            SlotRef::SplitDirect(lo, hi) => {
                body.push(Stmt::Expr(format!(
                    "{} parm{nsplit}",
                    split_union(param.ty.as_str())
                )));
                body.push(Stmt::Expr(format!(
                    "parm{nsplit}.split.lo = {}",
                    slot_expr(plan, lo)
                )));
                body.push(Stmt::Expr(format!(
                    "parm{nsplit}.split.hi = {}",
                    slot_expr(plan, hi)
                )));
                args.push(format!("parm{nsplit}.val"));
                nsplit += 1;
            }
        }
    }

    let call = format!("{}({})", sig.impl_name(), args.join(", "));
    let ret = sig.return_type.as_str();
    if sig.returns_void() {
        body.push(Stmt::Expr(call));
        body.push(Stmt::Return(Some("0".to_string())));
    } else {
        body.push(Stmt::Expr(format!("{ret} ret = {call}")));
        match plan.return_slot() {
            Some(r) => {
                let ptr = format!("((u64_t *){})", slot_expr(plan, r));
                body.push(Stmt::Expr(format!(
                    "SYSCALL_OOPS(SYSCALL_MEMORY_WRITE({ptr}, 8))"
                )));
                body.push(Stmt::Expr(format!("*{ptr} = ret")));
                body.push(Stmt::Return(Some("0".to_string())));
            }
            None => body.push(Stmt::Return(Some("(uintptr_t) ret".to_string()))),
        }
    }

    vec![
        Item::Decl(format!(
            "extern {ret} {}({})",
            sig.impl_name(),
            sig.prototype_params()
        )),
        Item::Function {
            head: format!(
                "uintptr_t {}({})",
                sig.handler_name(),
                handler_params(plan.overflows())
            ),
            body,
        },
    ]
}
