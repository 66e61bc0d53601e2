//! User-side wrapper emission.
//!
//! The wrapper keeps the call's own name and prototype. In user context it
//! marshals the arguments per the [`SlotPlan`] and traps; in privileged
//! context it calls the implementation directly. The compiler barrier
//! before the direct call keeps work from the implementation from being
//! hoisted above the context check.

use crate::cfrag::{Item, Stmt, split_union};
use crate::slots::{OVERFLOW_CUT, SlotRef, SlotPlan};
use crate::signature::Signature;

/// Local holding a wide return value written by the handler.
pub const RETURN_HOLDER: &str = "ret64";

/// Name of the local overflow block.
pub const OVERFLOW_BLOCK: &str = "more";

/// Prefix of the `parm{k}` overlay locals.
pub const OVERLAY_PREFIX: &str = "parm";

/// Whether `name` is one of the locals a wrapper declares. A parameter of
/// that name would be shadowed inside the trap path.
pub fn is_reserved_local(name: &str) -> bool {
    name == OVERFLOW_BLOCK
        || name == RETURN_HOLDER
        || name
            .strip_prefix(OVERLAY_PREFIX)
            .is_some_and(|k| !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()))
}

/// One expression per slot, in slot order, before the overflow cut.
///
/// Wide parameter `k` (counting wide parameters only) is read through the
/// `parm{k}` overlay declared by [`emit_wrapper`].
pub fn marshalled_words(sig: &Signature, plan: &SlotPlan) -> Vec<String> {
    let mut words = vec![String::new(); plan.total_slots];
    let mut nsplit = 0;
    for (param, slot) in sig.params.iter().zip(&plan.param_slots) {
        match *slot {
            SlotRef::Direct(s) => words[s] = format!("*(uintptr_t *)&{}", param.name),
            SlotRef::SplitDirect(lo, hi) => {
                words[lo] = format!("{OVERLAY_PREFIX}{nsplit}.split.lo");
                words[hi] = format!("{OVERLAY_PREFIX}{nsplit}.split.hi");
                nsplit += 1;
            }
        }
    }
    if let Some(r) = plan.return_slot() {
        words[r] = format!("(uintptr_t)&{RETURN_HOLDER}");
    }
    words
}

pub fn emit_wrapper(sig: &Signature, plan: &SlotPlan) -> Vec<Item> {
    let ret = sig.return_type.as_str();
    let params = sig.prototype_params();

    let mut body = vec![Stmt::Directive("#ifdef CONFIG_USERSPACE".to_string())];
    if plan.return_is_wide {
        body.push(Stmt::Expr(format!("u64_t {RETURN_HOLDER}")));
    }
    body.push(Stmt::If {
        cond: "syscall_trap()".to_string(),
        body: trap_path(sig, plan),
    });
    body.push(Stmt::Directive("#endif".to_string()));

    // Privileged fast path.
    body.push(Stmt::Expr("compiler_barrier()".to_string()));
    let args = sig
        .params
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let direct = format!("{}({args})", sig.impl_name());
    if sig.returns_void() {
        body.push(Stmt::Expr(direct));
    } else {
        body.push(Stmt::Return(Some(direct)));
    }

    vec![
        Item::Decl(format!("extern {ret} {}({params})", sig.impl_name())),
        Item::Function {
            head: format!("static inline {ret} {}({params})", sig.name),
            body,
        },
    ]
}

fn trap_path(sig: &Signature, plan: &SlotPlan) -> Vec<Stmt> {
    let ret = sig.return_type.as_str();
    let mut stmts = Vec::new();

    let wide_params = sig
        .params
        .iter()
        .zip(&plan.param_slots)
        .filter(|(_, slot)| slot.is_split());
    for (k, (param, _)) in wide_params.enumerate() {
        stmts.push(Stmt::Expr(format!(
            "{} {OVERLAY_PREFIX}{k}",
            split_union(param.ty.as_str())
        )));
        stmts.push(Stmt::Expr(format!("{OVERLAY_PREFIX}{k}.val = {}", param.name)));
    }

    let mut words = marshalled_words(sig, plan);
    if plan.overflows() {
        stmts.push(Stmt::Initializer {
            decl: format!("uintptr_t {OVERFLOW_BLOCK}[]"),
            values: words.split_off(OVERFLOW_CUT),
        });
        words.push(format!("(uintptr_t) &{OVERFLOW_BLOCK}"));
    }
    debug_assert_eq!(words.len(), plan.registers_used());

    let nwords = words.len();
    words.push(sig.id_symbol());
    let invoke = format!("arch_syscall_invoke{nwords}({})", words.join(", "));

    if plan.return_is_wide {
        stmts.push(Stmt::Expr(format!("(void) {invoke}")));
        stmts.push(Stmt::Return(Some(format!("({ret}){RETURN_HOLDER}"))));
    } else if sig.returns_void() {
        stmts.push(Stmt::Expr(invoke));
        stmts.push(Stmt::Return(None));
    } else {
        stmts.push(Stmt::Return(Some(format!("({ret}) {invoke}"))));
    }
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfrag::print;
    use crate::width::WidthClassifier;

    fn emit(decl: &str, params: &str, classifier: &WidthClassifier) -> String {
        let sig = Signature::parse(decl, params, 0).unwrap();
        let plan = SlotPlan::allocate(&sig, classifier);
        print(&emit_wrapper(&sig, &plan))
    }

    #[test]
    fn narrow_wrapper() {
        let out = emit("int foo", "int a", &WidthClassifier::narrow_registers());
        let expected = "extern int syscall_foo(int a);\n\
                        static inline int foo(int a)\n\
                        {\n\
                        #ifdef CONFIG_USERSPACE\n\
                        \tif (syscall_trap()) {\n\
                        \t\treturn (int) arch_syscall_invoke1(*(uintptr_t *)&a, K_SYSCALL_FOO);\n\
                        \t}\n\
                        #endif\n\
                        \tcompiler_barrier();\n\
                        \treturn syscall_foo(a);\n\
                        }\n";
        assert_eq!(out, expected);
    }

    #[test]
    fn wide_param_goes_through_overlay() {
        let out = emit("void bar", "s64_t t, int b", &WidthClassifier::narrow_registers());
        assert!(out.contains(
            "\t\tunion { struct { uintptr_t lo, hi; } split; s64_t val; } parm0;\n\
             \t\tparm0.val = t;\n"
        ));
        assert!(out.contains(
            "\t\tarch_syscall_invoke3(parm0.split.lo, parm0.split.hi, *(uintptr_t *)&b, K_SYSCALL_BAR);\n\
             \t\treturn;\n"
        ));
        assert!(out.contains("\tcompiler_barrier();\n\tsyscall_bar(t, b);\n"));
    }

    #[test]
    fn native_wide_wrapper_has_no_overlay() {
        let out = emit("void bar", "s64_t t, int b", &WidthClassifier::native_wide());
        assert!(!out.contains("union"));
        assert!(out.contains("arch_syscall_invoke2(*(uintptr_t *)&t, *(uintptr_t *)&b, K_SYSCALL_BAR)"));
    }

    #[test]
    fn wide_return_uses_holder() {
        let out = emit("u64_t k_uptime", "void", &WidthClassifier::narrow_registers());
        assert!(out.contains("static inline u64_t k_uptime(void)\n"));
        assert!(out.contains("#ifdef CONFIG_USERSPACE\n\tu64_t ret64;\n"));
        assert!(out.contains("\t\t(void) arch_syscall_invoke1((uintptr_t)&ret64, K_SYSCALL_K_UPTIME);\n"));
        assert!(out.contains("\t\treturn (u64_t)ret64;\n"));
        assert!(out.contains("\treturn syscall_k_uptime();\n"));
    }

    #[test]
    fn overflow_packs_block_from_slot_five() {
        let out = emit(
            "int f",
            "int a, int b, int c, int d, int e, u64_t g",
            &WidthClassifier::narrow_registers(),
        );
        assert!(out.contains(
            "\t\tuintptr_t more[] = {\n\
             \t\t\tparm0.split.lo,\n\
             \t\t\tparm0.split.hi\n\
             \t\t};\n"
        ));
        assert!(out.contains(
            "arch_syscall_invoke6(*(uintptr_t *)&a, *(uintptr_t *)&b, *(uintptr_t *)&c, \
             *(uintptr_t *)&d, *(uintptr_t *)&e, (uintptr_t) &more, K_SYSCALL_F)"
        ));
    }

    #[test]
    fn reserved_locals() {
        for name in ["more", "ret64", "parm0", "parm12"] {
            assert!(is_reserved_local(name), "{name}");
        }
        for name in ["parm", "parm_x", "parm0a", "mores", "ret", "arg0", "ssf"] {
            assert!(!is_reserved_local(name), "{name}");
        }
    }

    #[test]
    fn words_follow_plan_slots() {
        let sig = Signature::parse("s64_t f", "u64_t a, int b", 0).unwrap();
        let plan = SlotPlan::allocate(&sig, &WidthClassifier::narrow_registers());
        assert_eq!(
            marshalled_words(&sig, &plan),
            [
                "parm0.split.lo",
                "parm0.split.hi",
                "*(uintptr_t *)&b",
                "(uintptr_t)&ret64"
            ]
        );
    }
}
