//! C fragments and their printer.
//!
//! Emitters build [`Item`]s and [`Stmt`]s; only [`print`] turns them into
//! text. Control flow (the trap check, the `#ifdef` guard) is structure,
//! never spliced into strings.
//!
//! Rules:
//! - tab indentation
//! - preprocessor lines at column 0
//! - `Item::Blank` yields exactly one blank line, however many are requested
//! - single trailing newline

/// A top-level element of a generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// `/* text */`, one line per line of `text`.
    Comment(String),
    /// Preprocessor line such as `#include <x.h>`.
    Directive(String),
    /// Raw line printed as-is, e.g. an attribute before a declaration.
    Line(String),
    /// Declaration terminated with `;`.
    Decl(String),
    Function { head: String, body: Vec<Stmt> },
    /// `decl = { values... };`
    Initializer { decl: String, values: Vec<String> },
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Expression or declaration statement; `;` is appended.
    Expr(String),
    /// `(void) name;` with an `unused` marker.
    Unused(String),
    Directive(String),
    If { cond: String, body: Vec<Stmt> },
    Initializer { decl: String, values: Vec<String> },
    Return(Option<String>),
}

/// `union` overlay letting the same bits be read as one wide value or as
/// two register-width halves. `lo` and `hi` follow little-endian naming;
/// what matters is that wrapper and handler use the same overlay.
pub fn split_union(ty: &str) -> String {
    format!("union {{ struct {{ uintptr_t lo, hi; }} split; {ty} val; }}")
}

/// Print items into C source text.
pub fn print(items: &[Item]) -> String {
    let mut p = Printer::new();
    for item in items {
        p.item(item);
    }
    p.finish()
}

struct Printer {
    output: String,
    indent: usize,
}

impl Printer {
    fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    fn finish(mut self) -> String {
        let trimmed = self.output.trim_end().to_string();
        self.output = trimmed;
        self.output.push('\n');
        self.output
    }

    fn push(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push('\t');
        }
    }

    fn line(&mut self, s: &str) {
        self.push_indent();
        self.push(s);
        self.output.push('\n');
    }

    fn blank_line(&mut self) {
        if self.output.is_empty() || self.output.ends_with("\n\n") {
            return;
        }
        if !self.output.ends_with('\n') {
            self.output.push('\n');
        }
        self.output.push('\n');
    }

    fn item(&mut self, item: &Item) {
        match item {
            Item::Comment(text) => self.comment(text),
            Item::Directive(d) => self.line(d),
            Item::Line(l) => self.line(l),
            Item::Decl(d) => self.line(&format!("{d};")),
            Item::Function { head, body } => {
                self.line(head);
                self.line("{");
                self.indent += 1;
                self.stmts(body);
                self.indent -= 1;
                self.line("}");
            }
            Item::Initializer { decl, values } => self.initializer(decl, values),
            Item::Blank => self.blank_line(),
        }
    }

    fn comment(&mut self, text: &str) {
        let lines: Vec<&str> = text.lines().collect();
        match lines.as_slice() {
            [] => self.line("/* */"),
            [one] => self.line(&format!("/* {one} */")),
            [first, rest @ ..] => {
                self.line(&format!("/* {first}"));
                for l in rest {
                    self.line(&format!(" * {l}"));
                }
                self.line(" */");
            }
        }
    }

    fn initializer(&mut self, decl: &str, values: &[String]) {
        self.line(&format!("{decl} = {{"));
        self.indent += 1;
        let last = values.len().saturating_sub(1);
        for (i, v) in values.iter().enumerate() {
            if i == last {
                self.line(v);
            } else {
                self.line(&format!("{v},"));
            }
        }
        self.indent -= 1;
        self.line("};");
    }

    fn stmts(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.line(&format!("{e};")),
            Stmt::Unused(name) => self.line(&format!("(void) {name};\t/* unused */")),
            Stmt::Directive(d) => {
                let saved = self.indent;
                self.indent = 0;
                self.line(d);
                self.indent = saved;
            }
            Stmt::If { cond, body } => {
                self.line(&format!("if ({cond}) {{"));
                self.indent += 1;
                self.stmts(body);
                self.indent -= 1;
                self.line("}");
            }
            Stmt::Initializer { decl, values } => self.initializer(decl, values),
            Stmt::Return(Some(e)) => self.line(&format!("return {e};")),
            Stmt::Return(None) => self.line("return;"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prints_function_with_nested_if() {
        let items = vec![
            Item::Decl("extern int syscall_f(int a)".to_string()),
            Item::Function {
                head: "static inline int f(int a)".to_string(),
                body: vec![
                    Stmt::Directive("#ifdef CONFIG_USERSPACE".to_string()),
                    Stmt::If {
                        cond: "syscall_trap()".to_string(),
                        body: vec![Stmt::Return(Some("1".to_string()))],
                    },
                    Stmt::Directive("#endif".to_string()),
                    Stmt::Return(Some("syscall_f(a)".to_string())),
                ],
            },
        ];
        let expected = "extern int syscall_f(int a);\n\
                        static inline int f(int a)\n\
                        {\n\
                        #ifdef CONFIG_USERSPACE\n\
                        \tif (syscall_trap()) {\n\
                        \t\treturn 1;\n\
                        \t}\n\
                        #endif\n\
                        \treturn syscall_f(a);\n\
                        }\n";
        assert_eq!(print(&items), expected);
    }

    #[test]
    fn blank_lines_collapse() {
        let items = vec![
            Item::Blank,
            Item::Directive("#include <a.h>".to_string()),
            Item::Blank,
            Item::Blank,
            Item::Directive("#include <b.h>".to_string()),
            Item::Blank,
        ];
        assert_eq!(print(&items), "#include <a.h>\n\n#include <b.h>\n");
    }

    #[test]
    fn initializer_has_no_trailing_comma() {
        let items = vec![Item::Initializer {
            decl: "uintptr_t more[]".to_string(),
            values: vec!["a".to_string(), "b".to_string()],
        }];
        assert_eq!(print(&items), "uintptr_t more[] = {\n\ta,\n\tb\n};\n");
    }

    #[test]
    fn multi_line_comment() {
        let items = vec![Item::Comment("first\nsecond".to_string())];
        assert_eq!(print(&items), "/* first\n * second\n */\n");
    }

    #[test]
    fn unused_marker() {
        let items = vec![Item::Function {
            head: "void f(void)".to_string(),
            body: vec![Stmt::Unused("arg5".to_string())],
        }];
        assert!(print(&items).contains("\t(void) arg5;\t/* unused */\n"));
    }
}
