use std::path::{Path, PathBuf};
use std::process::Command;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct SysgenOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

fn sysgen(args: &[&str]) -> SysgenOutput {
    let output = Command::new(env!("CARGO_BIN_EXE_sysgen"))
        .args(args)
        .output()
        .expect("failed to execute sysgen");

    SysgenOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/syscalls.json")
}

struct Layout {
    dispatch: PathBuf,
    list: PathBuf,
    base: PathBuf,
}

impl Layout {
    fn in_dir(dir: &Path) -> Self {
        Layout {
            dispatch: dir.join("syscall_dispatch.c"),
            list: dir.join("include/syscall_list.h"),
            base: dir.join("include/syscalls"),
        }
    }
}

fn generate(input: &Path, out: &Layout, extra: &[&str]) -> SysgenOutput {
    let mut args = vec![
        "generate",
        "-i",
        input.to_str().unwrap(),
        "-d",
        out.dispatch.to_str().unwrap(),
        "-l",
        out.list.to_str().unwrap(),
        "-o",
        out.base.to_str().unwrap(),
    ];
    args.extend_from_slice(extra);
    sysgen(&args)
}

fn write_input(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("syscalls.json");
    std::fs::write(&path, json).unwrap();
    path
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

#[test]
fn generate_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let out = Layout::in_dir(dir.path());
    let run = generate(&fixture(), &out, &[]);
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);

    for unit in ["kernel.h", "poll.h", "drivers/gpio.h"] {
        assert!(out.base.join(unit).is_file(), "missing wrapper header {unit}");
    }
    for call in ["foo", "bar", "k_sem_take", "k_uptime_ticks", "k_thread_create", "k_poll", "gpio_read"] {
        assert!(out.base.join(format!("{call}_mrsh.c")).is_file(), "missing handler for {call}");
    }

    let list = read(&out.list);
    assert!(list.contains("#define K_SYSCALL_BAR 0\n"));
    assert!(list.contains("#define K_SYSCALL_UNIMPLEMENTED 7\n"));
    assert!(list.contains("#define K_SYSCALL_NUM 8\n"));

    let dispatch = read(&out.dispatch);
    assert!(dispatch.contains("[K_SYSCALL_FOO] = handle_foo"));
    assert!(dispatch.contains("[K_SYSCALL_UNIMPLEMENTED] = handle_unimplemented"));
    assert!(dispatch.contains("__weak ALIAS_OF(handle_unimplemented)"));
}

#[test]
fn overflowing_call_uses_block() {
    let dir = tempfile::tempdir().unwrap();
    let out = Layout::in_dir(dir.path());
    assert_eq!(generate(&fixture(), &out, &[]).exit_code, 0);

    let handler = read(&out.base.join("k_thread_create_mrsh.c"));
    assert!(handler.contains("#include <syscalls/kernel.h>"));
    assert!(handler.contains("void *more, void *ssf)"));
    assert!(handler.contains("SYSCALL_MEMORY_READ(more, 6 * sizeof(uintptr_t))"));

    let header = read(&out.base.join("kernel.h"));
    assert!(header.contains("uintptr_t more[] = {"));
    assert!(header.contains("arch_syscall_invoke6("));
}

#[test]
fn generation_is_byte_identical() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = Layout::in_dir(first.path());
    let b = Layout::in_dir(second.path());
    assert_eq!(generate(&fixture(), &a, &[]).exit_code, 0);
    assert_eq!(generate(&fixture(), &b, &[]).exit_code, 0);

    assert_eq!(read(&a.dispatch), read(&b.dispatch));
    assert_eq!(read(&a.list), read(&b.list));
    for file in ["kernel.h", "poll.h", "drivers/gpio.h", "bar_mrsh.c", "k_thread_create_mrsh.c"] {
        assert_eq!(read(&a.base.join(file)), read(&b.base.join(file)), "{file}");
    }
}

#[test]
fn duplicate_name_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        r#"[[["int foo", "int a"], "a.h"], [["int foo", "void"], "b.h"]]"#,
    );
    let out = Layout::in_dir(&dir.path().join("out"));
    let run = generate(&input, &out, &[]);

    assert_eq!(run.exit_code, 1);
    assert!(run.stderr.contains("error[SIG_002]"), "stderr: {}", run.stderr);
    assert!(!out.dispatch.exists());
    assert!(!out.list.exists());
    assert!(!out.base.exists());
}

#[test]
fn array_parameter_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        r#"[[["int k_read", "int fd, char buf[8]"], "io.h"]]"#,
    );
    let run = generate(&input, &Layout::in_dir(dir.path()), &[]);

    assert_eq!(run.exit_code, 1);
    assert!(run.stderr.contains("error[SIG_001]"), "stderr: {}", run.stderr);
    assert!(run.stderr.contains("(record 0)"));
    assert!(run.stderr.contains("help: Declare the parameter as `T *name`"));
}

#[test]
fn call_named_like_a_sentinel_is_rejected() {
    for name in ["num", "unimplemented"] {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            dir.path(),
            &format!(r#"[[["int k_a", "void"], "a.h"], [["int {name}", "int x"], "a.h"]]"#),
        );
        let out = Layout::in_dir(&dir.path().join("out"));
        let run = generate(&input, &out, &[]);

        assert_eq!(run.exit_code, 1, "{name}");
        assert!(run.stderr.contains("error[SIG_004]"), "stderr: {}", run.stderr);
        assert!(!out.list.exists());
        assert!(!out.base.exists());
    }
}

#[test]
fn parameter_named_like_a_wrapper_local_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        r#"[[["int k_mix", "u64_t a, int parm0"], "mix.h"]]"#,
    );
    let run = generate(&input, &Layout::in_dir(&dir.path().join("out")), &[]);

    assert_eq!(run.exit_code, 1);
    assert!(run.stderr.contains("error[SIG_001]"), "stderr: {}", run.stderr);
    assert!(run.stderr.contains("help: Rename the parameter."));
}

#[test]
fn unit_outside_output_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), r#"[[["int k_a", "void"], "../escape.h"]]"#);
    let out = Layout::in_dir(&dir.path().join("out"));
    let run = generate(&input, &out, &[]);

    assert_eq!(run.exit_code, 1);
    assert!(run.stderr.contains("error[SIG_005]"), "stderr: {}", run.stderr);
    assert!(!dir.path().join("out/include/escape.h").exists());
    assert!(!out.base.exists());
}

#[test]
fn strong_and_disabled_bindings() {
    let dir = tempfile::tempdir().unwrap();
    let out = Layout::in_dir(dir.path());
    let run = generate(
        &fixture(),
        &out,
        &["--strong", "k_sem_take", "--disable", "k_poll"],
    );
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);

    let dispatch = read(&out.dispatch);
    assert!(dispatch.contains("extern uintptr_t handle_k_sem_take("));
    assert!(dispatch.contains("[K_SYSCALL_K_POLL] = handle_unimplemented"));
    assert!(!dispatch.contains("handle_k_poll("));
    // Disabled calls keep their id.
    assert!(read(&out.list).contains("#define K_SYSCALL_K_POLL 3\n"));
}

#[test]
fn unknown_strong_name_suggests_spelling() {
    let dir = tempfile::tempdir().unwrap();
    let out = Layout::in_dir(dir.path());
    let run = generate(&fixture(), &out, &["--strong", "k_sem_tak"]);

    assert_eq!(run.exit_code, 1);
    assert!(run.stderr.contains("error[CFG_001]"), "stderr: {}", run.stderr);
    assert!(run.stderr.contains("Did you mean `k_sem_take`?"));
    assert!(!out.dispatch.exists());
}

#[test]
fn long_registers_never_split() {
    let dir = tempfile::tempdir().unwrap();
    let out = Layout::in_dir(dir.path());
    assert_eq!(generate(&fixture(), &out, &["-x"]).exit_code, 0);

    let header = read(&out.base.join("kernel.h"));
    assert!(!header.contains("split"));
    assert!(!header.contains("ret64"));
}

#[test]
fn manifest_next_to_input_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        r#"[[["int k_sleep", "k_ticks_t ticks"], "kernel.h"]]"#,
    );
    std::fs::write(
        dir.path().join("sysgen.toml"),
        "[generator]\nsplit_type = [\"k_ticks_t\"]\ndisable = \"k_sleep\"\n",
    )
    .unwrap();
    let out = Layout::in_dir(&dir.path().join("out"));
    let run = generate(&input, &out, &[]);
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);

    assert!(read(&out.base.join("kernel.h")).contains("union { struct { uintptr_t lo, hi; } split; k_ticks_t val; }"));
    assert!(read(&out.dispatch).contains("[K_SYSCALL_K_SLEEP] = handle_unimplemented"));
}

// ---------------------------------------------------------------------------
// check / plan
// ---------------------------------------------------------------------------

#[test]
fn check_reports_success() {
    let run = sysgen(&["check", "-i", fixture().to_str().unwrap()]);
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);
    assert!(run.stdout.contains("ok: 7 system call(s)"));
}

#[test]
fn check_json_failure_shape() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), r#"[[["int cb", "void (*fn)(int)"], "a.h"]]"#);
    let run = sysgen(&["check", "--json", "-i", input.to_str().unwrap()]);
    assert_eq!(run.exit_code, 1);

    let json: serde_json::Value = serde_json::from_str(&run.stdout).unwrap();
    assert_eq!(json["status"], "failure");
    assert_eq!(json["diagnostics"][0]["code"], "SIG_001");
    assert_eq!(json["diagnostics"][0]["location"]["record"], 0);
    assert_eq!(json["diagnostics"][0]["suggestions"][0]["strategy"], "typedef");
}

#[test]
fn check_warns_about_unknown_manifest_key() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), r#"[[["int k_a", "void"], "a.h"]]"#);
    std::fs::write(
        dir.path().join("sysgen.toml"),
        "[generator]\nsplit_types = \"k_ticks_t\"\n",
    )
    .unwrap();

    let run = sysgen(&["check", "--json", "-i", input.to_str().unwrap()]);
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);
    let json: serde_json::Value = serde_json::from_str(&run.stdout).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["diagnostics"][0]["severity"], "warning");
    assert_eq!(json["diagnostics"][0]["code"], "CFG_003");

    let human = sysgen(&["check", "-i", input.to_str().unwrap()]);
    assert_eq!(human.exit_code, 0);
    assert!(human.stderr.contains("warning[CFG_003]"), "stderr: {}", human.stderr);
    assert!(human.stderr.contains("Did you mean `split_type`?"));
    assert!(human.stdout.contains("ok: 1 system call(s)"));
}

#[test]
fn check_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "{ not json");
    let run = sysgen(&["check", "--json", "-i", input.to_str().unwrap()]);
    assert_eq!(run.exit_code, 1);
    let json: serde_json::Value = serde_json::from_str(&run.stdout).unwrap();
    assert_eq!(json["diagnostics"][0]["code"], "INP_001");
}

#[test]
fn plan_json_lists_slots() {
    let run = sysgen(&["plan", "--json", "-i", fixture().to_str().unwrap()]);
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);

    let plans: Vec<serde_json::Value> = serde_json::from_str(&run.stdout).unwrap();
    assert_eq!(plans.len(), 7);
    let bar = plans.iter().find(|p| p["name"] == "bar").unwrap();
    assert_eq!(bar["id"], 0);
    assert_eq!(bar["plan"]["total_slots"], 3);
    assert_eq!(bar["plan"]["param_slots"][0]["split_direct"][0], 0);
    assert_eq!(bar["plan"]["param_slots"][1]["direct"], 2);

    let create = plans.iter().find(|p| p["name"] == "k_thread_create").unwrap();
    assert_eq!(create["overflow_words"], 6);
}

#[test]
fn plan_human_output() {
    let run = sysgen(&["plan", "-i", fixture().to_str().unwrap()]);
    assert_eq!(run.exit_code, 0, "stderr: {}", run.stderr);
    let bar = run.stdout.lines().find(|l| l.contains(" bar (kernel.h)")).unwrap();
    assert!(bar.contains("slots [0+1, 2]"), "{bar}");
    assert!(bar.contains("total 3"));
    let uptime = run.stdout.lines().find(|l| l.contains("k_uptime_ticks")).unwrap();
    assert!(uptime.contains("ret 0"), "{uptime}");
}
