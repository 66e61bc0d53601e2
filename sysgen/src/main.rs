use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use sysgen::config::{self, Manifest, Overrides};
use sysgen::diagnostics::{CheckResult, Diagnostic, render_diagnostic};
use sysgen::generate::{self, GenOptions, OutputPaths, PlannedCall};
use sysgen::{GenError, SlotRef, SyscallSet, logger};

#[derive(Parser)]
#[command(name = "sysgen")]
#[command(about = "System call marshalling generator")]
#[command(version)]
struct Cli {
    /// More logging; repeat for debug and trace output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write wrappers, handlers, the dispatch table and the call-id listing
    Generate {
        /// JSON list of system call declarations
        #[arg(short = 'i', long)]
        json_file: PathBuf,

        /// Output dispatch table unit
        #[arg(short = 'd', long)]
        syscall_dispatch: PathBuf,

        /// Output call-id listing header
        #[arg(short = 'l', long)]
        syscall_list: PathBuf,

        /// Directory for wrapper headers and handler units
        #[arg(short = 'o', long)]
        base_output: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Validate a declaration list without writing anything
    Check {
        #[arg(short = 'i', long)]
        json_file: PathBuf,

        /// Output diagnostics as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print each call's id and slot plan
    Plan {
        #[arg(short = 'i', long)]
        json_file: PathBuf,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// Type to split across two registers (repeatable)
    #[arg(short = 's', long = "split-type", value_name = "TYPE")]
    split_types: Vec<String>,

    /// Registers are 64 bits wide; never split
    #[arg(short = 'x', long)]
    long_registers: bool,

    /// Call whose handler is always linked in (repeatable)
    #[arg(long, value_name = "NAME")]
    strong: Vec<String>,

    /// Call routed to the unimplemented handler (repeatable)
    #[arg(long, value_name = "NAME")]
    disable: Vec<String>,

    /// Use this manifest instead of searching for sysgen.toml
    #[arg(long, value_name = "PATH")]
    manifest: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    logger::init(logger::level_filter(cli.verbose, cli.quiet));

    match cli.command {
        Commands::Generate {
            json_file,
            syscall_dispatch,
            syscall_list,
            base_output,
            config,
        } => {
            let out = OutputPaths {
                dispatch: syscall_dispatch,
                call_list: syscall_list,
                base: base_output,
            };
            if let Err(diag) = generate_files(&json_file, &out, &config) {
                eprint!("{}", render_diagnostic(&diag));
                std::process::exit(1);
            }
        }
        Commands::Check {
            json_file,
            json,
            config,
        } => {
            let result = check_file(&json_file, &config);

            if json {
                print_json(&result);
            } else {
                print_human_readable(&result);
            }

            if result.is_failure() {
                std::process::exit(1);
            }
        }
        Commands::Plan {
            json_file,
            json,
            config,
        } => match plan_file(&json_file, &config) {
            Ok(plans) if json => print_json(&plans),
            Ok(plans) => print_plans(&plans),
            Err(diag) => {
                if json {
                    print_json(&CheckResult::failure(diag));
                } else {
                    eprint!("{}", render_diagnostic(&diag));
                }
                std::process::exit(1);
            }
        },
    }
}

fn diagnose(err: &GenError, input: &Path, set: Option<&SyscallSet>) -> Diagnostic {
    let known: Vec<String> = set
        .map(|s| s.calls().map(|(_, sig)| sig.name.clone()).collect())
        .unwrap_or_default();
    Diagnostic::from_error(err, &input.display().to_string(), &known)
}

/// Manifest (explicit or discovered next to the input) merged with flags,
/// plus warnings for manifest keys that were ignored.
fn options_for(input: &Path, args: &ConfigArgs) -> Result<(GenOptions, Vec<Diagnostic>), GenError> {
    let (manifest, source) = match &args.manifest {
        Some(path) => (config::read_manifest(path)?, Some(path.clone())),
        None => {
            let dir = input.parent().unwrap_or(Path::new("."));
            let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
            match config::load_manifest(&dir) {
                Some((manifest, path)) => {
                    log::info!("using {}", path.display());
                    (manifest, Some(path))
                }
                None => (Manifest::default(), None),
            }
        }
    };
    let warnings = match &source {
        Some(path) => manifest
            .unknown_keys
            .iter()
            .map(|key| Diagnostic::unknown_manifest_key(key, &path.display().to_string()))
            .collect(),
        None => Vec::new(),
    };
    let overrides = Overrides {
        long_registers: args.long_registers,
        split_types: args.split_types.clone(),
        strong: args.strong.clone(),
        disabled: args.disable.clone(),
    };
    Ok((config::build_options(&manifest, &overrides), warnings))
}

struct Loaded {
    set: SyscallSet,
    options: GenOptions,
    warnings: Vec<Diagnostic>,
}

fn load(input: &Path, args: &ConfigArgs) -> Result<Loaded, Diagnostic> {
    let (options, warnings) = options_for(input, args).map_err(|e| diagnose(&e, input, None))?;
    let set = SyscallSet::load(input).map_err(|e| diagnose(&e, input, None))?;
    log::info!(
        "{}: {} system call(s) in {} unit(s)",
        input.display(),
        set.len(),
        set.units().len()
    );
    Ok(Loaded {
        set,
        options,
        warnings,
    })
}

fn generate_files(input: &Path, out: &OutputPaths, args: &ConfigArgs) -> Result<(), Diagnostic> {
    let Loaded { set, options, .. } = load(input, args)?;
    let artifacts = generate::generate(&set, &options).map_err(|e| diagnose(&e, input, Some(&set)))?;
    artifacts.write(out).map_err(|e| diagnose(&e, input, None))
}

fn check_file(input: &Path, args: &ConfigArgs) -> CheckResult {
    let checked = load(input, args).and_then(|loaded| {
        generate::generate(&loaded.set, &loaded.options)
            .map(|_| CheckResult::success(loaded.set.len(), loaded.warnings))
            .map_err(|e| diagnose(&e, input, Some(&loaded.set)))
    });
    checked.unwrap_or_else(CheckResult::failure)
}

fn plan_file(input: &Path, args: &ConfigArgs) -> Result<Vec<PlannedCall>, Diagnostic> {
    let Loaded { set, options, .. } = load(input, args)?;
    generate::plans(&set, &options.classifier).map_err(|e| diagnose(&e, input, Some(&set)))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: could not serialize output: {e}");
            std::process::exit(1);
        }
    }
}

fn print_human_readable(result: &CheckResult) {
    for diag in &result.diagnostics {
        eprint!("{}", render_diagnostic(diag));
    }
    match result.calls {
        Some(calls) => println!("ok: {calls} system call(s)"),
        None => eprintln!("\n{} error(s) found", result.diagnostics.len()),
    }
}

/// One line per call: `id symbol name (unit): slots [..]`.
fn print_plans(plans: &[PlannedCall]) {
    for call in plans {
        let slots: Vec<String> = call
            .plan
            .param_slots
            .iter()
            .map(|slot| match slot {
                SlotRef::Direct(i) => i.to_string(),
                SlotRef::SplitDirect(lo, hi) => format!("{lo}+{hi}"),
            })
            .collect();
        let mut line = format!(
            "{:>4} {:<32} {} ({}): slots [{}]",
            call.id,
            call.symbol,
            call.name,
            call.unit,
            slots.join(", ")
        );
        if let Some(ret) = call.plan.return_slot() {
            line.push_str(&format!(" ret {ret}"));
        }
        line.push_str(&format!(" total {}", call.plan.total_slots));
        if call.overflow_words > 0 {
            line.push_str(&format!(" overflow {}", call.overflow_words));
        }
        println!("{line}");
    }
}
