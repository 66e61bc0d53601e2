//! Generator configuration (`sysgen.toml`) support.
//!
//! Provides:
//! - `Manifest` with the `[generator]` settings
//! - `load_manifest()` to find and parse `sysgen.toml`
//! - `Overrides` for settings given on the command line
//! - `build_options()` to merge both into [`GenOptions`]
//!
//! ```toml
//! [generator]
//! long_registers = false
//! split_type = ["k_ticks_t", "off_t"]
//! strong = "k_sem_take"
//! strong = "k_thread_create"
//! disable = "k_poll"
//! ```
//!
//! Repeated keys accumulate and command-line values are added to them.
//! `long_registers` is on when either the manifest or `-x` enables it; the
//! command line cannot switch off a manifest `long_registers = true`.

use std::path::{Path, PathBuf};

use crate::dispatch::Resolution;
use crate::error::{GenError, Result};
use crate::generate::GenOptions;
use crate::width::WidthClassifier;

pub const MANIFEST_FILE: &str = "sysgen.toml";

/// Keys understood in the `[generator]` section.
pub const GENERATOR_KEYS: &[&str] = &["long_registers", "split_type", "strong", "disable"];

/// Parsed `sysgen.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub long_registers: Option<bool>,
    pub split_types: Vec<String>,
    pub strong: Vec<String>,
    pub disabled: Vec<String>,
    /// Keys that were present but not understood, in file order.
    pub unknown_keys: Vec<String>,
}

/// Settings from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub long_registers: bool,
    pub split_types: Vec<String>,
    pub strong: Vec<String>,
    pub disabled: Vec<String>,
}

/// Search for `sysgen.toml` starting from `dir` and walking up.
///
/// Returns the parsed manifest and the path it was read from.
pub fn load_manifest(dir: &Path) -> Option<(Manifest, PathBuf)> {
    let mut current = dir.to_path_buf();
    loop {
        let candidate = current.join(MANIFEST_FILE);
        if candidate.is_file()
            && let Ok(content) = std::fs::read_to_string(&candidate)
        {
            return Some((parse_manifest(&content), candidate));
        }
        if !current.pop() {
            break;
        }
    }
    None
}

/// Read a manifest given explicitly; unlike discovery, a missing file is
/// an error.
pub fn read_manifest(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| GenError::io(path, e))?;
    Ok(parse_manifest(&content))
}

/// Line-based parser for the `[generator]` section.
///
/// Handles the subset the generator needs: `key = "value"`,
/// `key = true|false` and `key = ["a", "b"]`.
pub fn parse_manifest(content: &str) -> Manifest {
    let mut manifest = Manifest::default();
    let mut in_generator = false;

    for line in content.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') && !trimmed.contains('=') {
            in_generator = trimmed == "[generator]";
            continue;
        }
        if !in_generator || trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, values)) = parse_key_values(trimmed) else {
            continue;
        };
        match key {
            "long_registers" => {
                manifest.long_registers = values.first().map(|v| v == "true");
            }
            "split_type" => manifest.split_types.extend(values),
            "strong" => manifest.strong.extend(values),
            "disable" => manifest.disabled.extend(values),
            other => {
                log::warn!("{MANIFEST_FILE}: ignoring unknown key `{other}`");
                manifest.unknown_keys.push(other.to_string());
            }
        }
    }

    manifest
}

/// Parse `key = value` or `key = [v1, v2]`, stripping quotes.
fn parse_key_values(line: &str) -> Option<(&str, Vec<String>)> {
    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    let raw = raw.trim();

    let items: Vec<&str> = match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(list) => list.split(',').collect(),
        None => vec![raw],
    };
    let values = items
        .into_iter()
        .map(unquote)
        .filter(|v| !v.is_empty())
        .collect();
    Some((key, values))
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Merge manifest and command-line settings.
pub fn build_options(manifest: &Manifest, overrides: &Overrides) -> GenOptions {
    let long_registers = overrides.long_registers || manifest.long_registers.unwrap_or(false);
    let mut classifier = if long_registers {
        WidthClassifier::native_wide()
    } else {
        WidthClassifier::narrow_registers()
    };
    for tag in manifest.split_types.iter().chain(&overrides.split_types) {
        classifier.add_wide_type(tag.as_str());
    }

    let resolution = Resolution {
        strong: manifest.strong.iter().chain(&overrides.strong).cloned().collect(),
        disabled: manifest
            .disabled
            .iter()
            .chain(&overrides.disabled)
            .cloned()
            .collect(),
    };

    GenOptions {
        classifier,
        resolution,
    }
}
