//! Helpers for reading and writing `.loop/AGENT_CONTRACT.md`.
//!
//! The contract is a human-facing markdown document. loopguard only reads
//! option lines of the form `KEY=value` or `KEY: value` (optionally bulleted)
//! for the recognized keys and ignores every other line.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::debug;

use crate::core::contract::AgentContract;
use crate::io::atomic::write_atomic;

const KEY_PAUSED: &str = "PAUSED";
const KEY_MAX_ITERATIONS: &str = "MAX_ITERATIONS_PER_RUN";
const KEY_MAX_RETRIES: &str = "MAX_FAILURE_RETRIES";
const KEY_REQUIRE_TESTS: &str = "REQUIRE_TESTS";
const RECOGNIZED_KEYS: [&str; 4] = [
    KEY_PAUSED,
    KEY_MAX_ITERATIONS,
    KEY_MAX_RETRIES,
    KEY_REQUIRE_TESTS,
];

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>\s*(?:[-*]\s+)?(?P<key>[A-Z][A-Z0-9_]*)\s*[:=]\s*)(?P<value>.*?)\s*$")
        .unwrap()
});

/// Load and validate the agent contract.
pub fn load_contract(path: &Path) -> Result<AgentContract> {
    debug!(path = %path.display(), "loading agent contract");
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_contract(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Parse recognized option lines into an [`AgentContract`].
///
/// Every recognized key must appear exactly once.
pub fn parse_contract(contents: &str) -> Result<AgentContract> {
    let mut values: BTreeMap<&str, String> = BTreeMap::new();
    let mut errors = Vec::new();

    for line in contents.lines() {
        let Some((key, value)) = option_line(line) else {
            continue;
        };
        let Some(known) = RECOGNIZED_KEYS.iter().copied().find(|k| *k == key) else {
            continue;
        };
        if values.insert(known, value).is_some() {
            errors.push(format!("duplicate option {known}"));
        }
    }

    let paused = take_bool(&values, KEY_PAUSED, &mut errors);
    let max_iterations_per_run = take_u32(&values, KEY_MAX_ITERATIONS, &mut errors);
    let max_failure_retries = take_u32(&values, KEY_MAX_RETRIES, &mut errors);
    let require_tests = take_bool(&values, KEY_REQUIRE_TESTS, &mut errors);

    if !errors.is_empty() {
        return Err(anyhow!("invalid agent contract: {}", errors.join("; ")));
    }

    let contract = AgentContract {
        paused: paused.unwrap_or_default(),
        max_iterations_per_run: max_iterations_per_run.unwrap_or_default(),
        max_failure_retries: max_failure_retries.unwrap_or_default(),
        require_tests: require_tests.unwrap_or_default(),
    };
    let errors = contract.validate();
    if !errors.is_empty() {
        return Err(anyhow!("invalid agent contract: {}", errors.join("; ")));
    }
    Ok(contract)
}

/// Rewrite the `PAUSED` option line, preserving every other line.
///
/// Appends a `PAUSED=<value>` line if the document has none.
pub fn set_paused(contents: &str, paused: bool) -> String {
    let mut out = String::with_capacity(contents.len() + 16);
    let mut replaced = false;

    for line in contents.split_inclusive('\n') {
        let body = line.trim_end_matches(['\n', '\r']);
        let ending = &line[body.len()..];
        if !replaced
            && let Some(caps) = OPTION_LINE.captures(body)
            && &caps["key"] == KEY_PAUSED
        {
            out.push_str(&caps["prefix"]);
            out.push_str(if paused { "true" } else { "false" });
            out.push_str(ending);
            replaced = true;
            continue;
        }
        out.push_str(line);
    }

    if !replaced {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{KEY_PAUSED}={paused}\n"));
    }
    out
}

/// Persist the pause flag into the contract document.
pub fn write_paused(path: &Path, paused: bool) -> Result<()> {
    debug!(path = %path.display(), paused, "writing pause flag");
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    write_atomic(path, &set_paused(&contents, paused))
}

fn option_line(line: &str) -> Option<(&str, String)> {
    let caps = OPTION_LINE.captures(line)?;
    let key = caps.name("key")?.as_str();
    let value = caps.name("value")?.as_str();
    Some((key, unquote(value).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['`', '"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn take_bool(values: &BTreeMap<&str, String>, key: &str, errors: &mut Vec<String>) -> Option<bool> {
    let Some(raw) = values.get(key) else {
        errors.push(format!("missing option {key}"));
        return None;
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => {
            errors.push(format!("{key} must be true or false (got '{raw}')"));
            None
        }
    }
}

fn take_u32(values: &BTreeMap<&str, String>, key: &str, errors: &mut Vec<String>) -> Option<u32> {
    let Some(raw) = values.get(key) else {
        errors.push(format!("missing option {key}"));
        return None;
    };
    match raw.parse::<u32>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(format!(
                "{key} must be a non-negative integer (got '{raw}')"
            ));
            None
        }
    }
}
