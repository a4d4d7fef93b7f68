// ============================================================================
// hmr-runner - .env file loader
//
// Parses a dotenv-style file and applies it to the process environment,
// remembering a baseline so a later reload can diff and restore cleanly:
// keys the file stops defining are removed rather than left stale.
// ============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::HmrError;

/// Tracks the last-applied `.env` contents so a reload can compute a diff
/// against the process environment instead of blindly re-setting everything,
/// plus a snapshot of whatever each touched key held before this loader ever
/// touched it, so a key the file later stops defining is restored to its
/// startup value (or unset, if it had none) rather than just unset.
#[derive(Debug, Default)]
pub struct EnvFile {
    path: Option<PathBuf>,
    applied: HashMap<String, String>,
    baseline: HashMap<String, Option<String>>,
}

impl EnvFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, applied: HashMap::new(), baseline: HashMap::new() }
    }

    /// Parse and apply `path`, diffing against whatever this loader applied
    /// last time: keys dropped from the file are restored to their baseline
    /// (the value they held the first time this loader touched them, or
    /// unset if they had none), keys that changed are overwritten, new keys
    /// are set and snapshotted.
    pub fn reload(&mut self) -> Result<(), HmrError> {
        let Some(path) = self.path.clone() else { return Ok(()) };
        if !path.exists() {
            return Err(HmrError::MissingPath(path));
        }
        let contents = std::fs::read_to_string(&path)?;
        let fresh = parse(&contents);

        for key in self.applied.keys() {
            if !fresh.contains_key(key) {
                match self.baseline.get(key) {
                    Some(Some(value)) => {
                        // SAFETY: single-threaded at the point reload() is
                        // called (supervisor drives it from one task between
                        // generations).
                        unsafe { std::env::set_var(key, value) };
                    }
                    Some(None) | None => {
                        // SAFETY: see above.
                        unsafe { std::env::remove_var(key) };
                    }
                }
            }
        }
        for (key, value) in &fresh {
            self.baseline.entry(key.clone()).or_insert_with(|| std::env::var(key).ok());
            // SAFETY: see above.
            unsafe { std::env::set_var(key, value) };
        }

        self.applied = fresh;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Parse dotenv grammar: blank lines and `#`-prefixed comments are skipped,
/// an optional leading `export ` is stripped, `KEY=VALUE` splits on the
/// first `=`. Values may be double-quoted (with `\n`, `\"`, `\\` escapes),
/// single-quoted (literal, no escapes), or bare (trimmed, no escapes).
/// Malformed lines are skipped with a warning rather than aborting the load.
pub fn parse(contents: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (lineno, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, rest)) = line.split_once('=') else {
            tracing::warn!(line = lineno + 1, "skipping malformed .env line (no '=')");
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !is_valid_key(key) {
            tracing::warn!(line = lineno + 1, %key, "skipping .env line with invalid key");
            continue;
        }
        out.insert(key.to_string(), parse_value(rest.trim()));
    }
    out
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_value(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        unescape_double_quoted(&raw[1..raw.len() - 1])
    } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        raw[1..raw.len() - 1].to_string()
    } else {
        // Strip a trailing inline comment on unquoted values, as the common
        // dotenv dialect does (`FOO=bar # comment`).
        match raw.split_once(" #") {
            Some((value, _)) => value.trim_end().to_string(),
            None => raw.to_string(),
        }
    }
}

fn unescape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
