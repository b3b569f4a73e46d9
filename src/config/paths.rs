//! Path expansion for configured source roots.

use std::path::PathBuf;

use directories::BaseDirs;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
}

/// The current user's home directory.
///
/// `$HOME` wins when set so that tests and sandboxes can redirect it.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()))
}

/// Expand a leading `~` plus `$VAR`/`${VAR}` references.
///
/// Unknown `${VAR}` references expand to nothing; unknown `$VAR` references are
/// left untouched so a typo stays visible in logs.
pub fn expand_path(raw: &str) -> PathBuf {
    let home = home_dir();
    let mut value = raw.to_string();

    if value == "~" || value.starts_with("~/") {
        if let Some(home) = &home {
            value = format!("{}{}", home.display(), &value[1..]);
        }
    }

    let expanded = ENV_VAR.replace_all(&value, |caps: &Captures<'_>| {
        if let Some(name) = caps.get(1) {
            lookup(name.as_str(), &home).unwrap_or_default()
        } else {
            let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            lookup(name, &home).unwrap_or_else(|| caps[0].to_string())
        }
    });

    PathBuf::from(expanded.into_owned())
}

fn lookup(name: &str, home: &Option<PathBuf>) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => Some(value),
        Err(_) if name == "HOME" => home.as_ref().map(|h| h.to_string_lossy().into_owned()),
        Err(_) => None,
    }
}
