// Collision-free short ids and display names for new content.
//
// Three schemes exist:
// - add with no requested name: `New_<n>` / `New (<n>)`
// - copy of an existing item:   `<base>_copy<n>` / `<base> (copy <n>)`
// - add with a requested name:  `<name>_<n>` / `<long> (<n>)`, only on collision
//
// In every scheme the short and long counters are computed independently (0 when
// nothing matches) and the larger one is applied to both, so a collision on
// either axis advances both.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A short identifier (directory name) paired with its display title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePair {
    pub short_name: String,
    pub long_name: String,
}

/// Long name used when the item being copied has no title.
pub const UNKNOWN_LONG_NAME: &str = "Unknown";

fn copy_short_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.*)_copy[0-9]+$").expect("copy short-name pattern should compile")
    })
}

fn copy_long_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.*) \(copy [0-9]+\)$").expect("copy long-name pattern should compile")
    })
}

/// Parse `<prefix><digits><suffix>` and return the number.
fn numeric_suffix(name: &str, prefix: &str, suffix: &str) -> Option<u64> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Largest matching suffix, or 0 when nothing matches.
fn highest_suffix<S: AsRef<str>>(names: &[S], prefix: &str, suffix: &str) -> u64 {
    names
        .iter()
        .filter_map(|name| numeric_suffix(name.as_ref(), prefix, suffix))
        .max()
        .unwrap_or(0)
}

/// Names for a brand-new item when the caller did not ask for any.
pub fn names_for_add<S: AsRef<str>, T: AsRef<str>>(short_names: &[S], long_names: &[T]) -> NamePair {
    let short_n = highest_suffix(short_names, "New_", "");
    let long_n = highest_suffix(long_names, "New (", ")");
    let n = short_n.max(long_n).saturating_add(1);
    NamePair { short_name: format!("New_{n}"), long_name: format!("New ({n})") }
}

fn copy_base_short(old_short: &str) -> &str {
    copy_short_pattern()
        .captures(old_short)
        .and_then(|caps| caps.get(1))
        .map_or(old_short, |m| m.as_str())
}

fn copy_base_long(old_long: Option<&str>) -> &str {
    let Some(old_long) = old_long else {
        return UNKNOWN_LONG_NAME;
    };
    copy_long_pattern()
        .captures(old_long)
        .and_then(|caps| caps.get(1))
        .map_or(old_long, |m| m.as_str())
}

/// Names for a copy of `old_short` / `old_long`.
///
/// Copying a copy branches from the original base, so `q_copy2` yields
/// `q_copy<n>` rather than `q_copy2_copy1`.
pub fn names_for_copy<S: AsRef<str>, T: AsRef<str>>(
    old_short: &str,
    short_names: &[S],
    old_long: Option<&str>,
    long_names: &[T],
) -> NamePair {
    let base_short = copy_base_short(old_short);
    let base_long = copy_base_long(old_long);

    let short_n = highest_suffix(short_names, &format!("{base_short}_copy"), "");
    let long_n = highest_suffix(long_names, &format!("{base_long} (copy "), ")");
    let n = short_n.max(long_n).saturating_add(1);

    NamePair {
        short_name: format!("{base_short}_copy{n}"),
        long_name: format!("{base_long} (copy {n})"),
    }
}

/// Highest occupied slot for `requested` among `existing`.
///
/// The bare name occupies slot 1 and `<name><sep><k><close>` occupies slot k.
/// Returns 0 when the name is free.
fn occupied_slot<S: AsRef<str>>(
    requested: &str,
    existing: &[S],
    sep: &str,
    close: &str,
    case_insensitive: bool,
) -> u64 {
    let fold = |s: &str| if case_insensitive { s.to_lowercase() } else { s.to_string() };
    let base = fold(requested);
    let prefix = format!("{base}{sep}");

    existing
        .iter()
        .filter_map(|name| {
            let name = fold(name.as_ref());
            if name == base {
                Some(1)
            } else {
                numeric_suffix(&name, &prefix, close)
            }
        })
        .max()
        .unwrap_or(0)
}

/// Make caller-requested names unique within a scope.
///
/// Short names are compared case-insensitively, long names exactly. When
/// neither collides the request is returned untouched; otherwise both get the
/// same `_<n>` / ` (<n>)` suffix. The requested casing is always preserved.
pub fn unique_names<S: AsRef<str>, T: AsRef<str>>(
    requested_short: &str,
    short_names: &[S],
    requested_long: &str,
    long_names: &[T],
) -> NamePair {
    let short_slot = occupied_slot(requested_short, short_names, "_", "", true);
    let long_slot = occupied_slot(requested_long, long_names, " (", ")", false);
    let slot = short_slot.max(long_slot);

    if slot == 0 {
        return NamePair {
            short_name: requested_short.to_string(),
            long_name: requested_long.to_string(),
        };
    }

    let n = slot.saturating_add(1);
    NamePair {
        short_name: format!("{requested_short}_{n}"),
        long_name: format!("{requested_long} ({n})"),
    }
}
