use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;

/// Picks a name for a new child when the client's `Slug` is unusable.
pub trait SlugGenerator: std::fmt::Debug + Send + Sync {
    /// A name derived from `base` that is not in `taken`.
    fn fresh(&self, base: &str, taken: &HashSet<String>) -> String;
}

/// `<base>-<millis>`, or just `<millis>` without a base, with a counter
/// appended while the name is still taken.
#[derive(Debug, Clone)]
pub struct ClockSlugGenerator {
    clock: Arc<dyn Clock>,
}

impl ClockSlugGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl SlugGenerator for ClockSlugGenerator {
    fn fresh(&self, base: &str, taken: &HashSet<String>) -> String {
        let millis = self.clock.now().timestamp_millis();
        let stem = if base.is_empty() {
            millis.to_string()
        } else {
            format!("{}-{}", base, millis)
        };
        if !taken.contains(&stem) {
            return stem;
        }
        (1..)
            .map(|n| format!("{}-{}", stem, n))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or(stem)
    }
}

/// Reduce a client supplied `Slug` to `[A-Za-z0-9._-]`. Anything else
/// becomes `_`, as do leading dots so the name never hides.
pub fn sanitize(slug: &str) -> String {
    let mut leading = true;
    slug.trim()
        .chars()
        .map(|c| {
            let keep = c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
            let out = if !keep || (leading && c == '.') { '_' } else { c };
            if c != '.' {
                leading = false;
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("notes.txt"), "notes.txt");
        assert_eq!(sanitize("my notes/é?"), "my_notes___");
        assert_eq!(sanitize("..hidden"), "__hidden");
        assert_eq!(sanitize("a..b"), "a..b");
        assert_eq!(sanitize("  "), "");
    }

    #[test]
    fn test_fresh_names() {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        ));
        let slugs = ClockSlugGenerator::new(clock);
        let mut taken = HashSet::new();

        assert_eq!(slugs.fresh("", &taken), "1700000000123");
        assert_eq!(slugs.fresh("note", &taken), "note-1700000000123");

        taken.insert("note-1700000000123".to_string());
        taken.insert("note-1700000000123-1".to_string());
        assert_eq!(slugs.fresh("note", &taken), "note-1700000000123-2");
    }
}
