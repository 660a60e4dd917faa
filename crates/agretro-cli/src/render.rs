//! Small text helpers shared by the command handlers.

/// Collapse whitespace and truncate to `max_chars`, appending an
/// ellipsis when cut. Respects UTF-8 character boundaries.
pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let cut: String = normalized
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    format!("{}...", cut)
}

pub(crate) fn fmt_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.0}s", seconds)
    } else if seconds < 3600.0 {
        format!("{:.0}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}

/// RFC 3339 timestamp down to minutes, `T` swapped for a space.
pub(crate) fn fmt_when(ts: &str) -> String {
    match ts.get(..16) {
        Some(prefix) => prefix.replace('T', " "),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_collapses_whitespace_and_truncates() {
        assert_eq!(clip("fix  the\n  build", 40), "fix the build");
        assert_eq!(clip("abcdefghij", 8), "abcde...");
        assert_eq!(clip("héllo wörld", 11), "héllo wörld");
    }

    #[test]
    fn durations_pick_a_sensible_unit() {
        assert_eq!(fmt_duration(42.0), "42s");
        assert_eq!(fmt_duration(150.0), "2m");
        assert_eq!(fmt_duration(5400.0), "1.5h");
    }

    #[test]
    fn timestamps_render_to_the_minute() {
        assert_eq!(fmt_when("2026-05-01T09:30:12Z"), "2026-05-01 09:30");
        assert_eq!(fmt_when("bad"), "bad");
    }
}
