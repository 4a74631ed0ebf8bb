//! Keyword-window selection over a fetched log sequence.
//!
//! Pure functions: the network-facing client fetches the bounded event
//! sequence, this module decides which contiguous slice of it to keep.

use tracing::warn;

use buildwatch_shared::{WindowConfig, WindowPolicy};

/// Select the configured window from `messages`.
///
/// With an empty keyword the whole fetched sequence is kept verbatim.
/// Otherwise a linear forward scan finds the first message containing the
/// keyword substring; no match yields an empty window.
pub fn select_window(messages: &[String], window: &WindowConfig) -> Vec<String> {
    if window.keyword.is_empty() {
        return messages.to_vec();
    }

    let Some(k) = messages.iter().position(|m| m.contains(&window.keyword)) else {
        warn!(keyword = %window.keyword, lines = messages.len(), "keyword not found");
        return Vec::new();
    };

    let (start, end) = window_bounds(messages.len(), k, window);
    messages[start..end].to_vec()
}

/// Compute the half-open slice bounds around the keyword index `k`.
///
/// `before-after`: `[max(0, k - before), min(len, k + after))`.
/// `before-only`: `[max(0, k - before), min(len, k + 1))`, keeping the
/// keyword line itself.
pub fn window_bounds(len: usize, k: usize, window: &WindowConfig) -> (usize, usize) {
    debug_assert!(k < len);

    let start = k.saturating_sub(window.lines_before as usize);
    let end = match window.policy {
        WindowPolicy::BeforeAfter => k.saturating_add(window.lines_after as usize).min(len),
        WindowPolicy::BeforeOnly => (k + 1).min(len),
    };
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {i}")).collect()
    }

    fn window(keyword: &str, before: u32, after: u32, policy: WindowPolicy) -> WindowConfig {
        WindowConfig {
            keyword: keyword.into(),
            lines_before: before,
            lines_after: after,
            policy,
        }
    }

    #[test]
    fn empty_keyword_keeps_everything() {
        let lines = numbered_lines(10);
        let selected = select_window(&lines, &window("", 2, 2, WindowPolicy::BeforeAfter));
        assert_eq!(selected, lines);
    }

    #[test]
    fn keyword_absent_is_deterministically_empty() {
        for len in [0, 1, 50, 500] {
            let lines = numbered_lines(len);
            let selected =
                select_window(&lines, &window("no such text", 10, 10, WindowPolicy::BeforeAfter));
            assert!(selected.is_empty(), "len={len}");
        }
    }

    #[test]
    fn mid_sequence_window_clips_at_neither_bound() {
        // 250 lines, keyword at index 120, before=100, after=100:
        // expected slice is [20, 220).
        let mut lines = numbered_lines(250);
        lines[120] = "Phase complete. Reason: exit status 1".into();

        let selected = select_window(
            &lines,
            &window("Reason: exit status 1", 100, 100, WindowPolicy::BeforeAfter),
        );

        assert_eq!(selected.len(), 200);
        assert_eq!(selected[0], "line 20");
        assert_eq!(selected[100], "Phase complete. Reason: exit status 1");
        assert_eq!(selected[199], "line 219");
    }

    #[test]
    fn window_clips_at_start() {
        let mut lines = numbered_lines(50);
        lines[3] = "boom Reason: exit status 1".into();

        let selected = select_window(
            &lines,
            &window("Reason: exit status 1", 10, 5, WindowPolicy::BeforeAfter),
        );

        // start clipped to 0, end = 3 + 5 = 8
        assert_eq!(selected.len(), 8);
        assert_eq!(selected[0], "line 0");
        assert_eq!(selected[3], "boom Reason: exit status 1");
    }

    #[test]
    fn window_clips_at_end() {
        let mut lines = numbered_lines(50);
        lines[48] = "boom Reason: exit status 1".into();

        let selected = select_window(
            &lines,
            &window("Reason: exit status 1", 5, 10, WindowPolicy::BeforeAfter),
        );

        // start = 43, end clipped to 50
        assert_eq!(selected.len(), 7);
        assert_eq!(selected[5], "boom Reason: exit status 1");
    }

    #[test]
    fn before_only_keeps_through_keyword_line() {
        let mut lines = numbered_lines(50);
        lines[30] = "boom Reason: exit status 1".into();

        let selected = select_window(
            &lines,
            &window("Reason: exit status 1", 10, 999, WindowPolicy::BeforeOnly),
        );

        // lines_after is ignored; [20, 31)
        assert_eq!(selected.len(), 11);
        assert_eq!(selected[0], "line 20");
        assert_eq!(selected[10], "boom Reason: exit status 1");
    }

    #[test]
    fn first_occurrence_wins() {
        let mut lines = numbered_lines(20);
        lines[5] = "Reason: exit status 1 (first)".into();
        lines[15] = "Reason: exit status 1 (second)".into();

        let selected = select_window(
            &lines,
            &window("Reason: exit status 1", 0, 1, WindowPolicy::BeforeAfter),
        );

        assert_eq!(selected, vec!["Reason: exit status 1 (first)".to_string()]);
    }

    #[test]
    fn bounds_never_exceed_sequence() {
        // Exhaustive small-case sweep of the documented invariant:
        // 0 <= start <= k < len and end <= len.
        for len in 1..=8usize {
            for k in 0..len {
                for before in 0..=4u32 {
                    for after in 0..=4u32 {
                        for policy in [WindowPolicy::BeforeAfter, WindowPolicy::BeforeOnly] {
                            let cfg = window("x", before, after, policy);
                            let (start, end) = window_bounds(len, k, &cfg);
                            assert!(start <= k, "start {start} > k {k}");
                            assert!(end <= len, "end {end} > len {len}");
                            assert!(start <= end, "start {start} > end {end}");
                        }
                    }
                }
            }
        }
    }
}
