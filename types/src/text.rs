//! Small pure text helpers.

/// Truncate a string to at most `max` characters, ending with `...` when cut.
///
/// - Trims surrounding whitespace first.
/// - Counts `char`s, never splitting a Korean syllable or emoji.
/// - `max` below 3 is raised to 3 so the ellipsis fits.
#[must_use]
pub fn truncate_with_ellipsis(raw: &str, max: usize) -> String {
    const SUFFIX: &str = "...";
    let max = max.max(SUFFIX.len());
    let trimmed = raw.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max - SUFFIX.len()).collect();
    format!("{head}{SUFFIX}")
}
