//! Parsing of the "which results do you want" prompt.

use tracing::warn;

/// Token selecting every result.
pub const ALL_TOKEN: &str = "all";

/// Outcome of parsing a selection against a result set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Selection {
    /// 0-based indices in the order the user typed them.
    pub indices: Vec<usize>,
    /// Tokens that were ignored, as typed.
    pub skipped: Vec<String>,
}

impl Selection {
    /// An empty selection is a no-op, not an error.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Parses `input` against a result set of `len` items.
///
/// Accepts `all` (any case) or comma separated 1-based indices. Indices out of
/// range and tokens that are not numbers are skipped; a repeated index keeps
/// its first position.
///
/// # Examples
///
/// ```
/// use ytmenu::selection::parse_selection;
///
/// let selection = parse_selection("1,99", 5);
/// assert_eq!(selection.indices, vec![0]);
/// assert_eq!(selection.skipped, vec!["99".to_string()]);
/// ```
pub fn parse_selection(input: &str, len: usize) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case(ALL_TOKEN) {
        return Selection {
            indices: (0..len).collect(),
            skipped: Vec::new(),
        };
    }

    let mut selection = Selection::default();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token.parse::<usize>() {
            Ok(n) if n >= 1 && n <= len => {
                if !selection.indices.contains(&(n - 1)) {
                    selection.indices.push(n - 1);
                }
            }
            _ => {
                warn!("Skipping invalid selection: {}", token);
                selection.skipped.push(token.to_string());
            }
        }
    }
    selection
}
