//! Best-effort cosmetic repair of streamed Markdown fragments.
//!
//! Each pass is a function `&str -> String` applied in a fixed order (later
//! passes assume earlier ones already normalized spacing). The pipeline is
//! idempotent and safe on incomplete prefixes: it runs after every answer
//! delta, not just on final text, and it never fails — when nothing matches,
//! the input comes back unchanged.
//!
//! This is a cosmetic normalizer over line patterns, not a Markdown parser.

use regex::Regex;
use std::sync::LazyLock;

/// Run the full repair pipeline on (possibly partial) Markdown text.
pub fn repair(text: &str) -> String {
    let mut result = space_after_heading_marks(text);
    result = space_after_list_markers(&result);
    result = collapse_emphasis_runs(&result);
    result = normalize_source_markers(&result);
    result = normalize_table_separators(&result);
    result = strip_alt_artifacts(&result);
    result = blank_line_after_headings(&result);
    result = blank_line_after_list_items(&result);
    result
}

// ---------------------------------------------------------------------------
// Pass 1: space between heading hashes and the heading text
// ---------------------------------------------------------------------------

fn space_after_heading_marks(md: &str) -> String {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})([^#\s])").expect("valid regex"));
    RE.replace_all(md, "${1} ${2}").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: space after list markers
// ---------------------------------------------------------------------------

/// A marker followed by another marker character is left alone so emphasis
/// (`**bold`) and horizontal rules (`---`) survive.
fn space_after_list_markers(md: &str) -> String {
    static UNORDERED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)([*+-])([^\s*+-])").expect("valid regex"));
    static ORDERED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)(\d+\.)(\S)").expect("valid regex"));
    let out = UNORDERED.replace_all(md, "${1}${2} ${3}");
    ORDERED.replace_all(&out, "${1}${2} ${3}").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: collapse runs of 3+ asterisks to bold
// ---------------------------------------------------------------------------

fn collapse_emphasis_runs(md: &str) -> String {
    static RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*{3,}").expect("valid regex"));
    RE.replace_all(md, "**").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: stray inline citation markers
// ---------------------------------------------------------------------------

/// `Source3:` / `Source 12.` style leftovers become a line-leading bold
/// marker. The replacement carries no digits, so the pass cannot re-match
/// its own output. Bracketed citations (`[Source 3]`) are untouched — the
/// closing bracket is not citation punctuation.
fn normalize_source_markers(md: &str) -> String {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\bSource[ \t]*\d+[ \t]*[:.,;][ \t]*").expect("valid regex"));
    RE.replace_all(md, "\n**Source:** ").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: canonical table separator rows
// ---------------------------------------------------------------------------

fn normalize_table_separators(md: &str) -> String {
    static SEP: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[ \t]*\|[ \t|:-]*-[ \t|:-]*$").expect("valid regex"));

    let mut out: Vec<String> = Vec::new();
    for line in md.lines() {
        if SEP.is_match(line) {
            let trimmed = line.trim();
            let pipes = trimmed.matches('|').count();
            let cells = if trimmed.ends_with('|') {
                pipes.saturating_sub(1)
            } else {
                pipes
            }
            .max(1);
            let indent = &line[..line.len() - line.trim_start().len()];
            let mut row = String::from(indent);
            row.push('|');
            for _ in 0..cells {
                row.push_str(" --- |");
            }
            out.push(row);
        } else {
            out.push(line.to_string());
        }
    }
    rejoin(md, out)
}

// ---------------------------------------------------------------------------
// Pass 6: leaked alt-text markers
// ---------------------------------------------------------------------------

/// `Alt` / `Alt'` / `Alt"` before a lowercase word is a leaked image
/// alt-text marker, not prose. Applied to a fixpoint: stripping one marker
/// can expose another directly behind it.
fn strip_alt_artifacts(md: &str) -> String {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"\bAlt['"]?\s+([a-z])"#).expect("valid regex"));
    let mut cur = md.to_string();
    loop {
        let next = RE.replace_all(&cur, "${1}").to_string();
        if next == cur {
            return cur;
        }
        cur = next;
    }
}

// ---------------------------------------------------------------------------
// Pass 7: blank line after headings
// ---------------------------------------------------------------------------

fn blank_line_after_headings(md: &str) -> String {
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#{1,6}( |$)").expect("valid regex"));

    let lines: Vec<&str> = md.lines().collect();
    let mut out: Vec<String> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        if HEADING.is_match(line) {
            if let Some(next) = lines.get(i + 1) {
                if !next.trim().is_empty() {
                    out.push(String::new());
                }
            }
        }
    }
    rejoin(md, out)
}

// ---------------------------------------------------------------------------
// Pass 8: blank line after the end of a list
// ---------------------------------------------------------------------------

/// Keeps a list from swallowing the paragraph that follows it. No blank is
/// inserted between consecutive items, and the final line of a streaming
/// prefix is left alone (its successor has not arrived yet).
fn blank_line_after_list_items(md: &str) -> String {
    let lines: Vec<&str> = md.lines().collect();
    let mut out: Vec<String> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        if is_list_item(line) {
            if let Some(next) = lines.get(i + 1) {
                if !next.trim().is_empty() && !is_list_item(next) {
                    out.push(String::new());
                }
            }
        }
    }
    rejoin(md, out)
}

fn is_list_item(line: &str) -> bool {
    static ITEM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[ \t]*(?:[*+-]|\d+\.)([ \t]|$)").expect("valid regex"));
    ITEM.is_match(line)
}

// `lines()` drops the trailing newline; put it back so a no-op pass returns
// its input byte-for-byte.
fn rejoin(original: &str, lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn heading_marks_get_a_space() {
        assert_eq!(space_after_heading_marks("#Weather"), "# Weather");
        assert_eq!(space_after_heading_marks("####deep"), "#### deep");
        assert_eq!(space_after_heading_marks("# already fine"), "# already fine");
        // Seven hashes is not a heading.
        assert_eq!(space_after_heading_marks("#######x"), "#######x");
    }

    #[test]
    fn list_markers_get_a_space() {
        assert_eq!(space_after_list_markers("-item"), "- item");
        assert_eq!(space_after_list_markers("  *item"), "  * item");
        assert_eq!(space_after_list_markers("2.second"), "2. second");
        assert_eq!(space_after_list_markers("**bold** start"), "**bold** start");
        assert_eq!(space_after_list_markers("---"), "---");
    }

    #[test]
    fn emphasis_runs_collapse_to_bold() {
        assert_eq!(collapse_emphasis_runs("a ***b*** c"), "a **b** c");
        assert_eq!(collapse_emphasis_runs("******"), "**");
        assert_eq!(collapse_emphasis_runs("**kept**"), "**kept**");
    }

    #[test]
    fn stray_source_markers_are_normalized() {
        assert_eq!(
            normalize_source_markers("see Source 2: the report"),
            "see \n**Source:** the report"
        );
        assert_eq!(
            normalize_source_markers("see Source3, the report"),
            "see \n**Source:** the report"
        );
        // Bracketed citations are the supported form; leave them alone.
        assert_eq!(
            normalize_source_markers("cold [Source 1] today"),
            "cold [Source 1] today"
        );
    }

    #[test]
    fn table_separators_are_canonicalized() {
        assert_eq!(normalize_table_separators("|---|---|"), "| --- | --- |");
        assert_eq!(normalize_table_separators("| - | :-- |"), "| --- | --- |");
        assert_eq!(normalize_table_separators("| --- | ---"), "| --- | --- |");
        assert_eq!(normalize_table_separators("| a | b |"), "| a | b |");
    }

    #[test]
    fn alt_artifacts_are_stripped() {
        assert_eq!(strip_alt_artifacts("Alt a cat sleeping"), "a cat sleeping");
        assert_eq!(strip_alt_artifacts("Alt' photo of rain"), "photo of rain");
        assert_eq!(strip_alt_artifacts("Although it rained"), "Although it rained");
        assert_eq!(strip_alt_artifacts("the Alt key"), "the Alt key");
        assert_eq!(strip_alt_artifacts("Alt Alt twice over"), "twice over");
    }

    #[test]
    fn headings_get_a_blank_line() {
        assert_eq!(blank_line_after_headings("# T\nbody"), "# T\n\nbody");
        assert_eq!(blank_line_after_headings("# T\n\nbody"), "# T\n\nbody");
        // Stream edge: nothing follows yet.
        assert_eq!(blank_line_after_headings("# T"), "# T");
    }

    #[test]
    fn list_ends_get_a_blank_line() {
        assert_eq!(
            blank_line_after_list_items("- a\n- b\npara"),
            "- a\n- b\n\npara"
        );
        assert_eq!(blank_line_after_list_items("- a\n- b"), "- a\n- b");
        assert_eq!(
            blank_line_after_list_items("1. a\n2. b\n\npara"),
            "1. a\n2. b\n\npara"
        );
    }

    #[test]
    fn streamed_heading_fragment_gets_space_and_blank_line() {
        assert_eq!(repair("#Weather\nIt is cold."), "# Weather\n\nIt is cold.");
    }

    #[test]
    fn clean_text_passes_through_unchanged() {
        let clean = "# Title\n\nA plain paragraph with [Source 1] cited.\n\n- one\n- two\n\nEnd.\n";
        assert_eq!(repair(clean), clean);
    }

    #[test]
    fn repair_is_idempotent_on_a_messy_composite() {
        let messy = "#Weather report\n-cold\n-wet\nSource 1: the forecast\n|---|---|\nAlt a chart of temps\n***Important*** note";
        let once = repair(messy);
        assert_eq!(repair(&once), once);
    }

    #[test]
    fn repair_is_stable_on_every_prefix_of_a_messy_text() {
        let messy = "##Headline\n1.first point [Source 2]\n2.second\nSee Source 3: details\n| Number | Source | Description |\n|---|---|---|\n| 1 | a | b |\n";
        for (cut, _) in messy.char_indices() {
            let prefix = &messy[..cut];
            let once = repair(prefix);
            assert_eq!(repair(&once), once, "prefix ending at byte {cut}");
        }
    }

    fn fragment() -> BoxedStrategy<String> {
        prop_oneof![
            Just("#Heading".to_string()).boxed(),
            Just("## Spaced heading".to_string()).boxed(),
            Just("\n".to_string()).boxed(),
            Just("-item".to_string()).boxed(),
            Just("* starred".to_string()).boxed(),
            Just("1.first".to_string()).boxed(),
            Just("plain words ".to_string()).boxed(),
            Just("***emphasis***".to_string()).boxed(),
            Just("Source 3: cited".to_string()).boxed(),
            Just("[Source 2]".to_string()).boxed(),
            Just("|---|---|".to_string()).boxed(),
            Just("| a | b |".to_string()).boxed(),
            Just("Alt a photo".to_string()).boxed(),
            proptest::string::string_regex("[a-z #*|.\\- ]{0,12}")
                .expect("valid regex")
                .boxed(),
        ]
        .boxed()
    }

    proptest! {
        #[test]
        fn repair_is_idempotent(fragments in proptest::collection::vec(fragment(), 0..40)) {
            let input = fragments.concat();
            let once = repair(&input);
            prop_assert_eq!(&repair(&once), &once);
        }
    }
}
