//! Grounding-prompt assembly.
//!
//! The composed text is the exact payload sent as the final user message, so
//! it must be byte-deterministic for a fixed query + result set.

use dossier_core::{Message, SearchResult};

const SYSTEM_PROMPT: &str = "You are a research assistant. Synthesize the provided web sources into an \
accurate, well-structured Markdown report. Use headings, short paragraphs, and \
lists where they help. Only make claims the sources support, and cite them \
inline as [Source N].";

/// Build the grounding prompt: optional direct-answer line, the numbered
/// source context block, the instruction text, and the trailing sources
/// table. Source numbering is 1-based in result order; it is the canonical
/// citation numbering downstream renderers rely on.
pub fn compose(query: &str, results: &[SearchResult], answer: Option<&str>) -> String {
    let mut out = String::new();

    if let Some(answer) = answer.map(str::trim).filter(|a| !a.is_empty()) {
        out.push_str("Direct answer: ");
        out.push_str(answer);
        out.push_str("\n\n");
    }

    let context = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[Source {}]: {}\n{}\nURL: {}", i + 1, r.title, r.content, r.url))
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push_str(&context);

    out.push_str("\n\nQuestion: ");
    out.push_str(query);
    out.push_str(
        "\n\nWrite a structured Markdown report that answers the question using the \
numbered sources above. Cite supporting sources inline as [Source N]. End the \
report with a \"Sources\" section that reproduces exactly this table:\n\n",
    );
    out.push_str(&sources_table(results));
    out
}

/// The role-tagged message list for the completion call.
pub fn build_messages(query: &str, results: &[SearchResult], answer: Option<&str>) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(compose(query, results, answer)),
    ]
}

fn sources_table(results: &[SearchResult]) -> String {
    let mut table = String::from("| Number | Source | Description |\n| --- | --- | --- |\n");
    for (i, r) in results.iter().enumerate() {
        table.push_str(&format!(
            "| {} | {} | {} |\n",
            i + 1,
            cell(&r.title),
            cell(&r.snippet)
        ));
    }
    table
}

// Keep cell text from breaking the table grid.
fn cell(s: &str) -> String {
    s.replace(['\n', '\r'], " ").replace('|', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(n: usize) -> SearchResult {
        SearchResult {
            title: format!("Title {n}"),
            content: format!("Content {n}"),
            url: format!("https://example.com/{n}"),
            snippet: format!("Snippet {n}"),
            score: 0.5,
            image: None,
        }
    }

    #[test]
    fn numbers_sources_in_order() {
        let results: Vec<_> = (1..=4).map(result).collect();
        let prompt = compose("q", &results, None);
        for n in 1..=4 {
            assert!(prompt.contains(&format!("[Source {n}]: Title {n}")));
            assert!(prompt.contains(&format!("| {n} | Title {n} | Snippet {n} |")));
        }
        assert!(!prompt.contains("[Source 5]"));
    }

    #[test]
    fn table_has_one_row_per_result() {
        let results: Vec<_> = (1..=3).map(result).collect();
        let table = sources_table(&results);
        // Header + separator + 3 rows.
        assert_eq!(table.trim_end().lines().count(), 5);
        assert!(table.starts_with("| Number | Source | Description |\n| --- | --- | --- |\n"));
    }

    #[test]
    fn composition_is_deterministic() {
        let results: Vec<_> = (1..=2).map(result).collect();
        let a = compose("weather in Oslo", &results, Some("cold"));
        let b = compose("weather in Oslo", &results, Some("cold"));
        assert_eq!(a, b);
    }

    #[test]
    fn direct_answer_leads_when_present() {
        let results = vec![result(1)];
        let with = compose("q", &results, Some("42"));
        assert!(with.starts_with("Direct answer: 42\n\n[Source 1]"));
        let without = compose("q", &results, None);
        assert!(without.starts_with("[Source 1]"));
        let blank = compose("q", &results, Some("   "));
        assert!(blank.starts_with("[Source 1]"));
    }

    #[test]
    fn cells_cannot_break_the_grid() {
        let mut r = result(1);
        r.snippet = "a|b\nc".to_string();
        let table = sources_table(&[r]);
        assert!(table.contains("| 1 | Title 1 | a/b c |"));
    }

    #[test]
    fn messages_are_system_then_user() {
        let msgs = build_messages("q", &[result(1)], None);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
        assert!(msgs[1].content.contains("[Source 1]"));
    }
}
