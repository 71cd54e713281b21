//! Splitting the completion byte stream into channel events.
//!
//! Each chunk is decoded lossily, split into line frames, and every frame is
//! classified independently. A partial line split across a chunk boundary
//! (or a multi-byte sequence cut in half by the chunker) parses as garbage
//! and is skipped — losing that single fragment is preferred over failing
//! the whole response, and there is deliberately no cross-chunk line buffer.

use dossier_core::ChannelEvent;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Non-empty line frames within one decoded chunk.
pub fn frames_in_chunk(chunk: &str) -> impl Iterator<Item = &str> {
    chunk
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
}

/// Classify one line frame. `None` for the SSE `[DONE]` sentinel and for
/// records whose delta carries neither channel; `Unparseable` when the line
/// is not a JSON record at all.
pub fn classify_line(line: &str) -> Option<ChannelEvent> {
    let payload = line.strip_prefix("data: ").unwrap_or(line);
    if payload == "[DONE]" {
        return None;
    }
    let record: StreamRecord = match serde_json::from_str(payload) {
        Ok(r) => r,
        Err(_) => return Some(ChannelEvent::Unparseable),
    };
    let delta = record.choices.into_iter().next()?.delta;
    if let Some(text) = delta.reasoning_content {
        return Some(ChannelEvent::Reasoning(text));
    }
    if let Some(text) = delta.content {
        return Some(ChannelEvent::Answer(text));
    }
    None
}

/// All events in one decoded chunk, in frame order. `Unparseable` frames are
/// included; the pipeline logs and drops them.
pub fn events_in_chunk(chunk: &str) -> Vec<ChannelEvent> {
    frames_in_chunk(chunk).filter_map(classify_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(body: &str) -> String {
        format!(r#"data: {{"choices":[{{"delta":{body}}}]}}"#)
    }

    #[test]
    fn classifies_both_channels() {
        assert_eq!(
            classify_line(&delta_line(r#"{"reasoning_content":"hm"}"#)),
            Some(ChannelEvent::Reasoning("hm".to_string()))
        );
        assert_eq!(
            classify_line(&delta_line(r#"{"content":"A"}"#)),
            Some(ChannelEvent::Answer("A".to_string()))
        );
    }

    #[test]
    fn reasoning_wins_when_both_fields_are_present() {
        assert_eq!(
            classify_line(&delta_line(r#"{"reasoning_content":"r","content":"c"}"#)),
            Some(ChannelEvent::Reasoning("r".to_string()))
        );
    }

    #[test]
    fn sentinel_and_empty_deltas_emit_nothing() {
        assert_eq!(classify_line("data: [DONE]"), None);
        assert_eq!(classify_line("[DONE]"), None);
        assert_eq!(classify_line(&delta_line("{}")), None);
        assert_eq!(classify_line(r#"{"choices":[]}"#), None);
    }

    #[test]
    fn unprefixed_records_are_accepted() {
        assert_eq!(
            classify_line(r#"{"choices":[{"delta":{"content":"A"}}]}"#),
            Some(ChannelEvent::Answer("A".to_string()))
        );
    }

    #[test]
    fn malformed_lines_never_abort_the_chunk() {
        let chunk = "not json\n{\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\ndata: [DONE]\n";
        let events = events_in_chunk(chunk);
        assert_eq!(
            events,
            vec![
                ChannelEvent::Unparseable,
                ChannelEvent::Answer("A".to_string())
            ]
        );
        // Exactly one answer event survives the filter the pipeline applies.
        let answers: Vec<_> = events
            .into_iter()
            .filter(|e| matches!(e, ChannelEvent::Answer(_)))
            .collect();
        assert_eq!(answers, vec![ChannelEvent::Answer("A".to_string())]);
    }

    #[test]
    fn empty_lines_are_discarded() {
        assert!(events_in_chunk("\n\r\n  \n").is_empty());
    }

    #[test]
    fn extra_record_fields_are_tolerated() {
        let line = r#"data: {"id":"x","model":"m","choices":[{"index":0,"delta":{"content":"ok"},"finish_reason":null}]}"#;
        assert_eq!(
            classify_line(line),
            Some(ChannelEvent::Answer("ok".to_string()))
        );
    }
}
