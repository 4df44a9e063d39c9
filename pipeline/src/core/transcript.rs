//! Assistant transcript parsing and message extraction.
//!
//! Transcripts come in two encodings: a single JSON array of records, or one
//! JSON record per line. Parsing never fails as a whole; malformed lines are
//! counted and skipped so the well-formed records around them survive.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::core::types::ExecutionDetails;

/// Plain-text lines shorter than this are not treated as a reply.
pub const PLAIN_TEXT_MIN_LEN: usize = 20;

/// One parsed record from the assistant's output stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TranscriptRecord {
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        cost_usd: Option<f64>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        duration_ms: Option<f64>,
        #[serde(default)]
        is_error: bool,
    },
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Encoding the transcript was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptEncoding {
    JsonArray,
    JsonLines,
}

/// Parsed transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub encoding: TranscriptEncoding,
    pub records: Vec<TranscriptRecord>,
    /// Non-JSON lines, kept in order for the plain-text heuristic.
    pub plain_lines: Vec<String>,
    /// Lines (or array elements) that could not be decoded as a record.
    pub malformed: usize,
}

impl Transcript {
    /// Parse a whole JSON array first, then fall back to one record per line.
    pub fn parse(content: &str) -> Self {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(content) {
            let mut records = Vec::with_capacity(items.len());
            let mut malformed = 0usize;
            for item in items {
                match serde_json::from_value::<TranscriptRecord>(item) {
                    Ok(record) => records.push(record),
                    Err(_) => malformed += 1,
                }
            }
            debug!(records = records.len(), malformed, "parsed transcript as json array");
            return Self {
                encoding: TranscriptEncoding::JsonArray,
                records,
                plain_lines: Vec::new(),
                malformed,
            };
        }

        let mut records = Vec::new();
        let mut plain_lines = Vec::new();
        let mut malformed = 0usize;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TranscriptRecord>(line) {
                Ok(record) => records.push(record),
                Err(_) => {
                    malformed += 1;
                    if !looks_like_json(line) {
                        plain_lines.push(line.to_string());
                    }
                }
            }
        }
        debug!(records = records.len(), malformed, "parsed transcript as json lines");
        Self {
            encoding: TranscriptEncoding::JsonLines,
            records,
            plain_lines,
            malformed,
        }
    }

    /// Cost and duration from the first `result` record.
    pub fn execution_details(&self) -> Option<ExecutionDetails> {
        self.records.iter().find_map(|record| match record {
            TranscriptRecord::Result {
                cost_usd,
                total_cost_usd,
                duration_ms,
                ..
            } => Some(ExecutionDetails {
                cost_usd: total_cost_usd.or(*cost_usd),
                duration_ms: *duration_ms,
            }),
            _ => None,
        })
    }

    /// Apply the default extraction rules in priority order.
    pub fn extract_message(&self) -> Option<ExtractedMessage> {
        extract_with_rules(self, &MessageRule::DEFAULT_ORDER)
    }
}

fn looks_like_json(line: &str) -> bool {
    line.starts_with('{') || line.starts_with('[')
}

/// One way of pulling a human-readable reply out of a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRule {
    /// The `result` field of the first `result` record.
    ResultField,
    /// Text fragments of every `assistant` record, concatenated.
    AssistantText,
    /// The first non-JSON line of at least [`PLAIN_TEXT_MIN_LEN`] characters.
    PlainTextHeuristic,
}

impl MessageRule {
    pub const DEFAULT_ORDER: [MessageRule; 3] = [
        MessageRule::ResultField,
        MessageRule::AssistantText,
        MessageRule::PlainTextHeuristic,
    ];

    pub fn apply(self, transcript: &Transcript) -> Option<String> {
        match self {
            Self::ResultField => transcript.records.iter().find_map(|record| match record {
                TranscriptRecord::Result {
                    result: Some(text), ..
                } if !text.trim().is_empty() => Some(text.trim().to_string()),
                _ => None,
            }),
            Self::AssistantText => {
                let fragments: Vec<&str> = transcript
                    .records
                    .iter()
                    .filter_map(|record| match record {
                        TranscriptRecord::Assistant { message } => Some(message),
                        _ => None,
                    })
                    .flat_map(|message| message.content.iter())
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.trim()),
                        ContentBlock::Other => None,
                    })
                    .filter(|text| !text.is_empty())
                    .collect();
                if fragments.is_empty() {
                    None
                } else {
                    Some(fragments.join("\n\n"))
                }
            }
            Self::PlainTextHeuristic => transcript
                .plain_lines
                .iter()
                .find(|line| line.chars().count() >= PLAIN_TEXT_MIN_LEN)
                .cloned(),
        }
    }
}

/// A reply pulled out of the transcript, tagged with the rule that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMessage {
    pub text: String,
    pub rule: MessageRule,
}

pub fn extract_with_rules(transcript: &Transcript, rules: &[MessageRule]) -> Option<ExtractedMessage> {
    rules.iter().find_map(|rule| {
        rule.apply(transcript)
            .map(|text| ExtractedMessage { text, rule: *rule })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT_THEN_ASSISTANT: &str = concat!(
        r#"{"type":"result","result":"Done.","cost_usd":0.02,"duration_ms":1500}"#,
        "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"ignored"}]}}"#,
    );

    #[test]
    fn result_record_wins_over_assistant_text() {
        let transcript = Transcript::parse(RESULT_THEN_ASSISTANT);
        assert_eq!(transcript.encoding, TranscriptEncoding::JsonLines);
        let message = transcript.extract_message().expect("message");
        assert_eq!(message.text, "Done.");
        assert_eq!(message.rule, MessageRule::ResultField);

        let details = transcript.execution_details().expect("details");
        assert_eq!(details.cost_usd, Some(0.02));
        assert_eq!(details.duration_ms, Some(1500.0));
    }

    #[test]
    fn result_with_both_cost_fields_is_kept() {
        let transcript = Transcript::parse(
            r#"{"type":"result","result":"Done.","cost_usd":0.01,"total_cost_usd":0.02,"duration_ms":1500}"#,
        );
        assert_eq!(transcript.records.len(), 1);
        assert_eq!(transcript.malformed, 0);
        assert_eq!(transcript.extract_message().expect("message").text, "Done.");
        assert_eq!(
            transcript.execution_details(),
            Some(ExecutionDetails {
                cost_usd: Some(0.02),
                duration_ms: Some(1500.0),
            })
        );
    }

    #[test]
    fn malformed_lines_are_skipped_without_losing_neighbours() {
        let content = [
            r#"{"type":"system","subtype":"init"}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}"#,
            r#"{"type":"assistant","message":"#,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Read"},{"type":"text","text":"second"}]}}"#,
            "not json at all",
            r#"{"type":"result","duration_ms":10}"#,
        ]
        .join("\n");

        let transcript = Transcript::parse(&content);
        assert_eq!(transcript.records.len(), 4);
        assert_eq!(transcript.malformed, 2);
        assert_eq!(transcript.plain_lines, vec!["not json at all".to_string()]);

        let message = transcript.extract_message().expect("message");
        assert_eq!(message.rule, MessageRule::AssistantText);
        assert_eq!(message.text, "first\n\nsecond");
    }

    #[test]
    fn json_array_is_parsed_whole() {
        let content = r#"[
            {"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}},
            42,
            {"type":"result","result":"All good","total_cost_usd":1.5}
        ]"#;
        let transcript = Transcript::parse(content);
        assert_eq!(transcript.encoding, TranscriptEncoding::JsonArray);
        assert_eq!(transcript.records.len(), 2);
        assert_eq!(transcript.malformed, 1);
        assert_eq!(
            transcript.execution_details(),
            Some(ExecutionDetails {
                cost_usd: Some(1.5),
                duration_ms: None,
            })
        );
        assert_eq!(transcript.extract_message().expect("message").text, "All good");
    }

    #[test]
    fn plain_text_heuristic_needs_minimum_length() {
        let transcript = Transcript::parse("short\nThis line is long enough to be a reply.\n");
        let message = transcript.extract_message().expect("message");
        assert_eq!(message.rule, MessageRule::PlainTextHeuristic);
        assert_eq!(message.text, "This line is long enough to be a reply.");

        let transcript = Transcript::parse("tiny\nalso tiny\n");
        assert_eq!(transcript.extract_message(), None);
    }

    #[test]
    fn blank_result_falls_through_to_next_rule() {
        let content = concat!(
            r#"{"type":"result","result":"   "}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"fallback"}]}}"#,
        );
        let transcript = Transcript::parse(content);
        assert_eq!(MessageRule::ResultField.apply(&transcript), None);
        assert_eq!(transcript.extract_message().expect("message").text, "fallback");
    }

    #[test]
    fn rules_can_be_applied_selectively() {
        let transcript = Transcript::parse(RESULT_THEN_ASSISTANT);
        let message =
            extract_with_rules(&transcript, &[MessageRule::AssistantText]).expect("message");
        assert_eq!(message.text, "ignored");
        assert_eq!(extract_with_rules(&transcript, &[MessageRule::PlainTextHeuristic]), None);
    }

    #[test]
    fn empty_transcript_has_no_details_or_message() {
        let transcript = Transcript::parse("");
        assert!(transcript.records.is_empty());
        assert_eq!(transcript.execution_details(), None);
        assert_eq!(transcript.extract_message(), None);
    }
}
