//! Text extraction from transcription job results.
//!
//! The upstream service has shipped several incompatible result
//! encodings over time: entries carrying a secondary result URL whose
//! body holds a `transcripts` collection or a `payload.result` of
//! varying shape, entries with a direct `text` field, and entries with
//! a `sentence` field. Each shape gets its own extractor returning
//! `Option<String>`; extractors are tried in priority order so callers
//! never need to know which encoding is active.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};

/// Fetches the body behind a secondary result URL. Abstracted so the
/// priority order is testable without a network.
#[async_trait]
pub trait ResultFetcher: Send + Sync {
    async fn fetch_json(&self, url: &str) -> PipelineResult<Value>;
}

pub struct HttpResultFetcher {
    http: reqwest::Client,
}

impl HttpResultFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ResultFetcher for HttpResultFetcher {
    async fn fetch_json(&self, url: &str) -> PipelineResult<Value> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Remote(format!("result fetch failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Remote(format!(
                "result fetch returned {}",
                status
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PipelineError::Remote(format!("result body is not JSON: {}", e)))
    }
}

/// `{"transcripts": [{"text": ...}, ...]}` — join texts with newline.
pub fn text_from_transcripts(body: &Value) -> Option<String> {
    let transcripts = body.get("transcripts")?.as_array()?;
    let lines: Vec<&str> = transcripts
        .iter()
        .filter_map(|t| t.get("text").and_then(Value::as_str))
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

/// `{"payload": {"result": ...}}` where result is a collection of
/// `{"text"}` elements, an object with `text` or nested `sentences`,
/// or a plain string.
pub fn text_from_payload_result(body: &Value) -> Option<String> {
    let result = body.get("payload")?.get("result")?;
    match result {
        Value::Array(elements) => {
            let lines: Vec<&str> = elements
                .iter()
                .filter_map(|e| e.get("text").and_then(Value::as_str))
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        Value::Object(_) => {
            if let Some(text) = result.get("text").and_then(Value::as_str) {
                return Some(text.to_string());
            }
            joined_sentences(result.get("sentences")?)
        }
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Entry carries its text inline.
pub fn direct_text(entry: &Value) -> Option<String> {
    entry
        .get("text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Entry carries a single `sentence` field.
pub fn sentence_text(entry: &Value) -> Option<String> {
    entry
        .get("sentence")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Last resort, applied to the first entry only: a `sentence` field, or
/// a `sentences` field that is either a collection or a plain string.
pub fn fallback_text(entry: &Value) -> Option<String> {
    if let Some(sentence) = sentence_text(entry) {
        return Some(sentence);
    }
    joined_sentences(entry.get("sentences")?)
}

fn joined_sentences(sentences: &Value) -> Option<String> {
    match sentences {
        Value::Array(elements) => {
            let lines: Vec<&str> = elements
                .iter()
                .filter_map(|e| match e {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Walk the result entries in priority order and accumulate text.
///
/// Returns trimmed text, or the literal fallback `"no text recognized"`
/// — never an empty string.
pub async fn extract_text(
    results: &[Value],
    fetcher: &dyn ResultFetcher,
) -> PipelineResult<String> {
    let mut out = String::new();

    for entry in results {
        if let Some(url) = entry.get("transcription_url").and_then(Value::as_str) {
            match fetcher.fetch_json(url).await {
                Ok(body) => {
                    if let Some(text) =
                        text_from_transcripts(&body).or_else(|| text_from_payload_result(&body))
                    {
                        out.push_str(&text);
                        out.push('\n');
                        continue;
                    }
                    debug!("Secondary result body had no recognizable text shape");
                }
                // Fall through to the inline shapes for this entry
                Err(e) => warn!("Failed to fetch secondary result {}: {}", url, e),
            }
        }
        if let Some(text) = direct_text(entry) {
            out.push_str(&text);
            out.push('\n');
            continue;
        }
        if let Some(sentence) = sentence_text(entry) {
            out.push_str(&sentence);
            out.push('\n');
        }
    }

    if out.trim().is_empty() {
        if let Some(first) = results.first() {
            if let Some(text) = fallback_text(first) {
                out = text;
            }
        }
    }

    let out = out.trim().to_string();
    if out.is_empty() {
        Ok("no text recognized".to_string())
    } else {
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct MapFetcher(HashMap<String, Value>);

    #[async_trait]
    impl ResultFetcher for MapFetcher {
        async fn fetch_json(&self, url: &str) -> PipelineResult<Value> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| PipelineError::Remote(format!("no body for {}", url)))
        }
    }

    fn no_fetch() -> MapFetcher {
        MapFetcher(HashMap::new())
    }

    #[test]
    fn test_transcripts_joined_with_newline() {
        let body = json!({"transcripts": [{"text": "one"}, {"text": "two"}]});
        assert_eq!(text_from_transcripts(&body).unwrap(), "one\ntwo");
    }

    #[test]
    fn test_transcripts_missing_is_none() {
        assert!(text_from_transcripts(&json!({"other": 1})).is_none());
        assert!(text_from_transcripts(&json!({"transcripts": []})).is_none());
    }

    #[test]
    fn test_payload_result_collection() {
        let body = json!({"payload": {"result": [{"text": "a"}, {"text": "b"}]}});
        assert_eq!(text_from_payload_result(&body).unwrap(), "a\nb");
    }

    #[test]
    fn test_payload_result_object_with_text() {
        let body = json!({"payload": {"result": {"text": "hello"}}});
        assert_eq!(text_from_payload_result(&body).unwrap(), "hello");
    }

    #[test]
    fn test_payload_result_object_with_sentences() {
        let body = json!({"payload": {"result": {"sentences": [{"text": "s1"}, {"text": "s2"}]}}});
        assert_eq!(text_from_payload_result(&body).unwrap(), "s1\ns2");
    }

    #[test]
    fn test_payload_result_plain_string() {
        let body = json!({"payload": {"result": "raw text"}});
        assert_eq!(text_from_payload_result(&body).unwrap(), "raw text");
    }

    #[test]
    fn test_fallback_sentence_then_sentences() {
        assert_eq!(fallback_text(&json!({"sentence": "only"})).unwrap(), "only");
        assert_eq!(
            fallback_text(&json!({"sentences": ["x", "y"]})).unwrap(),
            "x\ny"
        );
        assert_eq!(
            fallback_text(&json!({"sentences": "whole"})).unwrap(),
            "whole"
        );
        assert!(fallback_text(&json!({})).is_none());
    }

    #[tokio::test]
    async fn test_secondary_url_wins_over_direct_text() {
        let mut bodies = HashMap::new();
        bodies.insert(
            "https://results/1".to_string(),
            json!({"transcripts": [{"text": "from url"}]}),
        );
        let fetcher = MapFetcher(bodies);

        let results = vec![json!({
            "transcription_url": "https://results/1",
            "text": "inline text"
        })];
        let text = extract_text(&results, &fetcher).await.unwrap();
        assert_eq!(text, "from url");
    }

    #[tokio::test]
    async fn test_failed_secondary_fetch_degrades_to_direct_text() {
        let results = vec![json!({
            "transcription_url": "https://results/missing",
            "text": "inline text"
        })];
        let text = extract_text(&results, &no_fetch()).await.unwrap();
        assert_eq!(text, "inline text");
    }

    #[tokio::test]
    async fn test_direct_and_sentence_entries_accumulate() {
        let results = vec![
            json!({"text": "first"}),
            json!({"sentence": "second"}),
        ];
        let text = extract_text(&results, &no_fetch()).await.unwrap();
        assert_eq!(text, "first\nsecond");
    }

    #[tokio::test]
    async fn test_empty_results_yield_fallback_literal() {
        let text = extract_text(&[], &no_fetch()).await.unwrap();
        assert_eq!(text, "no text recognized");

        let results = vec![json!({"unrelated": true})];
        let text = extract_text(&results, &no_fetch()).await.unwrap();
        assert_eq!(text, "no text recognized");
    }

    #[tokio::test]
    async fn test_fallback_inspects_only_first_entry() {
        let results = vec![
            json!({"unrelated": true}),
            json!({"sentence": "second entry"}),
        ];
        // The accumulating pass picks up the second entry's sentence, so
        // this is not a fallback case at all.
        let text = extract_text(&results, &no_fetch()).await.unwrap();
        assert_eq!(text, "second entry");

        // But when nothing accumulated, only the first entry is probed.
        let results = vec![
            json!({"unrelated": true}),
            json!({"sentences": "never reached"}),
        ];
        let text = extract_text(&results, &no_fetch()).await.unwrap();
        assert_eq!(text, "no text recognized");
    }
}
