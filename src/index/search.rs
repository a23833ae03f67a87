//! Query-time ranking and result rendering.
//!
//! Scoring is a brute-force cosine scan over every record, which is fine up
//! to several thousand tools. Rendering produces text an LLM caller can act
//! on directly: each hit carries a ready-to-paste JSON-RPC envelope for the
//! `call_external_tool` meta-tool.

use serde::Serialize;
use serde_json::{json, Value};

use super::ToolVectorRecord;
use toolgate_mcp::Parameter;

/// One search hit, shaped for both text rendering and JSON responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub server_name: String,
    pub tool_name: String,
    pub description: String,
    pub score: f32,
    pub parameters: Vec<Parameter>,
}

impl SearchResult {
    pub fn from_record(record: &ToolVectorRecord, score: f32) -> Self {
        let parameters: Vec<Parameter> =
            serde_json::from_str(&record.parameters_json).unwrap_or_default();
        Self {
            server_name: record.server_name.clone(),
            tool_name: record.tool_name.clone(),
            description: record.description.clone(),
            score,
            parameters,
        }
    }
}

/// Cosine similarity clamped to `[0, 1]`. Zero-magnitude vectors score 0.
/// Callers must have verified equal lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// Score every record against the query vector, keep those at or above
/// `min_score`, sort by score descending (id ascending on ties for
/// determinism), and truncate to `max_results`.
pub fn rank_records<'a>(
    records: impl Iterator<Item = &'a ToolVectorRecord>,
    query: &[f32],
    max_results: usize,
    min_score: f32,
) -> Vec<(&'a ToolVectorRecord, f32)> {
    let mut scored: Vec<(&ToolVectorRecord, f32)> = records
        .map(|record| (record, cosine_similarity(query, &record.embedding)))
        .filter(|(_, score)| *score >= min_score)
        .collect();

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(max_results);
    scored
}

/// Placeholder value for a parameter, derived from its JSON-schema type.
/// Strings get a snake_cased hint so the caller knows what to fill in.
pub fn placeholder_value(parameter: &Parameter) -> Value {
    match parameter.type_name.as_str() {
        "int" | "integer" => json!(0),
        "number" | "float" | "double" => json!(0.0),
        "bool" | "boolean" => json!(false),
        "array" | "list" => json!([]),
        "object" | "map" | "dict" => json!({}),
        _ => {
            let hint = if parameter.description.trim().is_empty() {
                snake_case(&parameter.name)
            } else {
                snake_case(&parameter.description)
            };
            json!(format!("<{}>", hint))
        }
    }
}

fn snake_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_separator = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            out.push('_');
            last_was_separator = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// The copy-paste-ready JSON-RPC envelope for invoking a hit through
/// `call_external_tool`.
pub fn invocation_envelope(result: &SearchResult) -> Value {
    let mut parameters = serde_json::Map::new();
    for parameter in &result.parameters {
        parameters.insert(parameter.name.clone(), placeholder_value(parameter));
    }
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {
            "name": "call_external_tool",
            "arguments": {
                "serverName": result.server_name,
                "toolName": result.tool_name,
                "parameters": parameters,
            }
        }
    })
}

/// Render ranked hits as text blocks separated by blank lines.
pub fn render_results(results: &[SearchResult]) -> String {
    let blocks: Vec<String> = results
        .iter()
        .map(|result| {
            let mut block = format!(
                "{}.{} (score: {:.3})\n",
                result.server_name, result.tool_name, result.score
            );
            if !result.description.is_empty() {
                block.push_str(&result.description);
                block.push('\n');
            }
            if !result.parameters.is_empty() {
                block.push_str("Parameters:\n");
                for parameter in &result.parameters {
                    let requirement = if parameter.required { "required" } else { "optional" };
                    block.push_str(&format!(
                        "  - {} ({}) ({})",
                        parameter.name, parameter.type_name, requirement
                    ));
                    if !parameter.description.is_empty() {
                        block.push_str(&format!(": {}", parameter.description));
                    }
                    block.push('\n');
                }
            }
            block.push_str("Invocation:\n");
            let envelope = invocation_envelope(result);
            block.push_str(
                &serde_json::to_string_pretty(&envelope)
                    .unwrap_or_else(|_| envelope.to_string()),
            );
            block
        })
        .collect();

    blocks.join("\n\n")
}

/// Explanatory text for a query with no qualifying hits.
pub fn render_no_results(query: &str, min_score: f32) -> String {
    format!(
        "No tools found for query '{}' with relevance score >= {:.2}. \
Try lowering minRelevanceScore, rephrasing the query, or running refresh_tool_index.",
        query, min_score
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> ToolVectorRecord {
        let (server_name, tool_name) = id.split_once('.').unwrap();
        ToolVectorRecord {
            id: id.to_string(),
            server_name: server_name.to_string(),
            tool_name: tool_name.to_string(),
            description: String::new(),
            parameters_json: "[]".to_string(),
            parameter_count: 0,
            parameter_names: vec![],
            search_phrase: String::new(),
            embedding,
            last_updated: Utc::now(),
        }
    }

    fn parameter(name: &str, type_name: &str, description: &str, required: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            type_name: type_name.to_string(),
            description: description.to_string(),
            required,
        }
    }

    fn hit(server: &str, tool: &str, score: f32, parameters: Vec<Parameter>) -> SearchResult {
        SearchResult {
            server_name: server.to_string(),
            tool_name: tool.to_string(),
            description: String::new(),
            score,
            parameters,
        }
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_negative_clamped() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_by_score_descending() {
        let records = vec![
            record("a.far", vec![0.0, 1.0]),
            record("a.near", vec![1.0, 0.05]),
            record("b.mid", vec![1.0, 1.0]),
        ];
        let ranked = rank_records(records.iter(), &[1.0, 0.0], 10, 0.0);
        let ids: Vec<&str> = ranked.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.near", "b.mid", "a.far"]);
    }

    #[test]
    fn test_rank_ties_break_by_id() {
        let records = vec![
            record("b.tool", vec![1.0, 0.0]),
            record("a.tool", vec![1.0, 0.0]),
        ];
        let ranked = rank_records(records.iter(), &[1.0, 0.0], 10, 0.0);
        let ids: Vec<&str> = ranked.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.tool", "b.tool"]);
    }

    #[test]
    fn test_rank_applies_threshold_and_limit() {
        let records = vec![
            record("a.t1", vec![1.0, 0.0]),
            record("a.t2", vec![0.9, 0.1]),
            record("a.t3", vec![0.0, 1.0]),
        ];
        let ranked = rank_records(records.iter(), &[1.0, 0.0], 1, 0.5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.id, "a.t1");

        let none = rank_records(records.iter(), &[1.0, 0.0], 0, 0.0);
        assert!(none.is_empty());
    }

    #[test]
    fn test_min_score_one_keeps_exact_match_only() {
        let records = vec![
            record("a.exact", vec![2.0, 0.0]),
            record("a.close", vec![1.0, 0.01]),
        ];
        let ranked = rank_records(records.iter(), &[1.0, 0.0], 10, 1.0);
        let ids: Vec<&str> = ranked.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.exact"]);
    }

    #[test]
    fn test_result_from_record_parses_parameters() {
        let mut r = record("a.t1", vec![1.0]);
        r.description = "does things".to_string();
        r.parameters_json =
            serde_json::to_string(&vec![parameter("x", "integer", "", true)]).unwrap();
        let result = SearchResult::from_record(&r, 0.9);
        assert_eq!(result.server_name, "a");
        assert_eq!(result.tool_name, "t1");
        assert_eq!(result.description, "does things");
        assert_eq!(result.parameters.len(), 1);
        assert_eq!(result.parameters[0].name, "x");
    }

    #[test]
    fn test_placeholders_by_type() {
        assert_eq!(placeholder_value(&parameter("n", "integer", "", true)), json!(0));
        assert_eq!(placeholder_value(&parameter("n", "int", "", true)), json!(0));
        assert_eq!(placeholder_value(&parameter("x", "number", "", true)), json!(0.0));
        assert_eq!(placeholder_value(&parameter("x", "double", "", true)), json!(0.0));
        assert_eq!(placeholder_value(&parameter("b", "boolean", "", true)), json!(false));
        assert_eq!(placeholder_value(&parameter("a", "array", "", true)), json!([]));
        assert_eq!(placeholder_value(&parameter("o", "object", "", true)), json!({}));
    }

    #[test]
    fn test_string_placeholder_uses_snaked_description() {
        let value = placeholder_value(&parameter("path", "string", "The File Path", true));
        assert_eq!(value, json!("<the_file_path>"));
    }

    #[test]
    fn test_string_placeholder_falls_back_to_name() {
        let value = placeholder_value(&parameter("filePath", "string", "  ", true));
        assert_eq!(value, json!("<filepath>"));
    }

    #[test]
    fn test_unknown_type_treated_as_string() {
        let value = placeholder_value(&parameter("q", "uuid", "Record id", true));
        assert_eq!(value, json!("<record_id>"));
    }

    #[test]
    fn test_envelope_shape() {
        let result = hit("A", "t1", 0.9, vec![parameter("x", "integer", "", true)]);
        let envelope = invocation_envelope(&result);
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["method"], "tools/call");
        assert_eq!(envelope["params"]["name"], "call_external_tool");
        assert_eq!(envelope["params"]["arguments"]["serverName"], "A");
        assert_eq!(envelope["params"]["arguments"]["toolName"], "t1");
        assert_eq!(envelope["params"]["arguments"]["parameters"]["x"], 0);
    }

    #[test]
    fn test_render_results_blocks() {
        let mut first = hit(
            "Serena",
            "write_memory",
            0.8734,
            vec![
                parameter("name", "string", "Memory name", true),
                parameter("tags", "array", "", false),
            ],
        );
        first.description = "Save a note".to_string();
        let second = hit("Other", "t2", 0.6, vec![]);
        let rendered = render_results(&[first, second]);

        assert!(rendered.contains("Serena.write_memory (score: 0.873)"));
        assert!(rendered.contains("Save a note"));
        assert!(rendered.contains("- name (string) (required): Memory name"));
        assert!(rendered.contains("- tags (array) (optional)"));
        assert!(rendered.contains("\"serverName\": \"Serena\""));
        assert!(rendered.contains("\n\nOther.t2 (score: 0.600)"));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = hit("A", "t1", 0.5, vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("serverName").is_some());
        assert!(json.get("toolName").is_some());
        assert!(json.get("parameters").is_some());
    }

    #[test]
    fn test_no_results_message_names_threshold() {
        let message = render_no_results("save a memory", 0.55);
        assert!(message.starts_with("No tools found"));
        assert!(message.contains("save a memory"));
        assert!(message.contains("0.55"));
    }
}
