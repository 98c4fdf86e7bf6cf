// Shared prompt fragments. Each stage keeps its own wording in
// `stages/prompts.rs`; only cross-cutting instructions live here.

use serde_json::Value;

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appends the JSON-only rule to a role description.
pub fn json_system(role: &str) -> String {
    format!("{role}\n\n{JSON_ONLY_SYSTEM}")
}

/// Compact JSON for embedding data in a prompt.
pub fn render_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}
