//! Argument parsing and result shaping shared by the search tools.

use harbor_core::error::ToolError;
use harbor_core::retrieval::SearchPassage;
use harbor_core::tool::{PassageView, ToolOutcome};

type Args = serde_json::Map<String, serde_json::Value>;

pub(crate) const DEFAULT_RESULTS: usize = 2;
pub(crate) const MAX_RESULTS: usize = 3;

/// The required, non-blank `query` argument.
pub(crate) fn query(args: &Args) -> Result<&str, ToolError> {
    args.get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))
}

/// `n_results` clamped to 1..=3; accepts integers, floats and numeric strings.
pub(crate) fn n_results(args: &Args) -> usize {
    let requested = match args.get("n_results") {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    };
    requested
        .map(|n| n.clamp(1, MAX_RESULTS as i64) as usize)
        .unwrap_or(DEFAULT_RESULTS)
}

/// Optional non-blank string argument.
pub(crate) fn optional_str<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Turn passages into the outcome the model sees. `kind` is "legal" or "manual".
pub(crate) fn shape(passages: Vec<SearchPassage>, kind: &str) -> ToolOutcome {
    if passages.is_empty() {
        return ToolOutcome::Found {
            message: "no results found".into(),
            results: Vec::new(),
        };
    }

    let message = format!("found {} {kind} passages", passages.len());
    let results = passages
        .into_iter()
        .map(|p| PassageView {
            content: p.content,
            source_file: p.source_identifier,
        })
        .collect();
    ToolOutcome::Found { message, results }
}
