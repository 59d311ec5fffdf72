use crate::error::PolicyResult;
use crate::models::{CpuArchitecture, CpuTopology};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

#[derive(Deserialize)]
struct SchemesRoot {
    schemes: Vec<SchemeConfig>,
}

#[derive(Deserialize)]
struct SchemeConfig {
    name: String,
    #[serde(rename = "match")]
    match_config: MatchConfig,
    architecture: CpuArchitecture,
    #[serde(default)]
    has_3d_cache: bool,
}

#[derive(Deserialize)]
struct MatchConfig {
    keywords: Vec<String>,
    total_threads: Option<usize>,
}

const PRESETS_JSON: &str = include_str!("../../assets/cpu_presets.json");

static PRESETS: Lazy<SchemesRoot> = Lazy::new(|| {
    serde_json::from_str(PRESETS_JSON).expect("Failed to parse embedded cpu_presets.json")
});

// Vendor decorations stripped from brand strings, applied in order.
static MODEL_NOISE: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\(R\)|\(TM\)", ""),
        (r"(?i)\s+CPU\s+", " "),
        (r"(?i)\d+-Core Processor", ""),
        (r"(?i)-?Core\s+Processor", " "),
        (r"(?i)\s+Processor(\s+|$)", " "),
        (r"@.*", ""),
        (r"\s+", " "),
    ]
    .into_iter()
    .filter_map(|(pattern, with)| Regex::new(pattern).ok().map(|re| (re, with)))
    .collect()
});

/// Strips trademarks, frequency suffixes and "N-Core Processor" from a brand string.
pub fn normalize_model(model: &str) -> String {
    MODEL_NOISE
        .iter()
        .fold(model.to_string(), |acc, (re, with)| {
            re.replace_all(&acc, *with).into_owned()
        })
        .trim()
        .to_string()
}

/// Looks the model up in the embedded table: every keyword must appear and the
/// thread count must match when the scheme pins one.
pub fn get_preset_for_model(model: &str, total_threads: usize) -> Option<(CpuArchitecture, bool)> {
    let model_lower = normalize_model(model).to_lowercase();
    let root = &*PRESETS;

    root.schemes
        .iter()
        .find(|scheme| {
            let threads_match = scheme
                .match_config
                .total_threads
                .is_none_or(|t| t == total_threads);

            let keywords_match = scheme
                .match_config
                .keywords
                .iter()
                .all(|kw| model_lower.contains(kw.to_lowercase().trim()));

            threads_match && keywords_match
        })
        .map(|scheme| {
            tracing::debug!("CPU '{}' matched preset '{}'", model, scheme.name);
            (scheme.architecture, scheme.has_3d_cache)
        })
}

// Unlisted parts: big Ryzen parts are assumed to be two CCDs.
fn guess_architecture(model_lower: &str, total_threads: usize) -> (CpuArchitecture, bool) {
    let is_amd = model_lower.contains("amd") || model_lower.contains("ryzen");
    let has_3d_cache = model_lower.contains("x3d");
    let architecture = if is_amd && total_threads >= 24 {
        CpuArchitecture::DualCcd
    } else {
        CpuArchitecture::Flat
    };
    (architecture, has_3d_cache)
}

/// Topology for a CPU brand string and logical core count.
pub fn topology_for_model(model: &str, logical_cores: usize) -> PolicyResult<CpuTopology> {
    let normalized = normalize_model(model);
    let (architecture, has_3d_cache) = get_preset_for_model(model, logical_cores)
        .unwrap_or_else(|| guess_architecture(&normalized.to_lowercase(), logical_cores));

    CpuTopology::build(normalized, logical_cores, architecture, has_3d_cache)
}
