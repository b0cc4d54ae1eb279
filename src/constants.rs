//! Framework-wide constants: agent/state/status labels and the handful of
//! fixed regexes and tables the orchestration core relies on.

use regex::Regex;
use std::sync::LazyLock;

pub const BOOTSTRAP_AGENT_ID: &str = "admin_ai";
pub const CONSTITUTIONAL_GUARDIAN_AGENT_ID: &str = "constitutional_guardian_ai";

// --- Admin AI workflow states ---
pub const ADMIN_STATE_STARTUP: &str = "startup";
pub const ADMIN_STATE_CONVERSATION: &str = "admin_conversation";
pub const ADMIN_STATE_PLANNING: &str = "planning";
pub const ADMIN_STATE_WORK_DELEGATED: &str = "work_delegated";
pub const ADMIN_STATE_WORK: &str = "work";
pub const ADMIN_STATE_STANDBY: &str = "admin_standby";

// --- PM workflow states ---
pub const PM_STATE_STARTUP: &str = "pm_startup";
pub const PM_STATE_PLAN_DECOMPOSITION: &str = "pm_plan_decomposition";
pub const PM_STATE_BUILD_TEAM_TASKS: &str = "pm_build_team_tasks";
pub const PM_STATE_ACTIVATE_WORKERS: &str = "pm_activate_workers";
pub const PM_STATE_MANAGE: &str = "pm_manage";
pub const PM_STATE_STANDBY: &str = "pm_standby";
pub const PM_STATE_WORK: &str = "pm_work";

// --- Worker workflow states ---
pub const WORKER_STATE_STARTUP: &str = "worker_startup";
pub const WORKER_STATE_WORK: &str = "worker_work";
pub const WORKER_STATE_WAIT: &str = "worker_wait";

pub const DEFAULT_STATE: &str = "default";

/// Default retry policy; overridable via [`crate::settings::Settings`].
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY_SECONDS: f64 = 5.0;

/// HTTP status codes that the Provider Adapter retries internally.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[429, 500, 502, 503, 504];

/// HTTP status codes that indicate a key-related failure (rotate/quarantine).
pub const KEY_RELATED_STATUS_CODES: &[u16] = &[401, 403, 429];

/// Admin loop-detection thresholds.
pub const LOOP_FIRST_INTERVENTION_AT: u32 = 2;
pub const LOOP_SECOND_INTERVENTION_AT: u32 = 3;
pub const LOOP_FORCED_TRANSITION_AT: u32 = 5;
pub const WORK_CYCLE_LIMIT: u32 = 12;
pub const TOOL_REPETITION_THRESHOLD: usize = 3;

/// `<request_state state='NAME'/>`, self-closing optional, underscores allowed.
pub static REQUEST_STATE_TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<request_state\s+state=['"]([\w]+)['"]\s*/?>"#).expect("valid regex")
});

/// Extracts a parameter-size hint (e.g. `70b`, `8.3B`) from a model id, used
/// to break score ties in the performance tracker in favor of the
/// larger model.
pub static MODEL_SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-(\d+(?:\.\d+)?)b(?:[^a-z0-9]|$)").expect("valid regex")
});

/// Ollama options accepted by the local server; anything else is filtered out
/// of `provider_options` before a request is forwarded to Ollama.
pub const KNOWN_OLLAMA_OPTIONS: &[&str] = &[
    "mirostat",
    "mirostat_eta",
    "mirostat_tau",
    "num_ctx",
    "num_gpu",
    "num_thread",
    "num_keep",
    "seed",
    "num_predict",
    "repeat_last_n",
    "repeat_penalty",
    "temperature",
    "tfs_z",
    "top_k",
    "top_p",
    "min_p",
    "use_mmap",
    "use_mlock",
    "numa",
    "num_batch",
    "main_gpu",
    "low_vram",
    "f16_kv",
    "logits_all",
    "vocab_only",
    "stop",
    "presence_penalty",
    "frequency_penalty",
    "penalize_newline",
    "typical_p",
];

/// Local-provider model-id prefixes.
pub const LOCAL_PROVIDER_PREFIXES: &[&str] = &["ollama/", "litellm/"];

/// Static synonym table for tool-suggestion close-matching.
pub const TOOL_ACTION_SYNONYMS: &[(&str, &str)] = &[
    ("search", "search_knowledge"),
    ("save", "write"),
    ("make", "mkdir"),
    ("remove", "delete"),
    ("read", "get_info"),
    ("list", "list_tools"),
];
