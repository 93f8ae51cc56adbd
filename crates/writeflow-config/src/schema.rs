// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serde default helper — returns `true`.
///
/// Used for config fields that should be enabled unless the user explicitly
/// sets them to `false`.  `#[serde(default)]` on a `bool` always falls back
/// to `bool::default()` (i.e. `false`), so a named function is required.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    /// Named provider configurations.
    ///
    /// Define custom endpoints, local models, or additional accounts here and
    /// reference them by name with `--model <key>` or `--model <key>/<model>`.
    ///
    /// ```yaml
    /// providers:
    ///   my_ollama:
    ///     provider: openai        # uses the OpenAI-compatible wire format
    ///     base_url: http://localhost:11434/v1
    ///     name: llama3.2          # default model for this provider
    ///   work_anthropic:
    ///     provider: anthropic
    ///     api_key_env: WORK_ANTHROPIC_KEY
    ///     name: claude-opus-4-5
    /// ```
    #[serde(default)]
    pub providers: HashMap<String, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier. Common values: "openai" | "anthropic" | "google" |
    /// "ollama" | "mock". Concrete provider HTTP clients are treated as
    /// external collaborators (see [`crate::AgentConfig`] docs) — only the
    /// mock family ships a real implementation in this crate.
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime)
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override. Useful for local proxies or self-hosted gateways.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,

    // ── Prompt caching ────────────────────────────────────────────────────────
    /// Attach an explicit cache-control marker to the system message.
    ///
    /// **Anthropic**: adds `"cache_control": {"type": "ephemeral"}` to the
    /// system block, which tells the API to cache the prefix up to and
    /// including that block. Anthropic charges a one-time write fee and
    /// subsequent calls save ~90% on cached input tokens.
    ///
    /// **Other providers**: OpenAI and Google cache automatically; this flag
    /// has no effect for those providers.
    #[serde(default = "default_true")]
    pub cache_system_prompt: bool,

    /// Use the extended (1-hour) cache TTL instead of the default 5-minute
    /// window. Applies to the system prompt (when `cache_system_prompt = true`)
    /// and to tool definitions (when `cache_tools = true`). Only meaningful
    /// for the Anthropic provider.
    ///
    /// Conversation caching (`cache_conversation`) always uses the 5-minute
    /// TTL regardless of this setting, because conversation turns are
    /// typically frequent enough to keep the cache refreshed within 5 minutes.
    #[serde(default)]
    pub extended_cache_time: bool,

    /// Cache tool definitions using Anthropic prompt caching.
    ///
    /// Tool definitions are stable across requests within a session, making
    /// them ideal for caching. The last tool in the list receives a
    /// `cache_control` marker so Anthropic caches all tool definitions as a
    /// prefix. Uses the same TTL as `extended_cache_time` controls (1-hour
    /// when true, 5-minute otherwise).
    #[serde(default = "default_true")]
    pub cache_tools: bool,

    /// Enable automatic conversation caching (Anthropic only).
    ///
    /// Adds a top-level `cache_control` marker that instructs Anthropic to
    /// automatically cache conversation history up to the last message.
    /// Subsequent turns read prior context from cache at a fraction of the
    /// base token cost, reducing cost for multi-turn agent sessions.
    #[serde(default = "default_true")]
    pub cache_conversation: bool,

    /// Cache image content blocks in conversation history (Anthropic only).
    #[serde(default = "default_true")]
    pub cache_images: bool,

    /// Cache large tool results in conversation history (Anthropic only).
    ///
    /// A result is eligible when its serialised content exceeds 4 096
    /// characters (~1 024 tokens, the Anthropic minimum cacheable length for
    /// Sonnet-class models). The oldest eligible results are cached first;
    /// the count is bounded by the remaining breakpoint budget.
    #[serde(default = "default_true")]
    pub cache_tool_results: bool,

    // ── Provider-specific extras ──────────────────────────────────────────────
    /// Free-form provider-specific options forwarded as-is to the driver.
    #[serde(default)]
    pub driver_options: serde_json::Value,

    // ── Mock provider ─────────────────────────────────────────────────────────
    /// Path to YAML mock-responses file (used when provider = "mock").
    /// Can also be set via the WRITEFLOW_MOCK_RESPONSES environment variable.
    pub mock_responses_file: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            name: "gpt-4o".into(),
            // api_key_env is intentionally None here. resolve_api_key() falls
            // through to the driver registry, which already knows the canonical
            // env-var name for each provider. Hard-coding it here would shadow
            // the registry lookup and cause the wrong key to be sent whenever
            // the provider is overridden at the model-pointer level.
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: Some(4096),
            temperature: Some(0.2),
            cache_system_prompt: true,
            extended_cache_time: false,
            cache_tools: true,
            cache_conversation: true,
            cache_images: true,
            cache_tool_results: true,
            driver_options: serde_json::Value::Null,
            mock_responses_file: None,
        }
    }
}

fn default_agent_mode() -> AgentMode {
    AgentMode::Agent
}
fn default_max_rounds_per_turn() -> u32 {
    10
}
fn default_compaction_threshold() -> f32 {
    0.85
}
fn default_compaction_target_fraction() -> f32 {
    0.6
}
fn default_model_call_timeout_secs() -> u64 {
    180
}
fn default_compactor_timeout_secs() -> u64 {
    30
}

/// Strategy used when compacting the session context.
///
/// `Structured` (default) instructs the model to produce a typed Markdown
/// checkpoint with fixed sections (Active Task, Key Decisions, Files &
/// Artifacts, Constraints, Pending Items, Session Narrative). This produces
/// checkpoints that are easier for the model to navigate on future turns.
///
/// `Narrative` uses a free-form summarisation prompt and is available when a
/// simpler output is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompactionStrategy {
    #[default]
    Structured,
    Narrative,
}

impl std::fmt::Display for CompactionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactionStrategy::Structured => write!(f, "structured"),
            CompactionStrategy::Narrative => write!(f, "narrative"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default mode when none is specified on the CLI
    #[serde(default = "default_agent_mode")]
    pub default_mode: AgentMode,
    /// Maximum number of model rounds the orchestrator will run within a
    /// single user turn before aborting with a `max_rounds` error.
    #[serde(default = "default_max_rounds_per_turn")]
    pub max_rounds_per_turn: u32,
    /// Token fraction (α) of the usable input budget at which proactive
    /// compaction triggers. The budget gate compares calibrated session
    /// tokens against context_window minus max_output_tokens.
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f32,
    /// Target token fraction (β) the compactor aims for after a compaction
    /// pass completes. Compaction keeps summarising older turns until the
    /// session is at or below β × usable budget, or only the protected
    /// recent-turn tail remains.
    #[serde(default = "default_compaction_target_fraction")]
    pub compaction_target_fraction: f32,
    /// Number of most-recent turns preserved verbatim during compaction.
    /// These are never summarised regardless of how far over budget the
    /// session is.
    #[serde(default = "default_compaction_keep_recent")]
    pub compaction_keep_recent: usize,
    /// Compaction checkpoint format.
    #[serde(default)]
    pub compaction_strategy: CompactionStrategy,
    /// Maximum tokens allowed for a single tool result before it is
    /// deterministically truncated before entering the session.
    ///
    /// Truncation is category-aware: shell output keeps head+tail lines, grep
    /// keeps leading matches, read_file keeps head+tail lines. A value of 0
    /// disables per-result truncation entirely.
    #[serde(default = "default_tool_result_token_cap")]
    pub tool_result_token_cap: usize,
    /// Fraction of the context window reserved for tool schemas, the dynamic
    /// context block, and measurement error in the token approximation.
    #[serde(default = "default_compaction_overhead_reserve")]
    pub compaction_overhead_reserve: f32,
    /// System prompt override; leave None to use the built-in prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Wall-clock timeout in seconds for a single model round (default 180s).
    #[serde(default = "default_model_call_timeout_secs")]
    pub model_call_timeout_secs: u64,
    /// Wall-clock timeout in seconds for a single compaction call (default 30s).
    #[serde(default = "default_compactor_timeout_secs")]
    pub compactor_timeout_secs: u64,
}

fn default_compaction_keep_recent() -> usize {
    6
}
fn default_tool_result_token_cap() -> usize {
    4000
}
fn default_compaction_overhead_reserve() -> f32 {
    0.10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_mode: AgentMode::Agent,
            max_rounds_per_turn: default_max_rounds_per_turn(),
            compaction_threshold: default_compaction_threshold(),
            compaction_target_fraction: default_compaction_target_fraction(),
            compaction_keep_recent: default_compaction_keep_recent(),
            compaction_strategy: CompactionStrategy::Structured,
            tool_result_token_cap: default_tool_result_token_cap(),
            compaction_overhead_reserve: default_compaction_overhead_reserve(),
            system_prompt: None,
            model_call_timeout_secs: default_model_call_timeout_secs(),
            compactor_timeout_secs: default_compactor_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Pure research – read-only tools, no writes
    Research,
    /// Generate a structured plan, no code changes. Entered and exited via
    /// the Plan-Mode Controller, not chosen directly as `default_mode`.
    Plan,
    /// Full agent with read/write tools
    Agent,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Research => write!(f, "research"),
            AgentMode::Plan => write!(f, "plan"),
            AgentMode::Agent => write!(f, "agent"),
        }
    }
}

/// Tool-name-scoped permission sets for a single mode.
///
/// Names are tool names (e.g. `"write"`, `"run_terminal_command"`), not
/// command strings — `ToolsConfig::auto_approve_patterns` /
/// `deny_patterns` remain the command-string-level policy used by
/// `run_terminal_command` itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModePermissionPolicy {
    #[serde(default)]
    pub always_allow: Vec<String>,
    #[serde(default)]
    pub always_deny: Vec<String>,
    #[serde(default)]
    pub prompt: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Automatically approve shell commands matching these glob patterns
    pub auto_approve_patterns: Vec<String>,
    /// Block shell commands matching these glob patterns
    pub deny_patterns: Vec<String>,
    /// Default timeout in seconds for a single tool call (default 120s)
    #[serde(default = "default_tool_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Upper bound a caller may request via a per-call override (default 600s)
    #[serde(default = "default_tool_timeout_max_secs")]
    pub max_timeout_secs: u64,
    /// Use Docker sandbox for shell execution
    pub use_docker: bool,
    /// Docker image to use when use_docker is true
    pub docker_image: Option<String>,
    /// Per-mode tool-name permission policy, consulted by the Permission
    /// Gate after plan-mode and safe-mode restrictions are checked.
    #[serde(default)]
    pub permissions: HashMap<AgentMode, ModePermissionPolicy>,
}

fn default_tool_timeout_secs() -> u64 {
    120
}
fn default_tool_timeout_max_secs() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            auto_approve_patterns: vec![
                "cat *".into(),
                "ls *".into(),
                "find *".into(),
                "rg *".into(),
                "grep *".into(),
            ],
            deny_patterns: vec!["rm -rf /*".into(), "dd if=*".into()],
            default_timeout_secs: default_tool_timeout_secs(),
            max_timeout_secs: default_tool_timeout_max_secs(),
            use_docker: false,
            docker_image: None,
            permissions: HashMap::new(),
        }
    }
}

fn default_queue_capacity() -> usize {
    10_000
}
fn default_queue_high_water() -> usize {
    8_000
}

/// Message Queue sizing. `high_water` is the threshold at which the queue
/// migrates to its secondary (overflow) buffer and starts applying
/// back-pressure to non-priority producers; `capacity` is the hard ceiling
/// beyond which enqueue fails outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default = "default_queue_high_water")]
    pub high_water: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            high_water: default_queue_high_water(),
        }
    }
}

fn default_worker_pool_size() -> usize {
    10
}
fn default_cancellation_grace_secs() -> u64 {
    5
}

/// Tool Dispatcher sizing and cancellation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Bounded worker pool size (default 10 concurrent tool calls).
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Grace period after a cooperative cancellation signal before the
    /// dispatcher forces the call's task to abort (default 5s).
    #[serde(default = "default_cancellation_grace_secs")]
    pub cancellation_grace_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            cancellation_grace_secs: default_cancellation_grace_secs(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ─────────────────────────────────────────────────────────────

    #[test]
    fn config_default_model_provider_is_openai() {
        let c = Config::default();
        assert_eq!(c.model.provider, "openai");
    }

    #[test]
    fn config_default_model_name_is_gpt4o() {
        let c = Config::default();
        assert_eq!(c.model.name, "gpt-4o");
    }

    #[test]
    fn config_default_api_key_env_is_none() {
        let c = Config::default();
        assert!(c.model.api_key_env.is_none());
    }

    #[test]
    fn config_default_no_explicit_api_key() {
        let c = Config::default();
        assert!(c.model.api_key.is_none());
    }

    #[test]
    fn config_default_agent_mode_is_agent() {
        let c = Config::default();
        assert_eq!(c.agent.default_mode, AgentMode::Agent);
    }

    #[test]
    fn config_default_max_rounds_per_turn_is_ten() {
        let c = Config::default();
        assert_eq!(c.agent.max_rounds_per_turn, 10);
    }

    #[test]
    fn config_default_compaction_threshold_in_range() {
        let c = Config::default();
        assert!(c.agent.compaction_threshold > 0.0);
        assert!(c.agent.compaction_threshold < 1.0);
    }

    #[test]
    fn config_default_compaction_threshold_is_eighty_five_percent() {
        let c = Config::default();
        assert!((c.agent.compaction_threshold - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn config_default_compaction_target_fraction_is_sixty_percent() {
        let c = Config::default();
        assert!((c.agent.compaction_target_fraction - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn config_default_compaction_keep_recent_is_six() {
        let c = Config::default();
        assert_eq!(c.agent.compaction_keep_recent, 6);
    }

    #[test]
    fn config_compaction_keep_recent_yaml_round_trip() {
        let yaml_str = "agent:\n  compaction_keep_recent: 10\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.agent.compaction_keep_recent, 10);
        let back_yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&back_yaml).unwrap();
        assert_eq!(back.agent.compaction_keep_recent, 10);
    }

    #[test]
    fn config_compaction_keep_recent_defaults_when_absent_from_yaml() {
        let yaml_str =
            "agent:\n  max_rounds_per_turn: 30\n  default_mode: agent\n  compaction_threshold: 0.9\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(
            c.agent.compaction_keep_recent, 6,
            "serde default must fill in missing field"
        );
    }

    #[test]
    fn config_default_no_system_prompt_override() {
        let c = Config::default();
        assert!(c.agent.system_prompt.is_none());
    }

    #[test]
    fn config_default_model_call_timeout_is_180s() {
        let c = Config::default();
        assert_eq!(c.agent.model_call_timeout_secs, 180);
    }

    #[test]
    fn config_default_compactor_timeout_is_30s() {
        let c = Config::default();
        assert_eq!(c.agent.compactor_timeout_secs, 30);
    }

    #[test]
    fn config_default_tools_has_auto_approve_patterns() {
        let c = Config::default();
        assert!(!c.tools.auto_approve_patterns.is_empty());
    }

    #[test]
    fn config_default_docker_disabled() {
        let c = Config::default();
        assert!(!c.tools.use_docker);
    }

    #[test]
    fn config_default_tool_timeout_is_120s() {
        let c = Config::default();
        assert_eq!(c.tools.default_timeout_secs, 120);
    }

    #[test]
    fn config_default_tool_timeout_max_is_600s() {
        let c = Config::default();
        assert_eq!(c.tools.max_timeout_secs, 600);
    }

    #[test]
    fn config_default_permissions_map_is_empty() {
        let c = Config::default();
        assert!(c.tools.permissions.is_empty());
    }

    #[test]
    fn config_permissions_deserialised_from_yaml_keyed_by_mode() {
        let yaml = r#"
tools:
  permissions:
    plan:
      always_deny: ["write", "edit_file", "run_terminal_command"]
      prompt: ["delete_file"]
    agent:
      always_allow: ["read_file", "grep"]
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        let plan = c.tools.permissions.get(&AgentMode::Plan).unwrap();
        assert_eq!(plan.always_deny, vec!["write", "edit_file", "run_terminal_command"]);
        let agent = c.tools.permissions.get(&AgentMode::Agent).unwrap();
        assert_eq!(agent.always_allow, vec!["read_file", "grep"]);
    }

    // ── Queue / Dispatcher ────────────────────────────────────────────────────

    #[test]
    fn config_default_queue_capacity_is_ten_thousand() {
        let c = Config::default();
        assert_eq!(c.queue.capacity, 10_000);
    }

    #[test]
    fn config_default_queue_high_water_is_eight_thousand() {
        let c = Config::default();
        assert_eq!(c.queue.high_water, 8_000);
    }

    #[test]
    fn config_queue_high_water_below_capacity() {
        let c = Config::default();
        assert!(c.queue.high_water < c.queue.capacity);
    }

    #[test]
    fn config_default_worker_pool_size_is_ten() {
        let c = Config::default();
        assert_eq!(c.dispatcher.worker_pool_size, 10);
    }

    #[test]
    fn config_default_cancellation_grace_is_five_secs() {
        let c = Config::default();
        assert_eq!(c.dispatcher.cancellation_grace_secs, 5);
    }

    // ── AgentMode ─────────────────────────────────────────────────────────────

    #[test]
    fn agent_mode_display_research() {
        assert_eq!(AgentMode::Research.to_string(), "research");
    }

    #[test]
    fn agent_mode_display_plan() {
        assert_eq!(AgentMode::Plan.to_string(), "plan");
    }

    #[test]
    fn agent_mode_display_agent() {
        assert_eq!(AgentMode::Agent.to_string(), "agent");
    }

    #[test]
    fn agent_mode_equality() {
        assert_eq!(AgentMode::Agent, AgentMode::Agent);
        assert_ne!(AgentMode::Research, AgentMode::Plan);
    }

    // ── Prompt caching defaults ───────────────────────────────────────────────

    #[test]
    fn config_default_caching_enabled_except_extended_ttl() {
        let c = Config::default();
        assert!(c.model.cache_system_prompt, "cache_system_prompt must default to true");
        assert!(c.model.cache_tools, "cache_tools must default to true");
        assert!(c.model.cache_conversation, "cache_conversation must default to true");
        assert!(c.model.cache_images, "cache_images must default to true");
        assert!(c.model.cache_tool_results, "cache_tool_results must default to true");
        assert!(!c.model.extended_cache_time, "extended_cache_time must remain false by default");
    }

    #[test]
    fn config_cache_flags_can_be_disabled_via_yaml() {
        let yaml_str = "model:\n  provider: anthropic\n  name: claude-sonnet-4-5\n  \
                        cache_system_prompt: false\n  cache_tools: false\n  \
                        cache_conversation: false\n  cache_images: false\n  \
                        cache_tool_results: false\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert!(!c.model.cache_system_prompt);
        assert!(!c.model.cache_tools);
        assert!(!c.model.cache_conversation);
        assert!(!c.model.cache_images);
        assert!(!c.model.cache_tool_results);
    }

    #[test]
    fn config_extended_cache_time_can_be_enabled_via_yaml() {
        let yaml_str = "model:\n  provider: anthropic\n  name: claude-sonnet-4-5\n  \
                        extended_cache_time: true\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert!(c.model.extended_cache_time);
    }

    #[test]
    fn config_cache_flags_omitted_yaml_uses_defaults() {
        let yaml_str = "model:\n  provider: anthropic\n  name: claude-sonnet-4-5\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert!(c.model.cache_system_prompt, "cache_system_prompt must default to true");
        assert!(c.model.cache_tools, "cache_tools must default to true");
        assert!(c.model.cache_conversation, "cache_conversation must default to true");
        assert!(!c.model.extended_cache_time, "extended_cache_time must default to false");
        assert!(c.model.cache_images, "cache_images must default to true");
        assert!(c.model.cache_tool_results, "cache_tool_results must default to true");
    }

    #[test]
    fn config_cache_flags_round_trip_yaml() {
        let mut c = Config::default();
        c.model.provider = "anthropic".into();
        c.model.cache_tools = false;
        c.model.cache_conversation = false;
        c.model.cache_images = false;
        c.model.cache_tool_results = false;
        c.model.extended_cache_time = true;
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert!(!back.model.cache_tools);
        assert!(!back.model.cache_conversation);
        assert!(!back.model.cache_images);
        assert!(!back.model.cache_tool_results);
        assert!(back.model.extended_cache_time);
    }

    // ── YAML round-trip ───────────────────────────────────────────────────────

    #[test]
    fn config_serialises_to_valid_yaml() {
        let c = Config::default();
        let yaml_str = serde_yaml::to_string(&c).unwrap();
        assert!(yaml_str.contains("provider"));
        assert!(yaml_str.contains("openai"));
    }

    #[test]
    fn config_deserialises_from_yaml() {
        let yaml_str =
            "model:\n  provider: anthropic\n  name: claude-opus-4-5\n  max_tokens: 8192\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.model.provider, "anthropic");
        assert_eq!(c.model.name, "claude-opus-4-5");
        assert_eq!(c.model.max_tokens, Some(8192));
    }

    #[test]
    fn config_partial_yaml_fills_in_defaults() {
        let yaml_str = "model:\n  name: gpt-4o-mini\n  provider: openai\n";
        let c: Config = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(c.model.name, "gpt-4o-mini");
        assert_eq!(
            c.agent.max_rounds_per_turn,
            AgentConfig::default().max_rounds_per_turn
        );
    }

    #[test]
    fn agent_mode_yaml_serde_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
        struct Wrap {
            mode: AgentMode,
        }
        let w = Wrap {
            mode: AgentMode::Plan,
        };
        let s = serde_yaml::to_string(&w).unwrap();
        let back: Wrap = serde_yaml::from_str(&s).unwrap();
        assert_eq!(back.mode, AgentMode::Plan);
    }

    // ── providers map ─────────────────────────────────────────────────────────

    #[test]
    fn config_default_providers_is_empty() {
        let c = Config::default();
        assert!(c.providers.is_empty(), "providers must be empty by default");
    }

    #[test]
    fn config_providers_deserialised_from_yaml() {
        let yaml = r#"
providers:
  my_ollama:
    provider: openai
    base_url: http://localhost:11434/v1
    name: llama3.2
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(c.providers.len(), 1);
        let p = c.providers.get("my_ollama").unwrap();
        assert_eq!(p.provider, "openai");
        assert_eq!(p.base_url.as_deref(), Some("http://localhost:11434/v1"));
        assert_eq!(p.name, "llama3.2");
    }

    #[test]
    fn config_providers_round_trip_yaml() {
        let yaml = r#"
providers:
  local:
    provider: openai
    base_url: http://127.0.0.1:8080/v1
    name: phi-3
"#;
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        let serialised = serde_yaml::to_string(&c).unwrap();
        let back: Config = serde_yaml::from_str(&serialised).unwrap();
        let p = back.providers.get("local").unwrap();
        assert_eq!(p.name, "phi-3");
        assert_eq!(p.base_url.as_deref(), Some("http://127.0.0.1:8080/v1"));
    }

    #[test]
    fn config_providers_absent_in_yaml_uses_empty_default() {
        let yaml = "model:\n  provider: openai\n  name: gpt-4o\n";
        let c: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(c.providers.is_empty());
    }
}
