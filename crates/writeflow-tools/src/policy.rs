// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use regex::Regex;
use writeflow_config::{AgentMode, ModePermissionPolicy, ToolsConfig};

/// Per-tool approval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Always run without asking
    Auto,
    /// Ask user before each invocation
    Ask,
    /// Never run; return an error
    Deny,
}

/// Policy engine that maps a tool call to an approval decision.
#[derive(Debug)]
pub struct ToolPolicy {
    auto_patterns: Vec<Regex>,
    deny_patterns: Vec<Regex>,
}

impl ToolPolicy {
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            auto_patterns: compile(&cfg.auto_approve_patterns),
            deny_patterns: compile(&cfg.deny_patterns),
        }
    }

    /// Decide whether a tool call (identified by its command string) should
    /// run automatically, prompt the user, or be denied.
    pub fn decide(&self, command: &str) -> ApprovalPolicy {
        for re in &self.deny_patterns {
            if re.is_match(command) {
                return ApprovalPolicy::Deny;
            }
        }
        for re in &self.auto_patterns {
            if re.is_match(command) {
                return ApprovalPolicy::Auto;
            }
        }
        ApprovalPolicy::Ask
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Mode-scoped permission gate keyed by tool *name* rather than command
/// string. This is the entry point the orchestrator consults before
/// dispatching a tool call: it looks up the current [`AgentMode`]'s
/// [`ModePermissionPolicy`] and matches the tool's name against the
/// `always_allow` / `always_deny` / `prompt` glob lists.
///
/// This is distinct from [`ToolPolicy`], which matches *command strings* and
/// is consulted specifically by `run_terminal_command` for shell-level
/// auto-approval. A tool can be subject to both gates: the permission gate
/// decides whether `run_terminal_command` may run at all in the current
/// mode, and `ToolPolicy` then decides whether the specific shell command it
/// was asked to run is auto-approved.
#[derive(Debug)]
pub struct PermissionGate {
    per_mode: HashMap<AgentMode, CompiledModePolicy>,
}

#[derive(Debug)]
struct CompiledModePolicy {
    always_allow: Vec<Regex>,
    always_deny: Vec<Regex>,
    prompt: Vec<Regex>,
}

impl PermissionGate {
    pub fn from_config(permissions: &HashMap<AgentMode, ModePermissionPolicy>) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        let per_mode = permissions
            .iter()
            .map(|(mode, policy)| {
                (
                    *mode,
                    CompiledModePolicy {
                        always_allow: compile(&policy.always_allow),
                        always_deny: compile(&policy.always_deny),
                        prompt: compile(&policy.prompt),
                    },
                )
            })
            .collect();
        Self { per_mode }
    }

    /// Decide whether `tool_name` may run while the agent is in `mode`.
    ///
    /// Precedence: `always_deny` beats `always_allow` beats `prompt`. A tool
    /// name matching none of a mode's lists defaults to [`ApprovalPolicy::Ask`],
    /// the same conservative default [`ToolPolicy`] uses for unmatched
    /// commands.
    pub fn check(&self, mode: AgentMode, tool_name: &str) -> ApprovalPolicy {
        let Some(policy) = self.per_mode.get(&mode) else {
            return ApprovalPolicy::Ask;
        };
        if policy.always_deny.iter().any(|re| re.is_match(tool_name)) {
            return ApprovalPolicy::Deny;
        }
        if policy.always_allow.iter().any(|re| re.is_match(tool_name)) {
            return ApprovalPolicy::Auto;
        }
        if policy.prompt.iter().any(|re| re.is_match(tool_name)) {
            return ApprovalPolicy::Ask;
        }
        ApprovalPolicy::Ask
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
