// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use writeflow_config::AgentMode;
use writeflow_tools::{events::TodoItem, ToolCall};

/// The user's resolution of a `prompt` verdict from the permission gate
/// (§4.C's "Prompt path"). Mirrors the four options the orchestrator is
/// expected to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    AllowOnce,
    AllowSession,
    AllowAlways,
    Deny,
}

/// One-shot resume handle for a pending `AgentEvent::PermissionRequested`.
///
/// Wrapped in `Arc<Mutex<Option<..>>>` rather than a bare
/// `oneshot::Sender` so that `AgentEvent` itself can stay `Clone`; only the
/// first `resolve` call has any effect, later ones are no-ops.
#[derive(Clone)]
pub struct PermissionResume(Arc<Mutex<Option<oneshot::Sender<PermissionDecision>>>>);

impl PermissionResume {
    pub(crate) fn new(tx: oneshot::Sender<PermissionDecision>) -> Self {
        Self(Arc::new(Mutex::new(Some(tx))))
    }

    /// Resolve the pending request. A second call (or a call after the
    /// agent loop already gave up waiting) is silently ignored.
    pub async fn resolve(&self, decision: PermissionDecision) {
        if let Some(tx) = self.0.lock().await.take() {
            let _ = tx.send(decision);
        }
    }
}

impl std::fmt::Debug for PermissionResume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PermissionResume(..)")
    }
}

/// Events emitted by the agent during a single turn.
/// Consumers (CI runner, TUI) subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A text chunk streamed from the model
    TextDelta(String),
    /// A complete text response from the model (after streaming finishes)
    TextComplete(String),
    /// A thinking/reasoning chunk from the model (extended thinking API).
    /// Consumers should accumulate deltas and finalise them into a Thinking
    /// segment when the model signals the end of the reasoning block.
    ThinkingDelta(String),
    /// A complete thinking/reasoning block (accumulated from ThinkingDelta events).
    ThinkingComplete(String),
    /// The model has requested a tool call
    ToolCallStarted(ToolCall),
    /// A tool call finished
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// Context was compacted; statistics for the UI
    ContextCompacted {
        tokens_before: usize,
        tokens_after: usize,
        strategy: CompactionStrategyUsed,
        turn: u32,
    },
    /// Current token usage update
    TokenUsage {
        input: u32,
        output: u32,
        /// Tokens served from the provider's prompt cache this turn.
        cache_read: u32,
        /// Tokens written into the provider's prompt cache this turn.
        cache_write: u32,
        /// Cumulative prompt-cache tokens read/written so far this session.
        cache_read_total: u32,
        cache_write_total: u32,
        /// Session's current context window ceiling.
        max_tokens: usize,
    },
    /// The agent has finished processing the current user turn
    TurnComplete,
    /// The in-flight turn was cancelled. `partial_text` holds whatever
    /// assistant text had already streamed (empty if cancelled before any
    /// model output arrived); it has already been committed to the session.
    Aborted { partial_text: String },
    /// A recoverable error occurred
    Error(String),
    /// The todo list was updated
    TodoUpdate(Vec<TodoItem>),
    /// The agent mode was changed
    ModeChanged(AgentMode),
    /// The agent is asking the user a question (id links to QuestionAnswer)
    Question { id: String, questions: Vec<String> },
    /// Answer to a previous Question event
    QuestionAnswer { id: String, answer: String },
    /// The agent proposed a plan via `exit_plan_mode`. By the time this event
    /// is observed, the tool has already collected the user's accept/reject
    /// decision (accept-and-execute, accept-plan-only, or reject) and, on
    /// acceptance, switched `current_mode` to `Agent` itself — this event is
    /// purely informational, for transcripts and the TUI.
    PlanProposed(String),
    /// The permission gate returned `prompt` for this tool call (§4.C's
    /// "Prompt path"). Dispatch of the call is suspended until `resume` is
    /// resolved; the call never executes on `Deny`.
    PermissionRequested {
        call_id: String,
        tool_name: String,
        reason: String,
        resume: PermissionResume,
    },
}

/// Which compaction strategy actually ran for a given `ContextCompacted` event.
/// Distinct from [`writeflow_config::CompactionStrategy`] (the configured
/// preference) because the emergency fallback can run regardless of config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStrategyUsed {
    /// Deterministic drop-oldest fallback; no model call was made.
    Emergency,
    /// Free-form narrative summary produced by the model.
    Narrative,
    /// Structured Markdown checkpoint produced by the model.
    Structured,
}
