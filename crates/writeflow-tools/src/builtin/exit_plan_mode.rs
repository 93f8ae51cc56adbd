// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use writeflow_config::AgentMode;

use crate::events::ToolEvent;
use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// The user's resolution of a proposed plan (§4.D's three `ExitPlanMode`
/// options).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanDecision {
    AcceptAndExecute,
    AcceptPlanOnly,
    Reject { feedback: String },
}

/// One append-only record per `exit_plan_mode` call, kept regardless of
/// outcome (§4.D: "Plan history is append-only").
#[derive(Debug, Clone)]
pub struct PlanHistoryEntry {
    pub plan: String,
    pub decision: PlanDecision,
}

/// Requests to leave Plan mode, carrying a proposed plan for the user to
/// confirm. This is the single tool the permission gate allows while Plan
/// mode is active (see the mode-scoped permission gate in `policy.rs`).
///
/// Unlike most tools, this one owns its own mode transition: on
/// `accept_and_execute` / `accept_plan_only` it flips `current_mode` back to
/// `Agent` directly on the shared mode lock (the same `Arc` given to
/// `SwitchModeTool`), so the very next loop round in the agent sees the new
/// mode without any additional wiring. On `reject`, the mode lock is left
/// untouched — Plan mode stays active and the model's next turn is seeded
/// with the rejection feedback via this tool's own result text.
pub struct ExitPlanModeTool {
    event_tx: mpsc::Sender<ToolEvent>,
    mode_lock: Arc<Mutex<AgentMode>>,
    history: Arc<Mutex<Vec<PlanHistoryEntry>>>,
    /// Force headless mode regardless of TTY detection. Used in tests and CI.
    force_headless: bool,
}

impl ExitPlanModeTool {
    pub fn new(event_tx: mpsc::Sender<ToolEvent>, mode_lock: Arc<Mutex<AgentMode>>) -> Self {
        Self {
            event_tx,
            mode_lock,
            history: Arc::new(Mutex::new(Vec::new())),
            force_headless: false,
        }
    }

    /// Create an instance that always behaves as headless (non-interactive).
    /// Use in tests and CI environments where stdin must not be read.
    pub fn new_headless(event_tx: mpsc::Sender<ToolEvent>, mode_lock: Arc<Mutex<AgentMode>>) -> Self {
        Self {
            event_tx,
            mode_lock,
            history: Arc::new(Mutex::new(Vec::new())),
            force_headless: true,
        }
    }

    /// The append-only record of every plan proposed so far, oldest first.
    pub async fn history(&self) -> Vec<PlanHistoryEntry> {
        self.history.lock().await.clone()
    }
}

#[async_trait]
impl Tool for ExitPlanModeTool {
    fn name(&self) -> &str { "exit_plan_mode" }

    fn description(&self) -> &str {
        "Use this tool when you are in plan mode and have finished presenting a plan and are \
         ready to implement it. This prompts the user to confirm the plan before code changes \
         begin.\n\n\
         IMPORTANT: Only use this tool when the task requires planning out the implementation \
         steps of a task that requires writing code. For research tasks where you're exploring \
         the codebase, searching for patterns, or gathering information, do NOT use this tool.\n\n\
         Example:\n\
         1. Initial task: \"Search for and understand the implementation of vim mode in the \
         codebase\" — do not use exit_plan_mode because you are not planning the \
         implementation steps of a task.\n\
         2. Initial task: \"Help me implement yank mode for vim\" — use exit_plan_mode after \
         you have finished planning the implementation steps of the task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": {
                    "type": "string",
                    "description": "The plan you came up with, to be pretty-printed as markdown"
                }
            },
            "required": ["plan"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy { ApprovalPolicy::Ask }

    fn modes(&self) -> &[AgentMode] { &[AgentMode::Plan] }

    fn is_read_only(&self) -> bool { true }

    fn validate_input(&self, call: &ToolCall) -> Result<(), String> {
        match call.args.get("plan").and_then(|v| v.as_str()) {
            Some(p) if !p.trim().is_empty() => Ok(()),
            _ => Err("missing or empty 'plan'".into()),
        }
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let plan = match call.args.get("plan").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "missing 'plan'"),
        };

        debug!(len = plan.len(), "exit_plan_mode tool invoked");
        let _ = self.event_tx.send(ToolEvent::PlanProposed(plan.clone())).await;

        let decision = if self.force_headless || !stdin_is_tty() {
            // No interactive user to confirm. The only way out of Plan is a
            // user-confirmed ExitPlanMode (§4.D) — silently accepting here
            // would mutate state nobody approved, so reject and let the
            // model retry or stop once it exhausts its round budget.
            PlanDecision::Reject {
                feedback: "no interactive session is available to confirm this plan; \
                           remaining in plan mode"
                    .to_string(),
            }
        } else {
            prompt_plan_decision(&plan).await
        };

        self.history.lock().await.push(PlanHistoryEntry {
            plan: plan.clone(),
            decision: decision.clone(),
        });

        match decision {
            PlanDecision::AcceptAndExecute => {
                *self.mode_lock.lock().await = AgentMode::Agent;
                let _ = self.event_tx.send(ToolEvent::ModeChanged(AgentMode::Agent)).await;
                ToolOutput::ok(
                    &call.id,
                    format!(
                        "Plan accepted by the user. Plan mode has ended — proceed to implement \
                         it now:\n\n{plan}"
                    ),
                )
            }
            PlanDecision::AcceptPlanOnly => {
                *self.mode_lock.lock().await = AgentMode::Agent;
                let _ = self.event_tx.send(ToolEvent::ModeChanged(AgentMode::Agent)).await;
                ToolOutput::ok(
                    &call.id,
                    "Plan accepted by the user (plan only). Plan mode has ended, but do not \
                     start implementing yet — wait for the user's next instruction."
                        .to_string(),
                )
            }
            PlanDecision::Reject { feedback } => ToolOutput::ok(
                &call.id,
                format!(
                    "Plan rejected by the user. Feedback: {feedback}\n\
                     You are still in plan mode. Revise the plan and call exit_plan_mode again \
                     when ready."
                ),
            ),
        }
    }
}

/// Returns true only when stdin is connected to an interactive terminal.
fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: isatty is async-signal-safe and only reads an fd number.
        unsafe { libc::isatty(std::io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

async fn read_stdin_line() -> String {
    use tokio::io::AsyncBufReadExt;
    let stdin = tokio::io::stdin();
    let mut reader = tokio::io::BufReader::new(stdin);
    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(_) => line.trim_end_matches('\n').trim_end_matches('\r').to_string(),
        Err(_) => String::new(),
    }
}

async fn prompt_plan_decision(plan: &str) -> PlanDecision {
    eprintln!();
    eprintln!("╔══ Plan proposed ═══════════════════════════════╗");
    for line in plan.lines() {
        eprintln!("  {line}");
    }
    eprintln!("╚══════════════════════════════════════════════════╝");
    eprintln!("  1. Accept and execute");
    eprintln!("  2. Accept plan only (stay idle until next instruction)");
    eprintln!("  3. Reject (provide feedback)");
    eprint!("  Choice [1/2/3]: ");

    match read_stdin_line().await.trim() {
        "2" => PlanDecision::AcceptPlanOnly,
        "3" => {
            eprint!("  Feedback: ");
            let feedback = read_stdin_line().await;
            let feedback = if feedback.trim().is_empty() {
                "no feedback given".to_string()
            } else {
                feedback
            };
            PlanDecision::Reject { feedback }
        }
        _ => PlanDecision::AcceptAndExecute,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn make_tool(mode: AgentMode) -> (ExitPlanModeTool, Arc<Mutex<AgentMode>>, mpsc::Receiver<ToolEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let mode_lock = Arc::new(Mutex::new(mode));
        (ExitPlanModeTool::new_headless(tx, mode_lock.clone()), mode_lock, rx)
    }

    fn call(plan: &str) -> ToolCall {
        ToolCall { id: "p1".into(), name: "exit_plan_mode".into(), args: json!({"plan": plan}) }
    }

    #[tokio::test]
    async fn emits_plan_proposed_event() {
        let (tool, _mode, mut rx) = make_tool(AgentMode::Plan);
        let out = tool.execute(&call("1. do x\n2. do y")).await;
        assert!(!out.is_error);
        let event = rx.try_recv().expect("should emit event");
        match event {
            ToolEvent::PlanProposed(text) => assert_eq!(text, "1. do x\n2. do y"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn headless_mode_rejects_without_blocking() {
        let (tool, mode, _rx) = make_tool(AgentMode::Plan);
        let out = tool.execute(&call("1. do x")).await;
        assert!(!out.is_error);
        assert!(out.content.contains("rejected"));
        assert_eq!(*mode.lock().await, AgentMode::Plan, "mode must stay Plan on reject");
    }

    #[tokio::test]
    async fn headless_reject_is_recorded_in_history() {
        let (tool, _mode, _rx) = make_tool(AgentMode::Plan);
        tool.execute(&call("1. do x")).await;
        let history = tool.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].plan, "1. do x");
        assert!(matches!(history[0].decision, PlanDecision::Reject { .. }));
    }

    #[tokio::test]
    async fn missing_plan_is_error() {
        let (tool, _mode, _rx) = make_tool(AgentMode::Plan);
        let call = ToolCall { id: "p2".into(), name: "exit_plan_mode".into(), args: json!({}) };
        let out = tool.execute(&call).await;
        assert!(out.is_error);
    }

    #[test]
    fn validate_input_rejects_blank_plan() {
        let (tool, _mode, _rx) = make_tool(AgentMode::Plan);
        let call = ToolCall { id: "p3".into(), name: "exit_plan_mode".into(), args: json!({"plan": "   "}) };
        assert!(tool.validate_input(&call).is_err());
    }

    #[test]
    fn validate_input_accepts_nonempty_plan() {
        let (tool, _mode, _rx) = make_tool(AgentMode::Plan);
        assert!(tool.validate_input(&call("do the thing")).is_ok());
    }

    #[test]
    fn only_available_in_plan_mode() {
        let (tool, _mode, _rx) = make_tool(AgentMode::Plan);
        assert_eq!(tool.modes(), &[AgentMode::Plan]);
    }

    #[test]
    fn is_read_only() {
        let (tool, _mode, _rx) = make_tool(AgentMode::Plan);
        assert!(tool.is_read_only());
    }
}
