use writeflow_config::AgentMode;

/// A structured todo item managed by the todo_write tool.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    /// One of: "pending", "in_progress", "completed", "cancelled"
    pub status: String,
}

/// Events emitted by tools to communicate state changes back to the agent loop.
/// The agent translates these into `AgentEvent` variants for the UI.
#[derive(Debug)]
pub enum ToolEvent {
    TodoUpdate(Vec<TodoItem>),
    ModeChanged(AgentMode),
    /// Emitted by `exit_plan_mode` with the proposed plan text. The agent
    /// orchestrator's Plan-Mode Controller surfaces this to the user for
    /// `accept_and_execute` / `accept_plan_only` / `reject` confirmation.
    PlanProposed(String),
}
