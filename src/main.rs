// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use clap::Parser;
use cli::{Cli, Commands, OutputFormatArg};
use tokio::sync::{mpsc, Mutex};
use writeflow_core::{Agent, AgentEvent, AgentRuntimeContext, PermissionDecision};
use writeflow_model::catalog::ModelCatalogEntry;
use writeflow_tools::{
    AskQuestionTool, DeleteFileTool, EditFileTool, ExitPlanModeTool, GlobFileSearchTool, GrepTool,
    ListDirTool, ReadFileTool, RunTerminalCommandTool, SwitchModeTool, TodoItem, TodoWriteTool,
    ToolEvent, ToolRegistry, WriteTool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(cmd) = &cli.command {
        return match cmd {
            Commands::Completions { shell } => {
                cli::print_completions(*shell);
                Ok(())
            }
            Commands::ShowConfig => {
                let config = writeflow_config::load(cli.config.as_deref())?;
                println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
                Ok(())
            }
            Commands::ListModels { provider, json } => {
                let config = writeflow_config::load(cli.config.as_deref())?;
                list_models_cmd(&config, provider.as_deref(), *json)
            }
            Commands::ListProviders { verbose, json } => list_providers_cmd(*verbose, *json),
        };
    }

    let config = Arc::new(writeflow_config::load(cli.config.as_deref())?);
    run(cli, config).await
}

/// Build an [`Agent`] wired with every built-in tool and the model the
/// config (or a `--model` override) resolves to.
async fn build_agent(
    cli: &Cli,
    config: &Arc<writeflow_config::Config>,
) -> anyhow::Result<Agent> {
    let model_cfg = match &cli.model {
        Some(m) => writeflow_model::resolve_model_from_config(config, m),
        None => config.model.clone(),
    };
    let model: Arc<dyn writeflow_model::ModelProvider> =
        Arc::from(writeflow_model::from_config(&model_cfg)?);
    let max_ctx = model.catalog_context_window().unwrap_or(128_000) as usize;

    let mode = Arc::new(Mutex::new(cli.mode));
    let (tool_tx, tool_rx) = mpsc::channel::<ToolEvent>(64);
    let todos: Arc<Mutex<Vec<TodoItem>>> = Arc::new(Mutex::new(Vec::new()));

    let mut registry = ToolRegistry::new();
    registry.register(RunTerminalCommandTool::default());
    registry.register(ReadFileTool);
    registry.register(WriteTool);
    registry.register(EditFileTool);
    registry.register(GlobFileSearchTool);
    registry.register(GrepTool);
    registry.register(ListDirTool);
    registry.register(DeleteFileTool);
    registry.register(if cli.is_headless() {
        AskQuestionTool::new_headless()
    } else {
        AskQuestionTool::new()
    });
    registry.register(if cli.is_headless() {
        ExitPlanModeTool::new_headless(tool_tx.clone(), mode.clone())
    } else {
        ExitPlanModeTool::new(tool_tx.clone(), mode.clone())
    });
    registry.register(TodoWriteTool::new(todos, tool_tx.clone()));
    registry.register(SwitchModeTool::new(mode.clone(), tool_tx));

    let runtime = AgentRuntimeContext {
        project_root: find_project_root(),
        system_prompt_override: read_system_prompt_file(cli)?,
        append_system_prompt: cli.append_system_prompt.clone(),
        ..AgentRuntimeContext::default()
    };

    Ok(Agent::with_permissions(
        model,
        Arc::new(registry),
        Arc::new(config.agent.clone()),
        config.tools.permissions.clone(),
        runtime,
        mode,
        tool_rx,
        max_ctx,
    ))
}

fn read_system_prompt_file(cli: &Cli) -> anyhow::Result<Option<String>> {
    match &cli.system_prompt_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading system prompt file {}", path.display()))?;
            Ok(Some(text))
        }
        None => Ok(None),
    }
}

fn find_project_root() -> Option<std::path::PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        if dir.join(".git").exists() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

async fn run(cli: Cli, config: Arc<writeflow_config::Config>) -> anyhow::Result<()> {
    let headless = cli.is_headless();
    let output_format = cli.output_format;
    let initial_prompt = cli.prompt.clone();

    let mut agent = build_agent(&cli, &config).await?;

    if headless {
        let Some(prompt) = initial_prompt.or_else(read_stdin_if_piped) else {
            anyhow::bail!(
                "headless mode requires a prompt argument or piped stdin input"
            );
        };
        run_turn(&mut agent, &prompt, output_format, headless).await?;
        return Ok(());
    }

    // Minimal interactive loop: read one line at a time from stdin, submit
    // each as a user turn, and stream text deltas to stdout as they arrive.
    println!("writeflow — interactive mode (mode: {:?}). Ctrl-D to exit.", cli.mode);
    if let Some(prompt) = initial_prompt {
        run_turn(&mut agent, &prompt, output_format, headless).await?;
    }
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        run_turn(&mut agent, line, output_format, headless).await?;
    }
    Ok(())
}

/// Submit one user turn and stream the resulting events to stdout.
async fn run_turn(
    agent: &mut Agent,
    prompt: &str,
    output_format: OutputFormatArg,
    headless: bool,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<AgentEvent>(64);
    let submit = agent.submit(prompt, tx);
    tokio::pin!(submit);

    let mut result = None;
    loop {
        tokio::select! {
            r = &mut submit, if result.is_none() => {
                result = Some(r);
            }
            Some(event) = rx.recv() => {
                if let AgentEvent::PermissionRequested { tool_name, reason, resume, .. } = &event {
                    let decision = resolve_permission_prompt(tool_name, reason, headless).await;
                    resume.resolve(decision).await;
                }
                print_event(&event, output_format);
            }
            else => break,
        }
    }
    result.unwrap_or(Ok(()))
}

/// Ask the user (or, headless, fall back to a safe default) how to resolve a
/// suspended `PermissionRequested` event (§4.C's "Prompt path").
async fn resolve_permission_prompt(
    tool_name: &str,
    reason: &str,
    headless: bool,
) -> PermissionDecision {
    if headless || !is_stdin_tty() {
        // No interactive user to confirm. Denying is the safe default —
        // silently allowing here would run a tool nobody approved.
        eprintln!("[permission] denying '{tool_name}' (no interactive session to confirm): {reason}");
        return PermissionDecision::Deny;
    }

    eprintln!();
    eprintln!("[permission] {tool_name} requires confirmation: {reason}");
    eprintln!("  1. Allow once");
    eprintln!("  2. Allow for this session");
    eprintln!("  3. Always allow");
    eprintln!("  4. Deny");
    eprint!("  Choice [1/2/3/4]: ");
    io::stdout().flush().ok();

    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return PermissionDecision::Deny;
    }
    match line.trim() {
        "2" => PermissionDecision::AllowSession,
        "3" => PermissionDecision::AllowAlways,
        "4" => PermissionDecision::Deny,
        _ => PermissionDecision::AllowOnce,
    }
}

fn print_event(event: &AgentEvent, output_format: OutputFormatArg) {
    match output_format {
        OutputFormatArg::Json => {
            if let Ok(line) = serde_json::to_string(&DisplayEvent::from(event)) {
                println!("{line}");
            }
        }
        OutputFormatArg::Text => match event {
            AgentEvent::TextDelta(delta) => {
                print!("{delta}");
                io::stdout().flush().ok();
            }
            AgentEvent::ToolCallStarted(tc) => {
                eprintln!("[tool] {} {}", tc.name, tc.args);
            }
            AgentEvent::ToolCallFinished { tool_name, is_error, .. } => {
                if *is_error {
                    eprintln!("[tool:{tool_name}] error");
                }
            }
            AgentEvent::Error(e) => {
                eprintln!("[error] {e}");
            }
            AgentEvent::TextComplete(_) | AgentEvent::TurnComplete => {
                println!();
            }
            AgentEvent::PlanProposed(plan) => {
                eprintln!("[plan] {plan}");
            }
            AgentEvent::ModeChanged(mode) => {
                eprintln!("[mode] now {mode:?}");
            }
            AgentEvent::PermissionRequested { tool_name, .. } => {
                eprintln!("[permission] resolved '{tool_name}'");
            }
            _ => {}
        },
    }
}

/// Serializable projection of [`AgentEvent`] for `--output-format json`.
#[derive(serde::Serialize)]
#[serde(tag = "type")]
enum DisplayEvent {
    TextDelta { text: String },
    ToolCallStarted { id: String, name: String },
    ToolCallFinished { call_id: String, tool_name: String, is_error: bool },
    Error { message: String },
    TurnComplete,
    PlanProposed { plan: String },
    ModeChanged { mode: String },
    PermissionRequested { call_id: String, tool_name: String, reason: String },
    Other,
}

impl From<&AgentEvent> for DisplayEvent {
    fn from(ev: &AgentEvent) -> Self {
        match ev {
            AgentEvent::TextDelta(t) => DisplayEvent::TextDelta { text: t.clone() },
            AgentEvent::ToolCallStarted(tc) => DisplayEvent::ToolCallStarted {
                id: tc.id.clone(),
                name: tc.name.clone(),
            },
            AgentEvent::ToolCallFinished { call_id, tool_name, is_error, .. } => {
                DisplayEvent::ToolCallFinished {
                    call_id: call_id.clone(),
                    tool_name: tool_name.clone(),
                    is_error: *is_error,
                }
            }
            AgentEvent::Error(e) => DisplayEvent::Error { message: e.clone() },
            AgentEvent::TurnComplete => DisplayEvent::TurnComplete,
            AgentEvent::PlanProposed(plan) => DisplayEvent::PlanProposed { plan: plan.clone() },
            AgentEvent::ModeChanged(mode) => DisplayEvent::ModeChanged { mode: format!("{mode:?}") },
            AgentEvent::PermissionRequested { call_id, tool_name, reason, .. } => {
                DisplayEvent::PermissionRequested {
                    call_id: call_id.clone(),
                    tool_name: tool_name.clone(),
                    reason: reason.clone(),
                }
            }
            _ => DisplayEvent::Other,
        }
    }
}

fn read_stdin_if_piped() -> Option<String> {
    if is_stdin_tty() {
        return None;
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf).ok()?;
    let buf = buf.trim().to_string();
    if buf.is_empty() {
        None
    } else {
        Some(buf)
    }
}

/// List available models from the static catalog, optionally filtered.
fn list_models_cmd(
    _config: &writeflow_config::Config,
    provider_filter: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    if let Some(prov) = provider_filter {
        if writeflow_model::get_driver(prov).is_none() {
            eprintln!("Unknown provider: {prov:?}");
            eprintln!("\nAvailable providers (run `writeflow list-providers` for details):");
            for d in writeflow_model::list_drivers() {
                eprintln!("  {:20} {}", d.id, d.name);
            }
            anyhow::bail!("Invalid provider: {prov}");
        }
    }

    let mut entries: Vec<ModelCatalogEntry> = writeflow_model::catalog::static_catalog();
    if let Some(prov) = provider_filter {
        entries.retain(|e| e.provider == prov);
    }
    entries.sort_by(|a, b| a.provider.cmp(&b.provider).then(a.id.cmp(&b.id)));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No models found.");
        return Ok(());
    }

    let id_w = entries.iter().map(|e| e.id.len()).max().unwrap_or(10).max(10);
    let prov_w = entries.iter().map(|e| e.provider.len()).max().unwrap_or(8).max(8);

    println!(
        "{:<id_w$}  {:<prov_w$}  {:>12}  {:>16}  DESCRIPTION",
        "ID", "PROVIDER", "CTX WINDOW", "MAX OUT TOKENS",
        id_w = id_w, prov_w = prov_w,
    );
    println!("{}", "-".repeat(id_w + prov_w + 50));

    for e in &entries {
        let ctx = if e.context_window == 0 {
            "  -".to_string()
        } else {
            format!("{:>12}", e.context_window)
        };
        let max_out = if e.max_output_tokens == 0 {
            "  -".to_string()
        } else {
            format!("{:>16}", e.max_output_tokens)
        };
        println!(
            "{:<id_w$}  {:<prov_w$}  {}  {}  {}",
            e.id, e.provider, ctx, max_out, e.description,
            id_w = id_w, prov_w = prov_w,
        );
    }
    println!("\nTotal: {} model(s)", entries.len());
    Ok(())
}

/// List all registered model providers.
fn list_providers_cmd(verbose: bool, as_json: bool) -> anyhow::Result<()> {
    let drivers = writeflow_model::list_drivers();

    if as_json {
        #[derive(serde::Serialize)]
        struct ProviderJson {
            id: &'static str,
            name: &'static str,
            description: &'static str,
            default_api_key_env: Option<&'static str>,
            default_base_url: Option<&'static str>,
            requires_api_key: bool,
        }
        let rows: Vec<ProviderJson> = drivers
            .iter()
            .map(|d| ProviderJson {
                id: d.id,
                name: d.name,
                description: d.description,
                default_api_key_env: d.default_api_key_env,
                default_base_url: d.default_base_url,
                requires_api_key: d.requires_api_key,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Supported Model Providers ({} total)\n", drivers.len());

    if verbose {
        for d in drivers {
            println!("  {} — {}", d.id, d.name);
            println!("    {}", d.description);
            if let Some(env) = d.default_api_key_env {
                println!("    API key env : {env}");
            }
            if let Some(url) = d.default_base_url {
                println!("    Default URL : {url}");
            }
            if !d.requires_api_key {
                println!("    Auth        : none required");
            }
            println!();
        }
    } else {
        let id_w = drivers.iter().map(|d| d.id.len()).max().unwrap_or(10).max(10);
        let name_w = drivers.iter().map(|d| d.name.len()).max().unwrap_or(8).max(8);
        println!("{:<id_w$}  {:<name_w$}  DESCRIPTION", "ID", "NAME");
        println!("{}", "-".repeat(id_w + name_w + 40));
        for d in drivers {
            println!("{:<id_w$}  {:<name_w$}  {}", d.id, d.name, d.description);
        }
        println!("\nUse `writeflow list-providers --verbose` for API key and URL details.");
        println!("Use `writeflow list-models --provider <ID>` to see models for a specific provider.");
    }
    Ok(())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn is_stdin_tty() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        unsafe { libc::isatty(io::stdin().as_raw_fd()) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
