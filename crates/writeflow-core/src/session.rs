// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use writeflow_model::Message;
use uuid::Uuid;

/// One saved turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub content: String,
}

/// A named research document the agent produced or collected mid-session
/// (e.g. fetched reference material, collected notes) that must survive
/// compaction even once the turns that produced it are summarized away
/// (§3 Working Context, §4.B "outstanding research artifacts").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchArtifact {
    pub name: String,
    pub content: String,
}

/// A file the agent has read, tracked so the compressor can preserve a
/// reference to it — path, last-observed mtime, and a short excerpt —
/// instead of losing it when the turns that read it are dropped (§3, §4.B
/// "file references with their last-known excerpt").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencedFile {
    pub path: String,
    pub last_observed_mtime: Option<DateTime<Utc>>,
    pub last_excerpt: String,
}

/// In-memory conversation session.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub messages: Vec<Message>,
    /// Approximate total token count for the current message list
    pub token_count: usize,
    /// Maximum context tokens (set from model config / provider limits)
    pub max_tokens: usize,
    /// Reserved output budget (model config's `max_tokens` for completions).
    pub max_output_tokens: usize,
    /// Estimated tokens consumed by tool schemas + dynamic prompt blocks
    /// injected into the current turn but not tracked in `messages`.
    pub schema_overhead: usize,
    /// Multiplier applied to the chars/4 estimate to correct it against the
    /// provider's actual reported input token counts. Starts at 1.0 and is
    /// nudged toward `actual / estimated` after every `Usage` event.
    pub calibration_factor: f32,
    /// Cumulative tokens served from the provider's prompt cache.
    pub cache_read_total: u32,
    /// Cumulative tokens written into the provider's prompt cache.
    pub cache_write_total: u32,
    /// Outstanding research artifacts, kept outside `messages` so compaction
    /// can never drop them silently (§3 Working Context).
    pub research_artifacts: Vec<ResearchArtifact>,
    /// Files the agent has read so far this session (§3 Working Context).
    pub referenced_files: Vec<ReferencedFile>,
}

impl Session {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            token_count: 0,
            max_tokens,
            max_output_tokens: 0,
            schema_overhead: 0,
            calibration_factor: 1.0,
            cache_read_total: 0,
            cache_write_total: 0,
            research_artifacts: Vec::new(),
            referenced_files: Vec::new(),
        }
    }

    /// Record or update a named research artifact. A second call with the
    /// same name replaces its content rather than duplicating the entry.
    pub fn record_research_artifact(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let name = name.into();
        let content = content.into();
        match self.research_artifacts.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.content = content,
            None => self.research_artifacts.push(ResearchArtifact { name, content }),
        }
    }

    /// Record or update the last-known state of a file the agent read. A
    /// second call for the same path updates the mtime/excerpt in place.
    pub fn record_referenced_file(
        &mut self,
        path: impl Into<String>,
        last_observed_mtime: Option<DateTime<Utc>>,
        last_excerpt: impl Into<String>,
    ) {
        let path = path.into();
        let last_excerpt = last_excerpt.into();
        match self.referenced_files.iter_mut().find(|f| f.path == path) {
            Some(existing) => {
                existing.last_observed_mtime = last_observed_mtime;
                existing.last_excerpt = last_excerpt;
            }
            None => self.referenced_files.push(ReferencedFile {
                path,
                last_observed_mtime,
                last_excerpt,
            }),
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.token_count += msg.approx_tokens();
        self.messages.push(msg);
    }

    pub fn push_many(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for m in msgs { self.push(m); }
    }

    /// Fraction of context window consumed (0.0–1.0)
    pub fn context_fraction(&self) -> f32 {
        if self.max_tokens == 0 { return 0.0; }
        (self.token_count as f32) / (self.max_tokens as f32)
    }

    pub fn is_near_limit(&self, threshold: f32) -> bool {
        self.context_fraction() >= threshold
    }

    /// Recalculate token count from scratch (call after compaction).
    pub fn recalculate_tokens(&mut self) {
        self.token_count = self.messages.iter().map(|m| m.approx_tokens()).sum();
    }

    /// Replace the message list and recalculate token count (for resubmit / edit).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.recalculate_tokens();
    }

    /// Tokens available for input (prompt + history), reserving space for the
    /// model's output budget. Zero if the output reservation swallows the window.
    pub fn input_budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.max_output_tokens)
    }

    /// Accumulate prompt-cache read/write totals reported by the provider.
    pub fn add_cache_usage(&mut self, read: u32, write: u32) {
        self.cache_read_total = self.cache_read_total.saturating_add(read);
        self.cache_write_total = self.cache_write_total.saturating_add(write);
    }

    /// Nudge `calibration_factor` toward the ratio of the provider's actual
    /// reported input tokens to our chars/4 estimate for the same turn.
    /// Averages with the previous factor so a single noisy turn can't swing
    /// the estimate wildly.
    pub fn update_calibration(&mut self, actual_input: u32, estimated: usize) {
        if estimated == 0 {
            return;
        }
        let observed = actual_input as f32 / estimated as f32;
        let observed = observed.clamp(0.25, 4.0);
        self.calibration_factor = (self.calibration_factor + observed) / 2.0;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
