//! Status command implementation
//!
//! Show the unit's operation state with text or JSON output.

use anyhow::Result;
use clap::{Args, ValueEnum};
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use serde::Serialize;
use steward_engine::{HookOutcome, HookRecord, ResolvedMode, State};

use crate::command::Command;
use crate::common::RuntimeContext;

/// Number of history entries shown in text output
const RECENT_HOOKS: usize = 10;

/// Output format for the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Full report as JSON
    Json,
}

/// Show operation state, relations and recent hooks
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Everything `steward status` reports
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    unit: String,
    state: State,
    resolved: ResolvedMode,
    lock_holder: Option<String>,
    relations: IndexMap<i64, RelationReport>,
    history: Vec<HookRecord>,
}

#[derive(Debug, Serialize)]
struct RelationReport {
    name: Option<String>,
    members: Vec<String>,
}

impl StatusReport {
    fn collect(context: &RuntimeContext) -> Result<Self> {
        let names = context.config.relation_names();
        let relations = context
            .store
            .relations()?
            .into_iter()
            .map(|(id, members)| {
                let name = names.get(&id).cloned();
                (id, RelationReport { name, members })
            })
            .collect();

        Ok(Self {
            unit: context.config.unit.name.clone(),
            state: context.store.load_state()?,
            resolved: context.store.resolved_mode()?,
            lock_holder: context.lock().holder()?,
            relations,
            history: context.store.hook_history()?,
        })
    }

    fn print_text(&self) {
        println!("{} {}", "Unit:".bold(), self.unit);

        let state = self.state.to_string();
        let awaiting = !self.state.is_idle() && self.state.step == steward_engine::Step::Pending;
        if self.state.is_idle() {
            println!("{} {}", "State:".bold(), state.green());
        } else if awaiting {
            println!("{} {}", "State:".bold(), state.red());
        } else {
            println!("{} {}", "State:".bold(), state.yellow());
        }
        println!(
            "{} {}",
            "Started:".bold(),
            if self.state.started { "yes" } else { "no" }
        );
        if self.state.collect_metrics_time > 0 {
            let at = chrono::DateTime::from_timestamp(self.state.collect_metrics_time, 0)
                .map_or_else(|| self.state.collect_metrics_time.to_string(), |t| t.to_rfc3339());
            println!("{} {at}", "Metrics collected:".bold());
        }
        if self.resolved != ResolvedMode::None {
            println!("{} {}", "Resolved:".bold(), self.resolved.to_string().cyan());
        } else if awaiting {
            println!(
                "  {} run {} or {}",
                "hook failed:".red(),
                "steward resolved".cyan(),
                "steward resolved --retry".cyan()
            );
        }
        if let Some(holder) = &self.lock_holder {
            println!("{} {holder}", "Lock:".bold());
        }

        if !self.relations.is_empty() {
            println!("\n{}", "Relations:".bold());
            for (id, relation) in &self.relations {
                let name = relation.name.as_deref().unwrap_or("?");
                let members = if relation.members.is_empty() {
                    "-".dimmed().to_string()
                } else {
                    relation.members.join(", ")
                };
                println!("  {name}:{id}  {members}");
            }
        }

        if !self.history.is_empty() {
            println!("\n{}", "Recent hooks:".bold());
            let skip = self.history.len().saturating_sub(RECENT_HOOKS);
            for record in self.history.iter().skip(skip) {
                let outcome = match record.outcome {
                    HookOutcome::Completed => record.outcome.to_string().green().to_string(),
                    HookOutcome::Failed => record.outcome.to_string().red().to_string(),
                };
                let at = chrono::DateTime::from_timestamp(record.at, 0)
                    .map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
                println!(
                    "  {} {:<28} {outcome}  {}",
                    at.dimmed(),
                    record.hook_name,
                    record.context_id.dimmed()
                );
            }
        }
    }
}

impl Command for StatusCommand {
    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let report = StatusReport::collect(context)?;
        match self.format {
            OutputFormat::Text => report.print_text(),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }
}
