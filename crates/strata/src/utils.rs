use crate::RunArgs;
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_cloud::{
    ActionType, ApplyReport, FileStateStore, OutputReport, OutputValue, Plan, ProviderRegistry,
    ResourceReport, ResourceStatus, Session, StateStore,
};
use strata_cloud_local::LocalProvider;
use strata_core::{Deployment, EngineSettings};

/// `--file` if given, otherwise the discovered stack file
pub fn resolve_stack_file(file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match file {
        Some(path) if path.exists() => Ok(path),
        Some(path) => anyhow::bail!("stack file not found: {}", path.display()),
        None => Ok(strata_config::find_stack_file()?),
    }
}

pub fn load_stack(stack_file: &Path) -> anyhow::Result<Deployment> {
    println!("📄 Stack file: {}", stack_file.display().to_string().cyan());
    Ok(strata_core::parse_kdl_file(stack_file)?)
}

/// Stack settings with command-line overrides applied
pub fn effective_settings(stack: &EngineSettings, args: &RunArgs) -> EngineSettings {
    let mut settings = stack.clone();
    if let Some(concurrency) = args.concurrency {
        settings = settings.with_concurrency(concurrency);
    }
    if let Some(policy) = args.on_failure {
        settings = settings.with_failure_policy(policy);
    }
    if let Some(policy) = args.rollback {
        settings = settings.with_rollback_policy(policy);
    }
    settings
}

/// Session over the stack's `.strata/state.json`, backed by the local provider
pub async fn open_session(
    stack_file: &Path,
    region: &str,
    settings: EngineSettings,
) -> anyhow::Result<Session> {
    let root = strata_config::project_root_for(stack_file);
    let state: Arc<dyn StateStore> = Arc::new(FileStateStore::open(&root).await?);
    let provider = Arc::new(LocalProvider::new(region));
    tracing::debug!(root = %root.display(), region, "Opening session");

    Ok(Session::new(ProviderRegistry::new().with_fallback(provider), state).with_settings(settings))
}

/// Cancel `session` on Ctrl-C. In-flight provider calls finish first.
pub fn cancel_on_ctrl_c(session: &Session) {
    let token = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "Interrupted: waiting for in-flight calls to finish...".yellow());
            token.cancel();
        }
    });
}

/// Ask a yes/no question, defaulting to no
pub fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N]: ", question);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y") || input.trim().eq_ignore_ascii_case("yes"))
}

pub fn print_plan(plan: &Plan) {
    println!();
    println!("{}", "Plan:".bold());
    for action in &plan.actions {
        let marker = match action.action_type {
            ActionType::Create => "+".green(),
            ActionType::Update => "~".yellow(),
            ActionType::Replace => "±".magenta(),
            ActionType::Delete => "-".red(),
            ActionType::NoOp => " ".normal(),
        };
        let line = format!("  {} {}", marker, action.description);
        if action.action_type.is_change() {
            println!("{}", line);
        } else {
            println!("{}", line.dimmed());
        }
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn status_marker(status: ResourceStatus) -> colored::ColoredString {
    match status {
        ResourceStatus::Applied => "✓".green(),
        ResourceStatus::Deleted => "✓".green(),
        ResourceStatus::Failed => "✗".red(),
        ResourceStatus::Skipped => "○".yellow(),
        ResourceStatus::RolledBack => "↺".cyan(),
        _ => "?".normal(),
    }
}

pub fn print_resource(report: &ResourceReport) {
    let action = report
        .action
        .map(|a| format!(" ({})", a))
        .unwrap_or_default();
    println!(
        "  {} {} {}{}",
        status_marker(report.status),
        report.kind.to_string().dimmed(),
        report.id.cyan(),
        action.dimmed()
    );
    if let Some(error) = &report.error {
        println!("      {}", error.red());
    }
    if let Some(reason) = &report.skipped_because {
        println!("      {}", reason.yellow());
    }
    if report.attempts > 1 {
        println!("      {}", format!("{} attempts", report.attempts).dimmed());
    }
}

pub fn print_apply_report(report: &ApplyReport) {
    println!();
    println!("{}", "Resources:".bold());
    for resource in &report.resources {
        print_resource(resource);
    }

    if !report.pruned.is_empty() {
        println!();
        println!("{}", "Removed from the stack:".bold());
        for resource in &report.pruned {
            print_resource(resource);
        }
    }
    if !report.kept_orphans.is_empty() {
        println!();
        println!(
            "{} {}",
            "Kept until a clean run:".yellow(),
            report.kept_orphans.join(", ")
        );
    }

    if !report.outputs.is_empty() {
        println!();
        print_outputs(&report.outputs);
    }

    println!();
    let summary = format!("{} in {}ms", report.summary(), report.duration_ms);
    if report.is_success() {
        println!("{} {}", "✓".green().bold(), summary);
    } else {
        println!("{} {}", "✗".red().bold(), summary);
    }
    if report.rolled_back {
        println!("{}", "Changes from this run were rolled back".cyan());
    }
    if report.cancelled {
        println!("{}", "Run was cancelled".yellow());
    }
}

pub fn print_outputs(outputs: &OutputReport) {
    println!("{}", "Outputs:".bold());
    for entry in outputs.iter() {
        match &entry.value {
            OutputValue::Available { value } => {
                println!("  {} = {}", entry.name.cyan(), display_value(value));
            }
            OutputValue::Unavailable { reason, .. } => {
                let note = format!("(unavailable: {})", reason);
                println!("  {} {}", entry.name.cyan(), note.yellow());
            }
        }
    }
}

/// Strings without quotes, long documents on one line
fn display_value(value: &serde_json::Value) -> String {
    const MAX: usize = 120;
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX {
        let head: String = text.chars().take(MAX).collect();
        format!("{}… (use --json for the full value)", head)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{FailurePolicy, RollbackPolicy};

    fn args() -> RunArgs {
        RunArgs {
            concurrency: None,
            on_failure: None,
            rollback: None,
            region: "ap-south-1".to_string(),
            yes: true,
        }
    }

    #[test]
    fn test_settings_without_overrides() {
        let stack = EngineSettings::default().with_concurrency(2);
        assert_eq!(effective_settings(&stack, &args()), stack);
    }

    #[test]
    fn test_flags_override_stack_settings() {
        let stack = EngineSettings::default();
        let overrides = RunArgs {
            concurrency: Some(8),
            on_failure: Some(FailurePolicy::StopOnFirstError),
            rollback: Some(RollbackPolicy::Transactional),
            ..args()
        };

        let settings = effective_settings(&stack, &overrides);
        assert_eq!(settings.concurrency, 8);
        assert_eq!(settings.failure_policy, FailurePolicy::StopOnFirstError);
        assert_eq!(settings.rollback_policy, RollbackPolicy::Transactional);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("plain")), "plain");
        assert_eq!(display_value(&json!(5432)), "5432");
        let long = display_value(&json!("x".repeat(500)));
        assert!(long.ends_with("(use --json for the full value)"));
    }
}
