use crate::RunArgs;
use crate::utils;
use colored::Colorize;
use std::path::Path;
use strata_cloud::StateManager;

pub async fn handle(stack_file: &Path, args: &RunArgs) -> anyhow::Result<()> {
    let deployment = utils::load_stack(stack_file)?;
    let settings = utils::effective_settings(&deployment.settings, args);

    let lock = StateManager::new(strata_config::project_root_for(stack_file))
        .acquire_lock()
        .await?;
    let session = utils::open_session(stack_file, &args.region, settings).await?;

    let records = session.state().list().await?;
    if records.is_empty() {
        println!("{}", "Nothing is recorded for this stack".green());
        lock.release().await?;
        return Ok(());
    }

    println!();
    println!("{}", format!("Recorded resources ({}):", records.len()).bold());
    for record in &records {
        println!("  {} {} {}", "-".red(), record.kind.to_string().dimmed(), record.id.cyan());
    }

    if !args.yes && !utils::confirm("Delete every recorded resource?")? {
        println!("{}", "Cancelled, nothing was deleted".yellow());
        lock.release().await?;
        return Ok(());
    }

    utils::cancel_on_ctrl_c(&session);
    println!();
    println!("{}", format!("Destroying stack '{}'...", deployment.name).yellow());
    let report = session.destroy().await?;

    println!();
    for resource in &report.resources {
        utils::print_resource(resource);
    }
    println!();
    let summary = format!(
        "{}/{} deleted in {}ms",
        report.deleted(),
        report.resources.len(),
        report.duration_ms
    );
    lock.release().await?;

    if report.is_success() {
        println!("{} {}", "✓".green().bold(), summary);
        Ok(())
    } else {
        println!("{} {}", "✗".red().bold(), summary);
        if report.cancelled {
            println!("{}", "Run was cancelled".yellow());
        }
        std::process::exit(1);
    }
}
