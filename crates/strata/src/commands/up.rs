use crate::RunArgs;
use crate::utils;
use colored::Colorize;
use std::path::Path;
use strata_cloud::StateManager;

pub async fn handle(stack_file: &Path, args: &RunArgs) -> anyhow::Result<()> {
    let deployment = utils::load_stack(stack_file)?;
    let settings = utils::effective_settings(&deployment.settings, args);
    println!(
        "Stack: {} (region {}, concurrency {}, on-failure {}, rollback {})",
        deployment.name.cyan(),
        args.region,
        settings.worker_limit(),
        settings.failure_policy,
        settings.rollback_policy
    );

    let lock = StateManager::new(strata_config::project_root_for(stack_file))
        .acquire_lock()
        .await?;
    let session = utils::open_session(stack_file, &args.region, settings).await?;

    let plan = session.plan(&deployment).await?;
    utils::print_plan(&plan);
    if !plan.has_changes {
        println!("{}", "Everything is up to date".green());
        lock.release().await?;
        return Ok(());
    }

    if !args.yes && !utils::confirm("Apply these changes?")? {
        println!("{}", "Cancelled, nothing was changed".yellow());
        lock.release().await?;
        return Ok(());
    }

    utils::cancel_on_ctrl_c(&session);
    println!();
    println!("{}", "Applying...".blue());
    let report = session.apply(&deployment).await?;
    utils::print_apply_report(&report);
    lock.release().await?;

    if !report.is_success() || report.cancelled {
        std::process::exit(1);
    }
    Ok(())
}
