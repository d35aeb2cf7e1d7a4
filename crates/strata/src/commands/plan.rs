use crate::utils;
use colored::Colorize;
use std::path::Path;
use strata_cloud_local::DEFAULT_REGION;

pub async fn handle(stack_file: &Path) -> anyhow::Result<()> {
    let deployment = utils::load_stack(stack_file)?;
    let session =
        utils::open_session(stack_file, DEFAULT_REGION, deployment.settings.clone()).await?;

    println!("{}", format!("Planning stack '{}'...", deployment.name).blue());
    let plan = session.plan(&deployment).await?;
    utils::print_plan(&plan);

    if !plan.has_changes {
        println!("{}", "Everything is up to date".green());
    }
    Ok(())
}
