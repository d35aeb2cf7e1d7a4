use crate::utils;
use std::path::Path;
use strata_cloud_local::DEFAULT_REGION;

pub async fn handle(stack_file: &Path, json: bool) -> anyhow::Result<()> {
    let deployment = if json {
        strata_core::parse_kdl_file(stack_file)?
    } else {
        utils::load_stack(stack_file)?
    };
    let session =
        utils::open_session(stack_file, DEFAULT_REGION, deployment.settings.clone()).await?;
    let outputs = session.outputs(&deployment).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs.to_json())?);
    } else if outputs.is_empty() {
        println!("No outputs are declared");
    } else {
        println!();
        utils::print_outputs(&outputs);
    }
    Ok(())
}
