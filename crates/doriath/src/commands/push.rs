use super::load_tree;
use doriath_engine::DockerCli;
use doriath_registry::RegistryClient;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn run(
    config: &Path,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
) -> anyhow::Result<()> {
    let mut tree = load_tree(config, variables, variable_files)?;
    tree.prepare(&RegistryClient::new())?;
    tree.push(&DockerCli::new())?;
    Ok(())
}
