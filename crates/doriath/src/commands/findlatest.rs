use super::load_tree;
use doriath_registry::RegistryClient;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn run(
    config: &Path,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
    image: &str,
) -> anyhow::Result<()> {
    let tree = load_tree(config, variables, variable_files)?;
    let tag = tree.find_latest_tag(image, &RegistryClient::new())?;
    println!("{tag}");
    Ok(())
}
