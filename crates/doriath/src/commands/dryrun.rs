use super::load_tree;
use doriath_core::PrepareOptions;
use doriath_registry::RegistryClient;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub fn run(
    config: &Path,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
    skip_check: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    let mut tree = load_tree(config, variables, variable_files)?;
    let client = RegistryClient::new();
    tree.prepare_with(
        &client,
        PrepareOptions {
            skip_dirty_check: skip_check,
        },
    )?;
    tree.print_tree(no_color);
    Ok(())
}
