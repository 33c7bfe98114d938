use super::load_tree;
use doriath_registry::RegistryClient;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn run(
    config: &Path,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
    image: &str,
    timeout: Duration,
    interval: Duration,
) -> anyhow::Result<()> {
    let tree = load_tree(config, variables, variable_files)?;
    tree.wait_image_exists(image, timeout, interval, &RegistryClient::new())?;
    println!("OK");
    Ok(())
}
