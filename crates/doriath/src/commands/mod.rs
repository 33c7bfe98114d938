//! サブコマンドの実装

pub mod build;
pub mod clean;
pub mod dryrun;
pub mod findlatest;
pub mod push;
pub mod trybuild;
pub mod waitimage;

use doriath_core::BuildTree;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 設定ファイルを読み込んでビルドツリーを作る共通処理
pub(crate) fn load_tree(
    config: &Path,
    variables: &HashMap<String, String>,
    variable_files: &[PathBuf],
) -> anyhow::Result<BuildTree> {
    Ok(doriath_core::read_build_tree_from_file(
        config,
        variables,
        variable_files,
    )?)
}
