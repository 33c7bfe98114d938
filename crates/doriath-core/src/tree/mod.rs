//! ビルドツリー
//!
//! ノードは正規化済みイメージ名をキーに単一のマップが所有し、親子関係は
//! 名前で張ります（親子間の相互ポインタは持たない）。`prepare` が
//! 辺の張り付け → Dockerfile検査 → dirty伝播 の3パスを実行し、以降
//! ツリーは読み取り専用として走査されます。

use crate::dockerfile::extract_parent_image;
use crate::error::{Result, TreeError};
use crate::image::{ImageInfo, compare_docker_name};
use colored::Colorize;
use doriath_engine::{ContainerEngine, run_shell};
use doriath_registry::{RegistryClient, RegistryCredential, TagProbe};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;


/// ビルドコンテキストの場所。`provided` は外部から供給されるイメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRoot {
    Provided,
    Path(PathBuf),
}

/// ビルド対象のイメージ1つぶんの定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildNode {
    /// 正規化済みイメージ名（registry/repository）
    pub name: String,
    pub tag: String,
    pub build_root: BuildRoot,
    /// 親ノードの正規化済み名。空ならルート
    pub depend: String,
    pub pre_build: String,
    pub post_build: String,
    pub force_build: bool,
    pub push_latest: bool,
    pub platforms: Vec<String>,
    /// dirty伝播で決まる「このinvocationで(再)ビルドが必要」フラグ
    pub dirty: bool,
    /// 子ノードの名前。`prepare` のPass Aで張られる
    pub children: Vec<String>,
}

impl BuildNode {
    pub fn is_provided(&self) -> bool {
        self.build_root == BuildRoot::Provided
    }
}

/// レジストリごとの認証情報（password_fileは読み込み時に解決済み）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    fn to_registry_credential(&self) -> RegistryCredential {
        RegistryCredential {
            registry: self.registry.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// `prepare` の挙動オプション
#[derive(Debug, Default, Clone, Copy)]
pub struct PrepareOptions {
    /// dirtyチェック（Pass C）を丸ごとスキップする
    pub skip_dirty_check: bool,
}

/// ビルドグラフ全体
#[derive(Debug)]
pub struct BuildTree {
    pub(crate) root_dir: PathBuf,
    pub(crate) pull: Vec<String>,
    pub(crate) root_nodes: Vec<String>,
    pub(crate) all_nodes: BTreeMap<String, BuildNode>,
    pub(crate) credentials: BTreeMap<String, Credential>,
}

impl BuildTree {
    /// ツリーを検証し、各ノードのビルド要否を決める
    ///
    /// 3パスを順に実行します:
    /// - Pass A: 辺の張り付けと循環チェック
    /// - Pass B: Dockerfileの親イメージ・タグの突き合わせ
    /// - Pass C: dirty伝播（リモートのタグ存在チェック）
    pub fn prepare(&mut self, probe: &dyn TagProbe) -> Result<()> {
        self.prepare_with(probe, PrepareOptions::default())
    }

    pub fn prepare_with(&mut self, probe: &dyn TagProbe, options: PrepareOptions) -> Result<()> {
        // 派生状態は毎回作り直す。2回呼んでも注釈は変わらない
        self.root_nodes.clear();
        for node in self.all_nodes.values_mut() {
            node.children.clear();
            node.dirty = false;
        }

        let names: Vec<String> = self.all_nodes.keys().cloned().collect();
        for name in &names {
            let depend = self.all_nodes[name].depend.clone();
            if depend.is_empty() {
                self.root_nodes.push(name.clone());
                continue;
            }
            match self.all_nodes.get_mut(&depend) {
                Some(parent) => parent.children.push(name.clone()),
                None => {
                    return Err(TreeError::DependencyMissing {
                        name: name.clone(),
                        depend,
                    });
                }
            }
            self.cyclic_check(name)?;
        }

        for name in &names {
            self.assert_dockerfile(name)?;
        }

        if !options.skip_dirty_check {
            let roots = self.root_nodes.clone();
            for root in &roots {
                self.dirty_check(root, false, false, probe)?;
            }
        }
        Ok(())
    }

    /// pull リストのイメージを順に取得する
    pub fn pull(&self, engine: &dyn ContainerEngine) -> Result<()> {
        for image in &self.pull {
            println!("{}", format!("イメージを取得中: {image}").blue());
            engine.pull(image)?;
        }
        Ok(())
    }

    /// ビルドが必要なノードを深さ優先でビルドする
    pub fn build(&self, engine: &dyn ContainerEngine) -> Result<()> {
        engine.detect()?;
        println!("{}", "新しいイメージをビルドします".green().bold());
        for root in &self.root_nodes {
            self.build_node_and_children(root, engine)?;
        }
        Ok(())
    }

    /// 一時タグでビルドして即削除する（ビルド可能性の検証用）
    pub fn try_build(&self, engine: &dyn ContainerEngine) -> Result<()> {
        engine.detect()?;
        println!("{}", "ビルドを試行します".green().bold());
        for root in &self.root_nodes {
            self.try_build_node_and_children(root, engine)?;
        }
        Ok(())
    }

    /// ビルドしてから全レジストリにログインし、必要なノードをプッシュする
    pub fn push(&self, engine: &dyn ContainerEngine) -> Result<()> {
        self.build(engine)?;
        println!("{}", "レジストリにログインします".green().bold());
        for credential in self.credentials.values() {
            engine.login(
                &credential.registry,
                &credential.username,
                &credential.password,
            )?;
        }
        println!("{}", "新しいイメージをプッシュします".green().bold());
        for root in &self.root_nodes {
            self.push_node_and_children(root, engine)?;
        }
        Ok(())
    }

    /// provided 以外のノードのイメージをローカルから削除する
    ///
    /// 削除の失敗は報告するだけで続行します。
    pub fn clean(&self, engine: &dyn ContainerEngine) {
        for node in self.all_nodes.values() {
            if node.is_provided() {
                continue;
            }
            println!("====> イメージを削除中: {}:{}", node.name, node.tag);
            if let Err(e) = engine.try_remove_image(&node.name, &node.tag) {
                eprintln!("{}", format!("削除できませんでした: {e}").yellow());
            }
            if node.push_latest {
                println!("====> イメージを削除中: {}:latest", node.name);
                if let Err(e) = engine.try_remove_image(&node.name, "latest") {
                    eprintln!("{}", format!("削除できませんでした: {e}").yellow());
                }
            }
        }
    }

    /// ツリーを標準出力に表示する
    pub fn print_tree(&self, no_color: bool) {
        let mut stdout = std::io::stdout();
        let _ = self.write_tree(&mut stdout, no_color);
    }

    /// ツリーを書き出す。ビルドが必要なノードには ` (*)` が付く
    pub fn write_tree<W: Write>(&self, writer: &mut W, no_color: bool) -> std::io::Result<()> {
        for root in &self.root_nodes {
            self.write_subtree(writer, root, 0, no_color)?;
        }
        Ok(())
    }

    /// latest と同じマニフェストを持つタグを探す
    pub fn find_latest_tag(&self, reference: &str, client: &RegistryClient) -> Result<String> {
        let info = ImageInfo::parse(reference)?;
        let credential = self.registry_credential(&info.registry_name)?;
        Ok(client.find_latest_tag(&info.short_name, &credential)?)
    }

    /// イメージがレジストリに現れるまで待機する
    pub fn wait_image_exists(
        &self,
        reference: &str,
        timeout: Duration,
        interval: Duration,
        client: &RegistryClient,
    ) -> Result<()> {
        let info = ImageInfo::parse(reference)?;
        let credential = self.registry_credential(&info.registry_name)?;
        client.wait_image_exists(&info.short_name, &info.tag, &credential, timeout, interval)?;
        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&BuildNode> {
        self.all_nodes.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &BuildNode> {
        self.all_nodes.values()
    }

    pub fn root_nodes(&self) -> &[String] {
        &self.root_nodes
    }

    pub fn pull_list(&self) -> &[String] {
        &self.pull
    }

    pub fn credential_for(&self, registry_name: &str) -> Option<&Credential> {
        self.credentials.get(registry_name)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// 新しく張った辺から上へ親ポインタをたどり、同じ名前に2度出会ったら循環
    fn cyclic_check(&self, start: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = start;
        loop {
            if !seen.insert(current.to_string()) {
                return Err(TreeError::CyclicDependency {
                    name: current.to_string(),
                });
            }
            let Some(node) = self.all_nodes.get(current) else {
                return Err(TreeError::DependencyMissing {
                    name: start.to_string(),
                    depend: current.to_string(),
                });
            };
            if node.depend.is_empty() {
                return Ok(());
            }
            current = node.depend.as_str();
        }
    }

    /// Dockerfileの最後の FROM が設定上の依存と一致するか検査する
    fn assert_dockerfile(&self, name: &str) -> Result<()> {
        let node = &self.all_nodes[name];
        if node.depend.is_empty() {
            return Ok(());
        }
        let BuildRoot::Path(build_root) = &node.build_root else {
            return Ok(());
        };
        let dockerfile = build_root.join("Dockerfile");
        let Some(parent_image) = extract_parent_image(&dockerfile)? else {
            return Err(TreeError::MismatchDependencyImage {
                name: node.name.clone(),
                expected: node.depend.clone(),
                actual: String::new(),
            });
        };
        if !compare_docker_name(&node.depend, &parent_image.full_name) {
            return Err(TreeError::MismatchDependencyImage {
                name: node.name.clone(),
                expected: node.depend.clone(),
                actual: parent_image.full_name,
            });
        }
        let Some(parent) = self.all_nodes.get(&node.depend) else {
            return Err(TreeError::DependencyMissing {
                name: node.name.clone(),
                depend: node.depend.clone(),
            });
        };
        if parent.tag != parent_image.tag {
            return Err(TreeError::MismatchDependencyTag {
                name: node.name.clone(),
                parent: node.depend.clone(),
                expected: parent.tag.clone(),
                actual: parent_image.tag,
            });
        }
        Ok(())
    }

    /// dirty伝播。`(parent_dirty, parent_forced)` を子へ引き継ぐ
    fn dirty_check(
        &mut self,
        name: &str,
        parent_dirty: bool,
        parent_forced: bool,
        probe: &dyn TagProbe,
    ) -> Result<()> {
        let (dirty, force_build) = {
            let node = &self.all_nodes[name];
            if parent_forced || node.force_build {
                // 強制ビルドはリモートに問い合わせない
                (true, true)
            } else {
                let info = ImageInfo::parse(&node.name)?;
                let credential = self.registry_credential(&info.registry_name)?;
                let tag_exists =
                    probe.check_tag_exists(&info.short_name, &node.tag, &credential)?;
                debug!(name = %node.name, tag = %node.tag, tag_exists, "dirty check");
                if node.is_provided() {
                    if !tag_exists {
                        return Err(TreeError::MissingTag {
                            tag: node.tag.clone(),
                            name: node.name.clone(),
                        });
                    }
                    (false, node.force_build)
                } else if parent_dirty {
                    if tag_exists {
                        // 再ビルドが必要なのにタグが上がっていない
                        return Err(TreeError::ImageTagOutdated {
                            name: node.name.clone(),
                        });
                    }
                    (true, node.force_build)
                } else {
                    (!tag_exists, node.force_build)
                }
            }
        };

        let children = {
            let Some(node) = self.all_nodes.get_mut(name) else {
                return Ok(());
            };
            node.dirty = dirty;
            node.force_build = force_build;
            node.children.clone()
        };
        for child in &children {
            self.dirty_check(child, dirty, force_build, probe)?;
        }
        Ok(())
    }

    fn registry_credential(&self, registry_name: &str) -> Result<RegistryCredential> {
        self.credentials
            .get(registry_name)
            .map(Credential::to_registry_credential)
            .ok_or_else(|| TreeError::MissingCredential {
                registry_name: registry_name.to_string(),
            })
    }

    fn needs_build(&self, node: &BuildNode) -> bool {
        !node.is_provided() && (node.dirty || node.force_build)
    }

    fn build_node_and_children(&self, name: &str, engine: &dyn ContainerEngine) -> Result<()> {
        let node = &self.all_nodes[name];
        if !self.needs_build(node) {
            println!("{}", format!("====> スキップ: {}", node.name).dimmed());
        } else {
            println!(
                "{}",
                format!("====> ビルド中: {}:{}", node.name, node.tag).green()
            );
            self.build_node(node, &node.tag, engine)?;
            if node.push_latest {
                println!(
                    "{}",
                    format!("====> ビルド中: {}:latest", node.name).green()
                );
                self.build_node(node, "latest", engine)?;
            }
        }
        for child in &node.children {
            self.build_node_and_children(child, engine)?;
        }
        Ok(())
    }

    fn try_build_node_and_children(&self, name: &str, engine: &dyn ContainerEngine) -> Result<()> {
        let node = &self.all_nodes[name];
        if !self.needs_build(node) {
            println!("{}", format!("====> スキップ: {}", node.name).dimmed());
        } else {
            let ephemeral_tag = format!("{}-{}", node.tag, epoch_nanos());
            println!(
                "{}",
                format!("====> ビルド中: {}:{}", node.name, ephemeral_tag).green()
            );
            self.build_node(node, &ephemeral_tag, engine)?;
            println!("====> イメージを削除中: {}:{}", node.name, ephemeral_tag);
            if let Err(e) = engine.remove_image(&node.name, &ephemeral_tag) {
                eprintln!("{}", format!("削除できませんでした: {e}").yellow());
            }
        }
        for child in &node.children {
            self.try_build_node_and_children(child, engine)?;
        }
        Ok(())
    }

    fn push_node_and_children(&self, name: &str, engine: &dyn ContainerEngine) -> Result<()> {
        let node = &self.all_nodes[name];
        if !self.needs_build(node) {
            println!("{}", format!("====> スキップ: {}", node.name).dimmed());
        } else if let BuildRoot::Path(build_root) = &node.build_root {
            println!(
                "{}",
                format!("====> プッシュ中: {}:{}", node.name, node.tag).green()
            );
            engine.push(&node.name, &node.tag, build_root, &node.platforms)?;
            if node.push_latest {
                println!(
                    "{}",
                    format!("====> プッシュ中: {}:latest", node.name).green()
                );
                engine.push(&node.name, "latest", build_root, &node.platforms)?;
            }
        }
        for child in &node.children {
            self.push_node_and_children(child, engine)?;
        }
        Ok(())
    }

    /// pre_build / post_build フックを実行する
    fn run_hook(&self, command: &str) -> Result<()> {
        run_shell(&resolve_shell_command(&self.root_dir, command))?;
        Ok(())
    }

    fn build_node(&self, node: &BuildNode, tag: &str, engine: &dyn ContainerEngine) -> Result<()> {
        let BuildRoot::Path(build_root) = &node.build_root else {
            return Ok(());
        };
        if !node.pre_build.is_empty() {
            self.run_hook(&node.pre_build)?;
        }
        engine.build(&node.name, tag, build_root)?;
        // post_build はビルド成功時のみ実行し、その失敗は結果を覆さない
        if !node.post_build.is_empty() {
            if let Err(e) = self.run_hook(&node.post_build) {
                eprintln!(
                    "{}",
                    format!("post_build フックが失敗しました: {e}").yellow()
                );
            }
        }
        Ok(())
    }

    fn write_subtree<W: Write>(
        &self,
        writer: &mut W,
        name: &str,
        level: usize,
        no_color: bool,
    ) -> std::io::Result<()> {
        let node = &self.all_nodes[name];
        let label = format!("{}- {}:{}", "  ".repeat(level), node.name, node.tag);
        if self.needs_build(node) {
            let line = format!("{label} (*)");
            if no_color {
                writeln!(writer, "{line}")?;
            } else {
                writeln!(writer, "{}", line.green())?;
            }
        } else {
            writeln!(writer, "{label}")?;
        }
        for child in &node.children {
            self.write_subtree(writer, child, level + 1, no_color)?;
        }
        Ok(())
    }
}

/// 相対パス（`./x` / `../x`）のコマンドは root_dir 基準に解決する
fn resolve_shell_command(root_dir: &Path, command: &str) -> String {
    if command.starts_with('/') {
        command.to_string()
    } else if command.starts_with("./") || command.starts_with("../") {
        format!("{}/{}", root_dir.display(), command)
    } else {
        command.to_string()
    }
}

fn epoch_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}
