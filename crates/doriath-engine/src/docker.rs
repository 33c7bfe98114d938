//! dockerコマンドのラッパー

use crate::error::{EngineError, Result};
use crate::retry::retry_with_fixed_delay;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// rmi リトライの待機秒数と回数
const RMI_RETRY_DELAY_SECS: u64 = 5;
const RMI_RETRY_ATTEMPTS: u32 = 20;

/// ビルドツリーが必要とするコンテナエンジン操作
///
/// テストではモック実装に差し替えます。
pub trait ContainerEngine {
    /// エンジンが利用可能か確認する
    fn detect(&self) -> Result<()>;

    /// レジストリにログインする。hostが空ならデフォルトレジストリ
    fn login(&self, host: &str, username: &str, password: &str) -> Result<()>;

    /// `build_root` をコンテキストに `name:tag` をビルドする
    fn build(&self, name: &str, tag: &str, build_root: &Path) -> Result<()>;

    /// `name:tag` をプッシュする。platformsが指定されていれば
    /// buildx によるマルチプラットフォームビルド＆プッシュになる
    fn push(&self, name: &str, tag: &str, build_root: &Path, platforms: &[String]) -> Result<()>;

    /// ローカルに存在しなければイメージを取得する
    fn pull(&self, image: &str) -> Result<()>;

    /// イメージがローカルに存在するか確認する
    fn image_exists_locally(&self, image: &str) -> Result<bool>;

    /// `name:tag` をローカルから削除する
    fn remove_image(&self, name: &str, tag: &str) -> Result<()>;

    /// 削除をリトライ付きで試みる。「No such image」は成功扱い
    fn try_remove_image(&self, name: &str, tag: &str) -> Result<()>;
}

/// `docker` バイナリへのシェルアウト実装
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerCli;

impl DockerCli {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerEngine for DockerCli {
    fn detect(&self) -> Result<()> {
        // デーモンに接続せずバイナリの存在だけを確認する
        let status = Command::new("docker")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|_| EngineError::DockerNotFound)?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::DockerNotFound)
        }
    }

    fn login(&self, host: &str, username: &str, password: &str) -> Result<()> {
        let mut cmd = Command::new("docker");
        cmd.args(["login", "-u", username, "-p", password]);
        if !host.is_empty() {
            cmd.arg(host);
        }
        run_captured(cmd, "login")
    }

    fn build(&self, name: &str, tag: &str, build_root: &Path) -> Result<()> {
        debug!(name = %name, tag = %tag, build_root = %build_root.display(), "docker build");
        let mut cmd = Command::new("docker");
        cmd.args(["build", "-t", &format!("{name}:{tag}")])
            .arg(build_root);
        run_inherited(cmd, "build")
    }

    fn push(&self, name: &str, tag: &str, build_root: &Path, platforms: &[String]) -> Result<()> {
        if platforms.is_empty() {
            let mut cmd = Command::new("docker");
            cmd.args(["push", &format!("{name}:{tag}")]);
            return run_inherited(cmd, "push");
        }
        // マルチプラットフォームは buildx でビルドしながらプッシュする
        debug!(name = %name, tag = %tag, platforms = ?platforms, "docker buildx build --push");
        let mut cmd = Command::new("docker");
        cmd.args([
            "buildx",
            "build",
            "--platform",
            &platforms.join(","),
            "-t",
            &format!("{name}:{tag}"),
            "--push",
        ])
        .arg(build_root);
        run_inherited(cmd, "buildx build --push")
    }

    fn pull(&self, image: &str) -> Result<()> {
        if self.image_exists_locally(image)? {
            return Ok(());
        }
        let mut cmd = Command::new("docker");
        cmd.args(["pull", image]);
        run_inherited(cmd, "pull")
    }

    fn image_exists_locally(&self, image: &str) -> Result<bool> {
        let output = Command::new("docker")
            .args(["images", "-q", image])
            .output()
            .map_err(|e| EngineError::Spawn {
                command: format!("docker images -q {image}"),
                source: e,
            })?;
        if !output.status.success() {
            return Err(EngineError::CommandFailed {
                operation: "images".to_string(),
                detail: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(!output.stdout.is_empty())
    }

    fn remove_image(&self, name: &str, tag: &str) -> Result<()> {
        let mut cmd = Command::new("docker");
        cmd.args(["rmi", &format!("{name}:{tag}")]);
        run_inherited(cmd, "rmi")
    }

    fn try_remove_image(&self, name: &str, tag: &str) -> Result<()> {
        retry_with_fixed_delay(
            Duration::from_secs(RMI_RETRY_DELAY_SECS),
            RMI_RETRY_ATTEMPTS,
            || {
                let output = Command::new("docker")
                    .args(["rmi", &format!("{name}:{tag}")])
                    .output()
                    .map_err(|e| EngineError::Spawn {
                        command: format!("docker rmi {name}:{tag}"),
                        source: e,
                    })?;
                if output.status.success() {
                    return Ok(());
                }
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                if stderr.contains("No such image") {
                    return Ok(());
                }
                Err(EngineError::CommandFailed {
                    operation: "rmi".to_string(),
                    detail: stderr,
                })
            },
        )
    }
}

/// 標準入出力を引き継いでコマンドを実行する（build/push/pullの進捗表示用）
fn run_inherited(mut cmd: Command, operation: &str) -> Result<()> {
    let status = cmd.status().map_err(|e| EngineError::Spawn {
        command: format!("docker {operation}"),
        source: e,
    })?;
    if status.success() {
        Ok(())
    } else {
        Err(EngineError::CommandFailed {
            operation: operation.to_string(),
            detail: status.to_string(),
        })
    }
}

/// stderr をキャプチャしてコマンドを実行する（静かな操作用）
fn run_captured(mut cmd: Command, operation: &str) -> Result<()> {
    let output = cmd
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| EngineError::Spawn {
            command: format!("docker {operation}"),
            source: e,
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(EngineError::CommandFailed {
            operation: operation.to_string(),
            detail: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
