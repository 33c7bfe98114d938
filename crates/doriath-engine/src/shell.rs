//! ユーザー定義フックの実行

use crate::error::{EngineError, Result};
use std::process::Command;
use tracing::debug;

/// コマンド文字列を `sh -c` で実行する
///
/// 標準入出力は引き継ぐので、フックの出力はそのまま端末に流れます。
pub fn run_shell(command: &str) -> Result<()> {
    debug!(command = %command, "running shell hook");
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|e| EngineError::Spawn {
            command: command.to_string(),
            source: e,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(EngineError::HookFailed {
            command: command.to_string(),
        })
    }
}
