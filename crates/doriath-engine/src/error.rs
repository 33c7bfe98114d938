use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "docker コマンドが見つかりません\nヒント:\n  • docker がインストールされているか確認してください\n  • PATH に docker が含まれているか確認してください"
    )]
    DockerNotFound,

    #[error("コマンドを起動できません: {command}\n理由: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("docker {operation} に失敗しました: {detail}")]
    CommandFailed { operation: String, detail: String },

    #[error("フックの実行に失敗しました: {command}")]
    HookFailed { command: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
