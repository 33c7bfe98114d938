use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("設定ファイルを読み込めません: {path}\n理由: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("テンプレート展開エラー: {0}")]
    ConfigTemplate(String),

    #[error("設定ファイルをデコードできません: {0}")]
    ConfigDecode(#[from] serde_yaml::Error),

    #[error("変数ファイルを読み込めません: {path}\n理由: {message}")]
    VariableFile { path: PathBuf, message: String },

    #[error("パスワードファイルを読み込めません: {path}")]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name:?} の依存先が見つかりません: {depend:?}")]
    DependencyMissing { name: String, depend: String },

    #[error("循環依存が検出されました: {name:?}")]
    CyclicDependency { name: String },

    #[error(
        "{name:?} の依存イメージが一致しません: 設定では {expected:?} ですが Dockerfile では {actual:?} です"
    )]
    MismatchDependencyImage {
        name: String,
        expected: String,
        actual: String,
    },

    #[error(
        "{name:?} の依存タグが一致しません (親は {parent:?}): 設定では {expected:?} ですが Dockerfile では {actual:?} です"
    )]
    MismatchDependencyTag {
        name: String,
        parent: String,
        expected: String,
        actual: String,
    },

    #[error("{registry_name:?} の認証情報が見つかりません")]
    MissingCredential { registry_name: String },

    #[error("provided イメージ {name:?} のタグ {tag:?} がレジストリに存在しません")]
    MissingTag { tag: String, name: String },

    #[error("イメージの更新が必要ですが古いタグのままです: {name:?}")]
    ImageTagOutdated { name: String },

    #[error("不正なイメージ名です: {name:?}")]
    InvalidImageName { name: String },

    #[error("Dockerfile を読み込めません: {path}")]
    DockerfileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] doriath_registry::RegistryError),

    #[error(transparent)]
    Engine(#[from] doriath_engine::EngineError),
}

pub type Result<T> = std::result::Result<T, TreeError>;
