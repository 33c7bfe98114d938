use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("レジストリへのリクエストに失敗しました: {url}\n理由: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("予期しないステータスコードです: {url} (status {status})")]
    Protocol { url: String, status: u16 },

    #[error("Www-Authenticate ヘッダが不正です: {header:?}")]
    InvalidAuthHeader { header: String },

    #[error("トークンの取得に失敗しました (status {status}): {body}")]
    Auth { status: u16, body: String },

    #[error("レスポンスをデコードできません: {body}")]
    Decode { body: String },

    #[error("サポートされていないレジストリです: {registry:?}")]
    NotSupported { registry: String },

    #[error("latest と同じマニフェストを持つタグが見つかりません")]
    LatestTagNotFound,

    #[error("タイムアウトを超過しました")]
    WaitTimeout,
}

pub type Result<T> = std::result::Result<T, RegistryError>;
