//! タグ存在チェックとBearerチャレンジフロー

use crate::error::{RegistryError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// dockerhub論理レジストリのデフォルトURL
///
/// 歴史的経緯で registry-1.docker.io と揺れがあるため、Docker Hub を
/// 使う場合は設定ファイル側で registry を明示すること。
pub const DEFAULT_REGISTRY: &str = "https://registry.hub.docker.com";

/// findlatest が対応しているレジストリ（GCRのみ）
const GCR_REGISTRY: &str = "https://gcr.io";

/// リクエストのタイムアウト秒数
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// レジストリへのリクエストに使う認証情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryCredential {
    /// ベースURL。空なら [`DEFAULT_REGISTRY`] を使用
    pub registry: String,
    pub username: String,
    pub password: String,
}

/// タグ存在プローブ
///
/// dirtyチェックが参照する唯一のインターフェース。テストではモック実装に
/// 差し替えます。
pub trait TagProbe {
    /// レジストリ上に `short_name:tag` が存在するかを返す
    fn check_tag_exists(
        &self,
        short_name: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> Result<bool>;
}

/// Www-Authenticate チャレンジのパース結果
#[derive(Debug, Default, PartialEq, Eq)]
struct AuthChallenge {
    scheme: String,
    realm: String,
    service: String,
    scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TagListResponse {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GcrTagList {
    #[serde(default)]
    manifest: HashMap<String, GcrManifest>,
}

#[derive(Debug, Deserialize)]
struct GcrManifest {
    #[serde(default)]
    tag: Vec<String>,
}

/// OCI distribution v2 のタグ一覧エンドポイントを叩くブロッキングクライアント
pub struct RegistryClient {
    client: reqwest::blocking::Client,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("doriath/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");
        Self { client }
    }

    /// タグがレジストリに存在するかを確認
    ///
    /// 1. 認証なしで tags/list を叩き、401 のチャレンジを受け取る
    /// 2. realm に Basic 認証でトークンを要求する
    /// 3. トークン付きで tags/list を再リクエストし、タグ一覧を調べる
    pub fn check_tag_exists(
        &self,
        short_name: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> Result<bool> {
        let url = tag_list_url(short_name, credential);
        let challenge = self.challenge(&url)?;
        let token = self.request_token(short_name, &challenge, credential)?;

        debug!(url = %url, tag = %tag, "checking tag existence");
        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", challenge.scheme, token),
            )
            .send()
            .map_err(|e| RegistryError::Transport {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // リポジトリ自体が存在しない場合はタグなし扱い
            return Ok(false);
        }
        if !status.is_success() {
            return Err(RegistryError::Protocol {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|e| RegistryError::Transport {
            url: url.clone(),
            source: e,
        })?;
        let tag_list: TagListResponse =
            serde_json::from_str(&body).map_err(|_| RegistryError::Decode { body })?;
        Ok(tag_list.tags.iter().any(|t| t == tag))
    }

    /// latest と同じマニフェストを持つ別タグを返す
    ///
    /// GCR のマニフェスト形式にのみ対応しています。
    pub fn find_latest_tag(
        &self,
        short_name: &str,
        credential: &RegistryCredential,
    ) -> Result<String> {
        if credential.registry.trim_end_matches('/') != GCR_REGISTRY {
            return Err(RegistryError::NotSupported {
                registry: credential.registry.clone(),
            });
        }
        let url = tag_list_url(short_name, credential);
        let challenge = self.challenge(&url)?;
        let token = self.request_token(short_name, &challenge, credential)?;

        let response = self
            .client
            .get(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", challenge.scheme, token),
            )
            .header(
                reqwest::header::ACCEPT,
                "application/vnd.docker.distribution.manifest.v2+json",
            )
            .send()
            .map_err(|e| RegistryError::Transport {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Protocol {
                url,
                status: status.as_u16(),
            });
        }
        let body = response.text().map_err(|e| RegistryError::Transport {
            url: url.clone(),
            source: e,
        })?;
        let tag_list: GcrTagList =
            serde_json::from_str(&body).map_err(|_| RegistryError::Decode { body })?;
        pick_latest_alias(&tag_list)
    }

    /// タグが現れるまでポーリングする
    ///
    /// プローブの一時的なエラーは「まだ存在しない」として扱い、壁時計で
    /// timeout を超えたら [`RegistryError::WaitTimeout`] を返します。
    pub fn wait_image_exists(
        &self,
        short_name: &str,
        tag: &str,
        credential: &RegistryCredential,
        timeout: Duration,
        interval: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            match self.check_tag_exists(short_name, tag, credential) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!(error = %e, "probe failed, treating as not-yet"),
            }
            if start.elapsed() > timeout {
                return Err(RegistryError::WaitTimeout);
            }
            debug!(short_name = %short_name, tag = %tag, "waiting for image to exist");
            std::thread::sleep(interval);
        }
    }

    /// 認証なしの最初のリクエストを送り、チャレンジをパースする
    fn challenge(&self, url: &str) -> Result<AuthChallenge> {
        debug!(url = %url, "sending challenge request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| RegistryError::Transport {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::UNAUTHORIZED {
            return Err(RegistryError::Protocol {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let header = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        parse_www_authenticate(header)
    }

    /// realm からトークンを取得する
    fn request_token(
        &self,
        short_name: &str,
        challenge: &AuthChallenge,
        credential: &RegistryCredential,
    ) -> Result<String> {
        let scope = if challenge.scope.is_empty() {
            format!("repository:{short_name}:*")
        } else {
            challenge.scope.clone()
        };

        debug!(realm = %challenge.realm, service = %challenge.service, scope = %scope, "requesting token");
        let response = self
            .client
            .get(&challenge.realm)
            .query(&[
                ("service", challenge.service.as_str()),
                ("scope", scope.as_str()),
            ])
            .basic_auth(&credential.username, Some(&credential.password))
            .send()
            .map_err(|e| RegistryError::Transport {
                url: challenge.realm.clone(),
                source: e,
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| RegistryError::Transport {
            url: challenge.realm.clone(),
            source: e,
        })?;
        if status != reqwest::StatusCode::OK {
            return Err(RegistryError::Auth {
                status: status.as_u16(),
                body,
            });
        }
        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|_| RegistryError::Decode { body })?;
        Ok(token.token)
    }
}

impl TagProbe for RegistryClient {
    fn check_tag_exists(
        &self,
        short_name: &str,
        tag: &str,
        credential: &RegistryCredential,
    ) -> Result<bool> {
        RegistryClient::check_tag_exists(self, short_name, tag, credential)
    }
}

/// tags/list エンドポイントのURLを組み立てる
fn tag_list_url(short_name: &str, credential: &RegistryCredential) -> String {
    let registry = if credential.registry.is_empty() {
        DEFAULT_REGISTRY
    } else {
        credential.registry.as_str()
    };
    format!("{registry}/v2/{short_name}/tags/list")
}

/// `<scheme> k1="v1",k2="v2",...` 形式のチャレンジヘッダをパースする
fn parse_www_authenticate(header: &str) -> Result<AuthChallenge> {
    let Some((scheme, params)) = header.split_once(' ') else {
        return Err(RegistryError::InvalidAuthHeader {
            header: header.to_string(),
        });
    };
    let mut challenge = AuthChallenge {
        scheme: scheme.to_string(),
        ..Default::default()
    };
    for segment in params.split(',') {
        let Some((key, value)) = segment.split_once('=') else {
            return Err(RegistryError::InvalidAuthHeader {
                header: header.to_string(),
            });
        };
        let value = value.trim_matches('"').to_string();
        match key.trim() {
            "realm" => challenge.realm = value,
            "service" => challenge.service = value,
            "scope" => challenge.scope = value,
            _ => {}
        }
    }
    Ok(challenge)
}

/// latest を含むマニフェストから latest 以外のタグを選ぶ
fn pick_latest_alias(tag_list: &GcrTagList) -> Result<String> {
    for manifest in tag_list.manifest.values() {
        if manifest.tag.iter().any(|t| t == "latest") {
            if let Some(tag) = manifest.tag.iter().find(|t| *t != "latest") {
                return Ok(tag.clone());
            }
        }
    }
    Err(RegistryError::LatestTagNotFound)
}
