//! イメージ参照のパースと名前の正規化
//!
//! `repo[:tag]` 形式の参照を分解し、単一セグメント名には `library/` を
//! 補います。レジストリ論理名は先頭セグメント（2セグメント以下なら
//! `dockerhub`）です。

use crate::error::{Result, TreeError};

/// 2セグメント以下の参照が属する論理レジストリ名
pub const DEFAULT_REGISTRY_NAME: &str = "dockerhub";

/// パース済みのイメージ参照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// 正規化済みのフルネーム（レジストリ部を含む）
    pub full_name: String,
    /// tags/list のURLに使う、レジストリホストを除いた名前
    pub short_name: String,
    /// 認証情報の選択に使う論理レジストリ名
    pub registry_name: String,
    pub tag: String,
}

impl ImageInfo {
    /// `repo[:tag]` をパースする
    ///
    /// タグ省略時は `latest`。コロンが2つ以上、または名前が4セグメント
    /// 以上なら不正です。
    pub fn parse(reference: &str) -> Result<Self> {
        let segments: Vec<&str> = reference.split(':').collect();
        if segments.len() > 2 {
            return Err(TreeError::InvalidImageName {
                name: reference.to_string(),
            });
        }
        let tag = segments.get(1).copied().unwrap_or("latest").to_string();
        let full_name = format_docker_name(segments[0]);

        let name_segments: Vec<&str> = full_name.split('/').collect();
        let (registry_name, short_name) = match name_segments.len() {
            0..=2 => (DEFAULT_REGISTRY_NAME.to_string(), full_name.clone()),
            3 => (
                name_segments[0].to_string(),
                name_segments[1..].join("/"),
            ),
            _ => {
                return Err(TreeError::InvalidImageName {
                    name: reference.to_string(),
                });
            }
        };

        Ok(Self {
            full_name,
            short_name,
            registry_name,
            tag,
        })
    }
}

/// 単一セグメントの名前に `library/` を補う
pub fn format_docker_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{name}")
    }
}

/// 先頭の `library/` を1つだけ無視して名前を比較する
pub fn compare_docker_name(a: &str, b: &str) -> bool {
    a.strip_prefix("library/").unwrap_or(a) == b.strip_prefix("library/").unwrap_or(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_segment() {
        let info = ImageInfo::parse("ubuntu").unwrap();
        assert_eq!(info.full_name, "library/ubuntu");
        assert_eq!(info.short_name, "library/ubuntu");
        assert_eq!(info.registry_name, "dockerhub");
        assert_eq!(info.tag, "latest");
    }

    #[test]
    fn test_parse_roundtrip_with_library_prefix() {
        // parse("repo") と parse("library/repo") は同じ結果になる
        assert_eq!(
            ImageInfo::parse("redis").unwrap(),
            ImageInfo::parse("library/redis").unwrap()
        );
    }

    #[test]
    fn test_parse_two_segments_with_tag() {
        let info = ImageInfo::parse("human/aragorn:3.1.4").unwrap();
        assert_eq!(info.full_name, "human/aragorn");
        assert_eq!(info.short_name, "human/aragorn");
        assert_eq!(info.registry_name, "dockerhub");
        assert_eq!(info.tag, "3.1.4");
    }

    #[test]
    fn test_parse_three_segments() {
        let info = ImageInfo::parse("gcr.io/project/app:v1").unwrap();
        assert_eq!(info.full_name, "gcr.io/project/app");
        assert_eq!(info.short_name, "project/app");
        assert_eq!(info.registry_name, "gcr.io");
        assert_eq!(info.tag, "v1");
    }

    #[test]
    fn test_parse_too_many_segments() {
        assert!(matches!(
            ImageInfo::parse("a/b/c/d"),
            Err(TreeError::InvalidImageName { .. })
        ));
    }

    #[test]
    fn test_parse_too_many_colons() {
        assert!(matches!(
            ImageInfo::parse("ubuntu:16.04:extra"),
            Err(TreeError::InvalidImageName { .. })
        ));
    }

    #[test]
    fn test_format_docker_name_is_stable() {
        // 正規化は冪等
        let once = format_docker_name("ubuntu");
        assert_eq!(once, "library/ubuntu");
        assert_eq!(format_docker_name(&once), once);
        assert_eq!(format_docker_name(""), "");
    }

    #[test]
    fn test_compare_docker_name() {
        assert!(compare_docker_name("ubuntu", "library/ubuntu"));
        assert!(compare_docker_name("library/ubuntu", "ubuntu"));
        assert!(compare_docker_name("library/ubuntu", "library/ubuntu"));
        assert!(!compare_docker_name("library/ubuntu", "library/alpine"));
        assert!(!compare_docker_name("gcr.io/a/b", "a/b"));
    }
}
