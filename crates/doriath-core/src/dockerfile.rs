//! Dockerfileの親イメージ検査

use crate::error::{Result, TreeError};
use crate::image::ImageInfo;
use std::fs;
use std::path::Path;

/// Dockerfileから親イメージ参照を取り出す
///
/// 行頭の `FROM`（大文字小文字を区別しない）に続く最初のトークンを
/// イメージ参照として扱い、複数ある場合は最後のものが勝ちます。
/// `FROM` 行がなければ `None` を返します。
pub fn extract_parent_image(path: &Path) -> Result<Option<ImageInfo>> {
    let content = fs::read_to_string(path).map_err(|e| TreeError::DockerfileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut parent = None;
    for line in content.lines() {
        if let Some(rest) = from_directive(line) {
            if let Some(reference) = rest.split_whitespace().next() {
                parent = Some(ImageInfo::parse(reference)?);
            }
        }
    }
    Ok(parent)
}

/// `FROM ` で始まる行なら残りを返す
fn from_directive(line: &str) -> Option<&str> {
    let head = line.get(..4)?;
    if !head.eq_ignore_ascii_case("from") {
        return None;
    }
    let rest = &line[4..];
    if !rest.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    Some(rest.trim_start())
}
