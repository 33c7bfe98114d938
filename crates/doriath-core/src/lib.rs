//! doriath-core — Dockerビルドグラフの中核
//!
//! 設定ファイルの読み込み（環境変数展開 → テンプレート展開 → YAMLデコード）、
//! イメージ参照の正規化、Dockerfileの親イメージ検査、そしてビルドツリーの
//! 構築・dirty伝播・走査を提供します。
//!
//! レジストリとコンテナエンジンへのアクセスはそれぞれ
//! `doriath_registry::TagProbe` / `doriath_engine::ContainerEngine` 経由で、
//! テストではモックに差し替えられます。

pub mod config;
pub mod dockerfile;
pub mod error;
pub mod image;
pub mod tree;

pub use config::{read_build_tree_from_file, read_build_tree_from_str};
pub use error::{Result, TreeError};
pub use image::ImageInfo;
pub use tree::{BuildNode, BuildRoot, BuildTree, Credential, PrepareOptions};
