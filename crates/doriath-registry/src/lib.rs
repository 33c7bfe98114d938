//! Docker/OCIレジストリクライアント
//!
//! OCI distribution v2 の tags/list エンドポイントに対する
//! Bearerチャレンジ認証フロー（401 → トークン取得 → 再リクエスト）を
//! 実装します。ビルドツリー側からは [`TagProbe`] trait 経由で参照されます。

pub mod client;
pub mod error;

pub use client::{DEFAULT_REGISTRY, RegistryClient, RegistryCredential, TagProbe};
pub use error::{RegistryError, Result};
