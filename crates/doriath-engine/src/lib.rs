//! コンテナエンジンコラボレータ
//!
//! ビルドツリーが必要とする操作（build / push / pull / rmi / login）を
//! [`ContainerEngine`] trait として切り出し、`docker` コマンドへの
//! シェルアウトで実装します。ユーザー定義のフックは [`shell::run_shell`]
//! で `sh -c` 経由で実行します。

pub mod docker;
pub mod error;
pub mod retry;
pub mod shell;

pub use docker::{ContainerEngine, DockerCli};
pub use error::{EngineError, Result};
pub use retry::retry_with_fixed_delay;
pub use shell::run_shell;
