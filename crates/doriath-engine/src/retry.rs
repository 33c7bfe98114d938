//! 固定間隔リトライ

use crate::error::Result;
use std::time::Duration;

/// 固定間隔で最大 `max_attempts` 回まで処理をリトライする
///
/// 成功した時点で打ち切り、最後まで失敗した場合は最後のエラーを返します。
pub fn retry_with_fixed_delay<F>(delay: Duration, max_attempts: u32, mut f: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let mut last_error = None;
    for attempt in 1..=max_attempts {
        match f() {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
        if attempt < max_attempts {
            std::thread::sleep(delay);
        }
    }
    match last_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
