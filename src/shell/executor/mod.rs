#[allow(clippy::module_inception)]
mod executor;
mod redirection;
mod wait;

use nix::errno::Errno;
use nix::unistd::Pid;
use thiserror::Error;

pub use executor::{BuiltinDispatcher, Executor};

/// 本次派发无法继续的系统级错误，不能用退出码表示
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pipe failed: {0}")]
    Pipe(#[source] Errno),
    #[error("fork failed: {0}")]
    Fork(#[source] Errno),
    #[error("waitpid failed for pid {pid}: {source}")]
    Wait {
        pid: Pid,
        #[source]
        source: Errno,
    },
}
