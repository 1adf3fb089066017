use std::io::{self, Write};
use std::os::fd::RawFd;

use log::debug;
use nix::fcntl::{fcntl, open, FcntlArg};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2};

use crate::shell::parser::ast::Redirection;

#[derive(Debug, Clone, Copy)]
struct SavedFd {
    target_fd: RawFd,
    backup_fd: RawFd,
}

/// 作用域内的文件描述符重定向
///
/// 构造时按顺序应用每个重定向，同一个目标描述符只备份第一次；任何一步失败都会
/// 立即恢复已应用的部分，描述符表回到构造前的样子。析构（或显式 [`restore`]）
/// 时按相反顺序把备份 dup2 回去并关闭备份，可重复调用。
///
/// [`restore`]: RedirectionGuard::restore
#[derive(Debug)]
pub struct RedirectionGuard {
    saved_fds: Vec<SavedFd>,
    error: Option<String>,
}

impl RedirectionGuard {
    pub fn acquire(redirections: &[Redirection]) -> Self {
        let mut guard = Self {
            saved_fds: Vec::new(),
            error: None,
        };
        for redirection in redirections {
            if let Err(message) = guard.apply(redirection) {
                debug!("重定向失败: {}", message);
                guard.error = Some(message);
                guard.restore();
                break;
            }
        }
        guard
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn apply(&mut self, redirection: &Redirection) -> Result<(), String> {
        let target_fd = redirection.operator.target_fd();

        if self.find_backup_fd(target_fd).is_none() {
            let backup_fd = fcntl(target_fd, FcntlArg::F_DUPFD_CLOEXEC(0)).map_err(|e| {
                format!("failed to save file descriptor {}: {}", target_fd, e.desc())
            })?;
            self.saved_fds.push(SavedFd {
                target_fd,
                backup_fd,
            });
        }

        let redirected_fd = open(
            redirection.filename.as_str(),
            redirection.operator.open_flags(),
            Mode::from_bits_truncate(0o644),
        )
        .map_err(|e| format!("failed to open '{}': {}", redirection.filename, e.desc()))?;

        let result = dup2(redirected_fd, target_fd);
        let _ = close(redirected_fd);
        result.map_err(|e| {
            format!("failed to redirect file descriptor {}: {}", target_fd, e.desc())
        })?;

        debug!(
            "重定向 fd {} -> {} ({:?})",
            target_fd, redirection.filename, redirection.operator
        );
        Ok(())
    }

    pub fn restore(&mut self) {
        if self.saved_fds.is_empty() {
            return;
        }

        for saved in self.saved_fds.drain(..).rev() {
            let _ = dup2(saved.backup_fd, saved.target_fd);
            let _ = close(saved.backup_fd);
        }
    }

    fn find_backup_fd(&self, target_fd: RawFd) -> Option<RawFd> {
        self.saved_fds
            .iter()
            .find(|saved| saved.target_fd == target_fd)
            .map(|saved| saved.backup_fd)
    }
}

impl Drop for RedirectionGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// 在改动描述符之前把 std 缓冲区里属于原目标的内容写出去
pub(crate) fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}
