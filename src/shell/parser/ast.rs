use libc::{STDERR_FILENO, STDOUT_FILENO};
use nix::fcntl::OFlag;
use std::os::fd::RawFd;

/// 重定向操作符，每个变体对应一个目标描述符和一种打开方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    StdoutTruncate, // > 1>
    StdoutAppend,   // >> 1>>
    StderrTruncate, // 2>
    StderrAppend,   // 2>>
}

impl RedirectOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            ">" | "1>" => Some(RedirectOp::StdoutTruncate),
            ">>" | "1>>" => Some(RedirectOp::StdoutAppend),
            "2>" => Some(RedirectOp::StderrTruncate),
            "2>>" => Some(RedirectOp::StderrAppend),
            _ => None,
        }
    }

    pub fn target_fd(self) -> RawFd {
        match self {
            RedirectOp::StdoutTruncate | RedirectOp::StdoutAppend => STDOUT_FILENO,
            RedirectOp::StderrTruncate | RedirectOp::StderrAppend => STDERR_FILENO,
        }
    }

    pub fn open_flags(self) -> OFlag {
        let mode = match self {
            RedirectOp::StdoutTruncate | RedirectOp::StderrTruncate => OFlag::O_TRUNC,
            RedirectOp::StdoutAppend | RedirectOp::StderrAppend => OFlag::O_APPEND,
        };
        OFlag::O_WRONLY | OFlag::O_CREAT | mode
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub operator: RedirectOp,
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub arguments: Vec<String>,
    pub redirections: Vec<Redirection>,
}

#[cfg(test)]
impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn redirect(mut self, operator: RedirectOp, filename: impl Into<String>) -> Self {
        self.redirections.push(Redirection {
            operator,
            filename: filename.into(),
        });
        self
    }
}

/// 一行输入解析后的管道，stages 按从左到右的执行顺序排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Command>,
}

impl Pipeline {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
