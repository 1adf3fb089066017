use log::{debug, error};
use std::ffi::{CString, NulError};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{dup2, execv, fork, pipe, ForkResult, Pid};

use super::redirection::{flush_std_streams, RedirectionGuard};
use super::wait::wait_for_process;
use super::DispatchError;
use crate::shell::parser::ast::{Command as ShellCommand, Pipeline};
use crate::utils::path::PathResolver;

/// 内建命令派发接口
pub trait BuiltinDispatcher {
    fn is_builtin(&self, name: &str) -> bool;
    fn execute(
        &mut self,
        name: &str,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32;
}

/// 直接写标准流的描述符，不经过 std 的缓冲和锁（fork 出的子进程里也能安全使用）
struct RawStream(RawFd);

impl RawStream {
    fn stdout() -> Self {
        RawStream(STDOUT_FILENO)
    }

    fn stderr() -> Self {
        RawStream(STDERR_FILENO)
    }
}

impl Write for RawStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: 标准流描述符在进程生命周期内一直存在，重定向只会 dup2 替换它
        let fd = unsafe { BorrowedFd::borrow_raw(self.0) };
        nix::unistd::write(fd, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Executor {
    resolver: PathResolver,
}

impl Executor {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    pub fn execute(
        &self,
        pipeline: &Pipeline,
        builtins: &mut dyn BuiltinDispatcher,
    ) -> Result<i32, DispatchError> {
        match pipeline.stages.as_slice() {
            [] => Ok(0),
            [command] => self.execute_single(command, builtins),
            _ => self.execute_pipeline(pipeline, builtins),
        }
    }

    /// 在当前进程应用重定向后执行单条命令，返回时恢复描述符
    pub fn execute_single(
        &self,
        command: &ShellCommand,
        builtins: &mut dyn BuiltinDispatcher,
    ) -> Result<i32, DispatchError> {
        flush_std_streams();
        let guard = RedirectionGuard::acquire(&command.redirections);
        if !guard.is_valid() {
            let _ = writeln!(RawStream::stderr(), "{}", guard.error().unwrap_or_default());
            return Ok(1);
        }

        if builtins.is_builtin(&command.program) {
            debug!("执行内建命令: {:?}", command);
            let status = run_builtin(command, builtins);
            debug!("内建命令 {} 退出码: {}", command.program, status);
            return Ok(status);
        }

        let Some(path) = self.resolver.find_command_path(&command.program) else {
            debug!("找不到命令: {}", command.program);
            report_not_found(&command.program);
            return Ok(127);
        };

        debug!("执行外部命令: {} ({})", command.program, path.display());
        // SAFETY: shell 本身是单线程的，子进程只做 exec 或直接 _exit
        match unsafe { fork() }.map_err(DispatchError::Fork)? {
            ForkResult::Child => {
                reset_child_signals();
                exec_program(command, &path)
            }
            ForkResult::Parent { child } => {
                debug!("子进程 pid: {}", child);
                let status = wait_for_process(child)?;
                debug!("外部命令 {} 退出码: {}", command.program, status);
                Ok(status)
            }
        }
    }

    /// 为 N 个阶段建立 N-1 条管道并逐个 fork，整体退出码取最后一个阶段
    pub fn execute_pipeline(
        &self,
        pipeline: &Pipeline,
        builtins: &mut dyn BuiltinDispatcher,
    ) -> Result<i32, DispatchError> {
        if pipeline.is_empty() {
            return Ok(0);
        }
        let count = pipeline.stages.len();

        let mut pipes = Vec::with_capacity(count - 1);
        for _ in 1..count {
            pipes.push(pipe().map_err(DispatchError::Pipe)?);
        }
        debug!("执行管道: {} 个阶段, {} 条管道", count, pipes.len());

        flush_std_streams();
        let mut pids: Vec<Pid> = Vec::with_capacity(count);
        for (index, command) in pipeline.stages.iter().enumerate() {
            // SAFETY: 同上，子进程在 run_stage 里结束，不会回到这个循环
            match unsafe { fork() } {
                Ok(ForkResult::Child) => {
                    let pipes = std::mem::take(&mut pipes);
                    self.run_stage(index, command, pipes, builtins)
                }
                Ok(ForkResult::Parent { child }) => {
                    debug!("阶段 {} ({}) pid: {}", index, command.program, child);
                    pids.push(child);
                }
                Err(e) => {
                    error!("fork 失败: {}", e);
                    drop(pipes);
                    reap(&pids);
                    return Err(DispatchError::Fork(e));
                }
            }
        }

        // 父进程不持有任何一端，否则下游读不到 EOF
        drop(pipes);

        let mut last_status = 0;
        let mut failure = None;
        for pid in pids {
            match wait_for_process(pid) {
                Ok(status) => last_status = status,
                Err(e) => {
                    error!("{}", e);
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                debug!("管道退出码: {}", last_status);
                Ok(last_status)
            }
        }
    }

    fn run_stage(
        &self,
        index: usize,
        command: &ShellCommand,
        pipes: Vec<(OwnedFd, OwnedFd)>,
        builtins: &mut dyn BuiltinDispatcher,
    ) -> ! {
        reset_child_signals();
        if index > 0 {
            wire_or_exit(pipes[index - 1].0.as_raw_fd(), STDIN_FILENO);
        }
        if index < pipes.len() {
            wire_or_exit(pipes[index].1.as_raw_fd(), STDOUT_FILENO);
        }
        // 关闭继承来的所有管道端
        drop(pipes);

        // 子进程的描述符表随进程一起销毁，不需要恢复
        let guard = RedirectionGuard::acquire(&command.redirections);
        if !guard.is_valid() {
            let _ = writeln!(RawStream::stderr(), "{}", guard.error().unwrap_or_default());
            exit_child(1);
        }

        if builtins.is_builtin(&command.program) {
            let status = run_builtin(command, builtins);
            exit_child(status);
        }

        match self.resolver.find_command_path(&command.program) {
            Some(path) => exec_program(command, &path),
            None => {
                report_not_found(&command.program);
                exit_child(127)
            }
        }
    }
}

fn run_builtin(command: &ShellCommand, builtins: &mut dyn BuiltinDispatcher) -> i32 {
    let mut out = RawStream::stdout();
    let mut err = RawStream::stderr();
    builtins.execute(&command.program, &command.arguments, &mut out, &mut err)
}

fn report_not_found(program: &str) {
    let _ = writeln!(RawStream::stdout(), "{}: command not found", program);
}

fn wire_or_exit(fd: RawFd, target_fd: RawFd) {
    if let Err(e) = dup2(fd, target_fd) {
        let _ = writeln!(
            RawStream::stderr(),
            "failed to redirect file descriptor {}: {}",
            target_fd,
            e.desc()
        );
        exit_child(1);
    }
}

fn build_argv(command: &ShellCommand, path: &Path) -> Result<(CString, Vec<CString>), NulError> {
    let program = CString::new(path.as_os_str().as_bytes())?;
    let argv = std::iter::once(&command.program)
        .chain(&command.arguments)
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((program, argv))
}

/// 只在子进程里调用：exec 成功不返回，失败报告后以 1 退出
fn exec_program(command: &ShellCommand, path: &Path) -> ! {
    let reason = match build_argv(command, path) {
        Ok((program, argv)) => match execv(&program, &argv) {
            Ok(never) => match never {},
            Err(e) => e.desc().to_string(),
        },
        Err(e) => e.to_string(),
    };
    let _ = writeln!(RawStream::stderr(), "exec failed: {}", reason);
    exit_child(1)
}

// Rust 运行时忽略了 SIGPIPE，子进程要恢复默认处理，否则会跨 exec 继承
fn reset_child_signals() {
    // SAFETY: 恢复成默认处理，不安装任何处理函数
    let _ = unsafe { signal(Signal::SIGPIPE, SigHandler::SigDfl) };
}

fn exit_child(status: i32) -> ! {
    // SAFETY: 只在 fork 出的子进程里调用，不运行析构也不刷新父进程继承来的缓冲区
    unsafe { libc::_exit(status) }
}

// fork 中途失败时回收已经启动的阶段，忽略它们的状态
fn reap(pids: &[Pid]) {
    for &pid in pids {
        let _ = wait_for_process(pid);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::parser::ast::RedirectOp;
    use crate::shell::parser::{parse, tokenize};
    use crate::shell::testing::{
        fd_identity, fd_test_lock, is_closed, leave_free_fds, run_in_child,
    };
    use nix::errno::Errno;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// 测试用的内建命令：greet 写 stdout，fail 写 stderr 并返回 4
    #[derive(Default)]
    struct FakeBuiltins {
        calls: Vec<String>,
    }

    impl BuiltinDispatcher for FakeBuiltins {
        fn is_builtin(&self, name: &str) -> bool {
            matches!(name, "greet" | "fail")
        }

        fn execute(
            &mut self,
            name: &str,
            args: &[String],
            out: &mut dyn Write,
            err: &mut dyn Write,
        ) -> i32 {
            self.calls.push(name.to_string());
            match name {
                "greet" => {
                    let _ = writeln!(out, "hello{}", args.concat());
                    0
                }
                "fail" => {
                    let _ = writeln!(err, "boom");
                    4
                }
                _ => 1,
            }
        }
    }

    fn system_path() -> String {
        std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string())
    }

    fn make_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn executor_with(dir: &Path) -> Executor {
        let search_path = format!("{}:{}", dir.display(), system_path());
        Executor::new(PathResolver::with_search_path(search_path))
    }

    fn pipeline(line: &str) -> Pipeline {
        parse(&tokenize(line)).unwrap()
    }

    #[test]
    fn test_builtin_runs_in_process_with_redirection() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let before = fd_identity(STDOUT_FILENO);
        let executor = executor_with(dir.path());
        let mut builtins = FakeBuiltins::default();

        let command = ShellCommand::new("greet")
            .arg("!")
            .redirect(RedirectOp::StdoutTruncate, out.to_string_lossy());
        let status = executor.execute_single(&command, &mut builtins).unwrap();

        assert_eq!(status, 0);
        assert_eq!(builtins.calls, vec!["greet"]);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello!\n");
        assert_eq!(fd_identity(STDOUT_FILENO), before);
    }

    #[test]
    fn test_builtin_exit_code_is_returned() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        let executor = executor_with(dir.path());

        let command =
            ShellCommand::new("fail").redirect(RedirectOp::StderrTruncate, err.to_string_lossy());
        let status = executor
            .execute_single(&command, &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 4);
        assert_eq!(fs::read_to_string(&err).unwrap(), "boom\n");
    }

    #[test]
    fn test_redirection_failure_returns_one() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        let missing = dir.path().join("no-such-dir").join("out.txt");
        let executor = executor_with(dir.path());
        let mut builtins = FakeBuiltins::default();

        // 第一个重定向把错误信息收进文件，第二个失败
        let command = ShellCommand::new("greet")
            .redirect(RedirectOp::StderrTruncate, err.to_string_lossy())
            .redirect(RedirectOp::StdoutTruncate, missing.to_string_lossy());
        let status = executor.execute_single(&command, &mut builtins).unwrap();

        assert_eq!(status, 1);
        assert!(builtins.calls.is_empty());
        assert!(fs::read_to_string(&err).unwrap().is_empty());
    }

    #[test]
    fn test_command_not_found() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let executor = Executor::new(PathResolver::with_search_path(dir.path().to_string_lossy()));

        let command = ShellCommand::new("definitely-not-a-command")
            .redirect(RedirectOp::StdoutTruncate, out.to_string_lossy());
        let status = executor
            .execute_single(&command, &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 127);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "definitely-not-a-command: command not found\n"
        );
    }

    #[test]
    fn test_external_exit_status() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        make_script(dir.path(), "exit_three", "#!/bin/sh\nexit 3\n");
        make_script(dir.path(), "self_kill", "#!/bin/sh\nkill -9 $$\n");
        let executor = executor_with(dir.path());
        let mut builtins = FakeBuiltins::default();

        let status = executor
            .execute_single(&ShellCommand::new("exit_three"), &mut builtins)
            .unwrap();
        assert_eq!(status, 3);

        let status = executor
            .execute_single(&ShellCommand::new("self_kill"), &mut builtins)
            .unwrap();
        assert_eq!(status, 128 + 9);
    }

    #[test]
    fn test_external_receives_arguments_and_redirection() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        make_script(dir.path(), "show_args", "#!/bin/sh\necho \"$0|$1|$2\"\n");
        let out = dir.path().join("args.txt");
        let executor = executor_with(dir.path());

        let command = ShellCommand::new("show_args")
            .arg("one")
            .arg("two words")
            .redirect(RedirectOp::StdoutTruncate, out.to_string_lossy());
        let status = executor
            .execute_single(&command, &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 0);
        let content = fs::read_to_string(&out).unwrap();
        assert!(content.ends_with("|one|two words\n"), "{}", content);
    }

    #[test]
    fn test_two_stdout_redirections_last_wins() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        make_script(dir.path(), "say", "#!/bin/sh\necho said\n");
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let executor = executor_with(dir.path());

        let command = ShellCommand::new("say")
            .redirect(RedirectOp::StdoutTruncate, first.to_string_lossy())
            .redirect(RedirectOp::StdoutTruncate, second.to_string_lossy());
        executor
            .execute_single(&command, &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(fs::read_to_string(&first).unwrap(), "");
        assert_eq!(fs::read_to_string(&second).unwrap(), "said\n");
    }

    #[test]
    fn test_exec_failure_exits_with_one() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        make_script(dir.path(), "broken_exec", "#!/definitely/missing/interpreter\n");
        let err = dir.path().join("err.txt");
        let executor = executor_with(dir.path());

        let command = ShellCommand::new("broken_exec")
            .redirect(RedirectOp::StderrTruncate, err.to_string_lossy());
        let status = executor
            .execute_single(&command, &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 1);
        assert!(fs::read_to_string(&err).unwrap().starts_with("exec failed"));
    }

    #[test]
    fn test_pipeline_counts_bytes() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("count.txt");
        let executor = executor_with(dir.path());

        let line = format!("echo hello | wc -c > {}", out.display());
        let status = executor
            .execute(&pipeline(&line), &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "6");
    }

    #[test]
    fn test_pipeline_with_builtin_stage() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("upper.txt");
        let executor = executor_with(dir.path());
        let before = fd_identity(STDOUT_FILENO);

        let line = format!("greet | tr a-z A-Z | cat > {}", out.display());
        let status = executor
            .execute(&pipeline(&line), &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "HELLO\n");
        assert_eq!(fd_identity(STDOUT_FILENO), before);
    }

    #[test]
    fn test_pipeline_status_is_last_stage() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        make_script(dir.path(), "exit_five", "#!/bin/sh\nexit 5\n");
        let executor = executor_with(dir.path());
        let mut builtins = FakeBuiltins::default();

        let status = executor
            .execute(&pipeline("greet | exit_five"), &mut builtins)
            .unwrap();
        assert_eq!(status, 5);

        let status = executor
            .execute(&pipeline("exit_five | greet > /dev/null"), &mut builtins)
            .unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn test_pipeline_early_failures_are_hidden() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        make_script(dir.path(), "broken_exec", "#!/definitely/missing/interpreter\n");
        let out = dir.path().join("count.txt");
        let err = dir.path().join("err.txt");
        let executor = executor_with(dir.path());

        let line = format!(
            "broken_exec 2> {} | wc -c > {}",
            err.display(),
            out.display()
        );
        let status = executor
            .execute(&pipeline(&line), &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");
        assert!(fs::read_to_string(&err).unwrap().starts_with("exec failed"));

        let line = format!("no-such-command | wc -l > {}", out.display());
        let status = executor
            .execute(&pipeline(&line), &mut FakeBuiltins::default())
            .unwrap();
        assert_eq!(status, 0);
        // "command not found" 写进了管道
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "1");
    }

    #[test]
    fn test_pipeline_stage_redirection_overrides_pipe() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let captured = dir.path().join("captured.txt");
        let out = dir.path().join("count.txt");
        let executor = executor_with(dir.path());

        let line = format!(
            "greet > {} | wc -c > {}",
            captured.display(),
            out.display()
        );
        let status = executor
            .execute(&pipeline(&line), &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(fs::read_to_string(&captured).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "0");
    }

    #[test]
    fn test_stage_redirection_failure_exits_one() {
        let _lock = fd_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("out.txt");
        let executor = executor_with(dir.path());

        let line = format!("greet | cat > {}", missing.display());
        let status = executor
            .execute(&pipeline(&line), &mut FakeBuiltins::default())
            .unwrap();

        assert_eq!(status, 1);
    }

    #[test]
    fn test_empty_pipeline() {
        let executor = Executor::new(PathResolver::new());
        let status = executor
            .execute(&Pipeline::default(), &mut FakeBuiltins::default())
            .unwrap();
        assert_eq!(status, 0);
    }

    #[test]
    fn test_pipe_failure_is_dispatch_error() {
        let _lock = fd_test_lock();
        let executor = Executor::new(PathResolver::with_search_path("/definitely/missing"));
        let pipeline = pipeline("greet | greet | greet");

        // 只留三个空闲描述符：第一条管道能建，第二条失败
        let status = run_in_child(|| {
            let Some(free) = leave_free_fds(3) else {
                return 10;
            };
            let mut builtins = FakeBuiltins::default();
            match executor.execute_pipeline(&pipeline, &mut builtins) {
                Err(DispatchError::Pipe(Errno::EMFILE)) => {}
                _ => return 11,
            }
            if !builtins.calls.is_empty() {
                return 12;
            }
            if !free.iter().all(|&fd| is_closed(fd)) {
                return 13;
            }
            0
        });

        assert_eq!(status, 0);
    }
}
