use log::debug;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use super::DispatchError;

/// 把 wait 状态换算成 shell 退出码：正常退出取退出值，被信号终止为 128 + 信号值，其余为 1
pub fn exit_code(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _core_dumped) => 128 + signal as i32,
        _ => 1,
    }
}

/// 阻塞等待子进程结束，EINTR 时重试
pub fn wait_for_process(pid: Pid) -> Result<i32, DispatchError> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                debug!("子进程 {} 结束: {:?}", pid, status);
                return Ok(exit_code(status));
            }
            Err(Errno::EINTR) => continue,
            Err(source) => return Err(DispatchError::Wait { pid, source }),
        }
    }
}
