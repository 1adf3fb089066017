use log::{debug, warn};
use std::env;
use std::io::{self, Write};
use std::path::Path;

use crate::shell::executor::BuiltinDispatcher;
use crate::shell::history::HistoryManager;
use crate::utils::path::PathResolver;

pub const BUILTIN_NAMES: [&str; 6] = ["cd", "echo", "exit", "history", "pwd", "type"];

/// 在 shell 进程内执行的命令
pub struct BuiltinRegistry {
    resolver: PathResolver,
    history: HistoryManager,
    exit_requested: bool,
}

impl BuiltinRegistry {
    pub fn new(resolver: PathResolver, history: HistoryManager) -> Self {
        Self {
            resolver,
            history,
            exit_requested: false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        BUILTIN_NAMES.into_iter()
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryManager {
        &mut self.history
    }

    fn builtin_cd(&mut self, args: &[String], out: &mut dyn Write) -> io::Result<i32> {
        let target = args.first().map(|s| s.as_str()).unwrap_or("~");
        let target = shellexpand::tilde(target);
        match env::set_current_dir(&*target) {
            Ok(()) => Ok(0),
            Err(e) => {
                debug!("cd 失败: {}: {}", target, e);
                writeln!(out, "cd: {}: No such file or directory", target)?;
                Ok(1)
            }
        }
    }

    fn builtin_echo(&mut self, args: &[String], out: &mut dyn Write) -> io::Result<i32> {
        writeln!(out, "{}", args.join(" "))?;
        Ok(0)
    }

    fn builtin_pwd(&mut self, out: &mut dyn Write) -> io::Result<i32> {
        let current_dir = env::current_dir()?;
        writeln!(out, "{}", current_dir.display())?;
        Ok(0)
    }

    fn builtin_type(
        &mut self,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<i32> {
        let Some(name) = args.first() else {
            writeln!(err, "type: missing argument")?;
            return Ok(1);
        };

        if self.is_builtin(name) {
            writeln!(out, "{} is a shell builtin", name)?;
            return Ok(0);
        }

        match self.resolver.find_command_path(name) {
            Some(path) => {
                writeln!(out, "{} is {}", name, path.display())?;
                Ok(0)
            }
            None => {
                writeln!(out, "{}: not found", name)?;
                Ok(1)
            }
        }
    }

    fn builtin_history(
        &mut self,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<i32> {
        let flag = args.first().map(String::as_str);
        if let Some(flag @ ("-r" | "-w" | "-a")) = flag {
            let Some(file) = args.get(1) else {
                writeln!(err, "history: {} requires a file argument", flag)?;
                return Ok(1);
            };
            let path = Path::new(file);
            let result = match flag {
                "-r" => self.history.read_from_file(path),
                "-w" => self.history.write_to_file(path),
                _ => self.history.append_session_to_file(path),
            };
            if let Err(e) = result {
                writeln!(err, "history: {}: {}", file, e)?;
                return Ok(1);
            }
            return Ok(0);
        }

        let limit = match flag {
            None => None,
            Some(token) => match token.parse::<usize>() {
                Ok(limit) => Some(limit),
                Err(_) => {
                    writeln!(err, "history: invalid numeric argument")?;
                    return Ok(1);
                }
            },
        };
        self.history.print(out, limit)?;
        Ok(0)
    }

    fn builtin_exit(&mut self, args: &[String]) -> io::Result<i32> {
        if args.first().map_or(true, |code| code == "0") {
            self.exit_requested = true;
        }
        Ok(0)
    }
}

impl BuiltinDispatcher for BuiltinRegistry {
    fn is_builtin(&self, name: &str) -> bool {
        BUILTIN_NAMES.contains(&name)
    }

    fn execute(
        &mut self,
        name: &str,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32 {
        let result = match name {
            "cd" => self.builtin_cd(args, out),
            "echo" => self.builtin_echo(args, out),
            "pwd" => self.builtin_pwd(out),
            "type" => self.builtin_type(args, out, err),
            "history" => self.builtin_history(args, out, err),
            "exit" => self.builtin_exit(args),
            _ => return 1,
        };

        match result {
            Ok(status) => status,
            Err(e) => {
                warn!("内建命令 {} 输出失败: {}", name, e);
                1
            }
        }
    }
}
