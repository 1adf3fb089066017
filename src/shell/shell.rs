use log::{debug, error, warn};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::shell::builtins::BuiltinRegistry;
use crate::shell::completion::ShellHelper;
use crate::shell::executor::{BuiltinDispatcher, Executor};
use crate::shell::history::HistoryManager;
use crate::shell::parser::{parse, tokenize};
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::utils::config::Config;
use crate::utils::path::PathResolver;
use crate::utils::theme::Theme;

pub struct Shell {
    theme: Theme,
    history_file: PathBuf,
    readline: ReadlineManager,
    builtins: BuiltinRegistry,
    executor: Executor,
    // 已同步到行编辑器的历史条数
    mirrored: usize,
}

impl Shell {
    pub fn new(config: &Config, theme: Theme) -> Result<Self, Box<dyn Error>> {
        let resolver = PathResolver::new();
        let builtins = BuiltinRegistry::new(resolver.clone(), HistoryManager::new());
        let mut readline = ReadlineManager::new(config)?;
        readline.install_completion(ShellHelper::new(builtins.names(), resolver.clone()));

        Ok(Self {
            theme,
            history_file: config.history_file.clone(),
            readline,
            builtins,
            executor: Executor::new(resolver),
            mirrored: 0,
        })
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        debug!("初始化 pipesh...");

        if let Err(e) = self.builtins.history_mut().load(&self.history_file) {
            warn!("无法加载历史记录: {} {}", self.history_file.display(), e);
        }
        self.sync_editor_history();
        debug!("pipesh 准备就绪...");

        self.run_loop();

        match self.builtins.history().save() {
            Ok(()) => debug!("历史记录保存成功"),
            Err(e) => error!("保存历史记录失败: {}", e),
        }
        debug!("退出 pipesh...");
        Ok(())
    }

    fn run_loop(&mut self) {
        loop {
            match self.readline.readline(&self.theme.prompt) {
                Ok(line) => {
                    self.handle_input(&line);
                    if self.builtins.exit_requested() {
                        debug!("exit 内建命令请求退出");
                        break;
                    }
                }
                Err(ReadlineError::Eof) => {
                    debug!("接收到 EOF，退出 pipesh...");
                    println!();
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    debug!("接收到中断信号，丢弃当前输入");
                }
                Err(err) => {
                    error!("读取输入失败: {}", err);
                    eprintln!("{}", self.theme.fatal(format!("read error: {}", err)));
                    break;
                }
            }
        }
    }

    fn handle_input(&mut self, line: &str) {
        self.builtins.history_mut().record(line);
        let outcome = run_line(
            line,
            &self.executor,
            &mut self.builtins,
            &self.theme,
            &mut io::stderr(),
        );
        match outcome {
            LineOutcome::Status(status) => debug!("命令退出码: {}", status),
            other => debug!("本行处理结果: {:?}", other),
        }
        self.sync_editor_history();
    }

    fn sync_editor_history(&mut self) {
        let entries = self.builtins.history().entries();
        for line in entries.iter().skip(self.mirrored) {
            if let Err(e) = self.readline.add_history(line) {
                warn!("同步历史记录失败: {}", e);
            }
        }
        self.mirrored = entries.len();
    }
}

/// 一行输入的处理结果，任何一种都不会让 REPL 停下
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Empty,
    Status(i32),
    SyntaxError,
    DispatchFailed,
}

/// 解析并执行一行输入，语法错误和派发失败都写到 err
pub fn run_line(
    line: &str,
    executor: &Executor,
    builtins: &mut dyn BuiltinDispatcher,
    theme: &Theme,
    err: &mut dyn Write,
) -> LineOutcome {
    let tokens = tokenize(line);
    if tokens.is_empty() {
        return LineOutcome::Empty;
    }
    debug!("解析命令: {:?}", tokens);

    let pipeline = match parse(&tokens) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            debug!("语法错误: {}", e);
            let _ = writeln!(err, "{}", e);
            return LineOutcome::SyntaxError;
        }
    };

    match executor.execute(&pipeline, builtins) {
        Ok(status) => LineOutcome::Status(status),
        Err(e) => {
            error!("派发失败: {}", e);
            let _ = writeln!(err, "{}", theme.fatal(&e));
            LineOutcome::DispatchFailed
        }
    }
}
