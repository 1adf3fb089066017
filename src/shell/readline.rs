use crate::shell::completion::ShellHelper;
use crate::utils::config::Config;
use log::debug;
pub use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use rustyline::{CompletionType, Config as RLConfig};

pub struct ReadlineManager {
    editor: Editor<ShellHelper, DefaultHistory>,
}

impl ReadlineManager {
    pub fn new(config: &Config) -> Result<Self, ReadlineError> {
        let rl_config = RLConfig::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(config.get_edit_mode())
            .build();

        let editor = Editor::with_config(rl_config)?;
        Ok(Self { editor })
    }

    /// 唯一的补全注册入口，每个编辑器同时只有一个生效的补全助手
    pub fn install_completion(&mut self, helper: ShellHelper) {
        debug!("安装命令补全");
        self.editor.set_helper(Some(helper));
    }

    pub fn readline(&mut self, prompt: &str) -> Result<String, ReadlineError> {
        self.editor.readline(prompt)
    }

    /// 只同步到编辑器的内存历史（方向键回溯），持久化由 HistoryManager 负责
    pub fn add_history(&mut self, line: &str) -> Result<bool, ReadlineError> {
        self.editor.add_history_entry(line)
    }
}
