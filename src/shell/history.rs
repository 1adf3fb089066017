use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;

/// 命令历史，条目从 1 开始编号显示
#[derive(Debug, Default)]
pub struct HistoryManager {
    entries: Vec<String>,
    history_file: Option<PathBuf>,
    session_start: usize,
    last_appended: HashMap<PathBuf, usize>,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取历史文件（不存在也可以），之后记录的条目属于本次会话
    ///
    /// 读取失败时不记住该文件，退出时也就不会用本次会话的条目覆盖它。
    pub fn load(&mut self, path: &Path) -> io::Result<()> {
        let result = match self.read_from_file(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        };
        if result.is_ok() {
            self.history_file = Some(path.to_path_buf());
        }
        self.session_start = self.entries.len();
        debug!("加载历史记录 {} 条: {}", self.entries.len(), path.display());
        result
    }

    pub fn save(&self) -> io::Result<()> {
        match &self.history_file {
            Some(path) => self.write_entries(path, &self.entries, false),
            None => Ok(()),
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// 忽略空行和与上一条相同的输入
    pub fn record(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if self.entries.last().map(String::as_str) != Some(line) {
            self.entries.push(line.to_string());
        }
    }

    // 其他程序写入的历史可能不是 UTF-8，按行做有损解码
    pub fn read_from_file(&mut self, path: &Path) -> io::Result<()> {
        let bytes = fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        self.entries.extend(
            content
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
        Ok(())
    }

    pub fn write_to_file(&mut self, path: &Path) -> io::Result<()> {
        self.write_entries(path, &self.entries, false)?;
        self.last_appended.insert(path.to_path_buf(), self.entries.len());
        Ok(())
    }

    /// 只追加本次会话中还没写入过该文件的条目
    pub fn append_session_to_file(&mut self, path: &Path) -> io::Result<()> {
        let already = self.last_appended.get(path).copied().unwrap_or(0);
        let start = self.session_start.max(already).min(self.entries.len());
        self.write_entries(path, &self.entries[start..], true)?;
        self.last_appended.insert(path.to_path_buf(), self.entries.len());
        Ok(())
    }

    pub fn print(&self, out: &mut dyn Write, limit: Option<usize>) -> io::Result<()> {
        let total = self.entries.len();
        let limit = limit.unwrap_or(total).min(total);
        for (index, line) in self.entries.iter().enumerate().skip(total - limit) {
            writeln!(out, "    {}  {}", index + 1, line)?;
        }
        Ok(())
    }

    fn write_entries(&self, path: &Path, entries: &[String], append: bool) -> io::Result<()> {
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        let mut writer = BufWriter::new(file);
        for line in entries {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()
    }
}
