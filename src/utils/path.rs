use std::collections::BTreeSet;
use std::env;
use std::fs::{self, read_dir};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{error, warn};

/// 在 PATH 里查找可执行文件
///
/// 默认每次查找时读取 `PATH`，也可以用 [`PathResolver::with_search_path`] 指定固定的搜索路径。
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    search_path: Option<String>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(search_path: impl Into<String>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }

    fn search_path(&self) -> Option<String> {
        if let Some(path) = &self.search_path {
            return Some(path.clone());
        }
        match env::var("PATH") {
            Ok(x) => Some(x),
            Err(e) => {
                warn!("pipesh: error with env PATH: {:?}", e);
                None
            }
        }
    }

    /// 依次遍历搜索路径中以 prefix 开头的可执行文件，回调返回 true 时停止
    pub fn scan_path_executables<F>(&self, prefix: &str, mut callback: F)
    where
        F: FnMut(&str, &Path) -> bool,
    {
        let Some(env_path) = self.search_path() else {
            return;
        };

        for dir in env_path.split(':').filter(|dir| !dir.is_empty()) {
            let list = match read_dir(dir) {
                Ok(list) => list,
                Err(e) => {
                    if e.kind() != ErrorKind::NotFound {
                        error!("pipesh: fs read_dir error: {}: {}", dir, e);
                    }
                    continue;
                }
            };

            for entry in list.flatten() {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if !name.starts_with(prefix) {
                    continue;
                }

                let path = entry.path();
                if !is_executable(&path) {
                    continue;
                }

                if callback(&name, &path) {
                    return;
                }
            }
        }
    }

    pub fn find_command_path(&self, command: &str) -> Option<PathBuf> {
        if command.is_empty() {
            return None;
        }

        let mut resolved = None;
        self.scan_path_executables(command, |name, path| {
            if name == command {
                resolved = Some(path.to_path_buf());
                return true;
            }
            false
        });
        resolved
    }

    pub fn executable_candidates(&self, prefix: &str) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        self.scan_path_executables(prefix, |name, _| {
            candidates.insert(name.to_string());
            false
        });
        candidates
    }
}

// 跟随符号链接，只接受带任意执行位的普通文件
fn is_executable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}
