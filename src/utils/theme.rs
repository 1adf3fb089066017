use colored::Colorize;

pub struct Theme {
    pub prompt: String,
    pub error_symbol: String,
    pub error_style: Box<dyn Fn(String) -> String>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            prompt: "$ ".to_string(),
            error_symbol: "✗".red().to_string(),
            error_style: Box::new(|s| s.bright_red().to_string()),
        }
    }
}

impl Theme {
    /// 格式化一条 shell 自身的致命错误（与命令输出区分开）
    pub fn fatal(&self, message: impl std::fmt::Display) -> String {
        format!("{} {}", self.error_symbol, (self.error_style)(message.to_string()))
    }
}

pub fn load_theme(theme_name: &str) -> Theme {
    match theme_name {
        "plain" => Theme {
            prompt: "$ ".to_string(),
            error_symbol: "error:".to_string(),
            error_style: Box::new(|s| s),
        },
        _ => Theme::default(),
    }
}
