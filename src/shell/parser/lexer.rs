use std::iter::Peekable;
use std::str::Chars;

/// 词法分析器：按 shell 引号/转义规则把一行输入切分成 token
///
/// token 不带类型标记，`|`、`>`、`>>`、`1>`、`1>>`、`2>`、`2>>` 由 parser 按内容识别。
pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    tokens: Vec<String>,
    current: String,
    single_quoted: bool,
    double_quoted: bool,
    escaped: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
            tokens: Vec::new(),
            current: String::new(),
            single_quoted: false,
            double_quoted: false,
            escaped: false,
        }
    }

    pub fn tokenize(mut self) -> Vec<String> {
        while let Some(c) = self.read_char() {
            if self.escaped {
                self.read_escaped(c);
                continue;
            }

            match c {
                '\\' if !self.single_quoted => self.escaped = true,
                '\'' if !self.double_quoted => self.single_quoted = !self.single_quoted,
                '"' if !self.single_quoted => self.double_quoted = !self.double_quoted,
                c if self.in_quotes() => self.current.push(c),
                c if c.is_ascii_whitespace() || c == '\x0b' => self.flush(),
                '|' => {
                    self.flush();
                    self.tokens.push("|".to_string());
                }
                '1' | '2' if self.current.is_empty() && self.peek_char() == Some('>') => {
                    self.read_char();
                    let mut op = format!("{}>", c);
                    if self.peek_char() == Some('>') {
                        self.read_char();
                        op.push('>');
                    }
                    self.tokens.push(op);
                }
                '>' => {
                    self.flush();
                    if self.peek_char() == Some('>') {
                        self.read_char();
                        self.tokens.push(">>".to_string());
                    } else {
                        self.tokens.push(">".to_string());
                    }
                }
                c => self.current.push(c),
            }
        }

        self.flush();
        self.tokens
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn in_quotes(&self) -> bool {
        self.single_quoted || self.double_quoted
    }

    // 双引号内只有 \\ 和 \" 是转义，其余保留反斜杠
    fn read_escaped(&mut self, c: char) {
        if self.double_quoted && c != '\\' && c != '"' {
            self.current.push('\\');
        }
        self.current.push(c);
        self.escaped = false;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.tokens.push(std::mem::take(&mut self.current));
        }
    }
}

pub fn tokenize(input: &str) -> Vec<String> {
    Lexer::new(input).tokenize()
}
