use std::collections::BTreeSet;

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use crate::utils::path::PathResolver;

/// 行编辑器的补全助手：只补全命令名（行首第一个单词）
pub struct ShellHelper {
    builtin_names: Vec<String>,
    resolver: PathResolver,
}

impl ShellHelper {
    pub fn new<'a>(
        builtin_names: impl IntoIterator<Item = &'a str>,
        resolver: PathResolver,
    ) -> Self {
        Self {
            builtin_names: builtin_names.into_iter().map(str::to_string).collect(),
            resolver,
        }
    }

    pub fn collect_matches(&self, prefix: &str) -> BTreeSet<String> {
        let mut matches = self.resolver.executable_candidates(prefix);
        matches.extend(
            self.builtin_names
                .iter()
                .filter(|name| name.starts_with(prefix))
                .cloned(),
        );
        matches
    }

    fn complete_line(&self, line: &str, pos: usize) -> (usize, Vec<Pair>) {
        let prefix = &line[..pos];
        let word_start = prefix
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map_or(0, |(index, c)| index + c.len_utf8());
        if word_start != 0 {
            return (pos, Vec::new());
        }

        let matches = self.collect_matches(prefix);
        let unique = matches.len() == 1;
        let candidates = matches
            .into_iter()
            .map(|name| Pair {
                replacement: if unique { format!("{} ", name) } else { name.clone() },
                display: name,
            })
            .collect();
        (0, candidates)
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.complete_line(line, pos))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}
