use thiserror::Error;

use super::ast::{Command, Pipeline, RedirectOp, Redirection};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error near unexpected token `|'")]
    UnexpectedPipe,
    #[error("redirection requires a command")]
    RedirectionWithoutCommand,
    #[error("redirection missing target file")]
    MissingRedirectionTarget,
}

/// 把 token 序列归约成 Pipeline，单次从左到右扫描
pub struct Parser<'a> {
    tokens: &'a [String],
    position: usize,
    current: Command,
    last_token_was_pipe: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [String]) -> Self {
        Parser {
            tokens,
            position: 0,
            current: Command::default(),
            last_token_was_pipe: false,
        }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let tokens = self.tokens;
        let token = tokens.get(self.position)?;
        self.position += 1;
        Some(token.as_str())
    }

    fn peek_token(&self) -> Option<&'a str> {
        let tokens = self.tokens;
        tokens.get(self.position).map(String::as_str)
    }

    pub fn parse_pipeline(mut self) -> Result<Pipeline, ParseError> {
        let mut pipeline = Pipeline::default();

        while let Some(token) = self.next_token() {
            if token == "|" {
                if self.current.program.is_empty() {
                    return Err(ParseError::UnexpectedPipe);
                }
                pipeline.stages.push(std::mem::take(&mut self.current));
                self.last_token_was_pipe = true;
                continue;
            }

            self.last_token_was_pipe = false;

            if let Some(operator) = RedirectOp::from_token(token) {
                let redirection = self.parse_redirection(operator)?;
                self.current.redirections.push(redirection);
                continue;
            }

            if self.current.program.is_empty() {
                self.current.program = token.to_string();
            } else {
                self.current.arguments.push(token.to_string());
            }
        }

        if self.last_token_was_pipe {
            return Err(ParseError::UnexpectedPipe);
        }

        if !self.current.program.is_empty() {
            pipeline.stages.push(self.current);
        }

        Ok(pipeline)
    }

    fn parse_redirection(&mut self, operator: RedirectOp) -> Result<Redirection, ParseError> {
        if self.current.program.is_empty() {
            return Err(ParseError::RedirectionWithoutCommand);
        }

        match self.peek_token() {
            None | Some("|") => Err(ParseError::MissingRedirectionTarget),
            Some(filename) => {
                self.position += 1;
                Ok(Redirection {
                    operator,
                    filename: filename.to_string(),
                })
            }
        }
    }
}

pub fn parse(tokens: &[String]) -> Result<Pipeline, ParseError> {
    Parser::new(tokens).parse_pipeline()
}
