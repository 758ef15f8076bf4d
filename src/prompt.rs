use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

pub trait Prompter {
    fn ask(&mut self, question: &str) -> Result<bool>;
}

pub struct TerminalPrompter {
    negative_prefix: String,
}

impl TerminalPrompter {
    pub fn new(negative_prefix: &str) -> Self {
        Self { negative_prefix: negative_prefix.to_string() }
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, question: &str) -> Result<bool> {
        let mut stderr = io::stderr();
        write!(stderr, "{question} [Y/n] ")?;
        stderr.flush()?;

        let mut input = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut input)
            .context("couldn't read answer")?;
        if read == 0 {
            // stdin closed, nobody there to agree
            writeln!(stderr)?;
            return Ok(false);
        }
        Ok(is_yes(&input, &self.negative_prefix))
    }
}

// empty means yes; anything whose first word starts with the negative prefix means no
pub fn is_yes(answer: &str, negative_prefix: &str) -> bool {
    match answer.split_whitespace().next() {
        None => true,
        Some(word) => !word.to_lowercase().starts_with(&negative_prefix.to_lowercase()),
    }
}
