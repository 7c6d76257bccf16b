use std::io::{self, Write};
use std::str::FromStr;

use shared::ValidationError;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Line-oriented questions on stdin.
pub struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` once stdin is closed.
    pub async fn line(&mut self, question: &str) -> io::Result<Option<String>> {
        print!("{}", question);
        io::stdout().flush()?;
        Ok(self.lines.next_line().await?.map(|line| line.trim().to_string()))
    }

    /// Ask until the answer parses.
    pub async fn valid<T>(&mut self, question: &str) -> io::Result<Option<T>>
    where
        T: FromStr<Err = ValidationError>,
    {
        loop {
            let Some(answer) = self.line(question).await? else {
                return Ok(None);
            };
            match answer.parse() {
                Ok(value) => return Ok(Some(value)),
                Err(error) => println!("{}", error),
            }
        }
    }

    /// Everything up to a line consisting of `terminator`, or to the end of
    /// stdin.
    pub async fn block(&mut self, terminator: &str) -> io::Result<String> {
        let mut text = String::new();
        while let Some(line) = self.lines.next_line().await? {
            if line.trim() == terminator {
                break;
            }
            text.push_str(&line);
            text.push('\n');
        }
        Ok(text)
    }
}
