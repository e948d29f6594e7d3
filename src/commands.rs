//! Line commands accepted by the terminal reader

use std::str::FromStr;

use crate::deck::SlideNumber;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderCommand {
    Next,
    Previous,
    Goto(SlideNumber),
    Annotations,
    /// Replace the current slide's explanation
    Edit(String),
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a slide number")]
    BadSlideNumber(String),
}

impl FromStr for ReaderCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "" => Err(CommandError::Empty),
            "n" | "next" => Ok(Self::Next),
            "p" | "prev" => Ok(Self::Previous),
            "g" | "goto" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("goto"));
                }
                rest.parse::<SlideNumber>()
                    .ok()
                    .filter(|n| *n > 0)
                    .map(Self::Goto)
                    .ok_or_else(|| CommandError::BadSlideNumber(rest.to_string()))
            }
            "a" | "annotations" => Ok(Self::Annotations),
            "e" | "edit" => {
                if rest.is_empty() {
                    Err(CommandError::MissingArgument("edit"))
                } else {
                    // Literal "\n" lets a single line carry paragraphs
                    Ok(Self::Edit(rest.replace("\\n", "\n")))
                }
            }
            "s" | "status" => Ok(Self::Status),
            "h" | "help" | "?" => Ok(Self::Help),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
n, next          next slide
p, prev          previous slide
g N, goto N      jump to slide N
a, annotations   list annotations of the current slide
e TEXT           replace the current explanation (\\n for newlines)
s, status        cache and request status
q, quit          exit";
