//! Operator input parsing.
//!
//! Every stdin line is either a command word or a scan token:
//!
//! ```text
//! 7891234567890        scan
//! confirm 12           answer the units-per-container prompt
//! cancel               close the prompt without answering
//! adjust P-001 -2      manual correction by product code
//! status | history | finalize | send | abandon | help | quit
//! ```

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan(String),
    Confirm(String),
    Cancel,
    Adjust { code: String, delta: i64 },
    Status,
    History,
    Finalize,
    Send,
    Abandon,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            return Ok(None);
        };

        let command = match first.to_lowercase().as_str() {
            "confirm" | "c" => {
                let rest: Vec<&str> = words.collect();
                if rest.is_empty() {
                    bail!("usage: confirm <units per container>");
                }
                Command::Confirm(rest.join(" "))
            }
            "cancel" => Command::Cancel,
            "adjust" | "a" => {
                let code = words
                    .next()
                    .ok_or_else(|| anyhow!("usage: adjust <code> <delta>"))?;
                let delta = words
                    .next()
                    .ok_or_else(|| anyhow!("usage: adjust <code> <delta>"))?
                    .parse::<i64>()
                    .map_err(|_| anyhow!("delta must be a whole number, e.g. 2 or -1"))?;
                Command::Adjust {
                    code: code.to_string(),
                    delta,
                }
            }
            "status" | "s" => Command::Status,
            "history" | "h" => Command::History,
            "finalize" | "f" => Command::Finalize,
            "send" | "sync" => Command::Send,
            "abandon" => Command::Abandon,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            // Everything else goes to the matcher, which reports bad tokens
            _ => Command::Scan(line.trim().to_string()),
        };

        Ok(Some(command))
    }
}

pub const HELP: &str = "\
Scan a barcode, or type a command:
  confirm <n>          units per container for the open prompt
  cancel               close the open prompt
  adjust <code> <d>    add d (may be negative) to a line
  status               show progress
  history              show recent finalized pickings
  finalize             close the picking (all lines complete)
  send                 forward queued settlements now
  abandon              discard the picking
  quit                 exit, keeping progress";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_tokens() {
        assert_eq!(
            Command::parse(" 7891234567890 ").unwrap(),
            Some(Command::Scan("7891234567890".into()))
        );
        // Malformed tokens are still scans; the session rejects them
        assert_eq!(
            Command::parse("12AB").unwrap(),
            Some(Command::Scan("12AB".into()))
        );
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_commands() {
        assert_eq!(
            Command::parse("confirm 12 un").unwrap(),
            Some(Command::Confirm("12 un".into()))
        );
        assert_eq!(
            Command::parse("adjust P-001 -2").unwrap(),
            Some(Command::Adjust {
                code: "P-001".into(),
                delta: -2
            })
        );
        assert_eq!(Command::parse("FINALIZE").unwrap(), Some(Command::Finalize));
        assert_eq!(Command::parse("q").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("sync").unwrap(), Some(Command::Send));
    }

    #[test]
    fn test_bad_commands() {
        assert!(Command::parse("confirm").is_err());
        assert!(Command::parse("adjust P-001").is_err());
        assert!(Command::parse("adjust P-001 two").is_err());
    }
}
