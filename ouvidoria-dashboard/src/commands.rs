//! Console commands.
//!
//! Each input line maps to one [`Command`]. Filter commands stand in for
//! chart clicks; the rest inspect or refresh the dashboard.

use std::fmt::Write as _;

use crate::context::AppContext;

pub const HELP: &str = "\
commands:
  set <dimension> <value>     select a value (same as clicking a bar)
  toggle <dimension> <value>  select, or clear if already selected
  clear [dimension]           clear one dimension, or all filters
  filters                     show active filters
  refresh                     drop cached data and reload every page
  status                      last reload result per page
  stats                       cache statistics
  help                        this text
  quit                        exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { dimension: String, value: String },
    Toggle { dimension: String, value: String },
    Clear(Option<String>),
    Filters,
    Refresh,
    Status,
    Stats,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line. Blank lines yield `Ok(None)`.
///
/// The value of `set` and `toggle` is the rest of the line, so multi-word
/// values need no quoting. `dimension=value` is accepted as well.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "set" => {
            let (dimension, value) =
                split_predicate(rest).ok_or(CommandParseError::Usage("set <dimension> <value>"))?;
            Command::Set { dimension, value }
        }
        "toggle" => {
            let (dimension, value) = split_predicate(rest)
                .ok_or(CommandParseError::Usage("toggle <dimension> <value>"))?;
            Command::Toggle { dimension, value }
        }
        "clear" => match rest {
            "" => Command::Clear(None),
            dimension if !dimension.contains(char::is_whitespace) => {
                Command::Clear(Some(dimension.to_string()))
            }
            _ => return Err(CommandParseError::Usage("clear [dimension]")),
        },
        "filters" => Command::Filters,
        "refresh" => Command::Refresh,
        "status" => Command::Status,
        "stats" => Command::Stats,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandParseError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn split_predicate(rest: &str) -> Option<(String, String)> {
    let (dimension, value) = match rest.split_once(char::is_whitespace) {
        Some((dimension, value)) => (dimension, value.trim()),
        None => rest.split_once('=')?,
    };
    if dimension.is_empty() || value.is_empty() {
        return None;
    }
    Some((dimension.to_string(), value.to_string()))
}

/// What the console prints after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

/// Apply `command` to the dashboard.
pub async fn execute(ctx: &AppContext, command: Command) -> Reply {
    let filters = ctx.filters();
    match command {
        Command::Set { dimension, value } => {
            if filters.set_filter(&dimension, &value) {
                Reply::text(format!("filters: {}", filters.get_active()))
            } else {
                Reply::text("filters unchanged")
            }
        }
        Command::Toggle { dimension, value } => {
            filters.toggle_filter(&dimension, &value);
            Reply::text(format!("filters: {}", filters.get_active()))
        }
        Command::Clear(Some(dimension)) => {
            if filters.clear_filter(&dimension) {
                Reply::text(format!("filters: {}", filters.get_active()))
            } else {
                Reply::text(format!("no filter on {}", dimension))
            }
        }
        Command::Clear(None) => {
            let removed = filters.clear_all();
            Reply::text(format!("cleared {} filter(s)", removed))
        }
        Command::Filters => Reply::text(format!("filters: {}", filters.get_active())),
        Command::Refresh => {
            let outcomes = ctx.refresh().await;
            let mut text = String::new();
            for (page_id, outcome) in outcomes {
                let _ = writeln!(text, "{}: {:?}", page_id, outcome);
            }
            Reply::text(text.trim_end().to_string())
        }
        Command::Status => {
            let statuses = ctx.status().all();
            if statuses.is_empty() {
                return Reply::text("no page has reloaded yet");
            }
            let mut text = String::new();
            for status in statuses {
                let _ = writeln!(
                    text,
                    "{}: {:?} (reloads {}, failures {}, superseded {}, last success {})",
                    status.page_id,
                    status.last_outcome,
                    status.reloads,
                    status.failures,
                    status.superseded,
                    status
                        .last_success
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string()),
                );
            }
            Reply::text(text.trim_end().to_string())
        }
        Command::Stats => {
            let stats = ctx.cache().stats();
            Reply::text(format!(
                "entries {}, hits {}, misses {}, hit rate {:.1}%, expirations {}, invalidations {}, in flight {}",
                stats.entry_count,
                stats.hits,
                stats.misses,
                stats.hit_rate() * 100.0,
                stats.expirations,
                stats.invalidations,
                ctx.loader().in_flight(),
            ))
        }
        Command::Help => Reply::text(HELP),
        Command::Quit => Reply {
            text: String::new(),
            quit: true,
        },
    }
}
