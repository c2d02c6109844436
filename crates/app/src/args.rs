use std::fmt;
use std::path::PathBuf;

use annales_core::model::{ParseIdError, Qid, SessionKind, Subject};
use services::AppConfig;

pub const DEFAULT_BANK: &str = "annales-bia.json";
pub const BANK_ENV: &str = "ANNALES_BANK";

#[derive(Debug)]
pub enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    MissingCommand,
    UnknownArg(String),
    UnknownCommand(String),
    InvalidValue { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidId(ParseIdError),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::MissingCommand => write!(f, "missing command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidId(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<ParseIdError> for ArgsError {
    fn from(err: ParseIdError) -> Self {
        ArgsError::InvalidId(err)
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  annales [--db <sqlite_url>] [--slots <dir>] [--bank <file>] <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status");
    eprintln!("  select  --subject <0-4> [--chapters <a,b>] [--include-rest] [--only-new]");
    eprintln!("  start   --name <name> --subject <0-4> [--chapters <a,b>] [--include-rest]");
    eprintln!("          [--only-new] [--exam <year> --budget <seconds>]");
    eprintln!("  answer  --qid <qid> --choice <0-3> [--elapsed <seconds>]");
    eprintln!("  save | cancel | history | reset");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ANNALES_DB_URL, ANNALES_SLOTS_DIR, ANNALES_BANK, RUST_LOG");
}

/// Which questions a `select` or `start` command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterArgs {
    pub subject: Subject,
    /// Raw ids, checked against the bank's chapter list once it is loaded.
    pub chapters: Vec<String>,
    pub include_rest: bool,
    pub only_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Select(ChapterArgs),
    Start {
        name: String,
        kind: SessionKind,
        chapters: ChapterArgs,
    },
    Answer {
        qid: Qid,
        choice: u8,
        elapsed_s: u64,
    },
    Save,
    Cancel,
    History,
    Reset,
}

impl Command {
    #[must_use]
    pub fn needs_bank(&self) -> bool {
        matches!(
            self,
            Command::Select(_) | Command::Start { .. } | Command::Answer { .. }
        )
    }
}

#[derive(Debug)]
pub struct Args {
    pub config: AppConfig,
    pub bank: PathBuf,
    pub command: Command,
}

impl Args {
    /// Parses global flags then one command with its options. `env` supplies
    /// environment variables.
    pub fn parse(
        args: impl IntoIterator<Item = String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ArgsError> {
        let mut config = AppConfig::from_lookup(&env);
        config.db_url = normalize_sqlite_url(config.db_url);
        let mut bank = env(BANK_ENV)
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_BANK), PathBuf::from);

        let mut args = args.into_iter();
        let command = loop {
            let Some(arg) = args.next() else {
                return Err(ArgsError::MissingCommand);
            };
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config.db_url = normalize_sqlite_url(value);
                }
                "--slots" => config.slots_dir = require_value(&mut args, "--slots")?.into(),
                "--bank" => bank = require_value(&mut args, "--bank")?.into(),
                flag if flag.starts_with('-') => return Err(ArgsError::UnknownArg(arg)),
                _ => break arg,
            }
        };

        let command = match command.as_str() {
            "status" => no_options(args, Command::Status)?,
            "select" => Command::Select(parse_chapter_args(&mut args, &mut |arg, _| {
                Err(ArgsError::UnknownArg(arg))
            })?),
            "start" => parse_start(&mut args)?,
            "answer" => parse_answer(&mut args)?,
            "save" => no_options(args, Command::Save)?,
            "cancel" => no_options(args, Command::Cancel)?,
            "history" => no_options(args, Command::History)?,
            "reset" => no_options(args, Command::Reset)?,
            _ => return Err(ArgsError::UnknownCommand(command)),
        };

        Ok(Self {
            config,
            bank,
            command,
        })
    }
}

fn no_options(
    mut args: impl Iterator<Item = String>,
    command: Command,
) -> Result<Command, ArgsError> {
    match args.next() {
        Some(arg) => Err(ArgsError::UnknownArg(arg)),
        None => Ok(command),
    }
}

/// Consumes every remaining argument; flags it does not know go to `extra`.
fn parse_chapter_args<I: Iterator<Item = String>>(
    args: &mut I,
    extra: &mut dyn FnMut(String, &mut I) -> Result<(), ArgsError>,
) -> Result<ChapterArgs, ArgsError> {
    let mut subject = None;
    let mut chapters = Vec::new();
    let mut include_rest = false;
    let mut only_new = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--subject" => subject = Some(require_value(args, "--subject")?.parse::<Subject>()?),
            "--chapters" => {
                chapters = require_value(args, "--chapters")?
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_owned)
                    .collect();
            }
            "--include-rest" => include_rest = true,
            "--only-new" => only_new = true,
            _ => extra(arg, args)?,
        }
    }

    Ok(ChapterArgs {
        subject: subject.ok_or(ArgsError::MissingFlag { flag: "--subject" })?,
        chapters,
        include_rest,
        only_new,
    })
}

fn parse_start(args: &mut impl Iterator<Item = String>) -> Result<Command, ArgsError> {
    let mut name = None;
    let mut year = None;
    let mut budget = None;
    let chapters = parse_chapter_args(args, &mut |arg, rest| {
        match arg.as_str() {
            "--name" => name = Some(require_value(rest, "--name")?),
            "--exam" => year = Some(parse_number::<u16>("--exam", require_value(rest, "--exam")?)?),
            "--budget" => {
                budget = Some(parse_number::<u64>("--budget", require_value(rest, "--budget")?)?);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
        Ok(())
    })?;

    let kind = match (year, budget) {
        (Some(year), Some(time_budget_s)) => SessionKind::Exam {
            year,
            time_budget_s,
        },
        (None, None) => SessionKind::Practice,
        (Some(_), None) => return Err(ArgsError::MissingFlag { flag: "--budget" }),
        (None, Some(_)) => return Err(ArgsError::MissingFlag { flag: "--exam" }),
    };

    Ok(Command::Start {
        name: name.ok_or(ArgsError::MissingFlag { flag: "--name" })?,
        kind,
        chapters,
    })
}

fn parse_answer(args: &mut impl Iterator<Item = String>) -> Result<Command, ArgsError> {
    let mut qid = None;
    let mut choice = None;
    let mut elapsed_s = 0;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--qid" => qid = Some(require_value(args, "--qid")?.parse::<Qid>()?),
            "--choice" => {
                choice = Some(parse_number::<u8>("--choice", require_value(args, "--choice")?)?);
            }
            "--elapsed" => {
                elapsed_s = parse_number("--elapsed", require_value(args, "--elapsed")?)?;
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    Ok(Command::Answer {
        qid: qid.ok_or(ArgsError::MissingFlag { flag: "--qid" })?,
        choice: choice.ok_or(ArgsError::MissingFlag { flag: "--choice" })?,
        elapsed_s,
    })
}

/// Turns a relative `SQLite` path or URL into an absolute `sqlite://` URL.
pub fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || is_absolute_url(&raw) {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn is_absolute_url(url: &str) -> bool {
    url.strip_prefix("sqlite://")
        .is_some_and(|path| std::path::Path::new(path).is_absolute())
}
