use chrono::NaiveDate;

use crate::model::GateStatus;

pub const HELP: &str = "\
commands:
  entry [PLATE]               record an entry (uses the recognised plate if omitted)
  exit [PLATE]                record an exit and bill it
  status                      capacity, free spaces, gate
  current                     vehicles currently parked
  rate <AMOUNT>               change the hourly rate
  records <YYYY-MM-DD>        visits that entered on a day
  report <START> <END> [PLATE]
                              visits that entered between two days, inclusive
  validate <PLATE>            check the regional plate format
  gate open|closed            override the gate state
  candidate <PLATE>           feed a recognition candidate into the vote
  help                        this text
  quit                        stop";

/// Parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Entry {
        plate: Option<String>,
    },
    Exit {
        plate: Option<String>,
    },
    Status,
    Current,
    Rate {
        rate: f64,
    },
    Records {
        date: NaiveDate,
    },
    Report {
        start: NaiveDate,
        end: NaiveDate,
        plate: Option<String>,
    },
    Validate {
        plate: String,
    },
    Gate {
        status: GateStatus,
    },
    Candidate {
        plate: String,
    },
    Help,
    Quit,
}

#[derive(Debug, PartialEq)]
pub enum CommandError {
    Empty,
    UnknownVerb(String),
    MissingArgument(&'static str),
    InvalidArgument(String),
    TrailingInput(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::UnknownVerb(v) => write!(f, "unknown command: {v} (try 'help')"),
            CommandError::MissingArgument(what) => write!(f, "missing argument: {what}"),
            CommandError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            CommandError::TrailingInput(rest) => write!(f, "unexpected input: {rest}"),
        }
    }
}

impl std::error::Error for CommandError {}

fn parse_date(s: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| CommandError::InvalidArgument(format!("date {s:?}, expected YYYY-MM-DD")))
}

fn required<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    what: &'static str,
) -> Result<&'a str, CommandError> {
    args.next().ok_or(CommandError::MissingArgument(what))
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut args = line.split_whitespace();
    let verb = args.next().ok_or(CommandError::Empty)?.to_ascii_lowercase();

    let cmd = match verb.as_str() {
        "entry" | "in" => Command::Entry {
            plate: args.next().map(str::to_string),
        },
        "exit" | "out" => Command::Exit {
            plate: args.next().map(str::to_string),
        },
        "status" => Command::Status,
        "current" | "parked" => Command::Current,
        "rate" => {
            let raw = required(&mut args, "rate")?;
            let rate = raw
                .parse::<f64>()
                .map_err(|_| CommandError::InvalidArgument(format!("rate {raw:?}")))?;
            Command::Rate { rate }
        }
        "records" => Command::Records {
            date: parse_date(required(&mut args, "date")?)?,
        },
        "report" => {
            let start = parse_date(required(&mut args, "start date")?)?;
            let end = parse_date(required(&mut args, "end date")?)?;
            Command::Report {
                start,
                end,
                plate: args.next().map(str::to_string),
            }
        }
        "validate" => Command::Validate {
            plate: required(&mut args, "plate")?.to_string(),
        },
        "gate" => {
            let raw = required(&mut args, "open|closed")?;
            let status = match raw.to_ascii_lowercase().as_str() {
                "open" => GateStatus::Open,
                "closed" | "close" => GateStatus::Closed,
                _ => return Err(CommandError::InvalidArgument(format!("gate state {raw:?}"))),
            };
            Command::Gate { status }
        }
        "candidate" => Command::Candidate {
            plate: required(&mut args, "plate")?.to_string(),
        },
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,
        _ => return Err(CommandError::UnknownVerb(verb)),
    };

    let rest: Vec<&str> = args.collect();
    if !rest.is_empty() {
        return Err(CommandError::TrailingInput(rest.join(" ")));
    }
    Ok(cmd)
}
