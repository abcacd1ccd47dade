//! Console command grammar.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::CommandError;

/// Target of a `delete` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Index(u32),
    All,
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// `connect [host[:port]]`.
    Connect(Option<String>),
    /// `break <spec>` or, with `pending`, `fbreak <spec>`.
    Break { spec: String, pending: bool },
    Delete(DeleteTarget),
    PendingDelete(usize),
    List,
    Stop,
    Continue,
    Step,
    Next,
    Eval(String),
    /// `backtrace [depth]`; `None` uses the configured depth.
    Backtrace(Option<u32>),
    Exception(bool),
    Source,
    Dump,
    Quit,
}

/// Usage lines for `help`.
pub const HELP: &str = "\
help                      show this text
connect [host[:port]]     connect to a debugger
break|b <file:line|name>  set a breakpoint
fbreak <file:line|name>   set a breakpoint, pending if not found
delete|d <index|all>      delete active breakpoints
pendingdel <index>        delete a pending breakpoint
list                      list breakpoints
stop|st                   pause execution
continue|c                resume execution
step|s                    step into
next|n                    step over
eval|e <expression>       evaluate in the stopped frame
backtrace|bt [depth]      print the call stack
exception <1|0>           stop on exceptions on or off
src                       print the current source
dump                      list every known function
quit|q                    exit";

fn command_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-zA-Z]+)(?:\s+(\S.*))?$").expect("command regex is valid"))
}

fn depth_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[1-9][0-9]*$").expect("depth regex is valid"))
}

fn required(arg: Option<&str>) -> Result<String, CommandError> {
    arg.map(str::to_string).ok_or(CommandError::EmptyArgument)
}

fn invalid(command: &str, argument: &str) -> CommandError {
    CommandError::InvalidArgument {
        command: command.to_string(),
        argument: argument.to_string(),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let caps = command_regex()
            .captures(line)
            .ok_or_else(|| CommandError::Malformed(line.to_string()))?;
        let word = caps.get(1).map_or("", |m| m.as_str());
        let arg = caps.get(2).map(|m| m.as_str().trim_end());

        let command = match word.to_ascii_lowercase().as_str() {
            "help" | "h" => Self::Help,
            "connect" => Self::Connect(arg.map(str::to_string)),
            "break" | "b" => Self::Break {
                spec: required(arg)?,
                pending: false,
            },
            "fbreak" => Self::Break {
                spec: required(arg)?,
                pending: true,
            },
            "delete" | "d" => match arg {
                None => return Err(CommandError::EmptyArgument),
                Some("all") => Self::Delete(DeleteTarget::All),
                Some(index) => Self::Delete(DeleteTarget::Index(
                    index.parse().map_err(|_| invalid(word, index))?,
                )),
            },
            "pendingdel" => {
                let index = arg.ok_or(CommandError::EmptyArgument)?;
                Self::PendingDelete(index.parse().map_err(|_| invalid(word, index))?)
            }
            "list" => Self::List,
            "stop" | "st" => Self::Stop,
            "continue" | "c" => Self::Continue,
            "step" | "s" => Self::Step,
            "next" | "n" => Self::Next,
            "eval" | "e" => Self::Eval(required(arg)?),
            "backtrace" | "bt" => match arg {
                None => Self::Backtrace(None),
                Some(depth) if depth_regex().is_match(depth) => {
                    Self::Backtrace(Some(depth.parse().map_err(|_| invalid(word, depth))?))
                }
                Some(depth) => return Err(invalid(word, depth)),
            },
            "exception" => match arg {
                None => return Err(CommandError::EmptyArgument),
                Some("1") => Self::Exception(true),
                Some("0") => Self::Exception(false),
                Some(other) => return Err(CommandError::InvalidExceptionFlag(other.to_string())),
            },
            "src" => Self::Source,
            "dump" => Self::Dump,
            "quit" | "q" => Self::Quit,
            _ => return Err(CommandError::UnknownCommand(word.to_string())),
        };
        Ok(command)
    }
}
