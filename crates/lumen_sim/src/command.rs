//! Script command parsing.
//!
//! One command per line, whitespace separated. `#` starts a comment; blank
//! lines and pure comments parse to nothing.

use std::str::FromStr;

use lumen_core::RefreshMode;
use lumen_refresh::DvrrConfig;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

/// One simulator instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Advance the clock, then deliver a pulse.
    Tick(u64),
    /// Deliver a pulse without moving the clock.
    Pulse,
    /// Atomic commit with the given plane mask.
    Commit(u32),
    /// Queue a frame-timing config for promotion.
    Queue(DvrrConfig),
    /// Switch the drive mode for everything that follows.
    Mode(RefreshMode),
    Enable,
    Disable,
    Block,
    Unblock,
    /// Load the brightness dimming budget.
    Dim { remaining: u32, full: u32 },
    /// Print the combined snapshot as JSON.
    DumpState,
    /// Fail the script unless the snapshot field matches.
    Assert { path: String, value: String },
    Quit,
}

pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.split('#').next().unwrap_or("").trim();
    let mut tokens = line.split_whitespace();
    let Some(name) = tokens.next() else {
        return Ok(None);
    };

    let command = match name {
        "tick" => Command::Tick(arg("ns", take(&mut tokens, "ns")?)?),
        "pulse" => Command::Pulse,
        "commit" => Command::Commit(arg("plane_mask", take(&mut tokens, "plane_mask")?)?),
        "queue" => {
            let frame_interval_ns =
                arg("frame_interval_ns", take(&mut tokens, "frame_interval_ns")?)?;
            let adjusted_present_time_ns = arg(
                "adjusted_present_time_ns",
                take(&mut tokens, "adjusted_present_time_ns")?,
            )?;
            let expected_present_time_ns = arg(
                "expected_present_time_ns",
                take(&mut tokens, "expected_present_time_ns")?,
            )?;
            let need_panel_refresh =
                flag("need_panel_refresh", take(&mut tokens, "need_panel_refresh")?)?;
            Command::Queue(DvrrConfig {
                frame_interval_ns,
                adjusted_present_time_ns,
                expected_present_time_ns,
                need_panel_refresh,
            })
        }
        "mode" => Command::Mode(arg("mode", take(&mut tokens, "mode")?)?),
        "enable" => Command::Enable,
        "disable" => Command::Disable,
        "block" => Command::Block,
        "unblock" => Command::Unblock,
        "dim" => Command::Dim {
            remaining: arg("remaining", take(&mut tokens, "remaining")?)?,
            full: arg("full", take(&mut tokens, "full")?)?,
        },
        "dump-state" => Command::DumpState,
        "assert" => Command::Assert {
            path: take(&mut tokens, "path")?.to_string(),
            value: take(&mut tokens, "value")?.to_string(),
        },
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn take<'a, I>(tokens: &mut I, name: &'static str) -> Result<&'a str, CommandError>
where
    I: Iterator<Item = &'a str>,
{
    tokens.next().ok_or(CommandError::MissingArgument(name))
}

fn arg<T>(name: &'static str, raw: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|err| CommandError::InvalidArgument {
        name,
        reason: format!("{} ({})", raw, err),
    })
}

fn flag(name: &'static str, raw: &str) -> Result<bool, CommandError> {
    match raw {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(CommandError::InvalidArgument {
            name,
            reason: format!("{} (expected 0 or 1)", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_comment_lines_parse_to_nothing() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
        assert_eq!(parse("# pure comment").unwrap(), None);
    }

    #[test]
    fn test_inline_comment_is_stripped() {
        assert_eq!(
            parse("tick 4166666  # one nominal pulse").unwrap(),
            Some(Command::Tick(4_166_666))
        );
    }

    #[test]
    fn test_queue_takes_four_fields() {
        let cmd = parse("queue 33333328 0 5000000000 1").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Queue(DvrrConfig {
                frame_interval_ns: 33_333_328,
                adjusted_present_time_ns: 0,
                expected_present_time_ns: 5_000_000_000,
                need_panel_refresh: true,
            })
        );
    }

    #[test]
    fn test_mode_accepts_the_short_alias() {
        assert_eq!(
            parse("mode cmd").unwrap(),
            Some(Command::Mode(RefreshMode::Command))
        );
    }

    #[test]
    fn test_assert_keeps_path_and_value_verbatim() {
        assert_eq!(
            parse("assert vmc.state still").unwrap(),
            Some(Command::Assert {
                path: "vmc.state".to_string(),
                value: "still".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        assert_eq!(
            parse("frobnicate").unwrap_err(),
            CommandError::Unknown("frobnicate".to_string())
        );
    }

    #[test]
    fn test_missing_argument_names_the_field() {
        assert_eq!(
            parse("queue 33333328 0").unwrap_err(),
            CommandError::MissingArgument("expected_present_time_ns")
        );
    }

    #[test]
    fn test_bad_number_reports_the_raw_token() {
        let err = parse("tick soon").unwrap_err();
        match err {
            CommandError::InvalidArgument { name, reason } => {
                assert_eq!(name, "ns");
                assert!(reason.starts_with("soon"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_need_panel_refresh_must_be_a_flag() {
        assert!(parse("queue 33333328 0 0 yes").is_err());
        assert_eq!(
            parse("queue 33333328 0 0 0").unwrap(),
            Some(Command::Queue(DvrrConfig {
                frame_interval_ns: 33_333_328,
                ..DvrrConfig::default()
            }))
        );
    }
}
