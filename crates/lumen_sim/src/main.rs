//! Scriptable simulator for the display timing controllers.
//!
//! Reads one command per line from a script file or stdin and drives a
//! [`Session`](session::Session) with them. `assert` failures and command
//! errors stop the run with exit code 1, so scripts double as regression
//! tests.
//!
//! Run with: cargo run -p lumen_sim -- --board board.toml script.sim

mod board;
mod command;
mod fakes;
mod session;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::board::BoardConfig;
use crate::session::{Session, Step};

const USAGE: &str = "usage: lumen-sim [--board <path>] [script]

Commands (one per line, '#' starts a comment):
  tick <ns>                        advance the clock, then pulse
  pulse                            pulse without advancing the clock
  commit <plane_mask>              atomic commit
  queue <interval> <adj> <ept> <n> queue a frame-timing config
  mode <vhm|video|command>         switch the drive mode
  enable | disable                 still-insertion lifecycle
  block | unblock                  still-insertion admission control
  dim <remaining> <full>           load the brightness dimming budget
  dump-state                       print the combined JSON snapshot
  assert <path> <value>            fail unless the snapshot field matches
  quit";

struct Args {
    board: Option<PathBuf>,
    script: Option<PathBuf>,
    help: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = Self {
            board: None,
            script: None,
            help: false,
        };
        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--board" => {
                    let path = it.next().ok_or("--board needs a path")?;
                    args.board = Some(PathBuf::from(path));
                }
                "--help" | "-h" => args.help = true,
                flag if flag.starts_with('-') => {
                    return Err(format!("unknown flag: {}", flag));
                }
                script => {
                    if args.script.is_some() {
                        return Err(format!("unexpected argument: {}", script));
                    }
                    args.script = Some(PathBuf::from(script));
                }
            }
        }
        Ok(args)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match Args::parse() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };
    if args.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let board = match &args.board {
        Some(path) => match BoardConfig::load(path) {
            Ok(board) => board,
            Err(err) => {
                log::error!("{}", err);
                return ExitCode::FAILURE;
            }
        },
        None => BoardConfig::default(),
    };

    let mut session = match Session::new(board) {
        Ok(session) => session,
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let reader: Box<dyn BufRead> = match &args.script {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                log::error!("failed to open {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    run(&mut session, reader)
}

fn run(session: &mut Session, reader: Box<dyn BufRead>) -> ExitCode {
    for (lineno, line) in reader.lines().enumerate() {
        let lineno = lineno + 1;
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::error!("line {}: read failed: {}", lineno, err);
                return ExitCode::FAILURE;
            }
        };

        let parsed = match command::parse(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::error!("line {}: {}", lineno, err);
                return ExitCode::FAILURE;
            }
        };
        let Some(cmd) = parsed else { continue };

        match session.run(cmd) {
            Ok(Step::Continue) => {}
            Ok(Step::Output(text)) => println!("{}", text),
            Ok(Step::Quit) => break,
            Err(err) => {
                log::error!("line {}: {}", lineno, err);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
