use log::warn;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Run,
    Help,
    Version,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    pub cmd: Command,
    pub workers: usize,
    pub count: i64,
    pub fail_on: Option<i64>,
    pub delay: Duration,
    pub cancel_after: Option<Duration>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            cmd: Command::Run,
            workers: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            count: 8,
            fail_on: None,
            delay: Duration::ZERO,
            cancel_after: None,
        }
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Option<T> {
    let Some(value) = value else {
        warn!("missing value for '{flag}'");
        return None;
    };
    match value.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("expected a number for '{flag}', got '{value}'");
            None
        }
    }
}

impl Options {
    /// Parses command line arguments. The first argument is the program name.
    pub fn new<I, T>(args: I) -> Options
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut opts = Options::default();
        let mut args = args.into_iter().map(Into::into).skip(1);
        while let Some(arg) = args.next() {
            let parsed = match arg.as_str() {
                "-j" | "--workers" => {
                    parse_number(&arg, args.next()).map(|workers| opts.workers = workers)
                }
                "-n" | "--count" => parse_number(&arg, args.next()).map(|count| opts.count = count),
                "--fail" => parse_number(&arg, args.next()).map(|value| opts.fail_on = Some(value)),
                "--delay-ms" => parse_number(&arg, args.next())
                    .map(|ms| opts.delay = Duration::from_millis(ms)),
                "--cancel-after-ms" => parse_number(&arg, args.next())
                    .map(|ms| opts.cancel_after = Some(Duration::from_millis(ms))),
                "--version" => {
                    opts.cmd = Command::Version;
                    return opts;
                }
                "-h" | "--help" => None,
                _ => {
                    warn!("unexpected argument '{arg}'");
                    None
                }
            };
            if parsed.is_none() {
                opts.cmd = Command::Help;
                return opts;
            }
        }
        opts
    }
}

pub fn print_cli_info() {
    println!("{}{}", TITLE, VERSION);
}

pub fn print_cli_help() {
    print_cli_info();
    println!("{}", USAGE);
}

pub const TITLE: &str = "partask v";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const USAGE: &str = "Doubles the numbers 1..=COUNT on a pool of worker threads.

Usage:
  partask [-j N] [-n COUNT] [--fail VALUE] [--delay-ms MS] [--cancel-after-ms MS]
  partask (-h | --help)
  partask --version

Options:
  -j --workers N          Number of worker threads (default: available parallelism).
  -n --count COUNT        Number of tasks (default: 8).
  --fail VALUE            Make the task for VALUE fail, taking its partition with it.
  --delay-ms MS           Sleep this long in every task.
  --cancel-after-ms MS    Cancel the run after this long.
  -h --help               Show this screen.
  --version               Show the version.
";
