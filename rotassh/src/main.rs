//! Command-line front end.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::{debug, error, info};

use rotassh::batch::{CredentialEntry, CredentialRecord, read_credentials};
use rotassh::config::{DEFAULT_SETTINGS_FILE, Settings};
use rotassh::{BatchOutcome, CredentialChanger, ErrorPolicy, Orchestrator, SshConnector};

/// Exit status for a batch that finished with recorded failures.
const EXIT_COMPLETED_WITH_ERRORS: u8 = 2;

const USAGE: &str = "\
rotassh [-c <settings>] <filename>
  rotassh [-c <settings>] <username> <password> <new_password> [hosts]";

const AFTER_HELP: &str = "\
Arguments:
  filename      file containing lines as: username password new_password [hosts]
  username      user name (to connect via ssh)
  password      user password (to connect via ssh)
  new_password  user new password
  hosts         comma separated host IPs/names (optional, can be set in the settings file)

Examples:
  rotassh users_to_update.txt
  rotassh testuser qwerty qwerty123
  rotassh testuser qwerty qwerty123 10.18.40.30,10.18.40.31";

#[derive(Parser, Debug)]
#[command(
    name = "rotassh",
    version,
    about = "Change user passwords on many hosts over SSH",
    override_usage = USAGE,
    after_help = AFTER_HELP,
    disable_help_flag = true
)]
struct Cli {
    /// Settings file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// `<filename>` or `<username> <password> <new_password> [hosts]`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    args: Vec<String>,
}

/// What the positional arguments ask for.
#[derive(Debug, PartialEq, Eq)]
enum Mode {
    File(PathBuf),
    Single(Vec<String>),
}

impl Mode {
    /// Validate positional arguments; `None` means usage should be printed.
    fn from_args(args: &[String]) -> Option<Self> {
        if args.first().is_some_and(|arg| is_help_flag(arg)) {
            return None;
        }
        match args.len() {
            1 => Some(Mode::File(PathBuf::from(&args[0]))),
            3 | 4 => Some(Mode::Single(args.to_vec())),
            _ => None,
        }
    }
}

/// `-h`, `--help`, `-help`, `--h`, ...
fn is_help_flag(arg: &str) -> bool {
    arg.starts_with('-') && matches!(arg.trim_start_matches('-'), "h" | "help")
}

fn print_usage() {
    println!("{}", Cli::command().render_help());
}

/// Print to the console and duplicate into the log.
fn report(message: &str) {
    println!("{}", message);
    info!("{}", message);
}

/// Print the final summary and pick the exit status.
fn summarize(outcome: &BatchOutcome, policy: ErrorPolicy) -> u8 {
    println!();
    if outcome.is_success() {
        report("Password change completed successfully.");
        return 0;
    }

    report(&format!(
        "There were some errors ({} failed, {} succeeded), please check logs.",
        outcome.failure_count(),
        outcome.success_count()
    ));
    if outcome.stopped_early {
        report("The process stopped due to 'ignore_errors' setting is false.");
    }
    if policy == ErrorPolicy::ContinueOnError {
        report("Password change completed with errors.");
    }
    EXIT_COMPLETED_WITH_ERRORS
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.kind() == ErrorKind::DisplayVersion => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            debug!("{}", err);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let Some(mode) = Mode::from_args(&cli.args) else {
        print_usage();
        return ExitCode::FAILURE;
    };

    let settings = match Settings::load_or_default(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Failed to load settings from {}: {}", cli.config.display(), err);
            return ExitCode::FAILURE;
        }
    };
    let default_hosts = settings.default_hosts();

    let entries = match mode {
        Mode::File(path) => {
            if !path.exists() {
                report("The file provided does not exist");
                return ExitCode::FAILURE;
            }
            match read_credentials(&path, &default_hosts) {
                Ok(entries) => entries,
                Err(err) => {
                    error!("{}", err);
                    return ExitCode::FAILURE;
                }
            }
        }
        Mode::Single(fields) => vec![CredentialEntry {
            line: None,
            record: CredentialRecord::from_fields(&fields, &default_hosts),
        }],
    };

    let policy = settings.error_policy();
    let changer = CredentialChanger::new(
        SshConnector::new(settings.ssh.clone()),
        settings.expect_config(),
    );
    let mut orchestrator = Orchestrator::new(changer, policy);

    let outcome = orchestrator.run_records(entries).await;
    ExitCode::from(summarize(&outcome, policy))
}
