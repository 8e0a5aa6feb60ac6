//! Command-line argument parsing.
//!
//! Short options follow getopt conventions: flags may be clustered (`-dd`,
//! `-fd`) and an option value may be attached (`-Fjson`) or given as the next
//! argument (`-F json`). Parsing never touches the filesystem; flag values are
//! collected into a [`Config`] layer that is merged over the configuration file.

use std::fmt;
use std::path::PathBuf;

use crate::commands::ControlVerb;
use crate::common::constants::CHILD_FLAG;
use crate::common::utils::program_name;
use crate::config::Config;
use crate::output::{Destination, OutputFormat};

/// Settings gathered for starting the daemon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    /// Number of `-d` flags.
    pub verbosity: u8,
    /// PID-file and log identity.
    pub ident: String,
    /// File given with `-c`.
    pub config_path: Option<PathBuf>,
    /// Values set on the command line.
    pub overrides: Config,
    /// Set on the re-executed background child.
    pub child: bool,
}

/// What the invocation asked for.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    Run(RunArgs),
    /// Send `verb` to the instance registered under `ident`.
    Control {
        verb: ControlVerb,
        ident: String,
        verbosity: u8,
    },
    ShowHelp,
    ShowVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgsError {
    UnknownFlag(String),
    MissingValue(char),
    InvalidFormat(String),
    InvalidVerb(String),
    InvalidNumber { flag: char, value: String },
    UnexpectedArgument(String),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::UnknownFlag(flag) => write!(f, "unknown option '{flag}'"),
            ArgsError::MissingValue(flag) => write!(f, "option '-{flag}' requires a value"),
            ArgsError::InvalidFormat(value) => write!(
                f,
                "invalid output '{value}', expected json|text optionally followed by :path"
            ),
            ArgsError::InvalidVerb(value) => write!(
                f,
                "unknown command '{value}', expected one of: {}",
                ControlVerb::NAMES.join(", ")
            ),
            ArgsError::InvalidNumber { flag, value } => {
                write!(f, "invalid value '{value}' for option '-{flag}'")
            }
            ArgsError::UnexpectedArgument(arg) => write!(f, "unexpected argument '{arg}'"),
        }
    }
}

impl std::error::Error for ArgsError {}

/// Options that take a value.
const VALUE_FLAGS: &[char] = &['D', 'F', 'k', 'i', 'c', 'm', 't', 's'];

/// Parse the full argument vector, including the program name at index 0.
pub fn parse<I, S>(args: I) -> Result<CliAction, ArgsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
    let argv0 = args.first().map(String::as_str).unwrap_or_default();

    let mut run = RunArgs {
        ident: program_name(argv0),
        ..Default::default()
    };
    let mut verb: Option<ControlVerb> = None;
    let mut show_help = false;
    let mut show_version = false;

    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        if arg == CHILD_FLAG {
            run.child = true;
            continue;
        }
        if arg == "--" {
            if let Some(extra) = rest.next() {
                return Err(ArgsError::UnexpectedArgument(extra.clone()));
            }
            break;
        }
        if arg.starts_with("--") {
            return Err(ArgsError::UnknownFlag(arg.clone()));
        }
        let Some(cluster) = arg.strip_prefix('-').filter(|c| !c.is_empty()) else {
            return Err(ArgsError::UnexpectedArgument(arg.clone()));
        };

        for (at, flag) in cluster.char_indices() {
            if VALUE_FLAGS.contains(&flag) {
                let attached = &cluster[at + flag.len_utf8()..];
                let value = if attached.is_empty() {
                    rest.next().cloned().ok_or(ArgsError::MissingValue(flag))?
                } else {
                    attached.to_string()
                };
                apply_value(flag, &value, &mut run, &mut verb)?;
                break;
            }

            match flag {
                'd' => run.verbosity = run.verbosity.saturating_add(1),
                'f' => run.overrides.foreground = Some(true),
                'h' => show_help = true,
                'V' => show_version = true,
                other => return Err(ArgsError::UnknownFlag(format!("-{other}"))),
            }
        }
    }

    if show_version {
        return Ok(CliAction::ShowVersion);
    }
    if show_help {
        return Ok(CliAction::ShowHelp);
    }
    if let Some(verb) = verb {
        return Ok(CliAction::Control {
            verb,
            ident: run.ident,
            verbosity: run.verbosity,
        });
    }
    Ok(CliAction::Run(run))
}

fn apply_value(
    flag: char,
    value: &str,
    run: &mut RunArgs,
    verb: &mut Option<ControlVerb>,
) -> Result<(), ArgsError> {
    match flag {
        'D' => run.overrides.device = Some(PathBuf::from(value)),
        'F' => {
            let (format, output) = parse_output(value)?;
            run.overrides.format = Some(format);
            run.overrides.output = output;
        }
        'k' => {
            *verb = Some(
                ControlVerb::parse(value).ok_or_else(|| ArgsError::InvalidVerb(value.into()))?,
            );
        }
        'i' => run.ident = value.to_string(),
        'c' => run.config_path = Some(PathBuf::from(value)),
        'm' => {
            let (host, port) = parse_broker(value)?;
            run.overrides.mqtt_host = Some(host);
            run.overrides.mqtt_port = port;
        }
        't' => run.overrides.mqtt_location = Some(value.to_string()),
        's' => {
            let hpa = value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ArgsError::InvalidNumber {
                    flag,
                    value: value.into(),
                })?;
            run.overrides.sea_level_hpa = Some(hpa);
        }
        _ => return Err(ArgsError::UnknownFlag(format!("-{flag}"))),
    }
    Ok(())
}

/// `json|text[:path]`. An empty path or `-` means standard output.
fn parse_output(value: &str) -> Result<(OutputFormat, Option<String>), ArgsError> {
    let (name, path) = match value.split_once(':') {
        Some((name, path)) => (name, Some(path)),
        None => (value, None),
    };
    let format =
        OutputFormat::parse(name).ok_or_else(|| ArgsError::InvalidFormat(value.to_string()))?;
    let output = path.map(|p| match Destination::parse(p) {
        Destination::Stdout => crate::common::constants::STDOUT_TOKEN.to_string(),
        Destination::File(_) => p.to_string(),
    });
    Ok((format, output))
}

/// `host[:port]`.
fn parse_broker(value: &str) -> Result<(String, Option<u16>), ArgsError> {
    let invalid = || ArgsError::InvalidNumber {
        flag: 'm',
        value: value.to_string(),
    };
    match value.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok((host.to_string(), Some(port)))
        }
        None if value.is_empty() => Err(invalid()),
        None => Ok((value.to_string(), None)),
    }
}

/// Displays version information using the logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    crate::logger::write_output(&format!("┗ {}\n", env!("CARGO_PKG_DESCRIPTION")));
}

/// Displays the help message on standard error.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("weatherboard [OPTIONS]");
    log_block_start!("Options:");
    log_indented!("-d                     Raise log verbosity (repeatable)");
    log_indented!("-D <device>            I2C bus device (default /dev/i2c-1)");
    log_indented!("-F <json|text>[:path]  Output format and destination (- = stdout)");
    log_indented!("-i <ident>             Identity for the PID file and log");
    log_indented!("-f                     Stay in the foreground (always when writing to stdout)");
    log_indented!("-c <file>              Read settings from a TOML file");
    log_indented!("-m <host[:port]>       Publish readings to an MQTT broker");
    log_indented!("-t <location>          MQTT topic root (default home)");
    log_indented!("-s <hPa>               Sea-level reference pressure");
    log_indented!("-k <command>           Control a running instance");
    log_indented!("-h                     Print help information");
    log_indented!("-V                     Print version information");
    log_block_start!("Commands:");
    log_indented!("reconfigure            Ask the instance to reload (logged only)");
    log_indented!("shutdown               Stop the instance and wait for it to exit");
    log_indented!("restart                Stop the instance so a new one can start");
    log_indented!("check                  Report whether an instance is alive");
    log_end!();
}
