//! Command-line arguments and the interactive add-on menu.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use crate::addons::DEFAULT_ADDONS_DIR;
use crate::host::{Host, HostConfig, HostError};
use crate::runtime::{DEFAULT_TIMEOUT_MS, DEFAULT_TIMING_SCALE};

/// Exit status used when no add-on can be found.
pub const NO_ADDON_EXIT_CODE: u8 = 100;

/// Exit status for every other failed run.
pub const FAILURE_EXIT_CODE: u8 = 1;

const NO_ADDON_MESSAGE: &str = "Can't find any add-on.";

#[derive(Parser, Debug)]
#[command(name = "web-archiver")]
#[command(version)]
#[command(about = "A web archiving framework", long_about = None)]
pub struct Args {
    /// Add-on to run; prompts for one when omitted
    #[arg(value_name = "ADD-ON")]
    pub addon: Option<String>,

    /// Multiplier applied to every politeness delay
    #[arg(long, default_value_t = DEFAULT_TIMING_SCALE, allow_negative_numbers = true)]
    pub timing_scale: f64,

    /// Milliseconds before a request is abandoned
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT_MS as i64, allow_negative_numbers = true)]
    pub timeout_ms: i64,

    /// Directory searched for add-ons
    #[arg(long, default_value = DEFAULT_ADDONS_DIR)]
    pub addons_dir: PathBuf,

    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            addons_dir: self.addons_dir.clone(),
            timing_scale: self.timing_scale,
            default_timeout_ms: self.timeout_ms,
            rng_seed: None,
        }
    }
}

/// Process exit status for a run that ended with `err`.
pub fn exit_status_for(err: &HostError) -> u8 {
    if err.is_not_found() {
        NO_ADDON_EXIT_CODE
    } else {
        FAILURE_EXIT_CODE
    }
}

/// Lets the user pick one of the add-ons installed for `host`.
///
/// Prints "Can't find any add-on." and returns `None` when nothing is
/// installed or no choice could be read.
pub fn resolve_addon<R, W>(host: &Host, input: &mut R, output: &mut W) -> Option<String>
where
    R: BufRead,
    W: Write,
{
    let candidates = host.discover().unwrap_or_else(|err| {
        log::error!("cannot list {}: {err}", host.addons_dir().display());
        Vec::new()
    });

    let choice = match choose(&candidates, "Select an add-on", input, output) {
        Ok(choice) => choice.map(str::to_owned),
        Err(err) => {
            log::error!("cannot read selection: {err}");
            None
        }
    };

    if choice.is_none() {
        writeln!(output, "{NO_ADDON_MESSAGE}").unwrap_or_else(|err| log::debug!("cannot print to terminal: {err}"));
    }
    choice
}

/// Prints a numbered menu and reads choices until one is valid.
///
/// Returns `None` when there is nothing to choose from or input ends.
pub fn choose<'a, R, W>(
    options: &'a [String],
    prompt: &str,
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<&'a str>>
where
    R: BufRead,
    W: Write,
{
    if options.is_empty() {
        return Ok(None);
    }

    for (index, option) in options.iter().enumerate() {
        writeln!(output, "{}\t{}", index + 1, option)?;
    }

    let mut line = String::new();
    loop {
        write!(output, "{prompt}: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(None);
        }

        match line.trim().parse::<usize>() {
            Ok(choice) if (1..=options.len()).contains(&choice) => {
                return Ok(Some(options[choice - 1].as_str()));
            }
            _ => writeln!(output, "Not a valid value, please try again.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::{AddonError, LoadError};
    use std::io::Cursor;

    fn options() -> Vec<String> {
        vec!["alpha".into(), "beta".into()]
    }

    #[test]
    fn picks_numbered_option() {
        let options = options();
        let mut out = Vec::new();
        let chosen = choose(&options, "Select an add-on", &mut Cursor::new("2\n"), &mut out).unwrap();
        assert_eq!(chosen, Some("beta"));
        let printed = String::from_utf8(out).unwrap();
        assert!(printed.starts_with("1\talpha\n2\tbeta\n"));
    }

    #[test]
    fn retries_until_valid() {
        let options = options();
        let mut out = Vec::new();
        let chosen = choose(&options, "Select", &mut Cursor::new("0\nabc\n1\n"), &mut out).unwrap();
        assert_eq!(chosen, Some("alpha"));
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Not a valid value").count(), 2);
    }

    #[test]
    fn empty_options_or_eof_yield_none() {
        let mut out = Vec::new();
        assert_eq!(choose(&[], "Select", &mut Cursor::new("1\n"), &mut out).unwrap(), None);
        assert_eq!(choose(&options(), "Select", &mut Cursor::new("9\n"), &mut out).unwrap(), None);
    }

    #[test]
    fn not_found_maps_to_dedicated_exit_status() {
        let err = HostError::from(LoadError::ModuleNotFound {
            name: "gallery".into(),
            reason: "no loadable unit".into(),
        });
        assert_eq!(exit_status_for(&err), NO_ADDON_EXIT_CODE);
        assert_eq!(exit_status_for(&err), 100);
    }

    #[test]
    fn other_failures_map_to_generic_exit_status() {
        let ambiguous = HostError::from(LoadError::AmbiguousModule {
            name: "gallery".into(),
            candidates: vec!["a".into(), "b".into()],
        });
        assert_eq!(exit_status_for(&ambiguous), FAILURE_EXIT_CODE);
        assert_eq!(exit_status_for(&HostError::from(AddonError::message("boom"))), FAILURE_EXIT_CODE);
        assert_eq!(exit_status_for(&HostError::Cancelled), FAILURE_EXIT_CODE);
    }

    #[test]
    fn empty_addons_dir_resolves_to_nothing() {
        let root = tempfile::tempdir().unwrap();
        let host = Host::builder().with_addons_dir(root.path()).build().unwrap();

        let mut out = Vec::new();
        let chosen = resolve_addon(&host, &mut Cursor::new("1\n"), &mut out);

        assert_eq!(chosen, None);
        assert_eq!(String::from_utf8(out).unwrap(), "Can't find any add-on.\n");
    }

    #[test]
    fn installed_addon_can_be_picked() {
        let root = tempfile::tempdir().unwrap();
        for name in ["alpha", "beta"] {
            let dir = root.path().join(name);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join(format!("{name}.json")), "{}").unwrap();
        }
        let host = Host::builder().with_addons_dir(root.path()).build().unwrap();

        let mut out = Vec::new();
        let chosen = resolve_addon(&host, &mut Cursor::new("2\n"), &mut out);

        assert_eq!(chosen.as_deref(), Some("beta"));
        assert!(!String::from_utf8(out).unwrap().contains("Can't find"));
    }

    #[test]
    fn parses_defaults() {
        let args = Args::try_parse_from(["web-archiver"]).unwrap();
        assert_eq!(args.addon, None);
        assert_eq!(args.timing_scale, 1.0);
        assert_eq!(args.timeout_ms, 5000);
        assert_eq!(args.addons_dir, PathBuf::from("Addons"));
    }

    #[test]
    fn parses_negative_values_for_validation_later() {
        let args =
            Args::try_parse_from(["web-archiver", "site", "--timing-scale", "-2", "--timeout", "-1"]).unwrap();
        assert_eq!(args.addon.as_deref(), Some("site"));
        let config = args.host_config();
        assert_eq!(config.timing_scale, -2.0);
        assert_eq!(config.default_timeout_ms, -1);
    }
}
