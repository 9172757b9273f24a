//! Command-line surface for `supervisord`, per spec.md §6.
//!
//! Defined in its own module, rather than inline in `main.rs`, so that
//! `build.rs` can `#[path]`-include it for manual-page generation, matching
//! `weaver-cli::cli::Cli`.

use clap::Parser;

/// Runs an arbitrary command as a well-behaved Unix daemon.
///
/// `--` (or the first non-flag token, when `--` is absent) starts the
/// command vector; everything after it is passed through unmodified.
#[derive(Parser, Debug)]
#[command(name = "supervisord", version, about)]
pub struct Cli {
    /// Enables singleton enforcement via `<PID_DIR>/<name>.pid`.
    #[arg(long, value_name = "SHORT_NAME")]
    pub name: Option<String>,

    /// Sets the verbosity threshold; a bare `--debug` is equivalent to
    /// `--debug 1`.
    #[arg(long, num_args = 0..=1, default_missing_value = "1")]
    pub debug: Option<u32>,

    /// The command to run, followed by its arguments.
    #[arg(
        value_name = "COMMAND",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn name_and_command_parse_together() {
        let cli = Cli::parse_from(["supervisord", "--name", "svc", "--", "/bin/sleep", "60"]);
        assert_eq!(cli.name.as_deref(), Some("svc"));
        assert_eq!(cli.command, vec!["/bin/sleep", "60"]);
    }

    #[rstest]
    #[case::absent(&["supervisord", "--", "/bin/true"], None)]
    #[case::bare_flag(&["supervisord", "--debug", "--", "/bin/true"], Some(1))]
    #[case::explicit_level(&["supervisord", "--debug", "3", "--", "/bin/true"], Some(3))]
    fn debug_level_parses_as_expected(#[case] argv: &[&str], #[case] expected: Option<u32>) {
        let cli = Cli::parse_from(argv);
        assert_eq!(cli.debug, expected);
    }

    #[test]
    fn missing_command_parses_to_an_empty_vector() {
        let cli = Cli::parse_from(["supervisord", "--name", "svc"]);
        assert!(cli.command.is_empty());
    }
}
