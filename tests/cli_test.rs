//! Tests for command line parsing and exit codes
use std::path::PathBuf;

use clap::Parser;

use domprune::cli::{Cli, CliError, Commands, ConfigCommands};
use domprune::exitcode;
use rstest::rstest;

#[test]
fn given_run_with_repeated_selectors_when_parsing_then_keeps_order() {
    // Arrange
    let args = [
        "domprune",
        "-dd",
        "run",
        "page",
        "-s",
        ".ad-banner",
        "-s",
        "iframe#comments .reply",
        "--fast",
        "--no-remote",
    ];

    // Act
    let cli = Cli::try_parse_from(args).unwrap();

    // Assert
    assert_eq!(cli.debug, 2);
    match cli.command {
        Some(Commands::Run {
            bundle,
            selectors,
            fast,
            no_remote,
            passive,
            output,
            ..
        }) => {
            assert_eq!(bundle, PathBuf::from("page"));
            assert_eq!(selectors, vec![".ad-banner", "iframe#comments .reply"]);
            assert!(fast);
            assert!(no_remote);
            assert!(!passive);
            assert!(output.is_none());
        }
        other => panic!("expected run, got {other:?}"),
    }
}

#[test]
fn given_config_init_global_when_parsing_then_global_flag_set() {
    // Act
    let cli = Cli::try_parse_from(["domprune", "config", "init", "--global"]).unwrap();

    // Assert
    assert!(matches!(
        cli.command,
        Some(Commands::Config {
            command: ConfigCommands::Init { global: true }
        })
    ));
}

#[rstest]
#[case(CliError::Usage("bad".to_string()), exitcode::USAGE)]
#[case(CliError::InvalidArgs("bad".to_string()), exitcode::USAGE)]
fn given_usage_errors_when_mapping_then_exit_with_usage(#[case] err: CliError, #[case] code: i32) {
    assert_eq!(err.exit_code(), code);
}
