use clap::Parser;
use clm_cli::cli;
use test_r::test;

test_r::enable!();

#[test]
fn build_subcommand_parses_repeated_target_flags() {
    let parsed = cli::Cli::parse_from([
        "clm", "build", "--target", "web", "--target", "pdf", "--watch",
    ]);
    match parsed.command {
        cli::Command::Build { watch, target } => {
            assert!(watch);
            assert_eq!(target, vec!["web".to_string(), "pdf".to_string()]);
        }
        other => panic!("expected Build, got {other:?}"),
    }
}

#[test]
fn default_format_is_default_variant() {
    let parsed = cli::Cli::parse_from(["clm", "targets"]);
    assert!(matches!(parsed.format, cli::OutputFormat::Default));
}

#[test]
fn workers_cleanup_parses_all_and_force_flags() {
    let parsed = cli::Cli::parse_from(["clm", "workers", "cleanup", "--all", "--force"]);
    match parsed.command {
        cli::Command::Workers {
            command: cli::WorkersCommand::Cleanup { all, force },
        } => {
            assert!(all);
            assert!(force);
        }
        other => panic!("expected Workers(Cleanup), got {other:?}"),
    }
}
