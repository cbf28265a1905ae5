use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    Cli::command().debug_assert();
}

#[test]
fn parse_migrate_with_target() {
    let cli = Cli::try_parse_from([
        "outpost",
        "-c",
        "conf/outpost.yml",
        "migrate",
        "--target",
        "6000003",
    ])
    .unwrap();
    assert_eq!(cli.global.config.as_deref(), Some("conf/outpost.yml"));
    match cli.command {
        Commands::Migrate(args) => assert_eq!(args.target, Some(6000003)),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_status_json_with_global_flag_last() {
    let cli = Cli::try_parse_from(["outpost", "status", "--json", "--verbose"]).unwrap();
    assert!(cli.global.verbose);
    assert!(matches!(cli.command, Commands::Status(StatusArgs { json: true })));
}
