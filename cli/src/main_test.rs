use super::*;
use clap::CommandFactory;

#[test]
fn command_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn flags_override_config() {
    let cli = Cli::try_parse_from([
        "planrelay",
        "watch",
        "--mode",
        "legacy",
        "--ws-url",
        "ws://127.0.0.1:8000/",
        "--user-id",
        "traveler-1",
        "--plan-id",
        "plan-5",
    ])
    .unwrap();

    let config = build_config(&cli).unwrap();

    assert_eq!(config.protocol, Protocol::Legacy);
    assert_eq!(config.ws_url.as_deref(), Some("ws://127.0.0.1:8000"));
    assert_eq!(config.user_id, "traveler-1");
    assert_eq!(config.plan_id.as_deref(), Some("plan-5"));
}

#[test]
fn unknown_protocol_is_rejected_by_parser() {
    let result = Cli::try_parse_from(["planrelay", "--protocol", "carrier-pigeon", "watch"]);
    assert!(result.is_err());
}

#[test]
fn plan_start_parses_goal_and_watch() {
    let cli = Cli::try_parse_from(["planrelay", "plan", "start", "--goal", "Lisbon", "--watch"]).unwrap();
    let Command::Plan(PlanCommand { command: PlanSubcommand::Start { goal, preferences, watch } }) = cli.command else {
        panic!("expected plan start");
    };
    assert_eq!(goal, "Lisbon");
    assert_eq!(preferences, "{}");
    assert!(watch);
}

#[test]
fn send_defaults_to_user_message() {
    let cli = Cli::try_parse_from(["planrelay", "send", "--payload", r#"{"content":"hi"}"#]).unwrap();
    let Command::Send { kind, payload } = cli.command else {
        panic!("expected send");
    };
    assert_eq!(kind, USER_MESSAGE);
    assert_eq!(parse_object("payload", &payload).unwrap()["content"], "hi");
}

#[test]
fn parse_object_rejects_non_objects() {
    assert!(matches!(parse_object("payload", "[1, 2]"), Err(CliError::NotAnObject("payload"))));
    assert!(matches!(parse_object("payload", "{oops"), Err(CliError::InvalidJson(_))));
}
