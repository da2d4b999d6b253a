use super::*;

fn dial() -> ControlId {
    ControlId::new("dial-1")
}

#[test]
fn press_defaults_to_the_first_dial() {
    let command = parse_command("press 10 -2.5", &dial()).expect("parse");
    assert_eq!(
        command,
        Some(Command::Pointer(PointerCommand::Press(PointerSample::new(
            Vec2::new(10.0, -2.5),
            Some(dial()),
        ))))
    );
}

#[test]
fn move_can_name_another_dial() {
    let command = parse_command("  MOVE 1 2 gain ", &dial()).expect("parse");
    assert_eq!(
        command,
        Some(Command::Pointer(PointerCommand::Move(PointerSample::new(
            Vec2::new(1.0, 2.0),
            Some(ControlId::new("gain")),
        ))))
    );
}

#[test]
fn bare_commands_parse() {
    assert_eq!(
        parse_command("release", &dial()),
        Ok(Some(Command::Pointer(PointerCommand::Release)))
    );
    assert_eq!(parse_command("status", &dial()), Ok(Some(Command::Status)));
    assert_eq!(parse_command("quit", &dial()), Ok(Some(Command::Quit)));
    assert_eq!(parse_command("   ", &dial()), Ok(None));
}

#[test]
fn malformed_lines_are_reported() {
    assert_eq!(
        parse_command("spin 1 2", &dial()),
        Err(CommandError::Unknown("spin".to_string()))
    );
    assert_eq!(
        parse_command("press 1", &dial()),
        Err(CommandError::Usage("press"))
    );
    assert_eq!(
        parse_command("move 1 2 gain extra", &dial()),
        Err(CommandError::Usage("move"))
    );
    assert_eq!(
        parse_command("press one 2", &dial()),
        Err(CommandError::NotANumber("one".to_string()))
    );
    assert_eq!(
        parse_command("press NaN 2", &dial()),
        Err(CommandError::NotANumber("NaN".to_string()))
    );
}
