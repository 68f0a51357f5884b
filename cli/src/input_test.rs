use super::*;

fn command(line: &str) -> Command {
    match parse_line(line) {
        Some(Input::Command(command)) => command,
        other => panic!("{line:?} parsed as {other:?}"),
    }
}

#[test]
fn plain_text_is_sent_verbatim() {
    assert_eq!(command("hello there\n"), Command::Send("hello there".to_owned()));
    assert_eq!(command("  padded  "), Command::Send("  padded  ".to_owned()));
}

#[test]
fn blank_lines_are_skipped() {
    assert_eq!(parse_line(""), None);
    assert_eq!(parse_line("   \r\n"), None);
}

#[test]
fn slash_commands() {
    assert_eq!(command("/nick Selina"), Command::Nick("Selina".to_owned()));
    assert_eq!(command("/nick  The Count "), Command::Nick("The Count".to_owned()));
    assert_eq!(command("/join ch2"), Command::Join(ChannelId::from("ch2")));
    assert_eq!(command("/leave"), Command::Leave);
    assert_eq!(command("/quit"), Command::Quit);
    assert_eq!(command("/exit"), Command::Quit);
    assert_eq!(parse_line("/help"), Some(Input::Help));
}

#[test]
fn double_slash_escapes_a_message() {
    assert_eq!(command("//shrug"), Command::Send("/shrug".to_owned()));
}

#[test]
fn missing_argument_or_unknown_command_is_invalid() {
    assert_eq!(parse_line("/nick"), Some(Input::Invalid("/nick needs an argument".to_owned())));
    assert_eq!(parse_line("/join   "), Some(Input::Invalid("/join needs an argument".to_owned())));
    assert_eq!(parse_line("/dance now"), Some(Input::Invalid("unknown command /dance".to_owned())));
}
