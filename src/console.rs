//! Line commands for the host console.

use anyhow::{anyhow, bail, Result};

use crate::settings::EmergencyContact;

pub const HELP: &str = "\
commands:
  sos <medical|security|accident|lost> [message]   start the countdown
  note <text>                                     attach details to the running alert
  cancel                                          cancel the running alert
  send                                            send the running alert now
  status                                          show the running alert
  history [n]                                     list recent alerts
  stats                                           alert totals by status
  sms on|off                                      toggle SMS to emergency contacts
  witnesses on|off                                toggle nearby witness alerts
  contact add <name>|<relation>|<phone>           add an emergency contact
  contacts                                        list emergency contacts
  help                                            show this text
  quit                                            exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Sos {
        emergency_type: String,
        message: Option<String>,
    },
    Note(String),
    Cancel,
    Send,
    Status,
    History(Option<u32>),
    Stats,
    Sms(bool),
    Witnesses(bool),
    AddContact(EmergencyContact),
    Contacts,
    Help,
    Quit,
}

fn parse_toggle(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" => Ok(true),
        "off" | "false" | "no" => Ok(false),
        other => bail!("expected on or off, got '{other}'"),
    }
}

fn parse_contact(raw: &str) -> Result<EmergencyContact> {
    let parts: Vec<&str> = raw.split('|').map(str::trim).collect();
    match parts.as_slice() {
        [name, relation, phone] => Ok(EmergencyContact {
            name: name.to_string(),
            relation: relation.to_string(),
            phone: phone.to_string(),
        }),
        _ => bail!("expected <name>|<relation>|<phone>"),
    }
}

/// Returns `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "sos" => {
            let (emergency_type, message) = match rest.split_once(char::is_whitespace) {
                Some((kind, message)) => (kind, Some(message.trim().to_string())),
                None => (rest, None),
            };
            ConsoleCommand::Sos {
                emergency_type: emergency_type.to_string(),
                message: message.filter(|m| !m.is_empty()),
            }
        }
        "note" if !rest.is_empty() => ConsoleCommand::Note(rest.to_string()),
        "note" => bail!("note needs some text"),
        "cancel" => ConsoleCommand::Cancel,
        "send" => ConsoleCommand::Send,
        "status" => ConsoleCommand::Status,
        "history" if rest.is_empty() => ConsoleCommand::History(None),
        "history" => ConsoleCommand::History(Some(
            rest.parse()
                .map_err(|_| anyhow!("history limit must be a number"))?,
        )),
        "stats" => ConsoleCommand::Stats,
        "sms" => ConsoleCommand::Sms(parse_toggle(rest)?),
        "witnesses" => ConsoleCommand::Witnesses(parse_toggle(rest)?),
        "contact" => match rest.split_once(char::is_whitespace) {
            Some(("add", raw)) => ConsoleCommand::AddContact(parse_contact(raw)?),
            _ => bail!("usage: contact add <name>|<relation>|<phone>"),
        },
        "contacts" => ConsoleCommand::Contacts,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };

    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sos_with_and_without_message() {
        assert_eq!(
            parse_command("sos medical").unwrap(),
            Some(ConsoleCommand::Sos {
                emergency_type: "medical".into(),
                message: None
            })
        );
        assert_eq!(
            parse_command("  SOS lost   near the old harbour ").unwrap(),
            Some(ConsoleCommand::Sos {
                emergency_type: "lost".into(),
                message: Some("near the old harbour".into())
            })
        );
        // Type validation is the controller's job.
        assert_eq!(
            parse_command("sos").unwrap(),
            Some(ConsoleCommand::Sos {
                emergency_type: String::new(),
                message: None
            })
        );
    }

    #[test]
    fn parses_toggles_and_limits() {
        assert_eq!(parse_command("sms off").unwrap(), Some(ConsoleCommand::Sms(false)));
        assert_eq!(
            parse_command("witnesses ON").unwrap(),
            Some(ConsoleCommand::Witnesses(true))
        );
        assert!(parse_command("sms maybe").is_err());
        assert_eq!(
            parse_command("history 5").unwrap(),
            Some(ConsoleCommand::History(Some(5)))
        );
        assert!(parse_command("history lots").is_err());
    }

    #[test]
    fn parses_contacts() {
        assert_eq!(
            parse_command("contact add John Doe | Brother | +1 234 567 8900").unwrap(),
            Some(ConsoleCommand::AddContact(EmergencyContact {
                name: "John Doe".into(),
                relation: "Brother".into(),
                phone: "+1 234 567 8900".into(),
            }))
        );
        assert!(parse_command("contact add John").is_err());
        assert!(parse_command("contact remove John").is_err());
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert!(parse_command("dance").is_err());
        assert!(parse_command("note").is_err());
        assert_eq!(parse_command("quit").unwrap(), Some(ConsoleCommand::Quit));
    }
}
