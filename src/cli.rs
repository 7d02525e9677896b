// File: ./src/cli.rs
//! Command-line argument handling and help text.
use anyhow::{Result, anyhow, bail};
use chrono::NaiveTime;
use std::path::PathBuf;

use crate::calendar_config::{EarliestFloor, ModeOverride, SettingsUpdate};
use crate::model::parse_time_of_day;

/// Earliest-time choice given to `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarliestTime {
    /// Use the default from the settings file.
    Default,
    Off,
    At(NaiveTime),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check(PathBuf),
    Add {
        file: PathBuf,
        title: Option<String>,
        earliest: EarliestTime,
        force: bool,
    },
    Remove(u32),
    List,
    Show(u32),
    Set {
        id: u32,
        update: SettingsUpdate,
    },
    Enable(u32),
    Disable(u32),
    Run,
    Daemon,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub root: Option<PathBuf>,
    pub command: Command,
}

/// Parses arguments without the program name.
pub fn parse_args<I, S>(args: I) -> Result<Cli>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut root = None;
    let mut rest: Vec<String> = Vec::new();
    let mut iter = args.into_iter().map(Into::<String>::into);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-r" | "--root" => {
                let path = iter
                    .next()
                    .ok_or_else(|| anyhow!("--root requires a path"))?;
                root = Some(PathBuf::from(path));
            }
            "-h" | "--help" | "help" => {
                return Ok(Cli {
                    root,
                    command: Command::Help,
                });
            }
            _ => rest.push(arg),
        }
    }

    let Some((name, params)) = rest.split_first() else {
        return Ok(Cli {
            root,
            command: Command::Help,
        });
    };

    let command = match name.as_str() {
        "check" => Command::Check(PathBuf::from(single(name, params)?)),
        "add" => parse_add(params)?,
        "remove" => Command::Remove(id_arg(name, params)?),
        "list" => {
            no_args(name, params)?;
            Command::List
        }
        "show" => Command::Show(id_arg(name, params)?),
        "set" => parse_set(params)?,
        "enable" => Command::Enable(id_arg(name, params)?),
        "disable" => Command::Disable(id_arg(name, params)?),
        "run" => {
            no_args(name, params)?;
            Command::Run
        }
        "daemon" => {
            no_args(name, params)?;
            Command::Daemon
        }
        other => bail!("Unknown command '{}'. Try --help.", other),
    };
    Ok(Cli { root, command })
}

fn parse_add(params: &[String]) -> Result<Command> {
    let mut file = None;
    let mut title = None;
    let mut earliest = EarliestTime::Default;
    let mut force = false;

    let mut iter = params.iter();
    while let Some(p) = iter.next() {
        match p.as_str() {
            "--title" => {
                let t = iter.next().ok_or_else(|| anyhow!("--title requires a value"))?;
                title = Some(t.clone());
            }
            "--earliest" => {
                earliest = match earliest_arg(iter.next())? {
                    EarliestFloor::Off => EarliestTime::Off,
                    EarliestFloor::At(t) => EarliestTime::At(t),
                };
            }
            "--force" => force = true,
            flag if flag.starts_with("--") => bail!("Unknown option '{}' for add", flag),
            path => {
                if file.is_some() {
                    bail!("add takes a single calendar file");
                }
                file = Some(PathBuf::from(path));
            }
        }
    }

    Ok(Command::Add {
        file: file.ok_or_else(|| anyhow!("add requires a calendar file"))?,
        title,
        earliest,
        force,
    })
}

fn parse_set(params: &[String]) -> Result<Command> {
    let Some((raw_id, options)) = params.split_first() else {
        bail!("set requires a calendar id");
    };
    let id: u32 = raw_id
        .parse()
        .map_err(|_| anyhow!("Invalid calendar id '{}'", raw_id))?;

    let mut update = SettingsUpdate::default();
    let mut iter = options.iter();
    while let Some(p) = iter.next() {
        match p.as_str() {
            "--title" => {
                let t = iter.next().ok_or_else(|| anyhow!("--title requires a value"))?;
                update.title = Some(t.clone());
            }
            "--date-mode" => update.date_mode = Some(mode_arg(p, iter.next())?),
            "--descr-mode" => update.descr_mode = Some(mode_arg(p, iter.next())?),
            "--earliest" => update.earliest = Some(earliest_arg(iter.next())?),
            other => bail!("Unknown option '{}' for set", other),
        }
    }
    if update.is_empty() {
        bail!("set needs at least one of --title, --date-mode, --descr-mode, --earliest");
    }
    Ok(Command::Set { id, update })
}

fn mode_arg(flag: &str, value: Option<&String>) -> Result<ModeOverride> {
    value
        .ok_or_else(|| anyhow!("{} requires a display mode", flag))?
        .parse()
}

fn earliest_arg(value: Option<&String>) -> Result<EarliestFloor> {
    let v = value.ok_or_else(|| anyhow!("--earliest requires H:MM or 'off'"))?;
    if v == "off" {
        return Ok(EarliestFloor::Off);
    }
    parse_time_of_day(v)
        .map(EarliestFloor::At)
        .ok_or_else(|| anyhow!("Invalid time '{}'", v))
}

fn single<'a>(name: &str, params: &'a [String]) -> Result<&'a str> {
    match params {
        [one] => Ok(one.as_str()),
        _ => bail!("{} takes exactly one argument", name),
    }
}

fn id_arg(name: &str, params: &[String]) -> Result<u32> {
    let raw = single(name, params)?;
    raw.parse()
        .map_err(|_| anyhow!("Invalid calendar id '{}'", raw))
}

fn no_args(name: &str, params: &[String]) -> Result<()> {
    if !params.is_empty() {
        bail!("{} takes no arguments", name);
    }
    Ok(())
}

pub fn print_help(binary_name: &str) {
    println!(
        "LinCal v{} - notifications for linear calendars",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("USAGE:");
    println!("    {} [--root <path>] <command>", binary_name);
    println!();
    println!("COMMANDS:");
    println!("    check <file>                      Parse a calendar file and report errors");
    println!("    add <file> [--title T] [--earliest H:MM|off] [--force]");
    println!("                                      Subscribe to a calendar");
    println!("    remove <id>                       Unsubscribe");
    println!("    list                              List subscribed calendars");
    println!("    show <id>                         Print a calendar's entries");
    println!("    set <id> [--title T] [--date-mode M] [--descr-mode M] [--earliest H:MM|off]");
    println!("                                      Change a subscription's settings");
    println!("    enable <id>                       Turn notifications on");
    println!("    disable <id>                      Turn notifications off");
    println!("    run                               Deliver everything due now and exit");
    println!("    daemon                            Keep delivering notifications until Ctrl-C");
    println!();
    println!("OPTIONS:");
    println!("    -r, --root <path>     Use a different directory for config and data.");
    println!("    -h, --help            Show this help message.");
    println!();
    println!("NOTES:");
    println!("    --force adds a calendar even if the same file is already subscribed.");
    println!("    Without --earliest, the default from config.toml is used.");
    println!("    Display modes M: hideAll, hideFuture, showAll, or inherit to follow the calendar.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryDisplayMode;

    #[test]
    fn test_parse_add() {
        let cli = parse_args(["--root", "/tmp/x", "add", "cal.txt", "--earliest", "7:30"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/x")));
        assert_eq!(
            cli.command,
            Command::Add {
                file: PathBuf::from("cal.txt"),
                title: None,
                earliest: EarliestTime::At(NaiveTime::from_hms_opt(7, 30, 0).unwrap()),
                force: false,
            }
        );

        let cli = parse_args(["add", "--title", "Lent", "--earliest", "off", "--force", "l.txt"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::Add { earliest: EarliestTime::Off, force: true, title: Some(ref t), .. } if t == "Lent"
        ));
    }

    #[test]
    fn test_parse_set() {
        let cli = parse_args([
            "set", "4", "--date-mode", "hideAll", "--descr-mode", "inherit", "--earliest", "off",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Set {
                id: 4,
                update: SettingsUpdate {
                    title: None,
                    date_mode: Some(ModeOverride::Set(EntryDisplayMode::HideAll)),
                    descr_mode: Some(ModeOverride::Inherit),
                    earliest: Some(EarliestFloor::Off),
                },
            }
        );

        let cli = parse_args(["set", "0", "--title", "Lent", "--earliest", "6:45"]).unwrap();
        let Command::Set { update, .. } = cli.command else {
            panic!("expected set");
        };
        assert_eq!(update.title.as_deref(), Some("Lent"));
        assert_eq!(
            update.earliest,
            Some(EarliestFloor::At(NaiveTime::from_hms_opt(6, 45, 0).unwrap()))
        );

        assert!(parse_args(["set", "1"]).is_err());
        assert!(parse_args(["set", "x", "--title", "T"]).is_err());
        assert!(parse_args(["set", "1", "--date-mode", "loud"]).is_err());
        assert!(parse_args(["set", "1", "--descr-mode"]).is_err());
        assert!(parse_args(["set", "1", "--colour", "red"]).is_err());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_args(["show", "3"]).unwrap().command, Command::Show(3));
        assert_eq!(parse_args(["list"]).unwrap().command, Command::List);
        assert_eq!(parse_args(Vec::<String>::new()).unwrap().command, Command::Help);
        assert_eq!(parse_args(["run", "-h"]).unwrap().command, Command::Help);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(["show"]).is_err());
        assert!(parse_args(["show", "x"]).is_err());
        assert!(parse_args(["list", "extra"]).is_err());
        assert!(parse_args(["frobnicate"]).is_err());
        assert!(parse_args(["add"]).is_err());
        assert!(parse_args(["add", "a.txt", "--earliest", "25:00"]).is_err());
        assert!(parse_args(["--root"]).is_err());
    }
}
