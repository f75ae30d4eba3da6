//! Event bridge: the line protocol spoken by the dialect parser.
//!
//! One command per line, whitespace separated:
//!
//! ```text
//! USER nick user host server        NICK old new        QUIT nick
//! OPER nick [OFF]                   LOGIN nick account|*
//! JOIN #chan nick [status|-] [ts]   PART #chan nick     KICK #chan nick
//! MODE source #chan modes [params...]
//! REGISTER account                  DROP account|!group
//! CREGISTER nick #chan              CDROP #chan
//! ACCESS nick #chan target flags|TEMPLATE
//! AKICK nick #chan ADD target [duration]
//! AKICK nick #chan DEL target
//! MLOCK nick #chan modes [params...]
//! TEMPLATE nick #chan name flags
//! SET nick #chan option ON|OFF
//! HOLD #chan mask duration
//! ```
//!
//! Durations are seconds, optionally suffixed with `s`, `m`, `h` or `d`.

use thiserror::Error;
use tracing::{debug, warn};

use crate::channel::ChannelFlags;
use crate::error::ServiceError;
use crate::services::Services;
use crate::telemetry::{CommandTimer, spans};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("empty line")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command}: expected {expected}")]
    Syntax {
        command: &'static str,
        expected: &'static str,
    },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unknown channel option: {0}")]
    UnknownOption(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl BridgeError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::UnknownCommand(_) => "unknown_command",
            Self::Syntax { .. } => "syntax",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::InvalidNumber(_) => "invalid_number",
            Self::UnknownOption(_) => "unknown_option",
            Self::Service(e) => e.error_code(),
        }
    }
}

/// A parsed bridge line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    User { nick: String, user: String, host: String, server: String },
    Nick { old: String, new: String },
    Quit { nick: String },
    Oper { nick: String, on: bool },
    Login { nick: String, account: Option<String> },
    Join { channel: String, nick: String, status: String, ts: i64 },
    Part { channel: String, nick: String },
    Kick { channel: String, nick: String },
    Mode { source: String, channel: String, modes: String, params: Vec<String> },
    Register { account: String },
    Drop { name: String },
    CRegister { nick: String, channel: String },
    CDrop { channel: String },
    Access { nick: String, channel: String, target: String, flags: String },
    AkickAdd { nick: String, channel: String, target: String, duration: Option<u64> },
    AkickDel { nick: String, channel: String, target: String },
    Mlock { nick: String, channel: String, modes: String, params: Vec<String> },
    Template { nick: String, channel: String, name: String, flags: String },
    Set { nick: String, channel: String, option: ChannelFlags, on: bool },
    Hold { channel: String, mask: String, duration: u64 },
}

impl BridgeCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::User { .. } => "USER",
            Self::Nick { .. } => "NICK",
            Self::Quit { .. } => "QUIT",
            Self::Oper { .. } => "OPER",
            Self::Login { .. } => "LOGIN",
            Self::Join { .. } => "JOIN",
            Self::Part { .. } => "PART",
            Self::Kick { .. } => "KICK",
            Self::Mode { .. } => "MODE",
            Self::Register { .. } => "REGISTER",
            Self::Drop { .. } => "DROP",
            Self::CRegister { .. } => "CREGISTER",
            Self::CDrop { .. } => "CDROP",
            Self::Access { .. } => "ACCESS",
            Self::AkickAdd { .. } | Self::AkickDel { .. } => "AKICK",
            Self::Mlock { .. } => "MLOCK",
            Self::Template { .. } => "TEMPLATE",
            Self::Set { .. } => "SET",
            Self::Hold { .. } => "HOLD",
        }
    }
}

/// `600`, `30s`, `10m`, `2h`, `7d`.
pub fn parse_duration(text: &str) -> Result<u64, BridgeError> {
    let invalid = || BridgeError::InvalidDuration(text.to_string());
    let (digits, unit) = match text.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&text[..i], c.to_ascii_lowercase()),
        _ => (text, 's'),
    };
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

fn channel_option(name: &str) -> Result<ChannelFlags, BridgeError> {
    ChannelFlags::from_name(&name.to_ascii_uppercase())
        .filter(|f| ChannelFlags::PERSISTENT.contains(*f))
        .ok_or_else(|| BridgeError::UnknownOption(name.to_string()))
}

fn on_off(word: &str) -> Option<bool> {
    match word.to_ascii_uppercase().as_str() {
        "ON" => Some(true),
        "OFF" => Some(false),
        _ => None,
    }
}

/// Parse one line.
pub fn parse_line(line: &str) -> Result<BridgeCommand, BridgeError> {
    let mut words = line.split_whitespace();
    let command = words.next().ok_or(BridgeError::Empty)?.to_ascii_uppercase();
    let args: Vec<&str> = words.collect();
    let arg = |i: usize, command: &'static str, expected: &'static str| {
        args.get(i)
            .map(|s| s.to_string())
            .ok_or(BridgeError::Syntax { command, expected })
    };
    let rest = |from: usize| args.iter().skip(from).map(|s| s.to_string()).collect::<Vec<_>>();

    let cmd = match command.as_str() {
        "USER" => {
            const E: &str = "nick user host server";
            BridgeCommand::User {
                nick: arg(0, "USER", E)?,
                user: arg(1, "USER", E)?,
                host: arg(2, "USER", E)?,
                server: arg(3, "USER", E)?,
            }
        }
        "NICK" => BridgeCommand::Nick {
            old: arg(0, "NICK", "old new")?,
            new: arg(1, "NICK", "old new")?,
        },
        "QUIT" => BridgeCommand::Quit {
            nick: arg(0, "QUIT", "nick")?,
        },
        "OPER" => BridgeCommand::Oper {
            nick: arg(0, "OPER", "nick [OFF]")?,
            on: args.get(1).and_then(|w| on_off(w)).unwrap_or(true),
        },
        "LOGIN" => {
            let nick = arg(0, "LOGIN", "nick account|*")?;
            let account = arg(1, "LOGIN", "nick account|*")?;
            BridgeCommand::Login {
                nick,
                account: (account != "*").then_some(account),
            }
        }
        "JOIN" => {
            const E: &str = "#chan nick [status|-] [ts]";
            let status = args.get(2).filter(|s| **s != "-").unwrap_or(&"");
            let ts = match args.get(3) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| BridgeError::InvalidNumber(raw.to_string()))?,
                None => 0,
            };
            BridgeCommand::Join {
                channel: arg(0, "JOIN", E)?,
                nick: arg(1, "JOIN", E)?,
                status: status.to_string(),
                ts,
            }
        }
        "PART" => BridgeCommand::Part {
            channel: arg(0, "PART", "#chan nick")?,
            nick: arg(1, "PART", "#chan nick")?,
        },
        "KICK" => BridgeCommand::Kick {
            channel: arg(0, "KICK", "#chan nick")?,
            nick: arg(1, "KICK", "#chan nick")?,
        },
        "MODE" => {
            const E: &str = "source #chan modes [params...]";
            BridgeCommand::Mode {
                source: arg(0, "MODE", E)?,
                channel: arg(1, "MODE", E)?,
                modes: arg(2, "MODE", E)?,
                params: rest(3),
            }
        }
        "REGISTER" => BridgeCommand::Register {
            account: arg(0, "REGISTER", "account")?,
        },
        "DROP" => BridgeCommand::Drop {
            name: arg(0, "DROP", "account|!group")?,
        },
        "CREGISTER" => BridgeCommand::CRegister {
            nick: arg(0, "CREGISTER", "nick #chan")?,
            channel: arg(1, "CREGISTER", "nick #chan")?,
        },
        "CDROP" => BridgeCommand::CDrop {
            channel: arg(0, "CDROP", "#chan")?,
        },
        "ACCESS" => {
            const E: &str = "nick #chan target flags";
            BridgeCommand::Access {
                nick: arg(0, "ACCESS", E)?,
                channel: arg(1, "ACCESS", E)?,
                target: arg(2, "ACCESS", E)?,
                flags: arg(3, "ACCESS", E)?,
            }
        }
        "AKICK" => {
            const E: &str = "nick #chan ADD|DEL target [duration]";
            let nick = arg(0, "AKICK", E)?;
            let channel = arg(1, "AKICK", E)?;
            let sub = arg(2, "AKICK", E)?.to_ascii_uppercase();
            let target = arg(3, "AKICK", E)?;
            match sub.as_str() {
                "ADD" => BridgeCommand::AkickAdd {
                    nick,
                    channel,
                    target,
                    duration: args.get(4).map(|d| parse_duration(d)).transpose()?,
                },
                "DEL" => BridgeCommand::AkickDel {
                    nick,
                    channel,
                    target,
                },
                _ => {
                    return Err(BridgeError::Syntax {
                        command: "AKICK",
                        expected: E,
                    });
                }
            }
        }
        "MLOCK" => {
            const E: &str = "nick #chan modes [params...]";
            BridgeCommand::Mlock {
                nick: arg(0, "MLOCK", E)?,
                channel: arg(1, "MLOCK", E)?,
                modes: arg(2, "MLOCK", E)?,
                params: rest(3),
            }
        }
        "TEMPLATE" => {
            const E: &str = "nick #chan name flags";
            BridgeCommand::Template {
                nick: arg(0, "TEMPLATE", E)?,
                channel: arg(1, "TEMPLATE", E)?,
                name: arg(2, "TEMPLATE", E)?,
                flags: arg(3, "TEMPLATE", E)?,
            }
        }
        "SET" => {
            const E: &str = "nick #chan option ON|OFF";
            let on = args.get(3).and_then(|w| on_off(w)).ok_or(BridgeError::Syntax {
                command: "SET",
                expected: E,
            })?;
            BridgeCommand::Set {
                nick: arg(0, "SET", E)?,
                channel: arg(1, "SET", E)?,
                option: channel_option(&arg(2, "SET", E)?)?,
                on,
            }
        }
        "HOLD" => {
            const E: &str = "#chan mask duration";
            BridgeCommand::Hold {
                channel: arg(0, "HOLD", E)?,
                mask: arg(1, "HOLD", E)?,
                duration: parse_duration(&arg(2, "HOLD", E)?)?,
            }
        }
        _ => return Err(BridgeError::UnknownCommand(command)),
    };
    Ok(cmd)
}

/// Parse and run one line against `services`.
pub fn dispatch(services: &mut Services, line: &str) -> Result<(), BridgeError> {
    let command = parse_line(line)?;
    let name = command.name();
    let _timer = CommandTimer::new(name);
    let _span = spans::command(name, line).entered();
    debug!(command = name, "bridge command");

    let result = execute(services, command);
    if let Err(e) = &result {
        crate::metrics::record_command_error(name, e.error_code());
        warn!(command = name, error = %e, "bridge command failed");
    }
    result
}

fn execute(services: &mut Services, command: BridgeCommand) -> Result<(), BridgeError> {
    match command {
        BridgeCommand::User { nick, user, host, server } => services.user_connect(&nick, &user, &host, &server),
        BridgeCommand::Nick { old, new } => services.nick_change(&old, &new),
        BridgeCommand::Quit { nick } => services.user_quit(&nick),
        BridgeCommand::Oper { nick, on } => services.set_oper(&nick, on)?,
        BridgeCommand::Login { nick, account: Some(account) } => services.login(&nick, &account)?,
        BridgeCommand::Login { nick, account: None } => services.logout(&nick)?,
        BridgeCommand::Join { channel, nick, status, ts } => services.join(&channel, &nick, &status, ts),
        BridgeCommand::Part { channel, nick } => services.part(&channel, &nick),
        BridgeCommand::Kick { channel, nick } => services.kick(&channel, &nick),
        BridgeCommand::Mode { source, channel, modes, params } => {
            services.channel_mode(&source, &channel, &modes, params.as_slice());
        }
        BridgeCommand::Register { account } => {
            services.register_account(&account)?;
        }
        BridgeCommand::Drop { name } => services.drop_entity(&name)?,
        BridgeCommand::CRegister { nick, channel } => services.register_channel_for(&nick, &channel)?,
        BridgeCommand::CDrop { channel } => services.drop_channel(&channel)?,
        BridgeCommand::Access { nick, channel, target, flags } => {
            services.access(&nick, &channel, &target, &flags)?;
        }
        BridgeCommand::AkickAdd { nick, channel, target, duration } => {
            services.akick_add(&nick, &channel, &target, duration)?;
        }
        BridgeCommand::AkickDel { nick, channel, target } => {
            services.akick_del(&nick, &channel, &target)?;
        }
        BridgeCommand::Mlock { nick, channel, modes, params } => {
            services.set_mlock(&nick, &channel, &modes, params.as_slice())?;
        }
        BridgeCommand::Template { nick, channel, name, flags } => {
            services.set_template(&nick, &channel, &name, &flags)?;
        }
        BridgeCommand::Set { nick, channel, option, on } => services.set_channel_flag(&nick, &channel, option, on)?,
        BridgeCommand::Hold { channel, mask, duration } => services.place_hold(&channel, &mask, duration)?,
    }
    Ok(())
}
