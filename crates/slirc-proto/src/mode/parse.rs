//! Channel mode string parsing against a [`ModeTable`].

use super::table::ModeTable;
use super::types::{Direction, ModeClass};

/// One letter of a parsed mode string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub dir: Direction,
    pub letter: char,
    pub class: ModeClass,
    pub param: Option<String>,
}

/// Parse `modes` with `params` into individual changes.
///
/// Unknown letters and letters missing a required parameter are skipped,
/// matching what a server does with a mode string it cannot fully apply.
///
/// ```
/// use slirc_proto::mode::{parse_mode_changes, Direction, ModeTable};
///
/// let table = ModeTable::rfc1459();
/// let changes = parse_mode_changes(&table, "+nt-k+l", &["oldkey", "25"]);
/// assert_eq!(changes.len(), 4);
/// assert_eq!(changes[2].dir, Direction::Del);
/// assert_eq!(changes[3].param.as_deref(), Some("25"));
/// ```
pub fn parse_mode_changes<S: AsRef<str>>(table: &ModeTable, modes: &str, params: &[S]) -> Vec<ModeChange> {
    let mut out = Vec::new();
    let mut dir = Direction::Add;
    let mut params = params.iter().map(|p| p.as_ref());

    for letter in modes.chars() {
        match letter {
            '+' => dir = Direction::Add,
            '-' => dir = Direction::Del,
            _ => {
                let Some(class) = table.classify(letter) else {
                    continue;
                };
                let param = if class.takes_param(dir) {
                    match params.next() {
                        Some(p) => Some(p.to_string()),
                        None => continue,
                    }
                } else {
                    None
                };
                out.push(ModeChange {
                    dir,
                    letter,
                    class,
                    param,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{ExtValidator, SimpleModes};

    #[test]
    fn test_parse_simple_and_status() {
        let table = ModeTable::rfc1459();
        let changes = parse_mode_changes(&table, "+s-o+v", &["alice", "bob"]);
        assert_eq!(
            changes,
            vec![
                ModeChange {
                    dir: Direction::Add,
                    letter: 's',
                    class: ModeClass::Simple(SimpleModes::SECRET),
                    param: None
                },
                ModeChange {
                    dir: Direction::Del,
                    letter: 'o',
                    class: ModeClass::Status,
                    param: Some("alice".into())
                },
                ModeChange {
                    dir: Direction::Add,
                    letter: 'v',
                    class: ModeClass::Status,
                    param: Some("bob".into())
                },
            ]
        );
    }

    #[test]
    fn test_limit_removal_takes_no_param() {
        let table = ModeTable::rfc1459();
        let changes = parse_mode_changes(&table, "-l+b", &["*!*@x"]);
        assert_eq!(changes[0].param, None);
        assert_eq!(changes[1].param.as_deref(), Some("*!*@x"));
    }

    #[test]
    fn test_unknown_letters_and_missing_params_skipped() {
        let mut table = ModeTable::rfc1459();
        table.add_ext('j', ExtValidator::JoinThrottle).unwrap();
        let changes = parse_mode_changes::<&str>(&table, "+Zjn", &[]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].letter, 'n');
    }
}
