//! Dialect mode table.
//!
//! Each server dialect supports a different set of channel mode letters. The
//! table maps letters to [`ModeClass`] and carries the per-line limits the
//! dialect enforces on `MODE` output.

use super::types::{ExtValidator, ModeClass, SimpleModes};
use crate::error::ProtoError;
use crate::line::{DEFAULT_MAX_MODES, MAX_LINE_LEN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleMode {
    pub letter: char,
    pub bit: SimpleModes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtMode {
    pub letter: char,
    pub validator: ExtValidator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMode {
    pub letter: char,
    pub prefix: char,
}

#[derive(Debug, Clone)]
pub struct ModeTable {
    simple: Vec<SimpleMode>,
    ext: Vec<ExtMode>,
    list: Vec<char>,
    status: Vec<StatusMode>,
    next_bit: u32,
    /// Maximum parameterized modes per `MODE` line.
    pub max_modes: usize,
    /// Maximum line length including CRLF.
    pub max_line_len: usize,
}

const BASE_SIMPLE: [(char, SimpleModes); 6] = [
    ('i', SimpleModes::INVITE),
    ('m', SimpleModes::MODERATED),
    ('n', SimpleModes::NO_EXTERNAL),
    ('p', SimpleModes::PRIVATE),
    ('s', SimpleModes::SECRET),
    ('t', SimpleModes::TOPIC),
];

impl Default for ModeTable {
    fn default() -> Self {
        Self::rfc1459()
    }
}

impl ModeTable {
    /// The RFC 1459 baseline: `imnpst`, key, limit, bans, op and voice.
    pub fn rfc1459() -> Self {
        Self {
            simple: BASE_SIMPLE
                .iter()
                .map(|&(letter, bit)| SimpleMode { letter, bit })
                .collect(),
            ext: Vec::new(),
            list: vec!['b'],
            status: vec![
                StatusMode { letter: 'o', prefix: '@' },
                StatusMode { letter: 'v', prefix: '+' },
            ],
            next_bit: SimpleModes::FIRST_DIALECT_BIT,
            max_modes: DEFAULT_MAX_MODES,
            max_line_len: MAX_LINE_LEN,
        }
    }

    fn check_free(&self, letter: char) -> Result<(), ProtoError> {
        if !letter.is_ascii_alphabetic() {
            return Err(ProtoError::InvalidModeLetter(letter));
        }
        if self.classify(letter).is_some() {
            return Err(ProtoError::DuplicateModeLetter(letter));
        }
        Ok(())
    }

    /// Add a dialect-specific parameterless mode, assigning it the next free bit.
    pub fn add_simple(&mut self, letter: char) -> Result<SimpleModes, ProtoError> {
        self.check_free(letter)?;
        if self.next_bit == 0 {
            return Err(ProtoError::TooManySimpleModes(self.simple.len()));
        }
        let bit = SimpleModes::from_bits_retain(self.next_bit);
        self.next_bit = self.next_bit.checked_shl(1).unwrap_or(0);
        self.simple.push(SimpleMode { letter, bit });
        Ok(bit)
    }

    /// Add an extended (type C) mode; returns its slot index.
    pub fn add_ext(&mut self, letter: char, validator: ExtValidator) -> Result<usize, ProtoError> {
        self.check_free(letter)?;
        self.ext.push(ExtMode { letter, validator });
        Ok(self.ext.len() - 1)
    }

    pub fn add_list(&mut self, letter: char) -> Result<(), ProtoError> {
        self.check_free(letter)?;
        self.list.push(letter);
        Ok(())
    }

    pub fn add_status(&mut self, letter: char, prefix: char) -> Result<(), ProtoError> {
        self.check_free(letter)?;
        self.status.push(StatusMode { letter, prefix });
        Ok(())
    }

    pub fn classify(&self, letter: char) -> Option<ModeClass> {
        match letter {
            'k' => return Some(ModeClass::Key),
            'l' => return Some(ModeClass::Limit),
            _ => {}
        }
        if let Some(m) = self.simple.iter().find(|m| m.letter == letter) {
            return Some(ModeClass::Simple(m.bit));
        }
        if let Some(slot) = self.ext.iter().position(|m| m.letter == letter) {
            return Some(ModeClass::Ext(slot));
        }
        if self.list.contains(&letter) {
            return Some(ModeClass::List);
        }
        if self.status.iter().any(|m| m.letter == letter) {
            return Some(ModeClass::Status);
        }
        None
    }

    pub fn simple_bit(&self, letter: char) -> Option<SimpleModes> {
        match self.classify(letter)? {
            ModeClass::Simple(bit) => Some(bit),
            ModeClass::Key => Some(SimpleModes::KEY),
            ModeClass::Limit => Some(SimpleModes::LIMIT),
            _ => None,
        }
    }

    /// Render the letters for a set of simple bits in table order.
    ///
    /// Key and limit are never included; they travel with parameters.
    pub fn simple_letters(&self, modes: SimpleModes) -> String {
        self.simple
            .iter()
            .filter(|m| modes.contains(m.bit))
            .map(|m| m.letter)
            .collect()
    }

    pub fn ext_slots(&self) -> usize {
        self.ext.len()
    }

    pub fn ext(&self, slot: usize) -> Option<&ExtMode> {
        self.ext.get(slot)
    }

    pub fn ext_slot(&self, letter: char) -> Option<usize> {
        self.ext.iter().position(|m| m.letter == letter)
    }

    pub fn has_status(&self, letter: char) -> bool {
        self.status.iter().any(|m| m.letter == letter)
    }

    pub fn is_list(&self, letter: char) -> bool {
        self.list.contains(&letter)
    }
}
