//! Mode-stack: batches channel mode deltas into protocol-legal `MODE` lines.
//!
//! There is one open buffer at a time, owned by a (source, channel) pair.
//! A delta for another pair flushes it first. Before every append the
//! buffer checks what the line would look like with the delta included; if
//! that breaks the dialect's parameter count or line length, the buffer is
//! flushed and the delta starts a new line. An idle buffer is flushed at end
//! of turn by a zero-delay timer armed by the owner.

use std::collections::BTreeMap;

use slirc_proto::line::worst_case_prefix_len;
use slirc_proto::{Casemapping, Direction, ModeTable, SimpleModes};
use tracing::{debug, warn};

/// A single change handed to the compressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeDelta {
    /// Parameterless modes. Key and limit bits are ignored here.
    Simple { dir: Direction, modes: SimpleModes },
    /// `+l n`, or `-l` when `dir` is `Del`.
    Limit { dir: Direction, limit: u32 },
    /// Extended mode by slot; `value` is required for `Add`.
    Ext { dir: Direction, slot: usize, value: Option<String> },
    /// Key, list and status modes.
    Param { dir: Direction, letter: char, value: String },
}

/// A flushed line, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeLine {
    pub source: String,
    pub channel: String,
    pub modes: String,
    pub params: Vec<String>,
}

impl ModeLine {
    /// `MODE <channel> <modes> [params]`, without prefix or CRLF.
    pub fn to_wire(&self) -> String {
        let mut line = format!("MODE {} {}", self.channel, self.modes);
        for p in &self.params {
            line.push(' ');
            line.push_str(p);
        }
        line
    }

    /// Length on the wire with the worst-case `:nick!user@host ` prefix and CRLF.
    pub fn worst_case_len(&self) -> usize {
        worst_case_prefix_len(&self.source) + self.to_wire().len() + 2
    }
}

#[derive(Debug, Clone)]
struct Buffer {
    source: String,
    channel: String,
    on: SimpleModes,
    off: SimpleModes,
    /// `Some(0)` is `-l`.
    limit: Option<u32>,
    /// Slot to value; `None` is a removal.
    ext: BTreeMap<usize, Option<String>>,
    pmodes: Vec<(Direction, char)>,
    params: Vec<String>,
}

impl Buffer {
    fn new(source: &str, channel: &str) -> Self {
        Self {
            source: source.to_string(),
            channel: channel.to_string(),
            on: SimpleModes::empty(),
            off: SimpleModes::empty(),
            limit: None,
            ext: BTreeMap::new(),
            pmodes: Vec::new(),
            params: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.on.is_empty()
            && self.off.is_empty()
            && self.limit.is_none()
            && self.ext.is_empty()
            && self.pmodes.is_empty()
    }

    fn has_key(&self) -> bool {
        self.pmodes.iter().any(|&(_, l)| l == 'k')
    }

    fn param_count(&self) -> usize {
        usize::from(matches!(self.limit, Some(n) if n > 0))
            + self.ext.values().filter(|v| v.is_some()).count()
            + self.params.len()
    }

    fn apply(&mut self, delta: &ModeDelta) {
        match delta {
            ModeDelta::Simple { dir, modes } => {
                let modes = *modes - SimpleModes::PARAMETERIZED;
                match dir {
                    Direction::Add => {
                        self.on |= modes;
                        self.off.remove(modes);
                    }
                    Direction::Del => {
                        self.off |= modes;
                        self.on.remove(modes);
                    }
                }
            }
            ModeDelta::Limit { dir, limit } => {
                self.limit = Some(match dir {
                    Direction::Add => *limit,
                    Direction::Del => 0,
                });
            }
            ModeDelta::Ext { dir, slot, value } => {
                let value = match dir {
                    Direction::Add => value.clone(),
                    Direction::Del => None,
                };
                self.ext.insert(*slot, value);
            }
            ModeDelta::Param { dir, letter, value } => {
                self.pmodes.push((*dir, *letter));
                self.params.push(value.clone());
            }
        }
    }

    fn render(&self, table: &ModeTable) -> ModeLine {
        let mut modes = String::new();
        let mut params = Vec::new();
        let mut current: Option<Direction> = None;
        let mut switch = |modes: &mut String, dir: Direction| {
            if current != Some(dir) {
                current = Some(dir);
                modes.push(dir.as_char());
            }
        };

        let ext_letter = |slot: usize| table.ext(slot).map(|m| m.letter);

        let on_letters = table.simple_letters(self.on);
        if !on_letters.is_empty() {
            switch(&mut modes, Direction::Add);
            modes.push_str(&on_letters);
        }
        if let Some(limit) = self.limit.filter(|&n| n > 0) {
            switch(&mut modes, Direction::Add);
            modes.push('l');
            params.push(limit.to_string());
        }
        for (slot, value) in &self.ext {
            if let (Some(value), Some(letter)) = (value, ext_letter(*slot)) {
                switch(&mut modes, Direction::Add);
                modes.push(letter);
                params.push(value.clone());
            }
        }

        let off_letters = table.simple_letters(self.off);
        if !off_letters.is_empty() {
            switch(&mut modes, Direction::Del);
            modes.push_str(&off_letters);
        }
        if self.limit == Some(0) {
            switch(&mut modes, Direction::Del);
            modes.push('l');
        }
        for (slot, value) in &self.ext {
            if let (None, Some(letter)) = (value, ext_letter(*slot)) {
                switch(&mut modes, Direction::Del);
                modes.push(letter);
            }
        }

        for &(dir, letter) in &self.pmodes {
            switch(&mut modes, dir);
            modes.push(letter);
        }
        params.extend(self.params.iter().cloned());

        ModeLine {
            source: self.source.clone(),
            channel: self.channel.clone(),
            modes,
            params,
        }
    }
}

/// The compressor.
pub struct ModeStack {
    table: ModeTable,
    casemap: Casemapping,
    buffer: Option<Buffer>,
    outbox: Vec<ModeLine>,
    turn_flush_armed: bool,
    arm_requested: bool,
}

impl ModeStack {
    pub fn new(table: ModeTable, casemap: Casemapping) -> Self {
        Self {
            table,
            casemap,
            buffer: None,
            outbox: Vec::new(),
            turn_flush_armed: false,
            arm_requested: false,
        }
    }

    pub fn table(&self) -> &ModeTable {
        &self.table
    }

    fn owns(&self, buffer: &Buffer, source: &str, channel: &str) -> bool {
        self.casemap.equals(&buffer.source, source) && self.casemap.equals(&buffer.channel, channel)
    }

    fn fits(&self, buffer: &Buffer) -> bool {
        buffer.param_count() <= self.table.max_modes
            && buffer.render(&self.table).worst_case_len() <= self.table.max_line_len
    }

    /// Whether `delta` fits a `MODE` line on its own.
    pub fn admits(&self, source: &str, channel: &str, delta: &ModeDelta) -> bool {
        let mut buffer = Buffer::new(source, channel);
        buffer.apply(delta);
        buffer.render(&self.table).worst_case_len() <= self.table.max_line_len
    }

    /// Queue one delta from `source` on `channel`.
    ///
    /// Returns false if the delta was refused: an ext mode without a value
    /// or slot, or a delta too long for a line even on its own.
    pub fn push(&mut self, source: &str, channel: &str, delta: ModeDelta) -> bool {
        if matches!(&delta, ModeDelta::Simple { modes, .. } if (*modes - SimpleModes::PARAMETERIZED).is_empty())
        {
            return true;
        }
        if let ModeDelta::Ext { dir: Direction::Add, value: None, slot } = &delta {
            warn!(slot, "ext mode set without a value; ignored");
            return false;
        }
        if let ModeDelta::Ext { slot, .. } = &delta
            && *slot >= self.table.ext_slots()
        {
            warn!(slot, "ext mode slot out of range; ignored");
            return false;
        }
        if !self.admits(source, channel, &delta) {
            warn!(%channel, ?delta, "mode delta longer than a line; refused");
            return false;
        }

        if self
            .buffer
            .as_ref()
            .is_some_and(|b| !self.owns(b, source, channel))
        {
            self.flush_buffer();
        }

        let mut buffer = self
            .buffer
            .take()
            .unwrap_or_else(|| Buffer::new(source, channel));

        let key_clash = matches!(&delta, ModeDelta::Param { letter: 'k', .. }) && buffer.has_key();
        let mut candidate = buffer.clone();
        candidate.apply(&delta);

        if !buffer.is_empty() && (key_clash || !self.fits(&candidate)) {
            self.buffer = Some(buffer);
            self.flush_buffer();
            buffer = Buffer::new(source, channel);
            buffer.apply(&delta);
        } else {
            buffer = candidate;
        }
        self.buffer = Some(buffer);

        if !self.turn_flush_armed {
            self.turn_flush_armed = true;
            self.arm_requested = true;
        }
        true
    }

    pub fn mode_simple(&mut self, source: &str, channel: &str, dir: Direction, modes: SimpleModes) -> bool {
        self.push(source, channel, ModeDelta::Simple { dir, modes })
    }

    pub fn mode_limit(&mut self, source: &str, channel: &str, dir: Direction, limit: u32) -> bool {
        self.push(source, channel, ModeDelta::Limit { dir, limit })
    }

    pub fn mode_ext(&mut self, source: &str, channel: &str, dir: Direction, slot: usize, value: Option<&str>) -> bool {
        self.push(
            source,
            channel,
            ModeDelta::Ext {
                dir,
                slot,
                value: value.map(str::to_string),
            },
        )
    }

    pub fn mode_param(&mut self, source: &str, channel: &str, dir: Direction, letter: char, value: &str) -> bool {
        self.push(
            source,
            channel,
            ModeDelta::Param {
                dir,
                letter,
                value: value.to_string(),
            },
        )
    }

    fn flush_buffer(&mut self) {
        let Some(buffer) = self.buffer.take() else {
            return;
        };
        if buffer.is_empty() {
            return;
        }
        let line = buffer.render(&self.table);
        debug!(source = %line.source, channel = %line.channel, modes = %line.modes, "mode line flushed");
        crate::metrics::record_mode_line();
        self.outbox.push(line);
    }

    /// Send whatever is pending for `channel` now.
    pub fn flush(&mut self, channel: &str) {
        if self
            .buffer
            .as_ref()
            .is_some_and(|b| self.casemap.equals(&b.channel, channel))
        {
            self.flush_buffer();
        }
    }

    pub fn flush_all(&mut self) {
        self.flush_buffer();
    }

    /// Discard anything pending for `channel`.
    pub fn forget(&mut self, channel: &str) {
        if self
            .buffer
            .as_ref()
            .is_some_and(|b| self.casemap.equals(&b.channel, channel))
        {
            self.buffer = None;
        }
    }

    /// End-of-turn timer callback.
    pub fn turn_ended(&mut self) {
        self.turn_flush_armed = false;
        self.flush_all();
    }

    /// Whether the owner should arm the end-of-turn timer. Clears the request.
    pub fn take_arm_request(&mut self) -> bool {
        std::mem::take(&mut self.arm_requested)
    }

    pub fn has_pending(&self) -> bool {
        self.buffer.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// Flushed lines, oldest first.
    pub fn take_lines(&mut self) -> Vec<ModeLine> {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slirc_proto::mode::ExtValidator;

    const CS: &str = "ChanServ";

    fn stack() -> ModeStack {
        let mut table = ModeTable::rfc1459();
        table.add_ext('j', ExtValidator::JoinThrottle).unwrap();
        table.add_ext('f', ExtValidator::Channel).unwrap();
        ModeStack::new(table, Casemapping::Rfc1459)
    }

    #[test]
    fn batches_into_one_line() {
        let mut ms = stack();
        ms.mode_simple(CS, "#test", Direction::Add, SimpleModes::NO_EXTERNAL | SimpleModes::TOPIC);
        ms.mode_simple(CS, "#test", Direction::Del, SimpleModes::SECRET);
        ms.mode_limit(CS, "#test", Direction::Add, 10);
        ms.mode_param(CS, "#test", Direction::Add, 'o', "alice");
        ms.mode_param(CS, "#test", Direction::Del, 'v', "bob");
        assert!(ms.take_lines().is_empty());
        assert!(ms.take_arm_request());
        assert!(!ms.take_arm_request());

        ms.turn_ended();
        let lines = ms.take_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].modes, "+ntl-s+o-v");
        assert_eq!(lines[0].params, vec!["10", "alice", "bob"]);
        assert_eq!(lines[0].to_wire(), "MODE #test +ntl-s+o-v 10 alice bob");
    }

    #[test]
    fn later_simple_delta_cancels_earlier() {
        let mut ms = stack();
        ms.mode_simple(CS, "#a", Direction::Add, SimpleModes::MODERATED);
        ms.mode_simple(CS, "#a", Direction::Del, SimpleModes::MODERATED);
        ms.flush_all();
        assert_eq!(ms.take_lines()[0].modes, "-m");
    }

    #[test]
    fn param_count_splits_lines() {
        let mut ms = stack();
        for nick in ["a", "b", "c", "d", "e"] {
            ms.mode_param(CS, "#a", Direction::Add, 'o', nick);
        }
        ms.flush_all();
        let lines = ms.take_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].modes, "+oooo");
        assert_eq!(lines[1].modes, "+o");
        assert_eq!(lines[1].params, vec!["e"]);
    }

    #[test]
    fn second_key_forces_flush() {
        let mut ms = stack();
        ms.mode_param(CS, "#a", Direction::Del, 'k', "old");
        ms.mode_param(CS, "#a", Direction::Add, 'k', "new");
        ms.flush_all();
        let lines = ms.take_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].to_wire(), "MODE #a -k old");
        assert_eq!(lines[1].to_wire(), "MODE #a +k new");
    }

    #[test]
    fn another_pair_flushes_first() {
        let mut ms = stack();
        ms.mode_simple(CS, "#a", Direction::Add, SimpleModes::MODERATED);
        ms.mode_simple(CS, "#A", Direction::Add, SimpleModes::SECRET);
        ms.mode_simple("OperServ", "#a", Direction::Add, SimpleModes::INVITE);
        ms.flush_all();
        let lines = ms.take_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].modes, "+ms");
        assert_eq!(lines[1].source, "OperServ");
    }

    #[test]
    fn ext_modes_render_with_values() {
        let mut ms = stack();
        ms.mode_ext(CS, "#a", Direction::Add, 0, Some("3:5"));
        ms.mode_ext(CS, "#a", Direction::Del, 1, None);
        ms.mode_limit(CS, "#a", Direction::Del, 0);
        ms.flush_all();
        let line = &ms.take_lines()[0];
        assert_eq!(line.modes, "+j-lf");
        assert_eq!(line.params, vec!["3:5"]);
    }

    #[test]
    fn line_length_splits() {
        let mut ms = stack();
        let long = "x".repeat(200);
        ms.mode_param(CS, "#a", Direction::Add, 'b', &format!("{long}!*@*"));
        ms.mode_param(CS, "#a", Direction::Add, 'b', &format!("*!{long}@*"));
        ms.mode_param(CS, "#a", Direction::Add, 'b', "*!*@short");
        ms.flush_all();
        let lines = ms.take_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.worst_case_len() <= 512));
    }

    #[test]
    fn delta_longer_than_a_line_is_refused() {
        let mut ms = stack();
        let huge = format!("*!*@{}", "x".repeat(600));
        let delta = ModeDelta::Param {
            dir: Direction::Add,
            letter: 'b',
            value: huge.clone(),
        };
        assert!(!ms.admits(CS, "#a", &delta));
        assert!(!ms.mode_param(CS, "#a", Direction::Add, 'b', &huge));
        assert!(!ms.has_pending());
        assert!(ms.mode_param(CS, "#a", Direction::Add, 'b', "*!*@short"));
        ms.flush_all();
        assert_eq!(ms.take_lines()[0].params, vec!["*!*@short"]);
    }

    #[test]
    fn forget_discards() {
        let mut ms = stack();
        ms.mode_simple(CS, "#a", Direction::Add, SimpleModes::MODERATED);
        ms.forget("#other");
        assert!(ms.has_pending());
        ms.forget("#A");
        assert!(!ms.has_pending());
        ms.flush_all();
        assert!(ms.take_lines().is_empty());
    }

    #[test]
    fn flush_only_touches_named_channel() {
        let mut ms = stack();
        ms.mode_simple(CS, "#a", Direction::Add, SimpleModes::MODERATED);
        ms.flush("#b");
        assert!(ms.take_lines().is_empty());
        ms.flush("#a");
        assert_eq!(ms.take_lines().len(), 1);
    }
}
