// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use super::protocol::Frame;
use super::{Terminal, TerminalActivity, TerminalId};
use std::collections::BTreeMap;

struct Session {
    terminal: Terminal,
    active: bool,
}

/// Connected sessions and their activity flags.
///
/// The aggregate ("is any terminal active") is the same in both modes. In
/// global mode every session that can issue commands reports the shared
/// aggregate instead of its own flag. Mutators return whether the aggregate
/// changed so the host can announce it.
pub struct TerminalRegistry {
    sessions: BTreeMap<TerminalId, Session>,
    global: bool,
}

impl TerminalRegistry {
    pub fn new(global: bool) -> Self {
        Self {
            sessions: BTreeMap::new(),
            global,
        }
    }

    pub fn insert(&mut self, terminal: Terminal) -> bool {
        self.track(|sessions| {
            let active = terminal.mode().initially_active();
            sessions.insert(terminal.id(), Session { terminal, active });
        })
    }

    pub fn remove(&mut self, id: TerminalId) -> (Option<Terminal>, bool) {
        let mut removed = None;
        let changed = self.track(|sessions| removed = sessions.remove(&id).map(|s| s.terminal));
        (removed, changed)
    }

    /// A command arrived from `id`: passive and write-only sessions become
    /// active. Read-only sessions never do.
    pub fn record_command(&mut self, id: TerminalId) -> bool {
        self.track(|sessions| {
            if let Some(session) = sessions.get_mut(&id)
                && session.terminal.mode().can_send()
            {
                session.active = true;
            }
        })
    }

    /// Mark every session that can issue commands active or inactive.
    pub fn set_all_active(&mut self, active: bool) -> bool {
        self.track(|sessions| {
            for session in sessions.values_mut() {
                if session.terminal.mode().can_send() {
                    session.active = active;
                }
            }
        })
    }

    /// Returns whether the mode flipped.
    pub fn set_global(&mut self, global: bool) -> bool {
        let changed = self.global != global;
        self.global = global;
        changed
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn is_active(&self) -> bool {
        self.sessions.values().any(|s| s.active)
    }

    /// Activity of one session as the host reports it.
    pub fn is_session_active(&self, id: TerminalId) -> Option<bool> {
        self.sessions.get(&id).map(|s| self.reported(s))
    }

    pub fn activity(&self) -> TerminalActivity {
        if self.global {
            TerminalActivity::Global(self.is_active())
        } else {
            TerminalActivity::PerSession(
                self.sessions
                    .iter()
                    .map(|(id, s)| (*id, s.active))
                    .collect(),
            )
        }
    }

    pub fn get(&self, id: TerminalId) -> Option<&Terminal> {
        self.sessions.get(&id).map(|s| &s.terminal)
    }

    pub fn terminals(&self) -> impl Iterator<Item = &Terminal> {
        self.sessions.values().map(|s| &s.terminal)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Send `frame` to every session that can receive.
    pub fn broadcast(&self, frame: &Frame) {
        for session in self.sessions.values() {
            session.terminal.send(frame.clone());
        }
    }

    fn reported(&self, session: &Session) -> bool {
        if self.global && session.terminal.mode().can_send() {
            self.is_active()
        } else {
            session.active
        }
    }

    fn track(&mut self, f: impl FnOnce(&mut BTreeMap<TerminalId, Session>)) -> bool {
        let before = self.is_active();
        f(&mut self.sessions);
        before != self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::{Outbound, TerminalMode, test_terminal};
    use crate::value::Value;

    #[test]
    fn test_active_session_counts_immediately() {
        let mut registry = TerminalRegistry::new(false);
        let (terminal, _rx) = test_terminal(TerminalMode::ReadWriteActive);
        let id = terminal.id();

        assert!(registry.insert(terminal));
        assert!(registry.is_active());
        assert_eq!(registry.is_session_active(id), Some(true));
    }

    #[test]
    fn test_passive_becomes_active_on_first_command() {
        let mut registry = TerminalRegistry::new(false);
        let (terminal, _rx) = test_terminal(TerminalMode::ReadWritePassive);
        let id = terminal.id();

        assert!(!registry.insert(terminal));
        assert!(!registry.is_active());
        assert!(registry.record_command(id));
        assert!(registry.is_active());
        // Already active: no change to announce.
        assert!(!registry.record_command(id));
    }

    #[test]
    fn test_write_only_becomes_active_on_first_command() {
        let mut registry = TerminalRegistry::new(false);
        let (terminal, _rx) = test_terminal(TerminalMode::WriteOnly);
        let id = terminal.id();
        registry.insert(terminal);

        assert!(registry.record_command(id));
        assert_eq!(registry.is_session_active(id), Some(true));
    }

    #[test]
    fn test_read_only_never_active() {
        let mut registry = TerminalRegistry::new(false);
        let (terminal, _rx) = test_terminal(TerminalMode::ReadOnly);
        let id = terminal.id();
        registry.insert(terminal);

        assert!(!registry.record_command(id));
        assert!(!registry.set_all_active(true));
        assert!(!registry.is_active());
        assert_eq!(registry.is_session_active(id), Some(false));
    }

    #[test]
    fn test_remove_last_active_changes_aggregate() {
        let mut registry = TerminalRegistry::new(false);
        let (terminal, _rx) = test_terminal(TerminalMode::ReadWriteActive);
        let id = terminal.id();
        registry.insert(terminal);

        let (removed, changed) = registry.remove(id);
        assert_eq!(removed.map(|t| t.id()), Some(id));
        assert!(changed);
        assert!(registry.is_empty());
        assert_eq!(registry.is_session_active(id), None);
    }

    #[test]
    fn test_global_mode_shares_flag() {
        let mut registry = TerminalRegistry::new(false);
        let (active, _a) = test_terminal(TerminalMode::ReadWriteActive);
        let (passive, _b) = test_terminal(TerminalMode::ReadWritePassive);
        let (reader, _c) = test_terminal(TerminalMode::ReadOnly);
        let (a, p, r) = (active.id(), passive.id(), reader.id());
        registry.insert(active);
        registry.insert(passive);
        registry.insert(reader);

        assert_eq!(
            registry.activity(),
            TerminalActivity::PerSession(vec![(a, true), (p, false), (r, false)])
        );

        assert!(registry.set_global(true));
        assert!(!registry.set_global(true));
        assert_eq!(registry.activity(), TerminalActivity::Global(true));
        assert_eq!(registry.is_session_active(p), Some(true));
        assert_eq!(registry.is_session_active(r), Some(false));
    }

    #[test]
    fn test_global_mode_collapses_and_restores_active_sessions() {
        let mut registry = TerminalRegistry::new(false);
        let (first, _a) = test_terminal(TerminalMode::ReadWriteActive);
        let (second, _b) = test_terminal(TerminalMode::ReadWriteActive);
        let (a, b) = (first.id(), second.id());
        registry.insert(first);
        registry.insert(second);

        assert!(registry.set_global(true));
        assert_eq!(registry.activity(), TerminalActivity::Global(true));

        assert!(registry.set_global(false));
        assert_eq!(
            registry.activity(),
            TerminalActivity::PerSession(vec![(a, true), (b, true)])
        );
    }

    #[test]
    fn test_global_toggle_keeps_aggregate() {
        let mut registry = TerminalRegistry::new(false);
        let (passive, _rx) = test_terminal(TerminalMode::ReadWritePassive);
        registry.insert(passive);

        for global in [true, false, true] {
            let before = registry.is_active();
            registry.set_global(global);
            assert_eq!(registry.is_active(), before);
        }
    }

    #[test]
    fn test_set_all_active() {
        let mut registry = TerminalRegistry::new(false);
        let (passive, _rx) = test_terminal(TerminalMode::ReadWritePassive);
        registry.insert(passive);

        assert!(registry.set_all_active(true));
        assert!(registry.is_active());
        assert!(registry.set_all_active(false));
        assert!(!registry.is_active());
    }

    #[test]
    fn test_set_all_inactive_clears_write_only() {
        let mut registry = TerminalRegistry::new(false);
        let (writer, _rx) = test_terminal(TerminalMode::WriteOnly);
        let id = writer.id();
        registry.insert(writer);
        registry.record_command(id);

        assert!(registry.set_all_active(false));
        assert!(!registry.is_active());
        assert_eq!(registry.is_session_active(id), Some(false));
    }

    #[test]
    fn test_broadcast_skips_write_only() {
        let mut registry = TerminalRegistry::new(false);
        let (reader, mut reader_rx) = test_terminal(TerminalMode::ReadOnly);
        let (writer, mut writer_rx) = test_terminal(TerminalMode::WriteOnly);
        registry.insert(reader);
        registry.insert(writer);

        registry.broadcast(&Frame::Reply {
            result: Value::Null,
        });
        assert!(matches!(reader_rx.try_recv(), Ok(Outbound::Frame(_))));
        assert!(writer_rx.try_recv().is_err());
    }
}
