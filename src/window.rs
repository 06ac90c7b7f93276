//! Send and receive windows (spec.md §3 "Peer (client) state", §4.4, §4.5).

use std::collections::VecDeque;

use irmo_proto::Atom;

use crate::object::ObjectId;

/// One atom's slot in the send window: the atom itself plus the
/// bookkeeping the outbound engine needs (spec.md §3 "Atoms in the send
/// window also carry: last send timestamp, resent flag, ...").
pub(crate) struct SendEntry {
    pub atom: Atom,
    pub last_send_ms: Option<u64>,
    pub resent: bool,
}

/// The ordered array of transmitted-but-unacknowledged atoms, bounded at
/// [`crate::tunables::Tunables::max_send_window_atoms`] (spec.md §3, §4.4
/// step 2).
pub(crate) struct SendWindow {
    entries: VecDeque<SendEntry>,
    send_base: u32,
}

impl SendWindow {
    pub fn new() -> Self {
        SendWindow {
            entries: VecDeque::new(),
            send_base: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn byte_total(&self) -> usize {
        self.entries.iter().map(|e| e.atom.wire_length()).sum()
    }

    pub fn push(&mut self, atom: Atom) {
        self.entries.push_back(SendEntry {
            atom,
            last_send_ms: None,
            resent: false,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &SendEntry> {
        self.entries.iter()
    }

    pub fn entry(&self, index: usize) -> Option<&SendEntry> {
        self.entries.get(index)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut SendEntry> {
        self.entries.get_mut(index)
    }

    /// Drop the first `n` entries and advance `send_base` past them
    /// (spec.md §4.5 step 3: "Free it and slide the window.").
    pub fn slide(&mut self, n: usize) {
        for _ in 0..n {
            self.entries.pop_front();
        }
        self.send_base = self.send_base.wrapping_add(n as u32);
    }

    /// Step 1 of coalescing (spec.md §4.3): clear bit `ordinal` on any
    /// unacked change atom for `id`; neutralise to [`Atom::Null`] if that
    /// empties its changed set.
    pub fn clear_variable_bit(&mut self, id: ObjectId, ordinal: u8) {
        for entry in &mut self.entries {
            if let Atom::Change { id: oid, changes, .. } = &mut entry.atom {
                if *oid != id {
                    continue;
                }
                changes.retain(|(o, _)| *o != ordinal);
                if changes.is_empty() {
                    entry.atom = Atom::Null;
                }
            }
        }
    }

    /// Neutralise any change atom for `id` in the window (spec.md §4.3
    /// "Destroy supersedes change").
    pub fn neutralize_object(&mut self, id: ObjectId) {
        for entry in &mut self.entries {
            if matches!(&entry.atom, Atom::Change { id: oid, .. } if *oid == id) {
                entry.atom = Atom::Null;
            }
        }
    }
}

/// One atom's slot in the receive window: the stream sequence number is
/// implicit in the slot's position (`recv_base + index`); `applied`
/// distinguishes change atoms that have already been dispatched during
/// out-of-order pre-execution (spec.md §4.5 step 6) from ones still
/// awaiting in-order application.
pub(crate) struct RecvEntry {
    pub atom: Atom,
    pub applied: bool,
}

/// The sparse, grow-as-needed array of received-but-not-yet-applied atoms
/// (spec.md §3 "Receive window").
pub(crate) struct ReceiveWindow {
    slots: VecDeque<Option<RecvEntry>>,
    recv_base: u32,
}

impl ReceiveWindow {
    pub fn new() -> Self {
        ReceiveWindow {
            slots: VecDeque::new(),
            recv_base: 0,
        }
    }

    pub fn recv_base(&self) -> u32 {
        self.recv_base
    }

    /// Install `atom` at stream sequence `seq`, growing the window if
    /// needed. Replaces whatever was already in that slot (a
    /// retransmission), per spec.md §4.5 step 4.
    pub fn install(&mut self, seq: u32, atom: Atom) {
        let index = seq.wrapping_sub(self.recv_base) as usize;
        while self.slots.len() <= index {
            self.slots.push_back(None);
        }
        self.slots[index] = Some(RecvEntry { atom, applied: false });
    }

    pub fn get(&self, seq: u32) -> Option<&RecvEntry> {
        let index = seq.wrapping_sub(self.recv_base) as usize;
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn mark_applied(&mut self, seq: u32) {
        let index = seq.wrapping_sub(self.recv_base) as usize;
        if let Some(Some(entry)) = self.slots.get_mut(index) {
            entry.applied = true;
        }
    }

    /// Pop the front slot if filled, sliding `recv_base` forward by one.
    /// Returns `None` (without sliding) if the front slot is empty or the
    /// window has nothing installed yet.
    pub fn pop_front_if_filled(&mut self) -> Option<Atom> {
        match self.slots.front() {
            Some(Some(_)) => {
                let entry = self.slots.pop_front().flatten()?;
                self.recv_base = self.recv_base.wrapping_add(1);
                Some(entry.atom)
            }
            _ => None,
        }
    }

    /// Every currently-installed `(seq, atom)` pair, in ascending order,
    /// for out-of-order pre-execution (spec.md §4.5 step 6).
    pub fn installed(&self) -> impl Iterator<Item = (u32, &RecvEntry)> {
        self.slots.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref().map(|entry| (self.recv_base.wrapping_add(i as u32), entry))
        })
    }
}
