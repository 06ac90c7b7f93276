//! The per-peer protocol engine: outbound packet assembly (spec.md §4.4),
//! inbound packet processing (spec.md §4.5), and the handshake/teardown
//! transitions of §4.7 for a peer that already exists. Opening a brand new
//! server-side peer from an unsolicited SYN is [`crate::driver`]'s job,
//! since that requires the vhost table this module doesn't have access to.

use std::cell::RefCell;
use std::rc::Rc;

use irmo_proto::packet::{decode_data_section, decode_header, encode_control, encode_data_section, verify_data_section};
use irmo_proto::{Atom, Flags, PacketBuffer};

use crate::atom_apply::{ApplyOutcome, AtomApply};
use crate::peer::{Address, ConnectionState, Peer};
use crate::seq::reconstruct_seq;
use crate::tunables::Tunables;
use crate::world::WorldHandle;

/// Build every outbound datagram this peer should send on one tick (spec.md
/// §4.4). The caller is responsible for actually handing each one to the
/// transport — this function only mutates the peer's own state (window,
/// congestion, handshake bookkeeping).
pub(crate) fn outbound_tick<A: Address>(peer_rc: &Rc<RefCell<Peer<A>>>, tunables: &Tunables, now_ms: u64) -> Vec<Vec<u8>> {
    let mut peer = peer_rc.borrow_mut();
    let mut packets = Vec::new();

    match peer.state {
        ConnectionState::Connected => {
            // 1. Timeout test.
            let base_timeout = peer.rtt.base_timeout_ms();
            if base_timeout * f64::from(peer.congestion.backoff) > tunables.connection_timeout_cap_ms as f64 {
                peer.state = ConnectionState::Disconnected;
                peer.fire_disconnect_observers();
                return packets;
            }

            // 2. Pump queue -> window.
            let cap = peer.congestion.effective_cap();
            while peer.send_window.byte_total() < cap
                && !peer.send_queue.is_empty()
                && peer.send_window.len() < tunables.max_send_window_atoms
            {
                let Some(atom) = peer.send_queue.pop_front() else { break };
                peer.send_window.push(atom);
            }

            // 3. Select stale spans.
            let stale_before_ms = now_ms.saturating_sub((base_timeout * f64::from(peer.congestion.backoff)) as u64);
            let spans = select_stale_spans(&peer, stale_before_ms, tunables.packet_threshold);

            for (start, end) in spans {
                // 4. Resent accounting + backoff on head-of-window loss.
                // Only a span starting at an atom that was *already* sent
                // once (non-zero send-time) is a retransmission; a span of
                // freshly-pumped atoms (last_send_ms == None) is the first
                // transmission, not a loss (spec.md §4.4 step 4).
                let head_is_retransmit = start == 0
                    && peer.send_window.entry(0).is_some_and(|e| e.last_send_ms.is_some());
                if head_is_retransmit {
                    peer.congestion.on_head_loss();
                }
                for i in start..end {
                    if let Some(entry) = peer.send_window.entry_mut(i) {
                        if entry.last_send_ms.is_some() {
                            entry.resent = true;
                        }
                        entry.last_send_ms = Some(now_ms);
                    }
                }

                // 5. Prefix inclusion: widen backward over preceding nulls.
                let mut real_start = start;
                while real_start > 0 {
                    let prev_is_null = peer
                        .send_window
                        .entry(real_start - 1)
                        .is_some_and(|e| matches!(e.atom, Atom::Null));
                    if prev_is_null {
                        real_start -= 1;
                    } else {
                        break;
                    }
                }

                let atoms: Vec<Atom> = (real_start..end)
                    .filter_map(|i| peer.send_window.entry(i).map(|e| e.atom.clone()))
                    .collect();
                let start_seq = peer.send_window.send_base().wrapping_add(real_start as u32) as u16;

                let mut buf = PacketBuffer::new();
                buf.write_u16((Flags::ACK | Flags::DTA).bits());
                buf.write_u16(peer.recv_window.recv_base() as u16);
                encode_data_section(start_seq, &atoms, &mut buf);
                packets.push(buf.as_slice().to_vec());
                peer.need_ack = false;
            }

            // 6. Standalone ack.
            if peer.need_ack && packets.is_empty() {
                let mut buf = PacketBuffer::new();
                buf.write_u16(Flags::ACK.bits());
                buf.write_u16(peer.recv_window.recv_base() as u16);
                packets.push(buf.as_slice().to_vec());
                peer.need_ack = false;
            }
        }

        ConnectionState::Handshaking | ConnectionState::Disconnecting => {
            let due = peer
                .last_handshake_sent_ms
                .map_or(true, |last| now_ms.saturating_sub(last) >= tunables.handshake_interval_ms);
            if due {
                if peer.handshake_attempts_remaining == 0 {
                    peer.state = ConnectionState::Disconnected;
                    peer.fire_disconnect_observers();
                } else {
                    peer.handshake_attempts_remaining -= 1;
                    peer.last_handshake_sent_ms = Some(now_ms);
                    if let Some(frame) = peer.handshake_frame.clone() {
                        packets.push(frame);
                    }
                }
            }
        }

        ConnectionState::Disconnected => {}
    }

    packets
}

/// Maximal contiguous runs of window indices whose last send-time is
/// missing or older than `stale_before_ms`, each bounded to fit within
/// `packet_threshold` wire bytes (spec.md §4.4 step 3).
fn select_stale_spans<A: Address>(peer: &Peer<A>, stale_before_ms: u64, packet_threshold: usize) -> Vec<(usize, usize)> {
    let is_stale = |last_send_ms: Option<u64>| last_send_ms.map_or(true, |t| t <= stale_before_ms);
    let n = peer.send_window.len();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < n {
        if !is_stale(peer.send_window.entry(i).unwrap().last_send_ms) {
            i += 1;
            continue;
        }
        let mut j = i;
        let mut bytes = 0usize;
        while j < n {
            let entry = peer.send_window.entry(j).unwrap();
            if !is_stale(entry.last_send_ms) {
                break;
            }
            let len = entry.atom.wire_length();
            if j > i && bytes + len > packet_threshold {
                break;
            }
            bytes += len;
            j += 1;
        }
        spans.push((i, j));
        i = j;
    }
    spans
}

/// Enqueue a full-state snapshot to `peer`: a new-object atom for every
/// existing object, then one change atom per object marking every variable
/// changed, in that order (spec.md §4.7 "Full-state snapshot"). No-op if
/// the world is replicated (nothing to publish).
pub(crate) fn enqueue_full_snapshot<A: Address>(world: &WorldHandle, peer_rc: &Rc<RefCell<Peer<A>>>) {
    let world = world.borrow();
    if !world.authoritative() {
        return;
    }
    let mut peer = peer_rc.borrow_mut();
    let objects: Vec<_> = world.objects().collect();
    for object in &objects {
        peer.send_queue.enqueue_new_object(object.class_ordinal(), object.id());
    }
    for object in &objects {
        let nvars = object.values().len() as u8;
        for (ordinal, value) in object.values().iter().enumerate() {
            peer.send_queue
                .enqueue_change(object.class_ordinal(), object.id(), ordinal as u8, value.clone(), nvars);
        }
    }
}

fn on_connected<A: Address>(world: &WorldHandle, peer_rc: &Rc<RefCell<Peer<A>>>) {
    enqueue_full_snapshot(world, peer_rc);
    peer_rc.borrow_mut().fire_connect_observers();
}

/// Process one datagram addressed to a peer that already has state
/// (handshake in progress, connected, or disconnecting/lingering). Returns
/// an immediate reply to send, if any — data/ack frames never reply
/// immediately, since their ack piggybacks on the next outbound tick.
pub(crate) fn process_datagram_for_peer<A: Address>(
    world: &WorldHandle,
    peer_rc: &Rc<RefCell<Peer<A>>>,
    tunables: &Tunables,
    bytes: &[u8],
    now_ms: u64,
) -> Option<Vec<u8>> {
    let mut buf = PacketBuffer::from_datagram(bytes);
    let flags = decode_header(&mut buf).ok()?;

    if flags.is_exactly(Flags::SYN) {
        let state = peer_rc.borrow().state;
        return (state == ConnectionState::Handshaking).then(|| encode_control(Flags::SYN | Flags::ACK));
    }

    if flags.is_exactly(Flags::SYN | Flags::ACK) {
        let was_handshaking = {
            let mut peer = peer_rc.borrow_mut();
            let was = peer.state == ConnectionState::Handshaking;
            if was {
                peer.state = ConnectionState::Connected;
                peer.handshake_frame = None;
            }
            was
        };
        if was_handshaking {
            on_connected(world, peer_rc);
            return Some(encode_control(Flags::SYN | Flags::ACK));
        }
        return None;
    }

    if flags.is_exactly(Flags::SYN | Flags::FIN) {
        let mut peer = peer_rc.borrow_mut();
        match peer.state {
            ConnectionState::Connected => {
                peer.state = ConnectionState::Disconnected;
                peer.linger_until_ms = Some(now_ms + tunables.linger_ms);
                drop(peer);
                peer_rc.borrow_mut().fire_disconnect_observers();
                return Some(encode_control(Flags::SYN | Flags::FIN | Flags::ACK));
            }
            ConnectionState::Disconnected if peer.linger_until_ms.is_some_and(|t| now_ms < t) => {
                return Some(encode_control(Flags::SYN | Flags::FIN | Flags::ACK));
            }
            _ => return None,
        }
    }

    if flags.is_exactly(Flags::SYN | Flags::FIN | Flags::ACK) {
        let mut peer = peer_rc.borrow_mut();
        if peer.state == ConnectionState::Disconnecting {
            peer.state = ConnectionState::Disconnected;
            drop(peer);
            peer_rc.borrow_mut().fire_disconnect_observers();
        }
        return None;
    }

    if !flags.contains(Flags::ACK) {
        return None;
    }

    // An ack/data packet from the far side implies it already thinks the
    // handshake is done, even if our own completion reply went missing.
    let was_handshaking = peer_rc.borrow().state == ConnectionState::Handshaking;
    if was_handshaking {
        {
            let mut peer = peer_rc.borrow_mut();
            peer.state = ConnectionState::Connected;
            peer.handshake_frame = None;
        }
        on_connected(world, peer_rc);
    } else if peer_rc.borrow().state != ConnectionState::Connected {
        return None;
    }

    let Ok(ack_low) = buf.read_u16() else { return None };

    if flags.contains(Flags::DTA) {
        let schema = world.borrow().schema().clone();
        let mut verifier = buf.clone();
        if !verify_data_section(&mut verifier, &schema) {
            return None;
        }
    }

    handle_ack(peer_rc, ack_low, now_ms);

    if flags.contains(Flags::DTA) {
        let schema = world.borrow().schema().clone();
        let Ok((start_seq_low, atoms)) = decode_data_section(&mut buf, &schema) else {
            return None;
        };
        let mut peer = peer_rc.borrow_mut();
        let recv_base = peer.recv_window.recv_base();
        let start_seq = reconstruct_seq(recv_base, start_seq_low);
        for (i, atom) in atoms.into_iter().enumerate() {
            peer.recv_window.install(start_seq.wrapping_add(i as u32), atom);
        }
        peer.need_ack = true;
    }

    apply_receive_window(world, peer_rc);
    None
}

fn handle_ack<A: Address>(peer_rc: &Rc<RefCell<Peer<A>>>, ack_low: u16, now_ms: u64) {
    let mut peer = peer_rc.borrow_mut();
    let base = peer.send_window.send_base();
    let seq = reconstruct_seq(base, ack_low);
    let delta = i64::from(seq) - i64::from(base);
    if delta < 0 {
        return; // stale ack, ignore
    }
    let n = delta as usize;
    if n > peer.send_window.len() {
        tracing::warn!(remote = ?peer.remote(), seq, "ack beyond send window, dropping");
        return;
    }
    for i in 0..n {
        let Some(entry) = peer.send_window.entry(i) else { continue };
        // Karn's algorithm: only sample RTT from atoms that weren't
        // retransmitted, since a resent atom's send-time is ambiguous
        // (the ack may be for either transmission).
        if !entry.resent {
            if let Some(sent_at) = entry.last_send_ms {
                let measured = now_ms.saturating_sub(sent_at) as f64;
                peer.rtt.sample(measured);
            }
        }
    }
    peer.send_window.slide(n);
    if n > 0 {
        // Any forward progress resets backoff, resent atoms included
        // (spec.md §4.5 step 3, §8 property 10).
        peer.congestion.reset_backoff();
        peer.congestion.grow_on_ack();
    }
}

/// Apply the in-order receive-window prefix (spec.md §4.5 step 5), then
/// attempt out-of-order pre-execution of any installed change atom whose
/// target object already exists (step 6).
fn apply_receive_window<A: Address>(world: &WorldHandle, peer_rc: &Rc<RefCell<Peer<A>>>) {
    let mut world = world.borrow_mut();
    let mut peer = peer_rc.borrow_mut();

    loop {
        let seq = peer.recv_window.recv_base();
        let Some(atom) = peer.recv_window.get(seq).map(|e| e.atom.clone()) else {
            break;
        };
        match atom.apply(&mut world, &mut peer, seq) {
            ApplyOutcome::Applied => {
                peer.recv_window.pop_front_if_filled();
            }
            ApplyOutcome::ProtocolViolation => {
                peer.protocol_violations += 1;
                peer.recv_window.pop_front_if_filled();
            }
            ApplyOutcome::Retry => break,
        }
    }

    let pending: Vec<(u32, Atom)> = peer
        .recv_window
        .installed()
        .filter(|(_, entry)| !entry.applied && matches!(entry.atom, Atom::Change { .. }))
        .map(|(seq, entry)| (seq, entry.atom.clone()))
        .collect();
    for (seq, atom) in pending {
        if atom.apply(&mut world, &mut peer, seq) == ApplyOutcome::Applied {
            peer.recv_window.mark_applied(seq);
        }
    }
}
