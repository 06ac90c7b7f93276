//! Datagram framing (spec.md §6): the fixed header, control frames, and the
//! run-length-clustered atom groups inside data frames.

use irmo_schema::Schema;

use crate::atom::{Atom, AtomError, AtomKind};
use crate::buffer::{BufferError, PacketBuffer};
use crate::flags::Flags;

/// Maximum atoms in one run-length group: the header's count field is 5
/// bits, storing `count - 1`.
pub const MAX_GROUP_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct Syn {
    pub client_schema_hash: u32,
    pub server_schema_hash: u32,
    pub vhost: String,
}

pub fn encode_syn(syn: &Syn) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u16(Flags::SYN.bits());
    buf.write_u32(syn.client_schema_hash);
    buf.write_u32(syn.server_schema_hash);
    buf.write_cstring(&syn.vhost);
    buf.as_slice().to_vec()
}

pub fn decode_syn(buf: &mut PacketBuffer) -> Result<Syn, BufferError> {
    let client_schema_hash = buf.read_u32()?;
    let server_schema_hash = buf.read_u32()?;
    let vhost = buf.read_cstring(256)?;
    Ok(Syn {
        client_schema_hash,
        server_schema_hash,
        vhost,
    })
}

/// A control frame with no payload: `SYN|ACK`, `SYN|FIN`, or `SYN|FIN|ACK`.
pub fn encode_control(flags: Flags) -> Vec<u8> {
    let mut buf = PacketBuffer::new();
    buf.write_u16(flags.bits());
    buf.as_slice().to_vec()
}

pub fn decode_header(buf: &mut PacketBuffer) -> Result<Flags, BufferError> {
    Ok(Flags::from_bits(buf.read_u16()?))
}

/// Cluster a run of atoms that are to be placed consecutively on the wire
/// into same-kind groups of at most [`MAX_GROUP_LEN`], preserving order.
/// This is the run-length clustering described in spec.md §2/§4.4: the
/// protocol engine decides *which* atoms go in a packet (a contiguous span
/// of the send window); this function only decides how to tag them.
pub fn group_atoms(atoms: &[Atom]) -> Vec<(AtomKind, usize, usize)> {
    // Returns (kind, start_index, count) triples referencing `atoms`.
    let mut groups = Vec::new();
    let mut i = 0;
    while i < atoms.len() {
        let kind = atoms[i].kind();
        let mut j = i + 1;
        while j < atoms.len() && atoms[j].kind() == kind && j - i < MAX_GROUP_LEN {
            j += 1;
        }
        groups.push((kind, i, j - i));
        i = j;
    }
    groups
}

/// Encode a data section (`start_seq` + clustered atom groups) into `buf`.
pub fn encode_data_section(start_seq: u16, atoms: &[Atom], buf: &mut PacketBuffer) {
    buf.write_u16(start_seq);
    for (kind, start, count) in group_atoms(atoms) {
        let header = ((kind as u8) << 5) | ((count - 1) as u8 & 0x1F);
        buf.write_u8(header);
        for atom in &atoms[start..start + count] {
            atom.encode(buf);
        }
    }
}

/// Walk a data section with a read-only cursor, verifying every atom
/// against `schema` without mutating anything durable (spec.md §4.5 step
/// 2). Returns `false` on any structural or schema violation. Does not
/// rewind the buffer — callers that need to then parse for real should
/// `seek` back to the section's start themselves.
pub fn verify_data_section(buf: &mut PacketBuffer, schema: &Schema) -> bool {
    if buf.read_u16().is_err() {
        return false;
    }
    while buf.remaining() > 0 {
        let Ok(header) = buf.read_u8() else {
            return false;
        };
        let kind_bits = header >> 5;
        let count = (header & 0x1F) as usize + 1;
        let Some(kind) = AtomKind::from_u8(kind_bits) else {
            return false;
        };
        for _ in 0..count {
            if !Atom::verify(buf, kind, schema) {
                return false;
            }
        }
    }
    true
}

/// Parse a data section that has already been verified (or that the caller
/// otherwise trusts). Returns the starting stream sequence and the decoded
/// atoms in wire order.
pub fn decode_data_section(buf: &mut PacketBuffer, schema: &Schema) -> Result<(u16, Vec<Atom>), AtomError> {
    let start_seq = buf.read_u16()?;
    let mut atoms = Vec::new();
    while buf.remaining() > 0 {
        let header = buf.read_u8()?;
        let kind_bits = header >> 5;
        let count = (header & 0x1F) as usize + 1;
        let kind = AtomKind::from_u8(kind_bits).ok_or(AtomError::UnknownKind(kind_bits))?;
        for _ in 0..count {
            atoms.push(Atom::decode(buf, kind, schema)?);
        }
    }
    Ok((start_seq, atoms))
}
