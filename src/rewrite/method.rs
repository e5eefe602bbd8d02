//! Rewriting of a single method body.
//!
//! Matching instructions are swapped for the forced-failure sequence and the
//! body is laid out again. Every code offset stored anywhere in the `Code`
//! attribute is moved to the new layout.
//!
//! For class files that carry StackMapTable frames, the code that used to
//! follow a rewritten instruction (up to the next branch target, handler or
//! frame) can no longer be reached. The verifier still checks it and would
//! demand a frame right after the `athrow`, so that run is filled with
//! `nop ... athrow` under a frame holding only a `Throwable` and cut out of
//! the exception table.

use super::rule::{AccessKind, RewriteRule};
use crate::bytecode::opcode::{ATHROW, DUP, INVOKESPECIAL, LDC, LDC_W, NEW, NOP};
use crate::bytecode::{self, Decoded, Frame, Insn, VerificationType, frames};
use crate::classfile::{
    Attribute, ByteReader, ByteWriter, ClassFileError, CodeAttribute, ConstantPool,
    ExceptionHandler, MemberRef, count_u16,
};
use std::collections::{HashMap, HashSet};

const STACK_MAP_TABLE: &str = "StackMapTable";
const LINE_NUMBER_TABLE: &str = "LineNumberTable";
const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
const VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
const INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";

const THROWABLE: &str = "java/lang/Throwable";

/// The method whose body is being rewritten
pub struct MethodInfo<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_static: bool,
    /// The class file version has its frames checked by the verifier
    pub stack_maps: bool,
}

/// Number of instructions rewritten, by kind
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SiteCounts {
    pub calls: usize,
    pub fields: usize,
}

impl SiteCounts {
    pub fn total(&self) -> usize {
        self.calls + self.fields
    }

    fn record(&mut self, kind: AccessKind) {
        match kind {
            AccessKind::Call => self.calls += 1,
            AccessKind::FieldAccess => self.fields += 1,
        }
    }

    pub fn add(&mut self, other: SiteCounts) {
        self.calls += other.calls;
        self.fields += other.fields;
    }
}

/// One slot of the new layout, tied to the old instruction it stands for
enum Piece {
    Keep(usize),
    Fail { site: usize, insns: Vec<Insn> },
    Fill(usize),
}

/// Build `new E; dup; ldc msg; invokespecial E.<init>(String); athrow`
fn failure_sequence(
    pool: &mut ConstantPool,
    rule: &RewriteRule,
    kind: AccessKind,
    member: &MemberRef,
) -> Result<Vec<Insn>, ClassFileError> {
    let exception = pool.add_class(rule.exception())?;
    let message = pool.add_string(&rule.message(kind, member))?;
    let init = pool.add_method_ref(rule.exception(), "<init>", "(Ljava/lang/String;)V")?;
    let ldc = match u8::try_from(message) {
        Ok(index) => Insn::Plain {
            opcode: LDC,
            operands: vec![index],
        },
        Err(_) => Insn::with_u16(LDC_W, message),
    };
    Ok(vec![
        Insn::with_u16(NEW, exception),
        Insn::simple(DUP),
        ldc,
        Insn::with_u16(INVOKESPECIAL, init),
        Insn::simple(ATHROW),
    ])
}

/// Instructions left unreachable by the rewrite, and frames that go with them
///
/// Everything after a rewritten instruction is dead up to the next entry
/// point. A frame that mentions an uninitialized object created by a dead
/// `new` can only be reached through that `new`, so its block is dead too.
fn find_dead(
    insns: &[Decoded],
    sites: &HashMap<usize, (AccessKind, MemberRef)>,
    frames: &[Frame],
    handlers: &[ExceptionHandler],
    index_of: &HashMap<u32, usize>,
) -> (Vec<bool>, HashSet<u32>) {
    let mut entries: HashSet<u32> = frames.iter().map(|f| f.offset).collect();
    entries.extend(handlers.iter().map(|h| h.handler_pc as u32));
    for decoded in insns {
        entries.extend(decoded.insn.targets());
    }

    let mut dead = vec![false; insns.len()];
    let kill_after = |from: usize, dead: &mut Vec<bool>| {
        let mut j = from + 1;
        while j < insns.len() && !entries.contains(&insns[j].offset) {
            dead[j] = true;
            j += 1;
        }
    };

    let mut site_indices: Vec<usize> = sites.keys().copied().collect();
    site_indices.sort_unstable();
    for i in site_indices {
        kill_after(i, &mut dead);
    }

    let mut killed_frames = HashSet::new();
    loop {
        let mut changed = false;
        for frame in frames {
            if killed_frames.contains(&frame.offset) {
                continue;
            }
            let from_dead_new = frame
                .uninitialized_offsets()
                .any(|x| index_of.get(&x).is_some_and(|&i| dead[i]));
            if from_dead_new {
                killed_frames.insert(frame.offset);
                if let Some(&i) = index_of.get(&frame.offset) {
                    dead[i] = true;
                    kill_after(i, &mut dead);
                }
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    (dead, killed_frames)
}

/// Unreachable stretches of the new layout and what they need to verify
#[derive(Default)]
struct DeadCode {
    ranges: Vec<(u32, u32)>,
    frames: Vec<Frame>,
    /// (offset, stack depth) entry points for the max_stack pass
    entries: Vec<(u32, u16)>,
}

impl DeadCode {
    /// End a filler run at the current position with `athrow`
    fn close_fill(&mut self, out: &mut [u8], fill_start: &mut Option<u32>) {
        let Some(start) = fill_start.take() else {
            return;
        };
        let end = out.len() as u32;
        out[end as usize - 1] = ATHROW;
        self.ranges.push((start, end));
        self.entries.push((start, 1));
        self.frames.push(Frame {
            offset: start,
            locals: Vec::new(),
            stack: vec![VerificationType::Object(THROWABLE.to_string())],
        });
    }

    /// A failure sequence that replaced an already unreachable site
    fn unreachable_failure(&mut self, start: u32, end: u32) {
        self.ranges.push((start, end));
        self.entries.push((start, 0));
        self.frames.push(Frame {
            offset: start,
            locals: Vec::new(),
            stack: Vec::new(),
        });
    }
}

/// Remove every range in `holes` from `[start, end)`
fn subtract_ranges(start: u32, end: u32, holes: &[(u32, u32)]) -> Vec<(u32, u32)> {
    let mut ranges = vec![(start, end)];
    for &(hole_start, hole_end) in holes {
        let mut next = Vec::with_capacity(ranges.len() + 1);
        for (s, e) in ranges {
            if hole_end <= s || hole_start >= e {
                next.push((s, e));
                continue;
            }
            if s < hole_start {
                next.push((s, hole_start));
            }
            if hole_end < e {
                next.push((hole_end, e));
            }
        }
        ranges = next;
    }
    ranges.retain(|(s, e)| s < e);
    ranges
}

fn relocate_type<F>(ty: &VerificationType, remap: &F) -> Result<VerificationType, ClassFileError>
where
    F: Fn(u32) -> Result<u32, ClassFileError>,
{
    Ok(match ty {
        VerificationType::Uninitialized(offset) => VerificationType::Uninitialized(remap(*offset)?),
        other => other.clone(),
    })
}

fn relocate_frame<F>(frame: &Frame, remap: &F) -> Result<Frame, ClassFileError>
where
    F: Fn(u32) -> Result<u32, ClassFileError>,
{
    Ok(Frame {
        offset: remap(frame.offset)?,
        locals: frame
            .locals
            .iter()
            .map(|t| relocate_type(t, remap))
            .collect::<Result<_, _>>()?,
        stack: frame
            .stack
            .iter()
            .map(|t| relocate_type(t, remap))
            .collect::<Result<_, _>>()?,
    })
}

/// Move `LineNumberTable` entries; entries that no longer map are dropped
fn relocate_line_numbers<F>(info: &[u8], remap: &F) -> Result<Vec<u8>, ClassFileError>
where
    F: Fn(u32) -> Result<u32, ClassFileError>,
{
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let start_pc = r.u16()?;
        let line = r.u16()?;
        if let Ok(start) = remap(start_pc as u32) {
            entries.push((start as u16, line));
        }
    }
    let mut out = Vec::with_capacity(2 + entries.len() * 4);
    out.put_u16(count_u16(entries.len(), "line numbers")?);
    for (start, line) in entries {
        out.put_u16(start);
        out.put_u16(line);
    }
    Ok(out)
}

/// Move `LocalVariableTable`/`LocalVariableTypeTable` ranges, also returning
/// the number of slots the kept entries need
fn relocate_local_variables<F>(
    info: &[u8],
    pool: &ConstantPool,
    remap: &F,
) -> Result<(Vec<u8>, u32), ClassFileError>
where
    F: Fn(u32) -> Result<u32, ClassFileError>,
{
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let mut out_entries = Vec::with_capacity(count as usize);
    let mut slots = 0u32;
    for _ in 0..count {
        let start_pc = r.u16()? as u32;
        let length = r.u16()? as u32;
        let name_index = r.u16()?;
        let type_index = r.u16()?;
        let slot = r.u16()?;
        if let (Ok(start), Ok(end)) = (remap(start_pc), remap(start_pc + length)) {
            // A LocalVariableTypeTable signature never starts with J or D
            let width = match pool.utf8(type_index)?.as_bytes().first() {
                Some(b'J' | b'D') => 2,
                _ => 1,
            };
            slots = slots.max(slot as u32 + width);
            out_entries.push((start as u16, (end - start) as u16, name_index, type_index, slot));
        }
    }
    let mut out = Vec::with_capacity(2 + out_entries.len() * 10);
    out.put_u16(count_u16(out_entries.len(), "local variables")?);
    for (start, length, name_index, type_index, slot) in out_entries {
        out.put_u16(start);
        out.put_u16(length);
        out.put_u16(name_index);
        out.put_u16(type_index);
        out.put_u16(slot);
    }
    Ok((out, slots))
}

/// Rewrite every disallowed call and field access in one `Code` attribute.
///
/// Returns the number of sites rewritten; when it is zero `code` is untouched.
pub fn rewrite_method(
    code: &mut CodeAttribute,
    pool: &mut ConstantPool,
    method: &MethodInfo<'_>,
    rule: &RewriteRule,
) -> Result<SiteCounts, ClassFileError> {
    let insns = bytecode::decode(&code.code)?;

    let mut sites = HashMap::new();
    for (i, decoded) in insns.iter().enumerate() {
        let Some(kind) = AccessKind::of_opcode(decoded.insn.opcode()) else {
            continue;
        };
        let index = decoded
            .insn
            .cp_index()
            .ok_or(ClassFileError::TruncatedInstruction(decoded.offset))?;
        let member = pool.member_ref(index)?;
        if rule.matches(&member.owner) {
            sites.insert(i, (kind, member));
        }
    }

    let mut counts = SiteCounts::default();
    if sites.is_empty() {
        return Ok(counts);
    }

    let attribute_names: Vec<String> = code
        .attributes
        .iter()
        .map(|a| pool.utf8(a.name_index))
        .collect::<Result<_, _>>()?;
    let stack_map_pos = attribute_names.iter().position(|n| n == STACK_MAP_TABLE);
    let initial = frames::initial_locals(
        method.class_name,
        method.name,
        method.descriptor,
        method.is_static,
    )?;
    let old_frames = match stack_map_pos {
        Some(pos) => frames::decode_table(&code.attributes[pos].info, pool, &initial)?,
        None => Vec::new(),
    };

    let index_of: HashMap<u32, usize> = insns
        .iter()
        .enumerate()
        .map(|(i, d)| (d.offset, i))
        .collect();
    let (dead, killed_frames) = if method.stack_maps {
        find_dead(&insns, &sites, &old_frames, &code.exception_table, &index_of)
    } else {
        (vec![false; insns.len()], HashSet::new())
    };

    let mut pieces = Vec::with_capacity(insns.len());
    for i in 0..insns.len() {
        if let Some((kind, member)) = sites.get(&i) {
            counts.record(*kind);
            pieces.push(Piece::Fail {
                site: i,
                insns: failure_sequence(pool, rule, *kind, member)?,
            });
        } else if dead[i] {
            pieces.push(Piece::Fill(i));
        } else {
            pieces.push(Piece::Keep(i));
        }
    }

    // Lay out first: switch padding depends on where each switch lands.
    let mut new_offsets = vec![0u32; insns.len()];
    let mut pos = 0u32;
    for piece in &pieces {
        let (i, size) = match piece {
            Piece::Keep(i) | Piece::Fill(i) => (*i, insns[*i].insn.size_at(pos)),
            Piece::Fail { site, insns: seq } => (*site, seq.iter().map(|x| x.size_at(0)).sum()),
        };
        new_offsets[i] = pos;
        pos += size;
    }
    let new_len = pos;
    if new_len > u16::MAX as u32 {
        return Err(ClassFileError::CodeTooLarge(new_len as usize));
    }
    let old_len = code.code.len() as u32;
    let remap = |offset: u32| -> Result<u32, ClassFileError> {
        if offset == old_len {
            return Ok(new_len);
        }
        index_of
            .get(&offset)
            .map(|&i| new_offsets[i])
            .ok_or(ClassFileError::BadCodeOffset(offset))
    };

    let mut out: Vec<u8> = Vec::with_capacity(new_len as usize);
    let mut dead_code = DeadCode::default();
    let mut fill_start: Option<u32> = None;

    for piece in &pieces {
        let at = out.len() as u32;
        match piece {
            Piece::Keep(i) => {
                dead_code.close_fill(&mut out, &mut fill_start);
                insns[*i].insn.map_targets(&remap)?.encode(at, &mut out)?;
            }
            Piece::Fill(i) => {
                fill_start.get_or_insert(at);
                let size = insns[*i].insn.size_at(at) as usize;
                out.extend(std::iter::repeat(NOP).take(size));
            }
            Piece::Fail { site, insns: seq } => {
                dead_code.close_fill(&mut out, &mut fill_start);
                let at = out.len() as u32;
                for insn in seq {
                    let p = out.len() as u32;
                    insn.encode(p, &mut out)?;
                }
                if dead[*site] {
                    dead_code.unreachable_failure(at, out.len() as u32);
                }
            }
        }
    }
    dead_code.close_fill(&mut out, &mut fill_start);
    debug_assert_eq!(out.len() as u32, new_len);
    let DeadCode {
        ranges: dead_ranges,
        frames: mut dead_frames,
        entries: mut extra_entries,
    } = dead_code;

    let mut exception_table = Vec::with_capacity(code.exception_table.len());
    for handler in &code.exception_table {
        let start = remap(handler.start_pc as u32)?;
        let end = remap(handler.end_pc as u32)?;
        let handler_pc = remap(handler.handler_pc as u32)? as u16;
        for (s, e) in subtract_ranges(start, end, &dead_ranges) {
            exception_table.push(ExceptionHandler {
                start_pc: s as u16,
                end_pc: e as u16,
                handler_pc,
                catch_type: handler.catch_type,
            });
        }
    }

    // Slots still named by frames or debug tables, whatever the code uses
    let mut declared_locals = 0u32;
    let mut stack_map = if stack_map_pos.is_some() || !dead_frames.is_empty() {
        let mut new_frames = old_frames
            .iter()
            .filter(|f| !killed_frames.contains(&f.offset))
            .map(|f| relocate_frame(f, &remap))
            .collect::<Result<Vec<_>, _>>()?;
        new_frames.append(&mut dead_frames);
        new_frames.sort_by_key(|f| f.offset);
        declared_locals = new_frames.iter().map(Frame::local_slots).max().unwrap_or(0);
        // Every frame is a verifier entry point, even one only dead code used to reach
        extra_entries.extend(
            new_frames
                .iter()
                .map(|f| (f.offset, u16::try_from(f.stack_slots()).unwrap_or(u16::MAX))),
        );
        Some(frames::encode_table(&new_frames, &initial, pool)?)
    } else {
        None
    };

    let mut attributes = Vec::with_capacity(code.attributes.len() + 1);
    for (attribute, name) in code.attributes.iter().zip(&attribute_names) {
        match name.as_str() {
            STACK_MAP_TABLE => {
                if let Some(info) = stack_map.take() {
                    attributes.push(Attribute {
                        name_index: attribute.name_index,
                        info,
                    });
                }
            }
            LINE_NUMBER_TABLE => attributes.push(Attribute {
                name_index: attribute.name_index,
                info: relocate_line_numbers(&attribute.info, &remap)?,
            }),
            LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
                let (info, slots) = relocate_local_variables(&attribute.info, pool, &remap)?;
                declared_locals = declared_locals.max(slots);
                attributes.push(Attribute {
                    name_index: attribute.name_index,
                    info,
                });
            }
            // Type annotation targets hold code offsets in a layout we do not track.
            VISIBLE_TYPE_ANNOTATIONS | INVISIBLE_TYPE_ANNOTATIONS => {}
            _ => attributes.push(attribute.clone()),
        }
    }
    if let Some(info) = stack_map {
        attributes.push(Attribute {
            name_index: pool.add_utf8(STACK_MAP_TABLE)?,
            info,
        });
    }

    let decoded = bytecode::decode(&out)?;
    code.max_stack = bytecode::max_stack(&decoded, &exception_table, pool, &extra_entries)?;
    let used_locals = bytecode::max_locals(&decoded, method.descriptor, method.is_static)?;
    code.max_locals = used_locals.max(u16::try_from(declared_locals).unwrap_or(u16::MAX));
    code.code = out;
    code.exception_table = exception_table;
    code.attributes = attributes;

    Ok(counts)
}
