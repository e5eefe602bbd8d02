//! `StackMapTable` decoding and encoding
//!
//! Frames are expanded to absolute offsets with complete local and stack
//! lists, so they can be moved, replaced and inserted freely. Encoding picks
//! the most compact frame kind relative to the previous frame, the same way
//! javac does.

use super::descriptor::{self, FieldType};
use crate::classfile::{ByteReader, ByteWriter, ClassFileError, ConstantPool, count_u16};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    /// Internal class name or array descriptor
    Object(String),
    /// Value created by the `new` instruction at this code offset
    Uninitialized(u32),
}

impl VerificationType {
    fn read(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<Self, ClassFileError> {
        Ok(match r.u8()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(pool.class_name(r.u16()?)?),
            8 => VerificationType::Uninitialized(r.u16()? as u32),
            tag => {
                return Err(ClassFileError::BadStackMap(format!(
                    "unknown verification type tag {tag}"
                )))
            }
        })
    }

    fn write(&self, out: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<(), ClassFileError> {
        match self {
            VerificationType::Top => out.put_u8(0),
            VerificationType::Integer => out.put_u8(1),
            VerificationType::Float => out.put_u8(2),
            VerificationType::Double => out.put_u8(3),
            VerificationType::Long => out.put_u8(4),
            VerificationType::Null => out.put_u8(5),
            VerificationType::UninitializedThis => out.put_u8(6),
            VerificationType::Object(name) => {
                out.put_u8(7);
                out.put_u16(pool.add_class(name)?);
            }
            VerificationType::Uninitialized(offset) => {
                let offset = u16::try_from(*offset)
                    .map_err(|_| ClassFileError::CodeTooLarge(*offset as usize))?;
                out.put_u8(8);
                out.put_u16(offset);
            }
        }
        Ok(())
    }

    fn from_field_type(ty: FieldType) -> Self {
        match ty {
            FieldType::Int => VerificationType::Integer,
            FieldType::Float => VerificationType::Float,
            FieldType::Long => VerificationType::Long,
            FieldType::Double => VerificationType::Double,
            FieldType::Reference(name) => VerificationType::Object(name),
        }
    }
}

fn slot_count(types: &[VerificationType]) -> u32 {
    types
        .iter()
        .map(|t| match t {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        })
        .sum()
}

/// A stack map frame at an absolute code offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub offset: u32,
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

impl Frame {
    /// Local variable slots covered by `locals`; long and double take two
    pub fn local_slots(&self) -> u32 {
        slot_count(&self.locals)
    }

    /// Operand stack slots taken by `stack`
    pub fn stack_slots(&self) -> u32 {
        slot_count(&self.stack)
    }

    pub fn uninitialized_offsets(&self) -> impl Iterator<Item = u32> + '_ {
        self.locals.iter().chain(self.stack.iter()).filter_map(|t| match t {
            VerificationType::Uninitialized(offset) => Some(*offset),
            _ => None,
        })
    }
}

/// The implicit frame at offset 0, derived from the method signature
pub fn initial_locals(
    class_name: &str,
    method_name: &str,
    descriptor: &str,
    is_static: bool,
) -> Result<Vec<VerificationType>, ClassFileError> {
    let mut locals = Vec::new();
    if !is_static {
        if method_name == "<init>" && class_name != "java/lang/Object" {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(class_name.to_string()));
        }
    }
    let (params, _) = descriptor::parse_method(descriptor)?;
    locals.extend(params.into_iter().map(VerificationType::from_field_type));
    Ok(locals)
}

pub fn decode_table(
    info: &[u8],
    pool: &ConstantPool,
    initial: &[VerificationType],
) -> Result<Vec<Frame>, ClassFileError> {
    let mut r = ByteReader::new(info);
    let count = r.u16()?;
    let mut frames: Vec<Frame> = Vec::with_capacity(count as usize);
    let mut locals = initial.to_vec();

    for i in 0..count {
        let frame_type = r.u8()?;
        let (delta, stack) = match frame_type {
            0..=63 => (frame_type as u32, Vec::new()),
            64..=127 => {
                let item = VerificationType::read(&mut r, pool)?;
                ((frame_type - 64) as u32, vec![item])
            }
            247 => {
                let delta = r.u16()? as u32;
                (delta, vec![VerificationType::read(&mut r, pool)?])
            }
            248..=250 => {
                let delta = r.u16()? as u32;
                let chop = (251 - frame_type) as usize;
                if chop > locals.len() {
                    return Err(ClassFileError::BadStackMap(format!(
                        "chop of {chop} locals from {}",
                        locals.len()
                    )));
                }
                locals.truncate(locals.len() - chop);
                (delta, Vec::new())
            }
            251 => (r.u16()? as u32, Vec::new()),
            252..=254 => {
                let delta = r.u16()? as u32;
                for _ in 0..(frame_type - 251) {
                    locals.push(VerificationType::read(&mut r, pool)?);
                }
                (delta, Vec::new())
            }
            255 => {
                let delta = r.u16()? as u32;
                let local_count = r.u16()?;
                locals = (0..local_count)
                    .map(|_| VerificationType::read(&mut r, pool))
                    .collect::<Result<_, _>>()?;
                let stack_count = r.u16()?;
                let stack = (0..stack_count)
                    .map(|_| VerificationType::read(&mut r, pool))
                    .collect::<Result<_, _>>()?;
                (delta, stack)
            }
            reserved => {
                return Err(ClassFileError::BadStackMap(format!(
                    "reserved frame type {reserved} in frame {i}"
                )))
            }
        };
        let offset = match frames.last() {
            None => delta,
            Some(prev) => prev.offset + delta + 1,
        };
        frames.push(Frame {
            offset,
            locals: locals.clone(),
            stack,
        });
    }

    if r.remaining() != 0 {
        return Err(ClassFileError::TrailingBytes(r.remaining()));
    }
    Ok(frames)
}

/// Encode frames (sorted by offset, one per offset) as a `StackMapTable` payload
pub fn encode_table(
    frames: &[Frame],
    initial: &[VerificationType],
    pool: &mut ConstantPool,
) -> Result<Vec<u8>, ClassFileError> {
    let mut out = Vec::new();
    out.put_u16(count_u16(frames.len(), "frames")?);

    let mut prev_locals = initial;
    let mut prev_offset: Option<u32> = None;
    for frame in frames {
        let delta = match prev_offset {
            None => frame.offset,
            Some(prev) if frame.offset > prev => frame.offset - prev - 1,
            Some(_) => {
                return Err(ClassFileError::BadStackMap(format!(
                    "frame at {} is out of order",
                    frame.offset
                )))
            }
        };
        let delta16 =
            u16::try_from(delta).map_err(|_| ClassFileError::CodeTooLarge(frame.offset as usize))?;

        let same_locals = frame.locals.as_slice() == prev_locals;
        if same_locals && frame.stack.is_empty() {
            if delta < 64 {
                out.put_u8(delta as u8);
            } else {
                out.put_u8(251);
                out.put_u16(delta16);
            }
        } else if same_locals && frame.stack.len() == 1 {
            if delta < 64 {
                out.put_u8(64 + delta as u8);
            } else {
                out.put_u8(247);
                out.put_u16(delta16);
            }
            frame.stack[0].write(&mut out, pool)?;
        } else if frame.stack.is_empty()
            && frame.locals.len() < prev_locals.len()
            && prev_locals.len() - frame.locals.len() <= 3
            && prev_locals.starts_with(&frame.locals)
        {
            let chop = (prev_locals.len() - frame.locals.len()) as u8;
            out.put_u8(251 - chop);
            out.put_u16(delta16);
        } else if frame.stack.is_empty()
            && frame.locals.len() > prev_locals.len()
            && frame.locals.len() - prev_locals.len() <= 3
            && frame.locals.starts_with(prev_locals)
        {
            let added = &frame.locals[prev_locals.len()..];
            out.put_u8(251 + added.len() as u8);
            out.put_u16(delta16);
            for ty in added {
                ty.write(&mut out, pool)?;
            }
        } else {
            out.put_u8(255);
            out.put_u16(delta16);
            out.put_u16(count_u16(frame.locals.len(), "frame locals")?);
            for ty in &frame.locals {
                ty.write(&mut out, pool)?;
            }
            out.put_u16(count_u16(frame.stack.len(), "frame stack items")?);
            for ty in &frame.stack {
                ty.write(&mut out, pool)?;
            }
        }

        prev_locals = &frame.locals;
        prev_offset = Some(frame.offset);
    }
    Ok(out)
}
