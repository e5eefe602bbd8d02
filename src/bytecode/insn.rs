use super::opcode::*;
use crate::classfile::{ByteReader, ByteWriter, ClassFileError};
use std::collections::HashSet;

/// A decoded instruction
///
/// Branch and switch targets are absolute code offsets so a sequence can be
/// laid out again at different positions. Everything else keeps its operand
/// bytes exactly as read.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Plain { opcode: u8, operands: Vec<u8> },
    Branch { opcode: u8, target: u32 },
    TableSwitch { default: u32, low: i32, high: i32, targets: Vec<u32> },
    LookupSwitch { default: u32, pairs: Vec<(i32, u32)> },
}

/// An instruction together with its offset in the code array
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub offset: u32,
    pub insn: Insn,
}

/// Operand byte count for fixed-length instructions that carry no code offsets
fn plain_operand_len(opcode: u8) -> Option<usize> {
    Some(match opcode {
        NOP..=DCONST_1 => 0,
        BIPUSH => 1,
        SIPUSH => 2,
        LDC => 1,
        LDC_W | LDC2_W => 2,
        ILOAD..=ALOAD => 1,
        ILOAD_0..=SALOAD => 0,
        ISTORE..=ASTORE => 1,
        ISTORE_0..=LXOR => 0,
        IINC => 2,
        I2L..=DCMPG => 0,
        RET => 1,
        IRETURN..=RETURN => 0,
        GETSTATIC..=INVOKESTATIC => 2,
        INVOKEINTERFACE | INVOKEDYNAMIC => 4,
        NEW => 2,
        NEWARRAY => 1,
        ANEWARRAY => 2,
        ARRAYLENGTH | ATHROW => 0,
        CHECKCAST | INSTANCEOF => 2,
        MONITORENTER | MONITOREXIT => 0,
        MULTIANEWARRAY => 3,
        _ => return None,
    })
}

fn is_narrow_branch(opcode: u8) -> bool {
    (IFEQ..=JSR).contains(&opcode) || opcode == IFNULL || opcode == IFNONNULL
}

fn is_wide_branch(opcode: u8) -> bool {
    opcode == GOTO_W || opcode == JSR_W
}

/// Bytes of padding after a switch opcode placed at `offset`
pub fn switch_padding(offset: u32) -> u32 {
    3 - (offset % 4)
}

fn absolute(offset: u32, delta: i32) -> Result<u32, ClassFileError> {
    let target = offset as i64 + delta as i64;
    u32::try_from(target).map_err(|_| ClassFileError::BadCodeOffset(offset))
}

impl Insn {
    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Plain { opcode, .. } | Insn::Branch { opcode, .. } => *opcode,
            Insn::TableSwitch { .. } => TABLESWITCH,
            Insn::LookupSwitch { .. } => LOOKUPSWITCH,
        }
    }

    pub fn simple(opcode: u8) -> Self {
        Insn::Plain {
            opcode,
            operands: Vec::new(),
        }
    }

    pub fn with_u16(opcode: u8, index: u16) -> Self {
        Insn::Plain {
            opcode,
            operands: index.to_be_bytes().to_vec(),
        }
    }

    /// Encoded size when placed at `offset`
    pub fn size_at(&self, offset: u32) -> u32 {
        match self {
            Insn::Plain { operands, .. } => 1 + operands.len() as u32,
            Insn::Branch { opcode, .. } => {
                if is_wide_branch(*opcode) {
                    5
                } else {
                    3
                }
            }
            Insn::TableSwitch { targets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * targets.len() as u32
            }
            Insn::LookupSwitch { pairs, .. } => {
                1 + switch_padding(offset) + 8 + 8 * pairs.len() as u32
            }
        }
    }

    /// Every absolute code offset this instruction can transfer control to
    pub fn targets(&self) -> Vec<u32> {
        match self {
            Insn::Plain { .. } => Vec::new(),
            Insn::Branch { target, .. } => vec![*target],
            Insn::TableSwitch { default, targets, .. } => {
                std::iter::once(*default).chain(targets.iter().copied()).collect()
            }
            Insn::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, t)| *t))
                .collect(),
        }
    }

    /// Rewrite every target through `map`
    pub fn map_targets<F>(&self, mut map: F) -> Result<Insn, ClassFileError>
    where
        F: FnMut(u32) -> Result<u32, ClassFileError>,
    {
        Ok(match self {
            Insn::Plain { .. } => self.clone(),
            Insn::Branch { opcode, target } => Insn::Branch {
                opcode: *opcode,
                target: map(*target)?,
            },
            Insn::TableSwitch { default, low, high, targets } => Insn::TableSwitch {
                default: map(*default)?,
                low: *low,
                high: *high,
                targets: targets.iter().map(|t| map(*t)).collect::<Result<_, _>>()?,
            },
            Insn::LookupSwitch { default, pairs } => Insn::LookupSwitch {
                default: map(*default)?,
                pairs: pairs
                    .iter()
                    .map(|(k, t)| map(*t).map(|t| (*k, t)))
                    .collect::<Result<_, _>>()?,
            },
        })
    }

    /// Constant pool index operand, for instructions that have one
    pub fn cp_index(&self) -> Option<u16> {
        let Insn::Plain { opcode, operands } = self else {
            return None;
        };
        match *opcode {
            LDC => operands.first().map(|b| *b as u16),
            LDC_W | LDC2_W | GETSTATIC..=INVOKEDYNAMIC | NEW | ANEWARRAY | CHECKCAST
            | INSTANCEOF | MULTIANEWARRAY => {
                Some(u16::from_be_bytes([*operands.first()?, *operands.get(1)?]))
            }
            _ => None,
        }
    }

    /// Local variable slot and width touched by a load, store, `iinc` or `ret`
    pub fn local_slot(&self) -> Option<(u16, u16)> {
        let Insn::Plain { opcode, operands } = self else {
            return None;
        };
        let (op, index) = if *opcode == WIDE {
            let op = *operands.first()?;
            (op, u16::from_be_bytes([*operands.get(1)?, *operands.get(2)?]))
        } else {
            match *opcode {
                ILOAD..=ALOAD | ISTORE..=ASTORE | IINC | RET => {
                    (*opcode, *operands.first()? as u16)
                }
                ILOAD_0..=ALOAD_3 => (*opcode, ((*opcode - ILOAD_0) % 4) as u16),
                ISTORE_0..=ASTORE_3 => (*opcode, ((*opcode - ISTORE_0) % 4) as u16),
                _ => return None,
            }
        };
        let wide = match op {
            LLOAD | DLOAD | LSTORE | DSTORE => true,
            ILOAD_0..=ALOAD_3 => {
                let group = (op - ILOAD_0) / 4;
                group == 1 || group == 3
            }
            ISTORE_0..=ASTORE_3 => {
                let group = (op - ISTORE_0) / 4;
                group == 1 || group == 3
            }
            _ => false,
        };
        Some((index, if wide { 2 } else { 1 }))
    }

    /// Append the encoding of this instruction placed at `offset`
    pub fn encode(&self, offset: u32, out: &mut Vec<u8>) -> Result<(), ClassFileError> {
        match self {
            Insn::Plain { opcode, operands } => {
                out.put_u8(*opcode);
                out.extend_from_slice(operands);
            }
            Insn::Branch { opcode, target } => {
                let delta = *target as i64 - offset as i64;
                out.put_u8(*opcode);
                if is_wide_branch(*opcode) {
                    out.put_i32(delta as i32);
                } else {
                    let narrow = i16::try_from(delta)
                        .map_err(|_| ClassFileError::BranchOutOfRange { offset, delta })?;
                    out.put_u16(narrow as u16);
                }
            }
            Insn::TableSwitch { default, low, high, targets } => {
                out.put_u8(TABLESWITCH);
                out.extend(std::iter::repeat(0).take(switch_padding(offset) as usize));
                out.put_i32(relative(offset, *default));
                out.put_i32(*low);
                out.put_i32(*high);
                for target in targets {
                    out.put_i32(relative(offset, *target));
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                out.put_u8(LOOKUPSWITCH);
                out.extend(std::iter::repeat(0).take(switch_padding(offset) as usize));
                out.put_i32(relative(offset, *default));
                out.put_i32(pairs.len() as i32);
                for (key, target) in pairs {
                    out.put_i32(*key);
                    out.put_i32(relative(offset, *target));
                }
            }
        }
        Ok(())
    }
}

fn relative(offset: u32, target: u32) -> i32 {
    (target as i64 - offset as i64) as i32
}

/// Decode a whole code array, checking that every branch lands on an instruction
pub fn decode(code: &[u8]) -> Result<Vec<Decoded>, ClassFileError> {
    let mut r = ByteReader::new(code);
    let mut out = Vec::new();
    while r.remaining() > 0 {
        let offset = r.position() as u32;
        let truncated = |_| ClassFileError::TruncatedInstruction(offset);
        let opcode = r.u8()?;
        let insn = if let Some(len) = plain_operand_len(opcode) {
            Insn::Plain {
                opcode,
                operands: r.bytes(len).map_err(truncated)?.to_vec(),
            }
        } else if is_narrow_branch(opcode) {
            let delta = r.u16().map_err(truncated)? as i16;
            Insn::Branch {
                opcode,
                target: absolute(offset, delta as i32)?,
            }
        } else if is_wide_branch(opcode) {
            let delta = r.i32().map_err(truncated)?;
            Insn::Branch {
                opcode,
                target: absolute(offset, delta)?,
            }
        } else if opcode == WIDE {
            let inner = r.u8().map_err(truncated)?;
            let len = match inner {
                IINC => 4,
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => 2,
                _ => return Err(ClassFileError::UnknownOpcode { opcode: inner, offset }),
            };
            let mut operands = vec![inner];
            operands.extend_from_slice(r.bytes(len).map_err(truncated)?);
            Insn::Plain { opcode, operands }
        } else if opcode == TABLESWITCH {
            r.bytes(switch_padding(offset) as usize).map_err(truncated)?;
            let default = absolute(offset, r.i32().map_err(truncated)?)?;
            let low = r.i32().map_err(truncated)?;
            let high = r.i32().map_err(truncated)?;
            if high < low {
                return Err(ClassFileError::TruncatedInstruction(offset));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            if count * 4 > r.remaining() {
                return Err(ClassFileError::TruncatedInstruction(offset));
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(absolute(offset, r.i32().map_err(truncated)?)?);
            }
            Insn::TableSwitch { default, low, high, targets }
        } else if opcode == LOOKUPSWITCH {
            r.bytes(switch_padding(offset) as usize).map_err(truncated)?;
            let default = absolute(offset, r.i32().map_err(truncated)?)?;
            let count = r.i32().map_err(truncated)?;
            if count < 0 || count as usize * 8 > r.remaining() {
                return Err(ClassFileError::TruncatedInstruction(offset));
            }
            let mut pairs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = r.i32().map_err(truncated)?;
                pairs.push((key, absolute(offset, r.i32().map_err(truncated)?)?));
            }
            Insn::LookupSwitch { default, pairs }
        } else {
            return Err(ClassFileError::UnknownOpcode { opcode, offset });
        };
        out.push(Decoded { offset, insn });
    }

    let boundaries: HashSet<u32> = out.iter().map(|d| d.offset).collect();
    for decoded in &out {
        if let Some(bad) = decoded.insn.targets().into_iter().find(|t| !boundaries.contains(t)) {
            return Err(ClassFileError::BadCodeOffset(bad));
        }
    }
    Ok(out)
}
