//! Recomputation of `max_stack` and `max_locals`

use super::descriptor;
use super::insn::{Decoded, Insn};
use super::opcode::*;
use crate::classfile::{ClassFileError, ConstantPool, ExceptionHandler};
use std::collections::HashMap;

/// Slots popped and pushed by one instruction
fn stack_effect(insn: &Insn, pool: &ConstantPool) -> Result<(u16, u16), ClassFileError> {
    let opcode = insn.opcode();
    let member_slots = || -> Result<u16, ClassFileError> {
        let member = pool.member_ref(insn.cp_index().unwrap_or_default())?;
        Ok(descriptor::parse_field(&member.descriptor)?.slots())
    };
    let invoke_slots = |receiver: u16| -> Result<(u16, u16), ClassFileError> {
        let index = insn.cp_index().unwrap_or_default();
        let desc = if opcode == INVOKEDYNAMIC {
            pool.dynamic_descriptor(index)?
        } else {
            pool.member_ref(index)?.descriptor
        };
        Ok((
            descriptor::argument_slots(&desc)? + receiver,
            descriptor::return_slots(&desc)?,
        ))
    };

    Ok(match opcode {
        NOP => (0, 0),
        ACONST_NULL..=ICONST_5 => (0, 1),
        LCONST_0 | LCONST_1 => (0, 2),
        FCONST_0..=FCONST_2 => (0, 1),
        DCONST_0 | DCONST_1 => (0, 2),
        BIPUSH | SIPUSH | LDC | LDC_W => (0, 1),
        LDC2_W => (0, 2),
        ILOAD | FLOAD | ALOAD => (0, 1),
        LLOAD | DLOAD => (0, 2),
        ILOAD_0..=ALOAD_3 => (0, category_of_group((opcode - ILOAD_0) / 4)),
        LALOAD | DALOAD => (2, 2),
        IALOAD..=SALOAD => (2, 1),
        ISTORE | FSTORE | ASTORE => (1, 0),
        LSTORE | DSTORE => (2, 0),
        ISTORE_0..=ASTORE_3 => (category_of_group((opcode - ISTORE_0) / 4), 0),
        LASTORE | DASTORE => (4, 0),
        IASTORE..=SASTORE => (3, 0),
        POP => (1, 0),
        POP2 => (2, 0),
        DUP => (1, 2),
        DUP_X1 => (2, 3),
        DUP_X2 => (3, 4),
        DUP2 => (2, 4),
        DUP2_X1 => (3, 5),
        DUP2_X2 => (4, 6),
        SWAP => (2, 2),
        // add, sub, mul, div, rem in int/long/float/double order
        IADD..=0x73 => {
            if (opcode - IADD) % 2 == 1 {
                (4, 2)
            } else {
                (2, 1)
            }
        }
        INEG..=DNEG => {
            if (opcode - INEG) % 2 == 1 {
                (2, 2)
            } else {
                (1, 1)
            }
        }
        ISHL..=LUSHR => {
            if (opcode - ISHL) % 2 == 1 {
                (3, 2)
            } else {
                (2, 1)
            }
        }
        IAND..=LXOR => {
            if (opcode - IAND) % 2 == 1 {
                (4, 2)
            } else {
                (2, 1)
            }
        }
        IINC => (0, 0),
        I2L | I2D | F2L | F2D => (1, 2),
        I2F | F2I => (1, 1),
        L2I | L2F | D2I | D2F => (2, 1),
        L2D | D2L => (2, 2),
        I2B..=I2S => (1, 1),
        LCMP | DCMPL | DCMPG => (4, 1),
        FCMPL | FCMPG => (2, 1),
        IFEQ..=IFLE | IFNULL | IFNONNULL => (1, 0),
        IF_ICMPEQ..=IF_ACMPNE => (2, 0),
        GOTO | GOTO_W | RET => (0, 0),
        JSR | JSR_W => (0, 1),
        TABLESWITCH | LOOKUPSWITCH => (1, 0),
        LRETURN | DRETURN => (2, 0),
        IRETURN..=ARETURN => (1, 0),
        RETURN => (0, 0),
        GETSTATIC => (0, member_slots()?),
        PUTSTATIC => (member_slots()?, 0),
        GETFIELD => (1, member_slots()?),
        PUTFIELD => (1 + member_slots()?, 0),
        INVOKEVIRTUAL | INVOKESPECIAL | INVOKEINTERFACE => invoke_slots(1)?,
        INVOKESTATIC | INVOKEDYNAMIC => invoke_slots(0)?,
        NEW => (0, 1),
        NEWARRAY | ANEWARRAY | ARRAYLENGTH | CHECKCAST | INSTANCEOF => (1, 1),
        ATHROW | MONITORENTER | MONITOREXIT => (1, 0),
        MULTIANEWARRAY => {
            let dims = match insn {
                Insn::Plain { operands, .. } => operands.get(2).copied().unwrap_or(1),
                _ => 1,
            };
            (dims as u16, 1)
        }
        WIDE => {
            let inner = match insn {
                Insn::Plain { operands, .. } => operands.first().copied().unwrap_or(NOP),
                _ => NOP,
            };
            match inner {
                ILOAD | FLOAD | ALOAD => (0, 1),
                LLOAD | DLOAD => (0, 2),
                ISTORE | FSTORE | ASTORE => (1, 0),
                LSTORE | DSTORE => (2, 0),
                _ => (0, 0),
            }
        }
        _ => (0, 0),
    })
}

/// Groups of the `_0` to `_3` load/store shorthands run i, l, f, d, a
fn category_of_group(group: u8) -> u16 {
    if group == 1 || group == 3 {
        2
    } else {
        1
    }
}

/// Deepest operand stack over every path from the method entry, each handler,
/// and each `(offset, depth)` in `extra_entries`.
pub fn max_stack(
    insns: &[Decoded],
    handlers: &[ExceptionHandler],
    pool: &ConstantPool,
    extra_entries: &[(u32, u16)],
) -> Result<u16, ClassFileError> {
    if insns.is_empty() {
        return Ok(0);
    }
    let index: HashMap<u32, usize> = insns.iter().enumerate().map(|(i, d)| (d.offset, i)).collect();
    let lookup = |offset: u32| {
        index
            .get(&offset)
            .copied()
            .ok_or(ClassFileError::BadCodeOffset(offset))
    };

    let mut depth: Vec<Option<u16>> = vec![None; insns.len()];
    let mut worklist = Vec::new();
    fn seed(i: usize, d: u16, depth: &mut [Option<u16>], worklist: &mut Vec<usize>) {
        if depth[i].is_none() {
            depth[i] = Some(d);
            worklist.push(i);
        }
    }

    seed(0, 0, &mut depth, &mut worklist);
    for handler in handlers {
        seed(lookup(handler.handler_pc as u32)?, 1, &mut depth, &mut worklist);
    }
    for (offset, d) in extra_entries {
        seed(lookup(*offset)?, *d, &mut depth, &mut worklist);
    }

    let mut max = 0u16;
    while let Some(i) = worklist.pop() {
        let decoded = &insns[i];
        let before = depth[i].unwrap_or_default();
        let (pops, pushes) = stack_effect(&decoded.insn, pool)?;
        if before < pops {
            return Err(ClassFileError::StackUnderflow(decoded.offset));
        }
        let after = before - pops + pushes;
        max = max.max(before).max(after);

        let opcode = decoded.insn.opcode();
        for target in decoded.insn.targets() {
            seed(lookup(target)?, after, &mut depth, &mut worklist);
        }
        if !ends_flow(opcode) && i + 1 < insns.len() {
            // Returning from a subroutine leaves the stack as it was before the jsr.
            let next = if opcode == JSR || opcode == JSR_W { before } else { after };
            seed(i + 1, next, &mut depth, &mut worklist);
        }
    }
    Ok(max)
}

/// Local variable slots needed by the parameters and every instruction
pub fn max_locals(
    insns: &[Decoded],
    method_descriptor: &str,
    is_static: bool,
) -> Result<u16, ClassFileError> {
    let receiver = if is_static { 0 } else { 1 };
    let mut max = descriptor::argument_slots(method_descriptor)? as u32 + receiver;
    for decoded in insns {
        if let Some((index, width)) = decoded.insn.local_slot() {
            max = max.max(index as u32 + width as u32);
        }
    }
    u16::try_from(max).map_err(|_| ClassFileError::TooMany {
        what: "local variable slots",
        count: max as usize,
    })
}
