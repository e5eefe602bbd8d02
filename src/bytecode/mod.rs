//! Method body level view of class files: instructions, stack map frames and
//! the stack/locals bookkeeping that has to be redone after an edit.

pub mod descriptor;
pub mod frames;
mod insn;
pub mod opcode;
mod stack;


pub use frames::{Frame, VerificationType};
pub use insn::{Decoded, Insn, decode, switch_padding};
pub use stack::{max_locals, max_stack};
