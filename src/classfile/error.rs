use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassFileError {
    #[error("Unexpected end of class data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("Bad magic number: {0:#010x}")]
    BadMagic(u32),

    #[error("{0} trailing bytes after class data")]
    TrailingBytes(usize),

    #[error("Invalid constant pool index: {0}")]
    BadConstantIndex(u16),

    #[error("Unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("Constant #{index} is not a {expected}")]
    ConstantType { index: u16, expected: &'static str },

    #[error("Malformed modified UTF-8 in constant pool")]
    InvalidUtf8,

    #[error("Constant pool is full")]
    ConstantPoolOverflow,

    #[error("Unknown opcode {opcode:#04x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u32 },

    #[error("Truncated instruction at offset {0}")]
    TruncatedInstruction(u32),

    #[error("Code offset {0} is not an instruction boundary")]
    BadCodeOffset(u32),

    #[error("Branch at offset {offset} needs a delta of {delta}, which does not fit in 16 bits")]
    BranchOutOfRange { offset: u32, delta: i64 },

    #[error("Too many {what}: {count} (max: 65535)")]
    TooMany { what: &'static str, count: usize },

    #[error("Method code is {0} bytes (max: 65535)")]
    CodeTooLarge(usize),

    #[error("Invalid descriptor: {0}")]
    BadDescriptor(String),

    #[error("Malformed stack map frame: {0}")]
    BadStackMap(String),

    #[error("Operand stack underflow at offset {0}")]
    StackUnderflow(u32),

    #[error("In method {method}: {source}")]
    InMethod {
        method: String,
        #[source]
        source: Box<ClassFileError>,
    },
}
