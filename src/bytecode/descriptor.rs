use crate::classfile::ClassFileError;

/// A parsed field type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// `B`, `C`, `I`, `S` or `Z`: all verified as int
    Int,
    Float,
    Long,
    Double,
    /// Class name or array descriptor, as it appears in a `CONSTANT_Class`
    Reference(String),
}

impl FieldType {
    /// Stack and local variable slots taken by a value of this type
    pub fn slots(&self) -> u16 {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }
}

/// Parse one field type starting at `pos`, returning it and the next position
fn parse_one(desc: &str, pos: usize) -> Result<(FieldType, usize), ClassFileError> {
    let bad = || ClassFileError::BadDescriptor(desc.to_string());
    let bytes = desc.as_bytes();
    let start = pos;
    let mut pos = pos;
    while bytes.get(pos) == Some(&b'[') {
        pos += 1;
    }
    let array = pos > start;
    let ty = match bytes.get(pos).ok_or_else(bad)? {
        b'B' | b'C' | b'I' | b'S' | b'Z' => {
            pos += 1;
            FieldType::Int
        }
        b'F' => {
            pos += 1;
            FieldType::Float
        }
        b'J' => {
            pos += 1;
            FieldType::Long
        }
        b'D' => {
            pos += 1;
            FieldType::Double
        }
        b'L' => {
            let end = desc[pos..].find(';').ok_or_else(bad)? + pos;
            if end == pos + 1 {
                return Err(bad());
            }
            let name = desc[pos + 1..end].to_string();
            pos = end + 1;
            FieldType::Reference(name)
        }
        _ => return Err(bad()),
    };
    if array {
        Ok((FieldType::Reference(desc[start..pos].to_string()), pos))
    } else {
        Ok((ty, pos))
    }
}

pub fn parse_field(desc: &str) -> Result<FieldType, ClassFileError> {
    let (ty, end) = parse_one(desc, 0)?;
    if end != desc.len() {
        return Err(ClassFileError::BadDescriptor(desc.to_string()));
    }
    Ok(ty)
}

/// Parameter types and return type (`None` for void) of a method descriptor
pub fn parse_method(desc: &str) -> Result<(Vec<FieldType>, Option<FieldType>), ClassFileError> {
    let bad = || ClassFileError::BadDescriptor(desc.to_string());
    if !desc.starts_with('(') {
        return Err(bad());
    }
    let mut params = Vec::new();
    let mut pos = 1;
    loop {
        match desc.as_bytes().get(pos) {
            Some(b')') => break,
            Some(_) => {
                let (ty, next) = parse_one(desc, pos)?;
                params.push(ty);
                pos = next;
            }
            None => return Err(bad()),
        }
    }
    let ret = &desc[pos + 1..];
    if ret == "V" {
        Ok((params, None))
    } else {
        Ok((params, Some(parse_field(ret)?)))
    }
}

/// Slots taken by the arguments of a method descriptor (excluding any receiver)
pub fn argument_slots(desc: &str) -> Result<u16, ClassFileError> {
    let (params, _) = parse_method(desc)?;
    Ok(params.iter().map(FieldType::slots).sum())
}

/// Slots pushed by the return value of a method descriptor
pub fn return_slots(desc: &str) -> Result<u16, ClassFileError> {
    let (_, ret) = parse_method(desc)?;
    Ok(ret.map_or(0, |t| t.slots()))
}
