use super::bytes::{ByteReader, ByteWriter};
use super::{ClassFileError, mutf8};

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Raw modified UTF-8 bytes, kept as stored so untouched entries round-trip exactly
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE bits, compared bitwise so NaN payloads survive
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType(u16),
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module(u16),
    Package(u16),
    /// Slot 0 and the slot after every Long/Double
    Unusable,
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef { .. } => 10,
            Constant::InterfaceMethodRef { .. } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType(_) => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
            Constant::Unusable => 0,
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    /// Internal name of the owning type, e.g. `java/awt/Desktop`
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
        }
    }

    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);
        while entries.len() < count as usize {
            let index = entries.len() as u16;
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    Constant::Utf8(r.bytes(len)?.to_vec())
                }
                3 => Constant::Integer(r.i32()?),
                4 => Constant::Float(r.u32()?),
                5 => Constant::Long(r.u64()? as i64),
                6 => Constant::Double(r.u64()?),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::FieldRef {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                10 => Constant::MethodRef {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                12 => Constant::NameAndType {
                    name_index: r.u16()?,
                    descriptor_index: r.u16()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: r.u8()?,
                    reference_index: r.u16()?,
                },
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                _ => return Err(ClassFileError::UnknownConstantTag { tag, index }),
            };
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }
        // A trailing Long/Double may push past the declared count.
        if entries.len() > count as usize {
            return Err(ClassFileError::BadConstantIndex(count));
        }
        Ok(Self { entries })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) {
        out.put_u16(self.entries.len() as u16);
        for constant in &self.entries {
            if matches!(constant, Constant::Unusable) {
                continue;
            }
            out.put_u8(constant.tag());
            match constant {
                Constant::Utf8(bytes) => {
                    out.put_u16(bytes.len() as u16);
                    out.extend_from_slice(bytes);
                }
                Constant::Integer(v) => out.put_i32(*v),
                Constant::Float(bits) => out.put_u32(*bits),
                Constant::Long(v) => out.put_u64(*v as u64),
                Constant::Double(bits) => out.put_u64(*bits),
                Constant::Class(i)
                | Constant::String(i)
                | Constant::MethodType(i)
                | Constant::Module(i)
                | Constant::Package(i) => out.put_u16(*i),
                Constant::FieldRef { class_index, name_and_type_index }
                | Constant::MethodRef { class_index, name_and_type_index }
                | Constant::InterfaceMethodRef { class_index, name_and_type_index } => {
                    out.put_u16(*class_index);
                    out.put_u16(*name_and_type_index);
                }
                Constant::NameAndType { name_index, descriptor_index } => {
                    out.put_u16(*name_index);
                    out.put_u16(*descriptor_index);
                }
                Constant::MethodHandle { reference_kind, reference_index } => {
                    out.put_u8(*reference_kind);
                    out.put_u16(*reference_index);
                }
                Constant::Dynamic { bootstrap_method_attr_index, name_and_type_index }
                | Constant::InvokeDynamic { bootstrap_method_attr_index, name_and_type_index } => {
                    out.put_u16(*bootstrap_method_attr_index);
                    out.put_u16(*name_and_type_index);
                }
                Constant::Unusable => {}
            }
        }
    }

    /// The `constant_pool_count` value: one more than the highest index
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::BadConstantIndex(index)),
            Some(constant) => Ok(constant),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<String, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(bytes) => mutf8::decode(bytes),
            _ => Err(ClassFileError::ConstantType { index, expected: "Utf8" }),
        }
    }

    /// Internal name (or array descriptor) named by a `CONSTANT_Class`
    pub fn class_name(&self, index: u16) -> Result<String, ClassFileError> {
        match self.get(index)? {
            Constant::Class(name_index) => self.utf8(*name_index),
            _ => Err(ClassFileError::ConstantType { index, expected: "Class" }),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String), ClassFileError> {
        match self.get(index)? {
            Constant::NameAndType { name_index, descriptor_index } => {
                Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?))
            }
            _ => Err(ClassFileError::ConstantType { index, expected: "NameAndType" }),
        }
    }

    /// Resolve a Fieldref, Methodref or InterfaceMethodref
    pub fn member_ref(&self, index: u16) -> Result<MemberRef, ClassFileError> {
        match self.get(index)? {
            Constant::FieldRef { class_index, name_and_type_index }
            | Constant::MethodRef { class_index, name_and_type_index }
            | Constant::InterfaceMethodRef { class_index, name_and_type_index } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(MemberRef {
                    owner: self.class_name(*class_index)?,
                    name,
                    descriptor,
                })
            }
            _ => Err(ClassFileError::ConstantType { index, expected: "member reference" }),
        }
    }

    /// Descriptor carried by an InvokeDynamic or Dynamic constant
    pub fn dynamic_descriptor(&self, index: u16) -> Result<String, ClassFileError> {
        match self.get(index)? {
            Constant::Dynamic { name_and_type_index, .. }
            | Constant::InvokeDynamic { name_and_type_index, .. } => {
                Ok(self.name_and_type(*name_and_type_index)?.1)
            }
            _ => Err(ClassFileError::ConstantType { index, expected: "dynamic constant" }),
        }
    }

    /// Iterate over every populated (index, constant) pair
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    fn find_or_push(&mut self, constant: Constant) -> Result<u16, ClassFileError> {
        if let Some(pos) = self.entries.iter().position(|c| *c == constant) {
            return Ok(pos as u16);
        }
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize {
            return Err(ClassFileError::ConstantPoolOverflow);
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn add_utf8(&mut self, s: &str) -> Result<u16, ClassFileError> {
        self.find_or_push(Constant::Utf8(mutf8::encode(s)))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(internal_name)?;
        self.find_or_push(Constant::Class(name_index))
    }

    pub fn add_string(&mut self, s: &str) -> Result<u16, ClassFileError> {
        let utf8 = self.add_utf8(s)?;
        self.find_or_push(Constant::String(utf8))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.find_or_push(Constant::NameAndType { name_index, descriptor_index })
    }

    pub fn add_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassFileError> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(Constant::MethodRef { class_index, name_and_type_index })
    }

    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassFileError> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(Constant::InterfaceMethodRef { class_index, name_and_type_index })
    }

    pub fn add_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassFileError> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.find_or_push(Constant::FieldRef { class_index, name_and_type_index })
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}
