mod bytes;
mod code;
mod error;
mod mutf8;
mod pool;


pub use bytes::{ByteReader, ByteWriter, count_u16};
pub use code::{CodeAttribute, ExceptionHandler};
pub use error::ClassFileError;
pub use pool::{Constant, ConstantPool, MemberRef};

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_STATIC: u16 = 0x0008;

/// First class file version (Java 6) whose verifier checks StackMapTable frames
pub const STACK_MAP_VERSION: u16 = 50;

/// An attribute kept as its name index plus raw payload
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl Attribute {
    fn read_all(r: &mut ByteReader<'_>) -> Result<Vec<Self>, ClassFileError> {
        let count = r.u16()?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = r.u16()?;
            let len = r.u32()? as usize;
            attributes.push(Attribute {
                name_index,
                info: r.bytes(len)?.to_vec(),
            });
        }
        Ok(attributes)
    }

    fn write_all(attributes: &[Self], out: &mut Vec<u8>) -> Result<(), ClassFileError> {
        out.put_u16(count_u16(attributes.len(), "attributes")?);
        for attribute in attributes {
            out.put_u16(attribute.name_index);
            out.put_u32(attribute.info.len() as u32);
            out.extend_from_slice(&attribute.info);
        }
        Ok(())
    }
}

/// A field or method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Member {
    fn read_all(r: &mut ByteReader<'_>) -> Result<Vec<Self>, ClassFileError> {
        let count = r.u16()?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            members.push(Member {
                access_flags: r.u16()?,
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
                attributes: Attribute::read_all(r)?,
            });
        }
        Ok(members)
    }

    fn write_all(members: &[Self], out: &mut Vec<u8>) -> Result<(), ClassFileError> {
        out.put_u16(count_u16(members.len(), "members")?);
        for member in members {
            out.put_u16(member.access_flags);
            out.put_u16(member.name_index);
            out.put_u16(member.descriptor_index);
            Attribute::write_all(&member.attributes, out)?;
        }
        Ok(())
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// Position of the first attribute with the given name
    pub fn find_attribute(&self, pool: &ConstantPool, name: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| pool.utf8(a.name_index).is_ok_and(|n| n == name))
    }
}

/// A parsed class file
///
/// Fields and non-`Code` attributes are kept as raw bytes; only the parts the
/// rewriter needs are given structure. Serializing an unmodified `ClassFile`
/// reproduces the input byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut r = ByteReader::new(data);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::read(&mut r)?;
        let access_flags = r.u16()?;
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(r.u16()?);
        }

        let fields = Member::read_all(&mut r)?;
        let methods = Member::read_all(&mut r)?;
        let attributes = Attribute::read_all(&mut r)?;

        if r.remaining() != 0 {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }

        let class = Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        // Fail early on a dangling this_class rather than mid-rewrite.
        class.name()?;
        Ok(class)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ClassFileError> {
        let mut out = Vec::new();
        out.put_u32(MAGIC);
        out.put_u16(self.minor_version);
        out.put_u16(self.major_version);
        self.constant_pool.write(&mut out);
        out.put_u16(self.access_flags);
        out.put_u16(self.this_class);
        out.put_u16(self.super_class);
        out.put_u16(count_u16(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            out.put_u16(*interface);
        }
        Member::write_all(&self.fields, &mut out)?;
        Member::write_all(&self.methods, &mut out)?;
        Attribute::write_all(&self.attributes, &mut out)?;
        Ok(out)
    }

    /// Internal name of this class, e.g. `com/example/Main`
    pub fn name(&self) -> Result<String, ClassFileError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass; `None` only for `java/lang/Object`
    pub fn super_name(&self) -> Result<Option<String>, ClassFileError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn uses_stack_maps(&self) -> bool {
        self.major_version >= STACK_MAP_VERSION
    }
}
