//! Hand assembly of small class files and jars for unit tests

use crate::bytecode::{Frame, frames};
use crate::classfile::{
    ACC_STATIC, Attribute, ByteWriter, ClassFile, CodeAttribute, Constant, ConstantPool,
    ExceptionHandler, Member,
};
use std::io::{Read, Write};
use std::path::Path;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const PUBLIC_STATIC: u16 = ACC_PUBLIC | ACC_STATIC;

/// `opcode` followed by a big-endian u16 operand
pub fn op_u16(opcode: u8, operand: u16) -> Vec<u8> {
    let mut out = vec![opcode];
    out.put_u16(operand);
    out
}

/// `opcode` followed by a signed 16-bit branch delta
pub fn branch(opcode: u8, delta: i16) -> Vec<u8> {
    op_u16(opcode, delta as u16)
}

/// Body of one method before it is turned into a `Code` attribute
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub handlers: Vec<ExceptionHandler>,
    pub frames: Vec<Frame>,
    pub line_numbers: Vec<(u16, u16)>,
    /// (start_pc, length, name, descriptor, slot)
    pub local_variables: Vec<(u16, u16, String, String, u16)>,
}

impl MethodBody {
    pub fn new(parts: &[Vec<u8>]) -> Self {
        Self {
            max_stack: 4,
            max_locals: 4,
            code: parts.concat(),
            ..Self::default()
        }
    }

    pub fn handler(mut self, start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        self.handlers.push(ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc,
            catch_type,
        });
        self
    }

    pub fn frame(mut self, frame: Frame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn line(mut self, start_pc: u16, line: u16) -> Self {
        self.line_numbers.push((start_pc, line));
        self
    }

    pub fn local(
        mut self,
        start_pc: u16,
        length: u16,
        name: &str,
        descriptor: &str,
        slot: u16,
    ) -> Self {
        self.local_variables
            .push((start_pc, length, name.to_string(), descriptor.to_string(), slot));
        self
    }
}

pub struct ClassBuilder {
    pub pool: ConstantPool,
    name: String,
    this_class: u16,
    super_class: u16,
    major_version: u16,
    methods: Vec<Member>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class(name).unwrap();
        let super_class = pool.add_class("java/lang/Object").unwrap();
        Self {
            pool,
            name: name.to_string(),
            this_class,
            super_class,
            major_version: 52,
            methods: Vec::new(),
        }
    }

    pub fn major_version(mut self, version: u16) -> Self {
        self.major_version = version;
        self
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.pool.add_method_ref(owner, name, descriptor).unwrap()
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.pool.add_field_ref(owner, name, descriptor).unwrap()
    }

    pub fn class_ref(&mut self, name: &str) -> u16 {
        self.pool.add_class(name).unwrap()
    }

    pub fn method(&mut self, access_flags: u16, name: &str, descriptor: &str, body: MethodBody) {
        let mut code = CodeAttribute {
            max_stack: body.max_stack,
            max_locals: body.max_locals,
            code: body.code,
            exception_table: body.handlers,
            attributes: Vec::new(),
        };
        if !body.frames.is_empty() {
            let initial = frames::initial_locals(
                &self.name,
                name,
                descriptor,
                access_flags & ACC_STATIC != 0,
            )
            .unwrap();
            let info = frames::encode_table(&body.frames, &initial, &mut self.pool).unwrap();
            code.attributes.push(Attribute {
                name_index: self.pool.add_utf8("StackMapTable").unwrap(),
                info,
            });
        }
        if !body.line_numbers.is_empty() {
            let mut info = Vec::new();
            info.put_u16(body.line_numbers.len() as u16);
            for (start_pc, line) in body.line_numbers {
                info.put_u16(start_pc);
                info.put_u16(line);
            }
            code.attributes.push(Attribute {
                name_index: self.pool.add_utf8("LineNumberTable").unwrap(),
                info,
            });
        }
        if !body.local_variables.is_empty() {
            let mut info = Vec::new();
            info.put_u16(body.local_variables.len() as u16);
            for (start_pc, length, var_name, var_descriptor, slot) in &body.local_variables {
                info.put_u16(*start_pc);
                info.put_u16(*length);
                info.put_u16(self.pool.add_utf8(var_name).unwrap());
                info.put_u16(self.pool.add_utf8(var_descriptor).unwrap());
                info.put_u16(*slot);
            }
            code.attributes.push(Attribute {
                name_index: self.pool.add_utf8("LocalVariableTable").unwrap(),
                info,
            });
        }
        let name_index = self.pool.add_utf8(name).unwrap();
        let descriptor_index = self.pool.add_utf8(descriptor).unwrap();
        let code_name = self.pool.add_utf8("Code").unwrap();
        self.methods.push(Member {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![Attribute {
                name_index: code_name,
                info: code.to_bytes().unwrap(),
            }],
        });
    }

    pub fn build(self) -> Vec<u8> {
        ClassFile {
            minor_version: 0,
            major_version: self.major_version,
            constant_pool: self.pool,
            access_flags: 0x0021,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: self.methods,
            attributes: Vec::new(),
        }
        .to_bytes()
        .unwrap()
    }
}

/// A class with one static method that calls `java/awt/Desktop.getDesktop()`
pub fn awt_caller(name: &str) -> Vec<u8> {
    use crate::bytecode::opcode::{INVOKESTATIC, POP, RETURN};

    let mut class = ClassBuilder::new(name);
    let get_desktop = class.method_ref("java/awt/Desktop", "getDesktop", "()Ljava/awt/Desktop;");
    class.method(
        PUBLIC_STATIC,
        "open",
        "()V",
        MethodBody::new(&[op_u16(INVOKESTATIC, get_desktop), vec![POP, RETURN]]),
    );
    class.build()
}

/// A class with one static method that touches nothing outside `java/lang`
pub fn plain_class(name: &str) -> Vec<u8> {
    use crate::bytecode::opcode::{INVOKESTATIC, RETURN};

    let mut class = ClassBuilder::new(name);
    let gc = class.method_ref("java/lang/System", "gc", "()V");
    class.method(
        PUBLIC_STATIC,
        "run",
        "()V",
        MethodBody::new(&[op_u16(INVOKESTATIC, gc), vec![RETURN]]),
    );
    class.build()
}

/// Find a method by name and parse its `Code` attribute
pub fn code_of(class: &ClassFile, method: &str) -> CodeAttribute {
    let pool = &class.constant_pool;
    let member = class
        .methods
        .iter()
        .find(|m| pool.utf8(m.name_index).unwrap() == method)
        .unwrap();
    let pos = member.find_attribute(pool, "Code").unwrap();
    CodeAttribute::parse(&member.attributes[pos].info).unwrap()
}

/// Name of every attribute in a `Code` attribute
pub fn code_attribute_names(class: &ClassFile, code: &CodeAttribute) -> Vec<String> {
    code.attributes
        .iter()
        .map(|a| class.constant_pool.utf8(a.name_index).unwrap())
        .collect()
}

/// Decoded `StackMapTable` of a method, empty when there is none
pub fn frames_of(class: &ClassFile, method: &str, descriptor: &str, is_static: bool) -> Vec<Frame> {
    let code = code_of(class, method);
    let names = code_attribute_names(class, &code);
    let Some(pos) = names.iter().position(|n| n == "StackMapTable") else {
        return Vec::new();
    };
    let initial =
        frames::initial_locals(&class.name().unwrap(), method, descriptor, is_static).unwrap();
    frames::decode_table(&code.attributes[pos].info, &class.constant_pool, &initial).unwrap()
}

/// Every string literal in the constant pool
pub fn string_constants(class: &ClassFile) -> Vec<String> {
    let pool = &class.constant_pool;
    pool.iter()
        .filter_map(|(_, c)| match c {
            Constant::String(utf8) => Some(pool.utf8(*utf8).unwrap()),
            _ => None,
        })
        .collect()
}

/// Write a jar holding `entries` in order; names ending in `/` become directories
pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Read every entry of a jar as (name, bytes) in archive order
pub fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        entries.push((entry.name().to_string(), data));
    }
    entries
}
