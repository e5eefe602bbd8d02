use crate::bytecode::opcode;
use crate::classfile::MemberRef;
use crate::config::StripConfig;
use std::fmt;

/// Whether a rewritten instruction was a method call or a field access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Call,
    FieldAccess,
}

impl AccessKind {
    pub fn of_opcode(op: u8) -> Option<Self> {
        if opcode::is_method_invoke(op) {
            Some(AccessKind::Call)
        } else if opcode::is_field_access(op) {
            Some(AccessKind::FieldAccess)
        } else {
            None
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Call => write!(f, "call"),
            AccessKind::FieldAccess => write!(f, "field access"),
        }
    }
}

/// Convert a dotted name to the slash-separated form used inside class files
pub fn to_internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// The disallowed-namespace predicate and the failure it is replaced with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    prefix: String,
    exception_class: String,
    message_prefix: String,
}

impl RewriteRule {
    /// Rule for `prefix` (dotted or internal form) with the default failure
    pub fn new(prefix: &str) -> Self {
        let defaults = StripConfig::default();
        Self {
            prefix: to_internal_name(prefix),
            exception_class: to_internal_name(&defaults.exception_class),
            message_prefix: defaults.message_prefix,
        }
    }

    pub fn from_config(config: &StripConfig) -> Self {
        Self::new(&config.disallowed_prefix)
            .exception_class(&config.exception_class)
            .message_prefix(&config.message_prefix)
    }

    /// Set the exception type thrown in place of a disallowed reference
    pub fn exception_class(mut self, class_name: &str) -> Self {
        self.exception_class = to_internal_name(class_name);
        self
    }

    /// Set the text placed before every failure message
    pub fn message_prefix(mut self, prefix: &str) -> Self {
        self.message_prefix = prefix.to_string();
        self
    }

    /// Disallowed prefix in internal form, e.g. `java/awt/`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Internal name of the exception class
    pub fn exception(&self) -> &str {
        &self.exception_class
    }

    /// Does a reference owned by `owner` (internal name) belong to the disallowed namespace?
    pub fn matches(&self, owner: &str) -> bool {
        !self.prefix.is_empty() && owner.starts_with(&self.prefix)
    }

    pub fn message(&self, kind: AccessKind, member: &MemberRef) -> String {
        format!(
            "{}{} encountered: {}.{}",
            self.message_prefix,
            kind,
            member.owner.replace('/', "."),
            member.name
        )
    }
}
