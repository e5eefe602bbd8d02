//! Replacement of disallowed calls and field accesses with forced failures

mod method;
mod rule;


pub use method::{MethodInfo, SiteCounts, rewrite_method};
pub use rule::{AccessKind, RewriteRule, to_internal_name};

use crate::classfile::{ClassFile, ClassFileError, CodeAttribute};

const CODE: &str = "Code";

/// Outcome of rewriting one class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenClass {
    /// Internal name, e.g. `com/example/Main`
    pub class_name: String,
    pub sites: SiteCounts,
    /// New class bytes; `None` when no site matched and the input stands
    pub bytes: Option<Vec<u8>>,
}

/// Does any field or method reference in the pool point into the namespace?
pub fn references_namespace(class: &ClassFile, rule: &RewriteRule) -> bool {
    class.constant_pool.iter().any(|(index, _)| {
        class
            .constant_pool
            .member_ref(index)
            .is_ok_and(|member| rule.matches(&member.owner))
    })
}

/// Rewrite every method of a parsed class in place
pub fn rewrite_class_file(class: &mut ClassFile, rule: &RewriteRule) -> Result<SiteCounts, ClassFileError> {
    let mut total = SiteCounts::default();
    if !references_namespace(class, rule) {
        return Ok(total);
    }

    let class_name = class.name()?;
    let stack_maps = class.uses_stack_maps();
    let pool = &mut class.constant_pool;

    for method in &mut class.methods {
        let Some(code_pos) = method.find_attribute(pool, CODE) else {
            continue;
        };
        let name = pool.utf8(method.name_index)?;
        let descriptor = pool.utf8(method.descriptor_index)?;
        let in_method = |source: ClassFileError| ClassFileError::InMethod {
            method: format!("{name}{descriptor}"),
            source: Box::new(source),
        };

        let mut code = CodeAttribute::parse(&method.attributes[code_pos].info).map_err(in_method)?;
        let info = MethodInfo {
            class_name: &class_name,
            name: &name,
            descriptor: &descriptor,
            is_static: method.is_static(),
            stack_maps,
        };
        let sites = rewrite_method(&mut code, pool, &info, rule).map_err(in_method)?;
        if sites.total() > 0 {
            method.attributes[code_pos].info = code.to_bytes().map_err(in_method)?;
            total.add(sites);
        }
    }
    Ok(total)
}

/// Parse, rewrite and re-encode a class file
pub fn rewrite_class(data: &[u8], rule: &RewriteRule) -> Result<RewrittenClass, ClassFileError> {
    let mut class = ClassFile::parse(data)?;
    let class_name = class.name()?;
    let sites = rewrite_class_file(&mut class, rule)?;
    let bytes = if sites.total() > 0 {
        Some(class.to_bytes()?)
    } else {
        None
    };
    Ok(RewrittenClass {
        class_name,
        sites,
        bytes,
    })
}
