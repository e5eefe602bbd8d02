use super::Classpath;
use crate::config::ScanConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Receives every class that has to stay reflectively accessible
pub trait ReflectionRegistrar {
    /// Register the class with all of its declared constructors, methods and fields
    fn register_class(&mut self, name: &str);
}

/// One element of a `reflect-config.json` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectEntry {
    pub name: String,
    pub all_declared_constructors: bool,
    pub all_declared_methods: bool,
    pub all_declared_fields: bool,
}

impl ReflectEntry {
    pub fn all_declared(name: &str) -> Self {
        Self {
            name: name.to_string(),
            all_declared_constructors: true,
            all_declared_methods: true,
            all_declared_fields: true,
        }
    }
}

/// Registrar that collects a `reflect-config.json` document, sorted by name
#[derive(Debug, Default)]
pub struct ReflectConfig {
    entries: BTreeMap<String, ReflectEntry>,
}

impl ReflectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ReflectEntry> {
        self.entries.values()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let entries: Vec<&ReflectEntry> = self.entries().collect();
        serde_json::to_string_pretty(&entries)
    }
}

impl ReflectionRegistrar for ReflectConfig {
    fn register_class(&mut self, name: &str) {
        self.entries
            .entry(name.to_string())
            .or_insert_with(|| ReflectEntry::all_declared(name));
    }
}

/// Outcome of a registration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub registered: usize,
    /// (class name or classpath root, reason) for everything skipped
    pub failures: Vec<(String, String)>,
}

/// Register every loadable class under the configured packages plus the
/// explicitly named classes.
///
/// Nothing here aborts: a class or root that cannot be read is logged,
/// recorded in the report and skipped.
pub fn register_namespaces(
    classpath: &Classpath,
    config: &ScanConfig,
    registrar: &mut dyn ReflectionRegistrar,
) -> RegistrationReport {
    let mut report = RegistrationReport::default();
    let mut seen = HashSet::new();

    let mut register = |name: String, report: &mut RegistrationReport| {
        if !seen.insert(name.clone()) {
            return;
        }
        match classpath.load(&name) {
            Ok(_) => {
                tracing::info!(class = %name, "Registering class");
                registrar.register_class(&name);
                report.registered += 1;
            }
            Err(e) => {
                tracing::warn!(class = %name, error = %e, "Failed to register class");
                report.failures.push((name, e.to_string()));
            }
        }
    };

    for package in &config.packages {
        tracing::debug!(package = %package, "Scanning package");
        for found in classpath.class_names(package) {
            match found {
                Ok(name) => register(name, &mut report),
                Err(e) => {
                    tracing::warn!(package = %package, error = %e, "Error scanning package");
                    report.failures.push((package.clone(), e.to_string()));
                }
            }
        }
    }

    for class in &config.classes {
        register(class.clone(), &mut report);
    }
    report
}
