//! Kernel symbol table
//!
//! Maps live kernel ids to demangled display names. Entries are created when a
//! code object registers its kernels and removed when it unloads.

use lumen_shared::KernelId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use symbolic_common::{Language, Name, NameMangling};
use symbolic_demangle::{Demangle, DemangleOptions};
use tracing::debug;

/// Demangle a kernel symbol, returning it unchanged if it is not a valid
/// mangled C++ name
pub fn demangle(mangled: &str) -> String {
    Name::new(mangled, NameMangling::Mangled, Language::Cpp)
        .demangle(DemangleOptions::complete())
        .unwrap_or_else(|| mangled.to_string())
}

/// Kernel id -> display name
#[derive(Debug, Default)]
pub struct KernelSymbolTable {
    names: RwLock<HashMap<KernelId, String>>,
}

impl KernelSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a kernel, demangling its name
    pub fn insert(&self, kernel_id: KernelId, mangled_name: &str) {
        let name = demangle(mangled_name);
        debug!(kernel_id, name = %name, "kernel symbol registered");
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kernel_id, name);
    }

    /// Unregister a kernel, returning its display name
    pub fn remove(&self, kernel_id: KernelId) -> Option<String> {
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kernel_id)
    }

    /// Display name of a live kernel
    pub fn get(&self, kernel_id: KernelId) -> Option<String> {
        self.with_names(|names| names.get(&kernel_id).cloned())
    }

    /// Run `f` with shared access to the whole table. Used to serialize a
    /// batch under one read lock.
    pub fn with_names<R>(&self, f: impl FnOnce(&HashMap<KernelId, String>) -> R) -> R {
        let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
        f(&names)
    }

    pub fn len(&self) -> usize {
        self.with_names(|names| names.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demangle_itanium_name() {
        let name = demangle("_Z10vector_addPfPKfi");
        assert!(name.starts_with("vector_add("), "got {}", name);
    }

    #[test]
    fn test_demangle_failure_keeps_original() {
        assert_eq!(demangle("plain_kernel"), "plain_kernel");
        assert_eq!(demangle(""), "");
    }

    #[test]
    fn test_insert_overwrites_and_remove() {
        let table = KernelSymbolTable::new();
        table.insert(1, "first");
        table.insert(1, "second");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1).as_deref(), Some("second"));

        assert_eq!(table.remove(1).as_deref(), Some("second"));
        assert!(table.is_empty());
        assert_eq!(table.remove(1), None);
    }
}
