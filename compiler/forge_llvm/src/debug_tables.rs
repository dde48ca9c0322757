//! Debug symbol tables for the stack-trace runtime.
//!
//! Files, routines, and types get dense numeric ids in first-use order.
//! Throw sites pass the file id (plus line/column) to the runtime, which
//! resolves it back through tables registered at program start.

use rustc_hash::FxHashMap;

/// One name → id registry.
#[derive(Default, Debug)]
struct IdTable {
    names: Vec<String>,
    ids: FxHashMap<String, u32>,
}

impl IdTable {
    fn id(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }
}

/// File/routine/type registries used by runtime stack traces.
#[derive(Default, Debug)]
pub struct DebugTables {
    files: IdTable,
    routines: IdTable,
    types: IdTable,
}

impl DebugTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dense id for a source file, assigned on first use.
    pub fn file_id(&mut self, name: &str) -> u32 {
        self.files.id(name)
    }

    /// Dense id for a routine, assigned on first use.
    pub fn routine_id(&mut self, name: &str) -> u32 {
        self.routines.id(name)
    }

    /// Dense id for a type, assigned on first use.
    pub fn type_id(&mut self, name: &str) -> u32 {
        self.types.id(name)
    }

    /// Registered file names in id order.
    pub fn files(&self) -> &[String] {
        &self.files.names
    }

    /// Registered routine names in id order.
    pub fn routines(&self) -> &[String] {
        &self.routines.names
    }

    /// Registered type names in id order.
    pub fn types(&self) -> &[String] {
        &self.types.names
    }
}
