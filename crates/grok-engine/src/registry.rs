//! Handle-based ownership of machines and documents.
//!
//! [`Registry`] is for callers that cannot hold Rust values directly, such as
//! the C boundary in `grok-ffi`. Rust callers should use [`Machine`] and
//! [`Document`] as plain values instead.

use std::collections::HashMap;

use grok_parser::Machine;

use crate::dom::Document;
use crate::source::Fetcher;
use crate::{search_document, Error};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            /// The sentinel that never refers to a live object.
            pub const INVALID: $name = $name(0);

            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn raw(self) -> u64 {
                self.0
            }

            pub fn is_invalid(self) -> bool {
                self.0 == 0
            }
        }
    };
}

handle!(
    /// Opaque reference to a machine owned by a [`Registry`].
    MachineHandle
);
handle!(
    /// Opaque reference to a document owned by a [`Registry`].
    DocumentHandle
);

/// Owns machines and documents behind opaque handles.
///
/// Handles are never reused, and machines and documents draw from one
/// counter, so a stale or swapped handle is always detected.
#[derive(Debug, Default)]
pub struct Registry {
    machines: HashMap<u64, Machine>,
    documents: HashMap<u64, Document>,
    last_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    pub fn compile_expression(&mut self, expr: &str) -> Result<MachineHandle, Error> {
        let machine = Machine::compile(expr)?;
        let id = self.next_id();
        self.machines.insert(id, machine);
        Ok(MachineHandle(id))
    }

    /// Release a machine. Returns `false` for the sentinel or a handle that
    /// is unknown or already freed.
    pub fn free_machine(&mut self, handle: MachineHandle) -> bool {
        let freed = self.machines.remove(&handle.0).is_some();
        if !freed {
            tracing::debug!(handle = handle.0, "ignoring free of unknown machine handle");
        }
        freed
    }

    pub fn open_document_from_bytes(&mut self, input: &[u8]) -> Result<DocumentHandle, Error> {
        let doc = Document::from_bytes(input)?;
        Ok(self.insert_document(doc))
    }

    pub fn open_document_from_string(&mut self, input: &str) -> Result<DocumentHandle, Error> {
        let doc = Document::from_string(input)?;
        Ok(self.insert_document(doc))
    }

    pub fn open_document_from_uri(&mut self, uri: &str) -> Result<DocumentHandle, Error> {
        let doc = Document::from_uri(uri)?;
        Ok(self.insert_document(doc))
    }

    pub fn open_document_from_uri_with(
        &mut self,
        uri: &str,
        fetcher: &dyn Fetcher,
    ) -> Result<DocumentHandle, Error> {
        let doc = Document::from_uri_with(uri, fetcher)?;
        Ok(self.insert_document(doc))
    }

    fn insert_document(&mut self, doc: Document) -> DocumentHandle {
        let id = self.next_id();
        self.documents.insert(id, doc);
        DocumentHandle(id)
    }

    /// Release a document. Returns `false` for the sentinel or a handle that
    /// is unknown or already freed.
    pub fn free_document(&mut self, handle: DocumentHandle) -> bool {
        let freed = self.documents.remove(&handle.0).is_some();
        if !freed {
            tracing::debug!(handle = handle.0, "ignoring free of unknown document handle");
        }
        freed
    }

    pub fn machine(&self, handle: MachineHandle) -> Option<&Machine> {
        self.machines.get(&handle.0)
    }

    pub fn document(&self, handle: DocumentHandle) -> Option<&Document> {
        self.documents.get(&handle.0)
    }

    /// Search a document with a machine and render the template.
    ///
    /// Both handles stay valid whatever the outcome.
    pub fn search_document(
        &self,
        document: DocumentHandle,
        template: &str,
        machine: MachineHandle,
    ) -> Result<String, Error> {
        let doc = self
            .document(document)
            .ok_or_else(|| Error::Runtime(format!("Invalid document handle {}", document.0)))?;
        let machine = self
            .machine(machine)
            .ok_or_else(|| Error::Runtime(format!("Invalid machine handle {}", machine.0)))?;
        search_document(doc, template, machine)
    }
}
