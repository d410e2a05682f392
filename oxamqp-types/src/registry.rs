//! Lookup of the described types known to the protocol engine

use std::collections::HashMap;

use oxamqp_codec::Descriptor;

/// Described types the protocol engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownDescriptor {
    /// `amqp:open:list`
    Open,
    /// `amqp:begin:list`
    Begin,
    /// `amqp:attach:list`
    Attach,
    /// `amqp:flow:list`
    Flow,
    /// `amqp:transfer:list`
    Transfer,
    /// `amqp:disposition:list`
    Disposition,
    /// `amqp:detach:list`
    Detach,
    /// `amqp:end:list`
    End,
    /// `amqp:close:list`
    Close,
    /// `amqp:error:list`
    Error,
    /// `amqp:received:list`
    Received,
    /// `amqp:accepted:list`
    Accepted,
    /// `amqp:rejected:list`
    Rejected,
    /// `amqp:released:list`
    Released,
    /// `amqp:modified:list`
    Modified,
    /// `amqp:source:list`
    Source,
    /// `amqp:target:list`
    Target,
}

const TABLE: [(KnownDescriptor, &str, u64); 17] = [
    (KnownDescriptor::Open, "amqp:open:list", 0x10),
    (KnownDescriptor::Begin, "amqp:begin:list", 0x11),
    (KnownDescriptor::Attach, "amqp:attach:list", 0x12),
    (KnownDescriptor::Flow, "amqp:flow:list", 0x13),
    (KnownDescriptor::Transfer, "amqp:transfer:list", 0x14),
    (KnownDescriptor::Disposition, "amqp:disposition:list", 0x15),
    (KnownDescriptor::Detach, "amqp:detach:list", 0x16),
    (KnownDescriptor::End, "amqp:end:list", 0x17),
    (KnownDescriptor::Close, "amqp:close:list", 0x18),
    (KnownDescriptor::Error, "amqp:error:list", 0x1d),
    (KnownDescriptor::Received, "amqp:received:list", 0x23),
    (KnownDescriptor::Accepted, "amqp:accepted:list", 0x24),
    (KnownDescriptor::Rejected, "amqp:rejected:list", 0x25),
    (KnownDescriptor::Released, "amqp:released:list", 0x26),
    (KnownDescriptor::Modified, "amqp:modified:list", 0x27),
    (KnownDescriptor::Source, "amqp:source:list", 0x28),
    (KnownDescriptor::Target, "amqp:target:list", 0x29),
];

impl KnownDescriptor {
    /// Symbolic name
    pub fn name(&self) -> &'static str {
        TABLE[*self as usize].1
    }

    /// Numeric code
    pub fn code(&self) -> u64 {
        TABLE[*self as usize].2
    }

    /// Resolves a descriptor against the fixed AMQP 1.0 table
    pub fn from_descriptor(descriptor: &Descriptor) -> Option<Self> {
        TABLE
            .iter()
            .find(|(_, name, code)| descriptor.matches(name, *code))
            .map(|(known, _, _)| *known)
    }
}

/// Registry resolving descriptors of known described types
///
/// The registry is built once, when a frame codec is created, and is then shared read-only.
/// Aliases map extra symbolic names (e.g. vendor spellings) to known types.
#[derive(Debug, Clone)]
pub struct Registry {
    by_name: HashMap<String, KnownDescriptor>,
    by_code: HashMap<u64, KnownDescriptor>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::amqp()
    }
}

impl Registry {
    /// Registry of the AMQP 1.0 transport and messaging types
    pub fn amqp() -> Self {
        let by_name = TABLE
            .iter()
            .map(|(known, name, _)| (name.to_string(), *known))
            .collect();
        let by_code = TABLE.iter().map(|(known, _, code)| (*code, *known)).collect();
        Self { by_name, by_code }
    }

    /// Registers an additional symbolic name for a known type
    pub fn alias(mut self, name: impl Into<String>, known: KnownDescriptor) -> Self {
        self.by_name.insert(name.into(), known);
        self
    }

    /// Resolves a descriptor
    pub fn resolve(&self, descriptor: &Descriptor) -> Option<KnownDescriptor> {
        match descriptor {
            Descriptor::Name(name) => self.by_name.get(name.as_str()).copied(),
            Descriptor::Code(code) => self.by_code.get(code).copied(),
        }
    }
}
