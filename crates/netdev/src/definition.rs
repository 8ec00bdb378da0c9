//! Boundary to the declarative configuration source.
//!
//! Parsing definition files and evaluating match conditions
//! (host/virtualization/kernel/architecture predicates) happen outside
//! this crate; the manager only consumes the results through these
//! traits. Loading is two-pass: a cheap [`Definition::probe`] discovers
//! the kind and name and settles the match conditions, and only for
//! applicable definitions is the full kind-sized configuration parsed by
//! [`Definition::load`].

use crate::error::{Error, Result};
use crate::kind::{Kind, KindConfig};

/// Enumerates device definitions in discovery order.
///
/// The manager loads them in *reverse* order, so the last definition
/// found for a name takes precedence.
pub trait DefinitionSource {
    fn definitions(&self) -> Result<Vec<Box<dyn Definition>>>;
}

/// One device definition.
pub trait Definition {
    /// Where this definition came from, for diagnostics.
    fn origin(&self) -> &str;

    /// First pass: kind and name discovery plus match-condition
    /// evaluation.
    fn probe(&self) -> Result<Probe>;

    /// Second pass: the full configuration for a known kind.
    fn load(&self, kind: Kind) -> Result<DeviceSettings>;
}

/// Result of the discovery pass.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Whether the definition applies to this host.
    pub matches: bool,
    pub kind: Option<Kind>,
    pub name: Option<String>,
}

/// Fully parsed device settings.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub description: Option<String>,
    pub mac: Option<[u8; 6]>,
    pub mtu: Option<u32>,
    pub config: KindConfig,
}

impl DeviceSettings {
    /// Settings carrying only the kind payload.
    pub fn new(config: KindConfig) -> Self {
        Self {
            description: None,
            mac: None,
            mtu: None,
            config,
        }
    }
}

/// In-memory definition, for embedding and tests.
#[derive(Debug, Clone)]
pub struct MemoryDefinition {
    origin: String,
    matches: bool,
    kind: Option<Kind>,
    name: Option<String>,
    settings: Option<DeviceSettings>,
    fail: Option<String>,
}

impl MemoryDefinition {
    /// A matching definition for `name` with the given settings.
    pub fn new(name: &str, settings: DeviceSettings) -> Self {
        Self {
            origin: format!("memory:{name}"),
            matches: true,
            kind: Some(settings.config.kind()),
            name: Some(name.to_string()),
            settings: Some(settings),
            fail: None,
        }
    }

    /// A definition whose match conditions do not hold on this host.
    pub fn unmatched(mut self) -> Self {
        self.matches = false;
        self
    }

    /// A definition without a kind.
    pub fn kindless(origin: &str, name: &str) -> Self {
        Self {
            origin: origin.to_string(),
            matches: true,
            kind: None,
            name: Some(name.to_string()),
            settings: None,
            fail: None,
        }
    }

    /// A definition without a name.
    pub fn nameless(origin: &str, kind: Kind) -> Self {
        Self {
            origin: origin.to_string(),
            matches: true,
            kind: Some(kind),
            name: None,
            settings: None,
            fail: None,
        }
    }

    /// A definition that fails to parse.
    pub fn broken(origin: &str, reason: &str) -> Self {
        Self {
            origin: origin.to_string(),
            matches: true,
            kind: None,
            name: None,
            settings: None,
            fail: Some(reason.to_string()),
        }
    }
}

impl Definition for MemoryDefinition {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn probe(&self) -> Result<Probe> {
        if let Some(ref reason) = self.fail {
            return Err(Error::InvalidConfig(format!(
                "{}: {reason}",
                self.origin
            )));
        }
        Ok(Probe {
            matches: self.matches,
            kind: self.kind,
            name: self.name.clone(),
        })
    }

    fn load(&self, _kind: Kind) -> Result<DeviceSettings> {
        self.settings.clone().ok_or_else(|| {
            Error::InvalidConfig(format!("{} carries no settings", self.origin))
        })
    }
}

/// [`DefinitionSource`] over a fixed list of in-memory definitions.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    definitions: Vec<MemoryDefinition>,
}

impl MemorySource {
    pub fn new(definitions: Vec<MemoryDefinition>) -> Self {
        Self { definitions }
    }
}

impl DefinitionSource for MemorySource {
    fn definitions(&self) -> Result<Vec<Box<dyn Definition>>> {
        Ok(self
            .definitions
            .iter()
            .cloned()
            .map(|definition| Box::new(definition) as Box<dyn Definition>)
            .collect())
    }
}
