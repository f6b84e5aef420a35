//! The contract through which the graph engine observes processors.
//!
//! Processors themselves live outside of this crate. The engine only ever
//! borrows them, reading their identity, ports and connections.

use crate::EdgeKind;
use serde::{Deserialize, Serialize};

/// A unit of computation with typed input/output ports and configurable
/// properties.
pub trait Processor {
    /// An identifier unique within the processor's network and stable
    /// across runs.
    fn id(&self) -> &str;

    /// A stable identifier for the processor's type.
    ///
    /// Two processors of different types must never share a class name.
    fn class_name(&self) -> &str;

    /// Describes each of the processor's inports.
    fn inports(&self) -> Vec<PortDesc>;

    /// Describes each of the processor's outports.
    fn outports(&self) -> Vec<PortDesc>;

    /// The downstream inports connected to the named outport.
    ///
    /// Returns an empty list for unknown or unconnected outports.
    fn connections(&self, outport: &str) -> Vec<Conn>;

    /// Describes each of the processor's configurable properties.
    fn properties(&self) -> Vec<PropertyDesc> {
        vec![]
    }

    /// Whether the processor currently has everything it needs to compute.
    fn is_ready(&self) -> bool {
        true
    }

    /// Called when the processor's output is stale and must be recomputed.
    fn invalidate(&self) {}
}

/// A description of a single port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PortDesc {
    /// The port's name, unique among the ports of its processor.
    pub name: String,
    /// The type of data carried by the port.
    #[serde(default)]
    pub type_tag: String,
    /// The classification applied to connections through this port.
    #[serde(default)]
    pub kind: EdgeKind,
    /// Whether the port's data can be hashed and serialized for caching.
    #[serde(default = "default_caching")]
    pub caching: bool,
}

/// A description of a single property.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PropertyDesc {
    /// The property's id, unique among the properties of its processor.
    pub id: String,
    /// The type of the property's value.
    #[serde(default)]
    pub type_tag: String,
}

/// The downstream end of a connection leaving an outport.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct Conn {
    /// The id of the downstream processor.
    pub processor: String,
    /// The name of the inport on the downstream processor.
    pub inport: String,
}

fn default_caching() -> bool {
    true
}

impl PortDesc {
    /// A standard port with the given name and type.
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        PortDesc {
            name: name.into(),
            type_tag: type_tag.into(),
            kind: EdgeKind::Standard,
            caching: true,
        }
    }

    /// Builder method for specifying the port's classification.
    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Mark the port as unable to take part in caching.
    pub fn without_caching(mut self) -> Self {
        self.caching = false;
        self
    }
}

impl PropertyDesc {
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>) -> Self {
        PropertyDesc {
            id: id.into(),
            type_tag: type_tag.into(),
        }
    }
}

impl Conn {
    pub fn new(processor: impl Into<String>, inport: impl Into<String>) -> Self {
        Conn {
            processor: processor.into(),
            inport: inport.into(),
        }
    }
}

impl<P> Processor for Box<P>
where
    P: ?Sized + Processor,
{
    fn id(&self) -> &str {
        (**self).id()
    }

    fn class_name(&self) -> &str {
        (**self).class_name()
    }

    fn inports(&self) -> Vec<PortDesc> {
        (**self).inports()
    }

    fn outports(&self) -> Vec<PortDesc> {
        (**self).outports()
    }

    fn connections(&self, outport: &str) -> Vec<Conn> {
        (**self).connections(outport)
    }

    fn properties(&self) -> Vec<PropertyDesc> {
        (**self).properties()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn invalidate(&self) {
        (**self).invalidate()
    }
}
