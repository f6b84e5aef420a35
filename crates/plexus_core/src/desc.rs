//! A plain-data [`Processor`] implementation.
//!
//! Useful for describing a network in a RON file in order to inspect its
//! evaluation order without instantiating any real processors, and for
//! constructing networks in tests.

use crate::{
    EdgeKind,
    processor::{Conn, PortDesc, Processor, PropertyDesc},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A processor described entirely by data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessorDesc {
    /// The processor's unique id.
    pub id: String,
    /// The processor's class name.
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub inports: Vec<PortDesc>,
    #[serde(default)]
    pub outports: Vec<PortDesc>,
    #[serde(default)]
    pub properties: Vec<PropertyDesc>,
    /// Connections keyed by the name of the outport they leave from.
    #[serde(default)]
    pub connections: BTreeMap<String, Vec<Conn>>,
    /// Processors that are not ready are skipped by the evaluation driver.
    #[serde(default = "default_ready")]
    pub ready: bool,
}

/// A full network of described processors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkDesc {
    pub processors: Vec<ProcessorDesc>,
}

fn default_ready() -> bool {
    true
}

impl ProcessorDesc {
    /// A processor with no ports whose class name matches its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        ProcessorDesc {
            class: id.clone(),
            id,
            ready: true,
            ..Default::default()
        }
    }

    /// Builder method for specifying the class name.
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    /// Add a standard inport.
    pub fn inport(self, name: impl Into<String>) -> Self {
        self.port_in(PortDesc::new(name, ""))
    }

    /// Add a standard outport.
    pub fn outport(self, name: impl Into<String>) -> Self {
        self.port_out(PortDesc::new(name, ""))
    }

    /// Add a feedback inport.
    pub fn loop_inport(self, name: impl Into<String>) -> Self {
        self.port_in(PortDesc::new(name, "").with_kind(EdgeKind::Loop))
    }

    /// Add a feedback outport.
    pub fn loop_outport(self, name: impl Into<String>) -> Self {
        self.port_out(PortDesc::new(name, "").with_kind(EdgeKind::Loop))
    }

    pub fn port_in(mut self, port: PortDesc) -> Self {
        self.inports.push(port);
        self
    }

    pub fn port_out(mut self, port: PortDesc) -> Self {
        self.outports.push(port);
        self
    }

    pub fn property(mut self, id: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.properties.push(PropertyDesc::new(id, type_tag));
        self
    }

    /// Connect the named outport to the inport of another processor.
    pub fn connect(
        mut self,
        outport: impl Into<String>,
        processor: impl Into<String>,
        inport: impl Into<String>,
    ) -> Self {
        self.connections
            .entry(outport.into())
            .or_default()
            .push(Conn::new(processor, inport));
        self
    }

    /// Builder method for specifying readiness.
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }
}

impl Processor for ProcessorDesc {
    fn id(&self) -> &str {
        &self.id
    }

    fn class_name(&self) -> &str {
        &self.class
    }

    fn inports(&self) -> Vec<PortDesc> {
        self.inports.clone()
    }

    fn outports(&self) -> Vec<PortDesc> {
        self.outports.clone()
    }

    fn connections(&self, outport: &str) -> Vec<Conn> {
        self.connections.get(outport).cloned().unwrap_or_default()
    }

    fn properties(&self) -> Vec<PropertyDesc> {
        self.properties.clone()
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

impl NetworkDesc {
    /// Look up a processor by id.
    pub fn get(&self, id: &str) -> Option<&ProcessorDesc> {
        self.processors.iter().find(|p| p.id == id)
    }
}
