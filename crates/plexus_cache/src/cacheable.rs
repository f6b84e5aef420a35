//! The contract through which a [`ProcessorCache`](crate::ProcessorCache)
//! reads and writes a processor's data.

use plexus_core::Processor;
use thiserror::Error;

/// A [`Processor`] whose port data and property values can be cached.
///
/// Caching assumes the processor is a pure function of its inputs and
/// properties: the same upstream data and the same configuration must always
/// produce the same outputs.
pub trait Cacheable: Processor {
    /// A stable content hash of the data arriving at the named inport.
    ///
    /// Returns `None` if the inport is disconnected or carries no data.
    fn inport_hash(&self, inport: &str) -> Option<String>;

    /// The serialized data currently held by the named outport.
    ///
    /// Returns `None` if the outport is empty.
    fn outport_data(&self, outport: &str) -> Option<Vec<u8>>;

    /// Replace the data held by the named outport with previously cached
    /// data, or clear it if `data` is `None`.
    fn set_outport_data(&mut self, outport: &str, data: Option<Vec<u8>>)
    -> Result<(), PayloadError>;

    /// The canonical string form of the named property's current value.
    ///
    /// Returns `None` for unknown properties.
    fn property_value(&self, property: &str) -> Option<String>;
}

/// Cached data could not be applied to an outport.
#[derive(Debug, Error)]
#[error("failed to load data into outport `{outport}`: {reason}")]
pub struct PayloadError {
    pub outport: String,
    pub reason: String,
}

impl PayloadError {
    pub fn new(outport: impl Into<String>, reason: impl ToString) -> Self {
        PayloadError {
            outport: outport.into(),
            reason: reason.to_string(),
        }
    }
}
