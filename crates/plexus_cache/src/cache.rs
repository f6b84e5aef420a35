//! Per-processor storage and retrieval of outport data keyed by a
//! fingerprint of the processor's inputs and configuration.
//!
//! Each processor owns a directory beneath the shared cache root. Beneath
//! that, each entry lives in a directory named by its fingerprint:
//!
//! ```text
//! <root>/<processor id>/<fingerprint>/
//!     <outport>.bin          serialized outport data
//!     <outport>.empty        marker for an outport that held no data
//!     interface.fingerprint  the registered inports, outports and properties
//!     property.state         the property values the fingerprint covers
//!     lastAccess.count       the number of successful restores
//! ```

use crate::cacheable::{Cacheable, PayloadError};
use plexus_ca::{CaHash, ContentAddr, Hasher, content_addr};
use plexus_core::{PortDesc, Processor, PropertyDesc};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// File names used within each cache entry.
pub(crate) mod key {
    pub const INTERFACE: &str = "interface.fingerprint";
    pub const PROPERTY_STATE: &str = "property.state";
    pub const LAST_ACCESS: &str = "lastAccess.count";
    pub const PAYLOAD_EXT: &str = "bin";
    pub const EMPTY_EXT: &str = "empty";
}

/// Property controlling whether caching is enabled. Never part of a fingerprint.
pub const USE_CACHING: &str = "useCaching";
/// Property triggering removal of the cache. Never part of a fingerprint.
pub const CLEAR_CACHE: &str = "clearCache";

/// Stand-in hash for registered inports without data.
const DISCONNECTED: &str = "disconnected";

/// Caches the outport data of a single processor.
///
/// Inports, outports and properties must be registered before use. Only
/// registered items contribute to the fingerprint and only registered
/// outports are stored and restored.
#[derive(Clone, Debug)]
pub struct ProcessorCache {
    dir: PathBuf,
    inports: Vec<String>,
    outports: Vec<String>,
    properties: Vec<PropertyDesc>,
}

/// Failed to write a cache entry.
///
/// Caching is best-effort, so this is never fatal to evaluation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize property state: {0}")]
    PropertyState(#[from] ron::Error),
    #[error("failed to write cache entry at {path:?}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

/// Failed to restore a cache entry. All variants amount to a cache miss.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("failed to serialize property state: {0}")]
    PropertyState(#[from] ron::Error),
    #[error("no cache entry at {0:?}")]
    NotFound(PathBuf),
    #[error("cache entry at {0:?} was written for a different interface")]
    InterfaceMismatch(PathBuf),
    #[error("cache entry at {0:?} was written for different property values")]
    StateMismatch(PathBuf),
    #[error("cache entry at {path:?} has no data for outport `{outport}`")]
    MissingPayload { path: PathBuf, outport: String },
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("failed to read cache entry at {path:?}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },
}

impl ProcessorCache {
    /// A cache for the given processor beneath the shared cache `root`.
    ///
    /// Nothing is registered initially.
    pub fn new<P>(root: impl AsRef<Path>, processor: &P) -> Self
    where
        P: ?Sized + Processor,
    {
        ProcessorCache {
            dir: root.as_ref().join(sanitize(processor.id())),
            inports: vec![],
            outports: vec![],
            properties: vec![],
        }
    }

    /// The directory holding all of this processor's cache entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register an inport. Returns whether it was registered.
    pub fn add_inport(&mut self, port: &PortDesc) -> bool {
        register_port(&mut self.inports, port)
    }

    /// Register every inport of the processor that supports caching.
    pub fn add_all_inports<P>(&mut self, processor: &P)
    where
        P: ?Sized + Processor,
    {
        for port in processor.inports() {
            self.add_inport(&port);
        }
    }

    /// Register an outport. Returns whether it was registered.
    pub fn add_outport(&mut self, port: &PortDesc) -> bool {
        register_port(&mut self.outports, port)
    }

    /// Register every outport of the processor that supports caching.
    pub fn add_all_outports<P>(&mut self, processor: &P)
    where
        P: ?Sized + Processor,
    {
        for port in processor.outports() {
            self.add_outport(&port);
        }
    }

    /// Register a property whose value contributes to the fingerprint.
    pub fn add_property(&mut self, property: &PropertyDesc) -> bool {
        if self.properties.iter().any(|p| p.id == property.id) {
            return false;
        }
        self.properties.push(property.clone());
        true
    }

    /// Register every property of the processor except the cache controls.
    pub fn add_all_properties<P>(&mut self, processor: &P)
    where
        P: ?Sized + Processor,
    {
        for property in processor.properties() {
            if property.id == USE_CACHING || property.id == CLEAR_CACHE {
                continue;
            }
            self.add_property(&property);
        }
    }

    /// Register every cacheable port and every non-control property.
    pub fn add_all<P>(&mut self, processor: &P)
    where
        P: ?Sized + Processor,
    {
        self.add_all_inports(processor);
        self.add_all_outports(processor);
        self.add_all_properties(processor);
    }

    /// A textual description of everything registered.
    ///
    /// Stored alongside each entry so that entries written for a different
    /// set of ports or properties are never restored. Each section is sorted
    /// by name, so registration order does not matter.
    pub fn interface(&self) -> String {
        let mut inports: Vec<&str> = self.inports.iter().map(String::as_str).collect();
        let mut outports: Vec<&str> = self.outports.iter().map(String::as_str).collect();
        let mut properties: Vec<&PropertyDesc> = self.properties.iter().collect();
        inports.sort_unstable();
        outports.sort_unstable();
        properties.sort_unstable_by(|a, b| a.id.cmp(&b.id));

        let mut s = String::from("Inports:\n");
        for name in inports {
            s.push_str(name);
            s.push('\n');
        }
        s.push_str("\nOutports:\n");
        for name in outports {
            s.push_str(name);
            s.push('\n');
        }
        s.push_str("\nProperties:\n");
        for p in properties {
            s.push_str(&format!("{} [{}]\n", p.id, p.type_tag));
        }
        s
    }

    /// The upstream data hash of every registered inport, in inport name
    /// order, each prefixed by `/`.
    pub fn inport_hashes<P>(&self, processor: &P) -> String
    where
        P: ?Sized + Cacheable,
    {
        let mut names: Vec<&str> = self.inports.iter().map(String::as_str).collect();
        names.sort_unstable();
        let mut s = String::new();
        for name in names {
            let hash = processor
                .inport_hash(name)
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DISCONNECTED.to_string());
            s.push('/');
            s.push_str(&hash);
        }
        s
    }

    /// The canonical serialized form of every registered property's value,
    /// ordered by property id.
    ///
    /// Properties the processor no longer knows about are omitted.
    pub fn property_state<P>(&self, processor: &P) -> Result<String, ron::Error>
    where
        P: ?Sized + Cacheable,
    {
        let state: BTreeMap<&str, String> = self
            .properties
            .iter()
            .filter_map(|p| {
                let value = processor.property_value(&p.id);
                if value.is_none() {
                    log::debug!("property `{}` of `{}` has no value", p.id, processor.id());
                }
                value.map(|v| (p.id.as_str(), v))
            })
            .collect();
        ron::to_string(&state)
    }

    pub fn property_state_hash<P>(&self, processor: &P) -> Result<ContentAddr, ron::Error>
    where
        P: ?Sized + Cacheable,
    {
        Ok(content_addr(&self.property_state(processor)?))
    }

    /// The fingerprint of the processor's current inputs and configuration.
    ///
    /// Covers the processor's class name so that distinct processor types
    /// never share entries.
    pub fn fingerprint<P>(&self, processor: &P) -> Result<ContentAddr, ron::Error>
    where
        P: ?Sized + Cacheable,
    {
        let mut hasher = Hasher::new();
        processor.class_name().hash(&mut hasher);
        self.inport_hashes(processor).hash(&mut hasher);
        self.property_state_hash(processor)?.hash(&mut hasher);
        Ok(ContentAddr::from(hasher.finalize()))
    }

    /// The entry directory matching the processor's current fingerprint,
    /// whether or not it exists.
    pub fn current_cache_dir<P>(&self, processor: &P) -> Result<PathBuf, ron::Error>
    where
        P: ?Sized + Cacheable,
    {
        let ca = self.fingerprint(processor)?;
        Ok(self.entry_dir(&ca))
    }

    fn entry_dir(&self, ca: &ContentAddr) -> PathBuf {
        self.dir.join(ca.to_hex())
    }

    /// Store the processor's registered outports under its current
    /// fingerprint, returning the entry directory.
    ///
    /// The entry is written to a temporary directory and renamed into place
    /// so that an interrupted store never leaves a restorable entry behind.
    /// An existing valid entry for the same fingerprint is left untouched.
    pub fn store<P>(&self, processor: &P) -> Result<PathBuf, StoreError>
    where
        P: ?Sized + Cacheable,
    {
        let ca = self.fingerprint(processor)?;
        let dir = self.entry_dir(&ca);
        let interface = self.interface();
        let state = self.property_state(processor)?;
        if is_valid_entry(&dir, &interface, &state) {
            log::debug!("cache entry {} for `{}` exists", ca.short(), processor.id());
            return Ok(dir);
        }

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", ca.to_hex(), std::process::id()));
        let result = self
            .write_entry(processor, &tmp, &interface, &state)
            .and_then(|()| replace_dir(&tmp, &dir));
        match result {
            Ok(()) => {
                log::debug!("stored cache entry {} for `{}`", ca.short(), processor.id());
                Ok(dir)
            }
            Err(e) => {
                log::warn!("failed to store cache for `{}`: {e}", processor.id());
                if tmp.exists() {
                    if let Err(e) = fs::remove_dir_all(&tmp) {
                        log::warn!("failed to remove {tmp:?}: {e}");
                    }
                }
                Err(e)
            }
        }
    }

    fn write_entry<P>(
        &self,
        processor: &P,
        tmp: &Path,
        interface: &str,
        state: &str,
    ) -> Result<(), StoreError>
    where
        P: ?Sized + Cacheable,
    {
        if tmp.exists() {
            fs::remove_dir_all(tmp).map_err(store_io(tmp))?;
        }
        fs::create_dir_all(tmp).map_err(store_io(tmp))?;
        for outport in &self.outports {
            let (path, data) = match processor.outport_data(outport) {
                Some(data) => (payload_path(tmp, outport), data),
                None => (empty_path(tmp, outport), vec![]),
            };
            fs::write(&path, data).map_err(store_io(&path))?;
        }
        let entries = [
            (key::INTERFACE, interface),
            (key::PROPERTY_STATE, state),
            (key::LAST_ACCESS, "0"),
        ];
        for (name, contents) in entries {
            let path = tmp.join(name);
            fs::write(&path, contents).map_err(store_io(&path))?;
        }
        Ok(())
    }

    /// Load the registered outports from the entry matching the processor's
    /// current fingerprint, returning the entry directory.
    ///
    /// Either every registered outport is loaded or none is. Outports already
    /// loaded are reverted if a later one fails. On success the entry's
    /// access count is incremented.
    pub fn restore<P>(&self, processor: &mut P) -> Result<PathBuf, RestoreError>
    where
        P: ?Sized + Cacheable,
    {
        let dir = self.current_cache_dir(&*processor)?;
        if !dir.is_dir() {
            return Err(RestoreError::NotFound(dir));
        }
        let path = dir.join(key::INTERFACE);
        let stored = fs::read_to_string(&path).map_err(restore_io(&path))?;
        if stored != self.interface() {
            return Err(RestoreError::InterfaceMismatch(dir));
        }
        let path = dir.join(key::PROPERTY_STATE);
        let stored = fs::read_to_string(&path).map_err(restore_io(&path))?;
        if stored != self.property_state(&*processor)? {
            return Err(RestoreError::StateMismatch(dir));
        }

        let mut payloads = Vec::with_capacity(self.outports.len());
        for outport in &self.outports {
            if empty_path(&dir, outport).is_file() {
                payloads.push((outport, None));
                continue;
            }
            let path = payload_path(&dir, outport);
            match fs::read(&path) {
                Ok(data) => payloads.push((outport, Some(data))),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(RestoreError::MissingPayload {
                        path: dir,
                        outport: outport.clone(),
                    });
                }
                Err(err) => return Err(RestoreError::Io { path, err }),
            }
        }
        let previous: Vec<(&String, Option<Vec<u8>>)> = self
            .outports
            .iter()
            .map(|o| (o, processor.outport_data(o)))
            .collect();
        for (outport, data) in payloads {
            if let Err(e) = processor.set_outport_data(outport, data) {
                for (o, data) in previous {
                    if let Err(e) = processor.set_outport_data(o, data) {
                        let id = processor.id();
                        log::warn!("failed to revert outport `{o}` of `{id}`: {e}");
                    }
                }
                return Err(e.into());
            }
        }

        match bump_last_access(&dir) {
            Ok(n) => log::debug!("restored cache for `{}` ({n} reads)", processor.id()),
            Err(e) => log::warn!("failed to update access count in {dir:?}: {e}"),
        }
        Ok(dir)
    }

    /// Delete every entry ever stored for this processor.
    pub fn clear_cache(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                log::info!("cleared cache at {:?}", self.dir);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Encode a name as a single path component.
///
/// Bytes outside `[A-Za-z0-9._-]` are written as `%XX`, as is a leading `.`.
/// Distinct names always yield distinct components. The empty name becomes
/// `%`, which no other name produces.
pub fn sanitize(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }
    let mut s = String::with_capacity(name.len());
    for (ix, b) in name.bytes().enumerate() {
        match b {
            b'.' if ix == 0 => s.push_str("%2E"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => s.push(b as char),
            _ => s.push_str(&format!("%{b:02X}")),
        }
    }
    s
}

fn register_port(ports: &mut Vec<String>, port: &PortDesc) -> bool {
    if !port.caching {
        log::warn!("port `{}` does not support caching", port.name);
        return false;
    }
    if ports.contains(&port.name) {
        return false;
    }
    ports.push(port.name.clone());
    true
}

fn payload_path(dir: &Path, port: &str) -> PathBuf {
    dir.join(format!("{}.{}", sanitize(port), key::PAYLOAD_EXT))
}

fn empty_path(dir: &Path, port: &str) -> PathBuf {
    dir.join(format!("{}.{}", sanitize(port), key::EMPTY_EXT))
}

fn is_valid_entry(dir: &Path, interface: &str, state: &str) -> bool {
    dir.join(key::LAST_ACCESS).is_file()
        && fs::read_to_string(dir.join(key::INTERFACE)).is_ok_and(|s| s == interface)
        && fs::read_to_string(dir.join(key::PROPERTY_STATE)).is_ok_and(|s| s == state)
}

fn replace_dir(tmp: &Path, dir: &Path) -> Result<(), StoreError> {
    if dir.exists() {
        log::debug!("replacing stale cache entry {dir:?}");
        fs::remove_dir_all(dir).map_err(store_io(dir))?;
    }
    fs::rename(tmp, dir).map_err(store_io(dir))
}

/// Read the number of successful restores recorded in the entry.
pub(crate) fn read_last_access(dir: &Path) -> u64 {
    fs::read_to_string(dir.join(key::LAST_ACCESS))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

fn bump_last_access(dir: &Path) -> io::Result<u64> {
    let n = read_last_access(dir) + 1;
    fs::write(dir.join(key::LAST_ACCESS), n.to_string())?;
    Ok(n)
}

fn store_io(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |err| StoreError::Io {
        path: path.to_path_buf(),
        err,
    }
}

fn restore_io(path: &Path) -> impl FnOnce(io::Error) -> RestoreError + '_ {
    move |err| RestoreError::Io {
        path: path.to_path_buf(),
        err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::desc::ProcessorDesc;

    #[test]
    fn sanitize_path_components() {
        assert_eq!(sanitize("volume.out"), "volume.out");
        assert_eq!(sanitize("a/b c"), "a%2Fb%20c");
        assert_eq!(sanitize("../up"), "%2E.%2Fup");
        assert_eq!(sanitize("50%"), "50%25");
        assert_eq!(sanitize("é"), "%C3%A9");
        assert_eq!(sanitize(""), "%");
        assert_ne!(sanitize("a b"), sanitize("a_b"));
        assert_ne!(sanitize(".x"), sanitize("%2Ex"));
    }

    #[test]
    fn registration_skips_non_caching_and_controls() {
        let desc = ProcessorDesc::new("p")
            .port_in(PortDesc::new("a", "f32"))
            .port_in(PortDesc::new("b", "f32").without_caching())
            .property("threshold", "float")
            .property(USE_CACHING, "bool")
            .property(CLEAR_CACHE, "button");
        let mut cache = ProcessorCache::new("/tmp/root", &desc);
        cache.add_all(&desc);
        assert!(!cache.add_inport(&PortDesc::new("a", "f32")));
        assert_eq!(
            cache.interface(),
            "Inports:\na\n\nOutports:\n\nProperties:\nthreshold [float]\n"
        );
        cache.add_inport(&PortDesc::new("0", "f32"));
        cache.add_property(&PropertyDesc::new("gain", "float"));
        assert_eq!(
            cache.interface(),
            "Inports:\n0\na\n\nOutports:\n\nProperties:\ngain [float]\nthreshold [float]\n"
        );
        assert_eq!(cache.dir(), Path::new("/tmp/root/p"));
    }
}
