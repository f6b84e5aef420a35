// Tests for storing, restoring and cleaning processor caches.

use plexus_cache::{CacheCleaner, Cacheable, PayloadError, ProcessorCache, RestoreError};
use plexus_core::desc::ProcessorDesc;
use plexus_core::{Conn, PortDesc, Processor, PropertyDesc};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

// A processor whose port data is held in plain maps.
struct Filter {
    desc: ProcessorDesc,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, Option<Vec<u8>>>,
    props: BTreeMap<String, String>,
}

impl Filter {
    fn new(id: &str) -> Self {
        let desc = ProcessorDesc::new(id)
            .with_class("Filter")
            .inport("l")
            .inport("r")
            .outport("out")
            .outport("mask")
            .property("p", "int");
        Filter {
            desc,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            props: BTreeMap::new(),
        }
    }

    fn input(mut self, port: &str, hash: &str) -> Self {
        self.inputs.insert(port.to_string(), hash.to_string());
        self
    }

    fn output(mut self, port: &str, data: Option<Vec<u8>>) -> Self {
        self.outputs.insert(port.to_string(), data);
        self
    }

    fn prop(mut self, id: &str, value: &str) -> Self {
        self.set_prop(id, value);
        self
    }

    fn set_prop(&mut self, id: &str, value: &str) {
        self.props.insert(id.to_string(), value.to_string());
    }

    fn cache(&self, root: &Path) -> ProcessorCache {
        let mut cache = ProcessorCache::new(root, self);
        cache.add_all(self);
        cache
    }
}

impl Processor for Filter {
    fn id(&self) -> &str {
        self.desc.id()
    }
    fn class_name(&self) -> &str {
        self.desc.class_name()
    }
    fn inports(&self) -> Vec<PortDesc> {
        self.desc.inports()
    }
    fn outports(&self) -> Vec<PortDesc> {
        self.desc.outports()
    }
    fn connections(&self, outport: &str) -> Vec<Conn> {
        self.desc.connections(outport)
    }
    fn properties(&self) -> Vec<PropertyDesc> {
        self.desc.properties()
    }
}

impl Cacheable for Filter {
    fn inport_hash(&self, inport: &str) -> Option<String> {
        self.inputs.get(inport).cloned()
    }
    fn outport_data(&self, outport: &str) -> Option<Vec<u8>> {
        self.outputs.get(outport).cloned().flatten()
    }
    fn set_outport_data(&mut self, outport: &str, data: Option<Vec<u8>>) -> Result<(), PayloadError> {
        if !self.desc.outports.iter().any(|p| p.name == outport) {
            return Err(PayloadError::new(outport, "no such outport"));
        }
        self.outputs.insert(outport.to_string(), data);
        Ok(())
    }
    fn property_value(&self, property: &str) -> Option<String> {
        self.props.get(property).cloned()
    }
}

fn filter() -> Filter {
    Filter::new("filter")
        .input("l", "h1")
        .input("r", "h2")
        .output("out", Some(vec![1, 2, 3]))
        .output("mask", None)
        .prop("p", "5")
}

fn reads(dir: &Path) -> String {
    fs::read_to_string(dir.join("lastAccess.count")).unwrap()
}

#[test]
fn test_store_restore_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());

    let dir = cache.store(&f).unwrap();
    assert_eq!(dir, cache.current_cache_dir(&f).unwrap());
    assert!(dir.starts_with(tmp.path().join("filter")));
    assert!(dir.join("out.bin").is_file());
    assert!(dir.join("mask.empty").is_file());
    assert_eq!(reads(&dir), "0");

    f.outputs.insert("out".to_string(), Some(vec![9]));
    f.outputs.insert("mask".to_string(), Some(vec![9]));
    let restored = cache.restore(&mut f).unwrap();
    assert_eq!(restored, dir);
    assert_eq!(f.outputs["out"], Some(vec![1, 2, 3]));
    assert_eq!(f.outputs["mask"], None);
    assert_eq!(reads(&dir), "1");
}

#[test]
fn test_property_change_misses() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());
    cache.store(&f).unwrap();

    f.set_prop("p", "6");
    assert!(matches!(cache.restore(&mut f), Err(RestoreError::NotFound(_))));

    f.set_prop("p", "5");
    assert!(cache.restore(&mut f).is_ok());
}

#[test]
fn test_fingerprint_inputs() {
    let tmp = tempfile::tempdir().unwrap();
    let f = filter();
    let cache = f.cache(tmp.path());
    let fp = cache.fingerprint(&f).unwrap();
    assert_eq!(cache.inport_hashes(&f), "/h1/h2");

    // Registration order does not matter.
    let mut reordered = ProcessorCache::new(tmp.path(), &f);
    reordered.add_inport(&PortDesc::new("r", ""));
    reordered.add_inport(&PortDesc::new("l", ""));
    reordered.add_all_properties(&f);
    assert_eq!(reordered.fingerprint(&f).unwrap(), fp);

    // A disconnected inport changes the fingerprint.
    let mut g = filter();
    g.inputs.remove("r");
    assert_eq!(cache.inport_hashes(&g), "/h1/disconnected");
    assert_ne!(cache.fingerprint(&g).unwrap(), fp);

    // So does the class.
    let mut h = filter();
    h.desc.class = "Other".to_string();
    assert_ne!(cache.fingerprint(&h).unwrap(), fp);
}

#[test]
fn test_interface_drift() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let full = f.cache(tmp.path());
    let mut partial = ProcessorCache::new(tmp.path(), &f);
    partial.add_all_inports(&f);
    partial.add_all_properties(&f);
    partial.add_outport(&PortDesc::new("out", ""));
    assert_eq!(partial.fingerprint(&f).unwrap(), full.fingerprint(&f).unwrap());

    full.store(&f).unwrap();
    assert!(matches!(
        partial.restore(&mut f),
        Err(RestoreError::InterfaceMismatch(_))
    ));

    // Storing under the new interface replaces the stale entry.
    let dir = partial.store(&f).unwrap();
    assert!(!dir.join("mask.empty").exists());
    assert!(partial.restore(&mut f).is_ok());
    assert!(full.restore(&mut f).is_err());
}

#[test]
fn test_failed_restore_leaves_outports() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());
    let dir = cache.store(&f).unwrap();
    fs::remove_file(dir.join("out.bin")).unwrap();

    f.outputs.insert("mask".to_string(), Some(vec![7]));
    let res = cache.restore(&mut f);
    assert!(matches!(res, Err(RestoreError::MissingPayload { .. })));
    assert_eq!(f.outputs["mask"], Some(vec![7]));
    assert_eq!(reads(&dir), "0");
}

#[test]
fn test_failed_outport_reverts_earlier_outports() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());
    let dir = cache.store(&f).unwrap();

    // `out` loads before `mask`, which the processor now rejects.
    f.desc.outports.retain(|p| p.name != "mask");
    f.outputs.insert("out".to_string(), Some(vec![9]));
    let res = cache.restore(&mut f);
    assert!(matches!(res, Err(RestoreError::Payload(e)) if e.outport == "mask"));
    assert_eq!(f.outputs["out"], Some(vec![9]));
    assert_eq!(reads(&dir), "0");
}

#[test]
fn test_registration_order_ignored_on_restore() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let dir = f.cache(tmp.path()).store(&f).unwrap();

    let mut reordered = ProcessorCache::new(tmp.path(), &f);
    for name in ["r", "l"] {
        reordered.add_inport(&PortDesc::new(name, ""));
    }
    for name in ["mask", "out"] {
        reordered.add_outport(&PortDesc::new(name, ""));
    }
    reordered.add_all_properties(&f);
    assert_eq!(reordered.interface(), f.cache(tmp.path()).interface());

    f.outputs.insert("out".to_string(), None);
    assert_eq!(reordered.restore(&mut f).unwrap(), dir);
    assert_eq!(f.outputs["out"], Some(vec![1, 2, 3]));
    assert_eq!(reordered.store(&f).unwrap(), dir);
    assert_eq!(reads(&dir), "1");
}

#[test]
fn test_similar_names_do_not_share_files() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter().output("a b", Some(vec![1])).output("a_b", Some(vec![2]));
    f.desc.outports.push(PortDesc::new("a b", ""));
    f.desc.outports.push(PortDesc::new("a_b", ""));
    let cache = f.cache(tmp.path());
    cache.store(&f).unwrap();

    f.outputs.insert("a b".to_string(), None);
    f.outputs.insert("a_b".to_string(), None);
    cache.restore(&mut f).unwrap();
    assert_eq!(f.outputs["a b"], Some(vec![1]));
    assert_eq!(f.outputs["a_b"], Some(vec![2]));

    // Processor ids that differ only in unsafe characters.
    let mut x = Filter::new("x/y").output("out", Some(vec![3])).output("mask", None);
    let mut y = Filter::new("x_y").output("out", Some(vec![4])).output("mask", None);
    let (cx, cy) = (x.cache(tmp.path()), y.cache(tmp.path()));
    assert_ne!(cx.dir(), cy.dir());
    assert_eq!(cx.dir().parent(), Some(tmp.path()));
    cx.store(&x).unwrap();
    cy.store(&y).unwrap();
    x.outputs.insert("out".to_string(), None);
    y.outputs.insert("out".to_string(), None);
    cx.restore(&mut x).unwrap();
    cy.restore(&mut y).unwrap();
    assert_eq!(x.outputs["out"], Some(vec![3]));
    assert_eq!(y.outputs["out"], Some(vec![4]));
}

#[test]
fn test_altered_property_state_misses() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());
    let dir = cache.store(&f).unwrap();
    let state = fs::read_to_string(dir.join("property.state")).unwrap();
    assert_eq!(state, cache.property_state(&f).unwrap());

    fs::write(dir.join("property.state"), "{\"p\":\"6\"}").unwrap();
    assert!(matches!(
        cache.restore(&mut f),
        Err(RestoreError::StateMismatch(_))
    ));
    assert_eq!(reads(&dir), "0");

    // The next store rewrites the entry.
    assert_eq!(cache.store(&f).unwrap(), dir);
    assert_eq!(fs::read_to_string(dir.join("property.state")).unwrap(), state);
    assert!(cache.restore(&mut f).is_ok());
}

#[test]
fn test_store_keeps_valid_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());
    let dir = cache.store(&f).unwrap();
    cache.restore(&mut f).unwrap();
    assert_eq!(cache.store(&f).unwrap(), dir);
    assert_eq!(reads(&dir), "1");
}

#[test]
fn test_nothing_registered() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = ProcessorCache::new(tmp.path(), &f);
    cache.store(&f).unwrap();
    assert!(cache.restore(&mut f).is_ok());
}

#[test]
fn test_clear_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let mut f = filter();
    let cache = f.cache(tmp.path());
    cache.store(&f).unwrap();
    f.set_prop("p", "6");
    cache.store(&f).unwrap();
    assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 2);

    cache.clear_cache().unwrap();
    assert!(!cache.dir().exists());
    cache.clear_cache().unwrap();
}

// Store an entry of roughly `bytes` bytes and restore it `restores` times.
fn stored(root: &Path, id: &str, bytes: usize, restores: usize) {
    let mut f = Filter::new(id)
        .output("out", Some(vec![0; bytes]))
        .output("mask", None);
    let cache = f.cache(root);
    cache.store(&f).unwrap();
    for _ in 0..restores {
        cache.restore(&mut f).unwrap();
    }
}

#[test]
fn test_limit_cache_evicts_least_read() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    stored(root, "a", 400_000, 2);
    stored(root, "b", 400_000, 1);
    stored(root, "c", 400_000, 0);

    let mut cleaner = CacheCleaner::initialize(root).unwrap();
    assert_eq!(cleaner.entries().len(), 3);
    assert!(cleaner.size() > 1024 * 1024);

    assert_eq!(cleaner.limit_cache(1), 1);
    assert!(cleaner.size() <= 1024 * 1024);
    assert!(!root.join("c").exists());
    assert!(root.join("a").exists() && root.join("b").exists());

    // Already within budget.
    assert_eq!(cleaner.limit_cache(1), 0);

    let before = cleaner.freed();
    assert_eq!(cleaner.limit_cache(0), 2);
    assert_eq!(cleaner.size(), 0);
    assert!(cleaner.freed() > before);
    assert_eq!(cleaner.deleted(), 3);
    assert!(root.exists());
    assert_eq!(fs::read_dir(root).unwrap().count(), 0);
}

// Push the last access of the processor's only entry into the past.
fn backdate(root: &Path, id: &str, by: Duration) {
    let entry = fs::read_dir(root.join(id))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let file = fs::File::options()
        .write(true)
        .open(entry.join("lastAccess.count"))
        .unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

#[test]
fn test_older_entries_evicted_first() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    stored(root, "new", 600_000, 0);
    stored(root, "old", 600_000, 0);
    backdate(root, "old", Duration::from_secs(2 * 60 * 60));

    let mut cleaner = CacheCleaner::initialize(root).unwrap();
    assert_eq!(cleaner.limit_cache(1), 1);
    assert!(!root.join("old").exists());
    assert!(root.join("new").exists());
}

#[test]
fn test_grace_period() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    stored(root, "new", 100, 0);
    stored(root, "old", 100, 0);
    stored(root, "read", 100, 1);
    backdate(root, "old", Duration::from_secs(2 * 60 * 60));
    backdate(root, "read", Duration::from_secs(2 * 60 * 60));

    let mut cleaner = CacheCleaner::initialize(root)
        .unwrap()
        .with_grace(Duration::from_secs(60 * 60));
    assert_eq!(cleaner.delete_unused(), 1);
    assert!(!root.join("old").exists());
    assert!(root.join("new").exists());
    assert!(root.join("read").exists());
    assert_eq!(cleaner.entries().len(), 2);
}
