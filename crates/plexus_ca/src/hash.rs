//! A dedicated hash trait for constructing a content address.
//!
//! Unlike `std::hash::Hash`, implementations must be stable across runs
//! and platforms as the resulting addresses are persisted
//! to disk.

use std::collections::BTreeMap;

/// The hasher used to produce content addresses.
pub use blake3::Hasher;

/// Types that can be hashed to produce a content address.
pub trait CaHash {
    /// Hash `self` to produce a stable content address.
    fn hash(&self, hasher: &mut Hasher);
}

macro_rules! impl_ca_hash_be_bytes {
    ($($ty:ty),*) => {
        $(
            impl CaHash for $ty {
                fn hash(&self, hasher: &mut Hasher) {
                    hasher.update(&self.to_be_bytes());
                }
            }
        )*
    };
}

impl_ca_hash_be_bytes!(u8, u16, u32, u64, i8, i16, i32, i64);

// `usize` and `isize` are widened so that addresses match across targets.
impl CaHash for usize {
    fn hash(&self, hasher: &mut Hasher) {
        (*self as u64).hash(hasher);
    }
}

impl CaHash for isize {
    fn hash(&self, hasher: &mut Hasher) {
        (*self as i64).hash(hasher);
    }
}

impl CaHash for bool {
    fn hash(&self, hasher: &mut Hasher) {
        hasher.update(&[*self as u8]);
    }
}

impl<const N: usize> CaHash for [u8; N] {
    fn hash(&self, hasher: &mut Hasher) {
        hasher.update(&self[..]);
    }
}

/// Strings are length-prefixed so that adjacent fields can't be shifted into
/// one another to produce a collision.
impl CaHash for str {
    fn hash(&self, hasher: &mut Hasher) {
        self.len().hash(hasher);
        hasher.update(self.as_bytes());
    }
}

impl CaHash for String {
    fn hash(&self, hasher: &mut Hasher) {
        self.as_str().hash(hasher);
    }
}

impl<T> CaHash for [T]
where
    T: CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        self.len().hash(hasher);
        for t in self {
            t.hash(hasher);
        }
    }
}

impl<T> CaHash for Vec<T>
where
    T: CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        self[..].hash(hasher);
    }
}

impl<K, V> CaHash for BTreeMap<K, V>
where
    K: CaHash,
    V: CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        self.len().hash(hasher);
        for (k, v) in self {
            k.hash(hasher);
            v.hash(hasher);
        }
    }
}

impl<A, B> CaHash for (A, B)
where
    A: CaHash,
    B: CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        self.0.hash(hasher);
        self.1.hash(hasher);
    }
}

impl<T> CaHash for &T
where
    T: ?Sized + CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        (**self).hash(hasher);
    }
}

impl<T> CaHash for Box<T>
where
    T: ?Sized + CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        (**self).hash(hasher);
    }
}

impl<T> CaHash for std::rc::Rc<T>
where
    T: ?Sized + CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        (**self).hash(hasher);
    }
}

impl<T> CaHash for std::sync::Arc<T>
where
    T: ?Sized + CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        (**self).hash(hasher);
    }
}

impl<T> CaHash for Option<T>
where
    T: CaHash,
{
    fn hash(&self, hasher: &mut Hasher) {
        const NONE: u8 = 0;
        const SOME: u8 = 1;
        match self {
            None => {
                hasher.update(&[NONE]);
            }
            Some(t) => {
                hasher.update(&[SOME]);
                t.hash(hasher);
            }
        }
    }
}

impl CaHash for crate::ContentAddr {
    fn hash(&self, hasher: &mut Hasher) {
        self.0.hash(hasher);
    }
}
