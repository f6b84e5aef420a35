//! The content-addressing implementation used to fingerprint `plexus`
//! processor state.

#[doc(inline)]
pub use ca::{ContentAddr, ContentAddrShort, ParseAddrError, content_addr};
#[doc(inline)]
pub use hash::{CaHash, Hasher};

mod ca;
mod hash;
