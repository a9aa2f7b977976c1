//! Miscellaneous common structs used throughout the library.

mod base32;
mod cid;
mod id;
pub mod messages;
mod peer;
mod record;

pub use base32::*;
pub use cid::*;
pub use id::*;
pub use messages::*;
pub use peer::*;
pub use record::*;
