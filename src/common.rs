//! Miscellaneous common structs used throughout the library.

mod cache;
mod finger_table;
mod id;
mod location;
pub mod messages;
mod node;
mod ring;

pub use cache::*;
pub use finger_table::*;
pub use id::*;
pub use location::*;
pub use messages::*;
pub use node::*;
pub use ring::*;
