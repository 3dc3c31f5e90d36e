pub mod connection;

pub use connection::{Connection, NewConnection, PropertyKind, TokenSet};
