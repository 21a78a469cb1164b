pub mod matrix;
pub mod provider;
pub mod reference;

pub use provider::{LdError, LdProvider, LdSlice, StaticLd};
pub use reference::PlinkLdReference;
