// Key placeholders, derivation and substitution
pub mod procedural;
pub mod resolver;
pub mod substitute;

pub use procedural::{Authority, KeyRef, ProceduralKeyDatabase};
pub use resolver::{DevKeyOracle, KeyOracle, KeyPair, KeyResolver};
pub use substitute::KeySubstituter;
