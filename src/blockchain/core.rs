// core.rs splits the chain's responsibilities into submodules.
pub mod block;
pub mod chain;
pub mod fork;
pub mod payload;
pub mod serialization;
pub mod validation;

pub use block::*;
pub use chain::*;
pub use fork::*;
pub use payload::*;
pub use serialization::*;
