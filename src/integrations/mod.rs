//! Thin adapters that locate framework-shaped checkpoint files. Actually
//! deserializing tensors is out of scope for a crate with no Python or
//! DeepSpeed runtime; these adapters stop at "here is the file, and it
//! exists."

#[cfg(feature = "pytorch")]
pub mod pytorch;

#[cfg(feature = "deepspeed")]
pub mod deepspeed;
