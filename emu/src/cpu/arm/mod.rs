//! The 32-bit ARM instruction path.
//!
//! Fetched words flow through [`cache`] first; on a miss [`decode`] fills
//! a [`decoded::DecodedArm`] record and the cache keeps it until the slot
//! is displaced, invalidated, or the stored raw word stops matching the
//! memory at that PC (the self-modifying-code check). Execution dispatches
//! on the small [`decoded::ArmHandler`] tag in [`execute`]; [`timing`]
//! prices an instruction before it runs.

pub mod cache;
pub mod decode;
pub mod decoded;
pub mod execute;
pub mod timing;
