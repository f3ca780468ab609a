//! Application-protocol knowledge.
//!
//! - `classifier`: pure port/payload based labelling of decoded frames
//! - `bacnet`: constants and code tables of the protocol of interest
//!
//! Nothing here performs I/O; decoders and the knowledge base call in.

pub mod bacnet;
pub mod classifier;
