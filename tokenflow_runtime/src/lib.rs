#![forbid(unsafe_code)]

//! tokenflow runtime
//!
//! Everything around the kernel: snapshot codecs and files, the protobuf
//! wire form, declaration files, a shared read-only catalog, drift
//! reports, and logging setup.
//!
//! No compile logic lives here — declaring, freezing, overlaying and
//! exporting are delegated to the kernel.

pub mod catalog;
pub mod declaration;
pub mod drift;
pub mod logging;
pub mod proto_bridge;
pub mod proto_types;
pub mod snapshot_codec;
