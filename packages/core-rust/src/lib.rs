//! `callguard` core: status codes, call metadata, and call descriptors shared by
//! every pipeline stage and transport adapter.

pub mod descriptor;
pub mod metadata;
pub mod status;

pub use descriptor::CallDescriptor;
pub use metadata::{Metadata, AUTHORIZATION_KEY, TRACE_ID_KEY};
pub use status::{outcome_code, Code, Status};
