//! Storage module - backing files behind the protocol's descriptors.
//!
//! - [`StorageRoot`] maps client URLs to paths under a served directory
//! - [`DescriptorTable`] owns the files a session has open

mod descriptor_table;
mod resolve;

pub use descriptor_table::{
    Access, DescriptorTable, OpenFile, DEFAULT_MAX_DESCRIPTORS, MAX_DESCRIPTORS,
};
pub use resolve::StorageRoot;
