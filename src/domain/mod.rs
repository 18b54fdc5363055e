//! Domain module - Content trees and the provider that serves them
//!
//! Nothing in here touches the network; the SFTP server adapter in
//! `crate::server` translates protocol requests into provider calls.

pub mod content;
pub mod provider;

pub use content::{Content, ContentNode, ContentTree, HostContentMap};
pub use provider::{
    ContentProvider, Entry, ListEntry, MAX_FILE_LEN, canonical_path, normalize_path,
};
