//! Core Docs++ protocol types.
//!
//! This crate defines the types shared by the name server, the storage
//! servers and clients.
//!
//! ## Protocol types (wire-stable)
//!
//! - Command and status vocabularies (`protocol::Command`, `protocol::Status`)
//! - Fixed-size request and response frames with their checksum
//!   (`protocol::Request`, `protocol::Response`)
//! - The serialized ACL string (`acl::Acl`) and the `.meta` sidecar layout
//!   (`meta::FileMeta`)
//!
//! ## Document helpers (non-wire)
//!
//! - Filename and username validation (`names`)
//! - The sentence/word model used by WRITE sessions (`text::Document`)

pub mod acl;
pub mod meta;
pub mod names;
pub mod protocol;
pub mod text;

pub use acl::{Acl, AclEntry, Permission};
pub use meta::FileMeta;
pub use protocol::{Command, FrameError, Request, Response, Status};
pub use text::Document;
