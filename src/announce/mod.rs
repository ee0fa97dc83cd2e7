//! MOPS self-reported income announcements.

pub mod client;
pub mod handler;
pub mod number;
pub mod parser;

pub use client::{announce_one, ingest_announcements, AnnouncementSource, IngestReport, MopsClient};
pub use handler::{AnnounceHandler, ProcessedFiling};
