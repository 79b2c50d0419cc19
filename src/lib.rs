pub mod api;
pub mod config;
pub mod events;
pub mod extractor; // ScriptedRunner is public for tests
pub mod humanize;
pub mod jobs;
pub mod observability;
pub mod storage;
