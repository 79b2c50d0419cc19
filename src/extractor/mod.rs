//! Adapter around the external video extraction tool
//!
//! Every call goes through a [`ToolRunner`] so tests can swap the real
//! process ([`SystemRunner`]) for canned responses ([`ScriptedRunner`]).
//! [`ExtractionClient`] owns the client-identity fallback chain used by
//! both the metadata probe and the media fetch.

mod client;
mod error;
mod invocation;
mod metadata;
mod quality;
mod runner;
mod scripted;

pub use client::ExtractionClient;
pub use error::{AttemptFailure, ExtractError, ExtractionAttempt};
pub use invocation::{ClientIdentity, Purpose, ToolInvocation};
pub use metadata::VideoMetadata;
pub use quality::{QualityHint, QualitySelector};
pub use runner::{InvocationError, SystemRunner, ToolOutput, ToolRunner};
pub use scripted::ScriptedRunner;
