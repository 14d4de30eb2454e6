//! Build scheduling for the KaaS build service.
//!
//! Runs each build request through fetch, config resolution and image build
//! inside its own workspace. Concurrent requests are isolated by workspace,
//! not by locks; a semaphore only bounds how many builds run at once.

pub mod orchestrator;

pub use orchestrator::{BuildOrchestrator, BuildResult, OrchestratorSettings};
