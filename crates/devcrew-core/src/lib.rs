//! Devcrew Core - automated issue resolution pipeline
//!
//! This crate provides the deterministic pipeline that turns a bug-tracker
//! issue into a verified repository mutation:
//! - Context bundling and requirement extraction
//! - Prompt contracts and the sequential agent runner
//! - Structured, schema-validated, idempotent change application
//! - The seven-gate cascade with bounded, checklist-driven retries
//! - Git branching, committing, patch generation, and board transitions

pub mod allowlist;
pub mod changes;
pub mod config;
pub mod context;
pub mod coverage;
pub mod error;
pub mod forge;
pub mod issue;
pub mod outputs;
pub mod pipeline;
pub mod plan;
pub mod proc;
pub mod processed;
pub mod prompt;
pub mod provider;
pub mod repo;
pub mod requirements;
pub mod vcs;

pub use allowlist::PathAllowlist;
pub use changes::{Applier, ApplyOutcome, Change, FindReplace, RawChange, RawChangeSet};
pub use config::{Config, defaults};
pub use context::{ContextBundle, ContextBundler, ContextManifest, FileEntry};
pub use error::{ApplyError, Error, Result};
pub use forge::{BoardClient, ForgeClient};
pub use issue::{Issue, SubIssueStrategy};
pub use outputs::{ContextAudit, Evidence, ReviewGate};
pub use pipeline::{Gate, Missing, Pipeline, RunReport, RunState, StageOutputs};
pub use plan::ArchitectPlan;
pub use proc::{CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
pub use processed::ProcessedIssues;
pub use prompt::{AgentRole, PromptContext};
pub use provider::{GenAiModel, MockModel, ModelClient, ProviderKind};
pub use repo::{RepoKind, RepoProfile};
pub use requirements::Requirement;
pub use vcs::GitWorkspace;
