//! patternview-model: The reactive pattern data model.
//!
//! This crate provides:
//! - **`PatternDataModel`** - current pattern, selection and analysis job
//! - **Subscribers** - weak or owned observers with typed change payloads
//! - **Deferred commands** - mutations requested from inside a notification
//! - **Analysis supervision** - one running job at a time on a rayon pool
//!
#![warn(missing_docs)]

mod config;
mod error;
mod job;
mod message;
mod model;
mod notify;
mod supervisor;

pub use config::ModelConfig;
pub use error::{ModelError, Result};
pub use job::{AnalysisJob, JobId, JobStatus};
pub use message::WorkerMessage;
pub use model::PatternDataModel;
pub use notify::{
    AnalysisEvent, Changes, Deferred, ModelCommand, Notification, Subscriber, SubscriberId,
};
