//! Workflow definitions
//!
//! A [`Workflow`] is a tree of [`Step`]s. Each step runs one [`Action`]: an
//! activity, a suspendable activity, a child workflow, or a parallel
//! collection of either.

mod action;
mod definition;
pub mod ids;
mod options;
mod result;

pub use action::{
    Action, Activity, ActivityFn, Branch, CollectionItem, CollectionRef, FanOutFn,
    ParallelCollection, ReducerFn, SuspendableActivity,
};
pub use definition::{DefinitionError, Step, Workflow};
pub use options::{timeout_to_string, ActivityOptions, NextStepHandler, WorkflowOptions};
pub use result::StepResult;
pub(crate) use result::value_to_text;
