//! Step tree definition and path addressing

use super::ids::{step_number_of, tree_path_of};
use super::{Action, Activity, WorkflowOptions};

/// Definition errors
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Two steps of one workflow share a key
    #[error("duplicate step key: {0}")]
    DuplicateStepKey(String),

    /// Step keys must not be empty
    #[error("step key must not be empty")]
    EmptyStepKey,
}

/// One step of a workflow
#[derive(Debug, Clone)]
pub struct Step {
    /// Position within the owning workflow, assigned on attach
    pub step_number: i32,
    pub step_key: String,
    /// Tree path of the owning workflow
    pub tree_path: String,
    pub action: Action,
}

/// A workflow definition: options plus an ordered list of steps
///
/// Child workflows are nested definitions; each one knows its tree path, the
/// dot-separated step numbers leading to it from the root (empty for the
/// root). The tree is built once and not modified afterwards.
///
/// # Example
///
/// ```
/// use stepflow_engine::workflow::{Action, Activity, Workflow, WorkflowOptions};
///
/// let workflow = Workflow::new(WorkflowOptions::new("orders", "orders-tl"))
///     .with_step("validate", Action::Activity(Activity::new("validate")))
///     .unwrap()
///     .with_step("charge", Action::Activity(Activity::new("charge")))
///     .unwrap();
///
/// assert_eq!(workflow.find_step("charge").map(|s| s.step_number), Some(1));
/// ```
#[derive(Debug, Clone)]
pub struct Workflow {
    options: WorkflowOptions,
    steps: Vec<Step>,
    tree_path: String,
}

impl Workflow {
    /// Create a workflow without steps
    pub fn new(options: WorkflowOptions) -> Self {
        Self {
            options,
            steps: Vec::new(),
            tree_path: String::new(),
        }
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn tree_path(&self) -> &str {
        &self.tree_path
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Append a step and return its number
    pub fn attach_step(
        &mut self,
        step_key: impl Into<String>,
        mut action: Action,
    ) -> Result<i32, DefinitionError> {
        let step_key = step_key.into();
        if step_key.is_empty() {
            return Err(DefinitionError::EmptyStepKey);
        }
        if self.find_step(&step_key).is_some() {
            return Err(DefinitionError::DuplicateStepKey(step_key));
        }

        let step_number = self.steps.len() as i32;
        if let Some(child) = action.child_workflow_mut() {
            child.set_tree_path(child_path(&self.tree_path, step_number));
        }

        self.steps.push(Step {
            step_number,
            step_key,
            tree_path: self.tree_path.clone(),
            action,
        });
        Ok(step_number)
    }

    /// Builder form of [`attach_step`](Self::attach_step)
    pub fn with_step(
        mut self,
        step_key: impl Into<String>,
        action: Action,
    ) -> Result<Self, DefinitionError> {
        self.attach_step(step_key, action)?;
        Ok(self)
    }

    pub fn get_step(&self, step_number: i32) -> Option<&Step> {
        usize::try_from(step_number)
            .ok()
            .and_then(|index| self.steps.get(index))
    }

    pub fn find_step(&self, step_key: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_key == step_key)
    }

    /// Walk the tree along a dot-separated path of step numbers
    ///
    /// The empty path is this workflow. Every segment must name a step whose
    /// action starts a child workflow.
    pub fn find_workflow(&self, path: &str) -> Option<&Workflow> {
        if path.is_empty() {
            return Some(self);
        }

        let mut current = self;
        for segment in path.split('.') {
            let step_number: i32 = segment.parse().ok()?;
            current = current.get_step(step_number)?.action.child_workflow()?;
        }
        Some(current)
    }

    /// Workflow responsible for decisions of the given execution id
    pub fn get_decider(&self, workflow_id: &str) -> Option<&Workflow> {
        self.find_workflow(tree_path_of(workflow_id))
    }

    /// Activity addressed by an action id
    pub fn find_activity(&self, activity_id: &str) -> Option<&Activity> {
        let workflow = self.find_workflow(tree_path_of(activity_id))?;
        let step_number = step_number_of(activity_id)?;
        workflow.get_step(step_number)?.action.activity()
    }

    fn set_tree_path(&mut self, path: String) {
        for step in &mut self.steps {
            step.tree_path = path.clone();
            if let Some(child) = step.action.child_workflow_mut() {
                child.set_tree_path(child_path(&path, step.step_number));
            }
        }
        self.tree_path = path;
    }
}

fn child_path(parent: &str, step_number: i32) -> String {
    if parent.is_empty() {
        step_number.to_string()
    } else {
        format!("{parent}.{step_number}")
    }
}
