//! Step actions: activities, child workflows and parallel collections

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use futures::future::BoxFuture;
use serde_json::Value;

use super::{ActivityOptions, StepResult, Workflow};

/// Activity body: takes the decoded input, returns the step result
pub type ActivityFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<StepResult<Value>>> + Send + Sync>;

/// Fan-out processor: splits a step input into per-branch items
pub type FanOutFn = Arc<dyn Fn(&str) -> anyhow::Result<Vec<CollectionItem>> + Send + Sync>;

/// Fan-in reducer: folds branch outputs (ordered by action number) into one input
pub type ReducerFn = Arc<dyn Fn(Vec<String>) -> anyhow::Result<String> + Send + Sync>;

/// A unit of work executed by an activity worker
#[derive(Clone)]
pub struct Activity {
    pub name: String,
    pub options: ActivityOptions,
    handler: Option<ActivityFn>,
}

impl Activity {
    /// Create an activity with default options and no handler
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: ActivityOptions::default(),
            handler: None,
        }
    }

    /// Set options
    pub fn with_options(mut self, options: ActivityOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the activity body
    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<StepResult<Value>>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |input| Box::pin(handler(input))));
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Run the activity on a raw input and serialize its step result
    ///
    /// Inputs that are not JSON are passed through as a JSON string.
    pub async fn process(&self, input: &str) -> anyhow::Result<String> {
        let handler = self
            .handler
            .as_ref()
            .ok_or_else(|| anyhow!("activity '{}' has no handler", self.name))?;

        let value = if input.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(input).unwrap_or_else(|_| Value::String(input.to_string()))
        };

        let result = handler(value).await?;
        Ok(result.to_json()?)
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Activity that may stay outstanding until a wall-clock deadline
///
/// A failed result means "wait again" rather than "retry".
#[derive(Debug, Clone)]
pub struct SuspendableActivity {
    pub activity: Activity,
    pub waiting_time_seconds: i64,
}

impl SuspendableActivity {
    pub fn new(activity: Activity, waiting_time_seconds: i64) -> Self {
        Self {
            activity,
            waiting_time_seconds,
        }
    }
}

/// One fan-out branch produced by a collection processor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionItem {
    pub input: String,
    pub delay_seconds: i32,
}

impl CollectionItem {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            delay_seconds: 0,
        }
    }

    pub fn with_delay(mut self, delay_seconds: i32) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }
}

/// A fan-out branch bound to its own copy of the collection member
#[derive(Debug, Clone)]
pub struct Branch<T> {
    pub member: T,
    pub input: String,
    pub delay_seconds: i32,
}

/// Parallel collection of one repeated member (activity or child workflow)
#[derive(Clone)]
pub struct ParallelCollection<T> {
    pub member: T,
    processor: FanOutFn,
    reducer: ReducerFn,
}

impl<T: Clone> ParallelCollection<T> {
    pub fn new<P, R>(member: T, processor: P, reducer: R) -> Self
    where
        P: Fn(&str) -> anyhow::Result<Vec<CollectionItem>> + Send + Sync + 'static,
        R: Fn(Vec<String>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self {
            member,
            processor: Arc::new(processor),
            reducer: Arc::new(reducer),
        }
    }

    /// Split the step input into branches, each with a fresh member copy
    pub fn fan_out(&self, input: &str) -> anyhow::Result<Vec<Branch<T>>> {
        let items = (self.processor)(input)?;
        Ok(items
            .into_iter()
            .map(|item| Branch {
                member: self.member.clone(),
                input: item.input,
                delay_seconds: item.delay_seconds,
            })
            .collect())
    }
}

impl<T> ParallelCollection<T> {
    /// Fold branch outputs into the next step's input
    pub fn reduce(&self, outputs: Vec<String>) -> anyhow::Result<String> {
        (self.reducer)(outputs)
    }
}

impl<T: fmt::Debug> fmt::Debug for ParallelCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelCollection")
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

/// What a step does
#[derive(Debug, Clone)]
pub enum Action {
    Activity(Activity),
    Suspendable(SuspendableActivity),
    ChildWorkflow(Box<Workflow>),
    ActivityCollection(ParallelCollection<Activity>),
    WorkflowCollection(ParallelCollection<Box<Workflow>>),
}

/// Borrowed view of a parallel collection, whatever its member kind
#[derive(Debug, Clone, Copy)]
pub enum CollectionRef<'a> {
    Activities(&'a ParallelCollection<Activity>),
    Workflows(&'a ParallelCollection<Box<Workflow>>),
}

impl CollectionRef<'_> {
    pub fn reduce(&self, outputs: Vec<String>) -> anyhow::Result<String> {
        match self {
            Self::Activities(c) => c.reduce(outputs),
            Self::Workflows(c) => c.reduce(outputs),
        }
    }
}

impl Action {
    /// Name used in ids: the activity name or the child workflow name
    pub fn name(&self) -> &str {
        match self {
            Self::Activity(a) => &a.name,
            Self::Suspendable(s) => &s.activity.name,
            Self::ChildWorkflow(w) => &w.options().name,
            Self::ActivityCollection(c) => &c.member.name,
            Self::WorkflowCollection(c) => &c.member.options().name,
        }
    }

    pub fn as_suspendable(&self) -> Option<&SuspendableActivity> {
        match self {
            Self::Suspendable(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_parallel_collection(&self) -> Option<CollectionRef<'_>> {
        match self {
            Self::ActivityCollection(c) => Some(CollectionRef::Activities(c)),
            Self::WorkflowCollection(c) => Some(CollectionRef::Workflows(c)),
            _ => None,
        }
    }

    /// The activity run by this step, if any
    pub fn activity(&self) -> Option<&Activity> {
        match self {
            Self::Activity(a) => Some(a),
            Self::Suspendable(s) => Some(&s.activity),
            Self::ActivityCollection(c) => Some(&c.member),
            _ => None,
        }
    }

    /// The child workflow started by this step, if any
    pub fn child_workflow(&self) -> Option<&Workflow> {
        match self {
            Self::ChildWorkflow(w) => Some(w.as_ref()),
            Self::WorkflowCollection(c) => Some(c.member.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn child_workflow_mut(&mut self) -> Option<&mut Workflow> {
        match self {
            Self::ChildWorkflow(w) => Some(w.as_mut()),
            Self::WorkflowCollection(c) => Some(c.member.as_mut()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowOptions;
    use serde_json::json;

    fn echo() -> Activity {
        Activity::new("echo").with_handler(|input| async move { Ok(StepResult::success(input)) })
    }

    #[tokio::test]
    async fn test_process_wraps_result() {
        let raw = echo().process(r#"{"a":1}"#).await.unwrap();
        let parsed = StepResult::parse(&raw);

        assert!(parsed.success);
        assert_eq!(parsed.return_value, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_process_plain_text_input() {
        let raw = echo().process("hello").await.unwrap();
        assert_eq!(StepResult::parse(&raw).return_value, "hello");
    }

    #[tokio::test]
    async fn test_process_without_handler_fails() {
        let err = Activity::new("bare").process("x").await.unwrap_err();
        assert!(err.to_string().contains("bare"));
    }

    #[test]
    fn test_fan_out_clones_member_per_branch() {
        let collection = ParallelCollection::new(
            echo(),
            |input: &str| {
                let n: usize = input.parse()?;
                Ok((0..n)
                    .map(|i| CollectionItem::new(i.to_string()).with_delay(i as i32))
                    .collect())
            },
            |outputs| Ok(outputs.join(",")),
        );

        let branches = collection.fan_out("3").unwrap();
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[2].input, "2");
        assert_eq!(branches[2].delay_seconds, 2);
        assert_eq!(branches[0].member.name, "echo");

        assert!(collection.fan_out("nope").is_err());
        assert_eq!(
            collection.reduce(vec!["a".into(), "b".into()]).unwrap(),
            "a,b"
        );
    }

    #[test]
    fn test_capability_probes() {
        let plain = Action::Activity(echo());
        let suspend = Action::Suspendable(SuspendableActivity::new(echo(), 100));
        let child = Action::ChildWorkflow(Box::new(Workflow::new(WorkflowOptions::new(
            "child", "tl",
        ))));
        let fan = Action::ActivityCollection(ParallelCollection::new(
            echo(),
            |_: &str| Ok(vec![]),
            |_| Ok(json!(null).to_string()),
        ));

        assert!(plain.as_suspendable().is_none());
        assert_eq!(suspend.as_suspendable().unwrap().waiting_time_seconds, 100);
        assert!(fan.as_parallel_collection().is_some());
        assert!(child.as_parallel_collection().is_none());
        assert_eq!(child.name(), "child");
        assert!(child.child_workflow().is_some());
        assert_eq!(fan.activity().map(|a| a.name.as_str()), Some("echo"));
    }
}
