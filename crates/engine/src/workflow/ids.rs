//! Identifier construction for scheduled actions and child executions
//!
//! Action ids follow `{tree_path}__{name}._{step}._{action}._{attempt}` so a
//! decision or activity task can be routed back to the exact step instance
//! that produced it.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

/// Separator between the tree path and the rest of an id
pub const PATH_DELIMITER: &str = "__";

/// Platform limit for ids
pub const MAX_ID_LENGTH: usize = 256;

fn id_unsafe() -> &'static Regex {
    static ID_UNSAFE: OnceLock<Regex> = OnceLock::new();
    ID_UNSAFE.get_or_init(|| {
        Regex::new(r"(?i)[\x00-\x1F\x7F-\x9F]|[|()/._:]|arn").expect("static pattern compiles")
    })
}

/// Remove characters the platform rejects in ids
///
/// Strips control characters, `| ( ) / . _ :` and the literal `arn`
/// (case-insensitive).
pub fn trim_for_id(value: &str) -> String {
    id_unsafe().replace_all(value, "").into_owned()
}

/// Truncate to at most `length` characters
pub fn cut_to_length(value: &str, length: usize) -> String {
    value.chars().take(length).collect()
}

/// Id of one scheduled action (activity, timer, child workflow prefix)
pub fn create_action_id(
    name: &str,
    tree_path: &str,
    step_number: i32,
    action_number: i32,
    attempt_number: i32,
) -> String {
    let id = format!(
        "{}{}{}._{}._{}._{}",
        tree_path,
        PATH_DELIMITER,
        trim_for_id(name),
        step_number,
        action_number,
        attempt_number
    );
    cut_to_length(&id, MAX_ID_LENGTH)
}

/// Id of a child workflow execution: the action id plus a random suffix
pub fn create_workflow_id(
    name: &str,
    tree_path: &str,
    step_number: i32,
    action_number: i32,
    attempt_number: i32,
) -> String {
    let id = format!(
        "{}-{}",
        create_action_id(name, tree_path, step_number, action_number, attempt_number),
        trim_for_id(&Uuid::now_v7().to_string())
    );
    cut_to_length(&id, MAX_ID_LENGTH)
}

/// Registered activity version for a step
///
/// `{name}.{version}.{step}` with `.{activity_version}` appended when set.
pub fn create_activity_version(
    step_number: i32,
    name: &str,
    version: &str,
    activity_version: Option<&str>,
) -> String {
    match activity_version.filter(|v| !v.is_empty()) {
        Some(activity_version) => format!("{name}.{version}.{step_number}.{activity_version}"),
        None => format!("{name}.{version}.{step_number}"),
    }
}

/// Tree path encoded in an action or workflow id
///
/// A path is a dotted list of step numbers in front of the delimiter. Ids
/// without one, such as a root id like `order__42`, belong to the root workflow.
pub fn tree_path_of(id: &str) -> &str {
    match id.split_once(PATH_DELIMITER) {
        Some((path, _)) if is_tree_path(path) => path,
        _ => "",
    }
}

fn is_tree_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|n| n.parse::<u32>().is_ok())
}

/// Step number encoded in an action id
pub fn step_number_of(action_id: &str) -> Option<i32> {
    let (_, rest) = action_id.split_once(PATH_DELIMITER)?;
    rest.split("._").nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_for_id() {
        assert_eq!(trim_for_id("Send.Email_(v2)/x|y"), "SendEmailv2xy");
        assert_eq!(trim_for_id("Warning ARN arn"), "Wing  ");
        assert_eq!(trim_for_id("tab\there\u{7f}"), "tabhere");
    }

    #[test]
    fn test_create_action_id() {
        assert_eq!(
            create_action_id("charge.card", "0.1", 2, 0, 1),
            "0.1__chargecard._2._0._1"
        );
        assert_eq!(create_action_id("Notify", "", 0, 3, 0), "__Notify._0._3._0");
    }

    #[test]
    fn test_ids_are_capped() {
        let long_name = "x".repeat(400);
        assert_eq!(create_action_id(&long_name, "", 0, 0, 0).len(), MAX_ID_LENGTH);
        assert_eq!(
            create_workflow_id(&long_name, "", 0, 0, 0).len(),
            MAX_ID_LENGTH
        );
    }

    #[test]
    fn test_workflow_ids_are_unique_and_routable() {
        let a = create_workflow_id("child", "3", 1, 0, 0);
        let b = create_workflow_id("child", "3", 1, 0, 0);

        assert_ne!(a, b);
        assert!(a.starts_with("3__child._1._0._0-"));
        assert_eq!(tree_path_of(&a), "3");
    }

    #[test]
    fn test_activity_version() {
        assert_eq!(create_activity_version(2, "orders", "1.0", None), "orders.1.0.2");
        assert_eq!(
            create_activity_version(2, "orders", "1.0", Some("b")),
            "orders.1.0.2.b"
        );
    }

    #[test]
    fn test_parse_action_id() {
        let id = create_action_id("charge", "0.2", 4, 1, 0);
        assert_eq!(tree_path_of(&id), "0.2");
        assert_eq!(step_number_of(&id), Some(4));
        assert_eq!(tree_path_of("root-workflow-id"), "");
        assert_eq!(step_number_of("root-workflow-id"), None);
    }

    #[test]
    fn test_root_ids_with_delimiter_are_not_paths() {
        assert_eq!(tree_path_of("order__42"), "");
        assert_eq!(tree_path_of("0.x__child._1._0._0-abc"), "");
        assert_eq!(tree_path_of("12.3__child._1._0._0-abc"), "12.3");
    }
}
