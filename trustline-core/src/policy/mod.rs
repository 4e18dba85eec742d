//! Access policies.
//!
//! A [`Policy`] belongs to one calling application and owns a list of
//! [`Rule`]s. Each rule grants or denies a set of [`Task`]s, where a task
//! names a callee application and optionally one of its tools.

mod evaluator;

pub use evaluator::{first_matching_rule, PolicyEvaluator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a matching rule does with the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    #[default]
    Unspecified,
    Allow,
    Deny,
}

/// One invokable capability: a callee application and optionally one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub app_id: String,
    /// Empty for the whole application
    #[serde(default)]
    pub tool_name: String,
}

impl Task {
    /// A task covering every call to `app_id`.
    pub fn app(app_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            app_id: app_id.into(),
            tool_name: String::new(),
        }
    }

    /// A task covering one tool of `app_id`.
    pub fn tool(app_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Self::app(app_id)
        }
    }

    /// Both the application and the tool name must be equal. An empty tool
    /// name only matches an empty tool name.
    pub fn matches(&self, app_id: &str, tool_name: &str) -> bool {
        self.app_id == app_id && self.tool_name == tool_name
    }
}

/// A set of tasks with a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub policy_id: String,
    pub tasks: Vec<Task>,
    pub action: RuleAction,
    /// Require a human decision on the user's device before the call proceeds
    #[serde(default)]
    pub needs_approval: bool,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Create a rule with no tasks.
    pub fn new(policy_id: impl Into<String>, action: RuleAction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            policy_id: policy_id.into(),
            tasks: Vec::new(),
            action,
            needs_approval: false,
            created_at: Utc::now(),
        }
    }

    /// Add a task.
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Set the step-up flag.
    pub fn with_approval(mut self, needs_approval: bool) -> Self {
        self.needs_approval = needs_approval;
        self
    }

    /// Whether one of the rule's tasks covers the call.
    pub fn can_invoke(&self, app_id: &str, tool_name: &str) -> bool {
        self.tasks.iter().any(|task| task.matches(app_id, tool_name))
    }

    pub fn is_allow(&self) -> bool {
        self.action == RuleAction::Allow
    }
}

/// Ordered rules assigned to one calling application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// The calling application this policy applies to
    pub assigned_to: String,
    pub rules: Vec<Rule>,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    /// Create an empty policy for `assigned_to`.
    pub fn new(name: impl Into<String>, assigned_to: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            assigned_to: assigned_to.into(),
            rules: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a rule, rebinding it to this policy.
    pub fn with_rule(mut self, mut rule: Rule) -> Self {
        rule.policy_id = self.id.clone();
        self.rules.push(rule);
        self
    }
}
