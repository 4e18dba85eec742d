//! Policy evaluation.

use std::sync::Arc;

use log::debug;

use super::{Policy, Rule};
use crate::app::App;
use crate::error::{Error, Result};
use crate::store::PolicyRepository;

/// Decides whether a caller may invoke a callee (and optionally one tool).
///
/// Evaluation is read-only and deterministic: policies and their rules are
/// visited in ascending `(created_at, id)` order and the first rule that
/// covers the call decides it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trustline_core::app::{App, AppType};
/// use trustline_core::memory::MemoryPolicyRepository;
/// use trustline_core::policy::{Policy, PolicyEvaluator, Rule, RuleAction, Task};
///
/// # tokio_test::block_on(async {
/// let policies = Arc::new(MemoryPolicyRepository::new());
/// policies.insert(
///     Policy::new("a-to-b", "app-a")
///         .with_rule(Rule::new("", RuleAction::Allow).with_task(Task::app("app-b"))),
/// );
///
/// let evaluator = PolicyEvaluator::new(policies);
/// let callee = App::new("app-b", AppType::AgentA2a);
/// let rule = evaluator.evaluate(&callee, "app-a", "").await.unwrap();
/// assert!(!rule.needs_approval);
/// # });
/// ```
#[derive(Clone)]
pub struct PolicyEvaluator {
    policies: Arc<dyn PolicyRepository>,
}

impl PolicyEvaluator {
    pub fn new(policies: Arc<dyn PolicyRepository>) -> Self {
        Self { policies }
    }

    /// Return the rule authorizing `calling_app_id` to call `called_app`.
    ///
    /// Fails with [`Error::ValidationFailed`] when the callee is
    /// tool-addressable and no tool is named, and with
    /// [`Error::Unauthorized`] when no rule matches or the first matching
    /// rule does not allow the call.
    pub async fn evaluate(
        &self,
        called_app: &App,
        calling_app_id: &str,
        tool_name: &str,
    ) -> Result<Rule> {
        if called_app.app_type.is_tool_addressable() && tool_name.is_empty() {
            return Err(Error::ValidationFailed(format!(
                "a tool name is required to call the {} '{}'",
                called_app.app_type, called_app.id
            )));
        }

        let policies = self
            .policies
            .policies_assigned_to(calling_app_id)
            .await
            .map_err(Error::repository("load policies", calling_app_id))?;

        let rule = first_matching_rule(policies, &called_app.id, tool_name).ok_or_else(|| {
            Error::Unauthorized(format!(
                "no policy allows '{}' to call '{}'",
                calling_app_id, called_app.id
            ))
        })?;

        if !rule.is_allow() {
            debug!(
                "Rule {} denies {} -> {} (action {:?})",
                rule.id, calling_app_id, called_app.id, rule.action
            );
            return Err(Error::Unauthorized(format!(
                "a policy denies '{}' to call '{}'",
                calling_app_id, called_app.id
            )));
        }

        debug!(
            "Rule {} allows {} -> {} (needs approval: {})",
            rule.id, calling_app_id, called_app.id, rule.needs_approval
        );
        Ok(rule)
    }
}

/// The first rule covering `(app_id, tool_name)`, visiting policies and
/// rules in ascending `(created_at, id)` order.
pub fn first_matching_rule(mut policies: Vec<Policy>, app_id: &str, tool_name: &str) -> Option<Rule> {
    policies.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

    policies.into_iter().find_map(|mut policy| {
        policy
            .rules
            .sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        policy
            .rules
            .into_iter()
            .find(|rule| rule.can_invoke(app_id, tool_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppType;
    use crate::memory::MemoryPolicyRepository;
    use crate::policy::{RuleAction, Task};
    use chrono::{Duration, Utc};

    fn evaluator_with(policies: Vec<Policy>) -> PolicyEvaluator {
        let repo = MemoryPolicyRepository::new();
        for policy in policies {
            repo.insert(policy);
        }
        PolicyEvaluator::new(Arc::new(repo))
    }

    fn allow(app_id: &str, tool: &str) -> Rule {
        Rule::new("", RuleAction::Allow).with_task(Task::tool(app_id, tool))
    }

    #[tokio::test]
    async fn test_tool_addressable_callee_requires_tool_name() {
        let evaluator = evaluator_with(vec![Policy::new("p", "a").with_rule(allow("mcp", ""))]);
        let callee = App::new("mcp", AppType::McpServer);

        let err = evaluator.evaluate(&callee, "a", "").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_matching_tool_on_mcp_server() {
        let evaluator =
            evaluator_with(vec![Policy::new("p", "a").with_rule(allow("mcp", "tool1"))]);
        let callee = App::new("mcp", AppType::McpServer);

        assert!(evaluator.evaluate(&callee, "a", "tool1").await.is_ok());
        assert!(evaluator
            .evaluate(&callee, "a", "tool2")
            .await
            .unwrap_err()
            .is_unauthorized());
    }

    #[tokio::test]
    async fn test_no_policy_is_unauthorized() {
        let evaluator = evaluator_with(vec![]);
        let callee = App::new("b", AppType::AgentA2a);

        let err = evaluator.evaluate(&callee, "a", "").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_policies_of_other_callers_are_ignored() {
        let evaluator = evaluator_with(vec![Policy::new("p", "x").with_rule(allow("b", ""))]);
        let callee = App::new("b", AppType::AgentA2a);

        assert!(evaluator.evaluate(&callee, "a", "").await.is_err());
    }

    #[tokio::test]
    async fn test_first_match_wins_deny_before_allow() {
        let now = Utc::now();
        let mut deny = Rule::new("", RuleAction::Deny).with_task(Task::app("b"));
        deny.created_at = now - Duration::seconds(10);
        let mut later_allow = allow("b", "");
        later_allow.created_at = now;

        // Insertion order is the reverse of creation order.
        let evaluator =
            evaluator_with(vec![Policy::new("p", "a").with_rule(later_allow).with_rule(deny)]);
        let callee = App::new("b", AppType::AgentA2a);

        let err = evaluator.evaluate(&callee, "a", "").await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_evaluation_is_deterministic() {
        let now = Utc::now();
        let mut first = Policy::new("first", "a").with_rule(allow("b", "").with_approval(true));
        first.created_at = now - Duration::seconds(5);
        let mut second = Policy::new("second", "a").with_rule(allow("b", ""));
        second.created_at = now;
        let evaluator = evaluator_with(vec![second, first.clone()]);
        let callee = App::new("b", AppType::AgentA2a);

        for _ in 0..5 {
            let rule = evaluator.evaluate(&callee, "a", "").await.unwrap();
            assert_eq!(rule.id, first.rules[0].id);
            assert!(rule.needs_approval);
        }
    }

    #[test]
    fn test_ties_on_created_at_break_by_id() {
        let now = Utc::now();
        let mut r1 = allow("b", "");
        r1.id = "2".into();
        r1.created_at = now;
        let mut r2 = allow("b", "");
        r2.id = "1".into();
        r2.created_at = now;
        let policy = Policy::new("p", "a").with_rule(r1).with_rule(r2);

        let rule = first_matching_rule(vec![policy], "b", "").unwrap();
        assert_eq!(rule.id, "1");
    }
}
