use crate::PSP_RESOURCE;
use authz_controller_k8s_api::PolicyRule;
use std::collections::BTreeSet;

/// An ordered union of policy rules.
///
/// Rules keep the order in which they were first contributed; a rule equal to one already in the
/// set is not added again.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet(Vec<PolicyRule>);

// === impl RuleSet ===

impl RuleSet {
    pub fn insert(&mut self, rule: PolicyRule) -> bool {
        if self.0.contains(&rule) {
            return false;
        }
        self.0.push(rule);
        true
    }

    pub fn as_slice(&self) -> &[PolicyRule] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the pod security policies that these rules grant access to.
    pub fn psp_names(&self) -> BTreeSet<String> {
        psp_names(&self.0)
    }
}

impl Extend<PolicyRule> for RuleSet {
    fn extend<T: IntoIterator<Item = PolicyRule>>(&mut self, iter: T) {
        for rule in iter {
            self.insert(rule);
        }
    }
}

impl FromIterator<PolicyRule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = PolicyRule>>(iter: T) -> Self {
        let mut rules = Self::default();
        rules.extend(iter);
        rules
    }
}

/// Collects the resource names of every rule that names the `podsecuritypolicies` resource kind
/// (compared case-insensitively).
pub fn psp_names(rules: &[PolicyRule]) -> BTreeSet<String> {
    rules
        .iter()
        .filter(|rule| {
            rule.resources
                .iter()
                .flatten()
                .any(|r| r.eq_ignore_ascii_case(PSP_RESOURCE))
        })
        .flat_map(|rule| rule.resource_names.iter().flatten().cloned())
        .collect()
}

#[cfg(test)]
pub(crate) fn mk_rule(
    verbs: &[&str],
    groups: &[&str],
    resources: &[&str],
    names: &[&str],
) -> PolicyRule {
    fn strings(s: &[&str]) -> Option<Vec<String>> {
        (!s.is_empty()).then(|| s.iter().map(|s| s.to_string()).collect())
    }
    PolicyRule {
        verbs: verbs.iter().map(|s| s.to_string()).collect(),
        api_groups: strings(groups),
        resources: strings(resources),
        resource_names: strings(names),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn union_preserves_first_occurrence_order() {
        let pods = mk_rule(&["get"], &[""], &["pods"], &[]);
        let deploys = mk_rule(&["get"], &["apps"], &["deployments"], &[]);
        let rules = RuleSet::from_iter(vec![deploys.clone(), pods.clone(), deploys.clone()]);
        assert_eq!(rules.as_slice(), &[deploys, pods]);
    }

    #[test]
    fn finds_psp_names_case_insensitively() {
        let rules = vec![
            mk_rule(&["get"], &[""], &["pods"], &["not-a-psp"]),
            mk_rule(&["use"], &["extensions"], &["podsecuritypolicies"], &["psp-1"]),
            mk_rule(&["use"], &["policy"], &["PodSecurityPolicies"], &["psp-2", "psp-1"]),
            mk_rule(&["use"], &["policy"], &["podsecuritypolicies"], &[]),
        ];
        assert_eq!(
            psp_names(&rules),
            vec!["psp-1".to_string(), "psp-2".to_string()]
                .into_iter()
                .collect::<BTreeSet<_>>()
        );
    }
}
