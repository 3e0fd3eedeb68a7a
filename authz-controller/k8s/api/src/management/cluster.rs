use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The cluster this controller runs against, as seen by the management plane.
///
/// The controller only reads and writes its status conditions.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "management.cattle.io",
    version = "v3",
    kind = "Cluster",
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ClusterStatus {
    #[serde(default)]
    pub conditions: Vec<ClusterCondition>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub last_update_time: Option<String>,
}

// === impl Cluster ===

impl Cluster {
    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.status
            .iter()
            .flat_map(|s| s.conditions.iter())
            .any(|c| c.type_ == type_ && c.status == "True")
    }

    /// Marks the condition as true, returning false if it already was.
    pub fn set_condition_true(&mut self, type_: &str, reason: &str, now: String) -> bool {
        if self.is_condition_true(type_) {
            return false;
        }

        let conditions = &mut self.status.get_or_insert_with(Default::default).conditions;
        let condition = ClusterCondition {
            type_: type_.to_string(),
            status: "True".to_string(),
            reason: Some(reason.to_string()),
            last_update_time: Some(now),
        };
        match conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(c) => *c = condition,
            None => conditions.push(condition),
        }
        true
    }
}
