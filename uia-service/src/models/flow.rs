//! Auth flows and the flow-satisfaction rule.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::stage::StageType;

/// One acceptable combination of stages, in advertised order.
///
/// On the wire a flow is a bare list of stage identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthFlow {
    pub stages: Vec<StageType>,
}

impl AuthFlow {
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StageType>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    /// True when every stage of this flow has a recorded completion.
    /// Extra completed stages are ignored.
    pub fn satisfied_by(&self, completed: &HashMap<StageType, Value>) -> bool {
        self.stages.iter().all(|stage| completed.contains_key(stage))
    }
}

/// True iff at least one of the declared flows is fully covered by the
/// completed stages. Stateless; callers re-evaluate after every mutation.
pub fn any_flow_satisfied(flows: &[AuthFlow], completed: &HashMap<StageType, Value>) -> bool {
    flows.iter().any(|flow| flow.satisfied_by(completed))
}
