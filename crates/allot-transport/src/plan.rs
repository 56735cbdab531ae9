use allot_solver::SolutionStatus;
use serde::Serialize;

use crate::problem::Route;

/// Units shipped on one lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flow {
    pub source: String,
    pub sink: String,
    pub amount: i64,
    pub cost: i64,
}

/// A shipping plan. Only lanes carrying a positive amount are listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowPlan {
    pub flows: Vec<Flow>,
    pub total_cost: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportOutcome {
    pub status: SolutionStatus,
    pub plan: Option<FlowPlan>,
}

impl TransportOutcome {
    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }
}

impl FlowPlan {
    pub(crate) fn from_amounts(
        amounts: impl IntoIterator<Item = (Route, i64)>,
        source_names: &[String],
        sink_names: &[String],
    ) -> Self {
        let mut plan = FlowPlan::default();
        for (route, amount) in amounts {
            if amount == 0 {
                continue;
            }
            let cost = route.cost.saturating_mul(amount);
            plan.total_cost = plan.total_cost.saturating_add(cost);
            plan.flows.push(Flow {
                source: source_names[route.source].clone(),
                sink: sink_names[route.sink].clone(),
                amount,
                cost,
            });
        }
        plan
    }

    /// Amount shipped from `source` to `sink`; zero for unused or unknown lanes.
    pub fn flow(&self, source: &str, sink: &str) -> i64 {
        self.flows
            .iter()
            .filter(|f| f.source == source && f.sink == sink)
            .map(|f| f.amount)
            .sum()
    }

    pub fn supplied_by(&self, source: &str) -> i64 {
        self.flows.iter().filter(|f| f.source == source).map(|f| f.amount).sum()
    }

    pub fn received_by(&self, sink: &str) -> i64 {
        self.flows.iter().filter(|f| f.sink == sink).map(|f| f.amount).sum()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
