//! Fixed stage order of the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Init,
    Sourcing,
    Listing,
    Pricing,
    Routing,
    Reporting,
    Done,
    Failed,
}

impl Stage {
    /// The successful path, in order.
    pub const ORDER: [Stage; 7] = [
        Stage::Init,
        Stage::Sourcing,
        Stage::Listing,
        Stage::Pricing,
        Stage::Routing,
        Stage::Reporting,
        Stage::Done,
    ];

    /// Next stage in the fixed order. `None` for terminal stages.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Init => Some(Stage::Sourcing),
            Stage::Sourcing => Some(Stage::Listing),
            Stage::Listing => Some(Stage::Pricing),
            Stage::Pricing => Some(Stage::Routing),
            Stage::Routing => Some(Stage::Reporting),
            Stage::Reporting => Some(Stage::Done),
            Stage::Done | Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Stages that run a handler (everything between `Init` and `Done`).
    pub fn has_handler(self) -> bool {
        !matches!(self, Stage::Init | Stage::Done | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Sourcing => "sourcing",
            Stage::Listing => "listing",
            Stage::Pricing => "pricing",
            Stage::Routing => "routing",
            Stage::Reporting => "reporting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    /// Map a manager agent name (`handoff_to_subagents` vocabulary) to a stage.
    ///
    /// Names outside the pipeline (e.g. `qa`) yield `None`.
    pub fn from_agent_name(name: &str) -> Option<Stage> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sourcing" => Some(Stage::Sourcing),
            "listing" => Some(Stage::Listing),
            "pricing" => Some(Stage::Pricing),
            "routing" => Some(Stage::Routing),
            "reporter" | "reporting" => Some(Stage::Reporting),
            _ => None,
        }
    }

    /// File name of the artifact written when this stage passes.
    pub fn artifact_name(self) -> Option<&'static str> {
        match self {
            Stage::Sourcing => Some("selection.json"),
            Stage::Listing => Some("listings.json"),
            Stage::Pricing => Some("pricing.json"),
            Stage::Routing => Some("routing.json"),
            Stage::Reporting => Some("report.md"),
            Stage::Init | Stage::Done | Stage::Failed => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_walks_the_fixed_order() {
        let mut walked = vec![Stage::Init];
        let mut current = Stage::Init;
        while let Some(next) = current.next() {
            walked.push(next);
            current = next;
        }
        assert_eq!(walked, Stage::ORDER.to_vec());
        assert_eq!(Stage::Failed.next(), None);
    }

    #[test]
    fn agent_names_outside_pipeline_are_unknown() {
        assert_eq!(Stage::from_agent_name("Reporter"), Some(Stage::Reporting));
        assert_eq!(Stage::from_agent_name("qa"), None);
    }
}
