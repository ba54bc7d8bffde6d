//! Routing agent: allocate open orders against selected stock.

use tracing::{info, instrument};

use crate::core::routing::route_orders;
use crate::core::state::{StageOutput, WorkflowState};

#[instrument(skip_all, fields(orders = state.order_records.len()))]
pub fn run(state: &WorkflowState) -> StageOutput {
    let plan = route_orders(&state.selected_items, &state.order_records);
    let fulfilled: usize = plan
        .assignments
        .values()
        .map(|a| a.fulfilled_orders.len())
        .sum();
    info!(
        fulfilled,
        unrouted = plan.unrouted_orders.len(),
        "orders routed"
    );
    StageOutput::Routing {
        assignments: plan.assignments,
        unrouted_orders: plan.unrouted_orders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog, order, selected};

    #[test]
    fn routes_only_selected_skus() {
        let mut state = WorkflowState::new(
            catalog(3, 20),
            vec![order("o1", "SKU001", 5), order("o2", "ZZZ", 1)],
        );
        state.selected_items = selected(&state.catalog_records[..2]);

        let StageOutput::Routing {
            assignments,
            unrouted_orders,
        } = run(&state)
        else {
            panic!("expected routing");
        };
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments["SKU001"].fulfilled_orders, vec!["o1"]);
        assert_eq!(unrouted_orders, vec!["o2"]);
    }
}
