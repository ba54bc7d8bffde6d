//! Order-to-stock allocation for selected SKUs.

use std::collections::BTreeMap;

use crate::core::types::{OrderRecord, RoutingAssignment, SelectedItem, StockUpdate};

/// Routing result for a run: one assignment per selected SKU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPlan {
    pub assignments: BTreeMap<String, RoutingAssignment>,
    /// Orders whose SKU is not part of the selection, in input order.
    pub unrouted_orders: Vec<String>,
}

/// Allocate orders against selected stock, first come first served.
///
/// An order is fulfilled only if the remaining stock covers its full quantity;
/// otherwise it is backordered and later (smaller) orders may still be served.
/// Every selected SKU gets an assignment, even without orders, so the stock
/// sync row is always emitted.
pub fn route_orders(selected: &[SelectedItem], orders: &[OrderRecord]) -> RoutingPlan {
    let mut assignments: BTreeMap<String, RoutingAssignment> = selected
        .iter()
        .map(|item| {
            (
                item.sku.clone(),
                RoutingAssignment {
                    sku: item.sku.clone(),
                    fulfilled_orders: Vec::new(),
                    backordered_orders: Vec::new(),
                    units_allocated: 0,
                    stock_update: StockUpdate::sync(&item.sku, item.stock),
                },
            )
        })
        .collect();
    let mut unrouted_orders = Vec::new();

    for order in orders {
        let Some(assignment) = assignments.get_mut(&order.sku) else {
            unrouted_orders.push(order.order_id.clone());
            continue;
        };
        let remaining = assignment.stock_update.stock_level;
        if order.quantity <= remaining {
            assignment.stock_update.stock_level = remaining - order.quantity;
            assignment.units_allocated += order.quantity;
            assignment.fulfilled_orders.push(order.order_id.clone());
        } else {
            assignment.backordered_orders.push(order.order_id.clone());
        }
    }

    RoutingPlan {
        assignments,
        unrouted_orders,
    }
}
