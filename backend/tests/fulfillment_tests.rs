//! Purchase-order fulfillment tests
//!
//! Tests for order status derivation including:
//! - Status thresholds (pending, partial, completed)
//! - Status only moves forward as units are dispatched
//! - Per-item pending units never go negative

use proptest::prelude::*;
use shared::{ItemProgress, OrderStatus, StatusTotals};

fn rank(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::Pending => 0,
        OrderStatus::Partial => 1,
        OrderStatus::Completed => 2,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Nothing dispatched yet
    #[test]
    fn test_pending() {
        assert_eq!(OrderStatus::from_totals(25, 0), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_totals(25, 0).label(), "Pendiente");
    }

    /// Some but not all units dispatched
    #[test]
    fn test_partial() {
        let status = OrderStatus::from_totals(25, 24);
        assert_eq!(status, OrderStatus::Partial);
        assert_eq!(status.as_str(), "partial");
    }

    /// Over-dispatching still counts as completed
    #[test]
    fn test_completed() {
        assert_eq!(OrderStatus::from_totals(25, 25), OrderStatus::Completed);
        assert_eq!(OrderStatus::from_totals(25, 40), OrderStatus::Completed);
        assert_eq!(OrderStatus::Completed.badge(), "success");
    }

    /// Orders with no requested units stay pending
    #[test]
    fn test_empty_order() {
        assert_eq!(OrderStatus::from_totals(0, 0), OrderStatus::Pending);
    }

    /// Status serializes as its snake_case key
    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&OrderStatus::Partial).unwrap();
        assert_eq!(json, "\"partial\"");
    }

    /// Item progress reports what is still owed
    #[test]
    fn test_item_progress() {
        let p = ItemProgress::new(12, 5);
        assert_eq!(p.pending, 7);
        assert!(!p.is_complete());

        let p = ItemProgress::new(12, 15);
        assert_eq!(p.pending, 0);
        assert!(p.is_complete());
    }

    /// Dashboard totals count each order once
    #[test]
    fn test_status_totals() {
        let orders = [(10, 0), (10, 10), (10, 3), (0, 0), (5, 9)];
        let totals: StatusTotals = orders
            .iter()
            .map(|(req, disp)| OrderStatus::from_totals(*req, *disp))
            .collect();
        assert_eq!(totals.pending, 2);
        assert_eq!(totals.partial, 1);
        assert_eq!(totals.completed, 2);
        assert_eq!(totals.total(), orders.len() as u32);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Dispatching more units never moves an order back a status
        #[test]
        fn prop_status_monotonic(
            requested in 1i64..10_000,
            dispatched in 0i64..10_000,
            extra in 0i64..10_000,
        ) {
            let before = OrderStatus::from_totals(requested, dispatched);
            let after = OrderStatus::from_totals(requested, dispatched + extra);
            prop_assert!(rank(after) >= rank(before));
        }

        /// Completed exactly when every requested unit was dispatched
        #[test]
        fn prop_completed_iff_covered(
            requested in 1i64..10_000,
            dispatched in 0i64..20_000,
        ) {
            let status = OrderStatus::from_totals(requested, dispatched);
            prop_assert_eq!(status == OrderStatus::Completed, dispatched >= requested);
        }

        /// Pending plus dispatched covers the request, and pending is never negative
        #[test]
        fn prop_item_pending(
            requested in 0i64..10_000,
            dispatched in 0i64..10_000,
        ) {
            let p = ItemProgress::new(requested, dispatched);
            prop_assert!(p.pending >= 0);
            prop_assert!(p.pending + p.dispatched >= p.requested);
            prop_assert_eq!(p.is_complete(), dispatched >= requested);
        }

        /// Status totals always add up to the number of orders
        #[test]
        fn prop_totals_count_every_order(
            orders in prop::collection::vec((0i64..100, 0i64..100), 0..30),
        ) {
            let totals: StatusTotals = orders
                .iter()
                .map(|(req, disp)| OrderStatus::from_totals(*req, *disp))
                .collect();
            prop_assert_eq!(totals.total() as usize, orders.len());
        }
    }
}
