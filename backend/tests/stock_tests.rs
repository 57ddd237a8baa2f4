//! Stock reconciliation tests
//!
//! Tests for the stock planner including:
//! - Stock never goes negative after any accepted plan
//! - Dispatches clamp to available stock on creation
//! - Batch edits apply the difference between old and new quantities
//! - Deleting references reverts their effect

use proptest::prelude::*;
use shared::stock::{
    merge_stock, plan_batch_edit, plan_dispatch, plan_intake, plan_reference_removal,
    ExistingLine, LineEdit, Movement, StockError, StockLedger,
};

fn ledger(pairs: &[(i64, i32)]) -> StockLedger {
    pairs.iter().copied().collect()
}

fn existing(entry_id: i64, product_id: i64, quantity: i32) -> ExistingLine {
    ExistingLine {
        entry_id,
        product_id,
        quantity,
    }
}

fn keep(entry_id: i64, product_id: i64, quantity: i32) -> LineEdit {
    LineEdit {
        entry_id: Some(entry_id),
        product_id,
        quantity,
    }
}

fn added(product_id: i64, quantity: i32) -> LineEdit {
    LineEdit {
        entry_id: None,
        product_id,
        quantity,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Intake lines for the same product accumulate
    #[test]
    fn test_intake_accumulates() {
        let mut l = ledger(&[(1, 0)]);
        assert_eq!(plan_intake(&mut l, 1, 1, 10).unwrap(), 10);
        assert_eq!(plan_intake(&mut l, 2, 1, 5).unwrap(), 15);
        assert_eq!(l.get(1), Some(15));
    }

    /// Intake of zero or negative units is rejected
    #[test]
    fn test_intake_rejects_non_positive() {
        let mut l = ledger(&[(1, 3)]);
        assert_eq!(
            plan_intake(&mut l, 2, 1, 0),
            Err(StockError::InvalidQuantity { line: 2, quantity: 0 })
        );
        assert_eq!(l.get(1), Some(3));
    }

    /// Dispatch of more than is available sends what there is
    #[test]
    fn test_dispatch_clamps_to_stock() {
        let mut l = ledger(&[(7, 4)]);
        let planned = plan_dispatch(&mut l, 1, 7, 10).unwrap();
        assert_eq!(planned.requested, 10);
        assert_eq!(planned.dispatched, 4);
        assert_eq!(planned.available, 4);
        assert_eq!(planned.shortfall(), Some(6));
        assert_eq!(l.get(7), Some(0));
    }

    /// Dispatch from an empty product records zero units
    #[test]
    fn test_dispatch_from_empty_stock() {
        let mut l = ledger(&[(7, 0)]);
        let planned = plan_dispatch(&mut l, 1, 7, 3).unwrap();
        assert_eq!(planned.dispatched, 0);
        assert_eq!(l.get(7), Some(0));
    }

    /// Products that were not loaded cannot be planned against
    #[test]
    fn test_unknown_product() {
        let mut l = StockLedger::new();
        assert_eq!(
            plan_dispatch(&mut l, 1, 42, 1),
            Err(StockError::UnknownProduct { product_id: 42 })
        );
    }

    /// Lowering an intake line takes the difference back out of stock
    #[test]
    fn test_intake_edit_lowers_stock() {
        // 10 received, 4 already dispatched
        let mut l = ledger(&[(1, 6)]);
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[existing(100, 1, 10)],
            &[keep(100, 1, 8)],
        )
        .unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(l.get(1), Some(4));
    }

    /// Lowering an intake below what was already dispatched fails
    #[test]
    fn test_intake_edit_cannot_go_negative() {
        let mut l = ledger(&[(1, 2)]);
        let result = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[existing(100, 1, 10)],
            &[keep(100, 1, 5)],
        );
        assert!(matches!(
            result,
            Err(StockError::NegativeStock { line: 1, product_id: 1, resulting: -3 })
        ));
    }

    /// Raising a dispatch line needs the extra units in stock
    #[test]
    fn test_dispatch_edit_is_strict() {
        let mut l = ledger(&[(1, 1)]);
        let result = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[existing(5, 1, 3)],
            &[keep(5, 1, 6)],
        );
        assert!(result.is_err());

        let mut l = ledger(&[(1, 3)]);
        let plan = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[existing(5, 1, 3)],
            &[keep(5, 1, 6)],
        )
        .unwrap();
        assert_eq!(plan.stock.len(), 1);
        assert_eq!(plan.stock[0].stock, 0);
    }

    /// Re-pointing a line moves its effect to the new product
    #[test]
    fn test_edit_repoints_product() {
        let mut l = ledger(&[(1, 10), (2, 0)]);
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[existing(100, 1, 4)],
            &[keep(100, 2, 4)],
        )
        .unwrap();
        assert_eq!(l.get(1), Some(6));
        assert_eq!(l.get(2), Some(4));
        assert_eq!(plan.updates[0].product_id, 2);
    }

    /// Re-pointing a dispatch line gives units back to the old product
    /// and charges the new one
    #[test]
    fn test_dispatch_edit_repoints_product() {
        let mut l = ledger(&[(1, 2), (2, 10)]);
        let plan = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[existing(5, 1, 4)],
            &[keep(5, 2, 3)],
        )
        .unwrap();
        assert_eq!(l.get(1), Some(6));
        assert_eq!(l.get(2), Some(7));
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].product_id, 2);
        assert_eq!(plan.updates[0].quantity, 3);
    }

    /// Re-pointing a dispatch line to a product without enough stock fails on that product
    #[test]
    fn test_dispatch_edit_repoint_short_stock() {
        let mut l = ledger(&[(1, 0), (2, 1)]);
        let result = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[existing(5, 1, 4)],
            &[keep(5, 2, 3)],
        );
        assert_eq!(
            result,
            Err(StockError::NegativeStock {
                line: 1,
                product_id: 2,
                resulting: -2,
            })
        );
    }

    /// Lines left out of an edit are deleted and their effect reverted
    #[test]
    fn test_edit_removes_missing_lines() {
        let mut l = ledger(&[(1, 2), (2, 8)]);
        let plan = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[existing(5, 1, 3), existing(6, 2, 1)],
            &[keep(5, 1, 3)],
        )
        .unwrap();
        assert_eq!(plan.deletes, vec![6]);
        assert!(plan.updates.is_empty());
        assert_eq!(l.get(2), Some(9));
        assert_eq!(l.get(1), Some(2));
    }

    /// Dropping an intake line whose units were already shipped fails on that entry
    #[test]
    fn test_edit_removal_cannot_go_negative() {
        let mut l = ledger(&[(1, 2), (2, 5)]);
        let result = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[existing(100, 1, 5), existing(101, 2, 5)],
            &[keep(101, 2, 5)],
        );
        assert_eq!(
            result,
            Err(StockError::RemovalWouldGoNegative {
                entry_id: 100,
                product_id: 1,
                resulting: -3,
            })
        );
    }

    /// An entry id may only be submitted once
    #[test]
    fn test_edit_duplicate_entry() {
        let mut l = ledger(&[(1, 20)]);
        let result = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[existing(100, 1, 4)],
            &[keep(100, 1, 4), keep(100, 1, 5)],
        );
        assert_eq!(
            result,
            Err(StockError::DuplicateEntry { line: 2, entry_id: 100 })
        );
    }

    /// Unchanged submissions produce an empty plan
    #[test]
    fn test_edit_noop() {
        let mut l = ledger(&[(1, 20)]);
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[existing(100, 1, 4)],
            &[keep(100, 1, 4)],
        )
        .unwrap();
        assert!(plan.is_noop());
        assert_eq!(l.get(1), Some(20));
    }

    /// New lines on a dispatch edit report the shortfall
    #[test]
    fn test_dispatch_edit_new_line_insufficient() {
        let mut l = ledger(&[(3, 2)]);
        let result = plan_batch_edit(Movement::Dispatch, &mut l, &[], &[added(3, 5)]);
        assert_eq!(
            result,
            Err(StockError::InsufficientStock {
                line: 1,
                product_id: 3,
                available: 2,
                requested: 5,
            })
        );
    }

    /// Removing intake references fails when the units were already shipped
    #[test]
    fn test_reference_removal() {
        let mut l = ledger(&[(1, 3)]);
        let result = plan_reference_removal(Movement::Intake, &mut l, &[existing(9, 1, 5)]);
        assert!(matches!(
            result,
            Err(StockError::RemovalWouldGoNegative { entry_id: 9, .. })
        ));

        let mut l = ledger(&[(1, 3)]);
        let changes =
            plan_reference_removal(Movement::Dispatch, &mut l, &[existing(9, 1, 5)]).unwrap();
        assert_eq!(changes[0].stock, 8);
    }

    /// Merged stock is the sum of target and sources
    #[test]
    fn test_merge_stock() {
        assert_eq!(merge_stock((1, 5), &[(2, 3), (3, 0)]).unwrap(), 8);
        assert_eq!(
            merge_stock((1, i32::MAX), &[(2, 1)]),
            Err(StockError::Overflow { product_id: 1 })
        );
    }

    /// Line numbers are exposed for error messages
    #[test]
    fn test_error_line() {
        assert_eq!(
            StockError::InvalidQuantity { line: 3, quantity: -1 }.line(),
            Some(3)
        );
        assert_eq!(StockError::UnknownProduct { product_id: 1 }.line(), None);
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

        /// Stock never goes negative after a sequence of dispatches
        #[test]
        fn prop_dispatch_never_negative(
            initial in 0i32..500,
            requests in prop::collection::vec(1i32..200, 1..10),
        ) {
            let mut l = ledger(&[(1, initial)]);
            let mut shipped: i64 = 0;

            for (idx, requested) in requests.iter().enumerate() {
                let planned = plan_dispatch(&mut l, idx + 1, 1, *requested).unwrap();
                prop_assert!(planned.dispatched <= planned.requested);
                prop_assert!(planned.dispatched <= planned.available);
                shipped += i64::from(planned.dispatched);
            }

            let remaining = l.get(1).unwrap();
            prop_assert!(remaining >= 0);
            prop_assert_eq!(i64::from(remaining) + shipped, i64::from(initial));
        }

        /// Editing a line to a new quantity changes stock by the difference
        #[test]
        fn prop_intake_edit_conserves_stock(
            other in 0i32..1000,
            old_qty in 0i32..500,
            new_qty in 0i32..500,
        ) {
            // Stock holds the old intake plus units from elsewhere
            let start = other + old_qty;
            let mut l = ledger(&[(1, start)]);
            let result = plan_batch_edit(
                Movement::Intake,
                &mut l,
                &[existing(1, 1, old_qty)],
                &[keep(1, 1, new_qty)],
            );

            prop_assert!(result.is_ok());
            prop_assert_eq!(l.get(1).unwrap(), other + new_qty);
        }

        /// A dispatch edit either fails on the charged product or leaves
        /// every stock non-negative, whether or not the line changes product
        #[test]
        fn prop_dispatch_edit_non_negative(
            stock_a in 0i32..100,
            stock_b in 0i32..100,
            old_qty in 0i32..100,
            new_qty in 0i32..200,
            repoint in any::<bool>(),
        ) {
            let target = if repoint { 2 } else { 1 };
            let mut l = ledger(&[(1, stock_a), (2, stock_b)]);
            match plan_batch_edit(
                Movement::Dispatch,
                &mut l,
                &[existing(1, 1, old_qty)],
                &[keep(1, target, new_qty)],
            ) {
                Ok(_) => {
                    let a = l.get(1).unwrap();
                    let b = l.get(2).unwrap();
                    prop_assert!(a >= 0 && b >= 0);
                    if repoint {
                        prop_assert_eq!(a, stock_a + old_qty);
                        prop_assert_eq!(b, stock_b - new_qty);
                    } else {
                        prop_assert_eq!(a, stock_a + old_qty - new_qty);
                        prop_assert_eq!(b, stock_b);
                    }
                }
                Err(e) => {
                    let available = if repoint { stock_b } else { stock_a + old_qty };
                    prop_assert!(new_qty > available);
                    let on_target = matches!(
                        e,
                        StockError::NegativeStock { product_id, .. } if product_id == target
                    );
                    prop_assert!(on_target);
                }
            }
        }

        /// Removing every line of a batch restores the original stock
        #[test]
        fn prop_removing_all_lines_reverts(
            base in 0i32..1000,
            quantities in prop::collection::vec(0i32..100, 1..6),
        ) {
            let received: i32 = quantities.iter().sum();
            let mut l = ledger(&[(1, base + received)]);
            let lines: Vec<ExistingLine> = quantities
                .iter()
                .enumerate()
                .map(|(idx, q)| existing(idx as i64 + 1, 1, *q))
                .collect();

            let plan = plan_batch_edit(Movement::Intake, &mut l, &lines, &[]).unwrap();
            prop_assert_eq!(plan.deletes.len(), lines.len());
            prop_assert_eq!(l.get(1).unwrap(), base);
        }
    }
}
