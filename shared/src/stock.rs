//! Stock reconciliation planning
//!
//! Every change to a product's stock is computed here before anything is
//! written. Services seed a [`StockLedger`] from the locked product rows,
//! ask for a plan and persist it verbatim. Lines are processed in the order
//! they were submitted and the non-negative rule is checked after each step,
//! so a plan either applies completely or not at all.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProductId = i64;
pub type EntryId = i64;

/// Direction of a batch's effect on stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    /// Ingreso: adds units
    Intake,
    /// Despacho: removes units
    Dispatch,
}

impl Movement {
    /// Signed effect of `quantity` units of this movement on stock
    pub fn effect(self, quantity: i32) -> i64 {
        match self {
            Movement::Intake => i64::from(quantity),
            Movement::Dispatch => -i64::from(quantity),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::Intake => "intake",
            Movement::Dispatch => "dispatch",
        }
    }
}

/// Errors raised while planning a stock change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("line {line}: quantity {quantity} is not valid")]
    InvalidQuantity { line: usize, quantity: i32 },

    #[error("line {line}: entry {entry_id} appears more than once")]
    DuplicateEntry { line: usize, entry_id: EntryId },

    #[error("line {line}: stock of product {product_id} would become {resulting}")]
    NegativeStock {
        line: usize,
        product_id: ProductId,
        resulting: i64,
    },

    #[error("line {line}: only {available} units of product {product_id} available, {requested} requested")]
    InsufficientStock {
        line: usize,
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    #[error("removing entry {entry_id} would leave product {product_id} at {resulting}")]
    RemovalWouldGoNegative {
        entry_id: EntryId,
        product_id: ProductId,
        resulting: i64,
    },

    #[error("product {product_id} was not loaded")]
    UnknownProduct { product_id: ProductId },

    #[error("stock of product {product_id} exceeds the supported range")]
    Overflow { product_id: ProductId },
}

impl StockError {
    /// 1-based line number the error refers to, when it refers to one
    pub fn line(&self) -> Option<usize> {
        match self {
            StockError::InvalidQuantity { line, .. }
            | StockError::DuplicateEntry { line, .. }
            | StockError::NegativeStock { line, .. }
            | StockError::InsufficientStock { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Final stock of a product touched by a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub stock: i32,
}

/// Running stock per product, seeded from the database
#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    stock: BTreeMap<ProductId, i64>,
    touched: BTreeSet<ProductId>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed (or reset) the stock of a product
    pub fn insert(&mut self, product_id: ProductId, stock: i32) {
        self.stock.insert(product_id, i64::from(stock));
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.stock.contains_key(&product_id)
    }

    pub fn get(&self, product_id: ProductId) -> Option<i32> {
        self.stock
            .get(&product_id)
            .and_then(|s| i32::try_from(*s).ok())
    }

    fn current(&self, product_id: ProductId) -> Result<i64, StockError> {
        self.stock
            .get(&product_id)
            .copied()
            .ok_or(StockError::UnknownProduct { product_id })
    }

    /// Apply a delta, rejecting negative or out-of-range results.
    /// Returns the resulting stock, or the would-be value on rejection.
    fn apply(&mut self, product_id: ProductId, delta: i64) -> Result<Result<i64, i64>, StockError> {
        let next = self.current(product_id)? + delta;
        if next < 0 {
            return Ok(Err(next));
        }
        if next > i64::from(i32::MAX) {
            return Err(StockError::Overflow { product_id });
        }
        self.stock.insert(product_id, next);
        self.touched.insert(product_id);
        Ok(Ok(next))
    }

    fn apply_on_line(
        &mut self,
        line: usize,
        product_id: ProductId,
        delta: i64,
    ) -> Result<i64, StockError> {
        self.apply(product_id, delta)?
            .map_err(|resulting| StockError::NegativeStock {
                line,
                product_id,
                resulting,
            })
    }

    /// Final stock of every product changed so far, ordered by id
    pub fn changes(&self) -> Vec<StockChange> {
        self.touched
            .iter()
            .filter_map(|id| {
                self.get(*id).map(|stock| StockChange {
                    product_id: *id,
                    stock,
                })
            })
            .collect()
    }
}

impl FromIterator<(ProductId, i32)> for StockLedger {
    fn from_iter<I: IntoIterator<Item = (ProductId, i32)>>(iter: I) -> Self {
        let mut ledger = StockLedger::new();
        for (id, stock) in iter {
            ledger.insert(id, stock);
        }
        ledger
    }
}

/// Add `quantity` units of a new intake line. Returns the new stock.
pub fn plan_intake(
    ledger: &mut StockLedger,
    line: usize,
    product_id: ProductId,
    quantity: i32,
) -> Result<i32, StockError> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity { line, quantity });
    }
    let next = ledger.apply_on_line(line, product_id, Movement::Intake.effect(quantity))?;
    Ok(next as i32)
}

/// Outcome of a dispatch line on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchLine {
    pub product_id: ProductId,
    pub requested: i32,
    pub dispatched: i32,
    pub available: i32,
}

impl DispatchLine {
    /// Units that could not be dispatched
    pub fn shortfall(&self) -> Option<i32> {
        (self.dispatched < self.requested).then(|| self.requested - self.dispatched)
    }
}

/// Dispatch up to `requested` units, clamping to what is in stock
pub fn plan_dispatch(
    ledger: &mut StockLedger,
    line: usize,
    product_id: ProductId,
    requested: i32,
) -> Result<DispatchLine, StockError> {
    if requested <= 0 {
        return Err(StockError::InvalidQuantity {
            line,
            quantity: requested,
        });
    }
    let available = ledger.current(product_id)?;
    let dispatched = available.min(i64::from(requested));
    ledger.apply_on_line(line, product_id, -dispatched)?;

    Ok(DispatchLine {
        product_id,
        requested,
        dispatched: dispatched as i32,
        available: available as i32,
    })
}

/// A persisted entry of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingLine {
    pub entry_id: EntryId,
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A line submitted when editing a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEdit {
    pub entry_id: Option<EntryId>,
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Entry row to rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryUpdate {
    pub entry_id: EntryId,
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Entry row to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewEntry {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Everything a batch edit writes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditPlan {
    pub updates: Vec<EntryUpdate>,
    pub inserts: Vec<NewEntry>,
    pub deletes: Vec<EntryId>,
    pub stock: Vec<StockChange>,
}

impl EditPlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Reconcile a batch edit against the current stock.
///
/// Lines carrying an `entry_id` of this batch rewrite that entry; any other
/// line creates a new entry; existing entries left out are removed. New
/// dispatch lines must be fully covered by stock.
pub fn plan_batch_edit(
    movement: Movement,
    ledger: &mut StockLedger,
    existing: &[ExistingLine],
    incoming: &[LineEdit],
) -> Result<EditPlan, StockError> {
    let by_id: HashMap<EntryId, &ExistingLine> =
        existing.iter().map(|e| (e.entry_id, e)).collect();
    let mut seen: HashSet<EntryId> = HashSet::new();
    let mut plan = EditPlan::default();

    for (idx, edit) in incoming.iter().enumerate() {
        let line = idx + 1;
        if edit.quantity < 0 {
            return Err(StockError::InvalidQuantity {
                line,
                quantity: edit.quantity,
            });
        }

        match edit.entry_id.and_then(|id| by_id.get(&id)) {
            Some(old) => {
                if !seen.insert(old.entry_id) {
                    return Err(StockError::DuplicateEntry {
                        line,
                        entry_id: old.entry_id,
                    });
                }

                if old.product_id == edit.product_id {
                    let delta = movement.effect(edit.quantity) - movement.effect(old.quantity);
                    ledger.apply_on_line(line, edit.product_id, delta)?;
                } else {
                    ledger.apply_on_line(line, old.product_id, -movement.effect(old.quantity))?;
                    ledger.apply_on_line(line, edit.product_id, movement.effect(edit.quantity))?;
                }

                if old.product_id != edit.product_id || old.quantity != edit.quantity {
                    plan.updates.push(EntryUpdate {
                        entry_id: old.entry_id,
                        product_id: edit.product_id,
                        quantity: edit.quantity,
                    });
                }
            }
            None => {
                if movement == Movement::Dispatch {
                    let available = ledger.current(edit.product_id)?;
                    if available < i64::from(edit.quantity) {
                        return Err(StockError::InsufficientStock {
                            line,
                            product_id: edit.product_id,
                            available: available as i32,
                            requested: edit.quantity,
                        });
                    }
                }
                ledger.apply_on_line(line, edit.product_id, movement.effect(edit.quantity))?;
                plan.inserts.push(NewEntry {
                    product_id: edit.product_id,
                    quantity: edit.quantity,
                });
            }
        }
    }

    let removed: Vec<ExistingLine> = existing
        .iter()
        .filter(|e| !seen.contains(&e.entry_id))
        .copied()
        .collect();
    revert_lines(movement, ledger, &removed)?;
    plan.deletes = removed.iter().map(|e| e.entry_id).collect();
    plan.stock = ledger.changes();

    Ok(plan)
}

/// Revert the stock effect of entries that are being deleted outright
pub fn plan_reference_removal(
    movement: Movement,
    ledger: &mut StockLedger,
    lines: &[ExistingLine],
) -> Result<Vec<StockChange>, StockError> {
    revert_lines(movement, ledger, lines)?;
    Ok(ledger.changes())
}

fn revert_lines(
    movement: Movement,
    ledger: &mut StockLedger,
    lines: &[ExistingLine],
) -> Result<(), StockError> {
    for old in lines {
        ledger
            .apply(old.product_id, -movement.effect(old.quantity))?
            .map_err(|resulting| StockError::RemovalWouldGoNegative {
                entry_id: old.entry_id,
                product_id: old.product_id,
                resulting,
            })?;
    }
    Ok(())
}

/// Stock of a merge target after absorbing its sources
pub fn merge_stock(
    target: (ProductId, i32),
    sources: &[(ProductId, i32)],
) -> Result<i32, StockError> {
    let total: i64 = i64::from(target.1) + sources.iter().map(|(_, s)| i64::from(*s)).sum::<i64>();
    i32::try_from(total).map_err(|_| StockError::Overflow {
        product_id: target.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(pairs: &[(ProductId, i32)]) -> StockLedger {
        pairs.iter().copied().collect()
    }

    fn line(entry_id: EntryId, product_id: ProductId, quantity: i32) -> ExistingLine {
        ExistingLine {
            entry_id,
            product_id,
            quantity,
        }
    }

    fn edit(entry_id: Option<EntryId>, product_id: ProductId, quantity: i32) -> LineEdit {
        LineEdit {
            entry_id,
            product_id,
            quantity,
        }
    }

    #[test]
    fn test_intake_adds_stock() {
        let mut l = ledger(&[(1, 4)]);
        assert_eq!(plan_intake(&mut l, 1, 1, 6).unwrap(), 10);
        assert_eq!(l.changes(), vec![StockChange { product_id: 1, stock: 10 }]);
    }

    #[test]
    fn test_intake_rejects_non_positive() {
        let mut l = ledger(&[(1, 4)]);
        assert_eq!(
            plan_intake(&mut l, 3, 1, 0),
            Err(StockError::InvalidQuantity { line: 3, quantity: 0 })
        );
        assert!(l.changes().is_empty());
    }

    #[test]
    fn test_dispatch_clamps_to_available() {
        let mut l = ledger(&[(7, 3)]);
        let out = plan_dispatch(&mut l, 1, 7, 5).unwrap();
        assert_eq!(out.dispatched, 3);
        assert_eq!(out.shortfall(), Some(2));
        assert_eq!(l.get(7), Some(0));
    }

    #[test]
    fn test_dispatch_full() {
        let mut l = ledger(&[(7, 10)]);
        let out = plan_dispatch(&mut l, 1, 7, 4).unwrap();
        assert_eq!(out.dispatched, 4);
        assert_eq!(out.shortfall(), None);
        assert_eq!(l.get(7), Some(6));
    }

    #[test]
    fn test_dispatch_same_product_twice_in_batch() {
        let mut l = ledger(&[(7, 5)]);
        plan_dispatch(&mut l, 1, 7, 4).unwrap();
        let second = plan_dispatch(&mut l, 2, 7, 4).unwrap();
        assert_eq!(second.dispatched, 1);
        assert_eq!(l.get(7), Some(0));
    }

    #[test]
    fn test_unknown_product() {
        let mut l = ledger(&[]);
        assert_eq!(
            plan_intake(&mut l, 1, 9, 1),
            Err(StockError::UnknownProduct { product_id: 9 })
        );
    }

    #[test]
    fn test_intake_edit_increase_and_decrease() {
        let mut l = ledger(&[(1, 10), (2, 10)]);
        let existing = [line(100, 1, 5), line(101, 2, 5)];
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &existing,
            &[edit(Some(100), 1, 8), edit(Some(101), 2, 2)],
        )
        .unwrap();

        assert_eq!(l.get(1), Some(13));
        assert_eq!(l.get(2), Some(7));
        assert_eq!(plan.updates.len(), 2);
        assert!(plan.inserts.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_intake_edit_cannot_drive_stock_negative() {
        // 5 units came in, 4 already left: lowering the intake to 0 is impossible
        let mut l = ledger(&[(1, 1)]);
        let err = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[line(100, 1, 5)],
            &[edit(Some(100), 1, 0)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            StockError::NegativeStock {
                line: 1,
                product_id: 1,
                resulting: -4
            }
        );
    }

    #[test]
    fn test_intake_edit_removed_line_reverts() {
        let mut l = ledger(&[(1, 10), (2, 3)]);
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[line(100, 1, 5), line(101, 2, 3)],
            &[edit(Some(100), 1, 5)],
        )
        .unwrap();
        assert_eq!(plan.deletes, vec![101]);
        assert!(plan.updates.is_empty());
        assert_eq!(l.get(2), Some(0));
        assert_eq!(plan.stock, vec![StockChange { product_id: 1, stock: 10 }, StockChange { product_id: 2, stock: 0 }]);
    }

    #[test]
    fn test_intake_edit_removal_rejected_when_units_gone() {
        let mut l = ledger(&[(2, 1)]);
        let err = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[line(101, 2, 3)],
            &[edit(None, 2, 1)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            StockError::RemovalWouldGoNegative {
                entry_id: 101,
                product_id: 2,
                resulting: -1
            }
        );
    }

    #[test]
    fn test_dispatch_edit_reduce_restores_stock() {
        let mut l = ledger(&[(1, 2)]);
        plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[line(50, 1, 6)],
            &[edit(Some(50), 1, 1)],
        )
        .unwrap();
        assert_eq!(l.get(1), Some(7));
    }

    #[test]
    fn test_dispatch_edit_increase_needs_stock() {
        let mut l = ledger(&[(1, 2)]);
        let err = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[line(50, 1, 6)],
            &[edit(Some(50), 1, 9)],
        )
        .unwrap_err();
        assert!(matches!(err, StockError::NegativeStock { line: 1, product_id: 1, resulting: -1 }));
    }

    #[test]
    fn test_dispatch_edit_new_line_is_strict() {
        let mut l = ledger(&[(1, 2)]);
        let err = plan_batch_edit(Movement::Dispatch, &mut l, &[], &[edit(None, 1, 3)]).unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientStock {
                line: 1,
                product_id: 1,
                available: 2,
                requested: 3
            }
        );
    }

    #[test]
    fn test_dispatch_edit_removed_line_restores() {
        let mut l = ledger(&[(1, 0)]);
        let plan =
            plan_batch_edit(Movement::Dispatch, &mut l, &[line(50, 1, 6)], &[edit(None, 1, 0)])
                .unwrap();
        assert_eq!(plan.deletes, vec![50]);
        assert_eq!(plan.inserts, vec![NewEntry { product_id: 1, quantity: 0 }]);
        assert_eq!(l.get(1), Some(6));
    }

    #[test]
    fn test_edit_product_change_moves_effect() {
        let mut l = ledger(&[(1, 10), (2, 0)]);
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[line(100, 1, 4)],
            &[edit(Some(100), 2, 4)],
        )
        .unwrap();
        assert_eq!(l.get(1), Some(6));
        assert_eq!(l.get(2), Some(4));
        assert_eq!(
            plan.updates,
            vec![EntryUpdate {
                entry_id: 100,
                product_id: 2,
                quantity: 4
            }]
        );
    }

    #[test]
    fn test_edit_duplicate_entry_rejected() {
        let mut l = ledger(&[(1, 10)]);
        let err = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[line(100, 1, 4)],
            &[edit(Some(100), 1, 4), edit(Some(100), 1, 5)],
        )
        .unwrap_err();
        assert_eq!(err, StockError::DuplicateEntry { line: 2, entry_id: 100 });
    }

    #[test]
    fn test_edit_foreign_entry_id_is_new_line() {
        let mut l = ledger(&[(1, 10)]);
        let plan = plan_batch_edit(
            Movement::Intake,
            &mut l,
            &[line(100, 1, 4)],
            &[edit(Some(100), 1, 4), edit(Some(999), 1, 2)],
        )
        .unwrap();
        assert_eq!(plan.inserts, vec![NewEntry { product_id: 1, quantity: 2 }]);
        assert_eq!(l.get(1), Some(12));
    }

    #[test]
    fn test_edit_negative_quantity() {
        let mut l = ledger(&[(1, 10)]);
        let err = plan_batch_edit(Movement::Dispatch, &mut l, &[], &[edit(None, 1, -1)]).unwrap_err();
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_unchanged_edit_is_noop() {
        let mut l = ledger(&[(1, 10)]);
        let plan = plan_batch_edit(
            Movement::Dispatch,
            &mut l,
            &[line(100, 1, 4)],
            &[edit(Some(100), 1, 4)],
        )
        .unwrap();
        assert!(plan.is_noop());
        assert_eq!(l.get(1), Some(10));
    }

    #[test]
    fn test_reference_removal() {
        let mut l = ledger(&[(1, 10)]);
        let changes = plan_reference_removal(
            Movement::Dispatch,
            &mut l,
            &[line(1, 1, 3), line(2, 1, 2)],
        )
        .unwrap();
        assert_eq!(changes, vec![StockChange { product_id: 1, stock: 15 }]);

        let mut l = ledger(&[(1, 2)]);
        assert!(plan_reference_removal(Movement::Intake, &mut l, &[line(1, 1, 3)]).is_err());
    }

    #[test]
    fn test_merge_stock() {
        assert_eq!(merge_stock((1, 5), &[(2, 3), (3, 0)]).unwrap(), 8);
        assert_eq!(
            merge_stock((1, i32::MAX), &[(2, 1)]),
            Err(StockError::Overflow { product_id: 1 })
        );
    }

    #[test]
    fn test_overflow_detected() {
        let mut l = ledger(&[(1, i32::MAX - 1)]);
        assert_eq!(
            plan_intake(&mut l, 1, 1, 5),
            Err(StockError::Overflow { product_id: 1 })
        );
    }
}
