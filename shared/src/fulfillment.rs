//! Purchase-order fulfillment rules
//!
//! Orders never touch stock. How far an order has been served is derived
//! from the dispatch quantities tagged with its number.

use serde::{Deserialize, Serialize};

/// Fulfillment status of a purchase order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Partial,
    Completed,
}

impl OrderStatus {
    /// Status from the order's requested and dispatched unit totals.
    /// An order with nothing requested is still pending.
    pub fn from_totals(requested: i64, dispatched: i64) -> Self {
        if requested <= 0 {
            OrderStatus::Pending
        } else if dispatched >= requested {
            OrderStatus::Completed
        } else if dispatched > 0 {
            OrderStatus::Partial
        } else {
            OrderStatus::Pending
        }
    }

    /// Label shown to warehouse staff
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pendiente",
            OrderStatus::Partial => "Parcial",
            OrderStatus::Completed => "Completada",
        }
    }

    /// Bootstrap badge class used by the web front-end
    pub fn badge(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "secondary",
            OrderStatus::Partial => "warning text-dark",
            OrderStatus::Completed => "success",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Partial => "partial",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Requested vs dispatched units of one order item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProgress {
    pub requested: i64,
    pub dispatched: i64,
    pub pending: i64,
}

impl ItemProgress {
    pub fn new(requested: i64, dispatched: i64) -> Self {
        Self {
            requested,
            dispatched,
            pending: (requested - dispatched).max(0),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// Order count per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTotals {
    pub completed: u32,
    pub partial: u32,
    pub pending: u32,
}

impl StatusTotals {
    pub fn record(&mut self, status: OrderStatus) {
        match status {
            OrderStatus::Completed => self.completed += 1,
            OrderStatus::Partial => self.partial += 1,
            OrderStatus::Pending => self.pending += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.completed + self.partial + self.pending
    }
}

impl FromIterator<OrderStatus> for StatusTotals {
    fn from_iter<I: IntoIterator<Item = OrderStatus>>(iter: I) -> Self {
        let mut totals = StatusTotals::default();
        for status in iter {
            totals.record(status);
        }
        totals
    }
}
