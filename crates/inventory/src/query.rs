//! Ledger listing: filters and page arithmetic.

use serde::{Deserialize, Serialize};

use glampstock_core::ProductId;

use crate::movement::MovementType;
use crate::transaction::TransactionView;

/// Optional filters for a product's movement history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Restrict to exactly this movement type.
    #[serde(default)]
    pub movement_type: Option<MovementType>,
    /// Case-insensitive substring over note, reference and the actor's
    /// first name, last name or email.
    #[serde(default)]
    pub search: Option<String>,
}

impl TransactionFilter {
    pub fn of_type(movement_type: MovementType) -> Self {
        Self {
            movement_type: Some(movement_type),
            search: None,
        }
    }

    pub fn search(text: impl Into<String>) -> Self {
        Self {
            movement_type: None,
            search: Some(text.into()),
        }
    }

    /// Trimmed search text, or `None` when blank.
    pub fn search_text(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// In-process evaluation of the filter (used by non-SQL stores).
    pub fn matches(&self, view: &TransactionView) -> bool {
        if let Some(kind) = self.movement_type {
            if view.transaction.movement_type != kind {
                return false;
            }
        }

        let Some(needle) = self.search_text() else {
            return true;
        };
        let needle = needle.to_lowercase();
        let contains = |haystack: &str| haystack.to_lowercase().contains(&needle);

        let t = &view.transaction;
        t.note.as_deref().is_some_and(contains)
            || t.reference.as_deref().is_some_and(contains)
            || view.actor.as_ref().is_some_and(|a| {
                contains(&a.first_name) || contains(&a.last_name) || contains(&a.email)
            })
    }
}

/// A listing request against one product's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerQuery {
    pub product_id: ProductId,
    pub filter: TransactionFilter,
}

impl LedgerQuery {
    pub fn new(product_id: ProductId, filter: TransactionFilter) -> Self {
        Self { product_id, filter }
    }
}

/// Requested page (1-based) and page size. Both are clamped to at least 1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    pub const DEFAULT_PAGE_SIZE: u64 = 20;

    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_PAGE_SIZE)
    }
}

/// One page of results.
///
/// `current_page == 0` and `total_pages == 0` when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u64,
    pub current_page: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_pages: 0,
            current_page: 0,
        }
    }
}

/// Resolved window into a filtered result set.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageWindow {
    pub total_pages: u64,
    pub current_page: u64,
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    /// Resolve a request against `count` matching rows.
    ///
    /// Out-of-range pages are clamped down to the last page.
    pub fn resolve(count: u64, request: PageRequest) -> Self {
        let request = PageRequest::new(request.page, request.page_size);
        let total_pages = count.div_ceil(request.page_size);
        let current_page = if total_pages == 0 {
            0
        } else {
            request.page.min(total_pages)
        };
        let offset = current_page.saturating_sub(1) * request.page_size;

        Self {
            total_pages,
            current_page,
            offset,
            limit: request.page_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_pages == 0
    }
}
