//! Route building.
//!
//! Turns a classified item list into an ordered walk through a store:
//! items are grouped by section, sections are sorted by a fixed traversal
//! ranking (Produce first, Household last, Unclassified at the end), and a
//! duration estimate is attached.

use std::collections::BTreeMap;

use log::info;
use once_cell::sync::Lazy;

use crate::classify::Classifier;
use crate::{AisleGroup, Retailer, Route, ShoppingItem, StoreSegment};

/// Sort rank for items no classifier could place. Always walks last.
pub const UNCLASSIFIED_ORDER: u32 = 99;

/// Confidence implied by a caller-supplied category.
const CALLER_CATEGORY_CONFIDENCE: f64 = 0.9;

/// A store section: display name, shopper-facing label, and traversal rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDef {
    pub name: &'static str,
    pub label: &'static str,
    pub order: u32,
}

/// Category to section mapping, in traversal order.
static SECTION_TABLE: Lazy<Vec<(&'static str, SectionDef)>> = Lazy::new(|| {
    vec![
        ("produce", SectionDef { name: "Produce", label: "Fresh Produce", order: 1 }),
        ("bakery", SectionDef { name: "Bakery", label: "Bakery", order: 2 }),
        ("deli", SectionDef { name: "Deli", label: "Deli Counter", order: 3 }),
        ("meat", SectionDef { name: "Meat & Seafood", label: "Meat & Seafood", order: 4 }),
        ("dairy", SectionDef { name: "Dairy", label: "Dairy & Eggs", order: 5 }),
        ("frozen", SectionDef { name: "Frozen", label: "Frozen Foods", order: 6 }),
        ("pantry", SectionDef { name: "Pantry", label: "Dry Goods & Pantry", order: 7 }),
        ("beverages", SectionDef { name: "Beverages", label: "Beverages", order: 8 }),
        ("snacks", SectionDef { name: "Snacks", label: "Snacks & Candy", order: 9 }),
        (
            "household",
            SectionDef { name: "Household", label: "Household & Personal Care", order: 10 },
        ),
    ]
});

static UNCLASSIFIED_SECTION: SectionDef = SectionDef {
    name: "Other Items",
    label: "Unclassified",
    order: UNCLASSIFIED_ORDER,
};

/// Resolve a category to its section. Unknown or missing categories land
/// in the trailing "Other Items" section.
pub fn section_for(category: Option<&str>) -> &'static SectionDef {
    let Some(category) = category else {
        return &UNCLASSIFIED_SECTION;
    };
    SECTION_TABLE
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, def)| def)
        .unwrap_or(&UNCLASSIFIED_SECTION)
}

// ============================================================================
// Shelf Hints
// ============================================================================

/// (category, name keyword, hint) rows for in-section placement hints.
static SHELF_HINTS: Lazy<Vec<(&'static str, &'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("produce", "apple", "Front bins"),
        ("produce", "banana", "Front bins"),
        ("produce", "lettuce", "Refrigerated wall"),
        ("produce", "salad", "Refrigerated wall"),
        ("dairy", "milk", "Back wall cooler"),
        ("dairy", "egg", "Back wall cooler"),
        ("dairy", "yogurt", "Mid cooler"),
        ("dairy", "cheese", "Specialty case"),
        ("meat", "salmon", "Seafood counter"),
        ("meat", "shrimp", "Seafood counter"),
        ("meat", "fish", "Seafood counter"),
        ("pantry", "cereal", "Top shelf"),
        ("pantry", "spice", "Baking aisle"),
        ("pantry", "flour", "Baking aisle"),
        ("pantry", "sugar", "Baking aisle"),
        ("beverages", "wine", "Far corner"),
        ("beverages", "beer", "Far corner"),
        ("household", "detergent", "End cap"),
    ]
});

/// Best-effort in-section placement hint for an item.
pub fn shelf_hint(category: Option<&str>, product_name: &str) -> Option<String> {
    let category = category?;
    let name = product_name.to_lowercase();
    SHELF_HINTS
        .iter()
        .find(|(cat, keyword, _)| *cat == category && name.contains(keyword))
        .map(|(_, _, hint)| hint.to_string())
}

// ============================================================================
// Classification Pass
// ============================================================================

/// Classify every item in a segment that does not already carry a category.
///
/// Caller-supplied categories are authoritative and skipped. Returns the ids
/// of items that went through the fast heuristic and are candidates for
/// background refinement.
pub fn classify_items<C: Classifier>(items: &mut [ShoppingItem], classifier: &C) -> Vec<i64> {
    let mut refinement_candidates = Vec::new();
    for item in items.iter_mut() {
        if item.category.is_some() {
            if item.confidence == 0.0 {
                item.confidence = CALLER_CATEGORY_CONFIDENCE;
            }
            if item.shelf_location.is_none() {
                item.shelf_location = shelf_hint(item.category.as_deref(), &item.product_name);
            }
            continue;
        }
        let result = classifier.classify(&item.product_name);
        item.confidence = result.confidence;
        item.shelf_location = shelf_hint(Some(&result.category), &item.product_name);
        item.category = Some(result.category);
        refinement_candidates.push(item.id);
    }
    refinement_candidates
}

// ============================================================================
// Grouping and Estimation
// ============================================================================

/// Group classified items into aisle groups in fixed traversal order.
///
/// Sections with no items are omitted, so group indices are dense.
pub fn group_into_aisles(items: &[ShoppingItem]) -> Vec<AisleGroup> {
    let mut by_order: BTreeMap<u32, AisleGroup> = BTreeMap::new();
    for item in items {
        let section = section_for(item.category.as_deref());
        by_order
            .entry(section.order)
            .or_insert_with(|| AisleGroup {
                name: section.name.to_string(),
                section_label: section.label.to_string(),
                order: section.order,
                items: Vec::new(),
            })
            .items
            .push(item.clone());
    }
    by_order.into_values().collect()
}

/// Base minimum for any store visit, in minutes.
const MIN_STORE_MINUTES: f64 = 15.0;

/// Minutes per aisle group traversed.
const MINUTES_PER_AISLE: f64 = 3.0;

/// Minutes per item picked.
const MINUTES_PER_ITEM: f64 = 0.5;

/// Name keywords that add a lookup surcharge (hard-to-find items).
static COMPLEX_KEYWORDS: &[&str] = &["organic", "specialty", "imported", "artisan", "gluten-free"];

/// Name keywords that add a counter-service surcharge.
static FRESH_KEYWORDS: &[&str] = &["fresh", "salmon", "shrimp", "fish", "steak", "chicken", "beef"];

const COMPLEX_SURCHARGE: f64 = 1.0;
const FRESH_SURCHARGE: f64 = 0.5;

/// Estimate the in-store duration for one segment, in whole minutes.
pub fn estimate_minutes(aisle_count: usize, items: &[ShoppingItem]) -> u32 {
    let base = MINUTES_PER_AISLE * aisle_count as f64 + MINUTES_PER_ITEM * items.len() as f64;
    let mut total = base.max(MIN_STORE_MINUTES);
    for item in items {
        let name = item.product_name.to_lowercase();
        if COMPLEX_KEYWORDS.iter().any(|k| name.contains(k)) {
            total += COMPLEX_SURCHARGE;
        }
        if FRESH_KEYWORDS.iter().any(|k| name.contains(k)) {
            total += FRESH_SURCHARGE;
        }
    }
    total.ceil() as u32
}

/// Build a single-store route from a flat item list.
///
/// Classification runs synchronously; the returned route is immediately
/// traversable. Idempotent: building from an already classified list yields
/// the same route.
pub fn build_route<C: Classifier>(
    items: Vec<ShoppingItem>,
    retailer: Retailer,
    classifier: &C,
) -> Route {
    let mut segment = StoreSegment::new(retailer, items);
    classify_items(&mut segment.items, classifier);
    let aisle_groups = group_into_aisles(&segment.items);
    let estimated_minutes = estimate_minutes(aisle_groups.len(), &segment.items);

    info!(
        "[Route] Built route for '{}': {} items across {} aisles, ~{} min",
        segment.retailer.name,
        segment.items.len(),
        aisle_groups.len(),
        estimated_minutes
    );

    Route {
        aisle_groups,
        is_multi_store: false,
        stores: vec![segment],
        estimated_minutes,
    }
}

// ============================================================================
// Tests
// ============================================================================
