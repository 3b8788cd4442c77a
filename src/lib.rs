//! # Trip Engine
//!
//! Shopping trip orchestration: turns a flat shopping list into an ordered,
//! resumable, multi-store shopping session.
//!
//! This library provides:
//! - Route building (items grouped into store sections in fixed traversal order)
//! - A trip state machine with store/aisle traversal and a resumable session
//! - Item disposition flows (found / defer / remove / migrate to next store)
//! - Multi-store coordination with loyalty checkpoints and trip analytics
//!
//! ## Features
//!
//! - **`http`** - reqwest-backed adapters for the backend list API and analytics
//! - **`persistence`** - SQLite-backed trip session store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trip_engine::{
//!     KeywordClassifier, MemorySessionStore, NoopBackend, PlanInput, Retailer,
//!     ShoppingItem, TripEngine, TripPhase,
//! };
//!
//! let plan = PlanInput::SingleStore {
//!     retailer: Retailer::new(1, "Greenmart"),
//!     items: vec![
//!         ShoppingItem::new(1, "Milk", 1),
//!         ShoppingItem::new(2, "Apples", 3),
//!         ShoppingItem::new(3, "Bread", 1),
//!     ],
//! };
//!
//! let engine = TripEngine::start(
//!     42,
//!     plan,
//!     KeywordClassifier::new(),
//!     NoopBackend,
//!     NoopBackend,
//!     MemorySessionStore::new(),
//! );
//!
//! assert_eq!(*engine.phase(), TripPhase::Shopping);
//! assert_eq!(engine.route().aisle_groups.len(), 3);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TripError};

// Bounded TTL cache for classification results
pub mod cache;
pub use cache::TtlCache;

// Product classification (fast heuristic + cached async refinement)
pub mod classify;
pub use classify::{CachedClassifier, Classification, Classifier, KeywordClassifier};

// Route building (section ordering, shelf hints, duration estimate)
pub mod route;
pub use route::{build_route, section_for, shelf_hint, SectionDef, UNCLASSIFIED_ORDER};

// Trip session persistence
pub mod session;
pub use session::{MemorySessionStore, SessionStore, TripSession, SESSION_MAX_AGE_MS};
#[cfg(feature = "persistence")]
pub use session::SqliteSessionStore;

// Backend list API and analytics contracts
pub mod backend;
pub use backend::{
    AnalyticsSink, ItemPatch, ListApi, MovedItem, NoopBackend, TripReport, UncompletedItem,
};

// HTTP adapters for the backend contracts
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::HttpBackend;

// The trip state machine
pub mod trip;
pub use trip::{MoveOutcome, TripEngine, TripPhase};

// Item disposition flows (found / defer / remove / migrate)
pub mod disposition;
pub use disposition::Disposition;

// Multi-store coordination (segment completion, uncompleted-item decisions)
pub mod multistore;
pub use multistore::UncompletedAction;

// Shared test doubles
#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Core Types
// ============================================================================

/// A single entry on the shopping list.
///
/// Ids are stable integers; negative ids mark temporary entries created for
/// in-flight moves before the backend assigns a real id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: i64,
    pub product_name: String,
    pub quantity: u32,
    #[serde(default)]
    pub unit: Option<String>,
    /// Authoritative when present; otherwise filled in by the classifier.
    #[serde(default)]
    pub category: Option<String>,
    /// Classification confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    /// Derived in-section hint ("Back wall cooler"); not required to exist.
    #[serde(default)]
    pub shelf_location: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub suggested_retailer_id: Option<i64>,
    /// Free-text audit trail of disposition decisions.
    #[serde(default)]
    pub notes: Option<String>,
}

impl ShoppingItem {
    /// Create a new unclassified item.
    pub fn new(id: i64, product_name: &str, quantity: u32) -> Self {
        Self {
            id,
            product_name: product_name.to_string(),
            quantity,
            unit: None,
            category: None,
            confidence: 0.0,
            shelf_location: None,
            is_completed: false,
            suggested_retailer_id: None,
            notes: None,
        }
    }
}

/// A retailer participating in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retailer {
    pub id: i64,
    pub name: String,
    /// Loyalty card label/number, if the user linked one for this retailer.
    /// Presence gates the end-of-store loyalty checkpoint.
    #[serde(default)]
    pub loyalty_card: Option<String>,
}

impl Retailer {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            loyalty_card: None,
        }
    }

    pub fn with_loyalty(id: i64, name: &str, card: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            loyalty_card: Some(card.to_string()),
        }
    }

    /// Attach a loyalty card to an existing retailer.
    pub fn with_card(mut self, card: &str) -> Self {
        self.loyalty_card = Some(card.to_string());
        self
    }
}

/// Items clustered by store section, in fixed traversal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AisleGroup {
    pub name: String,
    pub section_label: String,
    /// Fixed ranking used for sort (Produce=1 .. Household=10, Unclassified last).
    pub order: u32,
    pub items: Vec<ShoppingItem>,
}

/// The subset of a plan's items assigned to one retailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSegment {
    pub retailer: Retailer,
    pub items: Vec<ShoppingItem>,
    #[serde(default)]
    pub subtotal: f64,
}

impl StoreSegment {
    pub fn new(retailer: Retailer, items: Vec<ShoppingItem>) -> Self {
        Self {
            retailer,
            items,
            subtotal: 0.0,
        }
    }
}

/// An ordered, traversable shopping route.
///
/// `stores` is the single authoritative owner of item data. `aisle_groups`
/// is a derived view of the *active* segment, regenerated after every
/// structural mutation; it is never edited in place by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub aisle_groups: Vec<AisleGroup>,
    pub is_multi_store: bool,
    pub stores: Vec<StoreSegment>,
    pub estimated_minutes: u32,
}

/// Where an item currently lives: its store segment, and (for the active
/// segment only) its aisle group index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLocation {
    pub store: usize,
    pub aisle: Option<usize>,
}

/// The initiating plan payload, normalized once at ingestion.
///
/// Plans arrive in several shapes (single store, multi-store, or a bare item
/// list); this tagged union resolves them into one canonical construction
/// input for the route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "planType", rename_all = "camelCase")]
pub enum PlanInput {
    #[serde(rename_all = "camelCase")]
    SingleStore {
        retailer: Retailer,
        items: Vec<ShoppingItem>,
    },
    #[serde(rename_all = "camelCase")]
    MultiStore { stores: Vec<StoreSegment> },
    #[serde(rename_all = "camelCase")]
    BareList { items: Vec<ShoppingItem> },
}

impl PlanInput {
    /// Normalize the plan into store segments. Always yields at least one
    /// segment, so downstream indexing never deals with an empty plan.
    ///
    /// A bare list (or a multi-store payload with no stores) gets a
    /// placeholder retailer and no loyalty gate.
    pub fn to_segments(&self) -> Vec<StoreSegment> {
        match self {
            PlanInput::SingleStore { retailer, items } => {
                vec![StoreSegment::new(retailer.clone(), items.clone())]
            }
            PlanInput::MultiStore { stores } if !stores.is_empty() => stores.clone(),
            PlanInput::MultiStore { .. } => {
                vec![StoreSegment::new(Retailer::new(0, "Your store"), Vec::new())]
            }
            PlanInput::BareList { items } => {
                vec![StoreSegment::new(Retailer::new(0, "Your store"), items.clone())]
            }
        }
    }

    /// The plan shape tag, as reported in trip analytics.
    pub fn plan_type(&self) -> &'static str {
        match self {
            PlanInput::SingleStore { .. } => "singleStore",
            PlanInput::MultiStore { .. } => "multiStore",
            PlanInput::BareList { .. } => "bareList",
        }
    }

    /// Total number of items across all segments.
    pub fn item_count(&self) -> usize {
        match self {
            PlanInput::SingleStore { items, .. } | PlanInput::BareList { items } => items.len(),
            PlanInput::MultiStore { stores } => stores.iter().map(|s| s.items.len()).sum(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_defaults() {
        let item = ShoppingItem::new(7, "Oat milk", 2);
        assert_eq!(item.id, 7);
        assert_eq!(item.quantity, 2);
        assert!(item.category.is_none());
        assert!(!item.is_completed);
    }

    #[test]
    fn test_item_wire_naming() {
        let mut item = ShoppingItem::new(1, "Milk", 1);
        item.suggested_retailer_id = Some(3);
        item.is_completed = true;
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"productName\""));
        assert!(json.contains("\"suggestedRetailerId\""));
        assert!(json.contains("\"isCompleted\""));
    }

    #[test]
    fn test_plan_normalization_bare_list() {
        let plan = PlanInput::BareList {
            items: vec![ShoppingItem::new(1, "Rice", 1)],
        };
        let segments = plan.to_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].retailer.id, 0);
        assert!(segments[0].retailer.loyalty_card.is_none());
        assert_eq!(plan.plan_type(), "bareList");
    }

    #[test]
    fn test_plan_normalization_empty_multi_store() {
        // Loosely-typed boundary input: no stores at all still normalizes
        // to one placeholder segment
        let plan = PlanInput::MultiStore { stores: vec![] };
        let segments = plan.to_segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].retailer.id, 0);
        assert!(segments[0].items.is_empty());
        assert_eq!(plan.item_count(), 0);
    }

    #[test]
    fn test_plan_normalization_multi_store() {
        let plan = PlanInput::MultiStore {
            stores: vec![
                StoreSegment::new(Retailer::new(1, "A"), vec![ShoppingItem::new(1, "Milk", 1)]),
                StoreSegment::new(Retailer::new(2, "B"), vec![ShoppingItem::new(2, "Soap", 1)]),
            ],
        };
        let segments = plan.to_segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(plan.item_count(), 2);
        assert_eq!(plan.plan_type(), "multiStore");
    }

    #[test]
    fn test_plan_tagged_serialization_round_trip() {
        let plan = PlanInput::SingleStore {
            retailer: Retailer::with_loyalty(5, "Greenmart", "GM-1881"),
            items: vec![ShoppingItem::new(-3, "Temp item", 1)],
        };
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"planType\":\"singleStore\""));
        assert!(json.contains("\"loyaltyCard\""));

        let back: PlanInput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}
