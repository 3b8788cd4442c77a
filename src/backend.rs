//! Backend collaborator contracts.
//!
//! The engine mutates the canonical shopping list through [`ListApi`] and
//! reports finished trips through [`AnalyticsSink`]. Both are async traits
//! so the HTTP adapters can implement them directly; tests use the mocks
//! in `testutil`.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A partial update to one list item. Only set fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_retailer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ItemPatch {
    /// Patch that marks an item (un)completed.
    pub fn completed(is_completed: bool) -> Self {
        Self {
            is_completed: Some(is_completed),
            ..Default::default()
        }
    }

    /// Patch that sets the item's note.
    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Default::default()
        }
    }

    /// Patch that reassigns an item to another retailer, clearing its
    /// completion and recording an audit note.
    pub fn reassign(retailer_id: i64, note: impl Into<String>) -> Self {
        Self {
            is_completed: Some(false),
            suggested_retailer_id: Some(retailer_id),
            notes: Some(note.into()),
            ..Default::default()
        }
    }
}

/// The canonical list backend. Mutations here are the source of truth;
/// the engine's in-memory state is an optimistic mirror.
#[allow(async_fn_in_trait)]
pub trait ListApi {
    async fn update_item(&self, item_id: i64, patch: ItemPatch) -> Result<()>;
    async fn delete_item(&self, item_id: i64) -> Result<()>;
}

/// Receives one report per completed store segment.
#[allow(async_fn_in_trait)]
pub trait AnalyticsSink {
    async fn trip_complete(&self, report: TripReport) -> Result<()>;
}

// ============================================================================
// Trip Report
// ============================================================================

/// An item left uncompleted at segment end, with the decision taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncompletedItem {
    pub id: i64,
    pub product_name: String,
    pub reason: String,
}

/// An item moved between store segments during the trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedItem {
    pub id: i64,
    pub product_name: String,
    pub from_retailer: String,
    pub to_retailer: String,
}

/// Summary of one completed store segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripReport {
    pub list_id: i64,
    pub completed_item_ids: Vec<i64>,
    pub uncompleted_items: Vec<UncompletedItem>,
    pub moved_items: Vec<MovedItem>,
    /// Unix millis when the trip (not the segment) started.
    pub start_time: i64,
    pub end_time: i64,
    pub retailer_name: String,
    pub plan_type: String,
    pub total_stores: usize,
}

// ============================================================================
// No-op Backend
// ============================================================================

/// Backend that accepts everything and records nothing.
///
/// Useful for offline trips and examples; implements both contracts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl ListApi for NoopBackend {
    async fn update_item(&self, _item_id: i64, _patch: ItemPatch) -> Result<()> {
        Ok(())
    }

    async fn delete_item(&self, _item_id: i64) -> Result<()> {
        Ok(())
    }
}

impl AnalyticsSink for NoopBackend {
    async fn trip_complete(&self, _report: TripReport) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
