//! Shared test doubles for the engine's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::backend::{AnalyticsSink, ItemPatch, ListApi, TripReport};
use crate::classify::{Classification, Classifier, KeywordClassifier};
use crate::error::{Result, TripError};
use crate::session::MemorySessionStore;
use crate::trip::TripEngine;
use crate::{PlanInput, Retailer, ShoppingItem, StoreSegment};

pub(crate) fn item(id: i64, name: &str) -> ShoppingItem {
    ShoppingItem::new(id, name, 1)
}

pub(crate) fn retailer(id: i64, name: &str) -> Retailer {
    Retailer::new(id, name)
}

/// List API double that records every call and fails on demand.
#[derive(Debug, Default)]
pub(crate) struct MockListApi {
    pub patches: Mutex<Vec<(i64, ItemPatch)>>,
    pub deletes: Mutex<Vec<i64>>,
    pub fail_patches: Mutex<HashSet<i64>>,
    pub fail_deletes: Mutex<HashSet<i64>>,
}

impl ListApi for MockListApi {
    async fn update_item(&self, item_id: i64, patch: ItemPatch) -> Result<()> {
        if self.fail_patches.lock().unwrap().contains(&item_id) {
            return Err(TripError::backend(
                format!("simulated PATCH failure for item {}", item_id),
                Some(503),
            ));
        }
        self.patches.lock().unwrap().push((item_id, patch));
        Ok(())
    }

    async fn delete_item(&self, item_id: i64) -> Result<()> {
        if self.fail_deletes.lock().unwrap().contains(&item_id) {
            return Err(TripError::backend(
                format!("simulated DELETE failure for item {}", item_id),
                Some(503),
            ));
        }
        self.deletes.lock().unwrap().push(item_id);
        Ok(())
    }
}

/// Analytics double that keeps every report it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingAnalytics {
    pub reports: Mutex<Vec<TripReport>>,
    pub fail: Mutex<bool>,
}

impl AnalyticsSink for RecordingAnalytics {
    async fn trip_complete(&self, report: TripReport) -> Result<()> {
        if *self.fail.lock().unwrap() {
            return Err(TripError::backend("simulated analytics outage", Some(500)));
        }
        self.reports.lock().unwrap().push(report);
        Ok(())
    }
}

/// Classifier whose async path can be scripted per product name; the sync
/// path and unscripted names fall back to the keyword heuristic.
pub(crate) struct ScriptedClassifier {
    overrides: HashMap<String, Classification>,
    fallback: KeywordClassifier,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            overrides: HashMap::new(),
            fallback: KeywordClassifier::new(),
        }
    }

    pub fn with_override(mut self, product_name: &str, category: &str, confidence: f64) -> Self {
        self.overrides.insert(
            product_name.to_string(),
            Classification::new(category, confidence),
        );
        self
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&self, product_name: &str) -> Classification {
        self.fallback.classify(product_name)
    }

    async fn classify_async(&self, product_name: &str) -> Result<Classification> {
        if let Some(scripted) = self.overrides.get(product_name) {
            return Ok(scripted.clone());
        }
        self.fallback.classify_async(product_name).await
    }
}

pub(crate) type TestEngine<C = KeywordClassifier> =
    TripEngine<C, MockListApi, RecordingAnalytics, MemorySessionStore>;

pub(crate) fn single_store_engine(items: Vec<ShoppingItem>) -> TestEngine {
    TripEngine::start(
        7,
        PlanInput::SingleStore {
            retailer: retailer(1, "Greenmart"),
            items,
        },
        KeywordClassifier::new(),
        MockListApi::default(),
        RecordingAnalytics::default(),
        MemorySessionStore::new(),
    )
}

pub(crate) fn multi_store_engine(stores: Vec<(Retailer, Vec<ShoppingItem>)>) -> TestEngine {
    TripEngine::start(
        7,
        PlanInput::MultiStore {
            stores: stores
                .into_iter()
                .map(|(retailer, items)| StoreSegment::new(retailer, items))
                .collect(),
        },
        KeywordClassifier::new(),
        MockListApi::default(),
        RecordingAnalytics::default(),
        MemorySessionStore::new(),
    )
}

pub(crate) fn engine_with_classifier(
    items: Vec<ShoppingItem>,
    classifier: ScriptedClassifier,
) -> TestEngine<ScriptedClassifier> {
    TripEngine::start(
        7,
        PlanInput::SingleStore {
            retailer: retailer(1, "Greenmart"),
            items,
        },
        classifier,
        MockListApi::default(),
        RecordingAnalytics::default(),
        MemorySessionStore::new(),
    )
}
