//! The trip state machine.
//!
//! A [`TripEngine`] owns one active shopping trip: the route, the shopper's
//! position in it, completion state, and the resumable session snapshot.
//! Mutations are applied to the in-memory route first and mirrored to the
//! backend list API; the checkpoint written after each action is what makes
//! an interrupted trip resumable.
//!
//! Phase transitions:
//!
//! ```text
//! Shopping --(end of store, loyalty card unacked)--> AwaitingLoyaltyAck
//! Shopping --(end of store, uncompleted items)-----> AwaitingUncompletedDecision
//! Shopping --(end of store, clean)-----------------> Shopping (next store) | TripComplete
//! AwaitingLoyaltyAck --(ack)-----------------------> (re-evaluates end of store)
//! AwaitingUncompletedDecision --(decision)---------> Shopping (next store) | TripComplete
//! ```

use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::backend::{AnalyticsSink, ListApi, MovedItem};
use crate::classify::Classifier;
use crate::error::{Result, TripError};
use crate::route::{classify_items, estimate_minutes, group_into_aisles, section_for, shelf_hint};
use crate::session::{now_ms, SessionStore, TripSession};
use crate::{ItemLocation, PlanInput, Route};

/// Where the trip currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum TripPhase {
    /// Actively walking aisles in the current store segment.
    Shopping,
    /// End of store reached with an unacknowledged loyalty card.
    AwaitingLoyaltyAck,
    /// End of store reached with items still uncompleted; the shopper must
    /// decide what happens to them.
    AwaitingUncompletedDecision { item_ids: Vec<i64> },
    /// All store segments finished. Terminal.
    TripComplete,
}

impl TripPhase {
    pub fn phase_name(&self) -> &'static str {
        match self {
            TripPhase::Shopping => "shopping",
            TripPhase::AwaitingLoyaltyAck => "awaitingLoyaltyAck",
            TripPhase::AwaitingUncompletedDecision { .. } => "awaitingUncompletedDecision",
            TripPhase::TripComplete => "tripComplete",
        }
    }
}

/// Result of an aisle move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Position changed.
    Moved,
    /// Already at the first aisle; backward moves past it are ignored.
    AtBoundary,
    /// Moved past the last aisle; end-of-store handling was triggered.
    EndOfStoreRequested,
}

/// One active shopping trip.
///
/// Generic over its four collaborators so tests can swap in doubles and
/// callers can run fully offline with [`crate::NoopBackend`].
pub struct TripEngine<C, L, A, S> {
    pub(crate) list_id: i64,
    pub(crate) plan: PlanInput,
    pub(crate) route: Route,
    pub(crate) phase: TripPhase,
    pub(crate) current_store: usize,
    pub(crate) current_aisle: usize,
    /// Ids the shopper has marked found in the current segment.
    pub(crate) completed: HashSet<i64>,
    /// Item id to (store, aisle) index, rebuilt with the view.
    pub(crate) locations: HashMap<i64, ItemLocation>,
    /// Items classified by the fast heuristic, awaiting async refinement.
    pub(crate) pending_refinement: HashSet<i64>,
    pub(crate) loyalty_acked: bool,
    pub(crate) has_started_shopping: bool,
    pub(crate) started_at: i64,
    pub(crate) moved_items: Vec<MovedItem>,
    pub(crate) classifier: C,
    pub(crate) list_api: L,
    pub(crate) analytics: A,
    pub(crate) sessions: S,
}

impl<C, L, A, S> TripEngine<C, L, A, S>
where
    C: Classifier,
    L: ListApi,
    A: AnalyticsSink,
    S: SessionStore,
{
    /// Start a new trip from a plan.
    ///
    /// The first store segment is classified synchronously so the route is
    /// immediately traversable; classifier-derived categories are queued
    /// for background refinement via [`Self::refine_classifications`].
    pub fn start(
        list_id: i64,
        plan: PlanInput,
        classifier: C,
        list_api: L,
        analytics: A,
        sessions: S,
    ) -> Self {
        let stores = plan.to_segments();
        let is_multi_store = stores.len() > 1;

        let mut engine = Self {
            list_id,
            plan,
            route: Route {
                aisle_groups: Vec::new(),
                is_multi_store,
                stores,
                estimated_minutes: 0,
            },
            phase: TripPhase::Shopping,
            current_store: 0,
            current_aisle: 0,
            completed: HashSet::new(),
            locations: HashMap::new(),
            pending_refinement: HashSet::new(),
            loyalty_acked: false,
            has_started_shopping: false,
            started_at: now_ms(),
            moved_items: Vec::new(),
            classifier,
            list_api,
            analytics,
            sessions,
        };

        engine.classify_active_segment();
        engine.rebuild_active_view();

        info!(
            "[Trip] Started trip for list {}: {} plan, {} store(s), {} item(s)",
            list_id,
            engine.plan.plan_type(),
            engine.route.stores.len(),
            engine.plan.item_count()
        );
        engine
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn list_id(&self) -> i64 {
        self.list_id
    }

    pub fn phase(&self) -> &TripPhase {
        &self.phase
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn current_store_index(&self) -> usize {
        self.current_store
    }

    pub fn current_aisle_index(&self) -> usize {
        self.current_aisle
    }

    /// Ids of items in the active segment not yet completed.
    pub fn uncompleted_ids_in_active(&self) -> Vec<i64> {
        self.route.stores[self.current_store]
            .items
            .iter()
            .filter(|i| !i.is_completed)
            .map(|i| i.id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Resumption
    // ------------------------------------------------------------------

    /// Look for a resumable session for this list.
    ///
    /// Stale or already-completed records are cleared. Store errors are
    /// logged and reported as no session; a broken store must never block
    /// starting a trip.
    pub fn check_resumable(&mut self) -> Option<TripSession> {
        match self.sessions.load(self.list_id) {
            Ok(Some(session)) => {
                if session.is_resumable(now_ms()) {
                    Some(session)
                } else {
                    debug!(
                        "[Trip] Discarding non-resumable session for list {} (completed: {})",
                        self.list_id, session.is_completed
                    );
                    if let Err(e) = self.sessions.clear(self.list_id) {
                        warn!("[Trip] Failed to clear stale session: {}", e);
                    }
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("[Trip] Session load failed for list {}: {}", self.list_id, e);
                None
            }
        }
    }

    /// Rebuild this trip from a saved session.
    ///
    /// The route is reconstructed from the snapshot's plan; indices are
    /// clamped in case the snapshot predates a structural change.
    pub fn resume(&mut self, session: TripSession) -> Result<()> {
        if session.is_completed {
            return Err(TripError::invalid_transition(
                "tripComplete",
                "resume a trip",
            ));
        }

        self.plan = session.plan_snapshot.clone();
        self.route.stores = self.plan.to_segments();
        self.route.is_multi_store = self.route.stores.len() > 1;
        self.current_store = session
            .current_store_index
            .min(self.route.stores.len().saturating_sub(1));
        self.completed = session.completed_item_ids.iter().copied().collect();
        self.has_started_shopping = session.has_started_shopping;
        self.phase = TripPhase::Shopping;
        self.loyalty_acked = false;
        self.started_at = now_ms();

        // Snapshot items already carry categories; this fills any gaps.
        self.classify_active_segment();
        for segment in &mut self.route.stores {
            for item in &mut segment.items {
                item.is_completed = self.completed.contains(&item.id);
            }
        }
        self.rebuild_active_view();
        self.current_aisle = session
            .current_aisle_index
            .min(self.route.aisle_groups.len().saturating_sub(1));

        info!(
            "[Trip] Resumed list {} at store {}, aisle {}, {} item(s) done",
            self.list_id,
            self.current_store,
            self.current_aisle,
            self.completed.len()
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Move forward or backward through the aisle groups.
    ///
    /// Backward moves past the first aisle are ignored. A forward move past
    /// the last aisle triggers end-of-store handling instead of moving.
    pub async fn move_aisle(&mut self, delta: i64) -> Result<MoveOutcome> {
        if self.phase != TripPhase::Shopping {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "move between aisles",
            ));
        }

        let target = self.current_aisle as i64 + delta;
        if target < 0 {
            return Ok(MoveOutcome::AtBoundary);
        }
        if target as usize >= self.route.aisle_groups.len() {
            self.request_end_of_store().await?;
            return Ok(MoveOutcome::EndOfStoreRequested);
        }

        self.current_aisle = target as usize;
        self.checkpoint();
        Ok(MoveOutcome::Moved)
    }

    /// Jump directly to an aisle group. Out-of-range targets and non-shopping
    /// phases are silent no-ops.
    pub fn jump_to_aisle(&mut self, index: usize) {
        if self.phase != TripPhase::Shopping || index >= self.route.aisle_groups.len() {
            return;
        }
        self.current_aisle = index;
        self.checkpoint();
    }

    // ------------------------------------------------------------------
    // Item completion
    // ------------------------------------------------------------------

    /// Toggle an item's completion state. Returns the new state.
    ///
    /// The local mutation and checkpoint happen first; the backend mirror
    /// is best-effort and a failure leaves local state intact so the
    /// shopper keeps moving offline.
    pub async fn toggle_item(&mut self, item_id: i64) -> Result<bool> {
        if self.phase != TripPhase::Shopping {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "toggle an item",
            ));
        }
        let location = self
            .locations
            .get(&item_id)
            .copied()
            .ok_or(TripError::UnknownItem { item_id })?;
        if location.store != self.current_store {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "toggle an item outside the active store",
            ));
        }

        let new_state = {
            let segment = &mut self.route.stores[self.current_store];
            let item = segment
                .items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or(TripError::UnknownItem { item_id })?;
            item.is_completed = !item.is_completed;
            item.is_completed
        };

        if new_state {
            self.completed.insert(item_id);
        } else {
            self.completed.remove(&item_id);
        }
        self.has_started_shopping = true;
        self.rebuild_active_view();
        self.checkpoint();

        if let Err(e) = self
            .list_api
            .update_item(item_id, crate::ItemPatch::completed(new_state))
            .await
        {
            warn!("[Trip] Backend toggle mirror failed for item {}: {}", item_id, e);
            return Err(e);
        }
        Ok(new_state)
    }

    // ------------------------------------------------------------------
    // End of store
    // ------------------------------------------------------------------

    /// Handle the shopper reaching the end of the current store.
    ///
    /// Order of gates: an unacknowledged loyalty card first, then the
    /// uncompleted-items decision, then segment completion.
    pub(crate) async fn request_end_of_store(&mut self) -> Result<()> {
        let has_loyalty = self.route.stores[self.current_store]
            .retailer
            .loyalty_card
            .is_some();
        if has_loyalty && !self.loyalty_acked {
            info!("[Trip] End of store: awaiting loyalty card acknowledgement");
            self.phase = TripPhase::AwaitingLoyaltyAck;
            self.checkpoint();
            return Ok(());
        }
        self.evaluate_uncompleted().await
    }

    /// Acknowledge the loyalty card prompt and continue end-of-store handling.
    pub async fn acknowledge_loyalty(&mut self) -> Result<()> {
        if self.phase != TripPhase::AwaitingLoyaltyAck {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "acknowledge the loyalty card",
            ));
        }
        self.loyalty_acked = true;
        self.phase = TripPhase::Shopping;
        self.evaluate_uncompleted().await
    }

    pub(crate) async fn evaluate_uncompleted(&mut self) -> Result<()> {
        let uncompleted = self.uncompleted_ids_in_active();
        if uncompleted.is_empty() {
            return self.finish_segment(crate::multistore::UncompletedPass::Auto, false).await;
        }
        info!(
            "[Trip] End of store with {} uncompleted item(s), awaiting decision",
            uncompleted.len()
        );
        self.phase = TripPhase::AwaitingUncompletedDecision { item_ids: uncompleted };
        self.checkpoint();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Background refinement
    // ------------------------------------------------------------------

    /// Re-classify heuristic items through the async path.
    ///
    /// Drains the refinement worklist sequentially; the latest result wins.
    /// An item moves section only when the refined confidence beats its
    /// current one and the section actually changes. Lookup failures skip
    /// the item. Returns the number of items that changed section.
    pub async fn refine_classifications(&mut self) -> usize {
        let mut ids: Vec<i64> = self.pending_refinement.drain().collect();
        ids.sort_unstable();
        let mut moved = 0;

        for id in ids {
            let Some(location) = self.locations.get(&id).copied() else {
                continue;
            };
            let Some(name) = self
                .route
                .stores
                .get(location.store)
                .and_then(|s| s.items.iter().find(|i| i.id == id))
                .map(|i| i.product_name.clone())
            else {
                continue;
            };

            let result = match self.classifier.classify_async(&name).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("[Trip] Refinement lookup failed for item {}: {}", id, e);
                    continue;
                }
            };

            // Re-resolve: the item may have moved while we were awaiting.
            let Some(location) = self.locations.get(&id).copied() else {
                continue;
            };
            let Some(item) = self
                .route
                .stores
                .get_mut(location.store)
                .and_then(|s| s.items.iter_mut().find(|i| i.id == id))
            else {
                continue;
            };

            if result.confidence <= item.confidence {
                continue;
            }
            let old_order = section_for(item.category.as_deref()).order;
            let new_order = section_for(Some(&result.category)).order;
            item.confidence = result.confidence;
            if new_order == old_order {
                continue;
            }

            debug!(
                "[Trip] Refinement moved item {} from {:?} to {}",
                id, item.category, result.category
            );
            item.shelf_location = shelf_hint(Some(&result.category), &item.product_name);
            item.category = Some(result.category);
            moved += 1;
            if location.store == self.current_store {
                self.rebuild_active_view();
            }
        }

        moved
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Classify the active segment's items, queueing heuristic results for
    /// background refinement.
    pub(crate) fn classify_active_segment(&mut self) {
        let segment = &mut self.route.stores[self.current_store];
        let candidates = classify_items(&mut segment.items, &self.classifier);
        self.pending_refinement.extend(candidates);
    }

    /// Regenerate the derived view of the active segment: aisle groups,
    /// the duration estimate, and the item location index. Clamps the
    /// aisle cursor after structural changes.
    pub(crate) fn rebuild_active_view(&mut self) {
        let active = &self.route.stores[self.current_store];
        self.route.aisle_groups = group_into_aisles(&active.items);
        self.route.estimated_minutes =
            estimate_minutes(self.route.aisle_groups.len(), &active.items);

        self.locations.clear();
        for (store_idx, segment) in self.route.stores.iter().enumerate() {
            for item in &segment.items {
                let aisle = if store_idx == self.current_store {
                    self.route
                        .aisle_groups
                        .iter()
                        .position(|g| g.order == section_for(item.category.as_deref()).order)
                } else {
                    None
                };
                self.locations
                    .insert(item.id, ItemLocation { store: store_idx, aisle });
            }
        }

        let max_aisle = self.route.aisle_groups.len().saturating_sub(1);
        if self.current_aisle > max_aisle {
            self.current_aisle = max_aisle;
        }
    }

    /// Snapshot the current trip state for the session store.
    pub(crate) fn snapshot(&self) -> TripSession {
        let plan_snapshot = match &self.plan {
            PlanInput::SingleStore { .. } => PlanInput::SingleStore {
                retailer: self.route.stores[0].retailer.clone(),
                items: self.route.stores[0].items.clone(),
            },
            PlanInput::MultiStore { .. } => PlanInput::MultiStore {
                stores: self.route.stores.clone(),
            },
            PlanInput::BareList { .. } => PlanInput::BareList {
                items: self.route.stores[0].items.clone(),
            },
        };
        TripSession {
            list_id: self.list_id,
            plan_snapshot,
            current_store_index: self.current_store,
            current_aisle_index: self.current_aisle,
            completed_item_ids: self.completed.iter().copied().collect(),
            has_started_shopping: self.has_started_shopping,
            is_completed: self.phase == TripPhase::TripComplete,
            timestamp: now_ms(),
        }
    }

    /// Force a session write immediately, for callers about to lose
    /// visibility (app backgrounded, page unload). Same write discipline
    /// as the automatic checkpoints.
    pub fn flush(&mut self) {
        self.checkpoint();
    }

    /// Persist a checkpoint, once the shopper has actually started.
    ///
    /// Trips that were only browsed (no toggles, no dispositions) leave no
    /// record behind. Save failures are logged, never surfaced.
    pub(crate) fn checkpoint(&mut self) {
        if !self.has_started_shopping {
            return;
        }
        let snapshot = self.snapshot();
        if let Err(e) = self.sessions.save(self.list_id, &snapshot) {
            warn!("[Trip] Checkpoint save failed for list {}: {}", self.list_id, e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SESSION_MAX_AGE_MS;
    use crate::testutil::{item, multi_store_engine, retailer, single_store_engine};

    #[tokio::test]
    async fn test_route_built_on_start() {
        // Six items across three categories
        let engine = single_store_engine(vec![
            item(1, "Apples"),
            item(2, "Bananas"),
            item(3, "Milk"),
            item(4, "Cheddar cheese"),
            item(5, "Bread"),
            item(6, "Bagels"),
        ]);

        assert_eq!(*engine.phase(), TripPhase::Shopping);
        let groups = &engine.route().aisle_groups;
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].name, "Produce");
        assert_eq!(groups[1].name, "Bakery");
        assert_eq!(groups[2].name, "Dairy");
        assert_eq!(engine.route().estimated_minutes, 15);
    }

    #[tokio::test]
    async fn test_empty_multi_store_plan_starts_cleanly() {
        use crate::session::MemorySessionStore;
        use crate::testutil::{MockListApi, RecordingAnalytics};
        use crate::{KeywordClassifier, PlanInput};

        // A plan payload with no stores is a valid (if useless) boundary
        // input; it must start as an empty trip, not panic
        let mut engine = TripEngine::start(
            7,
            PlanInput::MultiStore { stores: vec![] },
            KeywordClassifier::new(),
            MockListApi::default(),
            RecordingAnalytics::default(),
            MemorySessionStore::new(),
        );

        assert_eq!(*engine.phase(), TripPhase::Shopping);
        assert!(engine.route().aisle_groups.is_empty());
        assert_eq!(engine.route().stores.len(), 1);

        // Walking forward finds nothing outstanding and finishes the trip
        assert_eq!(
            engine.move_aisle(1).await.unwrap(),
            MoveOutcome::EndOfStoreRequested
        );
        assert_eq!(*engine.phase(), TripPhase::TripComplete);
    }

    #[tokio::test]
    async fn test_aisle_navigation_boundaries() {
        let mut engine = single_store_engine(vec![item(1, "Apples"), item(2, "Milk")]);

        // Backward past the first aisle is ignored
        assert_eq!(engine.move_aisle(-1).await.unwrap(), MoveOutcome::AtBoundary);
        assert_eq!(engine.current_aisle_index(), 0);

        assert_eq!(engine.move_aisle(1).await.unwrap(), MoveOutcome::Moved);
        assert_eq!(engine.current_aisle_index(), 1);

        // Forward past the last aisle triggers end-of-store handling;
        // nothing is completed, so the decision phase is entered
        assert_eq!(
            engine.move_aisle(1).await.unwrap(),
            MoveOutcome::EndOfStoreRequested
        );
        assert!(matches!(
            engine.phase(),
            TripPhase::AwaitingUncompletedDecision { .. }
        ));
    }

    #[tokio::test]
    async fn test_toggle_updates_local_and_backend() {
        let mut engine = single_store_engine(vec![item(1, "Milk")]);

        assert!(engine.toggle_item(1).await.unwrap());
        assert!(engine.route().stores[0].items[0].is_completed);
        assert!(engine.has_started_shopping);

        let patches = engine.list_api.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, 1);
        assert_eq!(patches[0].1.is_completed, Some(true));
    }

    #[tokio::test]
    async fn test_toggle_survives_backend_failure() {
        let mut engine = single_store_engine(vec![item(1, "Milk")]);
        engine.list_api.fail_patches.lock().unwrap().insert(1);

        let err = engine.toggle_item(1).await.unwrap_err();
        assert!(matches!(err, TripError::Backend { .. }));
        // Local state kept: the shopper keeps going offline
        assert!(engine.route().stores[0].items[0].is_completed);
        assert!(engine.completed.contains(&1));
    }

    #[tokio::test]
    async fn test_toggle_unknown_item() {
        let mut engine = single_store_engine(vec![item(1, "Milk")]);
        let err = engine.toggle_item(999).await.unwrap_err();
        assert!(matches!(err, TripError::UnknownItem { item_id: 999 }));
    }

    #[tokio::test]
    async fn test_toggle_rejected_for_inactive_store() {
        let mut engine = multi_store_engine(vec![
            (retailer(1, "A"), vec![item(1, "Milk")]),
            (retailer(2, "B"), vec![item(2, "Soap")]),
        ]);

        let err = engine.toggle_item(2).await.unwrap_err();
        assert!(matches!(err, TripError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_loyalty_gate_before_uncompleted_decision() {
        let mut engine = multi_store_engine(vec![
            (retailer(1, "A").with_card("A-100"), vec![item(1, "Milk")]),
            (retailer(2, "B"), vec![item(2, "Soap")]),
        ]);

        engine.move_aisle(1).await.unwrap();
        assert_eq!(*engine.phase(), TripPhase::AwaitingLoyaltyAck);

        // Ack falls through to the uncompleted decision
        engine.acknowledge_loyalty().await.unwrap();
        assert!(matches!(
            engine.phase(),
            TripPhase::AwaitingUncompletedDecision { .. }
        ));
    }

    #[tokio::test]
    async fn test_loyalty_ack_wrong_phase() {
        let mut engine = single_store_engine(vec![item(1, "Milk")]);
        let err = engine.acknowledge_loyalty().await.unwrap_err();
        assert!(matches!(err, TripError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_no_checkpoint_before_first_action() {
        let mut engine = single_store_engine(vec![item(1, "Apples"), item(2, "Milk")]);

        // Navigation alone never writes a session, even when forced
        engine.move_aisle(1).await.unwrap();
        engine.jump_to_aisle(0);
        engine.flush();
        assert!(engine.sessions.is_empty());

        // First toggle starts the trip and the checkpoints
        engine.toggle_item(1).await.unwrap();
        assert_eq!(engine.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_round_trip() {
        let mut engine = single_store_engine(vec![
            item(1, "Apples"),
            item(2, "Milk"),
            item(3, "Bread"),
        ]);
        engine.toggle_item(2).await.unwrap();
        engine.move_aisle(1).await.unwrap();

        let session = engine.check_resumable().expect("session should exist");
        assert!(session.has_started_shopping);

        let mut resumed = single_store_engine(vec![
            item(1, "Apples"),
            item(2, "Milk"),
            item(3, "Bread"),
        ]);
        resumed.resume(session).unwrap();

        assert_eq!(resumed.current_aisle_index(), 1);
        assert!(resumed.completed.contains(&2));
        assert!(resumed.route().stores[0].items.iter().any(|i| i.id == 2 && i.is_completed));
        assert!(resumed.has_started_shopping);
    }

    #[tokio::test]
    async fn test_stale_session_not_resumable() {
        let mut engine = single_store_engine(vec![item(1, "Milk")]);
        engine.toggle_item(1).await.unwrap();

        // Age the stored record past the window
        let mut session = engine.sessions.load(7).unwrap().unwrap();
        session.timestamp -= SESSION_MAX_AGE_MS + 1;
        engine.sessions.save(7, &session).unwrap();

        assert!(engine.check_resumable().is_none());
        // Stale record was cleared
        assert!(engine.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_refinement_moves_item() {
        use crate::testutil::{engine_with_classifier, ScriptedClassifier};

        // The fast path can't place "Dragon snack mix"; the async path is
        // scripted to say produce with higher confidence.
        let classifier = ScriptedClassifier::new()
            .with_override("Dragon snack mix", "produce", 0.95);
        let mut engine = engine_with_classifier(
            vec![item(1, "Dragon snack mix"), item(2, "Milk")],
            classifier,
        );
        assert!(engine.pending_refinement.contains(&1));

        let moved = engine.refine_classifications().await;
        assert_eq!(moved, 1);
        assert!(engine.pending_refinement.is_empty());

        let groups = &engine.route().aisle_groups;
        assert_eq!(groups[0].name, "Produce");
        assert!(groups[0].items.iter().any(|i| i.id == 1));
    }

    #[tokio::test]
    async fn test_refinement_respects_confidence() {
        use crate::testutil::{engine_with_classifier, ScriptedClassifier};

        // Lower refined confidence never displaces the current category
        let classifier = ScriptedClassifier::new().with_override("Milk", "pantry", 0.1);
        let mut engine = engine_with_classifier(vec![item(1, "Milk")], classifier);

        let moved = engine.refine_classifications().await;
        assert_eq!(moved, 0);
        assert_eq!(
            engine.route().stores[0].items[0].category.as_deref(),
            Some("dairy")
        );
    }
}
