//! Multi-store coordination.
//!
//! Finishing a store segment is a four step affair: purchased items are
//! cleared from the canonical list, the uncompleted-items decision is
//! applied, a trip report goes to analytics, and the engine either advances
//! to the next store segment or completes the trip.

use log::{debug, info, warn};

use crate::backend::{AnalyticsSink, ListApi, MovedItem, TripReport, UncompletedItem};
use crate::classify::Classifier;
use crate::error::{Result, TripError};
use crate::route::shelf_hint;
use crate::session::{now_ms, SessionStore};
use crate::trip::{TripEngine, TripPhase};
use crate::ItemPatch;

/// Note attached to items left behind when a trip ends without them.
pub const NOT_PURCHASED_NOTE: &str = "Not purchased this trip";

/// How the shopper resolves the end-of-store uncompleted items prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncompletedAction {
    /// They were all in the cart after all.
    MarkAllFound,
    /// Try them at the next store in the plan.
    MoveToNextStore,
    /// Leave them on the list for a later trip.
    SaveForNextTrip,
    /// Finish the whole trip here, remaining stores included.
    EndTripNow,
}

/// How the uncompleted-items step of segment completion was settled.
pub(crate) enum UncompletedPass {
    /// Nothing outstanding was expected; stragglers get noted as-is.
    Auto,
    /// A shopper decision already handled them; report these entries.
    Handled(Vec<UncompletedItem>),
}

impl<C, L, A, S> TripEngine<C, L, A, S>
where
    C: Classifier,
    L: ListApi,
    A: AnalyticsSink,
    S: SessionStore,
{
    /// Complete the current store segment directly.
    ///
    /// Only valid while shopping with nothing outstanding; with uncompleted
    /// items the shopper must go through the end-of-store decision instead.
    pub async fn complete_store_segment(&mut self) -> Result<()> {
        if self.phase != TripPhase::Shopping {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "complete the store",
            ));
        }
        if !self.uncompleted_ids_in_active().is_empty() {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "complete the store with items outstanding",
            ));
        }
        self.finish_segment(UncompletedPass::Auto, false).await
    }

    /// Apply the shopper's decision for the uncompleted items and finish
    /// the segment.
    pub async fn resolve_uncompleted(&mut self, action: UncompletedAction) -> Result<()> {
        let item_ids = match &self.phase {
            TripPhase::AwaitingUncompletedDecision { item_ids } => item_ids.clone(),
            _ => {
                return Err(TripError::invalid_transition(
                    self.phase.phase_name(),
                    "resolve uncompleted items",
                ));
            }
        };

        match action {
            UncompletedAction::MarkAllFound => self.resolve_mark_all_found(item_ids).await,
            UncompletedAction::MoveToNextStore => self.resolve_move_to_next(item_ids).await,
            UncompletedAction::SaveForNextTrip => {
                let entries = self.note_not_purchased(item_ids).await;
                self.finish_segment(UncompletedPass::Handled(entries), false).await
            }
            UncompletedAction::EndTripNow => {
                let entries = self.note_not_purchased(item_ids).await;
                self.finish_segment(UncompletedPass::Handled(entries), true).await
            }
        }
    }

    async fn resolve_mark_all_found(&mut self, item_ids: Vec<i64>) -> Result<()> {
        // Completing items here engages the trip the same as a toggle would
        self.has_started_shopping = true;
        for id in item_ids {
            if let Some(item) = self.route.stores[self.current_store]
                .items
                .iter_mut()
                .find(|i| i.id == id)
            {
                item.is_completed = true;
            }
            self.completed.insert(id);
            if let Err(e) = self.list_api.update_item(id, ItemPatch::completed(true)).await {
                warn!("[MultiStore] Found mirror failed for item {}: {}", id, e);
            }
        }
        self.rebuild_active_view();
        self.finish_segment(UncompletedPass::Auto, false).await
    }

    /// Move every outstanding item to the next store segment. All-or-nothing:
    /// the first failed backend write rolls the whole batch back and leaves
    /// the decision prompt open.
    async fn resolve_move_to_next(&mut self, item_ids: Vec<i64>) -> Result<()> {
        let next_store = self.current_store + 1;
        if next_store >= self.route.stores.len() {
            return Err(TripError::NoNextStore { item_id: None });
        }

        let rollback = self.route.clone();
        let moved_mark = self.moved_items.len();
        let from_name = self.route.stores[self.current_store].retailer.name.clone();
        let to_name = self.route.stores[next_store].retailer.name.clone();
        let to_retailer_id = self.route.stores[next_store].retailer.id;
        let audit_note = format!("Moved from {} to {}", from_name, to_name);
        let mut entries = Vec::with_capacity(item_ids.len());

        for id in item_ids {
            let Some(idx) = self.route.stores[self.current_store]
                .items
                .iter()
                .position(|i| i.id == id)
            else {
                continue;
            };
            let mut item = self.route.stores[self.current_store].items.remove(idx);
            self.completed.remove(&id);
            item.is_completed = false;
            item.suggested_retailer_id = Some(to_retailer_id);
            item.notes = Some(audit_note.clone());
            item.shelf_location = shelf_hint(item.category.as_deref(), &item.product_name);

            entries.push(UncompletedItem {
                id,
                product_name: item.product_name.clone(),
                reason: format!("Moved to {}", to_name),
            });

            let target = &mut self.route.stores[next_store];
            if !target.items.iter().any(|i| i.id == id) {
                self.moved_items.push(MovedItem {
                    id,
                    product_name: item.product_name.clone(),
                    from_retailer: from_name.clone(),
                    to_retailer: to_name.clone(),
                });
                target.items.push(item);
            }

            if let Err(e) = self
                .list_api
                .update_item(id, ItemPatch::reassign(to_retailer_id, audit_note.clone()))
                .await
            {
                warn!(
                    "[MultiStore] Batch move failed at item {}, rolling back: {}",
                    id, e
                );
                self.route = rollback;
                self.moved_items.truncate(moved_mark);
                self.rebuild_active_view();
                return Err(e);
            }
        }

        info!(
            "[MultiStore] Moved {} item(s) from '{}' to '{}'",
            entries.len(),
            from_name,
            to_name
        );
        self.finish_segment(UncompletedPass::Handled(entries), false).await
    }

    /// Note the outstanding items as not purchased. Best-effort on the
    /// backend side; the note always lands locally.
    async fn note_not_purchased(&mut self, item_ids: Vec<i64>) -> Vec<UncompletedItem> {
        let mut entries = Vec::with_capacity(item_ids.len());
        for id in item_ids {
            let Some(name) = self.route.stores[self.current_store]
                .items
                .iter_mut()
                .find(|i| i.id == id)
                .map(|item| {
                    item.notes = Some(NOT_PURCHASED_NOTE.to_string());
                    item.product_name.clone()
                })
            else {
                continue;
            };
            entries.push(UncompletedItem {
                id,
                product_name: name,
                reason: NOT_PURCHASED_NOTE.to_string(),
            });
            let mut patch = ItemPatch::notes(NOT_PURCHASED_NOTE);
            patch.is_completed = Some(false);
            if let Err(e) = self.list_api.update_item(id, patch).await {
                warn!("[MultiStore] Note mirror failed for item {}: {}", id, e);
            }
        }
        entries
    }

    /// Finish the active store segment.
    ///
    /// Purchased items are deleted from the canonical list in parallel and
    /// removed from the segment; a trip report goes to analytics; then the
    /// engine advances to the next segment or completes the trip.
    pub(crate) async fn finish_segment(
        &mut self,
        pass: UncompletedPass,
        end_trip: bool,
    ) -> Result<()> {
        let completed_ids: Vec<i64> = self.route.stores[self.current_store]
            .items
            .iter()
            .filter(|i| i.is_completed)
            .map(|i| i.id)
            .collect();

        // Step 1: purchased items come off the canonical list. Best-effort
        // and parallel; a failed delete leaves a completed item on the list,
        // which the shopper can clean up later.
        let delete_results = futures::future::join_all(
            completed_ids.iter().map(|&id| self.list_api.delete_item(id)),
        )
        .await;
        for (id, result) in completed_ids.iter().zip(delete_results) {
            if let Err(e) = result {
                warn!("[MultiStore] Delete failed for purchased item {}: {}", id, e);
            }
        }

        // Step 2: settle the uncompleted entries for the report.
        let uncompleted_entries = match pass {
            UncompletedPass::Handled(entries) => entries,
            UncompletedPass::Auto => self.route.stores[self.current_store]
                .items
                .iter()
                .filter(|i| !i.is_completed)
                .map(|i| UncompletedItem {
                    id: i.id,
                    product_name: i.product_name.clone(),
                    reason: NOT_PURCHASED_NOTE.to_string(),
                })
                .collect(),
        };

        // Step 3: report the segment. Analytics is observability, not
        // state; failures never block trip progress.
        let report = TripReport {
            list_id: self.list_id,
            completed_item_ids: completed_ids.clone(),
            uncompleted_items: uncompleted_entries,
            moved_items: std::mem::take(&mut self.moved_items),
            start_time: self.started_at,
            end_time: now_ms(),
            retailer_name: self.route.stores[self.current_store].retailer.name.clone(),
            plan_type: self.plan.plan_type().to_string(),
            total_stores: self.route.stores.len(),
        };
        if let Err(e) = self.analytics.trip_complete(report).await {
            debug!("[MultiStore] Trip report dropped: {}", e);
        }

        // Step 4: purchased items leave the in-memory segment too.
        self.route.stores[self.current_store]
            .items
            .retain(|i| !i.is_completed);

        let has_next = self.current_store + 1 < self.route.stores.len();
        if has_next && !end_trip {
            self.current_store += 1;
            self.current_aisle = 0;
            self.loyalty_acked = false;
            self.completed.clear();
            self.classify_active_segment();
            self.rebuild_active_view();
            self.phase = TripPhase::Shopping;
            info!(
                "[MultiStore] Advanced to store {} ('{}')",
                self.current_store,
                self.route.stores[self.current_store].retailer.name
            );
            self.checkpoint();
        } else {
            self.phase = TripPhase::TripComplete;
            info!("[MultiStore] Trip complete for list {}", self.list_id);
            // Mark the record completed before deleting it. If the delete
            // fails, the surviving record still refuses resumption; without
            // the write, a stale mid-trip checkpoint would be offered.
            if self.has_started_shopping {
                let snapshot = self.snapshot();
                if let Err(e) = self.sessions.save(self.list_id, &snapshot) {
                    warn!("[MultiStore] Failed to mark session completed: {}", e);
                }
            }
            if let Err(e) = self.sessions.clear(self.list_id) {
                warn!("[MultiStore] Failed to clear finished session: {}", e);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
