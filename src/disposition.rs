//! Item disposition flows.
//!
//! When a shopper deals with an item they decide one of four things: they
//! found it, they will get it some future trip, it should come off the
//! list entirely, or it should move to a later store in this plan.
//!
//! Local-first versus remote-first: marking an item found keeps working
//! offline (backend mirror is best-effort), while the destructive flows
//! (defer, remove, migrate) require the backend write to land before or
//! get rolled back after the local change.

use log::{info, warn};

use crate::backend::{AnalyticsSink, ListApi, MovedItem};
use crate::classify::Classifier;
use crate::error::{Result, TripError};
use crate::route::shelf_hint;
use crate::session::SessionStore;
use crate::trip::{TripEngine, TripPhase};
use crate::ItemPatch;

/// Note attached to items deferred to a later trip.
pub const DEFERRED_NOTE: &str = "Saved for a future trip";

/// What the shopper decided about a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// In the cart. Completes the item.
    Found,
    /// Not buying today; keep it on the list for a later trip.
    LeaveForFutureTrip,
    /// Remove it from the canonical list entirely.
    RemoveFromList,
    /// This store doesn't have it; try the next store in the plan.
    MigrateToNextStore,
}

impl<C, L, A, S> TripEngine<C, L, A, S>
where
    C: Classifier,
    L: ListApi,
    A: AnalyticsSink,
    S: SessionStore,
{
    /// Apply a disposition decision to an item in the active segment.
    pub async fn dispose(&mut self, item_id: i64, action: Disposition) -> Result<()> {
        if self.phase != TripPhase::Shopping {
            return Err(TripError::invalid_transition(
                self.phase.phase_name(),
                "dispose of an item",
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
                "dispose of an item outside the active store",
            ));
        }

        match action {
            Disposition::Found => self.dispose_found(item_id).await,
            Disposition::LeaveForFutureTrip => self.dispose_defer(item_id).await,
            Disposition::RemoveFromList => self.dispose_remove(item_id).await,
            Disposition::MigrateToNextStore => self.dispose_migrate(item_id).await,
        }
    }

    /// Local-first: the shopper has the item in hand, the mirror can wait.
    async fn dispose_found(&mut self, item_id: i64) -> Result<()> {
        {
            let segment = &mut self.route.stores[self.current_store];
            let item = segment
                .items
                .iter_mut()
                .find(|i| i.id == item_id)
                .ok_or(TripError::UnknownItem { item_id })?;
            item.is_completed = true;
        }
        self.completed.insert(item_id);
        self.has_started_shopping = true;
        self.rebuild_active_view();
        self.checkpoint();

        if let Err(e) = self
            .list_api
            .update_item(item_id, ItemPatch::completed(true))
            .await
        {
            warn!("[Disposition] Found mirror failed for item {}: {}", item_id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Remote-first: the deferral note must land on the canonical list
    /// before the item leaves this trip's view.
    async fn dispose_defer(&mut self, item_id: i64) -> Result<()> {
        let mut patch = ItemPatch::notes(DEFERRED_NOTE);
        patch.is_completed = Some(false);
        self.list_api.update_item(item_id, patch).await?;

        self.completed.remove(&item_id);
        {
            let segment = &mut self.route.stores[self.current_store];
            if let Some(item) = segment.items.iter_mut().find(|i| i.id == item_id) {
                item.is_completed = false;
                item.notes = Some(DEFERRED_NOTE.to_string());
            }
        }
        self.has_started_shopping = true;
        info!("[Disposition] Item {} deferred to a future trip", item_id);
        self.prune_and_advance(item_id).await
    }

    /// Remote-first: never drop an item locally that still exists upstream.
    async fn dispose_remove(&mut self, item_id: i64) -> Result<()> {
        self.list_api.delete_item(item_id).await?;

        self.completed.remove(&item_id);
        self.has_started_shopping = true;
        info!("[Disposition] Item {} removed from the list", item_id);
        self.prune_and_advance(item_id).await
    }

    /// Optimistic with rollback: the move is applied locally, then mirrored;
    /// a failed mirror restores the pre-move route.
    async fn dispose_migrate(&mut self, item_id: i64) -> Result<()> {
        let next_store = self.current_store + 1;
        if next_store >= self.route.stores.len() {
            return Err(TripError::NoNextStore {
                item_id: Some(item_id),
            });
        }

        let rollback = self.route.clone();
        let from_name = self.route.stores[self.current_store].retailer.name.clone();
        let to_name = self.route.stores[next_store].retailer.name.clone();
        let to_retailer_id = self.route.stores[next_store].retailer.id;
        let audit_note = format!("Moved from {} to {}", from_name, to_name);

        let mut item = {
            let segment = &mut self.route.stores[self.current_store];
            let idx = segment
                .items
                .iter()
                .position(|i| i.id == item_id)
                .ok_or(TripError::UnknownItem { item_id })?;
            segment.items.remove(idx)
        };
        self.completed.remove(&item_id);
        item.is_completed = false;
        item.suggested_retailer_id = Some(to_retailer_id);
        item.notes = Some(audit_note.clone());
        item.shelf_location = shelf_hint(item.category.as_deref(), &item.product_name);

        let target = &mut self.route.stores[next_store];
        if !target.items.iter().any(|i| i.id == item_id) {
            let product_name = item.product_name.clone();
            target.items.push(item);
            self.moved_items.push(MovedItem {
                id: item_id,
                product_name,
                from_retailer: from_name.clone(),
                to_retailer: to_name.clone(),
            });
        }
        self.has_started_shopping = true;
        self.rebuild_active_view();

        if let Err(e) = self
            .list_api
            .update_item(item_id, ItemPatch::reassign(to_retailer_id, audit_note))
            .await
        {
            warn!(
                "[Disposition] Migration mirror failed for item {}, rolling back: {}",
                item_id, e
            );
            self.route = rollback;
            self.moved_items.retain(|m| m.id != item_id);
            self.rebuild_active_view();
            return Err(e);
        }

        info!(
            "[Disposition] Item {} moved from '{}' to '{}'",
            item_id, from_name, to_name
        );
        self.checkpoint();
        Ok(())
    }

    /// Drop an item from the active segment and keep the shopper's position
    /// sensible: stay in the same section if it survives, fall onto the next
    /// section if the shopper's section was pruned, and trigger end-of-store
    /// handling when nothing in this store is left to walk to.
    async fn prune_and_advance(&mut self, item_id: i64) -> Result<()> {
        let old_aisle = self.current_aisle;
        let standing_order = self.route.aisle_groups.get(old_aisle).map(|g| g.order);

        {
            let segment = &mut self.route.stores[self.current_store];
            segment.items.retain(|i| i.id != item_id);
        }
        self.rebuild_active_view();

        if self.route.aisle_groups.is_empty() {
            self.checkpoint();
            return self.request_end_of_store().await;
        }

        let surviving =
            standing_order.and_then(|o| self.route.aisle_groups.iter().position(|g| g.order == o));
        match surviving {
            Some(pos) => self.current_aisle = pos,
            None => {
                if old_aisle >= self.route.aisle_groups.len() {
                    // The pruned section was the last one; the store is walked
                    self.checkpoint();
                    return self.request_end_of_store().await;
                }
                // Index now points at the section that followed the pruned one
                self.current_aisle = old_aisle;
            }
        }
        self.checkpoint();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
