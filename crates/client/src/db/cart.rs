//! Cart repository.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use cookmaster_core::{CartLineId, Price, RecipeId, UserId};

use super::{PurchaseRepository, decode_returned, decode_rows, read_failed, write_failed};
use crate::backend::{Backend, Delete, Insert, Row, Select};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::cart::{self, CartLine};
use crate::models::purchase::PurchaseRecord;
use crate::notify::{Notice, Notifier};

/// Result of [`CartRepository::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new line was created.
    Added(CartLine),
    /// The recipe was already in the cart, or being added by another call.
    AlreadyInCart,
}

/// What a successful checkout bought.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutReceipt {
    /// One record per consumed cart line.
    pub purchases: Vec<PurchaseRecord>,
    /// Sum of the recorded prices.
    pub total: Price,
}

/// Cart lines of the signed-in user, newest first.
///
/// Duplicate suppression is client-side: a line is not added when the held
/// list or an in-flight `add` already covers the recipe. Two processes can
/// still race; only a unique constraint on the table prevents that.
pub struct CartRepository {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    purchases: Arc<PurchaseRepository>,
    lines: RwLock<Vec<CartLine>>,
    pending: Mutex<HashSet<RecipeId>>,
    checkout_running: AtomicBool,
}

impl CartRepository {
    /// Create an empty cart that records checkouts through `purchases`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Notifier,
        purchases: Arc<PurchaseRepository>,
    ) -> Self {
        Self {
            backend,
            notifier,
            purchases,
            lines: RwLock::new(Vec::new()),
            pending: Mutex::new(HashSet::new()),
            checkout_running: AtomicBool::new(false),
        }
    }

    /// Snapshot of the held lines.
    pub async fn lines(&self) -> Vec<CartLine> {
        self.lines.read().await.clone()
    }

    /// Sum of the held line prices.
    pub async fn total(&self) -> Price {
        self.lines.read().await.iter().map(|l| l.price).sum()
    }

    /// Replace the held lines with the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the query fails; the held lines are kept.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn fetch(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = self
            .backend
            .select(
                &Select::from(cart::TABLE)
                    .project(cart::projection())
                    .eq("user_id", user_id.to_string())
                    .order("created_at", false),
            )
            .await
            .map_err(|e| read_failed("cart.fetch", e))?;

        let lines = decode_rows(cart::TABLE, rows, CartLine::from_row);
        debug!(count = lines.len(), "Cart fetched");
        *self.lines.write().await = lines.clone();
        Ok(lines)
    }

    /// Add a recipe to the cart unless it is already there.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the insert fails.
    #[instrument(skip(self), fields(user_id = %user_id, recipe_id = %recipe_id))]
    pub async fn add(&self, user_id: UserId, recipe_id: RecipeId) -> Result<AddOutcome> {
        {
            let mut pending = self.pending.lock().await;
            let in_cart = self
                .lines
                .read()
                .await
                .iter()
                .any(|l| l.recipe_id == recipe_id);
            if in_cart || !pending.insert(recipe_id) {
                debug!("Recipe already in cart");
                self.notifier.publish(Notice::info(
                    "Already in cart",
                    "This recipe is already in your cart",
                ));
                return Ok(AddOutcome::AlreadyInCart);
            }
        }

        let result = self.try_add(user_id, recipe_id).await;
        self.pending.lock().await.remove(&recipe_id);

        match result {
            Ok(line) => {
                info!(line_id = %line.id, "Added to cart");
                add_breadcrumb(
                    "cart",
                    "Added recipe to cart",
                    Some(&[("recipe_id", &recipe_id.to_string())]),
                );
                self.notifier.publish(Notice::success(
                    "Added to cart",
                    format!("{} is in your cart", line.title),
                ));
                Ok(AddOutcome::Added(line))
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "cart.add",
                "Could not add to cart",
                err,
            )),
        }
    }

    async fn try_add(&self, user_id: UserId, recipe_id: RecipeId) -> Result<CartLine> {
        let mut row = Row::new();
        row.insert("user_id".into(), json!(user_id.to_string()));
        row.insert("resep_id".into(), json!(recipe_id.to_string()));
        row.insert("quantity".into(), json!(1));

        let rows = self
            .backend
            .insert(&Insert::one(cart::TABLE, row).returning(cart::projection()))
            .await?;
        let line = decode_returned(cart::TABLE, rows, CartLine::from_row)?;

        self.lines.write().await.insert(0, line.clone());
        Ok(line)
    }

    /// Remove a line by its own ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the delete fails; the line is kept.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove(&self, line_id: CartLineId) -> Result<()> {
        let result = self
            .backend
            .delete(&Delete::from(cart::TABLE).eq("id", line_id.to_string()))
            .await;

        match result {
            Ok(deleted) => {
                debug!(deleted, "Cart line deleted");
                self.lines.write().await.retain(|l| l.id != line_id);
                add_breadcrumb("cart", "Removed line from cart", None);
                self.notifier
                    .publish(Notice::success("Removed", "Recipe removed from your cart"));
                Ok(())
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "cart.remove",
                "Could not remove from cart",
                err,
            )),
        }
    }

    /// Buy every held line, then empty the cart.
    ///
    /// Purchases are recorded one line at a time. If one fails the loop
    /// stops and nothing is rolled back: earlier records stay and the cart is
    /// left as it was. The consumed lines are deleted in one batch afterwards.
    /// An empty cart returns an empty receipt without any remote call.
    ///
    /// # Errors
    ///
    /// - `AppError::CheckoutInProgress` if another checkout is running
    /// - `AppError::Checkout` if recording a purchase or clearing the cart fails
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn checkout(&self, user_id: UserId) -> Result<CheckoutReceipt> {
        let Some(_guard) = CheckoutGuard::acquire(&self.checkout_running) else {
            self.notifier.publish(Notice::info(
                "Checkout running",
                AppError::CheckoutInProgress.user_message(),
            ));
            return Err(AppError::CheckoutInProgress);
        };

        let lines = self.lines().await;
        if lines.is_empty() {
            debug!("Cart is empty, nothing to check out");
            return Ok(CheckoutReceipt::default());
        }

        add_breadcrumb(
            "checkout",
            "Checkout started",
            Some(&[("lines", &lines.len().to_string())]),
        );

        match self.try_checkout(user_id, &lines).await {
            Ok(receipt) => {
                info!(
                    purchases = receipt.purchases.len(),
                    total = receipt.total.amount(),
                    "Checkout complete"
                );
                self.notifier.publish(Notice::success(
                    "Checkout complete",
                    format!(
                        "Bought {} recipe(s) for {}",
                        receipt.purchases.len(),
                        receipt.total
                    ),
                ));
                Ok(receipt)
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "cart.checkout",
                "Checkout failed",
                err,
            )),
        }
    }

    async fn try_checkout(&self, user_id: UserId, lines: &[CartLine]) -> Result<CheckoutReceipt> {
        let total = lines.len();
        let mut purchases = Vec::with_capacity(total);

        for line in lines {
            match self
                .purchases
                .record(user_id, line.recipe_id, line.price)
                .await
            {
                Ok(record) => purchases.push(record),
                Err(err) => {
                    return Err(AppError::Checkout {
                        recorded: purchases.len(),
                        total,
                        message: err.to_string(),
                    });
                }
            }
        }

        let ids: Vec<Value> = lines.iter().map(|l| json!(l.id.to_string())).collect();
        if let Err(err) = self
            .backend
            .delete(&Delete::from(cart::TABLE).any_of("id", ids))
            .await
        {
            return Err(AppError::Checkout {
                recorded: purchases.len(),
                total,
                message: err.to_string(),
            });
        }

        let consumed: HashSet<CartLineId> = lines.iter().map(|l| l.id).collect();
        self.lines
            .write()
            .await
            .retain(|l| !consumed.contains(&l.id));

        let total_price = purchases.iter().map(|p| p.price).sum();
        Ok(CheckoutReceipt {
            purchases,
            total: total_price,
        })
    }

    /// Drop the held lines without touching the backend.
    pub async fn clear_local(&self) {
        self.lines.write().await.clear();
    }
}

/// Marks a checkout as running until dropped.
struct CheckoutGuard<'a>(&'a AtomicBool);

impl<'a> CheckoutGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
