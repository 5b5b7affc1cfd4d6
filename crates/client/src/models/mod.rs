//! Domain models and their backend row mappings.
//!
//! Each submodule owns the table name and column mapping for its entity so
//! repositories never spell out raw column names themselves.

pub mod cart;
pub mod home;
pub mod purchase;
pub mod recipe;
pub mod session;

pub use cart::CartLine;
pub use home::HomeStats;
pub use purchase::{PurchaseRecord, PurchaseWithRecipe, PurchasedRecipe};
pub use recipe::{NewRecipe, Recipe, RecipePatch, RecipeSummary};
pub use session::{AuthSession, CurrentUser};
