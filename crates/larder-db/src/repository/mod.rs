//! # Repository Module
//!
//! Database repository implementations for Larder.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  larder-engine adapter                                                 │
//! │       │                                                                 │
//! │       │  db.inventory().conditional_subtract(id, store, 0.5, v)        │
//! │       ▼                                                                 │
//! │  InventoryRepository                                                   │
//! │  ├── find_by_name(&self, store_id, name)                               │
//! │  ├── conditional_subtract(&self, id, store_id, amount, version)        │
//! │  ├── restore(&self, id, store_id, amount)                              │
//! │  └── append_movement(&self, movement)                                  │
//! │       │                                                                 │
//! │       │  SQL Query (guard triggers fire here)                          │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock rows and movement log
//! - [`RecipeRepository`](recipe::RecipeRepository) - Products and recipe templates
//! - [`OutcomeRepository`](outcome::OutcomeRepository) - Deduction outcomes

pub mod inventory;
pub mod outcome;
pub mod recipe;
