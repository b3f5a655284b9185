//! Categories Domain
//!
//! Hierarchical product categories: a forest at most five levels deep where
//! every category records its depth and the comma-joined ids of its ancestors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Service   │  ← Hierarchy rules, cascades, validation
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐     ┌─────────────┐
//! │ Repository  │ ──▶ │    Tree     │  ← Pure placement / forest helpers
//! └──────┬──────┘     └─────────────┘
//!        │
//! ┌──────▼──────┐
//! │   Models    │  ← Entities, DTOs, enums
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_categories::{
//!     handlers,
//!     repository::InMemoryCategoryRepository,
//!     service::CategoryService,
//! };
//!
//! // Create repository and service
//! let repository = InMemoryCategoryRepository::new();
//! let service = CategoryService::new(repository);
//!
//! // Create Axum router
//! let router = handlers::router(service);
//! ```

pub mod entity;
pub mod error;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod tree;

// Re-export commonly used types
pub use error::{CategoryError, CategoryResult};
pub use models::{
    BatchUpdateResult, Category, CategoryDetail, CategoryFilter, CategoryPage, CategoryStatus,
    CategoryTreeNode, CreateCategory, MAX_DEPTH, MoveCategory, TreeFilter, UpdateCategory,
};
pub use postgres::PgCategoryRepository;
pub use repository::{CategoryRepository, InMemoryCategoryRepository};
pub use service::CategoryService;
