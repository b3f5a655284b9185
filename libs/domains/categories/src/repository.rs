use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CategoryError, CategoryResult};
use crate::models::{Category, CategoryStatus};
use crate::tree::Placement;

/// Which parent a query selects on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ParentFilter {
    #[default]
    Any,
    /// Categories without a parent
    TopLevel,
    Is(i64),
    AnyOf(Vec<i64>),
}

/// Result ordering for [`CategoryQuery`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryOrder {
    #[default]
    Id,
    /// level asc, sort asc, created asc
    Tree,
    /// sort desc, created desc
    Listing,
    /// sort desc, created asc
    TopLevel,
}

/// Predicate over categories, translated by each store into its own query language
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryQuery {
    pub parent: ParentFilter,
    pub ids: Option<Vec<i64>>,
    /// Exact name match
    pub name: Option<String>,
    /// Substring name match
    pub name_contains: Option<String>,
    pub exclude_id: Option<i64>,
    pub level: Option<i32>,
    pub max_level: Option<i32>,
    pub status: Option<CategoryStatus>,
    pub show_in_nav: Option<bool>,
    pub order: CategoryOrder,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl CategoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct children of `id`
    pub fn children_of(id: i64) -> Self {
        Self {
            parent: ParentFilter::Is(id),
            ..Self::default()
        }
    }

    /// The sibling group identified by `parent_id`, `None` being the top level
    pub fn siblings(parent_id: Option<i64>) -> Self {
        Self {
            parent: parent_id.map_or(ParentFilter::TopLevel, ParentFilter::Is),
            ..Self::default()
        }
    }

    pub fn with_ids(ids: Vec<i64>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    pub fn ordered(mut self, order: CategoryOrder) -> Self {
        self.order = order;
        self
    }

    /// Whether `category` satisfies every predicate (ordering and paging aside).
    pub fn matches(&self, category: &Category) -> bool {
        let parent_matches = match &self.parent {
            ParentFilter::Any => true,
            ParentFilter::TopLevel => category.parent_id.is_none(),
            ParentFilter::Is(id) => category.parent_id == Some(*id),
            ParentFilter::AnyOf(ids) => category.parent_id.is_some_and(|p| ids.contains(&p)),
        };

        parent_matches
            && self.ids.as_ref().is_none_or(|ids| ids.contains(&category.id))
            && self.name.as_ref().is_none_or(|name| &category.name == name)
            && self
                .name_contains
                .as_ref()
                .is_none_or(|needle| category.name.contains(needle.as_str()))
            && self.exclude_id != Some(category.id)
            && self.level.is_none_or(|level| category.level == level)
            && self.max_level.is_none_or(|max| category.level <= max)
            && self.status.is_none_or(|status| category.status == status)
            && self.show_in_nav.is_none_or(|flag| category.show_in_nav == flag)
    }

    fn compare(&self, a: &Category, b: &Category) -> Ordering {
        match self.order {
            CategoryOrder::Id => a.id.cmp(&b.id),
            CategoryOrder::Tree => a
                .level
                .cmp(&b.level)
                .then(a.sort.cmp(&b.sort))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id)),
            CategoryOrder::Listing => b
                .sort
                .cmp(&a.sort)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id)),
            CategoryOrder::TopLevel => b
                .sort
                .cmp(&a.sort)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id)),
        }
    }
}

/// Fields of a category about to be inserted. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub image: Option<String>,
    pub parent_id: Option<i64>,
    pub level: i32,
    pub path: String,
    pub sort: i32,
    pub show_in_nav: bool,
    pub status: CategoryStatus,
    /// Position of the parent `level` and `path` were computed from. When set,
    /// the insert fails with `ConcurrentModification` if the parent has moved.
    pub parent_snapshot: Option<HierarchySnapshot>,
}

/// Partial field update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub icon: Option<Option<String>>,
    pub image: Option<Option<String>>,
    pub parent_id: Option<Option<i64>>,
    pub level: Option<i32>,
    pub path: Option<String>,
    pub sort: Option<i32>,
    pub show_in_nav: Option<bool>,
    pub status: Option<CategoryStatus>,
}

impl CategoryChanges {
    /// Moves a category to `placement` (parent, level and path).
    pub fn placement(placement: &Placement) -> Self {
        Self {
            parent_id: Some(placement.parent_id),
            level: Some(placement.level),
            path: Some(placement.path.clone()),
            ..Self::default()
        }
    }

    /// Re-stamps level and path while keeping the parent.
    pub fn restamp(placement: &Placement) -> Self {
        Self {
            level: Some(placement.level),
            path: Some(placement.path.clone()),
            ..Self::default()
        }
    }

    pub fn status(status: CategoryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn show_in_nav(show_in_nav: bool) -> Self {
        Self {
            show_in_nav: Some(show_in_nav),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name = name.clone();
        }
        if let Some(description) = &self.description {
            category.description = description.clone();
        }
        if let Some(icon) = &self.icon {
            category.icon = icon.clone();
        }
        if let Some(image) = &self.image {
            category.image = image.clone();
        }
        if let Some(parent_id) = self.parent_id {
            category.parent_id = parent_id;
        }
        if let Some(level) = self.level {
            category.level = level;
        }
        if let Some(path) = &self.path {
            category.path = path.clone();
        }
        if let Some(sort) = self.sort {
            category.sort = sort;
        }
        if let Some(show_in_nav) = self.show_in_nav {
            category.show_in_nav = show_in_nav;
        }
        if let Some(status) = self.status {
            category.status = status;
        }
        category.updated_at = Utc::now();
    }
}

/// Hierarchy position a write was planned against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchySnapshot {
    pub parent_id: Option<i64>,
    pub path: String,
}

impl From<&Category> for HierarchySnapshot {
    fn from(category: &Category) -> Self {
        Self {
            parent_id: category.parent_id,
            path: category.path.clone(),
        }
    }
}

/// A single row write inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryWrite {
    pub id: i64,
    pub changes: CategoryChanges,
    /// When set, the write only applies if the row still has this parent and path
    pub expected: Option<HierarchySnapshot>,
    /// When set, the write only applies if the row has exactly this many children
    pub expected_children: Option<u64>,
}

impl CategoryWrite {
    /// A write guarded by the category's current hierarchy position.
    pub fn guarded(category: &Category, changes: CategoryChanges) -> Self {
        Self {
            id: category.id,
            changes,
            expected: Some(category.into()),
            expected_children: None,
        }
    }

    /// Changes nothing, but fails the batch unless the row still sits where it was read.
    pub fn check(category: &Category) -> Self {
        Self::guarded(category, CategoryChanges::default())
    }

    /// Also require the row to still have `children` direct children.
    pub fn with_children(mut self, children: u64) -> Self {
        self.expected_children = Some(children);
        self
    }
}

/// Repository trait for Category persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert a new category, assigning its id and timestamps
    async fn insert(&self, input: NewCategory) -> CategoryResult<Category>;

    /// Get a category by ID
    async fn get_by_id(&self, id: i64) -> CategoryResult<Option<Category>>;

    /// Categories matching a query, ordered and paged as it requests
    async fn find(&self, query: CategoryQuery) -> CategoryResult<Vec<Category>>;

    /// Number of categories matching a query, ignoring paging
    async fn count(&self, query: CategoryQuery) -> CategoryResult<u64>;

    /// Apply every write or none of them. Fails with `ConcurrentModification`
    /// when a guarded row no longer matches its snapshot.
    async fn update_fields(&self, writes: Vec<CategoryWrite>) -> CategoryResult<u64>;

    /// Delete a category by ID
    async fn delete(&self, id: i64) -> CategoryResult<bool>;
}

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<i64, Category>,
    next_id: i64,
}

impl Table {
    /// Sibling-name backstop mirroring the unique `(parent_id, name)` index.
    fn name_taken(&self, parent_id: Option<i64>, name: &str, except: &HashSet<i64>) -> bool {
        self.rows
            .values()
            .any(|c| !except.contains(&c.id) && c.parent_id == parent_id && c.name == name)
    }

    fn child_count(&self, id: i64) -> u64 {
        self.rows.values().filter(|c| c.parent_id == Some(id)).count() as u64
    }
}

/// In-memory implementation of CategoryRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryCategoryRepository {
    table: Arc<RwLock<Table>>,
}

impl InMemoryCategoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn insert(&self, input: NewCategory) -> CategoryResult<Category> {
        let mut table = self.table.write().await;

        if table.name_taken(input.parent_id, &input.name, &HashSet::new()) {
            return Err(CategoryError::DuplicateName(input.name));
        }
        if let Some(parent_id) = input.parent_id {
            let parent = table
                .rows
                .get(&parent_id)
                .ok_or(CategoryError::ParentNotFound(parent_id))?;
            if input
                .parent_snapshot
                .as_ref()
                .is_some_and(|expected| *expected != HierarchySnapshot::from(parent))
            {
                return Err(CategoryError::ConcurrentModification(parent_id));
            }
        }

        table.next_id += 1;
        let now = Utc::now();
        let category = Category {
            id: table.next_id,
            name: input.name,
            description: input.description,
            icon: input.icon,
            image: input.image,
            parent_id: input.parent_id,
            level: input.level,
            path: input.path,
            sort: input.sort,
            show_in_nav: input.show_in_nav,
            status: input.status,
            product_count: 0,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(category.id, category.clone());

        tracing::debug!(category_id = category.id, parent_id = ?category.parent_id, "Inserted category row");
        Ok(category)
    }

    async fn get_by_id(&self, id: i64) -> CategoryResult<Option<Category>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find(&self, query: CategoryQuery) -> CategoryResult<Vec<Category>> {
        let table = self.table.read().await;

        let mut result: Vec<Category> = table
            .rows
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        result.sort_by(|a, b| query.compare(a, b));

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(result.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, query: CategoryQuery) -> CategoryResult<u64> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|c| query.matches(c)).count() as u64)
    }

    async fn update_fields(&self, writes: Vec<CategoryWrite>) -> CategoryResult<u64> {
        let mut table = self.table.write().await;

        // Stage every write on copies so a failure leaves the table untouched
        let mut staged: BTreeMap<i64, Category> = BTreeMap::new();
        for write in &writes {
            let current = match staged.get(&write.id) {
                Some(row) => row.clone(),
                None => table
                    .rows
                    .get(&write.id)
                    .cloned()
                    .ok_or(CategoryError::NotFound(write.id))?,
            };

            if let Some(expected) = &write.expected
                && (current.parent_id != expected.parent_id || current.path != expected.path)
            {
                return Err(CategoryError::ConcurrentModification(write.id));
            }
            if let Some(expected) = write.expected_children
                && table.child_count(write.id) != expected
            {
                return Err(CategoryError::ConcurrentModification(write.id));
            }
            if write.changes.is_empty() {
                continue;
            }

            let mut updated = current;
            write.changes.apply_to(&mut updated);
            staged.insert(updated.id, updated);
        }

        let touched: HashSet<i64> = staged.keys().copied().collect();
        for (index, row) in staged.values().enumerate() {
            if let Some(parent_id) = row.parent_id
                && !table.rows.contains_key(&parent_id)
            {
                return Err(CategoryError::ParentNotFound(parent_id));
            }
            let clashes_untouched = table.name_taken(row.parent_id, &row.name, &touched);
            let clashes_staged = staged
                .values()
                .skip(index + 1)
                .any(|other| other.parent_id == row.parent_id && other.name == row.name);
            if clashes_untouched || clashes_staged {
                return Err(CategoryError::DuplicateName(row.name.clone()));
            }
        }

        let affected = staged.len() as u64;
        table.rows.extend(staged);

        tracing::info!(affected, "Updated categories");
        Ok(affected)
    }

    async fn delete(&self, id: i64) -> CategoryResult<bool> {
        let mut table = self.table.write().await;

        if table.rows.values().any(|c| c.parent_id == Some(id)) {
            return Err(CategoryError::HasChildren(id));
        }

        let deleted = table.rows.remove(&id).is_some();
        if deleted {
            tracing::info!(category_id = id, "Deleted category");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_category(name: &str, parent: Option<&Category>) -> NewCategory {
        let placement = parent.map_or_else(Placement::top_level, Placement::under);
        NewCategory {
            name: name.to_string(),
            description: None,
            icon: None,
            image: None,
            parent_id: placement.parent_id,
            level: placement.level,
            path: placement.path,
            sort: 0,
            show_in_nav: true,
            status: CategoryStatus::Enabled,
            parent_snapshot: parent.map(HierarchySnapshot::from),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let repo = InMemoryCategoryRepository::new();
        let root = repo.insert(new_category("Root", None)).await.unwrap();
        let child = repo.insert(new_category("Child", Some(&root))).await.unwrap();

        assert_eq!(root.id, 1);
        assert_eq!(child.id, 2);
        assert_eq!(child.parent_id, Some(root.id));
        assert_eq!(child.path, "1");
    }

    #[tokio::test]
    async fn test_insert_rejects_sibling_name() {
        let repo = InMemoryCategoryRepository::new();
        repo.insert(new_category("Root", None)).await.unwrap();

        let result = repo.insert(new_category("Root", None)).await;
        assert!(matches!(result, Err(CategoryError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn test_find_applies_order_and_paging() {
        let repo = InMemoryCategoryRepository::new();
        for (name, sort) in [("a", 1), ("b", 3), ("c", 2)] {
            let mut input = new_category(name, None);
            input.sort = sort;
            repo.insert(input).await.unwrap();
        }

        let query = CategoryQuery {
            limit: Some(2),
            ..CategoryQuery::new().ordered(CategoryOrder::Listing)
        };
        let page = repo.find(query).await.unwrap();
        let names: Vec<_> = page.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_update_fields_is_all_or_nothing() {
        let repo = InMemoryCategoryRepository::new();
        let a = repo.insert(new_category("a", None)).await.unwrap();
        let b = repo.insert(new_category("b", None)).await.unwrap();

        let stale = CategoryWrite {
            id: b.id,
            changes: CategoryChanges::status(CategoryStatus::Disabled),
            expected: Some(HierarchySnapshot {
                parent_id: Some(a.id),
                path: a.id.to_string(),
            }),
            expected_children: None,
        };
        let result = repo
            .update_fields(vec![
                CategoryWrite::guarded(&a, CategoryChanges::status(CategoryStatus::Disabled)),
                stale,
            ])
            .await;

        assert!(matches!(result, Err(CategoryError::ConcurrentModification(id)) if id == b.id));
        let a = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(a.status, CategoryStatus::Enabled);
    }

    #[tokio::test]
    async fn test_insert_under_moved_parent_is_rejected() {
        let repo = InMemoryCategoryRepository::new();
        let a = repo.insert(new_category("a", None)).await.unwrap();
        let b = repo.insert(new_category("b", None)).await.unwrap();
        let child = new_category("child", Some(&b));

        repo.update_fields(vec![CategoryWrite::guarded(
            &b,
            CategoryChanges::placement(&Placement::under(&a)),
        )])
        .await
        .unwrap();

        let result = repo.insert(child).await;
        assert!(matches!(result, Err(CategoryError::ConcurrentModification(id)) if id == b.id));
        assert_eq!(repo.count(CategoryQuery::children_of(b.id)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_expecting_children_sees_new_child() {
        let repo = InMemoryCategoryRepository::new();
        let a = repo.insert(new_category("a", None)).await.unwrap();
        repo.insert(new_category("late", Some(&a))).await.unwrap();

        let result = repo
            .update_fields(vec![
                CategoryWrite::guarded(&a, CategoryChanges::status(CategoryStatus::Disabled))
                    .with_children(0),
            ])
            .await;

        assert!(matches!(result, Err(CategoryError::ConcurrentModification(id)) if id == a.id));
        let a = repo.get_by_id(a.id).await.unwrap().unwrap();
        assert_eq!(a.status, CategoryStatus::Enabled);
    }

    #[tokio::test]
    async fn test_check_write_changes_nothing() {
        let repo = InMemoryCategoryRepository::new();
        let a = repo.insert(new_category("a", None)).await.unwrap();

        let affected = repo.update_fields(vec![CategoryWrite::check(&a)]).await.unwrap();
        assert_eq!(affected, 0);
        assert_eq!(repo.get_by_id(a.id).await.unwrap().unwrap().updated_at, a.updated_at);
    }

    #[tokio::test]
    async fn test_delete_refuses_parent() {
        let repo = InMemoryCategoryRepository::new();
        let root = repo.insert(new_category("Root", None)).await.unwrap();
        repo.insert(new_category("Child", Some(&root))).await.unwrap();

        let result = repo.delete(root.id).await;
        assert!(matches!(result, Err(CategoryError::HasChildren(_))));
        assert!(!repo.delete(999).await.unwrap());
    }
}
