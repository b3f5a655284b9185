use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;
use validator::Validate;

use crate::error::{CategoryError, CategoryResult};
use crate::models::{
    BatchUpdateResult, Category, CategoryDetail, CategoryFilter, CategoryPage, CategoryStatus,
    CategoryTreeNode, CreateCategory, DEFAULT_TREE_LEVEL, MAX_DEPTH, MoveCategory, TreeFilter,
    UpdateCategory,
};
use crate::repository::{
    CategoryChanges, CategoryOrder, CategoryQuery, CategoryRepository, CategoryWrite,
    HierarchySnapshot, NewCategory, ParentFilter,
};
use crate::tree::{self, Placement};

/// Service layer for the category tree.
///
/// Every structural mutation holds `structure_lock` from its first read to
/// its final write and commits all of its row writes through a single
/// [`CategoryRepository::update_fields`] call. Writes carry the position and
/// child count of every row they were planned from, so a store shared with
/// other instances rejects a plan that went stale before it was applied.
pub struct CategoryService<R: CategoryRepository> {
    repository: Arc<R>,
    structure_lock: Arc<Mutex<()>>,
}

impl<R: CategoryRepository> Clone for CategoryService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            structure_lock: Arc::clone(&self.structure_lock),
        }
    }
}

/// Writes that move a category and re-stamp everything below it
struct Reparent {
    placement: Placement,
    /// Fails the move if the new parent moved after it was read
    parent_check: Option<CategoryWrite>,
    root_children: u64,
    descendant_writes: Vec<CategoryWrite>,
}

impl Reparent {
    /// The full batch: the parent check, the moved category, then its descendants.
    fn into_writes(self, root: CategoryWrite) -> Vec<CategoryWrite> {
        let mut writes: Vec<CategoryWrite> = self.parent_check.into_iter().collect();
        writes.push(root.with_children(self.root_children));
        writes.extend(self.descendant_writes);
        writes
    }
}

/// Direct child count of every parent in `categories`.
fn child_counts(categories: &[Category]) -> HashMap<i64, u64> {
    let mut counts = HashMap::new();
    for category in categories {
        if let Some(parent_id) = category.parent_id {
            *counts.entry(parent_id).or_insert(0) += 1;
        }
    }
    counts
}

impl<R: CategoryRepository> CategoryService<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository: Arc::new(repository),
            structure_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a new category under an optional parent
    #[instrument(skip(self, input), fields(category_name = %input.name, parent_id = ?input.parent_id))]
    pub async fn create_category(&self, input: CreateCategory) -> CategoryResult<Category> {
        input.validate()?;

        let _guard = self.structure_lock.lock().await;

        self.ensure_unique_name(&input.name, input.parent_id, None).await?;

        let parent = match input.parent_id {
            Some(parent_id) => Some(self.parent(parent_id).await?),
            None => None,
        };
        let placement = parent.as_ref().map_or_else(Placement::top_level, Placement::under);
        if placement.level > MAX_DEPTH {
            tracing::warn!(level = placement.level, "Rejected category deeper than the maximum");
            return Err(CategoryError::DepthExceeded {
                level: placement.level,
                max: MAX_DEPTH,
            });
        }

        let category = self
            .repository
            .insert(NewCategory {
                name: input.name,
                description: input.description,
                icon: input.icon,
                image: input.image,
                parent_id: placement.parent_id,
                level: placement.level,
                path: placement.path,
                sort: input.sort.unwrap_or(0),
                show_in_nav: input.show_in_nav.unwrap_or(true),
                status: input.status.unwrap_or_default(),
                parent_snapshot: parent.as_ref().map(HierarchySnapshot::from),
            })
            .await?;

        tracing::info!(
            category_id = category.id,
            parent_id = ?category.parent_id,
            level = category.level,
            "Created category"
        );
        Ok(category)
    }

    /// Get a category by ID
    #[instrument(skip(self), fields(category_id = id))]
    pub async fn get_category(&self, id: i64) -> CategoryResult<Category> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or(CategoryError::NotFound(id))
    }

    /// Get a category with its parent and direct children
    #[instrument(skip(self), fields(category_id = id))]
    pub async fn find_one(&self, id: i64) -> CategoryResult<CategoryDetail> {
        let category = self.get_category(id).await?;

        let parent = match category.parent_id {
            Some(parent_id) => self.repository.get_by_id(parent_id).await?,
            None => None,
        };
        let children = self
            .repository
            .find(CategoryQuery::children_of(id).ordered(CategoryOrder::Listing))
            .await?;

        Ok(CategoryDetail {
            category,
            parent,
            children,
        })
    }

    /// Paginated listing, each row carrying its parent and direct children
    pub async fn list_categories(&self, filter: CategoryFilter) -> CategoryResult<CategoryPage> {
        filter.validate()?;

        let query = CategoryQuery {
            parent: match filter.parent_id {
                Some(0) => ParentFilter::TopLevel,
                Some(parent_id) => ParentFilter::Is(parent_id),
                None => ParentFilter::Any,
            },
            name_contains: filter.name.filter(|name| !name.is_empty()),
            level: filter.level,
            status: filter.status,
            show_in_nav: filter.show_in_nav,
            ..CategoryQuery::new()
        };

        let offset = (filter.page_no - 1)
            .checked_mul(filter.page_size)
            .ok_or_else(|| CategoryError::Validation(format!("page_no {} is out of range", filter.page_no)))?;

        let total = self.repository.count(query.clone()).await?;
        let rows = self
            .repository
            .find(CategoryQuery {
                order: CategoryOrder::Listing,
                offset: Some(offset),
                limit: Some(filter.page_size),
                ..query
            })
            .await?;

        Ok(CategoryPage {
            page_data: self.with_relations(rows).await?,
            total,
            page_no: filter.page_no,
            page_size: filter.page_size,
            total_pages: total.div_ceil(filter.page_size),
        })
    }

    /// The filtered forest, down to `max_level` (3 unless given)
    pub async fn get_tree(&self, filter: TreeFilter) -> CategoryResult<Vec<CategoryTreeNode>> {
        filter.validate()?;

        let categories = self
            .repository
            .find(CategoryQuery {
                max_level: Some(filter.max_level.unwrap_or(DEFAULT_TREE_LEVEL)),
                name_contains: filter.name.filter(|name| !name.is_empty()),
                status: filter.status,
                show_in_nav: filter.show_in_nav,
                order: CategoryOrder::Tree,
                ..CategoryQuery::new()
            })
            .await?;

        Ok(tree::build_forest(categories))
    }

    /// Top-level categories, optionally restricted to one status
    pub async fn get_top_level_categories(
        &self,
        status: Option<CategoryStatus>,
    ) -> CategoryResult<Vec<Category>> {
        self.repository
            .find(CategoryQuery {
                parent: ParentFilter::TopLevel,
                status,
                order: CategoryOrder::TopLevel,
                ..CategoryQuery::new()
            })
            .await
    }

    /// Every descendant of a category, nearest levels first
    #[instrument(skip(self), fields(category_id = id))]
    pub async fn get_all_children(&self, id: i64) -> CategoryResult<Vec<Category>> {
        self.get_category(id).await?;
        self.descendants(id).await
    }

    /// Update a category. Re-parenting re-stamps the whole subtree.
    #[instrument(skip(self, input), fields(category_id = id))]
    pub async fn update_category(&self, id: i64, input: UpdateCategory) -> CategoryResult<Category> {
        input.validate()?;

        let _guard = self.structure_lock.lock().await;
        let category = self.get_category(id).await?;

        let new_parent = input.parent_id.filter(|parent_id| *parent_id != category.parent_id);
        let target_parent = new_parent.unwrap_or(category.parent_id);
        let name_changed = input.name.as_ref().is_some_and(|name| *name != category.name);

        if name_changed || new_parent.is_some() {
            let name = input.name.as_deref().unwrap_or(&category.name);
            self.ensure_unique_name(name, target_parent, Some(id)).await?;
        }

        let mut changes = CategoryChanges {
            name: input.name,
            description: input.description.map(Some),
            icon: input.icon.map(Some),
            image: input.image.map(Some),
            sort: input.sort,
            show_in_nav: input.show_in_nav,
            status: input.status,
            ..CategoryChanges::default()
        };

        let mut writes = Vec::new();
        if let Some(parent_id) = new_parent {
            let reparent = self.plan_reparent(&category, parent_id).await?;
            changes.parent_id = Some(reparent.placement.parent_id);
            changes.level = Some(reparent.placement.level);
            changes.path = Some(reparent.placement.path.clone());
            writes = reparent.into_writes(CategoryWrite::guarded(&category, changes));
        } else if !changes.is_empty() {
            writes.push(CategoryWrite::guarded(&category, changes));
        }

        self.commit(writes).await?;
        tracing::info!(category_id = id, "Updated category");
        self.get_category(id).await
    }

    /// Move a category under a new parent (or to the top level) and/or change its sort weight
    #[instrument(skip(self, input), fields(category_id = id))]
    pub async fn move_category(&self, id: i64, input: MoveCategory) -> CategoryResult<Category> {
        input.validate()?;

        let _guard = self.structure_lock.lock().await;
        let category = self.get_category(id).await?;

        let mut changes = CategoryChanges {
            sort: input.new_sort,
            ..CategoryChanges::default()
        };
        let mut reparent = None;

        if let Some(parent_id) = input.new_parent_id {
            if parent_id == Some(id) {
                tracing::warn!(category_id = id, "Rejected move of a category under itself");
                return Err(CategoryError::CircularReference { id, parent_id: id });
            }
            if parent_id != category.parent_id {
                self.ensure_unique_name(&category.name, parent_id, Some(id)).await?;
            }

            let plan = self.plan_reparent(&category, parent_id).await?;
            changes = CategoryChanges {
                sort: input.new_sort,
                ..CategoryChanges::placement(&plan.placement)
            };
            reparent = Some(plan);
        }

        if !changes.is_empty() {
            let root = CategoryWrite::guarded(&category, changes);
            let (moved, writes) = match reparent {
                Some(plan) => (plan.descendant_writes.len(), plan.into_writes(root)),
                None => (0, vec![root]),
            };
            self.commit(writes).await?;
            tracing::info!(category_id = id, descendants = moved, "Moved category");
        }

        self.get_category(id).await
    }

    /// Set the status of a category and all of its descendants
    #[instrument(skip(self), fields(category_id = id))]
    pub async fn update_status(&self, id: i64, status: CategoryStatus) -> CategoryResult<Category> {
        let _guard = self.structure_lock.lock().await;
        let category = self.get_category(id).await?;

        let writes = self
            .cascade(vec![category], CategoryChanges::status(status))
            .await?;
        self.commit(writes).await?;

        self.get_category(id).await
    }

    /// Set the status of several categories and all of their descendants, atomically
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn batch_update_status(
        &self,
        ids: Vec<i64>,
        status: CategoryStatus,
    ) -> CategoryResult<BatchUpdateResult> {
        let _guard = self.structure_lock.lock().await;
        let roots = self.resolve_all(ids).await?;

        let writes = self.cascade(roots, CategoryChanges::status(status)).await?;
        let updated = self.commit(writes).await?;

        Ok(BatchUpdateResult { updated })
    }

    /// Show or hide a category and all of its descendants in navigation
    #[instrument(skip(self), fields(category_id = id))]
    pub async fn update_show_in_nav(&self, id: i64, show_in_nav: bool) -> CategoryResult<Category> {
        let _guard = self.structure_lock.lock().await;
        let category = self.get_category(id).await?;

        let writes = self
            .cascade(vec![category], CategoryChanges::show_in_nav(show_in_nav))
            .await?;
        self.commit(writes).await?;

        self.get_category(id).await
    }

    /// Show or hide several categories and all of their descendants, atomically
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn batch_update_show_in_nav(
        &self,
        ids: Vec<i64>,
        show_in_nav: bool,
    ) -> CategoryResult<BatchUpdateResult> {
        let _guard = self.structure_lock.lock().await;
        let roots = self.resolve_all(ids).await?;

        let writes = self
            .cascade(roots, CategoryChanges::show_in_nav(show_in_nav))
            .await?;
        let updated = self.commit(writes).await?;

        Ok(BatchUpdateResult { updated })
    }

    /// Delete a category that has no children
    #[instrument(skip(self), fields(category_id = id))]
    pub async fn delete_category(&self, id: i64) -> CategoryResult<()> {
        let _guard = self.structure_lock.lock().await;
        self.get_category(id).await?;

        let children = self.repository.count(CategoryQuery::children_of(id)).await?;
        if children > 0 {
            tracing::warn!(category_id = id, children, "Rejected delete of a category with children");
            return Err(CategoryError::HasChildren(id));
        }

        if !self.repository.delete(id).await? {
            return Err(CategoryError::NotFound(id));
        }

        Ok(())
    }

    async fn parent(&self, parent_id: i64) -> CategoryResult<Category> {
        self.repository
            .get_by_id(parent_id)
            .await?
            .ok_or(CategoryError::ParentNotFound(parent_id))
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> CategoryResult<()> {
        let query = CategoryQuery {
            name: Some(name.to_string()),
            exclude_id,
            ..CategoryQuery::siblings(parent_id)
        };

        if self.repository.count(query).await? > 0 {
            return Err(CategoryError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Breadth-first walk over the parent index, one store query per level.
    async fn descendants(&self, id: i64) -> CategoryResult<Vec<Category>> {
        let mut visited = HashSet::from([id]);
        let mut frontier = vec![id];
        let mut found = Vec::new();

        while !frontier.is_empty() {
            let children = self
                .repository
                .find(CategoryQuery {
                    parent: ParentFilter::AnyOf(std::mem::take(&mut frontier)),
                    ..CategoryQuery::new()
                })
                .await?;

            for child in children {
                if visited.insert(child.id) {
                    frontier.push(child.id);
                    found.push(child);
                }
            }
        }

        tracing::debug!(category_id = id, count = found.len(), "Collected descendants");
        Ok(found)
    }

    /// Plan moving `category` under `parent_id`, rejecting cycles and over-deep subtrees.
    async fn plan_reparent(&self, category: &Category, parent_id: Option<i64>) -> CategoryResult<Reparent> {
        let descendants = self.descendants(category.id).await?;

        let parent = match parent_id {
            Some(parent_id) if parent_id == category.id || descendants.iter().any(|d| d.id == parent_id) => {
                tracing::warn!(category_id = category.id, parent_id, "Rejected circular move");
                return Err(CategoryError::CircularReference {
                    id: category.id,
                    parent_id,
                });
            }
            Some(parent_id) => Some(self.parent(parent_id).await?),
            None => None,
        };
        let placement = parent.as_ref().map_or_else(Placement::top_level, Placement::under);

        let plan = tree::restamp(category.id, placement.clone(), &descendants);
        let deepest = tree::deepest_level(&plan);
        if deepest > MAX_DEPTH {
            tracing::warn!(category_id = category.id, level = deepest, "Rejected move past the maximum depth");
            return Err(CategoryError::DepthExceeded {
                level: deepest,
                max: MAX_DEPTH,
            });
        }

        let counts = child_counts(&descendants);
        let children = |id: i64| counts.get(&id).copied().unwrap_or(0);
        let current: HashMap<i64, &Category> = descendants.iter().map(|d| (d.id, d)).collect();
        let descendant_writes = plan
            .iter()
            .filter_map(|(id, placement)| {
                current.get(id).map(|existing| {
                    CategoryWrite::guarded(existing, CategoryChanges::restamp(placement))
                        .with_children(children(*id))
                })
            })
            .collect();

        Ok(Reparent {
            placement,
            parent_check: parent.as_ref().map(CategoryWrite::check),
            root_children: children(category.id),
            descendant_writes,
        })
    }

    /// The same change for every root and every descendant, each row once.
    async fn cascade(&self, roots: Vec<Category>, changes: CategoryChanges) -> CategoryResult<Vec<CategoryWrite>> {
        let mut seen = HashSet::new();
        let mut writes = Vec::new();

        for root in roots {
            let descendants = self.descendants(root.id).await?;
            let counts = child_counts(&descendants);
            for category in std::iter::once(root).chain(descendants) {
                if seen.insert(category.id) {
                    let children = counts.get(&category.id).copied().unwrap_or(0);
                    writes.push(CategoryWrite::guarded(&category, changes.clone()).with_children(children));
                }
            }
        }

        Ok(writes)
    }

    /// Load every id or fail with the first one that is missing.
    async fn resolve_all(&self, ids: Vec<i64>) -> CategoryResult<Vec<Category>> {
        if ids.is_empty() {
            return Err(CategoryError::Validation("ids must not be empty".to_string()));
        }

        let mut unique = Vec::with_capacity(ids.len());
        let mut seen = HashSet::new();
        for id in ids {
            if seen.insert(id) {
                unique.push(id);
            }
        }

        let mut found: HashMap<i64, Category> = self
            .repository
            .find(CategoryQuery::with_ids(unique.clone()))
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        unique
            .into_iter()
            .map(|id| found.remove(&id).ok_or(CategoryError::NotFound(id)))
            .collect()
    }

    async fn with_relations(&self, rows: Vec<Category>) -> CategoryResult<Vec<CategoryDetail>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let parent_ids: Vec<i64> = rows
            .iter()
            .filter_map(|c| c.parent_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let parents: HashMap<i64, Category> = if parent_ids.is_empty() {
            HashMap::new()
        } else {
            self.repository
                .find(CategoryQuery::with_ids(parent_ids))
                .await?
                .into_iter()
                .map(|c| (c.id, c))
                .collect()
        };

        let mut children: HashMap<i64, Vec<Category>> = HashMap::new();
        let children_query = CategoryQuery {
            parent: ParentFilter::AnyOf(rows.iter().map(|c| c.id).collect()),
            order: CategoryOrder::Listing,
            ..CategoryQuery::new()
        };
        for child in self.repository.find(children_query).await? {
            if let Some(parent_id) = child.parent_id {
                children.entry(parent_id).or_default().push(child);
            }
        }

        Ok(rows
            .into_iter()
            .map(|category| CategoryDetail {
                parent: category.parent_id.and_then(|p| parents.get(&p).cloned()),
                children: children.remove(&category.id).unwrap_or_default(),
                category,
            })
            .collect())
    }

    async fn commit(&self, writes: Vec<CategoryWrite>) -> CategoryResult<u64> {
        if writes.is_empty() {
            return Ok(0);
        }
        self.repository.update_fields(writes).await
    }
}
