use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, SqlErr, TransactionTrait,
};

use crate::{
    entity::{self, Column},
    error::{CategoryError, CategoryResult},
    models::Category,
    repository::{
        CategoryOrder, CategoryQuery, CategoryRepository, CategoryWrite, HierarchySnapshot, NewCategory,
        ParentFilter,
    },
};

/// Advisory lock key serialising structural writes across service instances
const STRUCTURE_LOCK_KEY: i64 = 0x6361_7465_676f_7279;

fn db_error(err: DbErr) -> CategoryError {
    CategoryError::Internal(format!("Database error: {}", err))
}

pub struct PgCategoryRepository {
    db: DatabaseConnection,
}

impl PgCategoryRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn select(query: &CategoryQuery) -> Select<entity::Entity> {
        let mut select = entity::Entity::find();

        select = match &query.parent {
            ParentFilter::Any => select,
            ParentFilter::TopLevel => select.filter(Column::ParentId.is_null()),
            ParentFilter::Is(id) => select.filter(Column::ParentId.eq(*id)),
            ParentFilter::AnyOf(ids) => select.filter(Column::ParentId.is_in(ids.clone())),
        };

        if let Some(ids) = &query.ids {
            select = select.filter(Column::Id.is_in(ids.clone()));
        }
        if let Some(name) = &query.name {
            select = select.filter(Column::Name.eq(name.as_str()));
        }
        if let Some(needle) = &query.name_contains {
            select = select.filter(Column::Name.contains(needle.as_str()));
        }
        if let Some(id) = query.exclude_id {
            select = select.filter(Column::Id.ne(id));
        }
        if let Some(level) = query.level {
            select = select.filter(Column::Level.eq(level));
        }
        if let Some(max_level) = query.max_level {
            select = select.filter(Column::Level.lte(max_level));
        }
        if let Some(status) = query.status {
            select = select.filter(Column::Status.eq(status));
        }
        if let Some(show_in_nav) = query.show_in_nav {
            select = select.filter(Column::ShowInNav.eq(show_in_nav));
        }

        select
    }

    fn ordered(select: Select<entity::Entity>, order: CategoryOrder) -> Select<entity::Entity> {
        match order {
            CategoryOrder::Id => select.order_by_asc(Column::Id),
            CategoryOrder::Tree => select
                .order_by_asc(Column::Level)
                .order_by_asc(Column::Sort)
                .order_by_asc(Column::CreatedAt)
                .order_by_asc(Column::Id),
            CategoryOrder::Listing => select
                .order_by_desc(Column::Sort)
                .order_by_desc(Column::CreatedAt)
                .order_by_desc(Column::Id),
            CategoryOrder::TopLevel => select
                .order_by_desc(Column::Sort)
                .order_by_asc(Column::CreatedAt)
                .order_by_asc(Column::Id),
        }
    }

    /// Takes the transaction-scoped lock every structural write in every instance shares.
    async fn lock_structure(txn: &DatabaseTransaction) -> CategoryResult<()> {
        txn.execute_unprepared(&format!("SELECT pg_advisory_xact_lock({})", STRUCTURE_LOCK_KEY))
            .await
            .map_err(db_error)?;
        Ok(())
    }

    /// Restricts `query` to rows still at the `expected` position.
    fn at_position<Q: QueryFilter>(query: Q, expected: &HierarchySnapshot) -> Q {
        let query = match expected.parent_id {
            Some(parent_id) => query.filter(Column::ParentId.eq(parent_id)),
            None => query.filter(Column::ParentId.is_null()),
        };
        query.filter(Column::Path.eq(expected.path.as_str()))
    }

    /// `ConcurrentModification` if the row still exists, `NotFound` otherwise.
    async fn missed(txn: &DatabaseTransaction, id: i64) -> CategoryResult<CategoryError> {
        let exists = entity::Entity::find_by_id(id)
            .one(txn)
            .await
            .map_err(db_error)?
            .is_some();
        Ok(if exists {
            CategoryError::ConcurrentModification(id)
        } else {
            CategoryError::NotFound(id)
        })
    }

    async fn insert_locked(txn: &DatabaseTransaction, input: NewCategory) -> CategoryResult<entity::Model> {
        Self::lock_structure(txn).await?;

        if let (Some(parent_id), Some(expected)) = (input.parent_id, &input.parent_snapshot) {
            let parent = Self::at_position(entity::Entity::find_by_id(parent_id), expected)
                .one(txn)
                .await
                .map_err(db_error)?;
            if parent.is_none() {
                return Err(match Self::missed(txn, parent_id).await? {
                    CategoryError::NotFound(id) => CategoryError::ParentNotFound(id),
                    other => other,
                });
            }
        }

        let name = input.name.clone();
        let parent_id = input.parent_id;
        let active_model: entity::ActiveModel = input.into();

        entity::Entity::insert(active_model)
            .exec_with_returning(txn)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => CategoryError::DuplicateName(name),
                Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
                    CategoryError::ParentNotFound(parent_id.unwrap_or_default())
                }
                _ => db_error(e),
            })
    }

    /// Apply guarded writes one by one inside `txn`.
    async fn apply_writes(txn: &DatabaseTransaction, writes: Vec<CategoryWrite>) -> CategoryResult<u64> {
        Self::lock_structure(txn).await?;

        let mut affected = 0;
        for write in writes {
            let id = write.id;

            if write.changes.is_empty() {
                let mut select = entity::Entity::find_by_id(id);
                if let Some(expected) = &write.expected {
                    select = Self::at_position(select, expected);
                }
                if select.one(txn).await.map_err(db_error)?.is_none() {
                    return Err(Self::missed(txn, id).await?);
                }
            } else {
                let renamed = write.changes.name.clone();
                let mut update = entity::Entity::update_many()
                    .set(entity::ActiveModel::from(write.changes))
                    .filter(Column::Id.eq(id));
                if let Some(expected) = &write.expected {
                    update = Self::at_position(update, expected);
                }

                let result = update.exec(txn).await.map_err(|e| match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => {
                        CategoryError::DuplicateName(renamed.clone().unwrap_or_else(|| id.to_string()))
                    }
                    Some(SqlErr::ForeignKeyConstraintViolation(_)) => CategoryError::NotFound(id),
                    _ => db_error(e),
                })?;

                if result.rows_affected == 0 {
                    return Err(Self::missed(txn, id).await?);
                }
                affected += result.rows_affected;
            }

            if let Some(expected) = write.expected_children {
                let children = entity::Entity::find()
                    .filter(Column::ParentId.eq(id))
                    .count(txn)
                    .await
                    .map_err(db_error)?;
                if children != expected {
                    return Err(CategoryError::ConcurrentModification(id));
                }
            }
        }

        Ok(affected)
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn insert(&self, input: NewCategory) -> CategoryResult<Category> {
        let txn = self.db.begin().await.map_err(db_error)?;
        match Self::insert_locked(&txn, input).await {
            Ok(model) => {
                txn.commit().await.map_err(db_error)?;
                tracing::debug!(category_id = model.id, parent_id = ?model.parent_id, "Inserted category row");
                Ok(model.into())
            }
            Err(err) => {
                txn.rollback().await.map_err(db_error)?;
                Err(err)
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> CategoryResult<Option<Category>> {
        let model = entity::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_error)?;

        Ok(model.map(Into::into))
    }

    async fn find(&self, query: CategoryQuery) -> CategoryResult<Vec<Category>> {
        let mut select = Self::ordered(Self::select(&query), query.order);
        if let Some(offset) = query.offset {
            select = select.offset(offset);
        }
        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        let models = select.all(&self.db).await.map_err(db_error)?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count(&self, query: CategoryQuery) -> CategoryResult<u64> {
        Self::select(&query).count(&self.db).await.map_err(db_error)
    }

    async fn update_fields(&self, writes: Vec<CategoryWrite>) -> CategoryResult<u64> {
        if writes.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await.map_err(db_error)?;
        match Self::apply_writes(&txn, writes).await {
            Ok(affected) => {
                txn.commit().await.map_err(db_error)?;
                tracing::info!(affected, "Updated categories");
                Ok(affected)
            }
            Err(err) => {
                txn.rollback().await.map_err(db_error)?;
                tracing::warn!(error = %err, "Rolled back category update");
                Err(err)
            }
        }
    }

    async fn delete(&self, id: i64) -> CategoryResult<bool> {
        let result = entity::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::ForeignKeyConstraintViolation(_)) => CategoryError::HasChildren(id),
                _ => db_error(e),
            })?;

        if result.rows_affected > 0 {
            tracing::info!(category_id = id, "Deleted category");
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
