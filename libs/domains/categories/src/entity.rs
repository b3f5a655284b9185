use crate::models::{Category, CategoryStatus};
use crate::repository::{CategoryChanges, NewCategory};
use sea_orm::ActiveValue::{self, NotSet, Set};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM Entity for the categories table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
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
    pub product_count: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Restrict"
    )]
    Parent,
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// OpenAPI tag shared by every category endpoint
    pub const TAG: &'static str = "categories";
}

impl From<Model> for Category {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            icon: model.icon,
            image: model.image,
            parent_id: model.parent_id,
            level: model.level,
            path: model.path,
            sort: model.sort,
            show_in_nav: model.show_in_nav,
            status: model.status,
            product_count: model.product_count,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }
}

impl From<NewCategory> for ActiveModel {
    fn from(input: NewCategory) -> Self {
        let now = chrono::Utc::now();
        ActiveModel {
            id: NotSet,
            name: Set(input.name),
            description: Set(input.description),
            icon: Set(input.icon),
            image: Set(input.image),
            parent_id: Set(input.parent_id),
            level: Set(input.level),
            path: Set(input.path),
            sort: Set(input.sort),
            show_in_nav: Set(input.show_in_nav),
            status: Set(input.status),
            product_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
    }
}

impl From<CategoryChanges> for ActiveModel {
    fn from(changes: CategoryChanges) -> Self {
        fn set_if<T: Into<sea_orm::Value>>(value: Option<T>) -> ActiveValue<T> {
            value.map_or(NotSet, Set)
        }

        ActiveModel {
            id: NotSet,
            name: set_if(changes.name),
            description: set_if(changes.description),
            icon: set_if(changes.icon),
            image: set_if(changes.image),
            parent_id: set_if(changes.parent_id),
            level: set_if(changes.level),
            path: set_if(changes.path),
            sort: set_if(changes.sort),
            show_in_nav: set_if(changes.show_in_nav),
            status: set_if(changes.status),
            product_count: NotSet,
            created_at: NotSet,
            updated_at: Set(chrono::Utc::now().into()),
        }
    }
}
