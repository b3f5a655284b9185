use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Deserializer, Serialize};
use strum::Display;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Deepest level a category may occupy. Top-level categories sit at level 1.
pub const MAX_DEPTH: i32 = 5;

/// `max_level` used by tree queries that do not specify one.
pub const DEFAULT_TREE_LEVEL: i32 = 3;

/// Category visibility status, stored as a small integer (0 = disabled, 1 = enabled)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    DeriveActiveEnum,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(try_from = "i16", into = "i16")]
#[strum(serialize_all = "lowercase")]
pub enum CategoryStatus {
    #[sea_orm(num_value = 0)]
    Disabled,
    #[default]
    #[sea_orm(num_value = 1)]
    Enabled,
}

impl From<CategoryStatus> for i16 {
    fn from(status: CategoryStatus) -> Self {
        match status {
            CategoryStatus::Disabled => 0,
            CategoryStatus::Enabled => 1,
        }
    }
}

impl TryFrom<i16> for CategoryStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CategoryStatus::Disabled),
            1 => Ok(CategoryStatus::Enabled),
            other => Err(format!("invalid category status {}, expected 0 or 1", other)),
        }
    }
}

/// A node in the category forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub image: Option<String>,
    /// `None` for top-level categories
    pub parent_id: Option<i64>,
    /// 1 for top-level categories, parent level + 1 otherwise
    pub level: i32,
    /// Comma-separated ancestor ids from the root down to the parent, empty at top level
    pub path: String,
    /// Sibling ordering weight, higher comes first in listings
    pub sort: i32,
    pub show_in_nav: bool,
    #[schema(value_type = i16, example = 1)]
    pub status: CategoryStatus,
    /// Maintained by the product catalog, never written here
    pub product_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Path carried by this category's direct children.
    pub fn child_path(&self) -> String {
        if self.path.is_empty() {
            self.id.to_string()
        } else {
            format!("{},{}", self.path, self.id)
        }
    }
}

/// A category together with its immediate parent and direct children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryDetail {
    #[serde(flatten)]
    pub category: Category,
    pub parent: Option<Category>,
    pub children: Vec<Category>,
}

/// A category with its nested children, as returned by tree queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: Category,
    #[schema(no_recursion)]
    pub children: Vec<CategoryTreeNode>,
}

/// One page of categories
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryPage {
    pub page_data: Vec<CategoryDetail>,
    pub total: u64,
    pub page_no: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// Number of rows touched by a batch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchUpdateResult {
    pub updated: u64,
}

/// Rejects names made only of whitespace
fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// DTO for creating a new category
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(url, length(max = 255))]
    pub icon: Option<String>,
    #[validate(url, length(max = 255))]
    pub image: Option<String>,
    #[validate(range(min = 1))]
    pub parent_id: Option<i64>,
    #[validate(range(min = 0))]
    pub sort: Option<i32>,
    pub show_in_nav: Option<bool>,
    #[schema(value_type = Option<i16>, example = 1)]
    pub status: Option<CategoryStatus>,
}

/// DTO for updating a category. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCategory {
    #[validate(length(min = 1, max = 100), custom(function = "validate_not_blank"))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(url, length(max = 255))]
    pub icon: Option<String>,
    #[validate(url, length(max = 255))]
    pub image: Option<String>,
    /// An explicit `null` moves the category to the top level
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<i64>)]
    pub parent_id: Option<Option<i64>>,
    #[validate(range(min = 0))]
    pub sort: Option<i32>,
    pub show_in_nav: Option<bool>,
    #[schema(value_type = Option<i16>, example = 1)]
    pub status: Option<CategoryStatus>,
}

/// DTO for moving a category within the tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct MoveCategory {
    /// An explicit `null` moves the category to the top level
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[schema(value_type = Option<i64>)]
    pub new_parent_id: Option<Option<i64>>,
    #[validate(range(min = 0))]
    pub new_sort: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateStatus {
    #[schema(value_type = i16, example = 0)]
    pub status: CategoryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BatchUpdateStatus {
    #[validate(length(min = 1, max = 1000))]
    pub ids: Vec<i64>,
    #[schema(value_type = i16, example = 0)]
    pub status: CategoryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateShowInNav {
    pub show_in_nav: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BatchUpdateShowInNav {
    #[validate(length(min = 1, max = 1000))]
    pub ids: Vec<i64>,
    pub show_in_nav: bool,
}

/// Query filters for the paginated category listing
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryFilter {
    #[serde(default = "default_page_no")]
    #[validate(range(min = 1))]
    pub page_no: u64,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u64,
    /// Substring match on the category name
    pub name: Option<String>,
    #[param(value_type = Option<i16>)]
    pub status: Option<CategoryStatus>,
    /// `0` selects top-level categories only
    pub parent_id: Option<i64>,
    #[validate(range(min = 1, max = 5))]
    pub level: Option<i32>,
    pub show_in_nav: Option<bool>,
}

fn default_page_no() -> u64 {
    1
}

fn default_page_size() -> u64 {
    10
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self {
            page_no: default_page_no(),
            page_size: default_page_size(),
            name: None,
            status: None,
            parent_id: None,
            level: None,
            show_in_nav: None,
        }
    }
}

/// Query filters for the category tree
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TreeFilter {
    /// Deepest level included in the tree (defaults to 3)
    #[validate(range(min = 1, max = 5))]
    pub max_level: Option<i32>,
    #[param(value_type = Option<i16>)]
    pub status: Option<CategoryStatus>,
    pub show_in_nav: Option<bool>,
    /// Substring match on the category name
    pub name: Option<String>,
}

/// Query filters for the top-level listing
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopLevelFilter {
    #[param(value_type = Option<i16>)]
    pub status: Option<CategoryStatus>,
}
