use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Categories::Table)
                    .if_not_exists()
                    .col(big_integer(Categories::Id).auto_increment().primary_key())
                    .col(string_len(Categories::Name, 100))
                    .col(string_len_null(Categories::Description, 500))
                    .col(string_len_null(Categories::Icon, 255))
                    .col(string_len_null(Categories::Image, 255))
                    .col(big_integer_null(Categories::ParentId))
                    .col(integer(Categories::Level).default(1))
                    .col(string_len(Categories::Path, 500).default(""))
                    .col(integer(Categories::Sort).default(0))
                    .col(boolean(Categories::ShowInNav).default(true))
                    .col(small_integer(Categories::Status).default(1))
                    .col(integer(Categories::ProductCount).default(0))
                    .col(
                        timestamp_with_time_zone(Categories::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Categories::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_categories_parent_id")
                            .from(Categories::Table, Categories::ParentId)
                            .to(Categories::Table, Categories::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_categories_parent_id", Categories::ParentId),
            ("idx_categories_level", Categories::Level),
            ("idx_categories_sort", Categories::Sort),
            ("idx_categories_status", Categories::Status),
            ("idx_categories_name", Categories::Name),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(Categories::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                ALTER TABLE categories
                    ADD CONSTRAINT ck_categories_level CHECK (level BETWEEN 1 AND 5),
                    ADD CONSTRAINT ck_categories_status CHECK (status IN (0, 1)),
                    ADD CONSTRAINT ck_categories_sort CHECK (sort >= 0)
                "#,
            )
            .await?;

        // Two top-level categories must not share a name either, so NULL parents compare equal.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE UNIQUE INDEX uq_categories_parent_id_name
                    ON categories (parent_id, name) NULLS NOT DISTINCT
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Categories::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
    Name,
    Description,
    Icon,
    Image,
    ParentId,
    Level,
    Path,
    Sort,
    ShowInNav,
    Status,
    ProductCount,
    CreatedAt,
    UpdatedAt,
}
