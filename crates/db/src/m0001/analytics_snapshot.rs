use sea_query::{ColumnDef, Index, Table, TableCreateStatement, TableDropStatement};

use crate::table::AnalyticsSnapshot;

pub struct CreateTable;

// Absent scope fields are stored as '' so the primary key stays total.
fn create_table() -> TableCreateStatement {
    Table::create()
        .table(AnalyticsSnapshot::Table)
        .col(
            ColumnDef::new(AnalyticsSnapshot::SnapshotDate)
                .string()
                .not_null()
                .string_len(10),
        )
        .col(
            ColumnDef::new(AnalyticsSnapshot::NewsletterId)
                .string()
                .not_null()
                .string_len(64)
                .default(""),
        )
        .col(
            ColumnDef::new(AnalyticsSnapshot::ArticleId)
                .string()
                .not_null()
                .string_len(64)
                .default(""),
        )
        .col(
            ColumnDef::new(AnalyticsSnapshot::ClassId)
                .string()
                .not_null()
                .string_len(64)
                .default(""),
        )
        .col(
            ColumnDef::new(AnalyticsSnapshot::MetricName)
                .string()
                .not_null()
                .string_len(25),
        )
        .col(
            ColumnDef::new(AnalyticsSnapshot::MetricValue)
                .double()
                .not_null(),
        )
        .col(
            ColumnDef::new(AnalyticsSnapshot::UpdatedAt)
                .big_integer()
                .not_null(),
        )
        .primary_key(
            Index::create()
                .col(AnalyticsSnapshot::SnapshotDate)
                .col(AnalyticsSnapshot::NewsletterId)
                .col(AnalyticsSnapshot::ArticleId)
                .col(AnalyticsSnapshot::ClassId)
                .col(AnalyticsSnapshot::MetricName),
        )
        .to_owned()
}

fn drop_table() -> TableDropStatement {
    Table::drop().table(AnalyticsSnapshot::Table).to_owned()
}

#[async_trait::async_trait]
impl sqlx_migrator::Operation<sqlx::Sqlite> for CreateTable {
    async fn up(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = create_table().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }

    async fn down(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = drop_table().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }
}
