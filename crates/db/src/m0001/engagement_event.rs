use sea_query::{
    ColumnDef, Index, IndexCreateStatement, IndexDropStatement, Table, TableCreateStatement,
    TableDropStatement,
};

use crate::table::EngagementEvent;

pub struct CreateTable;

fn create_table() -> TableCreateStatement {
    Table::create()
        .table(EngagementEvent::Table)
        .col(
            ColumnDef::new(EngagementEvent::Id)
                .string()
                .not_null()
                .string_len(26)
                .primary_key(),
        )
        .col(
            ColumnDef::new(EngagementEvent::EventType)
                .string()
                .not_null()
                .string_len(20),
        )
        .col(ColumnDef::new(EngagementEvent::UserId).string().string_len(64))
        .col(
            ColumnDef::new(EngagementEvent::NewsletterId)
                .string()
                .string_len(64),
        )
        .col(
            ColumnDef::new(EngagementEvent::ArticleId)
                .string()
                .string_len(64),
        )
        .col(
            ColumnDef::new(EngagementEvent::SessionId)
                .string()
                .string_len(64),
        )
        .col(
            ColumnDef::new(EngagementEvent::Metadata)
                .json()
                .not_null()
                .default("{}"),
        )
        .col(
            ColumnDef::new(EngagementEvent::CreatedAt)
                .big_integer()
                .not_null(),
        )
        .to_owned()
}

fn drop_table() -> TableDropStatement {
    Table::drop().table(EngagementEvent::Table).to_owned()
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

pub struct CreateIdx1;

fn create_idx_1() -> IndexCreateStatement {
    Index::create()
        .name("idx_engagement_event_dedup")
        .table(EngagementEvent::Table)
        .col(EngagementEvent::EventType)
        .col(EngagementEvent::UserId)
        .col(EngagementEvent::ArticleId)
        .col(EngagementEvent::CreatedAt)
        .to_owned()
}

fn drop_idx_1() -> IndexDropStatement {
    Index::drop()
        .name("idx_engagement_event_dedup")
        .table(EngagementEvent::Table)
        .to_owned()
}

#[async_trait::async_trait]
impl sqlx_migrator::Operation<sqlx::Sqlite> for CreateIdx1 {
    async fn up(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = create_idx_1().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }

    async fn down(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = drop_idx_1().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }
}

pub struct CreateIdx2;

fn create_idx_2() -> IndexCreateStatement {
    Index::create()
        .name("idx_engagement_event_newsletter")
        .table(EngagementEvent::Table)
        .col(EngagementEvent::NewsletterId)
        .col(EngagementEvent::CreatedAt)
        .to_owned()
}

fn drop_idx_2() -> IndexDropStatement {
    Index::drop()
        .name("idx_engagement_event_newsletter")
        .table(EngagementEvent::Table)
        .to_owned()
}

#[async_trait::async_trait]
impl sqlx_migrator::Operation<sqlx::Sqlite> for CreateIdx2 {
    async fn up(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = create_idx_2().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }

    async fn down(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = drop_idx_2().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }
}
