use sea_query::{
    ColumnDef, Index, IndexCreateStatement, IndexDropStatement, Table, TableCreateStatement,
    TableDropStatement,
};

use crate::table::NewsletterSend;

pub struct CreateTable;

fn create_table() -> TableCreateStatement {
    Table::create()
        .table(NewsletterSend::Table)
        .col(
            ColumnDef::new(NewsletterSend::Id)
                .string()
                .not_null()
                .string_len(26)
                .primary_key(),
        )
        .col(
            ColumnDef::new(NewsletterSend::NewsletterId)
                .string()
                .not_null()
                .string_len(64),
        )
        .col(
            ColumnDef::new(NewsletterSend::UserId)
                .string()
                .not_null()
                .string_len(64),
        )
        .col(ColumnDef::new(NewsletterSend::ClassId).string().string_len(64))
        .col(
            ColumnDef::new(NewsletterSend::SentAt)
                .big_integer()
                .not_null(),
        )
        .to_owned()
}

fn drop_table() -> TableDropStatement {
    Table::drop().table(NewsletterSend::Table).to_owned()
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

pub struct CreateUk1;

fn create_uk_1() -> IndexCreateStatement {
    Index::create()
        .name("uk_newsletter_send_recipient")
        .table(NewsletterSend::Table)
        .col(NewsletterSend::NewsletterId)
        .col(NewsletterSend::UserId)
        .unique()
        .to_owned()
}

fn drop_uk_1() -> IndexDropStatement {
    Index::drop()
        .name("uk_newsletter_send_recipient")
        .table(NewsletterSend::Table)
        .to_owned()
}

#[async_trait::async_trait]
impl sqlx_migrator::Operation<sqlx::Sqlite> for CreateUk1 {
    async fn up(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = create_uk_1().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }

    async fn down(
        &self,
        connection: &mut sqlx::SqliteConnection,
    ) -> Result<(), sqlx_migrator::Error> {
        let statement = drop_uk_1().to_string(sea_query::SqliteQueryBuilder);
        sqlx::query(&statement).execute(connection).await?;

        Ok(())
    }
}
