mod analytics_snapshot;
mod engagement_event;
mod newsletter_send;
mod revoked_token;
mod tracked_link;

use sqlx_migrator::vec_box;

pub struct Migration;

sqlx_migrator::sqlite_migration!(
    Migration,
    "newsletter",
    "m0001",
    vec_box![],
    vec_box![
        revoked_token::CreateTable,
        revoked_token::CreateIdx1,
        revoked_token::CreateIdx2,
        engagement_event::CreateTable,
        engagement_event::CreateIdx1,
        engagement_event::CreateIdx2,
        analytics_snapshot::CreateTable,
        tracked_link::CreateTable,
        newsletter_send::CreateTable,
        newsletter_send::CreateUk1
    ]
);
