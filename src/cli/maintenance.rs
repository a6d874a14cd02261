use clap::Args;
use newsletter_tracking::{SnapshotScope, snapshot::parse_date};

#[derive(Args)]
pub struct SnapshotArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    from: String,
    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long)]
    to: String,
    #[arg(long)]
    newsletter: Option<String>,
    #[arg(long)]
    article: Option<String>,
    #[arg(long)]
    class: Option<String>,
}

#[tracing::instrument(skip_all)]
pub async fn prune(config: newsletter::Config) -> anyhow::Result<()> {
    let (pool, tracking) = super::connect(&config).await?;

    let pruned = tracking.revocations.prune().await?;
    println!("pruned {pruned} revocation row(s)");

    pool.close().await;

    Ok(())
}

#[tracing::instrument(skip_all)]
pub async fn snapshot(config: newsletter::Config, args: SnapshotArgs) -> anyhow::Result<()> {
    let (pool, tracking) = super::connect(&config).await?;

    let scope = SnapshotScope {
        newsletter_id: args.newsletter,
        article_id: args.article,
        class_id: args.class,
    };
    let snapshots = tracking
        .snapshots
        .regenerate(parse_date(&args.from)?, parse_date(&args.to)?, &scope)
        .await?;

    for snapshot in snapshots {
        println!(
            "{} {} {:.4}",
            snapshot.snapshot_date, snapshot.metric_name, snapshot.metric_value
        );
    }

    pool.close().await;

    Ok(())
}
