use clap::Subcommand;

#[derive(Subcommand)]
pub enum LinkCommand {
    /// Register a destination URL and print its link id
    Add {
        url: String,
        #[arg(long)]
        newsletter: Option<String>,
        #[arg(long)]
        article: Option<String>,
    },
}

#[tracing::instrument(skip_all)]
pub async fn run(config: newsletter::Config, command: LinkCommand) -> anyhow::Result<()> {
    let (pool, tracking) = super::connect(&config).await?;

    match command {
        LinkCommand::Add {
            url,
            newsletter,
            article,
        } => {
            let id = tracking
                .outbound
                .register_link(&url, newsletter.as_deref(), article.as_deref())
                .await?;

            tracing::info!(link_id = %id, "tracked link registered");
            println!("{id}");
        }
    }

    pool.close().await;

    Ok(())
}
