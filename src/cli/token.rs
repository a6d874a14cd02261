use clap::Subcommand;
use newsletter_tracking::{Context, Verification, token};
use time::Duration;

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Issue a token and print it with its pixel URL
    Issue {
        #[arg(long)]
        user: String,
        #[arg(long)]
        newsletter: Option<String>,
        #[arg(long)]
        article: Option<String>,
        #[arg(long)]
        class: Option<String>,
        /// Lifetime in days (defaults to tracking.token_ttl_days)
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=token::MAX_TTL_DAYS))]
        ttl_days: Option<i64>,
    },
    /// Verify a token and print the outcome
    Verify { token: String },
    /// Revoke a single token
    Revoke { token: String },
    /// Revoke every known token of a user
    RevokeUser { user: String },
}

#[tracing::instrument(skip_all)]
pub async fn run(config: newsletter::Config, command: TokenCommand) -> anyhow::Result<()> {
    let (pool, tracking) = super::connect(&config).await?;

    match command {
        TokenCommand::Issue {
            user,
            newsletter,
            article,
            class,
            ttl_days,
        } => {
            let mut context = Context::new();
            for (key, value) in [
                (token::NEWSLETTER_ID, newsletter),
                (token::ARTICLE_ID, article),
                (token::CLASS_ID, class),
            ] {
                if let Some(value) = value {
                    context.insert(key.to_owned(), value.into());
                }
            }

            let token = tracking
                .issue_token(&user, context, ttl_days.map(Duration::days))
                .await?;

            println!("{token}");
            println!("{}", tracking.outbound.pixel_url(&token));
        }
        TokenCommand::Verify { token } => match tracking.verifier.verify(&token).await {
            Verification::Valid {
                subject,
                context,
                expires_at,
            } => {
                println!("valid");
                println!("subject: {subject}");
                println!("context: {}", serde_json::to_string(&context)?);
                println!("expires_at: {expires_at}");
            }
            Verification::Invalid { reason } => println!("invalid: {reason}"),
        },
        TokenCommand::Revoke { token } => {
            tracking.revocations.revoke(&token).await?;
            println!("revoked");
        }
        TokenCommand::RevokeUser { user } => {
            let outcome = tracking.revocations.revoke_all_for_subject(&user).await?;
            println!("revoked {} token(s) for {user}", outcome.revoked_count);
        }
    }

    pool.close().await;

    Ok(())
}
