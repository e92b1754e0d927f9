use {clap::Subcommand, uuid::Uuid};

use {
    courier_config::CourierConfig,
    courier_store::{ChannelStore, NewChannel},
};

#[derive(Subcommand)]
pub enum ChannelAction {
    /// List configured channels.
    List,
    /// Create a bot to attach channels to.
    AddBot {
        /// Workspace the bot belongs to.
        #[arg(long)]
        workspace: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Automation engine webhook base for this bot.
        #[arg(long)]
        automation_url: Option<String>,
    },
    /// Create a channel under an existing bot. The webhook public id and
    /// secret are generated once and printed; they are never regenerated.
    Add {
        /// Owning bot id.
        #[arg(long)]
        bot: String,
        /// Channel type (telegram, whatsapp).
        #[arg(long = "type")]
        channel_type: String,
        /// Provider credential blob as JSON
        /// (e.g. '{"bot_token": "123:abc"}').
        #[arg(long, default_value = "{}")]
        config: String,
    },
}

pub async fn handle_channels(config: &CourierConfig, action: ChannelAction) -> anyhow::Result<()> {
    let url = courier_config::database_url(config);
    let pool = sqlx::SqlitePool::connect(&url).await?;
    courier_store::init_schema(&pool).await?;
    let store = ChannelStore::new(pool);

    match action {
        ChannelAction::List => {
            let channels = store.list().await?;
            if channels.is_empty() {
                println!("No channels configured.");
            }
            for channel in channels {
                println!(
                    "  {} {} — public_id: {}, enabled: {}, status: {}",
                    channel.channel_type,
                    channel.id,
                    channel.public_id,
                    channel.is_enabled,
                    channel.status
                );
            }
        },
        ChannelAction::AddBot {
            workspace,
            name,
            automation_url,
        } => {
            let bot = store
                .create_bot(&workspace, &name, automation_url.as_deref())
                .await?;
            println!("created bot {} ({})", bot.id, bot.name);
        },
        ChannelAction::Add {
            bot,
            channel_type,
            config,
        } => {
            let bot = store
                .get_bot(&bot)
                .await?
                .ok_or_else(|| anyhow::anyhow!("bot not found: {bot}"))?;
            let provider: serde_json::Value = serde_json::from_str(&config)?;

            let channel = store
                .create(NewChannel {
                    bot_id: bot.id.clone(),
                    workspace_id: bot.workspace_id.clone(),
                    channel_type: channel_type.clone(),
                    public_id: Uuid::new_v4().to_string(),
                    secret: Some(Uuid::new_v4().simple().to_string()),
                    config: provider,
                })
                .await?;

            println!("created {} channel {}", channel.channel_type, channel.id);
            println!("  webhook public id: {}", channel.public_id);
            println!(
                "  webhook secret:    {}",
                channel.secret.as_deref().unwrap_or("-")
            );
        },
    }
    Ok(())
}
