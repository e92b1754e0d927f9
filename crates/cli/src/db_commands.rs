use clap::Subcommand;

use courier_config::CourierConfig;

#[derive(Subcommand)]
pub enum DbAction {
    /// Create the database schema if it does not exist yet.
    Migrate,
    /// Print the resolved database URL.
    Url,
}

pub async fn handle_db(config: &CourierConfig, action: DbAction) -> anyhow::Result<()> {
    let url = courier_config::database_url(config);
    match action {
        DbAction::Migrate => {
            std::fs::create_dir_all(courier_config::data_dir()).ok();
            let pool = sqlx::SqlitePool::connect(&url).await?;
            courier_store::init_schema(&pool).await?;
            println!("schema ready at {url}");
        },
        DbAction::Url => println!("{url}"),
    }
    Ok(())
}
