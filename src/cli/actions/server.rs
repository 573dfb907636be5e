use crate::api;
use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{Context, Result};
use url::Url;

/// Handle the server action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    match action {
        Action::Server { port, dsn } => {
            // Validate the DSN before handing it to the pool.
            let dsn = Url::parse(&dsn)
                .with_context(|| "Invalid database connection string".to_string())?;

            api::new(port, dsn.to_string(), globals).await?;
        }
    }

    Ok(())
}
