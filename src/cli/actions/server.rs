use crate::{cli::actions::Action, server};
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, config } => {
            server::new(port, config).await?;
        }
    }

    Ok(())
}
