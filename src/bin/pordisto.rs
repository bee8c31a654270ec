use anyhow::Result;
use pordisto::cli::{actions, actions::Action, start, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let action = start()?;

    match action {
        Action::Server { .. } => actions::server::handle(action).await?,
    }

    telemetry::shutdown_tracer();

    Ok(())
}
