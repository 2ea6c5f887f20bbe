use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use tracing::info;

pub async fn run(config: &MirrorConfig, calendar: Option<&str>) -> Result<()> {
    let calendars = config.select(calendar)?;
    let mut mirror = super::build_mirror(config, calendars)?;

    info!("Using config {}", config.path.display());
    mirror.run_forever().await;

    Ok(())
}
