use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use calmirror_core::token::FileTokenStore;
use calmirror_google::Credentials;

pub async fn run(config: &MirrorConfig) -> Result<()> {
    let config_dir = config
        .path
        .parent()
        .unwrap_or(std::path::Path::new("."));
    let credentials = Credentials::from_config(&config.google, config_dir)?;
    let store = FileTokenStore::new(config.token_path());

    println!("Authorizing with Google...");

    calmirror_google::authorize(&credentials, &store).await?;

    println!("\nToken saved to {}", store.path().display());
    println!("Run `calmirror once --dry-run` to preview the first sync.");

    Ok(())
}
