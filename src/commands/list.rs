use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use owo_colors::OwoColorize;

use crate::render;

pub fn run(config: &MirrorConfig, calendar: Option<&str>) -> Result<()> {
    let calendars = config.select(calendar)?;

    for (i, cal) in calendars.iter().enumerate() {
        println!("{}", render::calendar_config(cal));

        if i < calendars.len() - 1 {
            println!();
        }
    }

    if !config.token_path().exists() {
        println!(
            "\n{}",
            "Not authorized yet. Run `calmirror auth` before syncing.".yellow()
        );
    }

    Ok(())
}
