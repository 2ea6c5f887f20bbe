use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use owo_colors::OwoColorize;

use crate::render;

pub async fn run(
    config: &MirrorConfig,
    calendar: Option<&str>,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let calendars = config.select(calendar)?;
    let mut mirror = super::build_mirror(config, calendars)?;

    let report = mirror.run_once(dry_run).await;

    for (i, (name, result)) in report.calendars.iter().enumerate() {
        println!("{}", render::calendar_name(name));

        match result {
            Ok(calendar_report) => {
                println!("{}", render::calendar_report(calendar_report, verbose))
            }
            Err(e) => println!("   {}", e.to_string().red()),
        }

        if i < report.calendars.len() - 1 {
            println!();
        }
    }

    if dry_run {
        println!("\n{}", "Dry run: nothing was written.".dimmed());
    } else {
        let totals = report.totals();
        if totals.writes() > 0 || totals.failed > 0 {
            println!("\nSynced: {}", totals);
        }
    }

    let failed = report.failed_calendars();
    if failed > 0 {
        anyhow::bail!(
            "{} of {} calendars failed",
            failed,
            report.calendars.len()
        );
    }

    Ok(())
}
