//! Init command - first-run setup.

use crate::cli::Output;
use crate::config::Settings;
use console::style;

/// Run the init command for first-time setup: create directories and write a
/// default config file the user can edit.
pub fn run_init(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Notat Setup");
    println!();

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.objects_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;
    Output::success("Created data directories");

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!(
            "Config file already exists at {}",
            config_path.display()
        ));
    } else {
        settings.save_to(&config_path)?;
        Output::success(&format!("Wrote default config to {}", config_path.display()));
    }

    println!();
    println!("{}", style("Next steps").bold());
    println!("  1. Export your API keys:");
    println!("     {}", style("export OPENAI_API_KEY='sk-...'").green());
    println!("     {}", style("export YOUTUBE_API_KEY='...'").green());
    println!("  2. Set the token secret and email allowlist for the API:");
    println!("     {}", style("export NOTAT_JWT_SECRET='...'").green());
    println!(
        "     {}",
        style("add sha256 digests to auth.verified_email_hashes in the config").dim()
    );
    println!("  3. Check everything with {}", style("notat doctor").green());
    println!(
        "  4. Ingest a video with {}",
        style("notat process <url-or-id>").green()
    );

    Ok(())
}
