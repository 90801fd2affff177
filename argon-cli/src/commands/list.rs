//! List sources command

use anyhow::{Context, Result};
use argon_core::capture::{filter_windows, CapturePlatform, PortalPlatform};
use clap::Args;

/// Arguments for the list-sources command
#[derive(Args)]
pub struct ListArgs {
    /// Print the shareable content as JSON
    #[arg(long)]
    json: bool,

    /// Include windows of every application, unsorted
    #[arg(long)]
    all: bool,
}

/// List shareable content
pub async fn list_sources(args: ListArgs) -> Result<()> {
    let platform = PortalPlatform::new()
        .await
        .context("Failed to connect to the screencast portal")?;
    let mut content = platform
        .shareable_content()
        .await
        .context("Screen capture is not authorized")?;

    if !args.all {
        content.windows = filter_windows(&content.windows, None);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&content)?);
        return Ok(());
    }

    println!("Argon - Shareable Content\n");

    println!("{:<8} {:<40} {:<12}", "ID", "Display", "Size");
    println!("{}", "-".repeat(60));
    for display in &content.displays {
        println!(
            "{:<8} {:<40} {}x{}",
            display.id,
            truncate(&display.display_name(), 38),
            display.width,
            display.height
        );
    }
    println!();

    println!("{:<8} {:<40} {:<12}", "ID", "Window", "Size");
    println!("{}", "-".repeat(60));
    if content.windows.is_empty() {
        println!("(none)");
    }
    for window in &content.windows {
        println!(
            "{:<8} {:<40} {}x{}",
            window.id,
            truncate(&window.display_name(), 38),
            window.frame.width,
            window.frame.height
        );
    }

    println!("\nNote: On Wayland the desktop portal asks which screen or window to share");
    println!("when 'argon share' starts.");

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
