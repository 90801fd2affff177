//! Info command - show platform capabilities

use anyhow::Result;
use argon_core::capture::{CapturePlatform, PortalPlatform};
use argon_core::config::ConfigFile;
use std::path::PathBuf;

/// Show platform information
pub async fn info() -> Result<()> {
    println!("Argon - System Information\n");

    println!("System Services:");
    let (pw_running, pw_status) = pipewire_status();
    let (portal_running, portal_status) = portal_status().await;

    let pw_icon = if pw_running { "[OK]" } else { "[!!]" };
    let portal_icon = if portal_running { "[OK]" } else { "[!!]" };

    println!("  {} PipeWire:          {}", pw_icon, pw_status);
    println!("  {} xdg-desktop-portal: {}", portal_icon, portal_status);

    if !pw_running || !portal_running {
        println!();
        println!("  Troubleshooting:");
        if !pw_running {
            println!("    - PipeWire is required for screen capture");
            println!("      Try: systemctl --user start pipewire");
        }
        if !portal_running {
            println!("    - xdg-desktop-portal is required for screen selection");
            println!("      Try: systemctl --user start xdg-desktop-portal");
        }
    }

    println!();
    println!("Environment:");
    match std::env::var("WAYLAND_DISPLAY") {
        Ok(display) => println!("  Wayland:     {}", display),
        Err(_) => println!("  Wayland:     not detected"),
    }
    if let Ok(desktop) = std::env::var("XDG_CURRENT_DESKTOP") {
        println!("  Desktop:     {}", desktop);
    }

    println!();
    let path = ConfigFile::default_path();
    println!(
        "Config file: {} ({})",
        path.display(),
        if path.exists() { "exists" } else { "not created" }
    );

    println!();
    println!("Supported presets:");
    println!("  720p30   - 1280x720 @ 30fps");
    println!("  720p60   - 1280x720 @ 60fps");
    println!("  1080p30  - 1920x1080 @ 30fps");
    println!("  1080p60  - 1920x1080 @ 60fps");
    println!("  1440p30  - 2560x1440 @ 30fps");
    println!("  1440p60  - 2560x1440 @ 60fps");
    println!("  4k30     - 3840x2160 @ 30fps");
    println!("  4k60     - 3840x2160 @ 60fps");

    Ok(())
}

fn pipewire_status() -> (bool, String) {
    let Some(runtime) = std::env::var_os("XDG_RUNTIME_DIR") else {
        return (false, "XDG_RUNTIME_DIR not set".to_string());
    };
    let socket = PathBuf::from(runtime).join("pipewire-0");
    if socket.exists() {
        (true, format!("socket at {}", socket.display()))
    } else {
        (false, "socket not found".to_string())
    }
}

async fn portal_status() -> (bool, String) {
    let platform = match PortalPlatform::new().await {
        Ok(platform) => platform,
        Err(e) => return (false, e.to_string()),
    };
    match platform.shareable_content().await {
        Ok(content) => {
            let mut kinds = Vec::new();
            if !content.displays.is_empty() {
                kinds.push("monitors");
            }
            if !content.windows.is_empty() {
                kinds.push("windows");
            }
            (true, format!("screencast of {}", kinds.join(" and ")))
        }
        Err(e) => (false, e.to_string()),
    }
}
