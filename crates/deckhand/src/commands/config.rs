use anyhow::Result;
use colored::Colorize;

use crate::cli::ConfigCommands;
use crate::config::Config;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(),
        ConfigCommands::Set { key, value } => set(&key, &value),
    }
}

fn show() -> Result<()> {
    let path = Config::path()?;
    let config = Config::load_or_default();
    let options = config.session_options("terminal");
    let defaults = &options.parse.defaults;

    println!("{} {}", "Config file:".bold(), path.display());
    if !path.exists() {
        println!("{}", "  (not created yet, showing built-in defaults)".dimmed());
    }
    println!();
    println!("{}", "defaults".bold());
    println!("  theme:            {}", defaults.theme);
    println!("  transition:       {}", defaults.transition);
    println!("  highlighter:      {}", defaults.highlighter);
    println!("  drawings_persist: {}", defaults.drawings_persist);
    println!("  delimiter:        {}", options.parse.delimiter);
    println!("{}", "sync".bold());
    println!("  audience_policy:   {}", options.audience_policy);
    println!("  client_queue:      {}", options.hub.queue_capacity);
    println!(
        "  client_timeout_ms: {}",
        options.hub.client_timeout.as_millis()
    );
    println!("  max_backlog:       {}", options.hub.max_backlog);
    Ok(())
}

fn set(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_or_default();
    config.set(key, value)?;
    let path = config.save()?;
    println!(
        "{} {key} = {value} ({})",
        "Saved".green().bold(),
        path.display()
    );
    Ok(())
}
