pub mod check;
pub mod completion;
pub mod config;
pub mod present;

use colored::Colorize;

pub fn print_version() {
    println!(
        "{} {}",
        "deckhand".bold(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
}
