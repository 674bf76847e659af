use clap::builder::PossibleValuesParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::render::RENDERERS;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(author, version, about)]
#[command(long_about = "A markdown presentation runtime.\n\n\
    Write slides in markdown, present them from the terminal, annotate them,\n\
    and keep every attached viewer in sync.\n\n\
    Examples:\n  \
    deckhand slides.md              Present slides.md\n  \
    deckhand slides.md --slide 4    Start on the fourth slide\n  \
    deckhand check slides.md        List slides, steps and warnings")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Markdown file to present
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Start on a specific slide (1-indexed)
    #[arg(long, global = false)]
    pub slide: Option<usize>,

    /// Number of steps to reveal on the starting slide
    #[arg(long, global = false, requires = "slide")]
    pub fragment: Option<usize>,

    /// Renderer backend
    #[arg(
        long,
        global = false,
        default_value = "terminal",
        value_parser = PossibleValuesParser::new(RENDERERS.iter().copied())
    )]
    pub renderer: String,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a deck and report its slides, steps and warnings
    Check {
        /// Markdown file to check
        file: PathBuf,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Display current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g. defaults.theme, sync.audience_policy)
        key: String,

        /// Value to set
        value: String,
    },
}

#[derive(Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}

impl Cli {
    /// Default log filter for the requested verbosity. `RUST_LOG` wins when set.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }

    pub fn run(self) -> anyhow::Result<()> {
        match self.command {
            Some(Commands::Check { file }) => crate::commands::check::run(&file),
            Some(Commands::Config { command }) => crate::commands::config::run(command),
            Some(Commands::Completion { shell }) => {
                crate::commands::completion::run(shell);
                Ok(())
            }
            Some(Commands::Version) => {
                crate::commands::print_version();
                Ok(())
            }
            None => {
                if let Some(file) = self.file {
                    if !file.exists() {
                        anyhow::bail!("File not found: {}", file.display());
                    }
                    crate::commands::present::run(
                        &file,
                        self.slide,
                        self.fragment,
                        &self.renderer,
                        self.quiet,
                    )
                } else {
                    use clap::CommandFactory;
                    let mut cmd = Self::command();
                    cmd.print_help()?;
                    println!();
                    Ok(())
                }
            }
        }
    }
}
