//! Markdown presentation runtime.
//!
//! A deck is parsed from markdown ([`parser`]), walked step by step
//! ([`navigation`]), annotated ([`drawing`]) and shared with any number of
//! presenter or audience clients ([`session`], [`sync`]). Rendering is pluggable
//! through [`render`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod drawing;
pub mod navigation;
pub mod parser;
pub mod render;
pub mod session;
pub mod sync;
pub mod theme;

pub use navigation::{Boundary, Navigator, Position, Transition};
pub use parser::{Deck, ParseError, ParseOptions, Slide, SlideKey, parse};
pub use session::{AudiencePolicy, Command, Outcome, Session, SessionError, SessionOptions};
