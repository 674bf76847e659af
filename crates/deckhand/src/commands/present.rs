use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::drawing::persist::{self, DrawingSnapshot};
use crate::drawing::{Point, Stroke};
use crate::navigation::Boundary;
use crate::session::server::{self, ClientHandle, SessionHandle};
use crate::session::{Command, Frame, Outcome, Session, SessionError};
use crate::sync::{Origin, Role};

const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);

const HELP: &str = "\
  n, <enter>       next step or slide
  p                previous step or slide
  g <slide> [n]    go to slide (1-indexed), revealing n steps
  d x,y x,y ...    draw a pen stroke on this slide
  a x,y x,y        draw an arrow on this slide
  c                clear this slide's drawing
  r                reload the file
  q                quit";

/// A line of presenter input, parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Command(Command),
    Draw(Stroke),
    Clear,
    Reload,
    Help,
    Quit,
}

/// Parse one line typed at the presenter prompt.
pub fn parse_line(line: &str) -> Result<Action, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(Action::Command(Command::Next));
    };
    let args: Vec<&str> = words.collect();

    match verb {
        "n" | "next" => Ok(Action::Command(Command::Next)),
        "p" | "prev" | "previous" => Ok(Action::Command(Command::Previous)),
        "g" | "goto" => {
            let slide = match args.first().map(|s| s.parse::<usize>()) {
                Some(Ok(n)) if n >= 1 => n - 1,
                _ => return Err("usage: g <slide> [steps], slides start at 1".to_string()),
            };
            let fragment = match args.get(1) {
                Some(s) => Some(s.parse::<usize>().map_err(|_| format!("not a step count: {s}"))?),
                None => None,
            };
            Ok(Action::Command(Command::GoTo { slide, fragment }))
        }
        "d" | "draw" => {
            let points = parse_points(&args)?;
            Ok(Action::Draw(Stroke::pen(points)))
        }
        "a" | "arrow" => match parse_points(&args)?.as_slice() {
            [from, to] => Ok(Action::Draw(Stroke::arrow(*from, *to))),
            _ => Err("usage: a x,y x,y".to_string()),
        },
        "c" | "clear" => Ok(Action::Clear),
        "r" | "reload" => Ok(Action::Reload),
        "h" | "help" | "?" => Ok(Action::Help),
        "q" | "quit" | "exit" => Ok(Action::Quit),
        other => Err(format!("unknown command '{other}', type h for help")),
    }
}

fn parse_points(args: &[&str]) -> Result<Vec<Point>, String> {
    args.iter()
        .map(|arg| {
            let (x, y) = arg
                .split_once(',')
                .ok_or_else(|| format!("expected x,y but got '{arg}'"))?;
            let x = x.trim().parse::<f32>().map_err(|_| format!("bad x in '{arg}'"))?;
            let y = y.trim().parse::<f32>().map_err(|_| format!("bad y in '{arg}'"))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

enum Input {
    Line(String),
    FileChanged,
    Eof,
}

pub fn run(
    file: &Path,
    slide: Option<usize>,
    fragment: Option<usize>,
    renderer: &str,
    quiet: bool,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let options = Config::load_or_default().session_options(renderer);
    let mut session = Session::new(&source, options)
        .with_context(|| format!("{} does not parse", file.display()))?;

    let drawings = persist::path_for(file);
    let saved = persist::load(&drawings)?;
    if !saved.is_empty() {
        tracing::info!(strokes = saved.stroke_count(), "restoring drawings");
        session.restore(saved);
    }
    if let Some(n) = slide {
        let command = Command::GoTo {
            slide: n.saturating_sub(1),
            fragment,
        };
        session.apply(command, Origin::Session)?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start runtime")?;
    let snapshot = runtime.block_on(present(session, file.to_path_buf(), quiet))?;

    persist::save(&drawings, &snapshot)?;
    if !quiet && !snapshot.is_empty() {
        println!(
            "{} {} stroke(s) to {}",
            "Saved".green().bold(),
            snapshot.stroke_count(),
            drawings.display()
        );
    }
    Ok(())
}

async fn present(session: Session, file: PathBuf, quiet: bool) -> Result<DrawingSnapshot> {
    let handle = server::spawn(session);
    let (mut presenter, mut events) = handle.attach(Role::Presenter).await?;

    let (tx, mut inputs) = mpsc::channel(16);
    spawn_stdin_reader(tx.clone());
    let watcher = match watch(&file, tx) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!("not watching {}: {e:#}", file.display());
            None
        }
    };

    if !quiet {
        println!("{}", "Type h for help.".dimmed());
    }
    let mut current = show(&handle).await?;

    loop {
        tokio::select! {
            input = inputs.recv() => {
                let line = match input {
                    Some(Input::Line(line)) => line,
                    Some(Input::FileChanged) => "r".to_string(),
                    Some(Input::Eof) | None => break,
                };
                let action = match parse_line(&line) {
                    Ok(action) => action,
                    Err(message) => {
                        eprintln!("{}", message.yellow());
                        continue;
                    }
                };
                let slide = current.position.slide;
                let result = match action {
                    Action::Quit => break,
                    Action::Help => {
                        println!("{HELP}");
                        continue;
                    }
                    Action::Command(command) => presenter.submit(command).await,
                    Action::Draw(stroke) => presenter.draw(slide, stroke).await,
                    Action::Clear => presenter.clear_drawing(slide).await,
                    Action::Reload => reload(&mut presenter, &file).await,
                };
                report(result);
                current = show(&handle).await?;
            }
            Some(delivery) = events.next() => {
                tracing::trace!(seq = delivery.seq, event = ?delivery.event, "presenter event");
            }
        }
    }

    drop(watcher);
    let snapshot = handle.end().await?;
    Ok(snapshot)
}

async fn reload(presenter: &mut ClientHandle, file: &Path) -> Result<Outcome, SessionError> {
    match std::fs::read_to_string(file) {
        Ok(source) => presenter.reload(source).await,
        Err(e) => {
            eprintln!("{} {}: {e}", "Could not read".red(), file.display());
            Ok(Outcome::Ignored)
        }
    }
}

fn report(result: Result<Outcome, SessionError>) {
    match result {
        Ok(Outcome::Boundary { boundary, .. }) => {
            let message = match boundary {
                Boundary::AtDeckStart => "Already at the first slide.",
                Boundary::AtDeckEnd => "Already at the last slide.",
            };
            println!("{}", message.dimmed());
        }
        Ok(Outcome::Reloaded {
            slide_count,
            warnings,
            ..
        }) => {
            let message = format!("Reloaded: {slide_count} slides, {warnings} warnings");
            println!("{}", message.green());
        }
        Ok(_) => {}
        Err(e) => eprintln!("{} {e}", "error:".red().bold()),
    }
}

async fn show(handle: &SessionHandle) -> Result<Frame> {
    let frame = handle.render().await?;
    let header = format!(
        " slide {}/{}  step {}/{}  {} ",
        frame.position.slide + 1,
        frame.slide_count,
        frame.position.fragment,
        frame.rendered.step_count,
        frame.rendered.layout
    );
    println!();
    println!("{}", header.reversed());
    println!("{}", frame.rendered.body);
    if !frame.strokes.is_empty() {
        println!("{}", format!("  {} annotation(s)", frame.strokes.len()).dimmed());
    }
    Ok(frame)
}

fn spawn_stdin_reader(tx: mpsc::Sender<Input>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(Input::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.blocking_send(Input::Eof);
    });
}

/// Watch the deck's directory and report changes to the deck file. Editors
/// often replace files on save, so the directory is watched, not the file.
fn watch(file: &Path, tx: mpsc::Sender<Input>) -> Result<Debouncer<RecommendedWatcher>> {
    let target = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = target.file_name().map(|n| n.to_os_string());

    let mut debouncer = new_debouncer(WATCH_DEBOUNCE, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                if events.iter().any(|e| e.path.file_name() == name.as_deref()) {
                    let _ = tx.blocking_send(Input::FileChanged);
                }
            }
            Err(e) => tracing::warn!("file watcher error: {e}"),
        }
    })?;
    debouncer
        .watcher()
        .watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(debouncer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_lines() {
        assert_eq!(parse_line(""), Ok(Action::Command(Command::Next)));
        assert_eq!(parse_line("n"), Ok(Action::Command(Command::Next)));
        assert_eq!(parse_line(" p "), Ok(Action::Command(Command::Previous)));
        assert_eq!(
            parse_line("g 3"),
            Ok(Action::Command(Command::GoTo {
                slide: 2,
                fragment: None
            }))
        );
        assert_eq!(
            parse_line("g 1 2"),
            Ok(Action::Command(Command::GoTo {
                slide: 0,
                fragment: Some(2)
            }))
        );
        assert!(parse_line("g 0").is_err());
        assert!(parse_line("g x").is_err());
        assert!(parse_line("g 2 many").is_err());
    }

    #[test]
    fn test_drawing_lines() {
        assert_eq!(
            parse_line("d 0,0 10,5 20,0"),
            Ok(Action::Draw(Stroke::pen(vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 5.0),
                Point::new(20.0, 0.0),
            ])))
        );
        assert_eq!(
            parse_line("a 1,1 2.5,3"),
            Ok(Action::Draw(Stroke::arrow(
                Point::new(1.0, 1.0),
                Point::new(2.5, 3.0)
            )))
        );
        assert!(parse_line("a 1,1").is_err());
        assert!(parse_line("d 1;1 2,2").is_err());
    }

    #[test]
    fn test_other_lines() {
        assert_eq!(parse_line("c"), Ok(Action::Clear));
        assert_eq!(parse_line("r"), Ok(Action::Reload));
        assert_eq!(parse_line("?"), Ok(Action::Help));
        assert_eq!(parse_line("q"), Ok(Action::Quit));
        assert!(parse_line("fly").is_err());
    }
}
