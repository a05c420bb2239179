//! kiln CLI - a minimal line-oriented host for the compile-and-run core.
//!
//! A real host embeds the engine behind a text widget; this binary stands
//! in for one on a terminal. It compiles the given source file, prints
//! diagnostics, runs the produced binary, and bridges terminal lines to
//! the interactive console protocol.
//!
//! `kiln --highlight <file>` skips the toolchain and dumps highlight spans
//! instead.

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kiln_config::KilnConfig;
use kiln_engine::{Engine, HostEvent};
use kiln_highlight::Palette;
use kiln_types::{EditorMode, char_count, word_count};

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config() -> KilnConfig {
    match KilnConfig::load() {
        Ok(Some(config)) => config,
        Ok(None) => KilnConfig::default(),
        Err(e) => {
            tracing::warn!("ignoring config: {e}");
            KilnConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let highlight_only = args.iter().any(|a| a == "--highlight");
    args.retain(|a| a != "--highlight");
    let Some(path) = args.first() else {
        bail!("usage: kiln [--highlight] <source-file>");
    };

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading source file {path}"))?;

    let config = load_config();
    let light_theme = config
        .highlight
        .as_ref()
        .is_some_and(|h| h.light_theme);
    let (mut engine, mut host_rx) = Engine::new(&config);
    engine.set_mode(EditorMode::CLikeSource).await;

    if highlight_only {
        print_spans(&mut engine, &source, light_theme);
        return Ok(());
    }

    let artifact = engine.request_compile(&source).await?;
    print_console(&mut host_rx);
    if !artifact.success {
        for diagnostic in &artifact.diagnostics {
            eprintln!("{}:{}: {}", diagnostic.file, diagnostic.line, diagnostic.message);
        }
        bail!("build failed");
    }

    engine.request_run().await?;
    print_console(&mut host_rx);

    interactive_loop(&mut engine, &mut host_rx).await?;
    engine.shutdown().await;
    Ok(())
}

/// Bridge terminal lines to the console protocol until the program exits.
async fn interactive_loop(
    engine: &mut Engine,
    host_rx: &mut mpsc::Receiver<HostEvent>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("reading stdin")? {
                    Some(line) => engine.send_console_line(&line).await,
                    // Terminal input closed; the child keeps running until
                    // it exits on its own.
                    None => stdin_open = false,
                }
            }
            _ = ticker.tick() => {
                engine.pump();
                if print_console(host_rx) {
                    return Ok(());
                }
            }
        }
    }
}

/// Drain host events to the terminal. Returns true once the run finished.
fn print_console(host_rx: &mut mpsc::Receiver<HostEvent>) -> bool {
    let mut finished = false;
    while let Ok(event) = host_rx.try_recv() {
        match event {
            HostEvent::ConsoleAppend(text) => {
                // Suppress the prompt marker on non-interactive output.
                if text != "> " || std::io::stdin().is_terminal() {
                    print!("{text}");
                }
            }
            HostEvent::RunFinished => finished = true,
            HostEvent::BuildFinished { .. }
            | HostEvent::Diagnostic(_)
            | HostEvent::HighlightReady(_) => {}
        }
    }
    use std::io::Write;
    let _ = std::io::stdout().flush();
    finished
}

/// Dump highlight spans with their palette colors.
fn print_spans(engine: &mut Engine, source: &str, light_theme: bool) {
    let palette = if light_theme {
        Palette::light()
    } else {
        Palette::standard()
    };
    let spans = engine.request_highlight(source);
    for span in &spans {
        let color = palette.color(span.class);
        println!(
            "{:>6}..{:<6} {:?} #{:02x}{:02x}{:02x} {:?}",
            span.start,
            span.end(),
            span.class,
            color.r,
            color.g,
            color.b,
            &source[span.start..span.end()],
        );
    }
    println!(
        "{} spans, {} words, {} characters",
        spans.len(),
        word_count(source),
        char_count(source),
    );
}
