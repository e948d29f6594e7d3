use std::fs::File;
use std::io::{Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;

use unslide::commands::{HELP, ReaderCommand};
use unslide::deck::{Deck, SlideCache, SlideNumber, load_deck};
use unslide::expand::{ExpansionService, HttpBackend, Update};
use unslide::panic_handler;
use unslide::settings::{self, Settings};

/// Step through a slide deck while the backend explains each slide
#[derive(Parser, Debug)]
#[command(name = "unslide", version, about)]
struct Args {
    /// Deck JSON as returned by the ingestion service
    deck: PathBuf,

    /// Backend base URL (overrides config and BACKEND_URL)
    #[arg(long)]
    backend: Option<String>,

    /// Topic label sent with every request
    #[arg(long)]
    topic: Option<String>,

    /// Slides to prefetch after the current one
    #[arg(long)]
    lookahead: Option<usize>,

    /// Slide to open first
    #[arg(long, default_value_t = 1)]
    start: SlideNumber,

    /// Config file to use instead of the default location
    #[arg(long, env = "UNSLIDE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "unslide.log")]
    log_file: PathBuf,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // stdout is the display, so logs go to a file
    WriteLogger::init(
        args.log_level,
        Config::default(),
        File::create(&args.log_file)
            .with_context(|| format!("cannot create log file {}", args.log_file.display()))?,
    )?;
    panic_handler::initialize_panic_handler();

    info!("Starting unslide");

    settings::load_settings(args.config.as_deref());
    if let Some(url) = &args.backend {
        settings::set_backend_url(url);
    }
    if let Some(topic) = &args.topic {
        settings::set_topic(topic);
    }
    if let Some(lookahead) = args.lookahead {
        settings::set_prefetch_lookahead(lookahead);
    }

    let deck = load_deck(&args.deck)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let res = runtime.block_on(run(deck, settings::current(), args.start));
    if let Err(err) = &res {
        error!("Application error: {err:?}");
    }

    info!("Shutting down unslide");
    res
}

async fn run(deck: Deck, settings: Settings, start: SlideNumber) -> Result<()> {
    let backend = HttpBackend::new(
        &settings.backend_url,
        &settings.expand_path,
        Duration::from_secs(settings.connect_timeout_secs),
    )
    .context("failed to build HTTP client")?;
    info!("Using backend {}", backend.endpoint());

    let service = ExpansionService::new(
        SlideCache::new(deck),
        Arc::new(backend),
        settings.expansion_config(),
        Handle::current(),
    );
    let mut reader = Reader { service };

    reader.goto(start);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.parse::<ReaderCommand>() {
                    Ok(ReaderCommand::Quit) => break,
                    Ok(cmd) => reader.handle(cmd),
                    Err(e) => println!("{e}"),
                }
            }
            Some(update) = reader.service.next_update() => reader.render(&update),
        }
    }

    reader.service.shutdown();
    Ok(())
}

struct Reader {
    service: ExpansionService<HttpBackend>,
}

impl Reader {
    fn handle(&mut self, cmd: ReaderCommand) {
        match cmd {
            ReaderCommand::Next => match self.service.neighbour(1) {
                Some(n) => self.goto(n),
                None => println!("Already at the last slide"),
            },
            ReaderCommand::Previous => match self.service.neighbour(-1) {
                Some(n) => self.goto(n),
                None => println!("Already at the first slide"),
            },
            ReaderCommand::Goto(n) => self.goto(n),
            ReaderCommand::Annotations => self.print_annotations(),
            ReaderCommand::Edit(text) => {
                let Some(current) = self.service.current_slide() else {
                    return;
                };
                match self.service.edit_notes(current, text) {
                    Ok(()) => println!("\n{}", self.service.display().content),
                    Err(e) => println!("{e}"),
                }
            }
            ReaderCommand::Status => self.print_status(),
            ReaderCommand::Help => println!("{HELP}"),
            ReaderCommand::Quit => {}
        }
    }

    fn goto(&mut self, slide: SlideNumber) {
        let total = self.service.cache().len();
        match self.service.navigate(slide) {
            Ok(_) => {
                println!("\n=== Slide {slide}/{total} ===");
                let display = self.service.display();
                if display.loading {
                    println!("(generating...)");
                } else {
                    println!("{}", display.content);
                }
            }
            Err(e) => println!("{e}"),
        }
    }

    fn render(&self, update: &Update) {
        match update {
            Update::Fragment { text, .. } => {
                print!("{text}");
                let _ = stdout().flush();
            }
            Update::Completed { .. } => println!(),
            Update::Failed { .. } => println!("\n{}", self.service.display().content),
            Update::Prefetched { slide } => info!("Slide {slide} ready"),
            Update::PrefetchFailed { slide, message } => {
                warn!("Slide {slide} could not be prefetched: {message}");
            }
        }
    }

    fn print_annotations(&self) {
        let Some(record) = self.service.current_record() else {
            return;
        };
        match &record.annotations {
            Some(annotations) if !annotations.is_empty() => {
                for a in annotations {
                    let b = &a.bounding_box;
                    println!(
                        "[{}] {} ({}, {}, {}, {})",
                        a.id, a.label, b.top, b.left, b.bottom, b.right
                    );
                }
            }
            _ => println!("No annotations for this slide"),
        }
    }

    fn print_status(&self) {
        let cache = self.service.cache();
        let cached: Vec<String> = cache
            .records()
            .iter()
            .filter(|r| r.is_expanded())
            .map(|r| r.number().to_string())
            .collect();
        println!(
            "slide {:?} | request {:?} | prefetching: {} | cached {}/{}: [{}]",
            self.service.current_slide(),
            self.service.request_state(),
            self.service.is_prefetching(),
            cached.len(),
            cache.len(),
            cached.join(", ")
        );
    }
}
