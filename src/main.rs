use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use fullshot::agent::{AgentHandle, CaptureAgent};
use fullshot::control::ControlSurface;
use fullshot::geometry::{PageGeometry, ViewportGeometry};
use fullshot::page::PageContext;
use fullshot::sim::SimulatedBrowser;
use fullshot::{CaptureConfig, CaptureOptions, DriverEvent, OutputFormat, TilingDriver, Viewport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "fullshot", version, about = "Capture a whole scrollable page as one image")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a URL with headless Chrome (needs the `cdp` feature)
    Capture {
        url: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Run the full pipeline over a synthetic page
    Demo {
        #[arg(long, default_value_t = 2000)]
        page_width: u32,
        #[arg(long, default_value_t = 3000)]
        page_height: u32,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Viewport width
    #[arg(long)]
    width: Option<u32>,
    /// Viewport height
    #[arg(long)]
    height: Option<u32>,
    /// Directory the screenshot is written to
    #[arg(long, short)]
    out: Option<PathBuf>,
    /// JSON config file; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    include_fixed: bool,
    /// Leave the page's scrollbars alone
    #[arg(long)]
    show_scrollbars: bool,
    /// Write JPEG at this quality instead of PNG
    #[arg(long, value_name = "QUALITY")]
    jpeg: Option<u8>,
}

impl CommonArgs {
    fn config(&self) -> anyhow::Result<CaptureConfig> {
        let mut cfg = match &self.config {
            Some(path) => CaptureConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CaptureConfig::default(),
        };
        cfg.viewport = Viewport {
            width: self.width.unwrap_or(cfg.viewport.width),
            height: self.height.unwrap_or(cfg.viewport.height),
        };
        if let Some(dir) = &self.out {
            cfg.output_dir = dir.clone();
        }
        if let Some(quality) = self.jpeg {
            cfg.output_format = OutputFormat::Jpeg { quality };
        }
        if self.include_fixed {
            cfg.options.include_fixed = true;
        }
        if self.show_scrollbars {
            cfg.options.hide_scrollbars = false;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Wire a driver to a printing control surface and run one session.
async fn run_session<P: PageContext + 'static>(
    page: P,
    agent: AgentHandle,
    config: CaptureConfig,
    options: CaptureOptions,
) -> anyhow::Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<DriverEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let driver = Arc::new(TilingDriver::new(page, agent.clone(), config).with_events(event_tx));
    let serve = tokio::spawn(driver.serve(control_rx));

    let mut surface = ControlSurface::new();
    println!("{}", surface.line());
    if control_tx.send(surface.begin(options)).is_err() {
        surface.start_failed("driver is not listening");
    }
    println!("{}", surface.line());

    let mut failed = None;
    while let Some(event) = event_rx.recv().await {
        surface.apply(&event);
        println!("{}", surface.line());
        let terminal = ControlSurface::is_terminal(&event);
        match event {
            DriverEvent::Complete { artifact: Some(location) } => println!("{}", location),
            DriverEvent::Error { error } => failed = Some(error),
            _ => {}
        }
        if terminal {
            break;
        }
    }

    drop(control_tx);
    let _ = serve.await;
    let _ = agent.shutdown().await;

    if let Some(error) = failed {
        bail!("capture failed: {}", error);
    }
    Ok(())
}

#[cfg(feature = "cdp")]
async fn capture(url: String, config: CaptureConfig) -> anyhow::Result<()> {
    use fullshot::cdp::CdpBrowser;

    let browser = CdpBrowser::launch(&config)?;
    browser.navigate(&url)?;
    let agent = CaptureAgent::spawn(browser.capturer());
    let options = config.options;
    let result = run_session(browser.page(), agent, config, options).await;
    browser.close()?;
    result
}

#[cfg(not(feature = "cdp"))]
async fn capture(_url: String, _config: CaptureConfig) -> anyhow::Result<()> {
    bail!("fullshot was built without the `cdp` feature; rebuild with --features cdp")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Capture { url, common } => {
            let config = common.config()?;
            capture(url, config).await
        }
        Command::Demo { page_width, page_height, common } => {
            let config = common.config()?;
            let browser = SimulatedBrowser::new(
                PageGeometry { width: page_width, height: page_height },
                ViewportGeometry { width: config.viewport.width, height: config.viewport.height },
            );
            let agent = CaptureAgent::spawn(browser.capturer());
            let options = config.options;
            run_session(browser.page(), agent, config, options).await
        }
    }
}
