use clap::{Parser, Subcommand};
use folio::config::{self, BuildContext, SiteConfig};
use folio::{Pipeline, output, watch};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Static site assembly from content, layouts and assets")]
#[command(long_about = "\
Static site assembly from content, layouts and assets

Content files carry front-matter and become HTML pages at the same relative
path. Layouts are chosen per directory, nearest directory wins. Navigation is
built from every page's title and order.

Project structure:

  my-site/
  ├── site.toml                    # Config (optional, see gen-config)
  ├── content/
  │   ├── index.md                 # → _site/index.html
  │   ├── about.md                 # → _site/about.html
  │   └── guide/
  │       ├── intro.md             # → _site/guide/intro.html
  │       └── widgets.html         # Template component page
  ├── layouts/
  │   ├── default.html             # Root layout (required)
  │   ├── home.html                # Variant, selected by `layout: home`
  │   ├── _partials/nav.html       # Partial, for {% include %}
  │   └── guide/default.html       # Overrides the root layout under guide/
  └── assets/
      └── css/site.css             # → _site/assets/css/site.<hash>.css

Front-matter (YAML between --- or TOML between +++):
  title        required
  description  meta description
  order        navigation sort key
  layout       layout variant name
  section      explicit navigation section
  nav          false hides the page from navigation

Run 'folio gen-config' to generate a documented site.toml.")]
#[command(version)]
struct Cli {
    /// Project root holding site.toml and the content, layout and asset directories
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (defaults to <root>/site.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the whole site once
    Build {
        /// Output directory (overrides output_dir)
        #[arg(long)]
        output: Option<PathBuf>,
        /// URL prefix for generated links (overrides base_path)
        #[arg(long)]
        base_path: Option<String>,
        /// Development-mode output: cache-busting asset URLs, inline error pages
        #[arg(long)]
        dev: bool,
    },
    /// Build in development mode, then rebuild on every change
    Dev,
    /// Validate content and layouts without writing anything
    Check,
    /// Print a stock site.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Build {
            output: out_dir,
            base_path,
            dev,
        } => {
            let mut config = load_config(&cli)?;
            if let Some(dir) = out_dir {
                config.output_dir = dir.to_string_lossy().into_owned();
            }
            if let Some(base_path) = base_path {
                config.base_path = base_path.clone();
            }
            config.validate()?;
            let ctx = BuildContext::from_config(&config, &cli.root, *dev);
            init_thread_pool(&ctx);

            let mut pipeline = Pipeline::new(ctx);
            install_stop_handler(&pipeline);
            let report = pipeline.run()?;
            output::print_build_output(&report, pipeline.sources());
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Command::Dev => {
            let config = load_config(&cli)?;
            let ctx = BuildContext::from_config(&config, &cli.root, true);
            init_thread_pool(&ctx);

            let mut pipeline = Pipeline::new(ctx);
            install_stop_handler(&pipeline);
            let report = pipeline.run()?;
            output::print_build_output(&report, pipeline.sources());
            if !pipeline.cancel_flag().load(Ordering::SeqCst) {
                println!("==> Watching for changes (Ctrl-C to stop)");
                watch::watch(&mut pipeline)?;
            }
        }
        Command::Check => {
            let config = load_config(&cli)?;
            let ctx = BuildContext::from_config(&config, &cli.root, false);
            println!("==> Checking {}", ctx.content_root.display());
            let mut pipeline = Pipeline::new(ctx);
            let report = pipeline.check()?;
            output::print_check_output(&report, pipeline.navigation());
            if !report.errors.is_empty() {
                std::process::exit(1);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<SiteConfig, config::ConfigError> {
    match &cli.config {
        Some(path) => config::load_config_file(path),
        None => config::load_config(&cli.root),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "folio=debug" } else { "folio=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool from `[processing] max_processes`,
/// already capped at the number of available cores.
fn init_thread_pool(ctx: &BuildContext) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(ctx.threads)
        .build_global()
        .ok();
}

/// Ctrl-C raises the pipeline's cancel flag; the page in flight still
/// finishes writing.
fn install_stop_handler(pipeline: &Pipeline) {
    let flag = pipeline.cancel_flag();
    let installed = ctrlc::set_handler(move || {
        tracing::info!("stopping after the current page");
        flag.store(true, Ordering::SeqCst);
    });
    if let Err(e) = installed {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }
}
