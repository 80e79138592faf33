//! Maskwell CLI
//!
//! Protect text before it leaves the machine and restore it afterwards

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use maskwell_core::{
    restore_text, EngineConfig, EntityRecognizer, FileStore, HeuristicNameRecognizer,
    Localization, MemoizedRecognizer, ProtectOptions, Session,
};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maskwell")]
#[command(about = "Maskwell - reversible redaction of sensitive values", long_about = None)]
struct Cli {
    /// TOML engine configuration
    #[arg(long, global = true, env = "MASKWELL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace sensitive values with placeholders
    ///
    /// Names are found heuristically: runs of capitalized words, or a single
    /// capitalized word inside a sentence. A lone name opening a sentence
    /// ("Bob sent ...") is not recognized.
    Protect {
        #[command(flatten)]
        input: Input,

        /// Comma-separated categories to redact (default: all)
        #[arg(long, value_delimiter = ',')]
        categories: Option<Vec<String>>,

        /// Translate placeholder labels into this locale
        #[arg(long)]
        locale: Option<String>,

        /// Translate placeholder labels into the input's detected language
        #[arg(long, conflicts_with = "locale")]
        localize: bool,

        /// Also write this run's placeholder mapping as JSON
        #[arg(long)]
        mapping_out: Option<PathBuf>,
    },
    /// Put original values back in place of placeholders
    Restore {
        #[command(flatten)]
        input: Input,

        /// Read the mapping from a JSON file instead of the session store
        #[arg(long)]
        mapping: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Input {
    /// Inline text
    #[arg(short, long, conflicts_with = "file")]
    text: Option<String>,

    /// Input file (default: stdin)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Session whose placeholder mapping is reused and updated
    #[arg(long, default_value = "default")]
    session: String,

    /// Directory holding session mappings (overrides the config file)
    #[arg(long)]
    store: Option<PathBuf>,
}

impl Input {
    fn read(&self) -> anyhow::Result<String> {
        if let Some(text) = &self.text {
            return Ok(text.clone());
        }
        match &self.file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            None => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("failed to read stdin")?;
                Ok(buf)
            }
        }
    }

    fn write(&self, content: &str) -> anyhow::Result<()> {
        match &self.output {
            Some(path) => std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display())),
            None => {
                print!("{content}");
                Ok(())
            }
        }
    }

    fn store(&self, config: &EngineConfig) -> FileStore {
        FileStore::new(self.store.clone().unwrap_or_else(|| config.store.dir.clone()))
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => Ok(EngineConfig::load(path)?),
        None => Ok(EngineConfig::default()),
    }
}

/// `--locale` wins over the config file's target; other settings carry over.
/// `--localize` alone enables localization with a detected target.
fn localization(
    config: &EngineConfig,
    locale: Option<&str>,
    detect: bool,
) -> Option<Localization> {
    let configured = config.localization.as_ref().map(|l| l.to_localization());
    match (configured, locale) {
        (Some(mut localization), Some(locale)) => {
            localization.target_locale = Some(locale.to_string());
            Some(localization)
        }
        (None, Some(locale)) => Some(Localization::new(locale)),
        (Some(configured), None) => Some(configured),
        (None, None) => detect.then(Localization::auto),
    }
}

fn read_mapping(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("invalid mapping {}", path.display()))
}

async fn protect(
    config: &EngineConfig,
    input: &Input,
    categories: Option<Vec<String>>,
    localize: Option<Localization>,
    mapping_out: Option<&Path>,
) -> anyhow::Result<()> {
    let recognizer: Arc<dyn EntityRecognizer> =
        Arc::new(MemoizedRecognizer::new(HeuristicNameRecognizer));
    let redactor = config.build_redactor(Some(recognizer))?;

    let mut options = ProtectOptions::builder();
    if let Some(categories) = categories {
        options = options.categories(categories);
    }
    if let Some(localization) = localize {
        options = options.localize(localization);
    }
    let options = options.build();

    let text = input.read()?;
    let store = input.store(config);
    let mut session = Session::open(&store, input.session.as_str());
    let protected = redactor
        .protect(&text, &options, session.cache_mut())
        .await?;
    session
        .commit()
        .with_context(|| format!("failed to persist session '{}'", session.id()))?;

    info!(
        session = session.id(),
        replaced = protected.counts.values().sum::<usize>(),
        "protected input"
    );

    if let Some(path) = mapping_out {
        let json = serde_json::to_string_pretty(&protected.mapping)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    input.write(&protected.text)
}

fn restore(config: &EngineConfig, input: &Input, mapping: Option<&Path>) -> anyhow::Result<()> {
    let mapping = match mapping {
        Some(path) => read_mapping(path)?,
        None => {
            let store = input.store(config);
            let session = Session::open(&store, input.session.as_str());
            if session.cache().is_empty() {
                bail!("session '{}' has no stored mapping", session.id());
            }
            session.cache().mapping()
        }
    };

    let text = input.read()?;
    input.write(&restore_text(&text, &mapping))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Protect {
            input,
            categories,
            locale,
            localize,
            mapping_out,
        } => {
            let localize = localization(&config, locale.as_deref(), localize);
            protect(&config, &input, categories, localize, mapping_out.as_deref()).await?
        }
        Commands::Restore { input, mapping } => restore(&config, &input, mapping.as_deref())?,
    }

    Ok(())
}
