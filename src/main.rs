use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use log::info;
use rustmodelist::{
    Attributes, ChangeKind, ListError, ModelList, ModelListConfig, SyncAction, SyncRequest,
    SyncTransport,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rustmodelist")]
#[command(about = "Load a JSON array of records into a sorted model list")]
struct Cli {
    /// JSON file holding an array of objects
    #[arg(long)]
    input: PathBuf,

    /// Keep the list ordered by this attribute
    #[arg(long)]
    sort_by: Option<String>,

    /// Print only this attribute of every model
    #[arg(long)]
    attr: Option<String>,

    /// HTML-escape the printed attribute values
    #[arg(long, requires = "attr")]
    html: bool,
}

/// Reads the whole file on `read`; other actions are not supported.
struct FileSync {
    path: PathBuf,
}

#[async_trait]
impl SyncTransport for FileSync {
    async fn sync(&self, action: SyncAction, _request: &SyncRequest) -> rustmodelist::Result<Option<Value>> {
        match action {
            SyncAction::Read => {
                let text = tokio::fs::read_to_string(&self.path)
                    .await
                    .map_err(|err| ListError::SyncFailure(format!("{}: {}", self.path.display(), err)))?;
                Ok(Some(Value::String(text)))
            }
            other => Err(ListError::SyncFailure(format!("{} is not supported for files", other))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = ModelListConfig::new().sync(Arc::new(FileSync {
        path: cli.input.clone(),
    }));
    if let Some(attribute) = &cli.sort_by {
        config = config.sort_by(attribute.as_str());
    }

    let list = ModelList::with_config(config);
    list.after(ChangeKind::Reset, |event| {
        info!("list reset with {} models", event.models().len());
    });
    list.on_error(|event| eprintln!("error ({}): {}", event.src, event.error));

    list.load(Attributes::new())
        .await
        .with_context(|| format!("failed to load {}", cli.input.display()))?;

    let output = match (&cli.attr, cli.html) {
        (Some(name), true) => list.get_as_html(name),
        (Some(name), false) => list.get(name),
        (None, _) => Value::Array(list.to_json().into_iter().map(Value::Object).collect()),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
