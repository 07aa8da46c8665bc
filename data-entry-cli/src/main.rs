mod prompt;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use data_entry_console::client::{
    ApiClient, ClientConfig, EditorError, Filter, NoticeLevel, OAuthTokenProvider, SettingsForm,
    StaticTokenProvider, TableCatalog, TableEditor, TokenProvider, ViewMode, ViewPreferences,
    ViewStatus,
};
use data_entry_console::schema::{value_text, SettingSource};
use data_entry_console::{ConnectionSettings, RowValues};
use prompt::{confirm, SignedOut, TerminalPrompt};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "data-entry")]
#[command(about = "Browse and edit data-entry console tables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Client configuration file (TOML)
    #[arg(long, short, global = true, env = "DATA_ENTRY_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Signed-in account
    #[arg(long, global = true)]
    account: Option<String>,

    /// Bearer token to send instead of signing in
    #[arg(long, global = true, env = "DATA_ENTRY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Try the unauthenticated debug endpoints first
    #[arg(long, global = true)]
    debug_fallback: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables you can access
    Tables,

    /// Show one page of a table
    Show {
        table: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Only rows whose COLUMN contains VALUE
        #[arg(long, value_parser = parse_assignment, value_name = "COLUMN=VALUE")]
        filter: Option<(String, String)>,

        /// Layout to use instead of the stored view mode
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ViewMode>,
    },

    /// Insert a row
    Insert {
        table: String,

        #[arg(required = true, value_parser = parse_assignment, value_name = "COLUMN=VALUE")]
        values: Vec<(String, String)>,
    },

    /// Change fields of the row with the given key
    Update {
        table: String,

        key: String,

        #[arg(required = true, value_parser = parse_assignment, value_name = "COLUMN=VALUE")]
        values: Vec<(String, String)>,
    },

    /// Delete the row with the given key
    Delete {
        table: String,

        key: String,

        /// Skip the confirmation question
        #[arg(long, short)]
        yes: bool,
    },

    /// Database connection settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// Show or store the view mode of a table
    ViewMode {
        table: String,

        #[arg(value_parser = parse_mode)]
        mode: Option<ViewMode>,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Show the effective settings and where they come from
    Show,

    /// Change settings and apply them
    Set {
        #[arg(required = true, value_parser = parse_assignment, value_name = "FIELD=VALUE")]
        values: Vec<(String, String)>,
    },
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))
}

fn parse_mode(raw: &str) -> Result<ViewMode, String> {
    raw.parse().map_err(|error: data_entry_console::client::PreferencesError| error.to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(error) = run(Cli::parse()).await {
        // Editor failures were already printed as notices
        if error.downcast_ref::<EditorError>().is_none() {
            eprintln!("Error: {:#}", error);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config =
        ClientConfig::load(cli.config.as_deref()).context("Failed to load client configuration")?;

    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }
    if cli.account.is_some() {
        config.account = cli.account;
    }
    config.debug_fallback |= cli.debug_fallback;

    // A fixed token stands for its own account
    if config.token.is_some() && config.account.is_none() {
        config.account = Some("default".to_string());
    }

    let client = Arc::new(ApiClient::from_config(&config, token_provider(&config)));

    match cli.command {
        Commands::Tables => {
            let mut catalog = TableCatalog::new(client, config.page_size);
            let tables = catalog.load().await.context("Failed to load tables")?;
            if tables.is_empty() {
                println!("No tables available");
            }
            for table in tables {
                println!("{}\t{}", table.name, table.description.as_deref().unwrap_or(""));
            }
        }

        Commands::Show {
            table,
            page,
            filter,
            mode,
        } => {
            let catalog = TableCatalog::new(client, config.page_size);
            let mut editor = catalog.open(&table);
            let result = editor
                .load(page, filter.map(|(column, value)| Filter::new(column, value)))
                .await;
            report(&mut editor);
            result?;

            let mode = match mode {
                Some(mode) => mode,
                None => ViewPreferences::open(&config.preferences_path)?.get(&table),
            };
            render(&editor, mode);
        }

        Commands::Insert { table, values } => {
            let mut editor = TableEditor::new(client, table, config.page_size);
            load(&mut editor).await?;

            let values: RowValues = values
                .into_iter()
                .map(|(column, value)| (column, Value::String(value)))
                .collect();
            let result = editor.insert_row(values).await;
            report(&mut editor);
            result?;
        }

        Commands::Update { table, key, values } => {
            let mut editor = TableEditor::new(client, table, config.page_size);
            let index = locate(&mut editor, &key).await?;

            let result = async {
                editor.begin_edit(index)?;
                for (column, value) in &values {
                    editor.set_field(column, value)?;
                }
                editor.commit_edit().await
            }
            .await;
            report(&mut editor);
            result?;
        }

        Commands::Delete { table, key, yes } => {
            let mut editor = TableEditor::new(client, table.clone(), config.page_size);
            let index = locate(&mut editor, &key).await?;
            let row_key = editor.rows()[index]
                .key(editor.primary_key())
                .cloned()
                .context("Row has no key value")?;

            editor.request_delete(row_key)?;
            let question = format!("Delete row {} from {}?", key, table);
            if !yes && !confirm(&question).await? {
                editor.dismiss_delete();
                println!("Cancelled");
                return Ok(());
            }

            let result = editor.confirm_delete().await;
            report(&mut editor);
            result?;
        }

        Commands::Settings { action } => {
            let mut form = SettingsForm::new(client, config.default_database_port.clone());
            form.load().await.context("Failed to load settings")?;

            match action {
                SettingsCommand::Show => {
                    for name in ConnectionSettings::FIELDS {
                        println!(
                            "{:<10} {:<32} ({})",
                            name,
                            form.values().field(name).unwrap_or_default(),
                            source_label(form.source(name))
                        );
                    }
                }
                SettingsCommand::Set { values } => {
                    for (name, value) in values {
                        form.set(&name, value)?;
                    }
                    form.save().await.context("Failed to save settings")?;
                    println!("Settings updated");
                }
            }
        }

        Commands::ViewMode { table, mode } => {
            let mut preferences = ViewPreferences::open(&config.preferences_path)?;
            match mode {
                Some(mode) => {
                    preferences.set(&table, mode)?;
                    println!("{}: {}", table, mode);
                }
                None => println!("{}: {}", table, preferences.get(&table)),
            }
        }
    }

    Ok(())
}

fn token_provider(config: &ClientConfig) -> Arc<dyn TokenProvider> {
    match (&config.token, &config.oauth) {
        (Some(token), _) => Arc::new(StaticTokenProvider::new(token.clone())),
        (None, Some(oauth)) => Arc::new(OAuthTokenProvider::new(
            oauth.clone(),
            Arc::new(TerminalPrompt),
        )),
        (None, None) => Arc::new(SignedOut),
    }
}

async fn load(editor: &mut TableEditor<ApiClient>) -> anyhow::Result<()> {
    let result = editor.load(1, None).await;
    report(editor);
    Ok(result?)
}

/// Find the row whose key equals `key`, paging through filter matches
async fn locate(editor: &mut TableEditor<ApiClient>, key: &str) -> anyhow::Result<usize> {
    load(editor).await?;
    let primary_key = editor.primary_key().to_string();

    let result = editor.filter(primary_key.clone(), key).await;
    report(editor);
    result?;

    loop {
        let found = editor.rows().iter().position(|row| {
            row.key(&primary_key)
                .is_some_and(|value| value_text(value) == key)
        });
        if let Some(index) = found {
            return Ok(index);
        }

        let next = editor.pagination().page + 1;
        let moved = editor.change_page(next).await;
        report(editor);
        if !moved? {
            bail!("No row with {} = {} in {}", primary_key, key, editor.table());
        }
    }
}

fn report(editor: &mut TableEditor<ApiClient>) {
    if let ViewStatus::AccessDenied(message) = editor.status() {
        eprintln!("Access denied: {}", message);
    }
    for notice in editor.take_notices() {
        match notice.level {
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => println!("{}", notice.message),
        }
    }
}

fn source_label(source: Option<SettingSource>) -> &'static str {
    match source {
        Some(SettingSource::Override) => "override",
        Some(SettingSource::Env) => "env",
        Some(SettingSource::Default) | None => "default",
    }
}

fn render(editor: &TableEditor<ApiClient>, mode: ViewMode) {
    let columns = editor.columns();
    let cell = |values: &RowValues, column: &str| values.get(column).map(value_text).unwrap_or_default();

    match mode {
        ViewMode::Spreadsheet => {
            println!("{}", columns.join("\t"));
            for row in editor.rows() {
                let cells: Vec<String> = columns.iter().map(|column| cell(row.values(), column)).collect();
                println!("{}", cells.join("\t"));
            }
        }
        ViewMode::Classic => {
            let width = columns.iter().map(String::len).max().unwrap_or(0);
            for row in editor.rows() {
                let key = row
                    .key(editor.primary_key())
                    .map(value_text)
                    .unwrap_or_default();
                println!("[{} = {}]", editor.primary_key(), key);
                for column in &columns {
                    println!("  {:<width$}  {}", column, cell(row.values(), column), width = width);
                }
            }
        }
    }

    let pagination = editor.pagination();
    if editor.rows().is_empty() {
        println!("No rows");
    }
    println!(
        "Page {} of {} ({} rows)",
        pagination.page,
        pagination.total_pages.max(1),
        pagination.total
    );
}
