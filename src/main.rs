use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;

use undo_ledger::config::Config;
use undo_ledger::fuzzy_matcher::FzfMatcher;
use undo_ledger::i18n::I18n;
use undo_ledger::{
    BatchCommand, Command, ConfirmHook, EntityCommand, EntityKind, HistoryManager,
    JsonFilePersistence, JsonFileStore, Record, StoreHandle,
};

const LOG_ENV: &str = "UL_LOG";

#[derive(Parser)]
#[command(name = "ul")]
#[command(about = "Undoable edits for a finance ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a record
    Create {
        kind: EntityKind,
        id: String,
        /// Record fields as a JSON object
        #[arg(long)]
        data: String,
        /// Project id, required for transactions and budgets
        #[arg(long)]
        scope: Option<String>,
    },
    /// Replace a record with new data
    Update {
        kind: EntityKind,
        id: String,
        #[arg(long)]
        data: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Delete a record
    Delete {
        kind: EntityKind,
        id: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Create every record of a JSON array as one batch
    Import {
        kind: EntityKind,
        file: PathBuf,
        #[arg(long)]
        scope: Option<String>,
        /// History label for the batch
        #[arg(long)]
        label: Option<String>,
    },
    /// Undo the last change
    Undo {
        /// Do not ask before undoing a batch
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Redo the last undone change
    Redo {
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// List history, most recent first
    History {
        /// Fuzzy filter on descriptions, or a position number
        #[arg(long)]
        filter: Option<String>,
        /// Maximum number of entries to display [default: from config]
        #[arg(long)]
        max_shown: Option<usize>,
        /// Show the redo stack instead
        #[arg(long)]
        redo: bool,
    },
    /// List stored records of a kind
    Show {
        kind: EntityKind,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Forget all history
    Clear,
    /// Set how many changes can be undone (10-100)
    Limit { size: usize },
}

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let base_dir = Config::base_dir();
    let mut config = Config::load_from(&base_dir)?;
    let i18n = I18n::new(&config.effective_language());

    let needs_help = args.len() == 1
        || (args.len() == 2 && matches!(args[1].as_str(), "help" | "-h" | "--help"));
    if needs_help {
        print_help(&i18n);
        return Ok(());
    }

    let cli = Cli::parse();
    let store = Arc::new(
        JsonFileStore::open(config.store_path(&base_dir)).context(i18n.t("error_open_store"))?,
    );
    let handle: StoreHandle = store.clone();
    let mut history = HistoryManager::open(
        handle.clone(),
        JsonFilePersistence::new(config.history_path(&base_dir)),
        config.stack_size(),
    );

    match cli.command {
        Commands::Create {
            kind,
            id,
            data,
            scope,
        } => {
            require_scope(kind, scope.as_deref(), &i18n)?;
            let data = parse_record(&data, &i18n)?;
            let cmd = EntityCommand::create(handle, kind, scope.as_deref(), id, data);
            apply(&mut history, Box::new(cmd), &i18n)?;
        }
        Commands::Update {
            kind,
            id,
            data,
            scope,
        } => {
            require_scope(kind, scope.as_deref(), &i18n)?;
            let old_data = existing(&store, kind, scope.as_deref(), &id, &i18n)?;
            let new_data = parse_record(&data, &i18n)?;
            let cmd = EntityCommand::update(handle, kind, scope.as_deref(), id, old_data, new_data);
            apply(&mut history, Box::new(cmd), &i18n)?;
        }
        Commands::Delete { kind, id, scope } => {
            require_scope(kind, scope.as_deref(), &i18n)?;
            let snapshot = existing(&store, kind, scope.as_deref(), &id, &i18n)?;
            let cmd = EntityCommand::delete(handle, kind, scope.as_deref(), id, snapshot);
            apply(&mut history, Box::new(cmd), &i18n)?;
        }
        Commands::Import {
            kind,
            file,
            scope,
            label,
        } => {
            require_scope(kind, scope.as_deref(), &i18n)?;
            let commands = import_commands(&handle, kind, scope.as_deref(), &file, &i18n)?;
            if commands.is_empty() {
                println!("{}", i18n.t("import_empty").yellow());
                return Ok(());
            }
            let label = label.unwrap_or_else(|| {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.display().to_string());
                i18n.t_format("import_label", &[kind.collection(), &name])
            });
            apply(&mut history, Box::new(BatchCommand::new(commands, label)), &i18n)?;
        }
        Commands::Undo { yes } => {
            if !history.can_undo() {
                println!("{}", i18n.t("nothing_to_undo").yellow());
                return Ok(());
            }
            let description = history.peek_undo_description();
            let mut declined = false;
            let mut prompt = |d: &str| {
                let accepted = confirm(&i18n, "confirm_batch_undo", d);
                declined = !accepted;
                accepted
            };
            let hook: Option<ConfirmHook<'_>> = if yes {
                None
            } else {
                Some(&mut prompt as ConfirmHook<'_>)
            };

            if history.undo(hook) {
                println!("{}", i18n.t_format("undone", &[&description]).green().bold());
            } else if declined {
                println!("{}", i18n.t("cancelled").yellow());
            } else {
                bail!(i18n.t_format("undo_failed", &[&description]));
            }
        }
        Commands::Redo { yes } => {
            if !history.can_redo() {
                println!("{}", i18n.t("nothing_to_redo").yellow());
                return Ok(());
            }
            let description = history.peek_redo_description();
            let mut declined = false;
            let mut prompt = |d: &str| {
                let accepted = confirm(&i18n, "confirm_batch_redo", d);
                declined = !accepted;
                accepted
            };
            let hook: Option<ConfirmHook<'_>> = if yes {
                None
            } else {
                Some(&mut prompt as ConfirmHook<'_>)
            };

            if history.redo(hook) {
                println!("{}", i18n.t_format("redone", &[&description]).green().bold());
            } else if declined {
                println!("{}", i18n.t("cancelled").yellow());
            } else {
                bail!(i18n.t_format("redo_failed", &[&description]));
            }
        }
        Commands::History {
            filter,
            max_shown,
            redo,
        } => {
            let max_shown = max_shown.unwrap_or(config.display.max_history_shown);
            print_history(&history, filter.as_deref(), max_shown, redo, &i18n);
        }
        Commands::Show { kind, scope } => {
            require_scope(kind, scope.as_deref(), &i18n)?;
            let records = store.list(kind, scope.as_deref())?;
            if records.is_empty() {
                println!("{}", i18n.t("no_records").yellow());
                return Ok(());
            }
            let title = match &scope {
                Some(scope) => format!("{}/{}", scope, kind.collection()),
                None => kind.collection().to_string(),
            };
            println!(
                "{}",
                i18n.t_format("records_title", &[&title, &records.len().to_string()])
                    .cyan()
                    .bold()
            );
            let width = records.iter().map(|(id, _)| id.width()).max().unwrap_or(0);
            for (id, record) in &records {
                let pad = " ".repeat(width - id.width());
                println!("  {}{}  {}", id.green(), pad, Value::Object(record.clone()));
            }
        }
        Commands::Clear => {
            history.clear();
            println!("{}", i18n.t("history_cleared").green());
        }
        Commands::Limit { size } => {
            history.set_max_stack_size(size);
            config.history.max_stack_size = history.max_stack_size();
            config.save_to(&base_dir)?;
            println!(
                "{}",
                i18n.t_format("limit_set", &[&history.max_stack_size().to_string()])
                    .green()
            );
        }
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn apply(history: &mut HistoryManager, cmd: Box<dyn Command>, i18n: &I18n) -> Result<()> {
    let description = cmd.describe();
    if !history.execute(cmd) {
        bail!(i18n.t_format("execute_failed", &[&description]));
    }
    println!("{}", i18n.t_format("executed", &[&description]).green().bold());
    Ok(())
}

fn require_scope(kind: EntityKind, scope: Option<&str>, i18n: &I18n) -> Result<()> {
    if kind.is_scoped() && scope.is_none() {
        bail!(i18n.t_format("error_scope_required", &[kind.label()]));
    }
    Ok(())
}

fn parse_record(data: &str, i18n: &I18n) -> Result<Record> {
    match serde_json::from_str::<Value>(data).context(i18n.t("error_invalid_data"))? {
        Value::Object(record) => Ok(record),
        _ => bail!(i18n.t("error_invalid_data")),
    }
}

fn existing(
    store: &JsonFileStore,
    kind: EntityKind,
    scope: Option<&str>,
    id: &str,
    i18n: &I18n,
) -> Result<Record> {
    match store.get(kind, scope, id)? {
        Some(record) => Ok(record),
        None => bail!(i18n.t_format("error_record_not_found", &[kind.label(), id])),
    }
}

fn import_commands(
    handle: &StoreHandle,
    kind: EntityKind,
    scope: Option<&str>,
    file: &Path,
    i18n: &I18n,
) -> Result<Vec<Box<dyn Command>>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("{}: {}", i18n.t("error_read_import"), file.display()))?;
    let entries = match serde_json::from_str::<Value>(&content)
        .context(i18n.t("error_import_not_array"))?
    {
        Value::Array(entries) => entries,
        _ => bail!(i18n.t("error_import_not_array")),
    };

    let mut commands: Vec<Box<dyn Command>> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let Value::Object(record) = entry else {
            bail!(i18n.t("error_import_not_array"));
        };
        let Some(id) = record.get("id").and_then(Value::as_str).map(str::to_string) else {
            bail!(i18n.t_format("error_import_missing_id", &[&(index + 1).to_string()]));
        };
        commands.push(Box::new(EntityCommand::create(
            handle.clone(),
            kind,
            scope,
            id,
            record,
        )));
    }
    Ok(commands)
}

fn confirm(i18n: &I18n, key: &str, description: &str) -> bool {
    print!("{}", i18n.t_format(key, &[description]).yellow());
    io::stdout().flush().ok();
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    i18n.is_yes(&input)
}

fn print_history(
    history: &HistoryManager,
    filter: Option<&str>,
    max_shown: usize,
    redo: bool,
    i18n: &I18n,
) {
    let entries = if redo {
        history.redo_history()
    } else {
        history.history()
    };
    if entries.is_empty() {
        println!("{}", i18n.t("no_history").yellow());
        return;
    }

    let matcher = FzfMatcher::new();
    let ranked = matcher.filter_history(filter.unwrap_or(""), &entries);
    if ranked.is_empty() {
        println!("{}", i18n.t("no_matches").yellow());
        return;
    }

    let title = if redo { "redo_title" } else { "history_title" };
    println!("{}", i18n.t(title).cyan().bold());

    let shown = &ranked[..ranked.len().min(max_shown)];
    let width = shown
        .iter()
        .map(|r| r.entry.description.width())
        .max()
        .unwrap_or(0);
    for ranked_entry in shown {
        let entry = ranked_entry.entry;
        let description = matcher.highlight_matches(&entry.description, &ranked_entry.matched.indices);
        let pad = " ".repeat(width - entry.description.width());
        let marker = if entry.is_batch {
            format!("[{}]", i18n.t("batch_marker")).magenta().to_string()
        } else {
            String::new()
        };
        println!(
            "{:>4}  {}{}  {}  {}",
            ranked_entry.position.to_string().yellow(),
            description,
            pad,
            entry.timestamp.dimmed(),
            marker
        );
    }
    if ranked.len() > shown.len() {
        println!(
            "{}",
            i18n.t_format("more_entries", &[&(ranked.len() - shown.len()).to_string()])
                .dimmed()
        );
    }
    if !redo && history.can_undo() {
        println!();
        println!(
            "{}",
            i18n.t_format("next_undo", &[&history.peek_undo_description()])
                .dimmed()
        );
    }
}

fn print_help(i18n: &I18n) {
    println!("{}", i18n.t("help_about"));
    println!();
    println!("{} ul <COMMAND>", i18n.t("help_label_usage"));
    println!();
    println!("{}", i18n.t("help_label_commands"));
    let commands = [
        ("create", "help_create"),
        ("update", "help_update"),
        ("delete", "help_delete"),
        ("import", "help_import"),
        ("undo", "help_undo"),
        ("redo", "help_redo"),
        ("history", "help_history"),
        ("show", "help_show"),
        ("clear", "help_clear"),
        ("limit", "help_limit"),
    ];
    let width = commands.iter().map(|(name, _)| name.width()).max().unwrap_or(0);
    for (name, key) in commands {
        let pad = " ".repeat(width - name.width());
        println!("  {}{}  {}", name.green(), pad, i18n.t(key));
    }
    println!("  {}", i18n.t("help_kinds").dimmed());
    println!();
    println!("{}", i18n.t("help_label_options"));
    println!("  -h, --help  Print help");
    println!();
    println!("{}", i18n.t("help_config_section"));
    println!("  - {}", i18n.t("help_config_history"));
    println!("  - {}", i18n.t("help_config_display"));
    println!("  - {}", i18n.t("help_log_env"));
}
