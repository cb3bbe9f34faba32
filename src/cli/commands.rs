//! Command dispatch

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use tracing::{debug, instrument};

use crate::application::services::selectors::load_passive_directives;
use crate::application::services::{selectors, SessionStats};
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{DirectiveSet, SelectorDirective};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::page::Page;
use crate::infrastructure::traits::{ManualClock, SystemClock};
use crate::infrastructure::InfraError;

/// Execute a parsed command line.
pub fn execute(cli: Cli) -> CliResult<()> {
    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|e| InfraError::io("get current directory", e))?,
    };

    match cli.command {
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Some(Commands::Config { command }) => cmd_config(command, &config_dir),
        Some(command) => {
            let settings = Settings::load(Some(&config_dir))?;
            let container = ServiceContainer::new(settings);
            match command {
                Commands::Run {
                    bundle,
                    selectors,
                    store,
                    output,
                    fast,
                    no_remote,
                    passive,
                } => cmd_run(
                    &container,
                    RunOptions {
                        bundle,
                        selectors,
                        store,
                        output,
                        fast,
                        remote: !no_remote,
                        passive,
                    },
                ),
                Commands::Parse { selectors, store } => {
                    cmd_parse(&container, &selectors, store.as_deref())
                }
                Commands::Tree { bundle } => cmd_tree(&container, &bundle),
                Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
            }
        }
        None => Err(CliError::Usage(
            "no command given, see `domprune --help`".to_string(),
        )),
    }
}

#[derive(Debug)]
struct RunOptions {
    bundle: PathBuf,
    selectors: Vec<String>,
    store: Option<PathBuf>,
    output: Option<PathBuf>,
    fast: bool,
    remote: bool,
    passive: bool,
}

#[instrument(skip(container))]
fn cmd_run(container: &ServiceContainer, opts: RunOptions) -> CliResult<()> {
    let (bundle, mut page) = container.open_bundle(&opts.bundle)?;

    let directives = if !opts.selectors.is_empty() {
        DirectiveSet::parse(&opts.selectors)
    } else {
        let store = container.store(opts.store.as_deref());
        let settings = &container.settings;
        if opts.passive {
            load_passive_directives(&store, &settings.store_key, &settings.default_selector)
        } else {
            selectors::load_directives(&store, &settings.store_key)
        }
    };
    if directives.is_empty() {
        output::warning("no selectors, nothing to prune");
    }
    debug!(directives = directives.len(), "starting session");

    let mut session = if opts.passive {
        container.passive_session(directives)
    } else {
        container.session(directives, opts.remote)
    };
    let stats = if opts.fast {
        session.run(&mut page, &mut ManualClock::new())
    } else {
        session.run(&mut page, &mut SystemClock::new())
    };
    print_stats(&stats);

    if let Some(out) = &opts.output {
        let written = bundle.write_pruned(container.fs.as_ref(), &page, out)?;
        for path in written {
            output::written(&path);
        }
    }
    Ok(())
}

fn print_stats(stats: &SessionStats) {
    output::section("Pruning summary");
    output::row("initial pass", &stats.initial);
    output::row("observers", &stats.observed);
    output::row("retries", &format!("{} ({} passes)", stats.retried, stats.retries));
    output::row(
        "remote",
        &format!(
            "{} ({} dispatches, {} failed)",
            stats.remote, stats.dispatches, stats.remote_failures
        ),
    );
    output::row(
        "observations",
        &format!(
            "{} installed, {} cancelled",
            stats.handles_installed, stats.handles_cancelled
        ),
    );
    output::success(&format!("{} elements removed", stats.total()));
}

fn cmd_parse(container: &ServiceContainer, raw: &[String], store: Option<&Path>) -> CliResult<()> {
    let directives = if raw.is_empty() {
        let store = container.store(store);
        selectors::load_directives(&store, &container.settings.store_key)
    } else {
        DirectiveSet::parse(raw)
    };

    if directives.is_empty() {
        output::warning("no selectors");
        return Ok(());
    }
    for directive in &directives {
        match directive {
            SelectorDirective::Normal { selector } => {
                output::row("normal", &format!("{selector:?}"));
            }
            SelectorDirective::FrameScoped {
                frame_selector,
                element_selector,
            } => {
                output::row(
                    "frame-scoped",
                    &format!("{frame_selector:?} -> {element_selector:?}"),
                );
            }
        }
    }
    Ok(())
}

fn cmd_tree(container: &ServiceContainer, bundle_dir: &Path) -> CliResult<()> {
    let (bundle, page) = container.open_bundle(bundle_dir)?;
    output::data(&page.frame_tree());

    let manifest = bundle.manifest();
    let delayed: Vec<_> = manifest
        .documents
        .iter()
        .filter_map(|d| d.load_after_ms.map(|ms| (d, ms)))
        .collect();
    if !delayed.is_empty() || !manifest.inserts.is_empty() {
        output::section("Timeline");
        for (doc, ms) in delayed {
            output::row(&format!("{ms}ms"), &format!("load {}", doc.url));
        }
        for insert in &manifest.inserts {
            output::row(
                &format!("{}ms", insert.at_ms),
                &format!("insert into {} ({})", insert.document, insert.parent),
            );
        }
    }
    print_documents(&page);
    Ok(())
}

fn print_documents(page: &Page) {
    output::section("Documents");
    for (url, doc) in page.named_documents() {
        output::row(&doc.to_string(), &url);
    }
}

fn cmd_config(command: ConfigCommands, config_dir: &Path) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(Some(config_dir))?;
            output::data(&settings.to_toml()?);
        }
        ConfigCommands::Path => {
            let describe = |path: &Path| {
                let state = if path.exists() { "exists" } else { "not found" };
                format!("{} ({state})", path.display())
            };
            match global_config_path() {
                Some(path) => output::row("global", &describe(&path)),
                None => output::warning("no global config directory on this platform"),
            }
            output::row("local", &describe(&local_config_path(config_dir)));
        }
        ConfigCommands::Init { global } => {
            let path = if global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("no global config directory on this platform".to_string())
                })?
            } else {
                local_config_path(config_dir)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::success(&format!("Created {}", path.display()));
        }
    }
    Ok(())
}
