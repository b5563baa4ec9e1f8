use std::cmp;
use std::error::Error;
use std::path::PathBuf;

use atty::Stream;
use clap::{Parser, Subcommand};
use depot_web::{Manifest, PackageIndex, RegistryConfig};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};

#[derive(Parser, Debug)]
#[command(name = "depot-web", about = "Serve and query a package depot", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Path to the registry configuration file (defaults to ./Depot.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the manifest directory from the configuration.
    #[arg(long, global = true)]
    packages_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web front end.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind the HTTP listener to.
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: std::net::SocketAddr,
        /// Page theme, either `bootstrap` or `tailwind`.
        #[arg(long, default_value = "bootstrap")]
        theme: depot_web::web::WebTheme,
        /// Public base URL, when it differs from the bind address.
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Search the catalog without starting a server.
    Search {
        /// Text to match.
        query: String,
        /// Field to match against: name, category, description or tags.
        #[arg(long, default_value = "name")]
        by: String,
        /// Require the field to equal the query instead of containing it.
        #[arg(long)]
        exact: bool,
        /// Maximum number of matches to print.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the full manifest of a package.
    Show {
        /// Package category.
        category: String,
        /// Package name.
        name: String,
    },
}

/// Error line printed by the binary when a subcommand fails.
pub fn failure_message(err: &(dyn Error + 'static)) -> String {
    format!("depot-web: {err}")
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RegistryConfig::load_from(path)?,
        None => RegistryConfig::load()?,
    };
    let packages_dir = cli
        .packages_dir
        .clone()
        .unwrap_or_else(|| config.packages_dir.clone());

    match cli.command {
        #[cfg(feature = "web")]
        Command::Serve {
            addr,
            theme,
            base_url,
        } => handle_serve(config, &packages_dir, addr, theme, base_url),
        Command::Search {
            query,
            by,
            exact,
            limit,
        } => handle_search(&packages_dir, &query, &by, exact, limit, cli.json),
        Command::Show { category, name } => handle_show(&packages_dir, &category, &name, cli.json),
    }
}

#[cfg(feature = "web")]
fn handle_serve(
    config: RegistryConfig,
    packages_dir: &std::path::Path,
    addr: std::net::SocketAddr,
    theme: depot_web::web::WebTheme,
    base_url: Option<String>,
) -> Result<(), Box<dyn Error>> {
    use depot_web::web::{self, WebConfig};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let index = PackageIndex::load_dir(packages_dir)?;
    let web_config = WebConfig {
        addr,
        theme,
        base_url: base_url.unwrap_or_else(|| format!("http://{addr}")),
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(web::serve(web_config, config, index))?;
    Ok(())
}

fn handle_search(
    packages_dir: &std::path::Path,
    query: &str,
    by: &str,
    exact: bool,
    limit: usize,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let limit = cmp::max(1, limit);
    let index = PackageIndex::load_dir(packages_dir)?;
    let mut matches = index.search(query, by, exact);
    matches.truncate(limit);

    if as_json {
        let payload = json!({
            "query": query,
            "search_by": by,
            "exact_match": exact,
            "limit": limit,
            "results": matches.iter().map(|manifest| {
                json!({
                    "category": manifest.category,
                    "name": manifest.name,
                    "latest_version": manifest.latest_version().map(|v| v.to_string()),
                    "description": manifest.metadata.description,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_search_table(query, by, &matches);
    }
    Ok(())
}

fn handle_show(
    packages_dir: &std::path::Path,
    category: &str,
    name: &str,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let index = PackageIndex::load_dir(packages_dir)?;
    let manifest = index
        .manifest_of(category, name)
        .ok_or_else(|| format!("No package found for {category}/{name}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(manifest)?);
    } else {
        print_manifest(manifest);
    }
    Ok(())
}

fn print_search_table(query: &str, by: &str, rows: &[&Manifest]) {
    if rows.is_empty() {
        println!("No packages matched \"{query}\" by {by}.");
        return;
    }
    let width = rows
        .iter()
        .map(|manifest| manifest.short_name().len())
        .max()
        .unwrap_or(7)
        .max("PACKAGE".len());
    println!("Matches for \"{query}\" by {by}:");
    println!("{:<width$}  {}", "PACKAGE", "LATEST", width = width);
    println!("{:-<width$}  {}", "", "-------", width = width);
    for manifest in rows {
        let latest = manifest
            .latest_version()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<unreleased>".to_string());
        println!(
            "{:<width$}  {}",
            manifest.short_name(),
            latest,
            width = width
        );
    }
}

fn print_manifest(manifest: &Manifest) {
    println!("Package: {}", manifest.short_name());
    if let Some(maintainer) = &manifest.metadata.maintainer {
        println!("Maintainer: {maintainer}");
    }
    if !manifest.metadata.licenses.is_empty() {
        println!("Licenses: {}", manifest.metadata.licenses.join(", "));
    }
    if let Some(upstream) = &manifest.metadata.upstream_url {
        println!("Upstream: {upstream}");
    }
    if !manifest.metadata.tags.is_empty() {
        println!("Tags: {}", manifest.metadata.tags.join(", "));
    }

    render_markdown_block("Description", &manifest.metadata.description);

    println!("\nVersions:");
    for (version, data) in manifest.sorted_versions() {
        println!(
            "- {} (published {})",
            version,
            data.published.format("%Y-%m-%d")
        );
        for (dep, req) in &data.dependencies {
            println!("    requires {dep} {req}");
        }
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        let formatted = FmtText::from(&skin, trimmed, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn failure_message_names_the_binary() {
        let err: Box<dyn Error> = "no package found".into();
        assert_eq!(failure_message(err.as_ref()), "depot-web: no package found");
    }
}
