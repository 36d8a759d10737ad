use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use assembly_engine::{Gateway, RequestExecutor, RequestParams};
use assembly_registry::catalog::{MASTER_LIST_ENDPOINT, rows_from_master_list};
use assembly_registry::{
    CachePolicy, FileSpecCache, HttpDocumentFetcher, ServiceCatalog, SpecParser, SpecResolver,
};
use assembly_types::{OutputFormat, RequestOutcome, ServiceId};
use assembly_util::GatewayConfig;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use serde_json::Value;
use tracing::{Level, info, warn};

const DEFAULT_SYNC_CONCURRENCY: usize = 4;
const DEFAULT_MAX_PAGES: u32 = 10;
const DEFAULT_CATALOG_MAX_PAGES: u32 = 50;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let matches = build_cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("resolve", sub)) => run_resolve(&config, sub).await,
        Some(("call", sub)) => run_call(&config, sub).await,
        Some(("rows", sub)) => run_rows(&config, sub).await,
        Some(("sync", sub)) => run_sync(&config, sub).await,
        Some(("catalog", sub)) => run_catalog(&config, sub).await,
        Some(("cache", sub)) => run_cache(&config, sub),
        other => anyhow::bail!("unknown command: {:?}", other.map(|(name, _)| name)),
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_cli() -> Command {
    let service_id = || Arg::new("service-id").required(true).value_name("ID").help("Service identifier, e.g. OK7XM1000938DS17215");
    let param = || {
        Arg::new("param")
            .long("param")
            .short('p')
            .action(ArgAction::Append)
            .value_name("NAME=VALUE")
            .help("Request parameter; repeatable")
    };

    Command::new("assembly")
        .about("Query the National Assembly open-data API by service identifier")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("Path to the JSON config file"),
        )
        .subcommand(
            Command::new("resolve")
                .about("Print the resolved endpoint and parameter contract")
                .arg(service_id())
                .arg(Arg::new("refresh").long("refresh").action(ArgAction::SetTrue).help("Ignore the cached spec")),
        )
        .subcommand(
            Command::new("call")
                .about("Request one page of a service")
                .arg(service_id())
                .arg(param())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .action(ArgAction::Set)
                        .default_value("json")
                        .value_parser(["json", "xml"])
                        .help("Response format"),
                ),
        )
        .subcommand(
            Command::new("rows")
                .about("Collect rows across pages as a JSON array")
                .arg(service_id())
                .arg(param())
                .arg(max_pages_arg("10")),
        )
        .subcommand(
            Command::new("sync")
                .about("Resolve and cache the spec of every catalog service")
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(usize))
                        .default_value("4")
                        .help("Resolutions running at once"),
                )
                .arg(Arg::new("refresh").long("refresh").action(ArgAction::SetTrue).help("Drop cached specs first")),
        )
        .subcommand(
            Command::new("catalog")
                .about("Manage the service catalog")
                .subcommand_required(true)
                .subcommand(
                    Command::new("update")
                        .about("Download the master service list")
                        .arg(max_pages_arg("50")),
                ),
        )
        .subcommand(
            Command::new("cache")
                .about("Inspect or clear cached specs")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List cached specs"))
                .subcommand(
                    Command::new("clear")
                        .about("Remove one cached spec, or all of them")
                        .arg(Arg::new("service-id").value_name("ID")),
                ),
        )
}

fn max_pages_arg(default: &'static str) -> Arg {
    Arg::new("max-pages")
        .long("max-pages")
        .action(ArgAction::Set)
        .value_parser(value_parser!(u32))
        .default_value(default)
        .help("Stop after this many pages")
}

fn load_config(matches: &ArgMatches) -> Result<GatewayConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let mut config = GatewayConfig::load_file(path).with_context(|| format!("reading {}", path.display()))?;
            config.apply_env_overrides()?;
            config
        }
        None => GatewayConfig::load()?,
    };
    Ok(config)
}

fn service_id_arg(matches: &ArgMatches) -> Result<ServiceId> {
    let raw = matches.get_one::<String>("service-id").context("missing service identifier")?;
    Ok(ServiceId::parse(raw)?)
}

fn params_arg(matches: &ArgMatches) -> Result<RequestParams> {
    let mut params = RequestParams::new();
    for raw in matches.get_many::<String>("param").into_iter().flatten() {
        let (name, value) = RequestParams::parse_pair(raw)?;
        params.insert(name, value);
    }
    Ok(params)
}

/// Catalog from the configured path; a missing or unreadable file means none.
fn load_catalog(config: &GatewayConfig) -> Option<Arc<ServiceCatalog>> {
    let path = config.catalog_path();
    if !path.exists() {
        return None;
    }
    match ServiceCatalog::load(&path) {
        Ok(catalog) => Some(Arc::new(catalog)),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable service catalog");
            None
        }
    }
}

fn spec_cache(config: &GatewayConfig) -> Arc<FileSpecCache> {
    Arc::new(FileSpecCache::new(config.spec_cache_dir(), CachePolicy::default()))
}

fn build_resolver(config: &GatewayConfig) -> Result<SpecResolver> {
    let catalog = load_catalog(config);
    let mut fetcher = HttpDocumentFetcher::from_config(config)?;
    if let Some(catalog) = &catalog {
        fetcher = fetcher.with_catalog(Arc::clone(catalog));
    }
    let mut builder = SpecResolver::builder(Arc::new(fetcher), spec_cache(config))
        .parser(SpecParser::new(&config.api_base)?);
    if let Some(catalog) = catalog {
        builder = builder.catalog(catalog);
    }
    Ok(builder.build())
}

fn build_gateway(config: &GatewayConfig) -> Result<Gateway> {
    let resolver = build_resolver(config)?;
    let executor = RequestExecutor::from_config(config)?;
    Ok(Gateway::new(resolver, executor))
}

async fn run_resolve(config: &GatewayConfig, matches: &ArgMatches) -> Result<()> {
    let service_id = service_id_arg(matches)?;
    let resolver = build_resolver(config)?;
    let spec = if matches.get_flag("refresh") {
        resolver.refresh(&service_id).await?
    } else {
        resolver.resolve(&service_id).await?
    };
    println!("{}", serde_json::to_string_pretty(spec.as_ref())?);
    Ok(())
}

async fn run_call(config: &GatewayConfig, matches: &ArgMatches) -> Result<()> {
    let service_id = service_id_arg(matches)?;
    let params = params_arg(matches)?;
    let format: OutputFormat = matches
        .get_one::<String>("format")
        .map(|raw| raw.parse())
        .transpose()?
        .unwrap_or_default();

    let gateway = build_gateway(config)?;
    match gateway.call(&service_id, &params, format).await? {
        RequestOutcome::Success { payload, embedded, .. } => {
            if payload.is_empty() {
                let note = embedded.map(|status| status.message).unwrap_or_default();
                eprintln!("no data returned for {service_id} {note}");
            } else {
                println!("{payload}");
            }
            Ok(())
        }
        RequestOutcome::Failure(failure) => Err(failure).with_context(|| format!("request for {service_id} failed")),
    }
}

async fn run_rows(config: &GatewayConfig, matches: &ArgMatches) -> Result<()> {
    let service_id = service_id_arg(matches)?;
    let params = params_arg(matches)?;
    let max_pages = matches.get_one::<u32>("max-pages").copied().unwrap_or(DEFAULT_MAX_PAGES);

    let gateway = build_gateway(config)?;
    let rows = gateway.collect_rows(&service_id, &params, max_pages).await?;
    println!("{}", serde_json::to_string_pretty(&Value::Array(rows))?);
    Ok(())
}

async fn run_sync(config: &GatewayConfig, matches: &ArgMatches) -> Result<()> {
    let catalog = load_catalog(config).with_context(|| {
        format!(
            "no service catalog at {}; run `assembly catalog update` first",
            config.catalog_path().display()
        )
    })?;
    let concurrency = matches.get_one::<usize>("concurrency").copied().unwrap_or(DEFAULT_SYNC_CONCURRENCY);
    let resolver = build_resolver(config)?;
    if matches.get_flag("refresh") {
        resolver.invalidate_all()?;
    }

    let results = resolver.prefetch(catalog.service_ids().cloned(), concurrency).await;
    let mut failed = 0usize;
    for (service_id, result) in &results {
        match result {
            Ok(spec) => println!("ok     {service_id} -> {}", spec.endpoint_path),
            Err(error) => {
                failed += 1;
                println!("failed {service_id}: {error}");
            }
        }
    }
    info!(resolved = results.len() - failed, failed, "sync finished");
    if failed > 0 {
        anyhow::bail!("{failed} of {} services failed to resolve", results.len());
    }
    Ok(())
}

async fn run_catalog(config: &GatewayConfig, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("update", sub)) => {
            let max_pages = sub.get_one::<u32>("max-pages").copied().unwrap_or(DEFAULT_CATALOG_MAX_PAGES);
            let executor = RequestExecutor::from_config(config)?;
            let rows = executor
                .collect_endpoint_rows(MASTER_LIST_ENDPOINT, &RequestParams::new(), max_pages)
                .await
                .context("downloading the master service list")?;

            let page = serde_json::json!({ MASTER_LIST_ENDPOINT: [{ "row": rows }] });
            let catalog = ServiceCatalog::from_entries(rows_from_master_list(&page)?);
            let path = config.catalog_path();
            catalog.save(&path).with_context(|| format!("writing {}", path.display()))?;
            println!("saved {} services to {}", catalog.len(), path.display());
            Ok(())
        }
        other => anyhow::bail!("unknown command: {:?}", other.map(|(name, _)| name)),
    }
}

fn run_cache(config: &GatewayConfig, matches: &ArgMatches) -> Result<()> {
    let cache = spec_cache(config);
    match matches.subcommand() {
        Some(("list", _)) => {
            let entries = cache.entries()?;
            if entries.is_empty() {
                println!("no cached specs in {}", cache.dir().display());
            }
            for entry in entries {
                println!(
                    "{}\t{}\t{}",
                    entry.service_id,
                    entry.spec.endpoint_path,
                    entry.retrieved_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(())
        }
        Some(("clear", sub)) => {
            let resolver = SpecResolver::new(Arc::new(HttpDocumentFetcher::from_config(config)?), cache);
            match sub.get_one::<String>("service-id") {
                Some(raw) => {
                    let service_id = ServiceId::parse(raw)?;
                    resolver.invalidate(&service_id)?;
                    println!("cleared {service_id}");
                }
                None => {
                    resolver.invalidate_all()?;
                    println!("cleared every cached spec");
                }
            }
            Ok(())
        }
        other => anyhow::bail!("unknown command: {:?}", other.map(|(name, _)| name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn repeated_params_keep_their_order() {
        let matches = build_cli()
            .try_get_matches_from(["assembly", "call", "OK7XM1000938DS17215", "-p", "AGE=22", "-p", "HG_NM=홍길동"])
            .unwrap();
        let (_, call) = matches.subcommand().unwrap();
        let params = params_arg(call).unwrap();
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, [("AGE", "22"), ("HG_NM", "홍길동")]);
        assert_eq!(call.get_one::<String>("format").map(String::as_str), Some("json"));
    }

    #[test]
    fn malformed_param_is_rejected() {
        let matches = build_cli()
            .try_get_matches_from(["assembly", "rows", "OK7XM1000938DS17215", "-p", "AGE"])
            .unwrap();
        let (_, rows) = matches.subcommand().unwrap();
        assert!(params_arg(rows).is_err());
        assert_eq!(rows.get_one::<u32>("max-pages"), Some(&DEFAULT_MAX_PAGES));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let result = build_cli().try_get_matches_from(["assembly", "call", "OK7XM1000938DS17215", "--format", "csv"]);
        assert!(result.is_err());
    }
}
