use std::process::ExitCode;

use clap::{Parser, Subcommand};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use precios_admin::config::{AppConfig, ConfigError};
use precios_admin::domain::{
    entities::iso_date, new_price_item, recalculate_list, try_evaluate_formula, validate_formula,
    ActingUser, CatalogState, FormulaError, PriceList, ProductFilter, RecalculationReport,
};
use precios_admin::infra::{AdminClient, AdminClientError, ApplyOutcome, CacheStatus};
use precios_admin::util::persistence::{load_persisted_state, save_persisted_state};
use precios_admin::util::version::{version_label, APP_NAME};

#[derive(Debug, Parser)]
#[command(name = "precios-admin", version, about = "Price list maintenance from the terminal")]
struct Cli {
    /// Overrides the configured backend base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a price formula locally.
    Eval {
        #[arg(allow_negative_numbers = true)]
        cost: f64,
        formula: String,
    },
    /// Print active price lists with their validity window.
    Lists,
    /// List products through the saved filter, optionally refining it.
    Products {
        #[arg(long = "brand")]
        brands: Vec<String>,
        #[arg(long = "category")]
        categories: Vec<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        /// Include inactive and deleted products.
        #[arg(long)]
        inactive: bool,
        /// Remember the resulting filter for later runs.
        #[arg(long)]
        save: bool,
    },
    /// Recompute a list's prices from their formulas and report drift.
    Recalc {
        /// Defaults to the last list recalculated.
        list_id: Option<String>,
        /// Push corrected prices for drifted items.
        #[arg(long)]
        apply: bool,
    },
    /// Create a price item for one presentation in a list.
    AddPrice {
        list_id: String,
        presentation_id: String,
        sku: String,
        cost: f64,
        /// Defaults to the list's formula, or plain cost.
        #[arg(long)]
        formula: Option<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] AdminClientError),
    #[error("invalid formula: {0}")]
    Formula(#[from] FormulaError),
    #[error("no price list given and none remembered from a previous run")]
    NoListSelected,
    #[error("price list {0} not found")]
    UnknownList(String),
    #[error("{failed} of {total} price updates failed")]
    PartialApply { failed: usize, total: usize },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Eval { cost, formula } => {
            let price = try_evaluate_formula(Some(cost), &formula)?;
            println!("{price:.2}");
            Ok(())
        }
        Command::Lists => {
            let (client, _) = connect(cli.base_url)?;
            print_lists(&client).await
        }
        Command::Products {
            brands,
            categories,
            search,
            min_price,
            max_price,
            inactive,
            save,
        } => {
            let (client, _) = connect(cli.base_url)?;
            let refine = FilterArgs {
                brands,
                categories,
                search,
                min_price,
                max_price,
                inactive,
            };
            print_products(&client, refine, save).await
        }
        Command::Recalc { list_id, apply } => {
            let (client, user) = connect(cli.base_url)?;
            recalc(&client, &user, list_id, apply).await
        }
        Command::AddPrice {
            list_id,
            presentation_id,
            sku,
            cost,
            formula,
        } => {
            let (client, user) = connect(cli.base_url)?;
            add_price(&client, &user, &list_id, &presentation_id, &sku, cost, formula).await
        }
    }
}

fn connect(base_url: Option<String>) -> Result<(AdminClient, ActingUser), CliError> {
    let mut config = AppConfig::load()?;
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    let user = config.acting_user()?;
    let client = AdminClient::with_base_url(&config.base_url)?.with_ttl(config.cache_ttl());
    info!(app = APP_NAME, version = %version_label(), base_url = %client.base_url(), "starting");
    Ok((client, user))
}

async fn print_lists(client: &AdminClient) -> Result<(), CliError> {
    let payload = client.get_price_lists().await?;
    if payload.status == CacheStatus::Stale {
        warn!("backend unreachable; showing the last fetched price lists");
    }

    let today = OffsetDateTime::now_utc().date();
    for list in payload.data.iter().filter(|list| list.active) {
        let window = match (list.valid_from, list.valid_until) {
            (None, None) => "open".to_string(),
            (from, until) => format!(
                "{} .. {}",
                from.map(iso_date::format).unwrap_or_default(),
                until.map(iso_date::format).unwrap_or_default()
            ),
        };
        let marker = if list.is_valid_on(today) { "*" } else { " " };
        println!("{marker} {:<20} {:<32} {window}", list.id, list.description);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct FilterArgs {
    brands: Vec<String>,
    categories: Vec<String>,
    search: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    inactive: bool,
}

impl FilterArgs {
    /// Flags given on the command line replace the matching saved fields.
    fn refine(self, filter: &mut ProductFilter) {
        if !self.brands.is_empty() {
            filter.brands = self.brands.into_iter().collect();
        }
        if !self.categories.is_empty() {
            filter.categories = self.categories.into_iter().collect();
        }
        if let Some(search) = self.search {
            filter.search = search;
        }
        if self.min_price.is_some() {
            filter.min_price = self.min_price;
        }
        if self.max_price.is_some() {
            filter.max_price = self.max_price;
        }
        if self.inactive {
            filter.show_inactive = true;
        }
    }
}

async fn print_products(
    client: &AdminClient,
    refine: FilterArgs,
    save: bool,
) -> Result<(), CliError> {
    let persisted = load_persisted_state().unwrap_or_default();
    let last_list = persisted.last_price_list.clone();
    let mut catalog = CatalogState::default();
    catalog.apply_persisted(persisted);
    refine.refine(&mut catalog.filter);

    // Reference prices come from the last list worked on.
    if let Some(list_id) = &last_list {
        match client.get_prices_by_list(list_id).await {
            Ok(items) => catalog.replace_price_items(list_id, items),
            Err(err) => catalog.report_error(format!("prices for {list_id} unavailable: {err}")),
        }
    }

    let products = client.get_products().await?;
    if products.status == CacheStatus::Stale {
        catalog.report_error("backend unreachable; showing the last fetched products");
    }
    catalog.replace_products(products.data);

    if let Some(banner) = &catalog.banner {
        warn!("{banner}");
    }
    for product in catalog.visible_products() {
        let price = product
            .reference_price
            .map(|price| format!("{price:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<36} {:<16} {price:>10}",
            product.sku, product.name, product.brand
        );
    }
    let brands: Vec<String> = catalog
        .filter
        .available_brands(&catalog.products)
        .into_iter()
        .collect();
    let categories: Vec<String> = catalog
        .filter
        .available_categories(&catalog.products)
        .into_iter()
        .collect();
    println!("brands: {}", brands.join(", "));
    println!("categories: {}", categories.join(", "));

    if save {
        if let Err(err) = save_persisted_state(&catalog.to_persisted(last_list)) {
            warn!(%err, "could not save the product filter");
        }
    }
    Ok(())
}

async fn recalc(
    client: &AdminClient,
    user: &ActingUser,
    list_id: Option<String>,
    apply: bool,
) -> Result<(), CliError> {
    let persisted = load_persisted_state().unwrap_or_default();
    let list_id = list_id
        .or_else(|| persisted.last_price_list.clone())
        .ok_or(CliError::NoListSelected)?;
    let mut catalog = CatalogState::default();
    catalog.apply_persisted(persisted);

    let result = recalc_list(client, user, &mut catalog, &list_id, apply).await;

    if let Err(err) = save_persisted_state(&catalog.to_persisted(Some(list_id))) {
        warn!(%err, "could not remember the selected price list");
    }
    result
}

async fn recalc_list(
    client: &AdminClient,
    user: &ActingUser,
    catalog: &mut CatalogState,
    list_id: &str,
    apply: bool,
) -> Result<(), CliError> {
    catalog.replace_price_items(list_id, client.get_prices_by_list(list_id).await?);
    let report = recalculate_list(catalog.price_items(list_id), list_id);
    print_report(list_id, &report);

    if !apply || report.drifted.is_empty() {
        return Ok(());
    }

    let outcome = client
        .apply_drift(user, catalog.price_items(list_id), &report.drifted)
        .await;

    catalog.replace_price_items(list_id, client.get_prices_by_list(list_id).await?);
    let after = recalculate_list(catalog.price_items(list_id), list_id);
    info!(
        updated = outcome.updated.len(),
        remaining = after.drifted.len(),
        "recalculation applied"
    );
    ensure_applied(&outcome)
}

fn ensure_applied(outcome: &ApplyOutcome) -> Result<(), CliError> {
    if outcome.is_complete() {
        return Ok(());
    }
    Err(CliError::PartialApply {
        failed: outcome.failed.len(),
        total: outcome.total(),
    })
}

fn print_report(list_id: &str, report: &RecalculationReport) {
    println!(
        "{list_id}: {} checked, {} drifted, {} without usable formula",
        report.checked,
        report.drifted.len(),
        report.unusable.len()
    );
    for drift in &report.drifted {
        let stored = drift
            .stored
            .map(|price| format!("{price:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<20} {:<20} {stored:>10} -> {:>10.2} ({:+.2})",
            drift.price_id,
            drift.presentation_id,
            drift.computed,
            drift.delta()
        );
    }
}

async fn add_price(
    client: &AdminClient,
    user: &ActingUser,
    list_id: &str,
    presentation_id: &str,
    sku: &str,
    cost: f64,
    formula: Option<String>,
) -> Result<(), CliError> {
    let lists = client.get_price_lists().await?.data;
    let list: &PriceList = lists
        .iter()
        .find(|list| list.id == list_id)
        .ok_or_else(|| CliError::UnknownList(list_id.to_string()))?;

    let formula = formula
        .or_else(|| list.default_formula.clone())
        .unwrap_or_else(|| "COSTO".to_string());
    validate_formula(&formula)?;

    let item = new_price_item(list_id, presentation_id, sku, cost, &formula);
    let created = client.add_one(user, &item).await?;
    println!(
        "{} {} {}",
        created.id,
        created.presentation_id,
        created
            .sale_price
            .map(|price| format!("{price:.2}"))
            .unwrap_or_default()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn price_json(id: &str, presentation: &str, stored: f64) -> Value {
        json!({
            "IdPrecioOK": id,
            "IdListaOK": "L-1",
            "IdPresentaOK": presentation,
            "SKUID": "SKU-1",
            "CostoIni": 10.0,
            "Formula": "COSTO * 2",
            "Precio": stored
        })
    }

    async fn backend_with_prices(update_status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ztprecios-items/crud"))
            .and(query_param("ProcessType", "GetAll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                price_json("P-1", "A", 18.0),
                price_json("P-2", "B", 20.0)
            ])))
            .mount(&server)
            .await;
        let update = if update_status == 200 {
            ResponseTemplate::new(200)
                .set_body_json(json!({ "dataRes": price_json("P-1", "A", 20.0) }))
        } else {
            ResponseTemplate::new(update_status).set_body_json(json!({ "error": "rejected" }))
        };
        Mock::given(method("POST"))
            .and(path("/ztprecios-items/crud"))
            .and(query_param("ProcessType", "UpdateOne"))
            .and(query_param("IdPrecioOK", "P-1"))
            .and(query_param("LoggedUser", "jlopez"))
            .respond_with(update)
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn failed_price_updates_make_recalc_fail() {
        let server = backend_with_prices(500).await;
        let client = AdminClient::with_base_url(&server.uri()).unwrap();
        let mut catalog = CatalogState::default();

        let err = recalc_list(&client, &ActingUser::new("jlopez"), &mut catalog, "L-1", true)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::PartialApply { failed: 1, total: 1 }));
        assert_eq!(catalog.price_items("L-1").len(), 2);
    }

    #[tokio::test]
    async fn successful_updates_complete_recalc() {
        let server = backend_with_prices(200).await;
        let client = AdminClient::with_base_url(&server.uri()).unwrap();
        let mut catalog = CatalogState::default();

        recalc_list(&client, &ActingUser::new("jlopez"), &mut catalog, "L-1", true)
            .await
            .unwrap();
    }

    #[test]
    fn command_line_flags_override_saved_filter() {
        let mut filter = ProductFilter {
            search: "agua".into(),
            ..ProductFilter::default()
        };
        filter.brands.insert("Bonafont".into());

        FilterArgs {
            categories: vec!["bebidas".into()],
            max_price: Some(30.0),
            ..FilterArgs::default()
        }
        .refine(&mut filter);

        assert_eq!(filter.search, "agua");
        assert!(filter.brands.contains("Bonafont"));
        assert!(filter.categories.contains("bebidas"));
        assert_eq!(filter.max_price, Some(30.0));
    }
}
