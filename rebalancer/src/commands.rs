//! CLI workflows: price lookups, plan, run, reconcile, status.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use folio::{Exchange, GroupDifference, RebalancePlan, Recommendation};
use folio_broker::kis::auth::KisAuth;
use folio_broker::kis::client::KisClient;
use folio_broker::kis::{KisAccount, KisBroker};
use folio_broker::{CredentialManager, CredentialStore, Credentials, FileCredentialStore};
use log::info;

use crate::audit::AuditLog;
use crate::broker::RefreshingGateway;
use crate::cache::JsonPriceCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::execution::{
    ExecutionStatus, ExecutionSummary, Executor, IntentPlan, MemoryLog, OrderIntent,
    build_intents,
};
use crate::portfolio::PortfolioFile;
use crate::reconcile;
use crate::resolver::QuoteResolver;
use crate::sync::PortfolioSync;
use crate::valuation::{Valuation, value_portfolio};

/// Options for a rebalance run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub portfolio: PathBuf,
}

/// Brokerage handles built from the config.
pub struct Session {
    pub credentials: Credentials,
    pub broker: KisBroker,
}

impl Session {
    pub fn connect(config: &Config) -> Result<Self> {
        let client = KisClient::new(
            &config.connection.base_url,
            &config.connection.app_key,
            &config.connection.app_secret,
            config.timeout(),
        )?;
        let manager = CredentialManager::new(
            KisAuth::new(client.clone()),
            FileCredentialStore::new(config.credential_path()),
        )
        .with_skew(config.skew());
        let credentials = Credentials::new(manager);
        let account = KisAccount {
            number: config.account.number.clone(),
            product_code: config.account.product_code.clone(),
        };
        let broker = KisBroker::new(client, credentials.clone(), account);
        Ok(Self {
            credentials,
            broker,
        })
    }

    pub fn resolver(&self, config: &Config) -> Result<QuoteResolver<&KisBroker, JsonPriceCache>> {
        let cache = JsonPriceCache::open(config.cache_path())?;
        Ok(QuoteResolver::new(&self.broker, cache).with_exchanges(config.quotes.exchanges.clone()))
    }
}

/// Print the current quote for one ticker.
pub fn show_price(config: &Config, ticker: &str, exchange: Option<Exchange>) -> Result<()> {
    let session = Session::connect(config)?;
    let mut resolver = session.resolver(config)?;
    let q = resolver.resolve(ticker, exchange);

    let listing = q.exchange.map(|e| e.to_string()).unwrap_or_else(|| "-".into());
    println!(
        "{} {} ({}, {}): {} {}",
        q.ticker,
        if q.has_name() { q.name.as_str() } else { "?" },
        q.market,
        listing,
        q.price,
        q.currency
    );
    if !q.is_priced() {
        println!("No source returned a price; shown as zero.");
    }
    Ok(())
}

/// Print the close on (or before) `date`.
pub fn show_history(
    config: &Config,
    ticker: &str,
    date: NaiveDate,
    exchange: Option<Exchange>,
) -> Result<()> {
    let session = Session::connect(config)?;
    let mut resolver = session.resolver(config)?;
    let close = resolver.resolve_historical(ticker, date, exchange);
    println!("{ticker} close on {date}: {close}");
    Ok(())
}

/// Print 1y / 6m / 1m change rates.
pub fn show_changes(
    config: &Config,
    ticker: &str,
    as_of: Option<NaiveDate>,
    exchange: Option<Exchange>,
) -> Result<()> {
    let session = Session::connect(config)?;
    let mut resolver = session.resolver(config)?;
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let rates = resolver.change_rates(ticker, as_of, exchange);

    let fmt = |v: Option<rust_decimal::Decimal>| match v {
        Some(pct) => format!("{pct:+.2}%"),
        None => "n/a".to_string(),
    };
    println!("{ticker} as of {as_of}:");
    println!("  1Y: {}", fmt(rates.one_year));
    println!("  6M: {}", fmt(rates.six_months));
    println!("  1M: {}", fmt(rates.one_month));
    Ok(())
}

/// Value the portfolio and print the rebalance plan without trading.
pub fn show_plan(config: &Config, portfolio: &Path) -> Result<()> {
    let session = Session::connect(config)?;
    let mut resolver = session.resolver(config)?;
    let file = PortfolioFile::load(portfolio)?;
    let valuation = value_portfolio(&file, &mut resolver, config.quotes.usd_rate)?;
    display_valuation(&valuation);

    let plan = RebalancePlan::compute(&valuation.snapshot);
    display_differences(&plan.differences);
    if plan.is_empty() {
        println!("\nNo rebalancing needed. Every group is at target.");
        return Ok(());
    }
    display_recommendations("SELL", &plan.sells);
    display_recommendations("BUY", &plan.buys);
    Ok(())
}

/// Execute a full rebalance run.
pub fn run(config: &Config, opts: &RunOptions) -> Result<()> {
    // 1. Value the portfolio
    let session = Session::connect(config)?;
    let mut resolver = session.resolver(config)?;
    let file = PortfolioFile::load(&opts.portfolio)?;
    let valuation = value_portfolio(&file, &mut resolver, config.quotes.usd_rate)?;
    display_valuation(&valuation);

    // 2. Compute the plan
    let plan = RebalancePlan::compute(&valuation.snapshot);
    display_differences(&plan.differences);
    if plan.is_empty() {
        println!("\nNo rebalancing needed. Every group is at target.");
        return Ok(());
    }
    let recommendations = plan.recommendations();
    let route = config.quotes.default_order_exchange;

    // 3. Dry run stops after building intents
    if opts.dry_run {
        let gateway = RefreshingGateway::new(&session.broker, session.credentials.clone());
        let sync = PortfolioSync::new(&session.broker, &opts.portfolio);
        let mut executor =
            Executor::new(gateway, sync, MemoryLog::default()).with_default_route(route);
        let summary = executor.execute(&recommendations, true, &valuation.exchanges)?;
        display_intents(&summary);
        println!("\n[DRY RUN] No orders submitted.");
        return Ok(());
    }

    let preview = build_intents(&recommendations, &valuation.exchanges, route);
    display_intent_list(&preview.intents, &preview.skipped);
    if preview.intents.is_empty() {
        println!("\nNothing executable: every quantity floors to zero.");
    }

    // 4. Confirm execution
    let mut audit = AuditLog::open(&config.audit_path())?;
    if needs_confirmation(&preview, opts.force) {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Execute?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

        if !confirmed {
            println!("Aborted.");
            audit.log("user_confirmed", serde_json::json!({"approved": false}))?;
            return Ok(());
        }

        audit.log("user_confirmed", serde_json::json!({"approved": true}))?;
    }

    // 5. Execute
    let gateway = RefreshingGateway::new(&session.broker, session.credentials.clone());
    let sync = PortfolioSync::new(&session.broker, &opts.portfolio);
    let mut executor = Executor::new(gateway, sync, audit).with_default_route(route);
    let summary = executor.execute(&recommendations, false, &valuation.exchanges)?;
    display_results(&summary);
    println!(
        "\n{} submitted, {} succeeded, {} failed, {} skipped. Audit logged to {}",
        summary.results.len(),
        summary.succeeded(),
        summary.failed(),
        summary.skipped.len(),
        config.audit_path().display()
    );
    if let Some(warning) = &summary.sync_warning {
        println!("WARNING: account sync failed: {warning}");
    }

    // 6. Reconcile
    info!("Running post-execution reconciliation...");
    let file = PortfolioFile::load(&opts.portfolio)?;
    let after = value_portfolio(&file, &mut resolver, config.quotes.usd_rate)?;
    print!("\n{}", reconcile::reconcile(&after.snapshot));

    Ok(())
}

/// Ask before submitting, unless forced or there is nothing to submit.
///
/// An all-skipped plan still runs so its skipped intents reach the audit log.
fn needs_confirmation(plan: &IntentPlan, force: bool) -> bool {
    !force && !plan.intents.is_empty()
}

/// Compare current group weights against targets.
pub fn run_reconcile(config: &Config, portfolio: &Path) -> Result<()> {
    let session = Session::connect(config)?;
    let mut resolver = session.resolver(config)?;
    let file = PortfolioFile::load(portfolio)?;
    let valuation = value_portfolio(&file, &mut resolver, config.quotes.usd_rate)?;
    print!("{}", reconcile::reconcile(&valuation.snapshot));
    Ok(())
}

/// Check credentials and connectivity.
pub fn check_status(config: &Config) -> Result<()> {
    let store = FileCredentialStore::new(config.credential_path());
    match store.load()? {
        Some(cred) => println!(
            "Cached credential expires at {} ({} min left)",
            cred.expires_at,
            (cred.expires_at - chrono::Utc::now()).num_minutes()
        ),
        None => println!("No cached credential at {}", store.path().display()),
    }

    print!("Authenticating against {}... ", config.connection.base_url);
    let session = Session::connect(config)?;
    session.credentials.token()?;
    println!("OK");

    let cache = JsonPriceCache::open(config.cache_path())?;
    println!(
        "Account {}-{}, {} cached prices in {}",
        config.account.number,
        config.account.product_code,
        cache.len(),
        cache.path().display()
    );
    Ok(())
}

// === Display helpers ===

fn display_valuation(v: &Valuation) {
    println!("CURRENT PORTFOLIO:");
    for group in &v.snapshot.groups {
        println!(
            "  {} (target {}%): {:.0}",
            group.name,
            group.target_pct,
            group.current_value()
        );
        for h in &group.holdings {
            println!(
                "    {:8} {:>10} {:>16.0} {}  {}",
                h.ticker,
                h.quantity,
                h.value,
                h.currency,
                h.name.as_deref().unwrap_or("")
            );
        }
    }
    match v.snapshot.cash {
        Some(cash) => println!("  Cash: {cash:.0}"),
        None => println!("  Cash: unknown"),
    }
    println!("  Total basis: {:.0}", v.snapshot.total_basis());

    let unpriced: Vec<_> = v.unpriced().collect();
    if !unpriced.is_empty() {
        println!("  Unpriced (valued at zero): {}", unpriced.join(", "));
    }
}

fn display_differences(diffs: &[GroupDifference]) {
    println!("\nGROUP DIFFERENCES:");
    println!(
        "  {:16} {:>16} {:>16} {:>16}",
        "Group", "Current", "Target", "Difference"
    );
    for d in diffs {
        println!(
            "  {:16} {:>16.0} {:>16.0} {:>+16.0}",
            d.group, d.current_value, d.target_value, d.difference
        );
    }
}

fn display_recommendations(label: &str, recs: &[Recommendation]) {
    if recs.is_empty() {
        return;
    }
    println!("\n{label} RECOMMENDATIONS:");
    for r in recs {
        let qty = r
            .quantity
            .map(|q| format!("{:.2}", q))
            .unwrap_or_else(|| "?".into());
        println!(
            "  {:>3}  {:8} {:>16.0} {}  qty~{}  ({})",
            r.priority,
            r.ticker,
            r.amount,
            r.currency,
            qty,
            r.group.as_deref().unwrap_or("-")
        );
    }
}

fn display_intent_list(intents: &[OrderIntent], skipped: &[OrderIntent]) {
    println!("\nORDERS:");
    for (i, intent) in intents.iter().enumerate() {
        println!("  {:>3}  {intent}", i + 1);
    }
    for intent in skipped {
        println!("  skip {} {} (quantity floors to zero)", intent.side, intent.ticker);
    }
}

fn display_intents(summary: &ExecutionSummary) {
    display_intent_list(&summary.intents, &summary.skipped);
}

fn display_results(summary: &ExecutionSummary) {
    println!("\nRESULTS:");
    for (i, r) in summary.results.iter().enumerate() {
        let tag = match r.status {
            ExecutionStatus::Success => "OK",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Skipped => "SKIPPED",
        };
        println!(
            "  [{}/{}] {} ... {tag} {}",
            i + 1,
            summary.results.len(),
            r.intent,
            r.message
        );
    }
}
