use anyhow::{bail, Context};
use clap::{arg, Command};
use log::info;

use ibchain::config::GatewayConfig;
use ibchain::contracts::{OptionRight, SecurityType};
use ibchain::options::{OptionsCriteria, OptionsFilters};
use ibchain::service::{OptionsService, Underlying};
use ibchain::session::GatewaySession;

// cargo run --example options_chain -- --symbol SPX --contract_id 416904 --expiration 20250505 --trading_class SPXW --rights P --min_delta -0.06 --max_delta -0.04
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = Command::new("options_chain")
        .version("1.0")
        .about("Resolves an option chain and prints the tickers matching a delta range")
        .arg(arg!(--symbol <SYMBOL>).default_value("SPX"))
        .arg(arg!(--security_type <TYPE>).default_value("IND"))
        .arg(arg!(--contract_id <ID>).value_parser(clap::value_parser!(i32)).default_value("416904"))
        .arg(arg!(--expiration <YYYYMMDD>).required(true).num_args(1..))
        .arg(arg!(--trading_class <CLASS>).num_args(1..))
        .arg(arg!(--strike <STRIKE>).value_parser(clap::value_parser!(f64)).num_args(1..))
        .arg(arg!(--rights <RIGHTS>).num_args(1..))
        .arg(arg!(--min_delta <DELTA>).value_parser(clap::value_parser!(f64)).allow_negative_numbers(true))
        .arg(arg!(--max_delta <DELTA>).value_parser(clap::value_parser!(f64)).allow_negative_numbers(true))
        .arg(arg!(--chain_only "only qualify the chain, without market data"))
        .get_matches();

    let symbol = matches.get_one::<String>("symbol").context("symbol is required")?;
    let security_type = SecurityType::from(matches.get_one::<String>("security_type").context("security type is required")?.as_str());
    let contract_id = *matches.get_one::<i32>("contract_id").context("contract id is required")?;
    let underlying = Underlying::new(symbol, security_type, contract_id);

    let expirations: Vec<&str> = matches.get_many::<String>("expiration").into_iter().flatten().map(String::as_str).collect();
    let mut filters = OptionsFilters::for_expirations(&expirations);

    if let Some(classes) = matches.get_many::<String>("trading_class") {
        let classes: Vec<&str> = classes.map(String::as_str).collect();
        filters = filters.with_trading_classes(&classes);
    }
    if let Some(strikes) = matches.get_many::<f64>("strike") {
        let strikes: Vec<f64> = strikes.copied().collect();
        filters = filters.with_strikes(&strikes);
    }
    if let Some(rights) = matches.get_many::<String>("rights") {
        let rights = rights.map(|right| parse_right(right)).collect::<anyhow::Result<Vec<_>>>()?;
        filters = filters.with_rights(&rights);
    }

    let criteria = OptionsCriteria {
        min_delta: matches.get_one::<f64>("min_delta").copied(),
        max_delta: matches.get_one::<f64>("max_delta").copied(),
        ..Default::default()
    };

    let config = GatewayConfig::from_env()?;
    info!("using gateway at {}", config.address());

    let service = OptionsService::new(GatewaySession::new(config));

    if matches.get_flag("chain_only") {
        let chain = service.resolve_options_chain(&underlying, &filters).await?;
        println!("{} of {} candidates qualified", chain.contracts.len(), chain.candidates);
        println!("{}", serde_json::to_string_pretty(&chain.contracts)?);
    } else {
        let criteria = (!criteria.is_empty()).then_some(criteria);
        let tickers = service.filtered_options_tickers(&underlying, &filters, criteria.as_ref()).await?;
        println!("{}", serde_json::to_string_pretty(&tickers)?);
    }

    service.gateway().disconnect().await;

    Ok(())
}

fn parse_right(right: &str) -> anyhow::Result<OptionRight> {
    match right.to_ascii_uppercase().as_str() {
        "C" | "CALL" => Ok(OptionRight::Call),
        "P" | "PUT" => Ok(OptionRight::Put),
        other => bail!("unknown option right {other}, expected C or P"),
    }
}
