use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use plc_historian::api::{self, ApiState};
use plc_historian::common::logging::{init_logger, LogLevel};
use plc_historian::data::Storage;
use plc_historian::feed::LiveFeed;
use plc_historian::link::{ModbusDriver, PlcLink};
use plc_historian::model::HistorianConfig;
use plc_historian::poller::Poller;

#[derive(Parser, Debug)]
struct Args {
    config_file: std::path::PathBuf,
    #[arg(long = "db", default_value = "plc-historian.db3")]
    db_file: std::path::PathBuf,
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
    #[arg(long = "log-file", default_value = "")]
    log_file: String,
    #[arg(long = "api-port", default_value = "8000")]
    api_port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    //We have to keep the worker_guard alive
    let _worker_guard = init_logger(args.log_level, &args.log_file).unwrap_or_else(|e| {
        eprintln!("Couldn't init logger: {}", e);
        std::process::exit(1);
    });

    let config = std::fs::read_to_string(&args.config_file).unwrap_or_else(|e| {
        error!("Couldn't read config file: {}", e);
        std::process::exit(1);
    });

    let config: HistorianConfig = serde_json::from_str(&config).unwrap_or_else(|e| {
        error!("Couldn't parse config file: {}", e);
        std::process::exit(1);
    });

    if let Err(err) = config.validate() {
        error!("Wrong config:\n{}", err);
        std::process::exit(1);
    }

    let storage = Storage::open(args.db_file.clone())
        .and_then(|storage| storage.init().map(|_| storage))
        .unwrap_or_else(|e| {
            error!("Couldn't init db: {}", e);
            std::process::exit(1);
        });

    match storage.reading_summary(None) {
        Ok(summary) => info!(
            "Database {} holds {} readings, from {:?} to {:?}",
            storage.path().display(),
            summary.count,
            summary.first,
            summary.last
        ),
        Err(err) => warn!("Couldn't summarize stored readings: {}", err),
    }

    if let Err(err) = storage.upsert_tag_metadata(&config.metadata) {
        error!("Couldn't seed tag metadata: {}", err);
        std::process::exit(1);
    }

    let metadata = storage.get_all_tag_metadata().unwrap_or_else(|e| {
        warn!("Couldn't load tag metadata, it will be looked up per tag: {}", e);
        vec![]
    });

    let feed = LiveFeed::new(config.feed_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let driver = ModbusDriver::new(&config.plc, config.all_tags().cloned());
    let link = PlcLink::new(driver, config.plc.canary_tag.clone(), config.plc.timeout);

    let poller = Poller::new(
        link,
        storage.clone(),
        feed.clone(),
        config.analog_names(),
        config.boolean_names(),
        config.poll_interval,
    )
    .with_metadata(metadata);

    let api_state = ApiState {
        tags: config.all_tags().map(|tag| tag.name.clone()).collect(),
        storage,
        feed,
        link_state: poller.link_state(),
        shutdown: shutdown_rx.clone(),
    };

    let api_handle = api::serve_api(api_state, args.api_port)
        .await
        .unwrap_or_else(|e| {
            error!("Couldn't start api: {}", e);
            std::process::exit(1);
        });

    info!(
        "Polling {}:{} every {:?}",
        config.plc.ip, config.plc.port, config.poll_interval
    );
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Couldn't listen for ctrl-c: {}", err);
    }

    info!("polling interrupted by user, stopping process");
    shutdown_tx.send_replace(true);

    if let Err(err) = poller_handle.await {
        error!("Poller task failed: {}", err);
    }
    if let Err(err) = api_handle.await {
        error!("API task failed: {}", err);
    }
}
