use anyhow::{Context, Result};
use notifier_watcher::ExitReason;

mod application_lifecycle;
mod opts;

fn main() {
    let opts = opts::Opt::from_env();

    let log_level_filter = if opts.log_debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init_timed();
    } else {
        pretty_env_logger::formatted_timed_builder()
            .filter(Some("snwatcher"), log_level_filter)
            .filter(Some("notifier_watcher"), log_level_filter)
            .init();
    }

    match run(opts) {
        Ok(reason) => log::info!("snwatcher exiting ({:?})", reason),
        Err(err) => {
            log::error!("{:?}", err);
            std::process::exit(1);
        }
    }
}

fn run(opts: opts::Opt) -> Result<ExitReason> {
    let config = opts.watcher_config();
    log::debug!("{:?}", config);

    let mut exit = application_lifecycle::subscribe_exit();
    application_lifecycle::install_signal_handler();

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("Failed to initialize tokio runtime")?;
    rt.block_on(async {
        let con = zbus::Connection::session().await.context("Failed to connect to the session bus")?;
        let shutdown = async move {
            // an error means the sender is gone, which only happens on exit anyway
            let _ = exit.recv().await;
        };
        notifier_watcher::run(con, config, shutdown).await.context("StatusNotifierWatcher failed")
    })
}
