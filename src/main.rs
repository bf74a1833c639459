use std::sync::Arc;

use anyhow::{Error, Result};
use notification_dispatch::{
    api::{AppState, run_api_server},
    clients::{
        bot::BotClient, database::DatabaseClient, health::{HealthChecker, HealthProbe},
        identity::IdentityClient, rbmq::RabbitMqClient, redis::RedisClient, smtp::SmtpMailer,
    },
    config::Config,
    service::NotificationService,
    smart_send::SmartSender,
    supervisor::supervise,
    utils::init_tracing,
    worker::{DispatchWorker, TaskDispatcher},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;
    init_tracing(config.log_format);

    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let database = Arc::new(DatabaseClient::connect(&config.database_url).await?);
    database.migrate().await?;
    let redis = Arc::new(RedisClient::connect(&config).await?);

    let mailer = Arc::new(SmtpMailer::new(config.smtp_config())?);
    let bot = Arc::new(BotClient::new(&config)?);
    let identity = Arc::new(IdentityClient::new(config.identity_config())?);

    let service = Arc::new(NotificationService::new(
        rabbitmq.clone(),
        database.clone(),
        config.service_config(),
    ));
    let smart_sender = Arc::new(SmartSender::new(
        service.clone(),
        identity,
        bot,
        config.fanout_concurrency,
    ));

    let dispatcher = TaskDispatcher::new(
        mailer,
        redis.clone(),
        database.clone(),
        config.decode_failure_policy,
    );
    let worker = DispatchWorker::new(rabbitmq.clone(), dispatcher);

    let shutdown = CancellationToken::new();

    let worker_task = tokio::spawn({
        let cancel = shutdown.child_token();
        async move { worker.start(cancel).await }
    });

    let state = Arc::new(AppState {
        service,
        smart_sender,
        health_checker: HealthChecker::new(vec![
            rabbitmq as Arc<dyn HealthProbe>,
            database as Arc<dyn HealthProbe>,
            redis as Arc<dyn HealthProbe>,
        ]),
        admin_email: config.admin_email.clone(),
    });
    let server_task = tokio::spawn(run_api_server(state, config.server_port, shutdown.clone()));

    info!("Application started successfully");

    let result = supervise(
        worker_task,
        server_task,
        shutdown,
        config.shutdown_timeout(),
        shutdown_signal(),
    )
    .await;

    if result.is_ok() {
        info!("Application stopped");
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
