// fillpdf-service/src/main.rs

use std::sync::Arc;

use fillpdf_service::backend::create_backend;
use fillpdf_service::config::Config;
use fillpdf_service::entity::LocalFileAccessor;
use fillpdf_service::persistence::{FormStore, PgFormStore};
use fillpdf_service::pipeline::FillPipeline;
use fillpdf_service::pubsub::{MessageHandler, Publisher};
use fillpdf_service::serializer::Serializer;
use fillpdf_service::storage::GcsOutputStorage;
use fillpdf_service::template::TemplateManager;
use fillpdf_service::token::TokenResolver;
use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::subscription::{ReceiveConfig, Subscription};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Print to stderr BEFORE logging initialization to catch early failures
    eprintln!("Starting fillpdf-service...");

    // Load configuration
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.backend.kind,
        "Starting FillPDF Service"
    );

    // Database
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store: Arc<dyn FormStore> = Arc::new(PgFormStore::new(pool));

    // Files, backend, resolver
    let files = Arc::new(LocalFileAccessor::new(
        &config.files.public_path,
        &config.files.private_path,
    ));
    let backend = create_backend(&config.backend)?;
    let resolver = TokenResolver::standard(files.clone(), config.tokens.clone());

    let mut pipeline = FillPipeline::new(store.clone(), backend.clone(), resolver, files.clone());
    if !config.storage.bucket.is_empty() {
        let output = GcsOutputStorage::new(&config.storage.bucket).await?;
        pipeline = pipeline.with_output_storage(Arc::new(output));
        info!(bucket = %config.storage.bucket, "Filled PDFs with a destination path will be uploaded");
    }

    let handler = Arc::new(MessageHandler::new(
        pipeline,
        Serializer::new(store.clone()),
        TemplateManager::new(store.clone(), backend, files),
        store,
    ));

    // Initialize Pub/Sub client
    let client_config = ClientConfig::default().with_auth().await.map_err(|e| {
        error!("Failed to create Pub/Sub client config: {}", e);
        e
    })?;
    let client = Client::new(client_config).await.map_err(|e| {
        error!("Failed to create Pub/Sub client: {}", e);
        e
    })?;

    info!(
        project_id = %config.pubsub.project_id,
        subscription = %config.pubsub.request_subscription,
        "Pub/Sub client initialized"
    );

    let subscription = client.subscription(&config.pubsub.request_subscription);
    let publisher = Arc::new(Publisher::new(
        &client,
        &config.pubsub.project_id,
        &config.pubsub.response_topic,
    ));

    process_messages(
        subscription,
        handler,
        publisher,
        config.pubsub.max_concurrent_messages,
    )
    .await;

    Ok(())
}

async fn process_messages(
    subscription: Subscription,
    handler: Arc<MessageHandler>,
    publisher: Arc<Publisher>,
    max_concurrent: usize,
) {
    use tokio::signal;
    use tokio_util::sync::CancellationToken;

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();

    // Spawn signal handler
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, cancelling message processing");
                cancel_for_signal.cancel();
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    info!(workers = max_concurrent, "Starting message processing loop");

    loop {
        if cancel.is_cancelled() {
            info!("Message processing cancelled, exiting loop");
            break;
        }

        let handler_clone = handler.clone();
        let publisher_clone = publisher.clone();

        let result = subscription
            .receive(
                move |message, cancel| {
                    let handler = handler_clone.clone();
                    let publisher = publisher_clone.clone();

                    async move {
                        if cancel.is_cancelled() {
                            return;
                        }

                        info!(
                            message_id = %message.message.message_id,
                            "Processing message"
                        );

                        let response = handler.handle_message(&message.message.data).await;

                        publisher.publish_response(&response).await;

                        if let Err(e) = message.ack().await {
                            error!(
                                message_id = %message.message.message_id,
                                error = %e,
                                "Failed to acknowledge message"
                            );
                        }
                    }
                },
                cancel.clone(),
                Some(ReceiveConfig {
                    worker_count: max_concurrent.max(1),
                    ..Default::default()
                }),
            )
            .await;

        if let Err(e) = result {
            error!("Error receiving messages: {}", e);
            error!("Retrying in 5 seconds...");
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        }
    }

    info!("Message processing loop exited");
}
