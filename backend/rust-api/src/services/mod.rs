use crate::config::Config;
use mongodb::{
    bson::doc, options::IndexOptions, Client as MongoClient, Database, IndexModel,
};

pub struct AppState {
    pub config: Config,
    pub client: MongoClient,
    pub mongo: Database,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        Ok(Self {
            config,
            client: mongo_client,
            mongo,
        })
    }

    /// Unique indexes backing the uniqueness invariants: account identity
    /// fields, and (event, user, attemptNumber) on results so a concurrent
    /// duplicate submission fails instead of exceeding the attempt limit.
    pub async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.mongo
            .collection::<mongodb::bson::Document>("users")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        self.mongo
            .collection::<mongodb::bson::Document>("users")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "registrationNumber": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        self.mongo
            .collection::<mongodb::bson::Document>("admins")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;

        self.mongo
            .collection::<mongodb::bson::Document>("results")
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "event": 1, "user": 1, "attemptNumber": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }
}

pub mod auth_service;
pub mod evaluation_service;
pub mod event_service;
pub mod result_service;
pub mod token_service;
