//! Runs against a real MongoDB when `DAGOBAH_TEST_MONGO_HOST` is set
//! (optionally `DAGOBAH_TEST_MONGO_PORT`). Each test uses its own database
//! and drops it afterwards. Without the variable every test returns early.
//!
//! The transactional cascade additionally needs a replica set; it only runs
//! when `DAGOBAH_TEST_MONGO_TRANSACTIONS` is set too.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use dagobah_core::{
    Backend, BackendError, DagobahId, DagobahRecord, FixedClock, IdGenerator, JobId, JobRecord,
    JobRef, LogId, LogRecord,
};
use dagobah_mongo::{MongoBackend, MongoConfig};
use mongodb::bson::{Document, doc};
use serde_json::json;
use ulid::Ulid;

fn live_config(test: &str) -> Option<MongoConfig> {
    let host = std::env::var("DAGOBAH_TEST_MONGO_HOST").ok()?;
    let port = std::env::var("DAGOBAH_TEST_MONGO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(27017);
    Some(MongoConfig::new(host, port, format!("dagobah_test_{test}")))
}

fn transactional_config(test: &str) -> Option<MongoConfig> {
    std::env::var_os("DAGOBAH_TEST_MONGO_TRANSACTIONS")?;
    let mut config = live_config(test)?;
    config.use_transactions = true;
    Some(config)
}

async fn collection(config: &MongoConfig, name: &str) -> mongodb::Collection<Document> {
    let client = mongodb::Client::with_uri_str(config.uri()).await.unwrap();
    client.database(&config.database).collection(name)
}

async fn drop_database(config: &MongoConfig) {
    let client = mongodb::Client::with_uri_str(config.uri()).await.unwrap();
    client.database(&config.database).drop().await.unwrap();
}

/// Hands out a fixed list of ULIDs, for every kind.
struct ScriptedIds(Mutex<VecDeque<Ulid>>);

impl ScriptedIds {
    fn new(ulids: impl IntoIterator<Item = Ulid>) -> Self {
        Self(Mutex::new(ulids.into_iter().collect()))
    }

    fn next(&self) -> Ulid {
        self.0.lock().unwrap().pop_front().expect("script exhausted")
    }
}

impl IdGenerator for ScriptedIds {
    fn generate_dagobah_id(&self) -> DagobahId {
        self.next().into()
    }

    fn generate_job_id(&self) -> JobId {
        self.next().into()
    }

    fn generate_log_id(&self) -> LogId {
        self.next().into()
    }
}

#[tokio::test]
async fn commit_and_read_dagobah() {
    let Some(config) = live_config("commit_and_read") else {
        return;
    };
    let backend = MongoBackend::connect(config.clone()).await.unwrap();

    let dagobah_id = backend.get_new_dagobah_id().await.unwrap();
    let record = DagobahRecord::new(dagobah_id)
        .with_field("created_jobs", 0)
        .with_field("notes", json!({ "owner": "ops" }));

    // BSON datetimes keep milliseconds only
    let before = chrono::Utc::now().timestamp_millis();
    backend.commit_dagobah(&record).await.unwrap();
    let stored = backend.get_dagobah_json(dagobah_id).await.unwrap().unwrap();

    assert_eq!(stored.dagobah_id, dagobah_id);
    assert_eq!(stored.extra, record.extra);
    assert!(stored.save_date.unwrap().timestamp_millis() >= before);

    let unknown = backend.get_new_dagobah_id().await.unwrap();
    assert!(backend.get_dagobah_json(unknown).await.unwrap().is_none());

    drop_database(&config).await;
}

#[tokio::test]
async fn delete_dagobah_cascades_to_jobs_only() {
    let Some(config) = live_config("cascade") else {
        return;
    };
    let backend = MongoBackend::connect(config.clone()).await.unwrap();

    let dagobah_id = backend.get_new_dagobah_id().await.unwrap();
    let a = backend.get_new_job_id().await.unwrap();
    let b = backend.get_new_job_id().await.unwrap();
    let log_id = backend.get_new_log_id().await.unwrap();

    backend.commit_job(&JobRecord::new(a)).await.unwrap();
    backend.commit_job(&JobRecord::new(b)).await.unwrap();
    backend
        .commit_log(&LogRecord::new(log_id).with_field("job_id", a.key()))
        .await
        .unwrap();
    backend
        .commit_dagobah(
            &DagobahRecord::new(dagobah_id)
                .with_job(JobRef::new(a))
                .with_job(JobRef::new(b)),
        )
        .await
        .unwrap();

    backend.delete_dagobah(dagobah_id).await.unwrap();

    assert!(backend.get_dagobah_json(dagobah_id).await.unwrap().is_none());

    let client = mongodb::Client::with_uri_str(config.uri()).await.unwrap();
    let db = client.database(&config.database);
    let jobs = db
        .collection::<mongodb::bson::Document>(&config.collections.job)
        .count_documents(mongodb::bson::doc! {})
        .await
        .unwrap();
    let logs = db
        .collection::<mongodb::bson::Document>(&config.collections.log)
        .count_documents(mongodb::bson::doc! { "_id": log_id.key() })
        .await
        .unwrap();
    assert_eq!(jobs, 0);
    assert_eq!(logs, 1);

    drop_database(&config).await;
}

#[tokio::test]
async fn second_job_commit_replaces_first() {
    let Some(config) = live_config("replace_job") else {
        return;
    };
    let backend = MongoBackend::connect(config.clone()).await.unwrap();
    let job_id = backend.get_new_job_id().await.unwrap();

    backend
        .commit_job(&JobRecord::new(job_id).with_field("name", "old").with_field("stale", true))
        .await
        .unwrap();
    backend
        .commit_job(&JobRecord::new(job_id).with_field("name", "new"))
        .await
        .unwrap();

    let client = mongodb::Client::with_uri_str(config.uri()).await.unwrap();
    let coll = client
        .database(&config.database)
        .collection::<mongodb::bson::Document>(&config.collections.job);
    assert_eq!(coll.count_documents(mongodb::bson::doc! {}).await.unwrap(), 1);
    let stored = coll
        .find_one(mongodb::bson::doc! { "_id": job_id.key() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_str("name").unwrap(), "new");
    assert!(!stored.contains_key("stale"));

    drop_database(&config).await;
}

#[tokio::test]
async fn deletes_of_missing_documents() {
    let Some(config) = live_config("missing") else {
        return;
    };
    let backend = MongoBackend::connect(config.clone()).await.unwrap();

    let job_id = backend.get_new_job_id().await.unwrap();
    backend.delete_job(job_id).await.unwrap();

    let dagobah_id = backend.get_new_dagobah_id().await.unwrap();
    let err = backend.delete_dagobah(dagobah_id).await.unwrap_err();
    assert!(matches!(err, BackendError::DagobahNotFound(id) if id == dagobah_id));

    drop_database(&config).await;
}

#[tokio::test]
async fn transactional_cascade_deletes_jobs_only() {
    let Some(config) = transactional_config("txn_cascade") else {
        return;
    };
    let backend = MongoBackend::connect(config.clone()).await.unwrap();
    assert!(backend.config().use_transactions);

    let dagobah_id = backend.get_new_dagobah_id().await.unwrap();
    let a = backend.get_new_job_id().await.unwrap();
    let kept = backend.get_new_job_id().await.unwrap();
    let log_id = backend.get_new_log_id().await.unwrap();

    backend.commit_job(&JobRecord::new(a)).await.unwrap();
    backend.commit_job(&JobRecord::new(kept)).await.unwrap();
    backend.commit_log(&LogRecord::new(log_id)).await.unwrap();
    backend
        .commit_dagobah(&DagobahRecord::new(dagobah_id).with_job(JobRef::new(a)))
        .await
        .unwrap();

    backend.delete_dagobah(dagobah_id).await.unwrap();

    let jobs = collection(&config, &config.collections.job).await;
    let logs = collection(&config, &config.collections.log).await;
    assert!(backend.get_dagobah_json(dagobah_id).await.unwrap().is_none());
    assert_eq!(jobs.count_documents(doc! { "_id": a.key() }).await.unwrap(), 0);
    assert_eq!(jobs.count_documents(doc! { "_id": kept.key() }).await.unwrap(), 1);
    assert_eq!(logs.count_documents(doc! {}).await.unwrap(), 1);

    let err = backend.delete_dagobah(dagobah_id).await.unwrap_err();
    assert!(err.is_not_found());

    drop_database(&config).await;
}

#[tokio::test]
async fn corrupt_jobs_list_is_unreadable_but_deletable() {
    let Some(config) = live_config("corrupt_jobs") else {
        return;
    };
    let backend = MongoBackend::connect(config.clone()).await.unwrap();

    let dagobah_id = backend.get_new_dagobah_id().await.unwrap();
    let a = backend.get_new_job_id().await.unwrap();
    backend.commit_job(&JobRecord::new(a)).await.unwrap();

    let dagobahs = collection(&config, &config.collections.dagobah).await;
    dagobahs
        .insert_one(doc! {
            "_id": dagobah_id.key(),
            "dagobah_id": dagobah_id.key(),
            "jobs": ["not a job", { "name": "no id" }, { "job_id": a.key() }],
        })
        .await
        .unwrap();

    let err = backend.get_dagobah_json(dagobah_id).await.unwrap_err();
    assert!(matches!(err, BackendError::Codec { kind: "dagobah", .. }));

    backend.delete_dagobah(dagobah_id).await.unwrap();

    let jobs = collection(&config, &config.collections.job).await;
    assert_eq!(dagobahs.count_documents(doc! {}).await.unwrap(), 0);
    assert_eq!(jobs.count_documents(doc! {}).await.unwrap(), 0);

    drop_database(&config).await;
}

#[tokio::test]
async fn new_job_id_skips_stored_candidates() {
    let Some(mut config) = live_config("id_collision") else {
        return;
    };
    config.max_id_attempts = 2;
    let taken = Ulid::new();
    let free = Ulid::new();
    let backend = MongoBackend::connect(config.clone())
        .await
        .unwrap()
        .with_id_generator(ScriptedIds::new([taken, free, taken, taken]));
    backend
        .commit_job(&JobRecord::new(JobId::from_ulid(taken)))
        .await
        .unwrap();

    assert_eq!(backend.get_new_job_id().await.unwrap().as_ulid(), free);

    let err = backend.get_new_job_id().await.unwrap_err();
    assert!(matches!(
        err,
        BackendError::IdSpaceExhausted { kind: "job", attempts: 2 }
    ));

    drop_database(&config).await;
}

#[tokio::test]
async fn commits_are_stamped_by_injected_clock() {
    let Some(config) = live_config("fixed_clock") else {
        return;
    };
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let backend = MongoBackend::connect(config.clone())
        .await
        .unwrap()
        .with_clock(FixedClock::new(at));

    let dagobah_id = backend.get_new_dagobah_id().await.unwrap();
    backend
        .commit_dagobah(&DagobahRecord::new(dagobah_id))
        .await
        .unwrap();

    let stored = backend.get_dagobah_json(dagobah_id).await.unwrap().unwrap();
    assert_eq!(stored.save_date, Some(at));

    drop_database(&config).await;
}
