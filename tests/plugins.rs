//! Plugin execution draining and at-most-once semantics.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{discovered, sensor_config, setup_db, utc, FakeArd, FakeDownloader};
use eoacquire::models::{PluginOutcome, PluginRun, Scene, Stage};
use eoacquire::plugins::{PluginError, ScenePlugin};
use eoacquire::repository::{PluginRunRepository, SceneCatalogue};
use eoacquire::sensors::{SensorContext, SensorKind};
use eoacquire::services::PipelineDriver;

struct CountingPlugin {
    key: &'static str,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl ScenePlugin for CountingPlugin {
    fn key(&self) -> &str {
        self.key
    }

    fn set_params(&mut self, _params: serde_json::Value) -> Result<(), PluginError> {
        Ok(())
    }

    async fn analyze(
        &self,
        _scene: &Scene,
        _ctx: &SensorContext,
        _history: &[PluginRun],
    ) -> Result<PluginOutcome, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PluginError::Execution(anyhow::anyhow!(
                "classifier blew up"
            )));
        }
        Ok(PluginOutcome {
            success: true,
            produced_artifacts: false,
            output: Some(serde_json::json!({"water_fraction": 0.4})),
        })
    }
}

fn driver(db: &common::TestDb, plugins: Vec<Arc<dyn ScenePlugin>>) -> PipelineDriver {
    PipelineDriver::new(
        db.pool.clone(),
        sensor_config(SensorKind::Sentinel2, db.dir.path()),
        common::arc_archive(vec![]),
        Arc::new(FakeDownloader),
        Arc::new(FakeArd),
        None,
        None,
        None,
        plugins,
        2,
    )
}

async fn processed_scene(db: &common::TestDb) -> i64 {
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let pid = catalogue
        .insert_scene(&discovered("S2A_PLUG", utc(2024, 4, 1), None))
        .await
        .unwrap();
    let d = driver(db, vec![]);
    d.run_stage(Stage::Download).await.unwrap();
    d.run_stage(Stage::ArdConvert).await.unwrap();
    pid
}

#[tokio::test]
async fn test_failing_plugin_drains_pending_list() {
    let db = setup_db().await;
    let pid = processed_scene(&db).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let driver = driver(
        &db,
        vec![Arc::new(CountingPlugin {
            key: "flood_mapper",
            calls: calls.clone(),
            fail: true,
        })],
    );

    let counts = driver.run_plugins().await.unwrap();
    assert_eq!(counts.processed, 0);
    assert_eq!(counts.failed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let runs = PluginRunRepository::new(db.pool.clone());
    let run = runs.get_run(pid, "flood_mapper").await.unwrap().unwrap();
    assert!(run.completed);
    assert!(!run.success);
    assert!(run.error.as_deref().unwrap().contains("classifier blew up"));

    // The failure drained the pending list; a second pass runs nothing.
    let counts = driver.run_plugins().await.unwrap();
    assert_eq!(counts.failed, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plugin_runs_at_most_once_until_reset() {
    let db = setup_db().await;
    let pid = processed_scene(&db).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let driver = driver(
        &db,
        vec![Arc::new(CountingPlugin {
            key: "water_index",
            calls: calls.clone(),
            fail: false,
        })],
    );

    driver.run_plugins().await.unwrap();
    driver.run_plugins().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Successful output lands in the scene's extended info.
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    let scene = catalogue.get_scene(pid).await.unwrap().unwrap();
    assert!(scene.extended_info.contains("water_index"));

    // Resetting the run re-queues the plugin.
    let runs = PluginRunRepository::new(db.pool.clone());
    runs.reset(eoacquire::repository::ResetScope::One(pid), &[])
        .await
        .unwrap();
    driver.run_plugins().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_plugins_skip_unprocessed_and_invalid_scenes() {
    let db = setup_db().await;
    let catalogue = SceneCatalogue::new(db.pool.clone(), SensorKind::Sentinel2);
    // Not yet ARD-processed.
    let fresh = catalogue
        .insert_scene(&discovered("S2A_FRESH", utc(2024, 4, 2), None))
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let driver = driver(
        &db,
        vec![Arc::new(CountingPlugin {
            key: "water_index",
            calls: calls.clone(),
            fail: false,
        })],
    );

    driver.run_plugins().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let runs = PluginRunRepository::new(db.pool.clone());
    assert!(runs.runs_for_scene(fresh).await.unwrap().is_empty());
}
