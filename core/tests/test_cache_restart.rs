// Integration: offline cache across process restarts
//
// The cache is the gateway's only durable state; these tests treat each
// `open` as a fresh process.

use chrono::NaiveDate;
use fleetlink_core::reading::{encode_batch, DeviceReading, MeasurementBatch};
use fleetlink_core::store::OfflineCache;

fn batch(minute: u32) -> MeasurementBatch {
    let mut batch = MeasurementBatch::new(
        NaiveDate::from_ymd_opt(2023, 6, 3)
            .unwrap()
            .and_hms_opt(14, minute, 0)
            .unwrap(),
    );
    batch
        .devices
        .insert("Device1".into(), DeviceReading::Unreachable);
    batch
}

#[tokio::test]
async fn test_batches_survive_restart_in_append_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.log");

    {
        let (cache, _) = OfflineCache::open(&path).await.unwrap();
        cache.append(&batch(1)).await.unwrap();
        cache.append(&batch(2)).await.unwrap();
    }
    {
        let (cache, report) = OfflineCache::open(&path).await.unwrap();
        assert_eq!(report.kept, 2);
        assert_eq!(report.dropped, 0);
        cache.append(&batch(3)).await.unwrap();
    }

    let (cache, _) = OfflineCache::open(&path).await.unwrap();
    assert_eq!(
        cache.read_all().await.unwrap(),
        vec![batch(1), batch(2), batch(3)]
    );
}

#[tokio::test]
async fn test_corruption_is_dropped_once_and_never_returns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.log");

    // A crash mid-append leaves a torn line; the next open drops it.
    let good = encode_batch(&batch(1)).unwrap();
    let torn = &good[..good.len() / 2];
    std::fs::write(&path, format!("{good}\n{torn}\n")).unwrap();

    let (cache, report) = OfflineCache::open(&path).await.unwrap();
    assert_eq!(report.kept, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(cache.read_all().await.unwrap(), vec![batch(1)]);
    drop(cache);

    // The rewrite is durable: reopening reports no further losses.
    let (_, report) = OfflineCache::open(&path).await.unwrap();
    assert_eq!(report.kept, 1);
    assert_eq!(report.dropped, 0);
}

#[tokio::test]
async fn test_clear_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.log");

    {
        let (cache, _) = OfflineCache::open(&path).await.unwrap();
        cache.append(&batch(1)).await.unwrap();
        cache.clear().await.unwrap();
        cache.clear().await.unwrap();
    }

    let (cache, report) = OfflineCache::open(&path).await.unwrap();
    assert_eq!(report.kept, 0);
    assert!(cache.read_all().await.unwrap().is_empty());
}
