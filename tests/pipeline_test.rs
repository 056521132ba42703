use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use bioflow_pipeline::{
    process_data, process_pipeline, Aggregator, Config, Pipeline, PipelineError, PipelineState,
    RawReading, ResultMap,
};
use tempfile::TempDir;

const FIXTURE: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/data/test_bioreactor_data.jsonl"
);

fn fixture_readings() -> Vec<RawReading> {
    // ---
    std::fs::read_to_string(FIXTURE)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn write_jsonl(dir: &Path, name: &str, readings: &[serde_json::Value]) -> PathBuf {
    // ---
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    for reading in readings {
        writeln!(file, "{}", reading).unwrap();
    }
    path
}

fn assert_maps_close(left: &ResultMap, right: &ResultMap) {
    // ---
    assert_eq!(
        left.keys().collect::<Vec<_>>(),
        right.keys().collect::<Vec<_>>()
    );
    for (id, a) in left {
        let b = &right[id];
        assert!(
            (a.avg_ph - b.avg_ph).abs() < 1e-9,
            "avg_ph differs for {}: {} vs {}",
            id,
            a.avg_ph,
            b.avg_ph
        );
        assert_eq!(a.anomaly_count, b.anomaly_count, "anomaly_count for {}", id);
        assert_eq!(a.latest_timestamp, b.latest_timestamp, "latest for {}", id);
    }
}

#[tokio::test]
async fn fixture_streams_chunk_scoped_results() -> Result<()> {
    // ---
    let maps = process_pipeline(FIXTURE, 3)?.collect_all().await?;
    assert_eq!(maps.len(), 4);

    // Chunk 1: two BioR1 readings (one hot), one BioR2
    let bio1 = &maps[0]["BioR1"];
    assert!((bio1.avg_ph - 7.15).abs() < 1e-9);
    assert_eq!(bio1.anomaly_count, 1);
    assert_eq!(bio1.latest_timestamp, "2025-08-16 14:30");
    assert_eq!(maps[0]["BioR2"].anomaly_count, 0);

    // Chunk 2: every reading is invalid
    assert!(maps[1].is_empty());

    // Chunk 3: state was reset, so only this chunk's readings count
    let bio1 = &maps[2]["BioR1"];
    assert!((bio1.avg_ph - 7.15).abs() < 1e-9);
    assert_eq!(bio1.anomaly_count, 1);
    assert_eq!(bio1.latest_timestamp, "2025-08-16 16:00");
    assert_eq!(maps[2]["BioR2"].latest_timestamp, "2025-08-16 15:30");

    // Chunk 4: single hot BioR2 reading
    assert_eq!(maps[3].len(), 1);
    assert_eq!(maps[3]["BioR2"].anomaly_count, 1);
    Ok(())
}

#[tokio::test]
async fn merged_stream_matches_batch_processing() -> Result<()> {
    // ---
    let batch = process_data(&fixture_readings());

    for chunk_size in [1, 2, 3, 4, 7, 10, 1000] {
        let pipeline = Pipeline::new(Config::default().with_chunk_size(chunk_size))?;
        let merged = pipeline.process_pipeline_merged(FIXTURE).await?;
        assert_maps_close(&merged, &batch);
    }

    let bio1 = &batch["BioR1"];
    assert!((bio1.avg_ph - 7.15).abs() < 1e-9);
    assert_eq!(bio1.anomaly_count, 2);
    assert_eq!(bio1.latest_timestamp, "2025-08-16 16:00");

    let bio2 = &batch["BioR2"];
    assert!((bio2.avg_ph - 6.9).abs() < 1e-9);
    assert_eq!(bio2.anomaly_count, 1);
    assert_eq!(bio2.latest_timestamp, "2025-08-16 16:45");
    Ok(())
}

#[tokio::test]
async fn chunk_aggregates_merge_to_single_pass_state() -> Result<()> {
    // ---
    let mut stream = process_pipeline(FIXTURE, 4)?;
    let mut merged = Aggregator::new();
    while let Some(partial) = stream.next_aggregate().await? {
        merged.merge(&partial);
    }
    assert_eq!(stream.state(), PipelineState::Done);

    let mut single = Aggregator::new();
    for reading in fixture_readings() {
        if let Some(valid) = bioflow_pipeline::validation::validate(&reading) {
            single.fold(&valid);
        }
    }

    for id in ["BioR1", "BioR2"] {
        let a = merged.get(id).unwrap();
        let b = single.get(id).unwrap();
        assert!((a.sum_ph - b.sum_ph).abs() < 1e-9);
        assert_eq!(a.count, b.count);
        assert_eq!(a.anomaly_count, b.anomaly_count);
        assert!(a.anomaly_count <= a.count);
    }
    assert_eq!(merged.get("BioR1").unwrap().count, 4);
    assert_eq!(merged.get("BioR2").unwrap().count, 3);
    Ok(())
}

#[tokio::test]
async fn large_file_yields_bounded_chunks() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let readings: Vec<serde_json::Value> = (0..1200)
        .map(|i| {
            serde_json::json!({
                "sensor_id": "BioR1",
                "timestamp": format!("2025-08-{:02} {:02}:{:02}", 1 + i / 1440, (i / 60) % 24, i % 60),
                "ph_value": 7.0,
                "temperature": if i % 10 == 0 { 45.0 } else { 30.0 },
            })
        })
        .collect();
    let path = write_jsonl(dir.path(), "large.jsonl", &readings);

    let mut stream = process_pipeline(path.to_str().unwrap(), 500)?;
    let mut counts = Vec::new();
    while let Some(aggregator) = stream.next_aggregate().await? {
        assert_eq!(aggregator.len(), 1);
        let bio1 = aggregator.get("BioR1").unwrap();
        assert!((bio1.avg_ph() - 7.0).abs() < 1e-9);
        counts.push(bio1.count);
    }

    assert_eq!(counts, vec![500, 500, 200]);
    assert_eq!(stream.chunks_processed(), 3);
    assert!(stream.next().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn json_array_file_matches_jsonl() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let values: Vec<serde_json::Value> = std::fs::read_to_string(FIXTURE)?
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let path = dir.path().join("readings.json");
    std::fs::write(&path, serde_json::to_string_pretty(&values)?)?;

    let from_array = process_pipeline(path.to_str().unwrap(), 3)?.collect_all().await?;
    let from_lines = process_pipeline(FIXTURE, 3)?.collect_all().await?;

    assert_eq!(from_array.len(), from_lines.len());
    for (a, b) in from_array.iter().zip(&from_lines) {
        assert_maps_close(a, b);
    }
    Ok(())
}

#[tokio::test]
async fn malformed_lines_skipped_without_aborting() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let path = dir.path().join("mixed.jsonl");
    std::fs::write(
        &path,
        concat!(
            "{\"sensor_id\":\"BioR1\",\"timestamp\":\"2025-08-16 14:00\",\"ph_value\":7.0,\"temperature\":30.0}\n",
            "{\"sensor_id\":\"BioR1\",\"timestamp\n",
            "\n",
            "{\"sensor_id\":\"BioR1\",\"timestamp\":\"2025-08-16 14:10\",\"ph_value\":8.0,\"temperature\":30.0}\n",
        ),
    )?;

    let maps = process_pipeline(path.to_str().unwrap(), 10)?.collect_all().await?;
    assert_eq!(maps.len(), 1);
    assert!((maps[0]["BioR1"].avg_ph - 7.5).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_line_skipped_without_aborting() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let path = dir.path().join("mixed_encoding.jsonl");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(
        b"{\"sensor_id\":\"BioR1\",\"timestamp\":\"2025-08-16 14:00\",\"ph_value\":7.0,\"temperature\":30.0}\n",
    );
    bytes.extend_from_slice(b"\xff\xfe garbage\n");
    bytes.extend_from_slice(
        b"{\"sensor_id\":\"BioR1\",\"timestamp\":\"2025-08-16 14:10\",\"ph_value\":8.0,\"temperature\":30.0}\n",
    );
    std::fs::write(&path, bytes)?;

    let maps = process_pipeline(path.to_str().unwrap(), 10)?.collect_all().await?;
    assert_eq!(maps.len(), 1);
    assert!((maps[0]["BioR1"].avg_ph - 7.5).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn missing_file_fails_with_source_context() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let path = dir.path().join("nowhere.jsonl");
    let mut stream = process_pipeline(path.to_str().unwrap(), 10)?;

    match stream.next().await {
        Err(PipelineError::Ingestion {
            source_id,
            operation,
            ..
        }) => {
            assert!(source_id.contains("nowhere.jsonl"));
            assert_eq!(operation, "open");
        }
        other => panic!("expected ingestion error, got {:?}", other),
    }
    assert_eq!(stream.state(), PipelineState::Failed);
    Ok(())
}
