// Integration tests for the transcoder process adapter
//
// `cat` stands in for ffmpeg (bytes pass through unchanged) and `sh` provides
// processes that misbehave on shutdown.

#![cfg(unix)]

use anyhow::Result;
use std::time::{Duration, Instant};
use tutor_gateway::audio::{transcode_all, TranscoderConfig, TranscoderProcess};
use tutor_gateway::RelayError;

fn cat_config() -> TranscoderConfig {
    TranscoderConfig {
        program: "cat".to_string(),
        args: Some(vec![]),
        grace_period_ms: 1000,
        ..Default::default()
    }
}

fn stubborn_config(grace_ms: u64) -> TranscoderConfig {
    TranscoderConfig {
        program: "sh".to_string(),
        args: Some(vec![
            "-c".to_string(),
            "trap '' TERM; while :; do :; done".to_string(),
        ]),
        grace_period_ms: grace_ms,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_bytes_pass_through_in_order() -> Result<()> {
    let (mut process, mut output) = TranscoderProcess::start(&cat_config())?;

    let input: Vec<u8> = (0..3u8).flat_map(|i| vec![i; 4096]).collect();
    for chunk in input.chunks(4096) {
        process.write(chunk).await?;
    }
    assert!(process.close());

    let mut received = Vec::new();
    while let Some(piece) = output.read().await? {
        assert!(piece.len() <= 4096);
        received.extend_from_slice(&piece);
    }

    let outcome = process.terminate(Duration::from_secs(1)).await?;

    assert_eq!(received, input);
    assert_eq!(process.chunks_written(), 3);
    assert_eq!(process.input_closes(), 1);
    assert!(!outcome.forced);
    Ok(())
}

#[tokio::test]
async fn test_write_after_close_is_unavailable() -> Result<()> {
    let (mut process, _output) = TranscoderProcess::start(&cat_config())?;

    process.close();
    let result = process.write(b"late").await;

    assert!(matches!(result, Err(RelayError::ProcessUnavailable(_))));
    process.terminate(Duration::from_secs(1)).await?;
    Ok(())
}

#[tokio::test]
async fn test_write_after_exit_is_unavailable() -> Result<()> {
    let config = TranscoderConfig {
        program: "sh".to_string(),
        args: Some(vec!["-c".to_string(), "exit 3".to_string()]),
        ..Default::default()
    };
    let (mut process, _output) = TranscoderProcess::start(&config)?;

    // Wait for the process to exit on its own
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match process.write(b"x").await {
            Err(RelayError::ProcessUnavailable(_)) => break,
            _ if Instant::now() > deadline => panic!("process never became unavailable"),
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }

    let outcome = process.terminate(Duration::from_secs(1)).await?;
    assert_eq!(outcome.status.code(), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> Result<()> {
    let (mut process, _output) = TranscoderProcess::start(&cat_config())?;

    assert!(process.close());
    assert!(!process.close());
    assert!(process.is_input_closed());
    assert_eq!(process.input_closes(), 1);

    process.terminate(Duration::from_secs(1)).await?;
    assert_eq!(process.input_closes(), 1);
    Ok(())
}

#[tokio::test]
async fn test_stubborn_process_is_killed_after_grace() -> Result<()> {
    let grace = Duration::from_millis(300);
    let (mut process, _output) = TranscoderProcess::start(&stubborn_config(300))?;

    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let outcome = process.terminate(grace).await?;
    let elapsed = started.elapsed();

    assert!(outcome.forced);
    assert_eq!(process.forced_kills(), 1);
    assert!(elapsed >= grace);
    assert!(
        elapsed < grace + Duration::from_secs(2),
        "terminate took {:?}",
        elapsed
    );
    Ok(())
}

#[tokio::test]
async fn test_second_terminate_does_not_kill_again() -> Result<()> {
    let (mut process, _output) = TranscoderProcess::start(&stubborn_config(200))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let first = process.terminate(Duration::from_millis(200)).await?;
    let second = process.terminate(Duration::from_millis(200)).await?;

    assert_eq!(first, second);
    assert_eq!(process.forced_kills(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_program_fails_to_start() {
    let config = TranscoderConfig {
        program: "definitely-not-a-real-transcoder".to_string(),
        args: Some(vec![]),
        ..Default::default()
    };

    let result = TranscoderProcess::start(&config);
    assert!(matches!(result, Err(RelayError::Process(_))));
}

#[tokio::test]
async fn test_transcode_all_collects_output() -> Result<()> {
    let input = vec![7u8; 100_000];
    let output = transcode_all(&cat_config(), &input).await?;
    assert_eq!(output, input);
    Ok(())
}

#[tokio::test]
async fn test_transcode_all_rejects_empty_output() {
    let config = TranscoderConfig {
        program: "true".to_string(),
        args: Some(vec![]),
        ..Default::default()
    };

    let result = transcode_all(&config, b"not audio").await;
    assert!(result.is_err());
}
