// tests/logsink.rs

use std::error::Error;

use chrono::{Local, NaiveDate};
use script_launcher::logsink::{Level, LogEntry, LogManager, LogSink};
use tempfile::TempDir;
use tokio::sync::mpsc::error::TryRecvError;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn lines_round_trip_through_the_daily_file() -> TestResult {
    let dir = TempDir::new()?;
    let logs = LogManager::new(dir.path())?;

    logs.write(1, "alpha", Level::Info, "Execution started (trigger=manual)").await?;
    logs.write(1, "alpha", Level::Stdout, "a|b|c").await?;
    logs.write(2, "beta", Level::Stderr, "first\nsecond").await?;

    let all = logs.read_logs(None, None).await?;
    assert_eq!(all.len(), 3);
    assert_eq!(all[1].message, "a|b|c");
    assert_eq!(all[2].message, "first second");
    assert_eq!(all[2].level, Level::Stderr);

    let beta = logs.read_logs(Some(Local::now().date_naive()), Some("beta")).await?;
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].script_name, "beta");

    let file = dir
        .path()
        .join(format!("{}.log", Local::now().date_naive().format("%Y-%m-%d")));
    let raw = std::fs::read_to_string(file)?;
    let first = raw.lines().next().unwrap();
    let (ts, rest) = first.split_once('|').unwrap();
    assert_eq!(rest, "alpha|INFO|Execution started (trigger=manual)");
    assert!(ts.ends_with('Z'));
    assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    Ok(())
}

#[tokio::test]
async fn malformed_lines_and_missing_days_are_tolerated() -> TestResult {
    let dir = TempDir::new()?;
    let logs = LogManager::new(dir.path())?;
    std::fs::write(
        dir.path().join("2024-03-01.log"),
        "garbage\n\
         2024-03-01T10:00:00.000Z|s|INFO|ok\n\
         2024-03-01T10:00:01.000Z|s|LOUD|bad level\n\
         not-a-time|s|INFO|bad time\n",
    )?;

    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let entries = logs.read_logs(Some(day), None).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "ok");
    assert_eq!(entries[0].script_id, None);

    let empty = logs
        .read_logs(NaiveDate::from_ymd_opt(1999, 1, 1), None)
        .await?;
    assert!(empty.is_empty());
    Ok(())
}

#[tokio::test]
async fn available_dates_are_newest_first() -> TestResult {
    let dir = TempDir::new()?;
    let logs = LogManager::new(dir.path())?;
    for name in ["2024-01-02.log", "2024-03-01.log", "2023-12-31.log", "notes.log", "2024-02-02.txt"] {
        std::fs::write(dir.path().join(name), "")?;
    }

    let dates = logs.available_dates().await?;
    let expected: Vec<_> = [(2024, 3, 1), (2024, 1, 2), (2023, 12, 31)]
        .into_iter()
        .map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
        .collect();
    assert_eq!(dates, expected);
    Ok(())
}

#[tokio::test]
async fn subscribers_are_filtered_bounded_and_pruned() -> TestResult {
    let dir = TempDir::new()?;
    let logs = LogManager::with_buffer(dir.path(), 2)?;

    let mut everything = logs.subscribe(None);
    let mut only_two = logs.subscribe(Some(2));
    let closed = logs.subscribe(None);
    drop(closed);

    for i in 0..5 {
        logs.write(1, "one", Level::Stdout, &format!("line {i}")).await?;
    }
    logs.write(2, "two", Level::Stdout, "hello two").await?;

    // The buffer holds two; the rest were dropped without blocking writes.
    assert_eq!(everything.try_recv()?.message, "line 0");
    assert_eq!(everything.try_recv()?.message, "line 1");
    assert!(matches!(everything.try_recv(), Err(TryRecvError::Empty)));

    let note = only_two.try_recv()?;
    assert_eq!(note.script_id, Some(2));
    assert_eq!(note.script_name, "two");
    let json: serde_json::Value = serde_json::from_str(&note.to_json()?)?;
    assert_eq!(json["type"], "log");
    assert_eq!(json["level"], "STDOUT");
    assert_eq!(json["message"], "hello two");
    assert_eq!(json["script_id"], 2);

    assert_eq!(logs.subscriber_count(), 2);
    drop(everything);
    logs.write(1, "one", Level::Info, "after drop").await?;
    assert_eq!(logs.subscriber_count(), 1);
    Ok(())
}

#[test]
fn entry_line_format() {
    let entry = LogEntry::new(3, "gamma", Level::Error, "boom\r\nagain");
    let line = entry.to_line();
    assert!(line.ends_with("|gamma|ERROR|boom  again"));

    let parsed = LogEntry::from_line(&line).unwrap();
    assert_eq!(parsed.script_name, "gamma");
    assert_eq!(parsed.level, Level::Error);
    assert_eq!(parsed.message, "boom  again");
    assert_eq!(parsed.timestamp.timestamp_millis(), entry.timestamp.timestamp_millis());

    assert!(LogEntry::from_line("2024-01-01T00:00:00.000Z|only-three|INFO").is_none());
}
