use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Allocates `{module}-{yyyymmdd}-{counter}`, scanning `sessions/` for the
/// highest existing counter for that module+date and adding one.
pub fn allocate(sessions_dir: &Path, module: &str, now: DateTime<Utc>) -> String {
    let date = now.format("%Y%m%d").to_string();
    let prefix = format!("{module}-{date}-");

    let max_counter = fs::read_dir(sessions_dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);

    format!("{prefix}{}", max_counter + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_session_of_the_day_gets_counter_one() {
        let dir = tempdir().unwrap();
        let now = "2026-08-01T00:00:00Z".parse().unwrap();
        assert_eq!(allocate(dir.path(), "auth", now), "auth-20260801-1");
    }

    #[test]
    fn counter_increments_past_existing_sessions() {
        let dir = tempdir().unwrap();
        let now: DateTime<Utc> = "2026-08-01T00:00:00Z".parse().unwrap();
        fs::create_dir(dir.path().join("auth-20260801-1")).unwrap();
        fs::create_dir(dir.path().join("auth-20260801-3")).unwrap();
        assert_eq!(allocate(dir.path(), "auth", now), "auth-20260801-4");
    }

    #[test]
    fn other_modules_and_dates_do_not_interfere() {
        let dir = tempdir().unwrap();
        let now: DateTime<Utc> = "2026-08-01T00:00:00Z".parse().unwrap();
        fs::create_dir(dir.path().join("billing-20260801-9")).unwrap();
        fs::create_dir(dir.path().join("auth-20250101-5")).unwrap();
        assert_eq!(allocate(dir.path(), "auth", now), "auth-20260801-1");
    }
}
