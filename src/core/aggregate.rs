//! Derived views over already-loaded sessions: day and week buckets, the
//! activity grid, per-project stats and the day summary.
//!
//! Sessions are bucketed by the local calendar day of their start, in the
//! timezone passed in (the device's, for the CLI).

use crate::errors::{AppError, AppResult};
use crate::models::project::{Project, ProjectId};
use crate::models::session::{SessionId, WorkSession};
use crate::utils::date::{last_n_days, week_start};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Count,
    Duration,
}

impl FromStr for Metric {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "count" => Ok(Metric::Count),
            "duration" => Ok(Metric::Duration),
            other => Err(AppError::Other(format!("unknown metric '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Bucket {
    /// The day, or the Monday opening the week.
    pub start: NaiveDate,
    pub count: usize,
    pub duration_secs: i64,
    pub sessions: Vec<SessionId>,
}

impl Bucket {
    fn empty(start: NaiveDate) -> Self {
        Self {
            start,
            ..Default::default()
        }
    }

    fn add(&mut self, session: &WorkSession) {
        self.count += 1;
        self.duration_secs += session.effective_duration();
        self.sessions.push(session.id);
    }

    /// Count, or hours of work for the duration metric.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Count => self.count as f64,
            Metric::Duration => self.duration_secs as f64 / 3600.0,
        }
    }
}

pub fn local_day<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

pub fn bucket_by_day<Tz: TimeZone>(sessions: &[WorkSession], tz: &Tz) -> BTreeMap<NaiveDate, Bucket> {
    let mut out: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for s in sessions {
        let day = local_day(&s.started_at, tz);
        out.entry(day).or_insert_with(|| Bucket::empty(day)).add(s);
    }
    out
}

pub fn bucket_by_week<Tz: TimeZone>(
    sessions: &[WorkSession],
    tz: &Tz,
) -> BTreeMap<NaiveDate, Bucket> {
    let mut out: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
    for s in sessions {
        let monday = week_start(local_day(&s.started_at, tz));
        out.entry(monday)
            .or_insert_with(|| Bucket::empty(monday))
            .add(s);
    }
    out
}

/// Step function from a metric value to an intensity level 0..=4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds(pub [f64; 3]);

impl Thresholds {
    pub fn default_for(metric: Metric) -> Self {
        match metric {
            Metric::Count => Thresholds([1.0, 3.0, 5.0]),
            Metric::Duration => Thresholds([2.0, 4.0, 6.0]),
        }
    }

    pub fn intensity(&self, value: f64) -> u8 {
        if value <= 0.0 {
            return 0;
        }
        let [low, mid, high] = self.0;
        if value <= low {
            1
        } else if value <= mid {
            2
        } else if value <= high {
            3
        } else {
            4
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridDay {
    pub date: NaiveDate,
    pub count: usize,
    pub duration_secs: i64,
    pub value: f64,
    pub level: u8,
    pub sessions: Vec<SessionId>,
}

/// One cell per day for the `days` days ending `today`, oldest first.
/// Days without sessions are present with zero values.
pub fn activity_grid<Tz: TimeZone>(
    sessions: &[WorkSession],
    today: NaiveDate,
    days: u32,
    metric: Metric,
    thresholds: &Thresholds,
    tz: &Tz,
) -> Vec<GridDay> {
    let mut buckets = bucket_by_day(sessions, tz);
    last_n_days(today, days)
        .into_iter()
        .map(|date| {
            let bucket = buckets.remove(&date).unwrap_or_else(|| Bucket::empty(date));
            let value = bucket.value(metric);
            GridDay {
                date,
                count: bucket.count,
                duration_secs: bucket.duration_secs,
                value,
                level: thresholds.intensity(value),
                sessions: bucket.sessions,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub project_id: ProjectId,
    pub name: String,
    pub sessions: usize,
    /// Sum over ended sessions only.
    pub total_secs: i64,
}

/// Per-project totals, longest total first. Sessions of unknown projects
/// are ignored.
pub fn project_stats(projects: &[Project], sessions: &[WorkSession]) -> Vec<ProjectStats> {
    let mut by_id: BTreeMap<ProjectId, ProjectStats> = projects
        .iter()
        .map(|p| {
            (
                p.id,
                ProjectStats {
                    project_id: p.id,
                    name: p.name.clone(),
                    sessions: 0,
                    total_secs: 0,
                },
            )
        })
        .collect();

    for s in sessions {
        if let Some(stats) = by_id.get_mut(&s.project_id) {
            stats.sessions += 1;
            if !s.is_running() {
                stats.total_secs += s.effective_duration();
            }
        }
    }

    let mut out: Vec<_> = by_id.into_values().collect();
    out.sort_by_key(|s| (Reverse(s.total_secs), s.project_id));
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsTotals {
    pub sessions: usize,
    pub total_secs: i64,
    pub average_secs: i64,
}

pub fn totals(stats: &[ProjectStats]) -> StatsTotals {
    let sessions: usize = stats.iter().map(|s| s.sessions).sum();
    let total_secs: i64 = stats.iter().map(|s| s.total_secs).sum();
    let average_secs = if sessions == 0 {
        0
    } else {
        total_secs / sessions as i64
    };
    StatsTotals {
        sessions,
        total_secs,
        average_secs,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DaySummary {
    pub total_sessions: usize,
    pub total_secs: i64,
    /// Project with the longest total duration, and that total.
    pub favorite_project: Option<(ProjectId, i64)>,
    /// Session name with the longest total duration inside the favorite
    /// project.
    pub favorite_name: Option<String>,
}

pub fn day_summary(sessions: &[WorkSession]) -> DaySummary {
    let mut per_project: HashMap<ProjectId, i64> = HashMap::new();
    for s in sessions {
        *per_project.entry(s.project_id).or_default() += s.effective_duration();
    }

    // Ties resolve to the lower id / alphabetically first name.
    let favorite_project = per_project
        .into_iter()
        .max_by_key(|&(id, total)| (total, Reverse(id)));

    let favorite_name = favorite_project.and_then(|(pid, _)| {
        let mut per_name: HashMap<&str, i64> = HashMap::new();
        for s in sessions.iter().filter(|s| s.project_id == pid) {
            *per_name.entry(s.name.as_str()).or_default() += s.effective_duration();
        }
        per_name
            .into_iter()
            .max_by_key(|&(name, total)| (total, Reverse(name)))
            .map(|(name, _)| name.to_string())
    });

    DaySummary {
        total_sessions: sessions.len(),
        total_secs: sessions.iter().map(WorkSession::effective_duration).sum(),
        favorite_project,
        favorite_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::actor::ActorId;
    use crate::models::project::ProjectDraft;
    use crate::models::session::SessionDraft;
    use crate::utils::time::parse_instant;
    use chrono::FixedOffset;

    fn ended(id: i64, project: i64, name: &str, start: &str, end: &str) -> WorkSession {
        SessionDraft::new(project, name, ActorId::new("alice"), parse_instant(start).unwrap())
            .ending_at(parse_instant(end).unwrap())
            .into_session(id)
            .unwrap()
    }

    fn running(id: i64, project: i64, start: &str) -> WorkSession {
        SessionDraft::new(project, "live", ActorId::new("alice"), parse_instant(start).unwrap())
            .into_session(id)
            .unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn days_follow_the_viewer_timezone() {
        // 23:30 UTC is already the next day two hours east.
        let s = ended(1, 1, "late", "2025-06-01T23:30:00Z", "2025-06-01T23:45:00Z");
        let utc = bucket_by_day(std::slice::from_ref(&s), &Utc);
        let east = bucket_by_day(&[s], &FixedOffset::east_opt(2 * 3600).unwrap());
        assert!(utc.contains_key(&date("2025-06-01")));
        assert!(east.contains_key(&date("2025-06-02")));
    }

    #[test]
    fn buckets_sum_end_minus_start_and_stored_duration_for_running() {
        let sessions = vec![
            ended(1, 1, "a", "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"),
            ended(2, 1, "b", "2025-06-02T11:00:00Z", "2025-06-02T11:30:00Z"),
            running(3, 1, "2025-06-02T12:00:00Z"),
        ];
        let day = &bucket_by_day(&sessions, &Utc)[&date("2025-06-02")];
        assert_eq!(day.count, 3);
        assert_eq!(day.duration_secs, 5400);
        assert_eq!(day.value(Metric::Duration), 1.5);
    }

    #[test]
    fn weeks_start_on_monday() {
        let sessions = vec![
            ended(1, 1, "a", "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"), // Monday
            ended(2, 1, "b", "2025-06-08T09:00:00Z", "2025-06-08T10:00:00Z"), // Sunday
            ended(3, 1, "c", "2025-06-09T09:00:00Z", "2025-06-09T10:00:00Z"), // next Monday
        ];
        let weeks = bucket_by_week(&sessions, &Utc);
        assert_eq!(weeks[&date("2025-06-02")].count, 2);
        assert_eq!(weeks[&date("2025-06-09")].count, 1);
    }

    #[test]
    fn intensity_is_a_step_function() {
        let t = Thresholds::default_for(Metric::Count);
        let levels: Vec<u8> = [0.0, 1.0, 2.0, 3.0, 5.0, 6.0]
            .into_iter()
            .map(|v| t.intensity(v))
            .collect();
        assert_eq!(levels, vec![0, 1, 2, 2, 3, 4]);

        let hours = Thresholds::default_for(Metric::Duration);
        assert_eq!(hours.intensity(0.5), 1);
        assert_eq!(hours.intensity(6.5), 4);
    }

    #[test]
    fn grid_fills_empty_days() {
        let sessions = vec![ended(1, 1, "a", "2025-06-05T09:00:00Z", "2025-06-05T10:00:00Z")];
        let grid = activity_grid(
            &sessions,
            date("2025-06-07"),
            7,
            Metric::Count,
            &Thresholds::default_for(Metric::Count),
            &Utc,
        );
        assert_eq!(grid.len(), 7);
        assert_eq!(grid[0].date, date("2025-06-01"));
        assert_eq!(grid[6].date, date("2025-06-07"));
        let hit: Vec<_> = grid.iter().filter(|d| d.count > 0).collect();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].date, date("2025-06-05"));
        assert_eq!(hit[0].level, 1);
    }

    #[test]
    fn stats_count_all_but_total_only_ended() {
        let t0 = parse_instant("2025-01-01T00:00:00Z").unwrap();
        let projects = vec![
            ProjectDraft::new("A", ActorId::new("alice")).into_project(1, t0).unwrap(),
            ProjectDraft::new("B", ActorId::new("alice")).into_project(2, t0).unwrap(),
        ];
        let sessions = vec![
            ended(1, 1, "x", "2025-06-02T09:00:00Z", "2025-06-02T09:10:00Z"),
            running(2, 1, "2025-06-02T10:00:00Z"),
            ended(3, 2, "y", "2025-06-02T09:00:00Z", "2025-06-02T10:00:00Z"),
        ];
        let stats = project_stats(&projects, &sessions);
        assert_eq!(stats[0].project_id, 2);
        assert_eq!(stats[1].sessions, 2);
        assert_eq!(stats[1].total_secs, 600);

        let sum = totals(&stats);
        assert_eq!(sum.sessions, 3);
        assert_eq!(sum.total_secs, 4200);
        assert_eq!(sum.average_secs, 1400);
    }

    #[test]
    fn day_summary_picks_favorites() {
        let sessions = vec![
            ended(1, 1, "reading", "2025-06-02T09:00:00Z", "2025-06-02T09:20:00Z"),
            ended(2, 2, "coding", "2025-06-02T10:00:00Z", "2025-06-02T10:30:00Z"),
            ended(3, 2, "review", "2025-06-02T11:00:00Z", "2025-06-02T11:10:00Z"),
            ended(4, 2, "coding", "2025-06-02T12:00:00Z", "2025-06-02T12:05:00Z"),
        ];
        let summary = day_summary(&sessions);
        assert_eq!(summary.total_sessions, 4);
        assert_eq!(summary.favorite_project, Some((2, 45 * 60)));
        assert_eq!(summary.favorite_name.as_deref(), Some("coding"));
        assert_eq!(day_summary(&[]), DaySummary::default());
    }
}
