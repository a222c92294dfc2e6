use crate::cli::Context;
use crate::core::aggregate::{
    Metric, Thresholds, activity_grid, bucket_by_week, day_summary, local_day, project_stats,
    totals,
};
use crate::errors::{AppError, AppResult};
use crate::models::session::WorkSession;
use crate::ui::messages::{header, info};
use crate::ui::render;
use crate::utils::date::{self, parse_date, week_start};
use crate::utils::time::format_duration;
use chrono::Local;
use std::str::FromStr;

pub async fn stats(ctx: &Context) -> AppResult<()> {
    let backend = ctx.backend()?;
    let scope = ctx.scope();
    let projects = backend.sessions.list_projects(&scope).await?;
    let sessions = backend.sessions.list_all_sessions(&scope).await?;

    if projects.is_empty() {
        info("No projects yet.");
        return Ok(());
    }

    let per_project = project_stats(&projects, &sessions);
    let summary = totals(&per_project);
    header("Projects");
    println!("{}", render::stats_table(&per_project, &summary));

    let this_week = week_start(date::today());
    if let Some(week) = bucket_by_week(&sessions, &Local).get(&this_week) {
        println!(
            "\nThis week: {} across {} session{}",
            format_duration(week.duration_secs),
            week.count,
            if week.count == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

pub async fn grid(ctx: &Context, days: u32, metric: &str, day: Option<&str>) -> AppResult<()> {
    let metric = Metric::from_str(metric)?;
    let backend = ctx.backend()?;
    let scope = ctx.scope();
    let sessions = backend.sessions.list_all_sessions(&scope).await?;

    let today = date::today();
    let cells = activity_grid(
        &sessions,
        today,
        days.max(1),
        metric,
        &Thresholds::default_for(metric),
        &Local,
    );
    println!("{}", render::grid(&cells, today));

    if let Some(day) = day {
        let wanted = parse_date(day).ok_or_else(|| AppError::InvalidTimestamp(day.to_string()))?;
        let that_day: Vec<WorkSession> = sessions
            .into_iter()
            .filter(|s| local_day(&s.started_at, &Local) == wanted)
            .collect();

        let summary = day_summary(&that_day);
        let project_name = match summary.favorite_project {
            Some((pid, _)) => match backend.sessions.get_project(pid).await {
                Ok(p) => Some(p.name),
                Err(e) => {
                    tracing::warn!(project = pid, error = %e, "favorite project lookup failed");
                    None
                }
            },
            None => None,
        };

        println!();
        header(date::relative_label(wanted, today));
        println!("{}", render::day_summary(&summary, project_name.as_deref()));
    }
    Ok(())
}
