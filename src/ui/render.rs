//! Plain-text renderings of domain values for the CLI.

use crate::core::aggregate::{DaySummary, GridDay, ProjectStats, StatsTotals};
use crate::db::log::LogEntry;
use crate::models::idea::{Idea, Reaction};
use crate::models::project::Project;
use crate::models::session::WorkSession;
use crate::models::todo::Todo;
use crate::utils::colors::{GREY, RESET, color_for_intensity, color_for_operation, color_for_session};
use crate::utils::date::relative_label;
use crate::utils::time::{format_clock, format_duration, to_device_naive_string};
use chrono::{DateTime, NaiveDate, Utc};

pub fn project_line(p: &Project) -> String {
    let mut flags = Vec::new();
    if !p.is_public {
        flags.push("private");
    }
    if !p.is_open {
        flags.push("closed");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" ({})", flags.join(", "))
    };
    let owner = p.created_by.as_ref().map(|a| a.as_str()).unwrap_or("-");
    format!("#{:<6} {}{flags}  {GREY}by {owner}{RESET}", p.id, p.name)
}

pub fn session_line(s: &WorkSession, now: DateTime<Utc>) -> String {
    let color = color_for_session(s.is_running());
    let when = to_device_naive_string(&s.started_at);
    let span = match s.ended_at {
        Some(end) => format!("→ {}  {}", to_device_naive_string(&end), format_duration(s.duration_secs)),
        None => format!("running {}", format_clock(s.elapsed_at(now))),
    };
    format!(
        "{color}#{:<6} {} [{}]{RESET}  {when}  {span}",
        s.id, s.name, s.category
    )
}

/// One colored cell per day, then a legend line per day with activity.
pub fn grid(days: &[GridDay], today: NaiveDate) -> String {
    let cells: String = days
        .iter()
        .map(|d| format!("{}■{RESET} ", color_for_intensity(d.level)))
        .collect();

    let mut out = cells.trim_end().to_string();
    for d in days.iter().filter(|d| d.count > 0) {
        out.push_str(&format!(
            "\n{:<22} {} across {} session{}",
            relative_label(d.date, today),
            format_duration(d.duration_secs),
            d.count,
            if d.count == 1 { "" } else { "s" }
        ));
    }
    out
}

pub fn stats_table(stats: &[ProjectStats], totals: &StatsTotals) -> String {
    let name_w = stats.iter().map(|s| s.name.chars().count()).max().unwrap_or(7).max(7);
    let mut out = format!("{:<name_w$}  {:>8}  {}\n", "Project", "Sessions", "Total");
    for s in stats {
        out.push_str(&format!(
            "{:<name_w$}  {:>8}  {}\n",
            s.name,
            s.sessions,
            format_duration(s.total_secs)
        ));
    }
    out.push_str(&format!(
        "\n{} sessions, {} in total, {} on average",
        totals.sessions,
        format_duration(totals.total_secs),
        format_duration(totals.average_secs)
    ));
    out
}

pub fn day_summary(summary: &DaySummary, project_name: Option<&str>) -> String {
    let mut out = format!(
        "{} session{}, {}",
        summary.total_sessions,
        if summary.total_sessions == 1 { "" } else { "s" },
        format_duration(summary.total_secs)
    );
    if let (Some(name), Some(project)) = (&summary.favorite_name, project_name) {
        out.push_str(&format!("\nYour favorite pastime was \"{name}\" in {project}"));
    }
    out
}

pub fn idea_line(idea: &Idea) -> String {
    let reacts: Vec<String> = Reaction::ALL
        .iter()
        .map(|r| {
            let n = idea.reacts.get(r).map(Vec::len).unwrap_or(0);
            format!("{} {n}", r.emoji())
        })
        .collect();
    format!(
        "#{:<6} {}  {GREY}by {}{RESET}  {}",
        idea.id,
        idea.text,
        idea.submitted_by,
        reacts.join("  ")
    )
}

pub fn todo_line(todo: &Todo) -> String {
    let mark = if todo.done { "[x]" } else { "[ ]" };
    let mut line = format!("#{:<6} {mark} {}", todo.id, todo.name);
    if !todo.text.is_empty() {
        line.push_str(&format!("  {GREY}{}{RESET}", todo.text));
    }
    if let Some(at) = &todo.done_at {
        line.push_str(&format!("  {GREY}done {}{RESET}", to_device_naive_string(at)));
    }
    line
}

pub fn log_lines(entries: &[LogEntry]) -> Vec<String> {
    let id_w = entries.iter().map(|e| e.id.to_string().len()).max().unwrap_or(1);
    let op_w = entries
        .iter()
        .map(|e| e.operation.len())
        .max()
        .unwrap_or(10)
        .min(30);
    entries
        .iter()
        .map(|e| {
            let color = color_for_operation(&e.operation);
            let target = if e.target.is_empty() {
                String::new()
            } else {
                format!(" ({})", e.target)
            };
            format!(
                "{:>id_w$}: {} | {color}{:<op_w$}{RESET}{target} => {}",
                e.id, e.date, e.operation, e.message
            )
        })
        .collect()
}
