//! Terminal rendering. Functions return lines so the commands just print them.

use std::collections::BTreeMap;

use ansi_term::{Colour, Style};
use chrono::{DateTime, Local, Utc};

use crate::{
    categories::{get_category_for_domain, Category},
    report::{TodayStats, DateTotals},
    storage::entities::{FocusModeState, Session},
    utils::{
        percentage::{share, Percentage},
        time::{format_detailed_time, format_time},
    },
};

pub fn category_colour(category: Category) -> Colour {
    match category {
        Category::Productive => Colour::Green,
        Category::Social => Colour::Blue,
        Category::Entertainment => Colour::Red,
        Category::News => Colour::Yellow,
        Category::Shopping => Colour::Purple,
        Category::Other => Colour::White,
    }
}

fn painted_category(category: Category, colour: bool) -> String {
    if colour {
        category_colour(category)
            .paint(category.display_name())
            .to_string()
    } else {
        category.display_name().to_string()
    }
}

fn bold(text: &str, colour: bool) -> String {
    if colour {
        Style::new().bold().paint(text).to_string()
    } else {
        text.to_string()
    }
}

pub fn render_today(
    stats: &TodayStats,
    greeting: &str,
    min_percentage: Percentage,
    colour: bool,
) -> Vec<String> {
    let mut lines = vec![
        bold(greeting, colour),
        format!(
            "Today\t{}\tproductivity {}%",
            format_time(stats.total_time),
            stats.productivity_score
        ),
        format!("This week\t{}", format_time(stats.week_time)),
    ];
    if stats.distracting_time > 0 {
        lines.push(format!("Distracting\t{}", format_time(stats.distracting_time)));
    }
    if stats.top_sites.is_empty() {
        lines.push("Nothing tracked today".into());
        return lines;
    }

    lines.push(String::new());
    for site in stats
        .top_sites
        .iter()
        .filter(|site| site.percentage >= min_percentage)
    {
        lines.push(format!(
            "{}%\t{}\t{}\t{}",
            site.percentage.rounded(),
            format_time(site.time_spent),
            site.domain,
            painted_category(site.category, colour),
        ));
    }
    lines
}

/// One line per date, newest first, with the day's total and its longest site.
pub fn render_date_overview(totals: &DateTotals, dates: &[String]) -> Vec<String> {
    dates
        .iter()
        .filter_map(|date| {
            let sites = totals.get(date)?;
            let total = sites.values().sum::<u64>();
            let top = sites
                .iter()
                .max_by_key(|(_, time)| **time)
                .map(|(domain, _)| domain.as_str())
                .unwrap_or("-");
            Some(format!("{date}\t{}\t{top}", format_time(total)))
        })
        .collect()
}

pub fn render_date(
    date: &str,
    sites: &BTreeMap<String, u64>,
    min_percentage: Percentage,
    colour: bool,
) -> Vec<String> {
    let total = sites.values().sum::<u64>();
    let mut sorted = sites.iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut lines = vec![format!("{}\t{}", bold(date, colour), format_time(total))];
    for (domain, time) in sorted {
        let percentage = share(*time, total);
        if percentage < min_percentage {
            continue;
        }
        lines.push(format!(
            "{}%\t{}\t{domain}\t{}",
            percentage.rounded(),
            format_detailed_time(*time),
            painted_category(get_category_for_domain(domain), colour),
        ));
    }
    lines
}

pub fn render_sessions(sessions: &[Session], current_time: DateTime<Utc>) -> Vec<String> {
    sessions
        .iter()
        .rev()
        .map(|session| {
            let start = session.start_time.with_timezone(&Local);
            let end = session
                .end_time
                .map(|end| end.with_timezone(&Local).format("%H:%M").to_string())
                .unwrap_or_else(|| "open".into());
            let tracked = session.sites.values().sum::<u64>();
            let top = session
                .sites
                .iter()
                .max_by_key(|(_, time)| **time)
                .map(|(domain, _)| domain.as_str())
                .unwrap_or("-");
            let length = if session.is_open() {
                session.age(current_time).num_milliseconds().max(0) as u64
            } else {
                session.total_time
            };
            format!(
                "{} - {end}\t{}\ttracked {}\t{top}",
                start.format("%x %H:%M"),
                format_time(length),
                format_time(tracked),
            )
        })
        .collect()
}

pub fn render_focus(state: &FocusModeState, now: DateTime<Utc>) -> Vec<String> {
    if !state.is_active {
        return vec!["Focus mode is off".into()];
    }
    if !state.is_blocking(now) {
        return vec![
            "Focus mode has expired, a running host turns it off within a minute".into(),
        ];
    }

    let mut lines = vec![match state.end_time {
        Some(end) => format!(
            "Focus mode on until {} ({} left)",
            end.with_timezone(&Local).format("%H:%M"),
            format_time((end - now).num_milliseconds().max(0) as u64)
        ),
        None => "Focus mode on".into(),
    }];
    lines.extend(state.blocked_sites.iter().map(|site| format!("  blocking {site}")));
    lines
}
