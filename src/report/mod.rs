//! Read-only views over the stored aggregates: today's summary and per-date totals.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::{
    categories::{calculate_productivity_score, is_distracting_site, Category},
    storage::entities::SiteAggregate,
    utils::{
        percentage::{share, Percentage},
        time::{date_label, is_this_week, is_today},
    },
};

pub mod fetch;

/// Date label -> domain -> milliseconds. Labels look like `Thu Dec 26 2025`.
pub type DateTotals = BTreeMap<String, BTreeMap<String, u64>>;

pub const DEFAULT_TOP_SITES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SiteShare {
    pub domain: String,
    pub time_spent: u64,
    /// Share of the listed sites' total.
    pub percentage: Percentage,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TodayStats {
    pub total_time: u64,
    pub top_sites: Vec<SiteShare>,
    pub productivity_score: u8,
    /// Every site last visited since the week began, not only the listed ones.
    pub week_time: u64,
    /// Time today on social and entertainment sites, listed or not.
    pub distracting_time: u64,
}

/// Summary of the sites last visited today, longest first, cut to `top` entries. Totals and the
/// productivity score only cover the sites that made the cut.
pub fn today_stats<Tz: TimeZone>(
    sites: &BTreeMap<String, SiteAggregate>,
    now: &DateTime<Tz>,
    top: usize,
) -> TodayStats {
    let mut today = sites
        .values()
        .filter(|site| is_today(site.last_visit, now))
        .collect::<Vec<_>>();
    let week_time = sites
        .values()
        .filter(|site| is_this_week(site.last_visit, now))
        .map(|site| site.time_spent)
        .sum();
    let distracting_time = today
        .iter()
        .filter(|site| is_distracting_site(&site.domain))
        .map(|site| site.time_spent)
        .sum();
    today.sort_by(|a, b| {
        b.time_spent
            .cmp(&a.time_spent)
            .then_with(|| a.domain.cmp(&b.domain))
    });
    today.truncate(top);

    let total_time = today.iter().map(|site| site.time_spent).sum();
    let productivity_score =
        calculate_productivity_score(today.iter().map(|site| (site.domain.as_str(), site.time_spent)));

    let top_sites = today
        .into_iter()
        .map(|site| SiteShare {
            domain: site.domain.clone(),
            time_spent: site.time_spent,
            percentage: share(site.time_spent, total_time),
            category: site.category,
        })
        .collect();

    TodayStats {
        total_time,
        top_sites,
        productivity_score,
        week_time,
        distracting_time,
    }
}

/// Groups every site under the day of its last visit, in `timezone`.
pub fn date_totals<Tz: TimeZone>(sites: &BTreeMap<String, SiteAggregate>, timezone: &Tz) -> DateTotals
where
    Tz::Offset: std::fmt::Display,
{
    let mut totals = DateTotals::new();
    for site in sites.values() {
        *totals
            .entry(date_label(site.last_visit, timezone))
            .or_default()
            .entry(site.domain.clone())
            .or_default() += site.time_spent;
    }
    totals
}

/// Date labels newest first. Labels that don't parse go last, in their original order.
pub fn sorted_dates(totals: &DateTotals) -> Vec<String> {
    let mut dates = totals.keys().cloned().collect::<Vec<_>>();
    dates.sort_by_key(|label| std::cmp::Reverse(parse_date_label(label)));
    dates
}

pub fn parse_date_label(label: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(label, "%a %b %d %Y").ok()
}
