//! Maps hostnames to a fixed set of categories. Everything here is pure.

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Productive,
    Social,
    Entertainment,
    News,
    Shopping,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Productive,
        Category::Social,
        Category::Entertainment,
        Category::News,
        Category::Shopping,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Productive => "productive",
            Category::Social => "social",
            Category::Entertainment => "entertainment",
            Category::News => "news",
            Category::Shopping => "shopping",
            Category::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Productive => "Productive",
            Category::Social => "Social Media",
            Category::Entertainment => "Entertainment",
            Category::News => "News & Media",
            Category::Shopping => "Shopping",
            Category::Other => "Other",
        }
    }

    pub fn is_distracting(&self) -> bool {
        matches!(self, Category::Social | Category::Entertainment)
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown category {s}"))
    }
}

const DEFAULT_CATEGORIES: &[(&str, Category)] = &[
    ("github.com", Category::Productive),
    ("stackoverflow.com", Category::Productive),
    ("docs.google.com", Category::Productive),
    ("notion.so", Category::Productive),
    ("trello.com", Category::Productive),
    ("slack.com", Category::Productive),
    ("zoom.us", Category::Productive),
    ("figma.com", Category::Productive),
    ("canva.com", Category::Productive),
    ("facebook.com", Category::Social),
    ("twitter.com", Category::Social),
    ("instagram.com", Category::Social),
    ("linkedin.com", Category::Social),
    ("discord.com", Category::Social),
    ("reddit.com", Category::Social),
    ("tiktok.com", Category::Social),
    ("snapchat.com", Category::Social),
    ("youtube.com", Category::Entertainment),
    ("netflix.com", Category::Entertainment),
    ("twitch.tv", Category::Entertainment),
    ("spotify.com", Category::Entertainment),
    ("hulu.com", Category::Entertainment),
    ("disneyplus.com", Category::Entertainment),
    ("primevideo.com", Category::Entertainment),
    ("cnn.com", Category::News),
    ("bbc.com", Category::News),
    ("nytimes.com", Category::News),
    ("reuters.com", Category::News),
    ("techcrunch.com", Category::News),
    ("theverge.com", Category::News),
    ("amazon.com", Category::Shopping),
    ("ebay.com", Category::Shopping),
    ("etsy.com", Category::Shopping),
    ("walmart.com", Category::Shopping),
    ("target.com", Category::Shopping),
    ("shopify.com", Category::Shopping),
];

/// Removes a single leading `www.`.
pub fn strip_www(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}

/// Category from the built-in table. Exact matches win, then any table entry contained in the
/// domain (so `music.youtube.com` is entertainment).
pub fn get_category_for_domain(domain: &str) -> Category {
    let clean = strip_www(domain);

    if let Some((_, category)) = DEFAULT_CATEGORIES.iter().find(|(known, _)| *known == clean) {
        return *category;
    }

    DEFAULT_CATEGORIES
        .iter()
        .find(|(known, _)| clean.contains(known))
        .map(|(_, category)| *category)
        .unwrap_or_default()
}

/// Same as [get_category_for_domain] but user overrides from settings are consulted first.
/// Overrides with an unknown category name are ignored.
pub fn categorize(domain: &str, overrides: &BTreeMap<String, String>) -> Category {
    let clean = strip_www(domain);
    overrides
        .get(clean)
        .or_else(|| overrides.get(domain))
        .and_then(|name| name.parse().ok())
        .unwrap_or_else(|| get_category_for_domain(domain))
}

pub fn is_distracting_site(domain: &str) -> bool {
    get_category_for_domain(domain).is_distracting()
}

/// Percentage of time spent on productive domains, rounded. No time at all scores 0.
pub fn calculate_productivity_score<'a>(
    site_time: impl IntoIterator<Item = (&'a str, u64)>,
) -> u8 {
    let (productive, total) =
        site_time
            .into_iter()
            .fold((0u64, 0u64), |(productive, total), (domain, time)| {
                if get_category_for_domain(domain) == Category::Productive {
                    (productive + time, total + time)
                } else {
                    (productive, total + time)
                }
            });

    if total == 0 {
        return 0;
    }
    crate::utils::percentage::share(productive, total).rounded()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn www_prefix_is_ignored() {
        assert_eq!(get_category_for_domain("www.youtube.com"), Category::Entertainment);
        assert_eq!(get_category_for_domain("youtube.com"), Category::Entertainment);
        assert_eq!(get_category_for_domain("unknown-xyz.com"), Category::Other);
    }

    #[test]
    fn subdomains_match_by_containment() {
        assert_eq!(get_category_for_domain("gist.github.com"), Category::Productive);
        assert_eq!(get_category_for_domain("edition.cnn.com"), Category::News);
    }

    #[test]
    fn productivity_score_is_rounded_share() {
        let score = calculate_productivity_score([("github.com", 600_000), ("facebook.com", 400_000)]);
        assert_eq!(score, 60);
        assert_eq!(calculate_productivity_score([]), 0);
        assert_eq!(calculate_productivity_score([("github.com", 2), ("example.org", 1)]), 67);
    }

    #[test]
    fn overrides_take_precedence() {
        let mut overrides = BTreeMap::new();
        overrides.insert("youtube.com".to_string(), "productive".to_string());
        overrides.insert("example.org".to_string(), "nonsense".to_string());

        assert_eq!(categorize("www.youtube.com", &overrides), Category::Productive);
        assert_eq!(categorize("example.org", &overrides), Category::Other);
        assert_eq!(categorize("reddit.com", &overrides), Category::Social);
    }

    #[test]
    fn distracting_sites() {
        assert!(is_distracting_site("www.reddit.com"));
        assert!(!is_distracting_site("github.com"));
    }
}
