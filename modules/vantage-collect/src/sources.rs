//! Static source configuration. Query templates, feed lists, and category
//! maps are data, not code: adding a source is an edit here, not a new type.

/// Per-request timeouts.
pub const RSS_TIMEOUT_SECS: u64 = 30;
pub const API_TIMEOUT_SECS: u64 = 60;

/// RSS feeds: (feed key, url, category).
pub const RSS_FEEDS: &[(&str, &str, &str)] = &[
    // World news / geopolitics
    ("reuters_world", "https://feeds.reuters.com/Reuters/worldNews", "geopolitics"),
    ("ap_top", "https://apnews.com/apf-topnews/feed", "geopolitics"),
    ("bbc_world", "https://feeds.bbci.co.uk/news/world/rss.xml", "geopolitics"),
    ("al_jazeera", "https://www.aljazeera.com/xml/rss/all.xml", "geopolitics"),
    // Defense & military
    ("defense_news", "https://www.defensenews.com/arc/outboundfeeds/rss/category/global/?outputType=xml", "military"),
    ("breaking_defense", "https://breakingdefense.com/feed/", "military"),
    ("war_on_rocks", "https://warontherocks.com/feed/", "military"),
    // Foreign policy & analysis
    ("foreign_policy", "https://foreignpolicy.com/feed/", "geopolitics"),
    ("lawfare", "https://www.lawfaremedia.org/rss.xml", "geopolitics"),
    ("council_fr", "https://www.cfr.org/rss.xml", "geopolitics"),
    ("csis_analysis", "https://www.csis.org/rss.xml", "geopolitics"),
    ("rand_commentary", "https://www.rand.org/pubs/commentary.xml", "geopolitics"),
    ("atlantic_council", "https://www.atlanticcouncil.org/feed/", "geopolitics"),
    ("just_security", "https://www.justsecurity.org/feed/", "geopolitics"),
    ("cipher_brief", "https://www.thecipherbrief.com/feeds/feed.rss", "geopolitics"),
    ("long_war_journal", "https://www.longwarjournal.org/feed", "military"),
    // AI provider blogs
    ("openai_blog", "https://openai.com/news/rss.xml", "tech_ai"),
    ("google_ai", "https://blog.google/innovation-and-ai/technology/ai/rss/", "tech_ai"),
    ("deepmind", "https://deepmind.google/blog/rss.xml", "tech_ai"),
    ("huggingface_blog", "https://huggingface.co/blog/feed.xml", "tech_ai"),
    ("nvidia_ai", "https://blogs.nvidia.com/feed/", "tech_ai"),
    // Security news
    ("hacker_news_security", "https://feeds.feedburner.com/TheHackersNews", "cyber"),
    ("bleeping_computer", "https://www.bleepingcomputer.com/feed/", "cyber"),
    ("the_register_security", "https://www.theregister.com/security/headlines.atom", "cyber"),
    ("dark_reading", "https://www.darkreading.com/rss.xml", "cyber"),
    ("krebs_security", "https://krebsonsecurity.com/feed/", "cyber"),
    // Federal law enforcement
    ("fbi_news", "https://www.fbi.gov/feeds/national-press-releases/RSS", "crime_national"),
    // Academic preprints & journals
    ("biorxiv_all", "http://connect.biorxiv.org/biorxiv_xml.php?subject=all", "research"),
    ("medrxiv_all", "http://connect.medrxiv.org/medrxiv_xml.php?subject=all", "research"),
    ("nature_journal", "https://www.nature.com/nature.rss", "research"),
    ("science_news", "https://www.science.org/rss/news_current.xml", "research"),
    // Tech
    ("ars_technica", "https://feeds.arstechnica.com/arstechnica/technology-lab", "tech_general"),
    ("hacker_news", "https://hnrss.org/frontpage", "tech_general"),
];

/// Display names for feeds whose key doesn't title-case cleanly.
pub const RSS_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("reuters_world", "Reuters"),
    ("ap_top", "AP News"),
    ("bbc_world", "BBC World"),
    ("al_jazeera", "Al Jazeera"),
    ("council_fr", "Council on Foreign Relations"),
    ("csis_analysis", "CSIS"),
    ("rand_commentary", "RAND"),
    ("hacker_news_security", "The Hacker News"),
    ("the_register_security", "The Register"),
    ("fbi_news", "FBI"),
    ("ars_technica", "Ars Technica"),
    ("hacker_news", "Hacker News"),
];

pub fn rss_display_name(feed_key: &str) -> String {
    for (key, name) in RSS_DISPLAY_NAMES {
        if *key == feed_key {
            return (*name).to_string();
        }
    }
    feed_key
        .split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// GDELT query templates: (template name, query, category, description).
pub const GDELT_QUERY_TEMPLATES: &[(&str, &str, &str, &str)] = &[
    (
        "geopolitics",
        "sourcelang:english (domain:reuters.com OR domain:apnews.com OR domain:bbc.com)",
        "geopolitics",
        "Major news from authoritative sources",
    ),
    (
        "crime_international",
        "(theme:CRIME OR theme:TERROR OR theme:ARREST OR theme:KILL) sourcelang:english",
        "crime_international",
        "International crime and terrorism",
    ),
    (
        "military_activity",
        "(theme:MILITARY OR theme:ARMED_CONFLICT OR theme:TAX_FNCACT_MILITARY) sourcelang:english",
        "military",
        "Military operations and armed conflicts",
    ),
    (
        "political_instability",
        "(theme:POLITICAL_TURMOIL OR theme:PROTEST OR theme:ELECTION OR theme:COUP) sourcelang:english",
        "political",
        "Political unrest and governance events",
    ),
    (
        "cyber_security",
        "(cyber AND (attack OR breach OR hack OR ransomware)) OR theme:CYBER_ATTACK sourcelang:english",
        "cyber",
        "Cybersecurity incidents and threats",
    ),
    (
        "financial_events",
        "(theme:ECON_BANKRUPTCY OR theme:ECON_STOCKMARKET OR theme:ECON_DEBT) sourcelang:english",
        "financial",
        "Financial and economic events",
    ),
    (
        "sanctions",
        "(sanctions OR embargo OR \"asset freeze\") (domain:.gov OR domain:reuters.com OR domain:ft.com) sourcelang:english",
        "sanctions",
        "Sanctions and trade restrictions",
    ),
    (
        "government_official",
        "(domain:.gov OR domain:.mil) sourcelang:english",
        "government",
        "Official government and military sources",
    ),
];

/// ACLED event type -> (category, severity weight).
pub const ACLED_EVENT_TYPES: &[(&str, &str, i32)] = &[
    ("Battles", "conflict", 3),
    ("Explosions/Remote violence", "conflict", 3),
    ("Violence against civilians", "conflict", 3),
    ("Protests", "political", 1),
    ("Riots", "political", 2),
    ("Strategic developments", "military", 2),
];

/// Subreddits polled by the community adapter: (name, category).
pub const REDDIT_SUBREDDITS: &[(&str, &str)] = &[
    ("geopolitics", "geopolitics"),
    ("worldnews", "geopolitics"),
    ("intelligence", "geopolitics"),
    ("credibledefense", "military"),
    ("cybersecurity", "cyber"),
    ("Economics", "financial"),
];

/// SEC form types worth collecting, with a coarse classification.
pub const SEC_FORM_TYPES: &[(&str, &str)] = &[
    ("8-K", "financial"),
    ("10-K", "financial"),
    ("10-Q", "financial"),
    ("13-F", "financial"),
    ("4", "financial"),
    ("S-1", "financial"),
    ("SC 13D", "financial"),
    ("SC 13G", "financial"),
];

/// ArXiv categories queried by the research adapter.
pub const ARXIV_CATEGORIES: &[&str] = &[
    "cs.AI", "cs.LG", "cs.CL", "cs.CR", "cs.DC", "cs.NI", "cs.SE", "cs.RO",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_display_name_uses_overrides() {
        assert_eq!(rss_display_name("reuters_world"), "Reuters");
        assert_eq!(rss_display_name("ap_top"), "AP News");
    }

    #[test]
    fn rss_display_name_title_cases_unknown_keys() {
        assert_eq!(rss_display_name("breaking_defense"), "Breaking Defense");
        assert_eq!(rss_display_name("lawfare"), "Lawfare");
    }

    #[test]
    fn every_feed_has_a_category() {
        for (key, url, category) in RSS_FEEDS {
            assert!(!key.is_empty());
            assert!(url.starts_with("http"), "{key} url malformed");
            assert!(!category.is_empty(), "{key} missing category");
        }
    }

    #[test]
    fn gdelt_templates_are_unique_by_name() {
        let mut names: Vec<&str> = GDELT_QUERY_TEMPLATES.iter().map(|t| t.0).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), GDELT_QUERY_TEMPLATES.len());
    }
}
